//! SMS message entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{SmsDirection, SmsMessage, SmsStatus};
use sqlx::FromRow;

/// Database row mapping for the sms_messages table.
#[derive(Debug, Clone, FromRow)]
pub struct SmsMessageEntity {
    pub id: String,
    pub device_id: String,
    pub slot_num: i16,
    pub direction: String,
    pub phone: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub is_read: bool,
    pub category: Option<String>,
    pub extracted_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<SmsMessageEntity> for SmsMessage {
    fn from(entity: SmsMessageEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            slot_num: entity.slot_num,
            direction: entity.direction.parse().unwrap_or(SmsDirection::Incoming),
            phone: entity.phone,
            content: entity.content,
            timestamp: entity.timestamp,
            status: entity.status.parse().unwrap_or(SmsStatus::Received),
            is_read: entity.is_read,
            category: entity.category.and_then(|c| c.parse().ok()),
            extracted_data: entity
                .extracted_data
                .and_then(|json| serde_json::from_value(json).ok()),
            created_at: entity.created_at,
        }
    }
}
