//! Call record entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{CallDirection, CallRecord, CallStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the call_records table.
#[derive(Debug, Clone, FromRow)]
pub struct CallRecordEntity {
    pub id: Uuid,
    pub device_id: String,
    pub slot_num: i16,
    pub direction: String,
    pub phone: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<CallRecordEntity> for CallRecord {
    fn from(entity: CallRecordEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            slot_num: entity.slot_num,
            direction: entity.direction.parse().unwrap_or(CallDirection::Incoming),
            phone: entity.phone,
            start_time: entity.start_time,
            end_time: entity.end_time,
            duration: entity.duration,
            status: entity.status.parse().unwrap_or(CallStatus::Completed),
            created_at: entity.created_at,
        }
    }
}
