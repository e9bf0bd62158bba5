//! Alert entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Alert, AlertLevel};
use sqlx::FromRow;

/// Database row mapping for the alerts table.
#[derive(Debug, Clone, FromRow)]
pub struct AlertEntity {
    pub id: i64,
    pub device_id: String,
    pub alert_type: String,
    pub message: String,
    pub level: String,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl From<AlertEntity> for Alert {
    fn from(entity: AlertEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            alert_type: entity.alert_type,
            message: entity.message,
            level: entity.level.parse().unwrap_or(AlertLevel::Warning),
            is_resolved: entity.is_resolved,
            created_at: entity.created_at,
            resolved_at: entity.resolved_at,
        }
    }
}
