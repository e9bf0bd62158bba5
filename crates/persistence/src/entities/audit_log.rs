//! Audit log entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{AuditAction, AuditLog};
use sqlx::FromRow;

/// Database row mapping for the audit_logs table.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLogEntity {
    pub id: i64,
    pub actor: Option<String>,
    pub action: String,
    pub target: Option<String>,
    pub details: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl TryFrom<AuditLogEntity> for AuditLog {
    type Error = String;

    fn try_from(entity: AuditLogEntity) -> Result<Self, Self::Error> {
        Ok(Self {
            id: entity.id,
            actor: entity.actor,
            action: entity.action.parse::<AuditAction>()?,
            target: entity.target,
            details: entity.details,
            timestamp: entity.timestamp,
        })
    }
}
