//! Command history entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{CommandRecord, CommandStatus};
use sqlx::FromRow;

/// Database row mapping for the command_history table.
#[derive(Debug, Clone, FromRow)]
pub struct CommandHistoryEntity {
    pub id: String,
    pub device_id: String,
    pub command: String,
    pub params: Option<serde_json::Value>,
    pub status: String,
    pub result: Option<serde_json::Value>,
    pub batch_id: Option<String>,
    pub batch_name: Option<String>,
    pub actor: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl From<CommandHistoryEntity> for CommandRecord {
    fn from(entity: CommandHistoryEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            command: entity.command,
            params: entity.params,
            status: entity.status.parse().unwrap_or(CommandStatus::Pending),
            result: entity.result,
            batch_id: entity.batch_id,
            batch_name: entity.batch_name,
            actor: entity.actor,
            sent_at: entity.sent_at,
            executed_at: entity.executed_at,
        }
    }
}
