//! Audit log domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Audited actions following the format: resource.operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    #[serde(rename = "device.command")]
    DeviceCommand,
    #[serde(rename = "device.register")]
    DeviceRegister,
    #[serde(rename = "device.update")]
    DeviceUpdate,
    #[serde(rename = "device.delete")]
    DeviceDelete,
    #[serde(rename = "sms.send")]
    SmsSend,
    #[serde(rename = "batch.start")]
    BatchStart,
    #[serde(rename = "task.create")]
    TaskCreate,
    #[serde(rename = "task.update")]
    TaskUpdate,
    #[serde(rename = "task.delete")]
    TaskDelete,
    #[serde(rename = "task.run")]
    TaskRun,
    #[serde(rename = "alert.resolve")]
    AlertResolve,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DeviceCommand => "device.command",
            AuditAction::DeviceRegister => "device.register",
            AuditAction::DeviceUpdate => "device.update",
            AuditAction::DeviceDelete => "device.delete",
            AuditAction::SmsSend => "sms.send",
            AuditAction::BatchStart => "batch.start",
            AuditAction::TaskCreate => "task.create",
            AuditAction::TaskUpdate => "task.update",
            AuditAction::TaskDelete => "task.delete",
            AuditAction::TaskRun => "task.run",
            AuditAction::AlertResolve => "alert.resolve",
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "device.command" => Ok(AuditAction::DeviceCommand),
            "device.register" => Ok(AuditAction::DeviceRegister),
            "device.update" => Ok(AuditAction::DeviceUpdate),
            "device.delete" => Ok(AuditAction::DeviceDelete),
            "sms.send" => Ok(AuditAction::SmsSend),
            "batch.start" => Ok(AuditAction::BatchStart),
            "task.create" => Ok(AuditAction::TaskCreate),
            "task.update" => Ok(AuditAction::TaskUpdate),
            "task.delete" => Ok(AuditAction::TaskDelete),
            "task.run" => Ok(AuditAction::TaskRun),
            "alert.resolve" => Ok(AuditAction::AlertResolve),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stored audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: i64,
    pub actor: Option<String>,
    pub action: AuditAction,
    pub target: Option<String>,
    pub details: Option<JsonValue>,
    pub timestamp: DateTime<Utc>,
}

/// Input for creating an audit log entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateAuditLogInput {
    pub actor: Option<String>,
    pub action: AuditAction,
    pub target: Option<String>,
    pub details: Option<JsonValue>,
}

/// Query parameters for listing audit logs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListAuditLogsQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub action: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_round_trip() {
        for action in [
            AuditAction::DeviceCommand,
            AuditAction::SmsSend,
            AuditAction::BatchStart,
            AuditAction::TaskRun,
            AuditAction::AlertResolve,
        ] {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("device.wipe".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_action_serializes_dotted() {
        let json = serde_json::to_value(AuditAction::DeviceCommand).unwrap();
        assert_eq!(json, "device.command");
    }
}
