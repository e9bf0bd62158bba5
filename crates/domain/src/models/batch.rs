//! Batch command model. Batch progress is derived from command rows, never stored.

use serde::{Deserialize, Serialize};
use validator::Validate;

use super::command::{CommandParams, CommandRecord, CommandStatus};

/// Error reported for a failed batch member when the device gave no message.
pub const DEFAULT_BATCH_ERROR: &str = "Execution failed";

/// Error recorded for a batch member that has no known address.
pub const NO_ADDRESS_ERROR: &str = "Device Offline/No IP";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchState {
    Running,
    Completed,
}

/// Outcome of one device in a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub device_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatus {
    pub batch_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_name: Option<String>,
    pub status: BatchState,
    pub total: usize,
    pub completed: usize,
    pub results: Vec<BatchResult>,
}

impl BatchStatus {
    /// Derives aggregate progress from the batch's command rows.
    pub fn from_records(batch_id: &str, records: &[CommandRecord]) -> Self {
        let total = records.len();
        let completed = records.iter().filter(|r| r.status.is_terminal()).count();
        let results = records.iter().map(BatchResult::from).collect();

        Self {
            batch_id: batch_id.to_string(),
            batch_name: records.iter().find_map(|r| r.batch_name.clone()),
            status: if completed == total {
                BatchState::Completed
            } else {
                BatchState::Running
            },
            total,
            completed,
            results,
        }
    }
}

impl From<&CommandRecord> for BatchResult {
    fn from(record: &CommandRecord) -> Self {
        let error = (record.status == CommandStatus::Failed).then(|| {
            record
                .result
                .as_ref()
                .and_then(|r| r.get("msg"))
                .and_then(|m| m.as_str())
                .filter(|m| !m.is_empty())
                .unwrap_or(DEFAULT_BATCH_ERROR)
                .to_string()
        });

        Self {
            device_id: record.device_id.clone(),
            success: record.status == CommandStatus::Success,
            error,
            duration_ms: record
                .executed_at
                .map(|at| (at - record.sent_at).num_milliseconds()),
        }
    }
}

/// Batch submission body.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchRequest {
    #[validate(length(min = 1, message = "No targets specified"))]
    pub target_ids: Vec<String>,

    #[validate(length(min = 1, message = "No command specified"))]
    pub command: String,

    #[serde(default)]
    pub params: CommandParams,

    pub batch_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBatchResponse {
    pub success: bool,
    pub batch_id: String,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn record(
        device: &str,
        status: CommandStatus,
        result: Option<serde_json::Value>,
    ) -> CommandRecord {
        let sent_at = Utc::now();
        CommandRecord {
            id: format!("tid-{}", device),
            device_id: device.to_string(),
            command: "restart".into(),
            params: None,
            status,
            result,
            batch_id: Some("b-1".into()),
            batch_name: Some("Nightly restart".into()),
            actor: None,
            sent_at,
            executed_at: status
                .is_terminal()
                .then(|| sent_at + Duration::milliseconds(250)),
        }
    }

    #[test]
    fn test_running_until_every_row_is_terminal() {
        let records = vec![
            record("d1", CommandStatus::Success, Some(json!({"code": 0}))),
            record("d2", CommandStatus::Sent, None),
        ];
        let status = BatchStatus::from_records("b-1", &records);
        assert_eq!(status.total, 2);
        assert_eq!(status.completed, 1);
        assert_eq!(status.status, BatchState::Running);
    }

    #[test]
    fn test_completed_when_all_terminal() {
        let records = vec![
            record("d1", CommandStatus::Success, Some(json!({"code": 0}))),
            record("d2", CommandStatus::Failed, Some(json!({"msg": NO_ADDRESS_ERROR}))),
        ];
        let status = BatchStatus::from_records("b-1", &records);
        assert_eq!(status.completed, 2);
        assert_eq!(status.status, BatchState::Completed);
        assert_eq!(status.batch_name.as_deref(), Some("Nightly restart"));

        assert!(status.results[0].success);
        assert_eq!(status.results[0].duration_ms, Some(250));
        assert!(!status.results[1].success);
        assert_eq!(status.results[1].error.as_deref(), Some(NO_ADDRESS_ERROR));
    }

    #[test]
    fn test_failed_without_message_uses_default_error() {
        let records = vec![record("d1", CommandStatus::Failed, Some(json!({"code": 7})))];
        let status = BatchStatus::from_records("b-1", &records);
        assert_eq!(status.results[0].error.as_deref(), Some(DEFAULT_BATCH_ERROR));
    }

    #[test]
    fn test_empty_batch_is_completed() {
        let status = BatchStatus::from_records("b-1", &[]);
        assert_eq!(status.status, BatchState::Completed);
        assert_eq!(status.total, 0);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let status = BatchStatus::from_records("b-1", &[]);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["batchId"], "b-1");
    }
}
