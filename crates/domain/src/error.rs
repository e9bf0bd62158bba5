//! Domain error types.

use thiserror::Error;

/// Storage-layer failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("record not found: {0}")]
    NotFound(String),
}

/// Failures raised by the gateway engine.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Command name outside the allow-list. Rejected before any I/O.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// No known address, or the transport failed or timed out.
    #[error("device unreachable: {0}")]
    DeviceUnreachable(String),

    /// The device answered with a non-zero result code.
    #[error("device rejected command (code {code}): {message}")]
    DeviceRejected { code: i64, message: String },

    /// An asynchronous callback matched no open record.
    #[error("no record matches {0}")]
    CorrelationMiss(String),

    #[error(transparent)]
    Persistence(#[from] StoreError),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl From<sqlx::Error> for GatewayError {
    fn from(err: sqlx::Error) -> Self {
        GatewayError::Persistence(StoreError::Database(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        assert_eq!(
            GatewayError::InvalidCommand("format".into()).to_string(),
            "invalid command: format"
        );
        assert_eq!(
            GatewayError::DeviceRejected {
                code: 3,
                message: "busy".into()
            }
            .to_string(),
            "device rejected command (code 3): busy"
        );
    }

    #[test]
    fn test_store_error_converts() {
        let err: GatewayError = StoreError::NotFound("task 7".into()).into();
        assert!(matches!(err, GatewayError::Persistence(StoreError::NotFound(_))));
        assert_eq!(err.to_string(), "record not found: task 7");
    }
}
