//! Alert notification abstractions.
//!
//! Newly opened alerts are forwarded to an external push service. The
//! concrete Bark client lives in the API crate; this module holds the trait,
//! the payload and a mock used in tests and when notifications are disabled.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use crate::models::AlertLevel;

/// Payload for an alert push notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertNotification {
    /// Alert type, e.g. `sim_error_1`.
    pub key: String,
    pub title: String,
    pub message: String,
    pub device_name: Option<String>,
    pub level: AlertLevel,
}

impl AlertNotification {
    /// Body text, prefixed with the device name when known.
    pub fn body(&self) -> String {
        match &self.device_name {
            Some(name) => format!("[{}] {}", name, self.message),
            None => self.message.clone(),
        }
    }
}

/// Result of a notification send attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationResult {
    /// Notification was sent successfully.
    Sent,
    /// Notification sending failed (but was non-blocking).
    Failed(String),
    /// Notifications are disabled or not configured.
    Skipped,
}

/// Push notification sink for alerts.
#[async_trait::async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, notification: AlertNotification) -> NotificationResult;
}

/// Notifier used when push notifications are disabled.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait::async_trait]
impl AlertNotifier for NoopNotifier {
    async fn notify(&self, notification: AlertNotification) -> NotificationResult {
        tracing::debug!(
            alert_type = %notification.key,
            "Notifications disabled, skipping alert push"
        );
        NotificationResult::Skipped
    }
}

/// Mock notification service for development and testing.
///
/// Records every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct MockNotificationService {
    /// Whether to simulate failures for testing.
    pub simulate_failure: bool,
    sent: Arc<Mutex<Vec<AlertNotification>>>,
}

impl MockNotificationService {
    /// Create a new mock notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock service that simulates failures.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Notifications received so far.
    pub fn sent(&self) -> Vec<AlertNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl AlertNotifier for MockNotificationService {
    async fn notify(&self, notification: AlertNotification) -> NotificationResult {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }

        if self.simulate_failure {
            tracing::warn!(
                alert_type = %notification.key,
                "Mock notification service simulating failure"
            );
            return NotificationResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            alert_type = %notification.key,
            level = %notification.level,
            "Mock: Would send alert notification"
        );

        NotificationResult::Sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(device_name: Option<&str>) -> AlertNotification {
        AlertNotification {
            key: "sim_error_1".into(),
            title: "SIM slot 1 error".into(),
            message: "SIM slot 1 error".into(),
            device_name: device_name.map(String::from),
            level: AlertLevel::Critical,
        }
    }

    #[test]
    fn test_body_prefixes_device_name() {
        assert_eq!(notification(Some("Lobby")).body(), "[Lobby] SIM slot 1 error");
        assert_eq!(notification(None).body(), "SIM slot 1 error");
    }

    #[tokio::test]
    async fn test_mock_records_notifications() {
        let mock = MockNotificationService::new();
        let result = mock.notify(notification(None)).await;
        assert_eq!(result, NotificationResult::Sent);
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure() {
        let mock = MockNotificationService::failing();
        let result = mock.notify(notification(None)).await;
        assert!(matches!(result, NotificationResult::Failed(_)));
        assert_eq!(mock.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_noop_skips() {
        assert_eq!(
            NoopNotifier.notify(notification(None)).await,
            NotificationResult::Skipped
        );
    }
}
