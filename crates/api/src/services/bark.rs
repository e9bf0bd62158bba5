//! Bark push notifications.
//!
//! Bark takes everything in the URL:
//! `GET <base>/<device key>/<title>/<body>?group=..&level=..&sound=..`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::models::AlertLevel;
use domain::services::notification::{
    AlertNotification, AlertNotifier, NoopNotifier, NotificationResult,
};
use reqwest::{Client, Url};

use crate::config::NotificationConfig;

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("Invalid Bark URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Bark returned HTTP {0}")]
    Status(u16),

    #[error("Bark device key is not configured")]
    MissingKey,
}

/// Bark interruption level for an alert level.
fn bark_level(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Critical => "critical",
        AlertLevel::Error => "active",
        AlertLevel::Warning => "timeSensitive",
        AlertLevel::Info => "passive",
    }
}

fn bark_sound(level: AlertLevel) -> &'static str {
    if level == AlertLevel::Critical {
        "alarm"
    } else {
        "default"
    }
}

pub struct BarkNotifier {
    client: Client,
    base_url: Url,
    device_key: String,
    group: String,
}

impl BarkNotifier {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotificationError> {
        if config.bark_device_key.trim().is_empty() {
            return Err(NotificationError::MissingKey);
        }

        let base_url = Url::parse(&config.bark_base_url)
            .map_err(|e| NotificationError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(NotificationError::InvalidUrl(config.bark_base_url.clone()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url,
            device_key: config.bark_device_key.trim().to_string(),
            group: config.group.clone(),
        })
    }

    /// Push URL for one notification. Path segments are percent-encoded.
    pub fn url(&self, notification: &AlertNotification) -> Result<Url, NotificationError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NotificationError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(&self.device_key)
            .push(&notification.title)
            .push(&notification.body());

        url.query_pairs_mut()
            .append_pair("group", &self.group)
            .append_pair("level", bark_level(notification.level))
            .append_pair("sound", bark_sound(notification.level));

        Ok(url)
    }

    async fn send(&self, notification: &AlertNotification) -> Result<(), NotificationError> {
        let response = self.client.get(self.url(notification)?).send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

#[async_trait]
impl AlertNotifier for BarkNotifier {
    async fn notify(&self, notification: AlertNotification) -> NotificationResult {
        match self.send(&notification).await {
            Ok(()) => {
                tracing::info!(alert_type = %notification.key, "Alert notification sent");
                NotificationResult::Sent
            }
            Err(e) => NotificationResult::Failed(e.to_string()),
        }
    }
}

/// Bark when enabled and configured, otherwise a no-op notifier.
pub fn notifier_from_config(config: &NotificationConfig) -> Arc<dyn AlertNotifier> {
    if !config.enabled {
        return Arc::new(NoopNotifier);
    }

    match BarkNotifier::new(config) {
        Ok(bark) => Arc::new(bark),
        Err(e) => {
            tracing::warn!(error = %e, "Bark notifications disabled");
            Arc::new(NoopNotifier)
        }
    }
}
