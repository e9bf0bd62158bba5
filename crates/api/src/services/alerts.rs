//! Alert sink.
//!
//! Opens deduplicated alerts, resolves them on recovery and forwards newly
//! opened alerts to the push notifier on a background task.

use std::sync::Arc;

use chrono::Utc;
use domain::models::alert::signal_level;
use domain::models::{Alert, AlertFilter, AlertKind, AlertLevel, NewAlert};
use domain::services::notification::{AlertNotification, AlertNotifier, NotificationResult};
use domain::store::{AlertStore, DeviceStore};
use domain::StoreError;

use crate::config::AlertsConfig;
use crate::middleware::metrics::record_alert_opened;

pub struct AlertSink {
    alerts: Arc<dyn AlertStore>,
    devices: Arc<dyn DeviceStore>,
    notifier: Arc<dyn AlertNotifier>,
    settings: AlertsConfig,
}

impl AlertSink {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        devices: Arc<dyn DeviceStore>,
        notifier: Arc<dyn AlertNotifier>,
        settings: AlertsConfig,
    ) -> Self {
        Self {
            alerts,
            devices,
            notifier,
            settings,
        }
    }

    /// Opens an alert unless one of the same kind is already open for the
    /// device. Returns the new alert, or `None` when suppressed.
    pub async fn raise(
        &self,
        device_id: &str,
        kind: AlertKind,
        level: AlertLevel,
        message: String,
    ) -> Result<Option<Alert>, StoreError> {
        let opened = self
            .alerts
            .open_if_absent(
                NewAlert {
                    device_id: device_id.to_string(),
                    kind,
                    message: message.clone(),
                    level,
                },
                Utc::now(),
            )
            .await?;

        let Some(alert) = opened else {
            tracing::debug!(device_id = %device_id, alert_type = %kind.key(), "Alert already open");
            return Ok(None);
        };

        tracing::info!(
            device_id = %device_id,
            alert_id = alert.id,
            alert_type = %alert.alert_type,
            level = %level,
            "Alert opened"
        );
        record_alert_opened(alert.alert_type.clone());

        if level >= self.settings.notify_min_level {
            self.notify_in_background(device_id, kind, level, message);
        }

        Ok(Some(alert))
    }

    /// Resolves the open alert of this kind, if any.
    pub async fn clear(&self, device_id: &str, kind: AlertKind) -> Result<u64, StoreError> {
        let resolved = self
            .alerts
            .resolve_type(device_id, &kind.key(), Utc::now())
            .await?;
        if resolved > 0 {
            tracing::info!(device_id = %device_id, alert_type = %kind.key(), "Alert resolved");
        }
        Ok(resolved)
    }

    /// Applies the weak-signal rule: below the thresholds opens an alert,
    /// recovery resolves it.
    pub async fn evaluate_signal(
        &self,
        device_id: &str,
        kind: AlertKind,
        dbm: i32,
    ) -> Result<(), StoreError> {
        match signal_level(
            dbm,
            self.settings.weak_signal_dbm,
            self.settings.critical_signal_dbm,
        ) {
            Some(level) => {
                self.raise(device_id, kind, level, signal_message(kind, dbm))
                    .await?;
            }
            None => {
                self.clear(device_id, kind).await?;
            }
        }
        Ok(())
    }

    pub async fn resolve(&self, id: i64) -> Result<Option<Alert>, StoreError> {
        self.alerts.resolve(id, Utc::now()).await
    }

    pub async fn list(&self, filter: &AlertFilter) -> Result<Vec<Alert>, StoreError> {
        let limit = filter.limit.unwrap_or(50).clamp(1, 200);
        self.alerts.list(filter, limit).await
    }

    fn notify_in_background(
        &self,
        device_id: &str,
        kind: AlertKind,
        level: AlertLevel,
        message: String,
    ) {
        let notifier = self.notifier.clone();
        let devices = self.devices.clone();
        let device_id = device_id.to_string();

        tokio::spawn(async move {
            let device_name = match devices.find(&device_id).await {
                Ok(device) => device.map(|d| d.name),
                Err(e) => {
                    tracing::debug!(device_id = %device_id, error = %e, "Device lookup failed");
                    None
                }
            };

            let notification = AlertNotification {
                key: kind.key(),
                title: kind.title(),
                message,
                device_name,
                level,
            };

            if let NotificationResult::Failed(reason) = notifier.notify(notification).await {
                tracing::warn!(
                    device_id = %device_id,
                    alert_type = %kind.key(),
                    reason = %reason,
                    "Alert notification failed"
                );
            }
        });
    }
}

/// Human-readable message for a weak-signal alert.
pub fn signal_message(kind: AlertKind, dbm: i32) -> String {
    match kind {
        AlertKind::SimSignal(slot) => format!("SIM Slot {} Signal Weak: {}dBm", slot, dbm),
        _ => format!("Wifi Signal Weak: {}dBm", dbm),
    }
}
