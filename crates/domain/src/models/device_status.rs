//! Device status time series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Append-only status sample pushed with a heartbeat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceStatusSample {
    pub id: i64,
    pub device_id: String,
    pub wifi_ssid: Option<String>,
    pub wifi_strength: Option<i32>,
    pub temperature: Option<f64>,
    pub uptime_secs: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

/// Values for a new status sample.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewStatusSample {
    pub device_id: String,
    pub wifi_ssid: Option<String>,
    pub wifi_strength: Option<i32>,
    pub temperature: Option<f64>,
    pub uptime_secs: Option<i64>,
}

impl NewStatusSample {
    /// Whether the sample carries any signal information worth storing.
    pub fn has_signal(&self) -> bool {
        self.wifi_ssid.is_some() || self.wifi_strength.is_some()
    }
}
