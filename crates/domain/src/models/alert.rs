//! Alert domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Fault condition an alert is raised for. Keyed per device; at most one open per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertKind {
    WifiSignal,
    SimError(i16),
    SlotModuleError(i16),
    SimSignal(i16),
}

impl AlertKind {
    /// Stored alert type, e.g. `sim_error_2`.
    pub fn key(&self) -> String {
        match self {
            AlertKind::WifiSignal => "wifi_signal".to_string(),
            AlertKind::SimError(slot) => format!("sim_error_{}", slot),
            AlertKind::SlotModuleError(slot) => format!("slot_module_error_{}", slot),
            AlertKind::SimSignal(slot) => format!("sim_signal_{}", slot),
        }
    }

    /// Push notification title.
    pub fn title(&self) -> String {
        match self {
            AlertKind::WifiSignal => "WiFi signal weak".to_string(),
            AlertKind::SimError(slot) => format!("SIM slot {} error", slot),
            AlertKind::SlotModuleError(slot) => format!("Slot {} module fault", slot),
            AlertKind::SimSignal(slot) => format!("SIM slot {} signal weak", slot),
        }
    }
}

impl FromStr for AlertKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "wifi_signal" {
            return Ok(AlertKind::WifiSignal);
        }

        let slot_of = |prefix: &str| -> Option<i16> {
            s.strip_prefix(prefix).and_then(|n| n.parse::<i16>().ok())
        };

        if let Some(slot) = slot_of("slot_module_error_") {
            Ok(AlertKind::SlotModuleError(slot))
        } else if let Some(slot) = slot_of("sim_error_") {
            Ok(AlertKind::SimError(slot))
        } else if let Some(slot) = slot_of("sim_signal_") {
            Ok(AlertKind::SimSignal(slot))
        } else {
            Err(format!("Unknown alert type: {}", s))
        }
    }
}

/// Alert severity, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertLevel::Info => "info",
            AlertLevel::Warning => "warning",
            AlertLevel::Error => "error",
            AlertLevel::Critical => "critical",
        }
    }
}

impl FromStr for AlertLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(AlertLevel::Info),
            "warning" => Ok(AlertLevel::Warning),
            "error" => Ok(AlertLevel::Error),
            "critical" => Ok(AlertLevel::Critical),
            _ => Err(format!("Unknown alert level: {}", s)),
        }
    }
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: i64,
    pub device_id: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub message: String,
    pub level: AlertLevel,
    pub is_resolved: bool,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub device_id: String,
    pub kind: AlertKind,
    pub message: String,
    pub level: AlertLevel,
}

/// Query filter for listing alerts.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertFilter {
    #[serde(default)]
    pub unresolved_only: bool,
    pub limit: Option<i64>,
}

/// Classifies a signal reading against the weak and critical thresholds.
///
/// Returns `None` when the signal is at or above `weak_dbm`.
pub fn signal_level(dbm: i32, weak_dbm: i32, critical_dbm: i32) -> Option<AlertLevel> {
    if dbm < critical_dbm {
        Some(AlertLevel::Critical)
    } else if dbm < weak_dbm {
        Some(AlertLevel::Warning)
    } else {
        None
    }
}
