//! SIM slot domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SIM state as reported by the gateway firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SimStatus {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ERR")]
    Err,
    #[serde(rename = "NOSIM")]
    NoSim,
    #[serde(rename = "PUK")]
    PukLocked,
    #[serde(rename = "NOSRV")]
    NoService,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl SimStatus {
    /// Parses a firmware status string. Unrecognised values map to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_uppercase();

        match normalized.as_str() {
            "OK" | "READY" => SimStatus::Ok,
            "ERR" | "ERROR" => SimStatus::Err,
            "NOSIM" | "NONE" | "ABSENT" => SimStatus::NoSim,
            "PUK" | "PUKLOCKED" | "PUKLOCK" => SimStatus::PukLocked,
            "NOSRV" | "NOSERVICE" | "NOSVC" => SimStatus::NoService,
            _ => SimStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SimStatus::Ok => "OK",
            SimStatus::Err => "ERR",
            SimStatus::NoSim => "NOSIM",
            SimStatus::PukLocked => "PUK",
            SimStatus::NoService => "NOSRV",
            SimStatus::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for SimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One SIM bay of a device, unique per (device_id, slot_num).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub device_id: String,
    pub slot_num: i16,
    pub sim_status: SimStatus,
    pub operator: Option<String>,
    pub signal_strength: Option<i32>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub phone_number: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Partial slot telemetry. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotUpdate {
    pub sim_status: Option<SimStatus>,
    pub operator: Option<String>,
    pub signal_strength: Option<i32>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub phone_number: Option<String>,
}

impl SlotUpdate {
    pub fn status(sim_status: SimStatus) -> Self {
        Self {
            sim_status: Some(sim_status),
            ..Default::default()
        }
    }
}
