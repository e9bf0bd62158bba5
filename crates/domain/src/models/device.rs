//! Device domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::Validate;

use super::device_status::DeviceStatusSample;
use super::slot::Slot;

/// Liveness state of a gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Online,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
        }
    }
}

impl FromStr for DeviceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "online" => Ok(DeviceStatus::Online),
            "offline" => Ok(DeviceStatus::Offline),
            _ => Err(format!("Unknown device status: {}", s)),
        }
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A GSM gateway unit reachable over HTTP.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: String,
    pub name: String,
    pub ip: Option<String>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub status: DeviceStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub auto_answer: bool,
    pub tts_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Name given to a device created implicitly by its first event.
    pub fn default_name(id: &str) -> String {
        let chars: Vec<char> = id.chars().collect();
        let tail: String = chars[chars.len().saturating_sub(4)..].iter().collect();
        format!("Device {}", tail)
    }

    /// Returns the network address when one is known.
    pub fn address(&self) -> Option<&str> {
        self.ip
            .as_deref()
            .map(str::trim)
            .filter(|ip| !ip.is_empty() && *ip != "unknown")
    }
}

/// Values written when a device is registered manually.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub id: String,
    pub name: String,
    pub ip: String,
    pub token: String,
    pub status: DeviceStatus,
}

/// Request payload for manual device registration.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDeviceRequest {
    #[validate(length(min = 1, max = 255, message = "IP is required"))]
    pub ip: String,

    #[validate(length(min = 1, max = 128, message = "Token is required"))]
    pub token: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 64, message = "devId must be 1 to 64 characters"))]
    pub dev_id: Option<String>,
}

/// Partial update of a device record.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDeviceRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,

    #[validate(length(min = 1, max = 255, message = "IP must be 1 to 255 characters"))]
    pub ip: Option<String>,

    pub token: Option<String>,

    pub auto_answer: Option<bool>,

    #[validate(length(max = 500, message = "TTS content must be at most 500 characters"))]
    pub tts_content: Option<String>,
}

/// Device with its slots and most recent status sample.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Device,
    pub slots: Vec<Slot>,
    pub latest_status: Option<DeviceStatusSample>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(ip: Option<&str>) -> Device {
        Device {
            id: "dev-1".into(),
            name: "Lobby".into(),
            ip: ip.map(String::from),
            token: Some("secret".into()),
            status: DeviceStatus::Online,
            last_seen: None,
            auto_answer: false,
            tts_content: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_name_uses_last_four_chars() {
        assert_eq!(Device::default_name("860123456789"), "Device 6789");
        assert_eq!(Device::default_name("ab"), "Device ab");
    }

    #[test]
    fn test_address_filters_placeholders() {
        assert_eq!(device(Some("10.0.0.8")).address(), Some("10.0.0.8"));
        assert_eq!(device(Some("unknown")).address(), None);
        assert_eq!(device(Some("  ")).address(), None);
        assert_eq!(device(None).address(), None);
    }

    #[test]
    fn test_token_is_not_serialized() {
        let json = serde_json::to_value(device(Some("10.0.0.8"))).unwrap();
        assert!(json.get("token").is_none());
        assert_eq!(json["status"], "online");
        assert_eq!(json["autoAnswer"], false);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("ONLINE".parse::<DeviceStatus>().unwrap(), DeviceStatus::Online);
        assert!("idle".parse::<DeviceStatus>().is_err());
    }

    #[test]
    fn test_register_request_validation() {
        let req: RegisterDeviceRequest =
            serde_json::from_str(r#"{"ip":"","token":"t"}"#).unwrap();
        assert!(req.validate().is_err());

        let req: RegisterDeviceRequest =
            serde_json::from_str(r#"{"ip":"10.0.0.2","token":"t","devId":"abc"}"#).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.dev_id.as_deref(), Some("abc"));
    }
}
