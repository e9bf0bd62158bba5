//! Device registry entities (database row mappings).

use chrono::{DateTime, Utc};
use domain::models::{Device, DeviceStatus, DeviceStatusSample, SimStatus, Slot};
use sqlx::FromRow;

/// Database row mapping for the devices table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceEntity {
    pub id: String,
    pub name: String,
    pub ip: Option<String>,
    pub token: Option<String>,
    pub status: String,
    pub last_seen: Option<DateTime<Utc>>,
    pub auto_answer: bool,
    pub tts_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DeviceEntity> for Device {
    fn from(entity: DeviceEntity) -> Self {
        Self {
            id: entity.id,
            name: entity.name,
            ip: entity.ip,
            token: entity.token,
            status: entity.status.parse().unwrap_or(DeviceStatus::Offline),
            last_seen: entity.last_seen,
            auto_answer: entity.auto_answer,
            tts_content: entity.tts_content,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the slots table.
#[derive(Debug, Clone, FromRow)]
pub struct SlotEntity {
    pub device_id: String,
    pub slot_num: i16,
    pub sim_status: String,
    pub operator: Option<String>,
    pub signal_strength: Option<i32>,
    pub iccid: Option<String>,
    pub imsi: Option<String>,
    pub phone_number: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl From<SlotEntity> for Slot {
    fn from(entity: SlotEntity) -> Self {
        Self {
            device_id: entity.device_id,
            slot_num: entity.slot_num,
            sim_status: SimStatus::parse(&entity.sim_status),
            operator: entity.operator,
            signal_strength: entity.signal_strength,
            iccid: entity.iccid,
            imsi: entity.imsi,
            phone_number: entity.phone_number,
            updated_at: entity.updated_at,
        }
    }
}

/// Database row mapping for the device_status table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceStatusEntity {
    pub id: i64,
    pub device_id: String,
    pub wifi_ssid: Option<String>,
    pub wifi_strength: Option<i32>,
    pub temperature: Option<f64>,
    pub uptime_secs: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl From<DeviceStatusEntity> for DeviceStatusSample {
    fn from(entity: DeviceStatusEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            wifi_ssid: entity.wifi_ssid,
            wifi_strength: entity.wifi_strength,
            temperature: entity.temperature,
            uptime_secs: entity.uptime_secs,
            timestamp: entity.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(status: &str) -> DeviceEntity {
        DeviceEntity {
            id: "dev-0001".to_string(),
            name: "Device 0001".to_string(),
            ip: Some("10.0.0.5".to_string()),
            token: None,
            status: status.to_string(),
            last_seen: None,
            auto_answer: false,
            tts_content: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_device_entity_to_domain() {
        let device: Device = entity("online").into();
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.ip.as_deref(), Some("10.0.0.5"));
    }

    #[test]
    fn test_unknown_status_reads_as_offline() {
        let device: Device = entity("rebooting").into();
        assert_eq!(device.status, DeviceStatus::Offline);
    }

    #[test]
    fn test_slot_entity_parses_sim_status() {
        let slot: Slot = SlotEntity {
            device_id: "dev-0001".to_string(),
            slot_num: 2,
            sim_status: "PUK".to_string(),
            operator: Some("46001".to_string()),
            signal_strength: Some(-87),
            iccid: None,
            imsi: None,
            phone_number: None,
            updated_at: Utc::now(),
        }
        .into();
        assert_eq!(slot.sim_status, SimStatus::PukLocked);
        assert_eq!(slot.signal_strength, Some(-87));
    }
}
