//! SMS ledger model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use validator::{Validate, ValidationError};

use super::task::{BatchSmsMessage, MAX_DELAY_MINUTES};
use crate::error::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsDirection {
    Incoming,
    Outgoing,
}

impl SmsDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsDirection::Incoming => "incoming",
            SmsDirection::Outgoing => "outgoing",
        }
    }
}

impl FromStr for SmsDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(SmsDirection::Incoming),
            "outgoing" => Ok(SmsDirection::Outgoing),
            _ => Err(format!("Unknown SMS direction: {}", s)),
        }
    }
}

/// Outgoing messages move pending → sent → delivered | failed; incoming ones are `received`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsStatus {
    Pending,
    Sent,
    Delivered,
    Failed,
    Received,
}

impl SmsStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsStatus::Pending => "pending",
            SmsStatus::Sent => "sent",
            SmsStatus::Delivered => "delivered",
            SmsStatus::Failed => "failed",
            SmsStatus::Received => "received",
        }
    }
}

impl FromStr for SmsStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SmsStatus::Pending),
            "sent" => Ok(SmsStatus::Sent),
            "delivered" => Ok(SmsStatus::Delivered),
            "failed" => Ok(SmsStatus::Failed),
            "received" => Ok(SmsStatus::Received),
            _ => Err(format!("Unknown SMS status: {}", s)),
        }
    }
}

/// Content category assigned by the SMS classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsCategory {
    Verification,
    Bank,
    Promotion,
    Express,
    General,
}

impl SmsCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SmsCategory::Verification => "verification",
            SmsCategory::Bank => "bank",
            SmsCategory::Promotion => "promotion",
            SmsCategory::Express => "express",
            SmsCategory::General => "general",
        }
    }
}

impl FromStr for SmsCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verification" => Ok(SmsCategory::Verification),
            "bank" => Ok(SmsCategory::Bank),
            "promotion" => Ok(SmsCategory::Promotion),
            "express" => Ok(SmsCategory::Express),
            "general" => Ok(SmsCategory::General),
            _ => Err(format!("Unknown SMS category: {}", s)),
        }
    }
}

/// Structured fields pulled out of message content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
}

impl ExtractedData {
    pub fn is_empty(&self) -> bool {
        self == &ExtractedData::default()
    }
}

/// An SMS row. For outgoing messages the id is the dispatch transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsMessage {
    pub id: String,
    pub device_id: String,
    pub slot_num: i16,
    pub direction: SmsDirection,
    pub phone: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: SmsStatus,
    pub is_read: bool,
    pub category: Option<SmsCategory>,
    pub extracted_data: Option<ExtractedData>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSms {
    pub id: String,
    pub device_id: String,
    pub slot_num: i16,
    pub direction: SmsDirection,
    pub phone: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub status: SmsStatus,
    pub category: Option<SmsCategory>,
    pub extracted_data: Option<ExtractedData>,
}

/// Query filter for listing messages.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmsFilter {
    pub device_id: Option<String>,
    pub direction: Option<SmsDirection>,
    pub category: Option<SmsCategory>,
    pub limit: Option<i64>,
}

/// Request payload for sending an SMS through a device.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendSmsRequest {
    #[validate(length(min = 1, message = "deviceId is required"))]
    pub device_id: String,

    #[serde(default = "default_slot")]
    #[validate(range(min = 1, max = 2, message = "Slot must be 1 or 2"))]
    pub slot: i16,

    #[validate(custom(function = "shared::validation::validate_phone_number"))]
    pub phone: String,

    #[validate(length(min = 1, max = 1000, message = "Content must be 1 to 1000 characters"))]
    pub content: String,
}

fn default_slot() -> i16 {
    1
}

/// Most numbers one batch request may fan out to.
pub const MAX_BATCH_PHONES: usize = 1000;

/// A device and slot that sends its share of a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSmsSender {
    pub device_id: String,
    #[serde(default = "default_slot")]
    pub slot: i16,
}

/// `phones` accepts one number or a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PhoneList {
    One(String),
    Many(Vec<String>),
}

impl PhoneList {
    pub fn numbers(&self) -> Vec<String> {
        match self {
            PhoneList::One(phone) => vec![phone.trim().to_string()],
            PhoneList::Many(phones) => phones.iter().map(|p| p.trim().to_string()).collect(),
        }
    }
}

/// Every device sends `content` to every phone, now or at `scheduledTime`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BatchSmsRequest {
    #[validate(custom(function = "validate_senders"))]
    pub devices: Vec<BatchSmsSender>,

    #[validate(custom(function = "validate_phone_list"))]
    pub phones: PhoneList,

    #[validate(length(min = 1, max = 1000, message = "Content must be 1 to 1000 characters"))]
    pub content: String,

    /// Seconds between consecutive sends.
    #[serde(default)]
    #[validate(range(max = 3600, message = "Interval must be at most 3600 seconds"))]
    pub interval: u64,

    pub scheduled_time: Option<DateTime<Utc>>,
}

impl BatchSmsRequest {
    /// One message per device and phone, devices outermost. Ids are left to
    /// the caller.
    pub fn fan_out(&self) -> Vec<BatchSmsMessage> {
        let phones = self.phones.numbers();
        self.devices
            .iter()
            .flat_map(|sender| {
                phones.iter().map(move |phone| BatchSmsMessage {
                    id: None,
                    device_id: sender.device_id.clone(),
                    slot: sender.slot,
                    phone: phone.clone(),
                    content: self.content.clone(),
                })
            })
            .collect()
    }

    /// Whole minutes from `now` until `scheduledTime`, never negative.
    /// `None` means send now.
    pub fn delay_minutes(&self, now: DateTime<Utc>) -> Result<Option<i64>, GatewayError> {
        let Some(at) = self.scheduled_time else {
            return Ok(None);
        };
        let minutes = (at - now).num_minutes().max(0);
        if minutes > MAX_DELAY_MINUTES {
            return Err(GatewayError::Validation(format!(
                "scheduledTime is more than {} minutes away",
                MAX_DELAY_MINUTES
            )));
        }
        Ok(Some(minutes))
    }
}

fn validate_senders(devices: &[BatchSmsSender]) -> Result<(), ValidationError> {
    if devices.is_empty() {
        let mut err = ValidationError::new("devices_required");
        err.message = Some("At least one device is required".into());
        return Err(err);
    }
    if devices
        .iter()
        .any(|d| d.device_id.trim().is_empty() || !(1..=2).contains(&d.slot))
    {
        let mut err = ValidationError::new("device_invalid");
        err.message = Some("Each device needs a deviceId and slot 1 or 2".into());
        return Err(err);
    }
    Ok(())
}

fn validate_phone_list(phones: &PhoneList) -> Result<(), ValidationError> {
    let numbers = phones.numbers();
    if numbers.is_empty() || numbers.len() > MAX_BATCH_PHONES {
        let mut err = ValidationError::new("phones_count");
        err.message = Some(
            format!("Between 1 and {} phone numbers are required", MAX_BATCH_PHONES).into(),
        );
        return Err(err);
    }
    numbers
        .iter()
        .try_for_each(|n| shared::validation::validate_phone_number(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracted_data_serializes_only_present_fields() {
        let data = ExtractedData {
            verification_code: Some("4821".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json, serde_json::json!({"verificationCode": "4821"}));
        assert!(!data.is_empty());
        assert!(ExtractedData::default().is_empty());
    }

    #[test]
    fn test_send_request_defaults_slot() {
        let req: SendSmsRequest = serde_json::from_str(
            r#"{"deviceId":"dev-1","phone":"+10000000000","content":"hi"}"#,
        )
        .unwrap();
        assert_eq!(req.slot, 1);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_send_request_rejects_bad_phone_and_slot() {
        let req: SendSmsRequest = serde_json::from_str(
            r#"{"deviceId":"dev-1","slot":3,"phone":"nope","content":"hi"}"#,
        )
        .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("slot"));
        assert!(fields.contains_key("phone"));
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("bank".parse::<SmsCategory>().unwrap(), SmsCategory::Bank);
        assert!("spam".parse::<SmsCategory>().is_err());
    }

    #[test]
    fn test_batch_request_fans_out_devices_by_phones() {
        let req: BatchSmsRequest = serde_json::from_value(serde_json::json!({
            "devices": [{"deviceId": "a", "slot": 2}, {"deviceId": "b"}],
            "phones": ["5550001", " 5550002 "],
            "content": "hello"
        }))
        .unwrap();
        assert!(req.validate().is_ok());

        let messages = req.fan_out();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].device_id, "a");
        assert_eq!(messages[0].slot, 2);
        assert_eq!(messages[1].phone, "5550002");
        assert_eq!(messages[3].device_id, "b");
        assert_eq!(messages[3].slot, 1);
        assert!(messages.iter().all(|m| m.id.is_none()));
    }

    #[test]
    fn test_batch_request_accepts_single_phone() {
        let req: BatchSmsRequest = serde_json::from_value(serde_json::json!({
            "devices": [{"deviceId": "a"}],
            "phones": "5550001",
            "content": "hello"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.fan_out().len(), 1);
    }

    #[test]
    fn test_batch_request_validation() {
        let req: BatchSmsRequest = serde_json::from_value(serde_json::json!({
            "devices": [],
            "phones": [],
            "content": ""
        }))
        .unwrap();
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("devices"));
        assert!(fields.contains_key("phones"));
        assert!(fields.contains_key("content"));
    }

    #[test]
    fn test_batch_request_delay_minutes() {
        use chrono::{Duration, TimeZone};

        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut req: BatchSmsRequest = serde_json::from_value(serde_json::json!({
            "devices": [{"deviceId": "a"}],
            "phones": "5550001",
            "content": "hello"
        }))
        .unwrap();
        assert_eq!(req.delay_minutes(now).unwrap(), None);

        req.scheduled_time = Some(now + Duration::seconds(90 * 60 + 30));
        assert_eq!(req.delay_minutes(now).unwrap(), Some(90));

        req.scheduled_time = Some(now - Duration::hours(1));
        assert_eq!(req.delay_minutes(now).unwrap(), Some(0));

        req.scheduled_time = Some(Utc.with_ymd_and_hms(9000, 1, 1, 0, 0, 0).unwrap());
        assert!(req.delay_minutes(now).is_err());
    }
}
