//! Call ledger model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Incoming => "incoming",
            CallDirection::Outgoing => "outgoing",
        }
    }
}

impl FromStr for CallDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(CallDirection::Incoming),
            "outgoing" => Ok(CallDirection::Outgoing),
            _ => Err(format!("Unknown call direction: {}", s)),
        }
    }
}

/// Call lifecycle: ringing, then answered or missed, then completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Ringing,
    Answered,
    Missed,
    Completed,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Answered => "answered",
            CallStatus::Missed => "missed",
            CallStatus::Completed => "completed",
        }
    }

    /// Calls that a hangup event may still close.
    pub fn is_open(&self) -> bool {
        matches!(self, CallStatus::Ringing | CallStatus::Answered)
    }
}

impl FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ringing" => Ok(CallStatus::Ringing),
            "answered" => Ok(CallStatus::Answered),
            "missed" => Ok(CallStatus::Missed),
            "completed" => Ok(CallStatus::Completed),
            _ => Err(format!("Unknown call status: {}", s)),
        }
    }
}

/// Composite key joining a ringing event to its hangup.
///
/// The firmware reports no call id, so the start timestamp must match exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallKey {
    pub device_id: String,
    pub slot_num: i16,
    pub direction: CallDirection,
    pub phone: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub id: Uuid,
    pub device_id: String,
    pub slot_num: i16,
    pub direction: CallDirection,
    pub phone: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn key(&self) -> CallKey {
        CallKey {
            device_id: self.device_id.clone(),
            slot_num: self.slot_num,
            direction: self.direction,
            phone: self.phone.clone(),
            start_time: self.start_time,
        }
    }
}

/// Values for a new call row.
#[derive(Debug, Clone)]
pub struct NewCall {
    pub key: CallKey,
    pub status: CallStatus,
    pub end_time: Option<DateTime<Utc>>,
    pub duration: Option<i32>,
}

/// Call duration in whole seconds, clamped at zero when the end precedes the start.
pub fn call_duration(start: DateTime<Utc>, end: DateTime<Utc>) -> i32 {
    let secs = (end - start).num_seconds().max(0);
    i32::try_from(secs).unwrap_or(i32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_call_duration() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let end = Utc.timestamp_opt(1_700_000_042, 0).unwrap();
        assert_eq!(call_duration(start, end), 42);
    }

    #[test]
    fn test_call_duration_never_negative() {
        let start = Utc.timestamp_opt(1_700_000_042, 0).unwrap();
        let end = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        assert_eq!(call_duration(start, end), 0);
    }

    #[test]
    fn test_open_states() {
        assert!(CallStatus::Ringing.is_open());
        assert!(CallStatus::Answered.is_open());
        assert!(!CallStatus::Missed.is_open());
        assert!(!CallStatus::Completed.is_open());
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("answered".parse::<CallStatus>().unwrap(), CallStatus::Answered);
        assert!("dropped".parse::<CallStatus>().is_err());
    }

    #[test]
    fn test_call_key_identifies_one_call() {
        let key = |start| CallKey {
            device_id: "dev-1".into(),
            slot_num: 1,
            direction: CallDirection::Incoming,
            phone: "555".into(),
            start_time: Utc.timestamp_opt(start, 0).unwrap(),
        };

        let mut open = std::collections::HashSet::new();
        assert!(open.insert(key(1_700_000_000)));
        assert!(!open.insert(key(1_700_000_000)));
        assert!(open.insert(key(1_700_000_001)));
    }
}
