//! Device push events.
//!
//! Gateway firmware pushes loosely typed JSON whose field names and value
//! types drift between firmware versions. Every logical value is read through
//! [`Fields`], which tries a list of alternative names in order and accepts
//! numbers, floats or numeric strings for numeric values. [`classify`] then
//! turns a payload into a [`DeviceEvent`] by priority-ordered matching on the
//! `type` code and the presence of nested blocks.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use super::slot::{SimStatus, SlotUpdate};

/// Event type codes used by the gateway firmware.
pub mod codes {
    pub const WIFI_STATUS: i64 = 100;
    pub const SIM1_NETWORK: i64 = 101;
    pub const SIM2_NETWORK: i64 = 102;
    pub const SIM_READY: i64 = 204;
    pub const SIM_INFO: i64 = 203;
    pub const SIM_ERROR: i64 = 209;
    pub const SLOT_MODULE_ERROR: i64 = 301;
    pub const SMS_RECEIVED: i64 = 501;
    pub const SMS_SENT: i64 = 502;
    pub const CALL_RINGING: i64 = 601;
    pub const CALL_HANGUP: i64 = 603;
    pub const HEARTBEAT: i64 = 998;
    pub const COMMAND_RESULT: i64 = 999;
}

/// Field-name variants observed across firmware versions.
pub mod fields {
    pub const DEVICE_ID: &[&str] = &["devId", "devid", "deviceId"];
    pub const TYPE: &[&str] = &["type"];
    pub const SLOT: &[&str] = &["slot", "slotNum"];
    pub const SMS_PHONE: &[&str] = &["phone", "phNum", "from"];
    pub const CONTENT: &[&str] = &["content", "msg"];
    pub const SMS_TIME: &[&str] = &["msgTs", "ts", "devTime"];
    pub const CALL_PHONE: &[&str] = &["phNum", "phone"];
    pub const CALL_START: &[&str] = &["startTm", "startTime"];
    pub const CALL_END: &[&str] = &["endTm", "endTime"];
    pub const TID: &[&str] = &["tid"];
    pub const IP: &[&str] = &["ip"];
    pub const SSID: &[&str] = &["ssid"];
    pub const DBM: &[&str] = &["dbm", "rssi"];
    pub const TEMPERATURE: &[&str] = &["temp", "temperature"];
    pub const UPTIME: &[&str] = &["uptime", "upTime"];
    pub const IMSI: &[&str] = &["imsi"];
    pub const ICCID: &[&str] = &["iccid", "iccId"];
    pub const MSISDN: &[&str] = &["msIsdn", "msisdn"];
    pub const OPERATOR: &[&str] = &["operator", "op"];
    pub const SIM_STATUS: &[&str] = &["sta", "simSta"];
    pub const WIFI_BLOCK: &str = "wifi";
    pub const SLOT_BLOCK: &str = "slot";
}

/// Parses an integer from a JSON number, float, or string with a leading integer.
pub fn int_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => leading_int(s),
        _ => None,
    }
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// Reads a string from a JSON string or number.
pub fn string_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parses epoch seconds (number or numeric string), epoch milliseconds, RFC 3339
/// or `YYYY-MM-DD HH:MM:SS`.
pub fn timestamp_value(value: &Value) -> Option<DateTime<Utc>> {
    let from_epoch = |n: i64| {
        // Values past year 2286 in seconds are millisecond stamps.
        if n.abs() >= 10_000_000_000 {
            Utc.timestamp_millis_opt(n).single()
        } else {
            Utc.timestamp_opt(n, 0).single()
        }
    };

    match value {
        Value::Number(_) => int_value(value).and_then(from_epoch),
        Value::String(s) => {
            let s = s.trim();
            if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
                return s.parse::<i64>().ok().and_then(from_epoch);
            }
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive))
                })
        }
        _ => None,
    }
}

/// Borrowed view over one JSON object with variant-tolerant accessors.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a>(&'a Map<String, Value>);

impl<'a> Fields<'a> {
    pub fn new(map: &'a Map<String, Value>) -> Self {
        Self(map)
    }

    /// First present value among `keys`, skipping nulls and empty strings.
    pub fn get<K: AsRef<str>>(&self, keys: &[K]) -> Option<&'a Value> {
        keys.iter().find_map(|k| {
            self.0.get(k.as_ref()).filter(|v| match v {
                Value::Null => false,
                Value::String(s) => !s.trim().is_empty(),
                _ => true,
            })
        })
    }

    /// First value among `keys` that parses as an integer.
    pub fn int<K: AsRef<str>>(&self, keys: &[K]) -> Option<i64> {
        keys.iter()
            .filter_map(|k| self.0.get(k.as_ref()))
            .find_map(int_value)
    }

    pub fn string<K: AsRef<str>>(&self, keys: &[K]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.0.get(k.as_ref()))
            .find_map(string_value)
    }

    pub fn timestamp<K: AsRef<str>>(&self, keys: &[K]) -> Option<DateTime<Utc>> {
        keys.iter()
            .filter_map(|k| self.0.get(k.as_ref()))
            .find_map(timestamp_value)
    }

    pub fn object(&self, key: &str) -> Option<Fields<'a>> {
        self.0.get(key).and_then(Value::as_object).map(Fields)
    }

    pub fn has(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    fn slot(&self, default: i16) -> i16 {
        self.int(fields::SLOT)
            .and_then(|n| i16::try_from(n).ok())
            .filter(|n| *n > 0)
            .unwrap_or(default)
    }

    fn signal(&self, keys: &[impl AsRef<str>]) -> Option<i32> {
        self.int(keys).and_then(|n| i32::try_from(n).ok())
    }
}

/// A raw event as pushed by a device.
#[derive(Debug, Clone)]
pub struct EventPayload {
    body: Map<String, Value>,
}

impl EventPayload {
    /// Wraps a JSON value. Returns `None` when it is not an object.
    pub fn new(value: Value) -> Option<Self> {
        match value {
            Value::Object(body) => Some(Self { body }),
            _ => None,
        }
    }

    pub fn fields(&self) -> Fields<'_> {
        Fields::new(&self.body)
    }

    pub fn device_id(&self) -> Option<String> {
        self.fields().string(fields::DEVICE_ID)
    }

    pub fn event_type(&self) -> Option<i64> {
        self.fields().int(fields::TYPE)
    }

    pub fn raw(&self) -> Value {
        Value::Object(self.body.clone())
    }
}

/// Network information carried by heartbeats and status reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WifiInfo {
    pub ip: Option<String>,
    pub ssid: Option<String>,
    pub dbm: Option<i32>,
    pub temperature: Option<f64>,
    pub uptime_secs: Option<i64>,
}

impl WifiInfo {
    /// Reads the nested `wifi` block, falling back to flat fields.
    fn from_payload(root: Fields<'_>) -> Self {
        let wifi = root.object(fields::WIFI_BLOCK);
        let pick_string = |keys: &[&str]| {
            wifi.and_then(|w| w.string(keys))
                .or_else(|| root.string(keys))
        };
        let pick_int = |keys: &[&str]| wifi.and_then(|w| w.int(keys)).or_else(|| root.int(keys));

        Self {
            ip: pick_string(fields::IP),
            ssid: pick_string(fields::SSID),
            dbm: pick_int(fields::DBM).and_then(|n| i32::try_from(n).ok()),
            temperature: root
                .get(fields::TEMPERATURE)
                .and_then(|v| v.as_f64().or_else(|| int_value(v).map(|n| n as f64))),
            uptime_secs: root.int(fields::UPTIME),
        }
    }
}

/// Per-slot telemetry from the nested `slot` block of a status report.
///
/// Keys come in several spellings: `sim1_op`/`sim1op`, `sim1_iccId`/`sim1iccid`, etc.
pub struct SlotTelemetry;

impl SlotTelemetry {
    fn variants(n: i16, field: &str) -> Vec<String> {
        vec![format!("sim{}_{}", n, field), format!("sim{}{}", n, field)]
    }

    /// Reads slot `n`. Returns `None` unless the block reports `slot<n>_sta`.
    pub fn from_block(block: Fields<'_>, n: i16) -> Option<SlotUpdate> {
        let slot_state = block.string(&[format!("slot{}_sta", n), format!("slot{}sta", n)])?;

        let sim_status = block
            .string(&Self::variants(n, "sta"))
            .map(|s| SimStatus::parse(&s))
            .unwrap_or_else(|| match SimStatus::parse(&slot_state) {
                SimStatus::Err => SimStatus::Err,
                _ => SimStatus::Ok,
            });

        let mut iccid = Self::variants(n, "iccId");
        iccid.extend(Self::variants(n, "iccid"));
        let mut msisdn = Self::variants(n, "msIsdn");
        msisdn.extend(Self::variants(n, "msisdn"));

        Some(SlotUpdate {
            sim_status: Some(sim_status),
            operator: block.string(&Self::variants(n, "op")),
            signal_strength: block.signal(&Self::variants(n, "dbm")),
            iccid: block.string(&iccid),
            imsi: block.string(&Self::variants(n, "imsi")),
            phone_number: block.string(&msisdn),
        })
    }

    /// Reads both slots of a block.
    pub fn all(block: Fields<'_>) -> Vec<(i16, SlotUpdate)> {
        [1, 2]
            .into_iter()
            .filter_map(|n| Self::from_block(block, n).map(|u| (n, u)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingSms {
    pub slot: i16,
    pub phone: String,
    pub content: String,
    /// `None` when the device sent no parseable time.
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CallEvent {
    pub slot: i16,
    pub phone: String,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

/// A classified device event.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// Command result carrying per-slot telemetry.
    StatusReport {
        slots: Vec<(i16, SlotUpdate)>,
        wifi: Option<WifiInfo>,
    },
    Heartbeat(WifiInfo),
    SmsReceived(IncomingSms),
    SmsSent {
        tid: Option<String>,
    },
    CallRinging(CallEvent),
    CallHangup(CallEvent),
    SimReady {
        slot: i16,
    },
    SimError {
        slot: i16,
    },
    SlotModuleError {
        slot: i16,
    },
    SimInfo {
        slot: i16,
        update: SlotUpdate,
    },
    Unknown {
        event_type: Option<i64>,
    },
}

impl DeviceEvent {
    /// Label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DeviceEvent::StatusReport { .. } => "status_report",
            DeviceEvent::Heartbeat(_) => "heartbeat",
            DeviceEvent::SmsReceived(_) => "sms_received",
            DeviceEvent::SmsSent { .. } => "sms_sent",
            DeviceEvent::CallRinging(_) => "call_ringing",
            DeviceEvent::CallHangup(_) => "call_hangup",
            DeviceEvent::SimReady { .. } => "sim_ready",
            DeviceEvent::SimError { .. } => "sim_error",
            DeviceEvent::SlotModuleError { .. } => "slot_module_error",
            DeviceEvent::SimInfo { .. } => "sim_info",
            DeviceEvent::Unknown { .. } => "unknown",
        }
    }
}

fn call_event(root: Fields<'_>) -> CallEvent {
    let epoch = DateTime::<Utc>::default();
    CallEvent {
        slot: root.slot(1),
        phone: root
            .string(fields::CALL_PHONE)
            .unwrap_or_else(|| "unknown".to_string()),
        start: root.timestamp(fields::CALL_START).unwrap_or(epoch),
        end: root.timestamp(fields::CALL_END),
    }
}

/// Classifies a payload. Order matters: a 999 carrying a slot block is a
/// status report; any 998, 100 or payload with a `wifi` block is a heartbeat;
/// then exact codes; anything else is unknown.
pub fn classify(payload: &EventPayload) -> DeviceEvent {
    let root = payload.fields();
    let code = payload.event_type();

    if code == Some(codes::COMMAND_RESULT) {
        if let Some(block) = root.object(fields::SLOT_BLOCK) {
            return DeviceEvent::StatusReport {
                slots: SlotTelemetry::all(block),
                wifi: root
                    .has(fields::WIFI_BLOCK)
                    .then(|| WifiInfo::from_payload(root)),
            };
        }
    }

    if matches!(code, Some(codes::HEARTBEAT) | Some(codes::WIFI_STATUS))
        || root.object(fields::WIFI_BLOCK).is_some()
    {
        return DeviceEvent::Heartbeat(WifiInfo::from_payload(root));
    }

    match code {
        Some(codes::SMS_RECEIVED) => DeviceEvent::SmsReceived(IncomingSms {
            slot: root.slot(1),
            phone: root
                .string(fields::SMS_PHONE)
                .unwrap_or_else(|| "unknown".to_string()),
            content: root.string(fields::CONTENT).unwrap_or_default(),
            timestamp: root.timestamp(fields::SMS_TIME),
        }),
        Some(codes::SMS_SENT) => DeviceEvent::SmsSent {
            tid: root.string(fields::TID),
        },
        Some(codes::CALL_RINGING) => DeviceEvent::CallRinging(call_event(root)),
        Some(codes::CALL_HANGUP) => DeviceEvent::CallHangup(call_event(root)),
        Some(codes::SIM_READY) => DeviceEvent::SimReady { slot: root.slot(1) },
        Some(codes::SIM_ERROR) => DeviceEvent::SimError { slot: root.slot(1) },
        Some(codes::SLOT_MODULE_ERROR) => DeviceEvent::SlotModuleError { slot: root.slot(1) },
        Some(c @ (codes::SIM1_NETWORK | codes::SIM2_NETWORK | codes::SIM_INFO)) => {
            let default_slot = if c == codes::SIM2_NETWORK { 2 } else { 1 };
            DeviceEvent::SimInfo {
                slot: root.slot(default_slot),
                update: SlotUpdate {
                    sim_status: root.string(fields::SIM_STATUS).map(|s| SimStatus::parse(&s)),
                    operator: root.string(fields::OPERATOR),
                    signal_strength: root.signal(fields::DBM),
                    iccid: root.string(fields::ICCID),
                    imsi: root.string(fields::IMSI),
                    phone_number: root.string(fields::MSISDN),
                },
            }
        }
        other => DeviceEvent::Unknown { event_type: other },
    }
}
