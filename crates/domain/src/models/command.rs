//! Device command model and the positional parameter schema.
//!
//! The gateway control endpoint accepts a command name plus up to seven
//! positional parameters (`p1`..`p7`). Friendly parameter names sent by
//! callers are mapped onto those positions per command.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::error::GatewayError;

/// Open parameter bag accepted alongside a command.
pub type CommandParams = Map<String, Value>;

/// Commands the gateway firmware accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandName {
    Stat,
    Restart,
    Otanow,
    Slotrst,
    Slotoff,
    Sendsms,
    Teldial,
    Telanswer,
    Telhangup,
    Telkeypress,
    Telstarttts,
    Telstoptts,
    Addwf,
    Delwf,
    Wf,
    Pingsec,
    Dailyrst,
    Dailyota,
}

impl CommandName {
    pub const ALL: [CommandName; 18] = [
        CommandName::Stat,
        CommandName::Restart,
        CommandName::Otanow,
        CommandName::Slotrst,
        CommandName::Slotoff,
        CommandName::Sendsms,
        CommandName::Teldial,
        CommandName::Telanswer,
        CommandName::Telhangup,
        CommandName::Telkeypress,
        CommandName::Telstarttts,
        CommandName::Telstoptts,
        CommandName::Addwf,
        CommandName::Delwf,
        CommandName::Wf,
        CommandName::Pingsec,
        CommandName::Dailyrst,
        CommandName::Dailyota,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CommandName::Stat => "stat",
            CommandName::Restart => "restart",
            CommandName::Otanow => "otanow",
            CommandName::Slotrst => "slotrst",
            CommandName::Slotoff => "slotoff",
            CommandName::Sendsms => "sendsms",
            CommandName::Teldial => "teldial",
            CommandName::Telanswer => "telanswer",
            CommandName::Telhangup => "telhangup",
            CommandName::Telkeypress => "telkeypress",
            CommandName::Telstarttts => "telstarttts",
            CommandName::Telstoptts => "telstoptts",
            CommandName::Addwf => "addwf",
            CommandName::Delwf => "delwf",
            CommandName::Wf => "wf",
            CommandName::Pingsec => "pingsec",
            CommandName::Dailyrst => "dailyrst",
            CommandName::Dailyota => "dailyota",
        }
    }

    /// Names of every allowed command, for error responses.
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(|c| c.as_str()).collect()
    }
}

impl FromStr for CommandName {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| GatewayError::InvalidCommand(s.to_string()))
    }
}

impl std::fmt::Display for CommandName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command lifecycle: pending → sent → success | failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Pending,
    Sent,
    Success,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Sent => "sent",
            CommandStatus::Success => "success",
            CommandStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CommandStatus::Success | CommandStatus::Failed)
    }
}

impl FromStr for CommandStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CommandStatus::Pending),
            "sent" => Ok(CommandStatus::Sent),
            "success" => Ok(CommandStatus::Success),
            "failed" => Ok(CommandStatus::Failed),
            _ => Err(format!("Unknown command status: {}", s)),
        }
    }
}

/// One dispatched command, keyed by its transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub id: String,
    pub device_id: String,
    pub command: String,
    pub params: Option<Value>,
    pub status: CommandStatus,
    pub result: Option<Value>,
    pub batch_id: Option<String>,
    pub batch_name: Option<String>,
    pub actor: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

/// Values for a new command row. Rows are always created `pending`.
#[derive(Debug, Clone)]
pub struct NewCommand {
    pub id: String,
    pub device_id: String,
    pub command: String,
    pub params: Option<Value>,
    pub batch_id: Option<String>,
    pub batch_name: Option<String>,
    pub actor: Option<String>,
}

/// Command submission body: `{command, ...params}`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(flatten)]
    pub params: CommandParams,
}

/// Positional query parameters sent to the device, in order.
pub type DeviceParams = Vec<(String, String)>;

fn value_to_param(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1".into() } else { "0".into() }),
        other => Some(other.to_string()),
    }
}

/// First non-empty value among `keys`.
fn pick(params: &CommandParams, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| params.get(*k).and_then(value_to_param))
        .find(|v| !v.is_empty())
}

fn required(
    params: &CommandParams,
    keys: &[&str],
    command: CommandName,
) -> Result<String, GatewayError> {
    pick(params, keys).ok_or_else(|| {
        GatewayError::Validation(format!("Missing {} for {}", keys[0], command))
    })
}

fn is_positional(key: &str) -> bool {
    key.len() == 2
        && key.starts_with('p')
        && key[1..].chars().all(|c| ('1'..='7').contains(&c))
}

/// Maps caller parameters onto the device's positional parameter schema.
///
/// `sendsms`, `teldial` and `telkeypress` have fixed schemas with defaults.
/// Every other command passes `p1`..`p7` and unknown keys through verbatim;
/// `slot` maps to `p1` for the slot commands.
pub fn build_device_params(
    command: CommandName,
    params: &CommandParams,
) -> Result<DeviceParams, GatewayError> {
    let mut out: DeviceParams = Vec::new();
    let mut push = |key: &str, value: String| out.push((key.to_string(), value));

    match command {
        CommandName::Sendsms => {
            push("p1", pick(params, &["slot", "p1"]).unwrap_or_else(|| "1".into()));
            push("p2", required(params, &["phone", "p2"], command)?);
            push("p3", required(params, &["content", "p3"], command)?);
        }
        CommandName::Teldial => {
            push("p1", pick(params, &["slot", "p1"]).unwrap_or_else(|| "1".into()));
            push("p2", required(params, &["phone", "p2"], command)?);
            push(
                "p3",
                pick(params, &["duration", "p3"]).unwrap_or_else(|| "175".into()),
            );
            if let Some(tts) = pick(params, &["ttsContent", "tts", "p4"]) {
                push("p4", tts);
            }
            push(
                "p5",
                pick(params, &["ttsRepeat", "p5"]).unwrap_or_else(|| "2".into()),
            );
            push(
                "p6",
                pick(params, &["ttsPause", "pause", "p6"]).unwrap_or_else(|| "1".into()),
            );
            push(
                "p7",
                pick(params, &["actionAfterTts", "action", "p7"]).unwrap_or_else(|| "1".into()),
            );
        }
        CommandName::Telkeypress => {
            push("p1", pick(params, &["slot", "p1"]).unwrap_or_else(|| "1".into()));
            push("p2", required(params, &["keys", "p2"], command)?);
            push(
                "p3",
                pick(params, &["keyDuration", "p3"]).unwrap_or_else(|| "200".into()),
            );
            push(
                "p4",
                pick(params, &["keyInterval", "p4"]).unwrap_or_else(|| "100".into()),
            );
        }
        _ => {
            let slot_command = matches!(command, CommandName::Slotrst | CommandName::Slotoff);
            let mut positional: Vec<(String, String)> = Vec::new();
            let mut extra: Vec<(String, String)> = Vec::new();

            for (key, value) in params {
                if key == "tid" {
                    continue;
                }
                let Some(value) = value_to_param(value) else {
                    continue;
                };
                if is_positional(key) {
                    positional.push((key.clone(), value));
                } else if key == "slot" && slot_command {
                    if !params.contains_key("p1") {
                        positional.push(("p1".into(), value));
                    }
                } else {
                    extra.push((key.clone(), value));
                }
            }

            positional.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, value) in positional.into_iter().chain(extra) {
                push(&key, value);
            }
        }
    }

    Ok(out)
}
