//! Scheduled task model and due-ness evaluation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use validator::Validate;

use super::command::{CommandName, CommandParams};
use crate::error::GatewayError;

/// Pseudo-command that sends a list of SMS messages.
pub const BATCH_SMS_COMMAND: &str = "batch_sms";

/// Schedule used when a recurring task is created without one.
pub const DEFAULT_CRON: &str = "0 4 * * *";

const DELAY_PREFIX: &str = "delay:";

/// Longest accepted delay: one hundred years.
pub const MAX_DELAY_MINUTES: i64 = 525_600 * 100;

/// When a task fires: a cron expression or a one-shot `delay:<minutes>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Schedule {
    Cron(String),
    Delay { minutes: i64 },
}

impl Schedule {
    fn cron(expr: &str) -> Result<croner::Cron, GatewayError> {
        expr.parse::<croner::Cron>()
            .map_err(|e| {
                GatewayError::Validation(format!("Invalid cron expression '{}': {}", expr, e))
            })
    }
}

impl FromStr for Schedule {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(minutes) = s.strip_prefix(DELAY_PREFIX) {
            let minutes = minutes
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|m| (0..=MAX_DELAY_MINUTES).contains(m))
                .ok_or_else(|| {
                    GatewayError::Validation(format!(
                        "Delay must be 0 to {} minutes: '{}'",
                        MAX_DELAY_MINUTES, s
                    ))
                })?;
            return Ok(Schedule::Delay { minutes });
        }

        Self::cron(s)?;
        Ok(Schedule::Cron(s.to_string()))
    }
}

impl TryFrom<String> for Schedule {
    type Error = GatewayError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Schedule> for String {
    fn from(schedule: Schedule) -> Self {
        schedule.to_string()
    }
}

impl std::fmt::Display for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Schedule::Cron(expr) => f.write_str(expr),
            Schedule::Delay { minutes } => write!(f, "{}{}", DELAY_PREFIX, minutes),
        }
    }
}

/// What starts a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TaskTrigger {
    #[default]
    Schedule,
    /// Fired by an application event. Only runs through "run now".
    Event {
        event: String,
        #[serde(default)]
        config: Value,
    },
}

/// One recipient of a `batch_sms` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSmsMessage {
    /// Reused as the transaction id so a pre-created SMS row is joined.
    pub id: Option<String>,
    pub device_id: String,
    #[serde(default = "default_slot")]
    pub slot: i16,
    pub phone: String,
    pub content: String,
}

fn default_slot() -> i16 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchSmsParams {
    #[serde(default)]
    messages: Vec<BatchSmsMessage>,
    #[serde(default)]
    interval_secs: u64,
}

/// What a task does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskAction {
    Command {
        command: CommandName,
        params: CommandParams,
    },
    BatchSms {
        messages: Vec<BatchSmsMessage>,
        /// Pause between consecutive messages.
        interval_secs: u64,
    },
}

impl TaskAction {
    pub fn parse(command: &str, params: Option<&Value>) -> Result<Self, GatewayError> {
        if command == BATCH_SMS_COMMAND {
            let parsed = match params {
                Some(value) => serde_json::from_value::<BatchSmsParams>(value.clone())
                    .map_err(|e| {
                        GatewayError::Validation(format!("Invalid batch_sms params: {}", e))
                    })?,
                None => BatchSmsParams {
                    messages: Vec::new(),
                    interval_secs: 0,
                },
            };
            return Ok(TaskAction::BatchSms {
                messages: parsed.messages,
                interval_secs: parsed.interval_secs,
            });
        }

        let command = command.parse::<CommandName>()?;
        let params = params
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Ok(TaskAction::Command { command, params })
    }
}

/// Tunables for due-ness evaluation.
#[derive(Debug, Clone, Copy)]
pub struct DuePolicy {
    /// Minimum spacing between two runs of a cron task.
    pub debounce: Duration,
    /// Cron anchor for tasks that have never run.
    pub lookback: Duration,
}

impl Default for DuePolicy {
    fn default() -> Self {
        Self {
            debounce: Duration::seconds(60),
            lookback: Duration::minutes(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: i64,
    pub name: String,
    pub device_id: Option<String>,
    pub schedule: Schedule,
    pub command: String,
    pub params: Option<Value>,
    pub trigger: TaskTrigger,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledTask {
    pub fn action(&self) -> Result<TaskAction, GatewayError> {
        TaskAction::parse(&self.command, self.params.as_ref())
    }

    /// Whether the task should fire at `now`.
    ///
    /// Delay tasks fire once, when `created_at + minutes` has passed and no run
    /// happened since. Cron tasks fire when the next occurrence after `last_run`
    /// (or `now - lookback`) is not in the future, and never within `debounce`
    /// of the previous run. Event-triggered and disabled tasks are never due.
    pub fn is_due(&self, now: DateTime<Utc>, policy: &DuePolicy) -> Result<bool, GatewayError> {
        if !self.enabled || matches!(self.trigger, TaskTrigger::Event { .. }) {
            return Ok(false);
        }

        match &self.schedule {
            Schedule::Delay { minutes } => {
                let scheduled = Duration::try_minutes(*minutes)
                    .and_then(|delay| self.created_at.checked_add_signed(delay))
                    .ok_or_else(|| {
                        GatewayError::Validation(format!("Delay out of range: {} minutes", minutes))
                    })?;
                Ok(scheduled <= now && self.last_run.map_or(true, |last| last < scheduled))
            }
            Schedule::Cron(expr) => {
                if let Some(last) = self.last_run {
                    if now - last < policy.debounce {
                        return Ok(false);
                    }
                }

                let anchor = self.last_run.unwrap_or(now - policy.lookback);
                let next = Schedule::cron(expr)?
                    .find_next_occurrence(&anchor, false)
                    .map_err(|e| {
                        GatewayError::Validation(format!("Cron evaluation failed: {}", e))
                    })?;
                Ok(next <= now)
            }
        }
    }
}

/// Values for a new task row.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub device_id: Option<String>,
    pub schedule: Schedule,
    pub command: String,
    pub params: Option<Value>,
    pub trigger: TaskTrigger,
    pub enabled: bool,
}

/// Partial task update. `None` fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub device_id: Option<Option<String>>,
    pub schedule: Option<Schedule>,
    pub command: Option<String>,
    pub params: Option<Option<Value>>,
    pub trigger: Option<TaskTrigger>,
    pub enabled: Option<bool>,
}

impl TaskPatch {
    pub fn apply(self, task: &mut ScheduledTask) {
        if let Some(name) = self.name {
            task.name = name;
        }
        if let Some(device_id) = self.device_id {
            task.device_id = device_id;
        }
        if let Some(schedule) = self.schedule {
            task.schedule = schedule;
        }
        if let Some(command) = self.command {
            task.command = command;
        }
        if let Some(params) = self.params {
            task.params = params;
        }
        if let Some(trigger) = self.trigger {
            task.trigger = trigger;
        }
        if let Some(enabled) = self.enabled {
            task.enabled = enabled;
        }
    }
}

fn validate_command(command: &str, params: Option<&Value>) -> Result<(), GatewayError> {
    TaskAction::parse(command, params).map(|_| ())
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: String,
    pub device_id: Option<String>,
    pub schedule: Option<String>,
    #[validate(length(min = 1, message = "Command is required"))]
    pub command: String,
    pub params: Option<Value>,
    pub enabled: Option<bool>,
    pub trigger: Option<TaskTrigger>,
}

impl CreateTaskRequest {
    /// Checks the schedule and command and produces the row to insert.
    pub fn into_new_task(self) -> Result<NewTask, GatewayError> {
        let schedule = self
            .schedule
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(DEFAULT_CRON)
            .parse::<Schedule>()?;
        validate_command(&self.command, self.params.as_ref())?;

        Ok(NewTask {
            name: self.name,
            device_id: self.device_id.filter(|d| !d.is_empty()),
            schedule,
            command: self.command,
            params: self.params,
            trigger: self.trigger.unwrap_or_default(),
            enabled: self.enabled.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1 to 100 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub device_id: Option<Option<String>>,
    pub schedule: Option<String>,
    pub command: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub params: Option<Option<Value>>,
    pub enabled: Option<bool>,
    pub trigger: Option<TaskTrigger>,
}

fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl UpdateTaskRequest {
    /// Checks the changed fields against the current task and produces the patch.
    pub fn into_patch(self, current: &ScheduledTask) -> Result<TaskPatch, GatewayError> {
        let schedule = self
            .schedule
            .as_deref()
            .map(str::parse::<Schedule>)
            .transpose()?;

        if self.command.is_some() || self.params.is_some() {
            let command = self.command.as_deref().unwrap_or(&current.command);
            let params = match &self.params {
                Some(p) => p.as_ref(),
                None => current.params.as_ref(),
            };
            validate_command(command, params)?;
        }

        Ok(TaskPatch {
            name: self.name,
            device_id: self.device_id,
            schedule,
            command: self.command,
            params: self.params,
            trigger: self.trigger,
            enabled: self.enabled,
        })
    }
}
