//! Audit logging helpers.
//!
//! Entries are built here and written on a background task by the API layer,
//! so audit failures never block command execution.

use crate::models::{AuditAction, CreateAuditLogInput};
use serde_json::{Map, Value};

/// Actor recorded for actions taken by the scheduler.
pub const SCHEDULER_ACTOR: &str = "scheduler";

/// Actor recorded for actions taken through the HTTP API.
pub const API_ACTOR: &str = "api";

/// Builder for creating audit log entries with a fluent API.
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    actor: Option<String>,
    action: AuditAction,
    target: Option<String>,
    details: Map<String, Value>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            actor: None,
            action,
            target: None,
            details: Map::new(),
        }
    }

    /// Set the actor performing the action.
    pub fn by(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Set the actor if one is known.
    pub fn by_opt(mut self, actor: Option<String>) -> Self {
        if actor.is_some() {
            self.actor = actor;
        }
        self
    }

    /// Set the target the action applies to.
    pub fn on(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    /// Add a detail field.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> CreateAuditLogInput {
        CreateAuditLogInput {
            actor: self.actor,
            action: self.action,
            target: self.target,
            details: (!self.details.is_empty()).then(|| Value::Object(self.details)),
        }
    }
}

/// Convenience constructors for common audit entries.
pub mod audit_helpers {
    use super::*;

    pub fn device_command(
        actor: Option<String>,
        device_id: &str,
        command: &str,
        tid: &str,
        params: &Map<String, Value>,
    ) -> CreateAuditLogInput {
        AuditLogBuilder::new(AuditAction::DeviceCommand)
            .by_opt(actor)
            .on(device_id)
            .with("command", command)
            .with("tid", tid)
            .with("params", Value::Object(params.clone()))
            .build()
    }

    pub fn sms_sent(
        actor: Option<String>,
        device_id: &str,
        tid: &str,
        phone: &str,
    ) -> CreateAuditLogInput {
        AuditLogBuilder::new(AuditAction::SmsSend)
            .by_opt(actor)
            .on(device_id)
            .with("tid", tid)
            .with("phone", phone)
            .build()
    }

    pub fn batch_started(
        actor: Option<String>,
        batch_id: &str,
        command: &str,
        count: usize,
    ) -> CreateAuditLogInput {
        AuditLogBuilder::new(AuditAction::BatchStart)
            .by_opt(actor)
            .on(batch_id)
            .with("command", command)
            .with("count", count)
            .build()
    }

    pub fn task_run(task_id: i64, task_name: &str, manual: bool) -> CreateAuditLogInput {
        AuditLogBuilder::new(AuditAction::TaskRun)
            .by(if manual { API_ACTOR } else { SCHEDULER_ACTOR })
            .on(task_id.to_string())
            .with("name", task_name)
            .with("manual", manual)
            .build()
    }

    pub fn device_registered(device_id: &str, name: &str, ip: &str) -> CreateAuditLogInput {
        AuditLogBuilder::new(AuditAction::DeviceRegister)
            .by(API_ACTOR)
            .on(device_id)
            .with("name", name)
            .with("ip", ip)
            .build()
    }

    pub fn device_updated(device_id: &str) -> CreateAuditLogInput {
        AuditLogBuilder::new(AuditAction::DeviceUpdate)
            .by(API_ACTOR)
            .on(device_id)
            .build()
    }

    /// Task lifecycle entries (`TaskCreate`, `TaskUpdate`, `TaskDelete`).
    pub fn task_changed(
        action: AuditAction,
        task_id: i64,
        task_name: Option<&str>,
    ) -> CreateAuditLogInput {
        let builder = AuditLogBuilder::new(action)
            .by(API_ACTOR)
            .on(task_id.to_string());
        match task_name {
            Some(name) => builder.with("name", name).build(),
            None => builder.build(),
        }
    }

    pub fn device_deleted(device_id: &str) -> CreateAuditLogInput {
        AuditLogBuilder::new(AuditAction::DeviceDelete)
            .by(API_ACTOR)
            .on(device_id)
            .build()
    }

    pub fn alert_resolved(alert_id: i64) -> CreateAuditLogInput {
        AuditLogBuilder::new(AuditAction::AlertResolve)
            .by(API_ACTOR)
            .on(alert_id.to_string())
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_without_details() {
        let input = AuditLogBuilder::new(AuditAction::DeviceDelete)
            .by("api")
            .on("dev-1")
            .build();
        assert_eq!(input.actor.as_deref(), Some("api"));
        assert_eq!(input.target.as_deref(), Some("dev-1"));
        assert!(input.details.is_none());
    }

    #[test]
    fn test_builder_with_details() {
        let input = AuditLogBuilder::new(AuditAction::BatchStart)
            .with("count", 3)
            .with("command", "restart")
            .build();
        assert_eq!(input.details, Some(json!({"count": 3, "command": "restart"})));
        assert!(input.actor.is_none());
    }

    #[test]
    fn test_by_opt_keeps_existing_actor() {
        let input = AuditLogBuilder::new(AuditAction::SmsSend)
            .by("api")
            .by_opt(None)
            .build();
        assert_eq!(input.actor.as_deref(), Some("api"));
    }

    #[test]
    fn test_device_command_helper() {
        let mut params = Map::new();
        params.insert("slot".into(), json!(1));
        let input =
            audit_helpers::device_command(Some("ops".into()), "dev-1", "slotrst", "tid-1", &params);
        assert_eq!(input.action, AuditAction::DeviceCommand);
        let details = input.details.unwrap();
        assert_eq!(details["command"], "slotrst");
        assert_eq!(details["tid"], "tid-1");
        assert_eq!(details["params"]["slot"], 1);
    }

    #[test]
    fn test_task_run_actor() {
        assert_eq!(
            audit_helpers::task_run(7, "nightly", false).actor.as_deref(),
            Some(SCHEDULER_ACTOR)
        );
        assert_eq!(
            audit_helpers::task_run(7, "nightly", true).actor.as_deref(),
            Some(API_ACTOR)
        );
    }
}
