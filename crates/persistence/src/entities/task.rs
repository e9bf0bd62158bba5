//! Scheduled task entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Schedule, ScheduledTask};
use sqlx::FromRow;

/// Database row mapping for the scheduled_tasks table.
#[derive(Debug, Clone, FromRow)]
pub struct ScheduledTaskEntity {
    pub id: i64,
    pub name: String,
    pub device_id: Option<String>,
    pub schedule: String,
    pub command: String,
    pub params: Option<serde_json::Value>,
    pub trigger_spec: serde_json::Value,
    pub enabled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ScheduledTaskEntity> for ScheduledTask {
    fn from(entity: ScheduledTaskEntity) -> Self {
        // Unparseable rows keep the raw expression; the tick reports the error.
        let schedule = entity
            .schedule
            .parse::<Schedule>()
            .unwrap_or(Schedule::Cron(entity.schedule));

        Self {
            id: entity.id,
            name: entity.name,
            device_id: entity.device_id,
            schedule,
            command: entity.command,
            params: entity.params,
            trigger: serde_json::from_value(entity.trigger_spec).unwrap_or_default(),
            enabled: entity.enabled,
            last_run: entity.last_run,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::TaskTrigger;
    use serde_json::json;

    fn entity(schedule: &str, trigger: serde_json::Value) -> ScheduledTaskEntity {
        ScheduledTaskEntity {
            id: 1,
            name: "nightly restart".to_string(),
            device_id: None,
            schedule: schedule.to_string(),
            command: "restart".to_string(),
            params: None,
            trigger_spec: trigger,
            enabled: true,
            last_run: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_delay_schedule_and_default_trigger() {
        let task: ScheduledTask = entity("delay:15", json!({"type": "schedule"})).into();
        assert_eq!(task.schedule, Schedule::Delay { minutes: 15 });
        assert_eq!(task.trigger, TaskTrigger::Schedule);
    }

    #[test]
    fn test_event_trigger() {
        let task: ScheduledTask = entity(
            "0 4 * * *",
            json!({"type": "event", "event": "sms_received", "config": {"keyword": "STOP"}}),
        )
        .into();
        assert!(matches!(
            task.trigger,
            TaskTrigger::Event { ref event, .. } if event == "sms_received"
        ));
    }

    #[test]
    fn test_invalid_schedule_is_kept_raw() {
        let task: ScheduledTask = entity("not a cron", json!({})).into();
        assert_eq!(task.schedule, Schedule::Cron("not a cron".to_string()));
        assert_eq!(task.trigger, TaskTrigger::Schedule);
    }
}
