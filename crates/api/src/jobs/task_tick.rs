//! In-process driver for the task scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::scheduler::Job;
use crate::services::SchedulerEngine;

/// Runs one scheduler tick per interval. Only registered when the internal
/// ticker is enabled; otherwise `/api/cron` is driven externally.
pub struct TaskTickJob {
    engine: Arc<SchedulerEngine>,
    interval: Duration,
}

impl TaskTickJob {
    pub fn new(engine: Arc<SchedulerEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait::async_trait]
impl Job for TaskTickJob {
    fn name(&self) -> &'static str {
        "task_tick"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> Result<(), String> {
        let fired = self
            .engine
            .tick(Utc::now())
            .await
            .map_err(|e| e.to_string())?;
        if !fired.is_empty() {
            tracing::info!(tasks = ?fired, "Scheduled tasks fired");
        }
        Ok(())
    }
}
