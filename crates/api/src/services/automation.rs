//! Scheduler engine.
//!
//! `tick` evaluates every enabled task and fires the due ones. A task fires at
//! most once per occurrence: the in-process guard stops overlapping ticks and
//! the store's compare-and-set claim on `last_run` stops other instances.
//! `last_run` is claimed before the action runs, so a failing task is not
//! retried until its next occurrence.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use domain::models::task::{BatchSmsMessage, BATCH_SMS_COMMAND};
use domain::models::{
    AuditAction, BatchSmsRequest, DuePolicy, NewSms, NewTask, Schedule, ScheduledTask,
    SmsDirection, SmsStatus, StartBatchRequest, TaskAction, TaskTrigger,
};
use domain::services::audit::{API_ACTOR, SCHEDULER_ACTOR};
use domain::services::audit_helpers;
use domain::store::Stores;
use domain::{GatewayError, StoreError};
use serde::Serialize;
use serde_json::json;
use shared::crypto::new_transaction_id;

use super::audit::AuditWriter;
use super::batch::BatchOrchestrator;
use super::dispatcher::{CommandDispatcher, OutgoingSms};
use crate::config::SchedulerConfig;
use crate::middleware::metrics::record_task_fired;

/// Result of submitting a batch SMS request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSmsReceipt {
    pub batch_id: String,
    pub message_count: usize,
    pub scheduled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<i64>,
}

/// What one task execution did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRun {
    pub task_id: i64,
    /// Commands or messages the device accepted.
    pub sent: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

/// Task ids currently executing in this process.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<i64>>,
    id: i64,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a Mutex<HashSet<i64>>, id: i64) -> Option<Self> {
        let mut running = set.lock().ok()?;
        running.insert(id).then_some(Self { set, id })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut running) = self.set.lock() {
            running.remove(&self.id);
        }
    }
}

pub struct SchedulerEngine {
    stores: Stores,
    dispatcher: Arc<CommandDispatcher>,
    batches: Arc<BatchOrchestrator>,
    audit: AuditWriter,
    policy: DuePolicy,
    in_flight: Mutex<HashSet<i64>>,
}

impl SchedulerEngine {
    pub fn new(
        stores: Stores,
        dispatcher: Arc<CommandDispatcher>,
        batches: Arc<BatchOrchestrator>,
        audit: AuditWriter,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            stores,
            dispatcher,
            batches,
            audit,
            policy: DuePolicy {
                debounce: Duration::seconds(config.debounce_secs),
                lookback: Duration::seconds(config.cron_lookback_secs),
            },
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Fires every due task. Returns the ids that fired, in evaluation order.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<Vec<i64>, StoreError> {
        let tasks = self.stores.tasks.list_enabled().await?;
        let mut executed = Vec::new();

        for task in tasks {
            match task.is_due(now, &self.policy) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(
                        task_id = task.id,
                        error = %e,
                        "Skipping task with invalid schedule"
                    );
                    continue;
                }
            }

            let Some(_guard) = InFlight::acquire(&self.in_flight, task.id) else {
                tracing::debug!(task_id = task.id, "Task already running");
                continue;
            };

            match self.stores.tasks.claim_run(task.id, task.last_run, now).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(task_id = task.id, "Task run claimed elsewhere");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(task_id = task.id, error = %e, "Failed to claim task run");
                    continue;
                }
            }

            executed.push(task.id);
            match self.execute(&task, false).await {
                Ok(run) => {
                    record_task_fired("ok");
                    tracing::info!(
                        task_id = task.id,
                        sent = run.sent,
                        failed = run.failed,
                        "Task fired"
                    );
                }
                Err(e) => {
                    record_task_fired("failed");
                    tracing::warn!(task_id = task.id, error = %e, "Task failed");
                }
            }
        }

        Ok(executed)
    }

    /// Runs a task immediately, ignoring its schedule. `Ok(None)` when the
    /// task does not exist.
    pub async fn run_now(&self, id: i64) -> Result<Option<TaskRun>, GatewayError> {
        let Some(task) = self.stores.tasks.find(id).await? else {
            return Ok(None);
        };

        let Some(_guard) = InFlight::acquire(&self.in_flight, id) else {
            return Err(GatewayError::Validation(format!(
                "Task {} is already running",
                id
            )));
        };

        if !self.stores.tasks.claim_run(id, task.last_run, Utc::now()).await? {
            tracing::debug!(task_id = id, "Task ran concurrently; running again on request");
        }

        let run = self.execute(&task, true).await?;
        Ok(Some(run))
    }

    async fn execute(&self, task: &ScheduledTask, manual: bool) -> Result<TaskRun, GatewayError> {
        self.audit
            .record(audit_helpers::task_run(task.id, &task.name, manual));
        let actor = Some(if manual { API_ACTOR } else { SCHEDULER_ACTOR }.to_string());
        let mut run = TaskRun {
            task_id: task.id,
            ..TaskRun::default()
        };

        match task.action()? {
            TaskAction::Command { command, params } => match &task.device_id {
                Some(device_id) => {
                    let outcome = self
                        .dispatcher
                        .dispatch_command(device_id, command, params, actor)
                        .await?;
                    if outcome.accepted {
                        run.sent = 1;
                    } else {
                        run.failed = 1;
                    }
                }
                None => {
                    let target_ids = self
                        .stores
                        .devices
                        .list()
                        .await?
                        .into_iter()
                        .map(|d| d.id)
                        .collect();
                    let started = self
                        .batches
                        .start(
                            StartBatchRequest {
                                target_ids,
                                command: command.as_str().to_string(),
                                params,
                                batch_name: Some(format!("Task: {}", task.name)),
                            },
                            actor,
                        )
                        .await?;
                    run.sent = started.count;
                    run.batch_id = Some(started.batch_id);
                }
            },
            TaskAction::BatchSms {
                messages,
                interval_secs,
            } => {
                let (sent, failed) = send_batch_sms(
                    &self.dispatcher,
                    messages,
                    StdDuration::from_secs(interval_secs),
                    actor,
                )
                .await;
                run.sent = sent;
                run.failed = failed;
            }
        }

        Ok(run)
    }

    /// Fans a text out over devices and phones.
    ///
    /// Outgoing rows are created up front with the tid as their id. Without a
    /// `scheduledTime` the messages are sent on a background task; otherwise a
    /// one-shot `batch_sms` task carrying the same ids is created so its later
    /// run joins those rows.
    pub async fn submit_batch_sms(
        &self,
        request: BatchSmsRequest,
        actor: Option<String>,
    ) -> Result<BatchSmsReceipt, GatewayError> {
        let now = Utc::now();
        let delay = request.delay_minutes(now)?;

        for sender in &request.devices {
            if self.stores.devices.find(&sender.device_id).await?.is_none() {
                return Err(GatewayError::DeviceNotFound(sender.device_id.clone()));
            }
        }

        let batch_id = new_transaction_id();
        let mut messages = request.fan_out();
        for message in &mut messages {
            let id = new_transaction_id();
            self.stores
                .sms
                .insert(
                    NewSms {
                        id: id.clone(),
                        device_id: message.device_id.clone(),
                        slot_num: message.slot,
                        direction: SmsDirection::Outgoing,
                        phone: message.phone.clone(),
                        content: message.content.clone(),
                        timestamp: request.scheduled_time.unwrap_or(now),
                        status: SmsStatus::Pending,
                        category: None,
                        extracted_data: None,
                    },
                    now,
                )
                .await?;
            message.id = Some(id);
        }

        let mut receipt = BatchSmsReceipt {
            batch_id: batch_id.clone(),
            message_count: messages.len(),
            scheduled: delay.is_some(),
            task_id: None,
        };

        match delay {
            Some(minutes) => {
                let name = format!("Batch SMS {}", &batch_id[..8.min(batch_id.len())]);
                let task = self
                    .stores
                    .tasks
                    .create(
                        NewTask {
                            name,
                            device_id: None,
                            schedule: Schedule::Delay { minutes },
                            command: BATCH_SMS_COMMAND.to_string(),
                            params: Some(json!({
                                "batchId": batch_id,
                                "messages": messages,
                                "intervalSecs": request.interval,
                            })),
                            trigger: TaskTrigger::Schedule,
                            enabled: true,
                        },
                        now,
                    )
                    .await?;
                self.audit.record(audit_helpers::task_changed(
                    AuditAction::TaskCreate,
                    task.id,
                    Some(&task.name),
                ));
                tracing::info!(
                    batch_id = %batch_id,
                    task_id = task.id,
                    minutes,
                    "Batch SMS scheduled"
                );
                receipt.task_id = Some(task.id);
            }
            None => {
                let dispatcher = self.dispatcher.clone();
                let interval = StdDuration::from_secs(request.interval);
                tokio::spawn(async move {
                    let (sent, failed) =
                        send_batch_sms(&dispatcher, messages, interval, actor).await;
                    tracing::info!(batch_id = %batch_id, sent, failed, "Batch SMS finished");
                });
            }
        }

        Ok(receipt)
    }
}

/// Sends messages in order, pausing `interval` between them. Failures never
/// stop the list. Returns `(accepted, failed)`.
async fn send_batch_sms(
    dispatcher: &CommandDispatcher,
    messages: Vec<BatchSmsMessage>,
    interval: StdDuration,
    actor: Option<String>,
) -> (usize, usize) {
    let mut sent = 0;
    let mut failed = 0;
    for (i, message) in messages.into_iter().enumerate() {
        if i > 0 && !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        if send_message(dispatcher, message, actor.clone()).await {
            sent += 1;
        } else {
            failed += 1;
        }
    }
    (sent, failed)
}

/// One recipient of a batch. An existing outgoing row with the message id is
/// reused.
async fn send_message(
    dispatcher: &CommandDispatcher,
    message: BatchSmsMessage,
    actor: Option<String>,
) -> bool {
    let tid = message
        .id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(new_transaction_id);

    let sms = OutgoingSms {
        device_id: message.device_id,
        slot: message.slot,
        phone: message.phone,
        content: message.content,
    };

    match dispatcher.send_sms_as(tid.clone(), sms, actor).await {
        Ok(outcome) => outcome.accepted,
        Err(e) => {
            tracing::warn!(tid = %tid, error = %e, "Batch SMS message failed");
            false
        }
    }
}
