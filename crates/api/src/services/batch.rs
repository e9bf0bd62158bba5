//! Batch orchestrator.
//!
//! Fans one command out to many devices. All history rows are written as
//! `pending` up front so the batch status is queryable immediately; delivery
//! then runs in the background with a bounded number of devices in flight.

use std::sync::Arc;

use chrono::Utc;
use domain::models::batch::NO_ADDRESS_ERROR;
use domain::models::command::{build_device_params, DeviceParams};
use domain::models::{
    BatchStatus, CommandName, CommandStatus, Device, NewCommand, StartBatchRequest,
    StartBatchResponse,
};
use domain::services::audit_helpers;
use domain::store::Stores;
use domain::{GatewayError, StoreError};
use serde_json::{json, Value};
use shared::crypto::new_transaction_id;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

use super::audit::AuditWriter;
use super::dispatcher::CommandDispatcher;

pub struct BatchOrchestrator {
    stores: Stores,
    dispatcher: Arc<CommandDispatcher>,
    audit: AuditWriter,
    max_concurrency: usize,
}

/// One device of a running batch.
struct Member {
    device: Device,
    tid: String,
}

impl BatchOrchestrator {
    pub fn new(
        stores: Stores,
        dispatcher: Arc<CommandDispatcher>,
        audit: AuditWriter,
        max_concurrency: usize,
    ) -> Self {
        Self {
            stores,
            dispatcher,
            audit,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Validates the command, records one `pending` row per known target and
    /// returns immediately. Unknown target ids are skipped.
    pub async fn start(
        &self,
        req: StartBatchRequest,
        actor: Option<String>,
    ) -> Result<StartBatchResponse, GatewayError> {
        let command: CommandName = req.command.parse()?;
        let device_params = build_device_params(command, &req.params)?;

        let devices = self.stores.devices.find_many(&req.target_ids).await?;
        let now = Utc::now();
        let batch_id = uuid::Uuid::new_v4().to_string();
        let batch_name = req
            .batch_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Batch {} - {}", command, now.format("%Y-%m-%d %H:%M:%S")));

        if devices.len() < req.target_ids.len() {
            tracing::warn!(
                batch_id = %batch_id,
                requested = req.target_ids.len(),
                found = devices.len(),
                "Skipping unknown batch targets"
            );
        }

        let members: Vec<Member> = devices
            .into_iter()
            .map(|device| Member {
                device,
                tid: new_transaction_id(),
            })
            .collect();

        let params = Value::Object(req.params.clone());
        let rows = members
            .iter()
            .map(|m| NewCommand {
                id: m.tid.clone(),
                device_id: m.device.id.clone(),
                command: command.as_str().to_string(),
                params: Some(params.clone()),
                batch_id: Some(batch_id.clone()),
                batch_name: Some(batch_name.clone()),
                actor: actor.clone(),
            })
            .collect();
        self.stores.commands.create_many(rows, now).await?;

        let count = members.len();
        self.audit.record(audit_helpers::batch_started(
            actor,
            &batch_id,
            command.as_str(),
            count,
        ));

        tracing::info!(batch_id = %batch_id, command = %command, count, "Batch started");

        let span = tracing::info_span!("batch", batch_id = %batch_id);
        tokio::spawn(
            run(
                self.stores.clone(),
                self.dispatcher.clone(),
                self.max_concurrency,
                command,
                device_params,
                members,
            )
            .instrument(span),
        );

        Ok(StartBatchResponse {
            success: true,
            batch_id,
            count,
        })
    }

    /// `None` when no rows carry this batch id.
    pub async fn status(&self, batch_id: &str) -> Result<Option<BatchStatus>, StoreError> {
        let records = self.stores.commands.list_by_batch(batch_id).await?;
        if records.is_empty() {
            return Ok(None);
        }
        Ok(Some(BatchStatus::from_records(batch_id, &records)))
    }
}

async fn run(
    stores: Stores,
    dispatcher: Arc<CommandDispatcher>,
    max_concurrency: usize,
    command: CommandName,
    params: DeviceParams,
    members: Vec<Member>,
) {
    let permits = Arc::new(Semaphore::new(max_concurrency));
    let mut tasks = JoinSet::new();

    for member in members {
        let Ok(permit) = permits.clone().acquire_owned().await else {
            break;
        };
        let stores = stores.clone();
        let dispatcher = dispatcher.clone();
        let params = params.clone();

        tasks.spawn(
            async move {
                deliver(&stores, &dispatcher, command, params, member).await;
                drop(permit);
            }
            .in_current_span(),
        );
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "Batch member task panicked");
        }
    }

    tracing::info!("Batch finished");
}

/// Delivers one member. Every outcome ends in a terminal row.
async fn deliver(
    stores: &Stores,
    dispatcher: &CommandDispatcher,
    command: CommandName,
    params: DeviceParams,
    member: Member,
) {
    let Member { device, tid } = member;

    let Some(address) = device.address() else {
        tracing::warn!(device_id = %device.id, tid = %tid, "Batch target has no address");
        if let Err(e) = stores
            .commands
            .complete(
                &tid,
                CommandStatus::Failed,
                json!({ "msg": NO_ADDRESS_ERROR }),
                Utc::now(),
            )
            .await
        {
            tracing::warn!(tid = %tid, error = %e, "Failed to record batch failure");
        }
        return;
    };

    if let Err(e) = dispatcher
        .execute(&device, address, command, params, &tid, dispatcher.batch_timeout())
        .await
    {
        tracing::debug!(device_id = %device.id, tid = %tid, error = %e, "Batch member failed");
    }
}
