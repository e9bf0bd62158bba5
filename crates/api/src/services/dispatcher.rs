//! Command dispatcher.
//!
//! Every outbound command gets a transaction id and a `pending` history row
//! before any I/O. The row is then moved to `success` or `failed` from the
//! device reply. Outgoing SMS additionally use the tid as the message id so
//! the later 502 callback can find it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use domain::models::command::{build_device_params, DeviceParams};
use domain::models::{
    CommandName, CommandParams, CommandStatus, Device, NewCommand, NewSms, SmsDirection,
    SmsStatus,
};
use domain::services::audit_helpers;
use domain::store::Stores;
use domain::GatewayError;
use serde::Serialize;
use serde_json::{json, Value};
use shared::crypto::{device_token, new_transaction_id};

use super::audit::AuditWriter;
use super::device_client::{DeviceClient, DeviceReply, DeviceRequest};
use crate::config::DeviceConfig;
use crate::middleware::metrics::record_command;

/// Result of a command the device answered.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    /// `true` when the device reported code 0.
    #[serde(rename = "success")]
    pub accepted: bool,
    pub tid: String,
    pub result: Value,
}

/// Links a new history row to its batch and caller.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    pub batch_id: Option<String>,
    pub batch_name: Option<String>,
    pub actor: Option<String>,
}

impl Origin {
    pub fn actor(actor: Option<String>) -> Self {
        Self {
            actor,
            ..Self::default()
        }
    }
}

/// One outgoing SMS.
#[derive(Debug, Clone)]
pub struct OutgoingSms {
    pub device_id: String,
    pub slot: i16,
    pub phone: String,
    pub content: String,
}

pub struct CommandDispatcher {
    stores: Stores,
    client: Arc<dyn DeviceClient>,
    audit: AuditWriter,
    admin_token: String,
    command_timeout: Duration,
    batch_timeout: Duration,
}

impl CommandDispatcher {
    pub fn new(
        stores: Stores,
        client: Arc<dyn DeviceClient>,
        audit: AuditWriter,
        config: &DeviceConfig,
    ) -> Self {
        Self {
            stores,
            client,
            audit,
            admin_token: device_token(&config.admin_user, &config.admin_password),
            command_timeout: config.command_timeout(),
            batch_timeout: config.batch_timeout(),
        }
    }

    pub fn batch_timeout(&self) -> Duration {
        self.batch_timeout
    }

    /// Validates and sends one command to one device.
    ///
    /// A device rejection is not an error: the outcome carries
    /// `accepted = false` and the device's reply. Transport failures return
    /// `DeviceUnreachable` after the history row is marked failed.
    pub async fn dispatch(
        &self,
        device_id: &str,
        command: &str,
        params: CommandParams,
        actor: Option<String>,
    ) -> Result<DispatchOutcome, GatewayError> {
        let command: CommandName = command.parse()?;
        self.dispatch_command(device_id, command, params, actor).await
    }

    pub async fn dispatch_command(
        &self,
        device_id: &str,
        command: CommandName,
        params: CommandParams,
        actor: Option<String>,
    ) -> Result<DispatchOutcome, GatewayError> {
        let device_params = build_device_params(command, &params)?;
        let device = self.resolve(device_id).await?;
        let address = addressable(&device)?;

        let tid = new_transaction_id();
        self.create_row(
            &tid,
            device_id,
            command,
            Value::Object(params.clone()),
            Origin::actor(actor.clone()),
        )
        .await?;

        self.audit.record(audit_helpers::device_command(
            actor,
            device_id,
            command.as_str(),
            &tid,
            &params,
        ));

        self.execute(&device, address, command, device_params, &tid, self.command_timeout)
            .await
    }

    /// Sends an SMS with a fresh transaction id.
    pub async fn send_sms(
        &self,
        sms: OutgoingSms,
        actor: Option<String>,
    ) -> Result<DispatchOutcome, GatewayError> {
        self.send_sms_as(new_transaction_id(), sms, actor).await
    }

    /// Sends an SMS under `tid`. An existing outgoing message with this id is
    /// reused instead of inserting a new one.
    pub async fn send_sms_as(
        &self,
        tid: String,
        sms: OutgoingSms,
        actor: Option<String>,
    ) -> Result<DispatchOutcome, GatewayError> {
        let mut params = CommandParams::new();
        params.insert("slot".into(), json!(sms.slot));
        params.insert("phone".into(), json!(sms.phone));
        params.insert("content".into(), json!(sms.content));
        let device_params = build_device_params(CommandName::Sendsms, &params)?;

        let device = self.resolve(&sms.device_id).await?;
        let address = addressable(&device)?;

        if self.stores.sms.find(&tid).await?.is_none() {
            self.stores
                .sms
                .insert(
                    NewSms {
                        id: tid.clone(),
                        device_id: sms.device_id.clone(),
                        slot_num: sms.slot,
                        direction: SmsDirection::Outgoing,
                        phone: sms.phone.clone(),
                        content: sms.content.clone(),
                        timestamp: Utc::now(),
                        status: SmsStatus::Pending,
                        category: None,
                        extracted_data: None,
                    },
                    Utc::now(),
                )
                .await?;
        }

        self.create_row(
            &tid,
            &sms.device_id,
            CommandName::Sendsms,
            Value::Object(params),
            Origin::actor(actor.clone()),
        )
        .await?;

        self.audit
            .record(audit_helpers::sms_sent(actor, &sms.device_id, &tid, &sms.phone));

        let outcome = self
            .execute(
                &device,
                address,
                CommandName::Sendsms,
                device_params,
                &tid,
                self.batch_timeout,
            )
            .await;

        let status = match &outcome {
            Ok(o) if o.accepted => SmsStatus::Sent,
            _ => SmsStatus::Failed,
        };
        if let Err(e) = self.stores.sms.update_status(&tid, status).await {
            tracing::warn!(tid = %tid, error = %e, "Failed to update SMS status");
        }

        outcome
    }

    /// Sends `stat` to an address that is not registered yet.
    pub async fn query_status(&self, address: &str, token: &str) -> Result<DeviceReply, GatewayError> {
        let request = DeviceRequest {
            address: address.to_string(),
            token: token.to_string(),
            command: CommandName::Stat,
            params: Vec::new(),
            tid: new_transaction_id(),
        };

        self.client
            .send(&request, self.command_timeout)
            .await
            .map_err(|e| GatewayError::DeviceUnreachable(format!("{}: {}", address, e)))
    }

    /// Inserts the `pending` history row.
    pub async fn create_row(
        &self,
        tid: &str,
        device_id: &str,
        command: CommandName,
        params: Value,
        origin: Origin,
    ) -> Result<(), GatewayError> {
        self.stores
            .commands
            .create(
                NewCommand {
                    id: tid.to_string(),
                    device_id: device_id.to_string(),
                    command: command.as_str().to_string(),
                    params: Some(params),
                    batch_id: origin.batch_id,
                    batch_name: origin.batch_name,
                    actor: origin.actor,
                },
                Utc::now(),
            )
            .await?;
        Ok(())
    }

    /// Sends a command whose `pending` row already exists and records the
    /// outcome on that row.
    pub async fn execute(
        &self,
        device: &Device,
        address: &str,
        command: CommandName,
        params: DeviceParams,
        tid: &str,
        timeout: Duration,
    ) -> Result<DispatchOutcome, GatewayError> {
        let request = DeviceRequest {
            address: address.to_string(),
            token: self.token_for(device),
            command,
            params,
            tid: tid.to_string(),
        };

        if let Err(e) = self.stores.commands.mark_sent(tid).await {
            tracing::warn!(tid = %tid, error = %e, "Failed to mark command sent");
        }

        match self.client.send(&request, timeout).await {
            Ok(reply) => {
                let status = if reply.accepted() {
                    record_command(command.as_str(), "success");
                    CommandStatus::Success
                } else {
                    record_command(command.as_str(), "rejected");
                    let rejected = GatewayError::DeviceRejected {
                        code: reply.code,
                        message: reply.message().unwrap_or_default(),
                    };
                    tracing::warn!(device_id = %device.id, tid = %tid, "{}", rejected);
                    CommandStatus::Failed
                };

                self.stores
                    .commands
                    .complete(tid, status, reply.body.clone(), Utc::now())
                    .await?;

                Ok(DispatchOutcome {
                    accepted: reply.accepted(),
                    tid: tid.to_string(),
                    result: reply.body,
                })
            }
            Err(e) => {
                record_command(command.as_str(), "unreachable");
                tracing::warn!(
                    device_id = %device.id,
                    tid = %tid,
                    error = %e,
                    "Device unreachable"
                );

                self.stores
                    .commands
                    .complete(
                        tid,
                        CommandStatus::Failed,
                        json!({ "msg": e.to_string() }),
                        Utc::now(),
                    )
                    .await?;

                Err(GatewayError::DeviceUnreachable(format!("{} (tid {})", e, tid)))
            }
        }
    }

    async fn resolve(&self, device_id: &str) -> Result<Device, GatewayError> {
        self.stores
            .devices
            .find(device_id)
            .await?
            .ok_or_else(|| GatewayError::DeviceNotFound(device_id.to_string()))
    }

    /// The device's own token, or the admin token when none is stored.
    fn token_for(&self, device: &Device) -> String {
        device
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.admin_token)
            .to_string()
    }
}

fn addressable(device: &Device) -> Result<&str, GatewayError> {
    device.address().ok_or_else(|| {
        GatewayError::DeviceUnreachable(format!("device {} has no known address", device.id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::device_client::{MockDeviceClient, MockReply};
    use domain::models::{DeviceStatus, NewDevice};
    use persistence::MemoryStore;

    async fn setup(ip: &str, token: &str) -> (MemoryStore, MockDeviceClient, CommandDispatcher) {
        let store = MemoryStore::new();
        let stores = store.stores();
        stores
            .devices
            .register(
                NewDevice {
                    id: "dev-1".into(),
                    name: "Lobby".into(),
                    ip: ip.into(),
                    token: token.into(),
                    status: DeviceStatus::Online,
                },
                Utc::now(),
            )
            .await
            .unwrap();

        let client = MockDeviceClient::new();
        let dispatcher = CommandDispatcher::new(
            stores.clone(),
            Arc::new(client.clone()),
            AuditWriter::new(stores.audit.clone()),
            &DeviceConfig::default(),
        );
        (store, client, dispatcher)
    }

    #[tokio::test]
    async fn test_dispatch_success_records_history() {
        let (store, client, dispatcher) = setup("10.0.0.2", "tok").await;

        let outcome = dispatcher
            .dispatch("dev-1", "stat", CommandParams::new(), None)
            .await
            .unwrap();
        assert!(outcome.accepted);

        let record = store
            .stores()
            .commands
            .find(&outcome.tid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, CommandStatus::Success);
        assert!(record.executed_at.is_some());

        let sent = client.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].token, "tok");
        assert_eq!(sent[0].tid, outcome.tid);
    }

    #[tokio::test]
    async fn test_dispatch_rejects_unknown_command_before_io() {
        let (store, client, dispatcher) = setup("10.0.0.2", "tok").await;

        let err = dispatcher
            .dispatch("dev-1", "selfdestruct", CommandParams::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidCommand(_)));
        assert!(client.requests().is_empty());
        assert!(store
            .stores()
            .commands
            .list_for_device("dev-1", 50)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_device_rejection() {
        let (store, client, dispatcher) = setup("10.0.0.2", "tok").await;
        client.script("10.0.0.2", MockReply::Reply(json!({"code": 4, "msg": "busy"})));

        let outcome = dispatcher
            .dispatch("dev-1", "restart", CommandParams::new(), None)
            .await
            .unwrap();
        assert!(!outcome.accepted);
        assert_eq!(outcome.result["msg"], "busy");

        let record = store
            .stores()
            .commands
            .find(&outcome.tid)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, CommandStatus::Failed);
    }

    #[tokio::test]
    async fn test_dispatch_timeout_marks_failed() {
        let (store, client, dispatcher) = setup("10.0.0.2", "tok").await;
        client.script("10.0.0.2", MockReply::Timeout);

        let err = dispatcher
            .dispatch("dev-1", "stat", CommandParams::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DeviceUnreachable(_)));

        let history = store
            .stores()
            .commands
            .list_for_device("dev-1", 50)
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, CommandStatus::Failed);
    }

    #[tokio::test]
    async fn test_dispatch_uses_admin_token_fallback() {
        let (_store, client, dispatcher) = setup("10.0.0.2", "").await;

        dispatcher
            .dispatch("dev-1", "stat", CommandParams::new(), None)
            .await
            .unwrap();
        assert_eq!(
            client.requests()[0].token,
            "3f4bffa77257d243875d0a5a80635934"
        );
    }

    #[tokio::test]
    async fn test_dispatch_unknown_device() {
        let (_store, _client, dispatcher) = setup("10.0.0.2", "tok").await;

        let err = dispatcher
            .dispatch("ghost", "stat", CommandParams::new(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DeviceNotFound(_)));
    }

    #[tokio::test]
    async fn test_send_sms_moves_message_to_sent() {
        let (store, client, dispatcher) = setup("10.0.0.2", "tok").await;

        let outcome = dispatcher
            .send_sms(
                OutgoingSms {
                    device_id: "dev-1".into(),
                    slot: 2,
                    phone: "+15550100".into(),
                    content: "hello".into(),
                },
                None,
            )
            .await
            .unwrap();

        let sms = store.stores().sms.find(&outcome.tid).await.unwrap().unwrap();
        assert_eq!(sms.status, SmsStatus::Sent);
        assert_eq!(sms.direction, SmsDirection::Outgoing);

        let request = &client.requests()[0];
        assert_eq!(request.command, CommandName::Sendsms);
        assert_eq!(request.params[0], ("p1".to_string(), "2".to_string()));
    }

    #[tokio::test]
    async fn test_command_row_exists_before_device_sees_request() {
        let (store, _, _) = setup("10.0.0.2", "tok").await;
        let stores = store.stores();
        let client = MockDeviceClient::new().with_command_store(stores.commands.clone());
        let dispatcher = CommandDispatcher::new(
            stores.clone(),
            Arc::new(client.clone()),
            AuditWriter::new(stores.audit.clone()),
            &DeviceConfig::default(),
        );

        let stat = dispatcher
            .dispatch("dev-1", "stat", CommandParams::new(), None)
            .await
            .unwrap();
        let sms = dispatcher
            .send_sms(
                OutgoingSms {
                    device_id: "dev-1".into(),
                    slot: 1,
                    phone: "+15550100".into(),
                    content: "hello".into(),
                },
                None,
            )
            .await
            .unwrap();

        let seen = client.rows_at_send();
        assert_eq!(seen.len(), 2);
        for (tid, row) in &seen {
            let row = row.as_ref().expect("row must exist when the request is sent");
            assert_eq!(&row.id, tid);
            assert!(matches!(
                row.status,
                CommandStatus::Pending | CommandStatus::Sent
            ));
        }
        assert_eq!(seen[0].0, stat.tid);
        assert_eq!(seen[1].0, sms.tid);

        let history = stores.commands.list_for_device("dev-1", 100).await.unwrap();
        assert_eq!(history.len(), 2);
        for tid in [&stat.tid, &sms.tid] {
            let rows: Vec<_> = history.iter().filter(|r| &r.id == tid).collect();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0].status, CommandStatus::Success);
        }
    }

    #[tokio::test]
    async fn test_send_sms_failure_marks_failed() {
        let (store, client, dispatcher) = setup("10.0.0.2", "tok").await;
        client.script("10.0.0.2", MockReply::Unreachable);

        let result = dispatcher
            .send_sms_as(
                "sms-1".into(),
                OutgoingSms {
                    device_id: "dev-1".into(),
                    slot: 1,
                    phone: "+15550100".into(),
                    content: "hello".into(),
                },
                None,
            )
            .await;
        assert!(result.is_err());

        let sms = store.stores().sms.find("sms-1").await.unwrap().unwrap();
        assert_eq!(sms.status, SmsStatus::Failed);
    }
}
