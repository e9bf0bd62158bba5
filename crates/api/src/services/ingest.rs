//! Event ingestor.
//!
//! Turns device callbacks into ledger writes. The device is always
//! acknowledged once its id is known: side-effect failures are logged per
//! event and never change the ack, since devices retry on anything else.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use domain::models::call::call_duration;
use domain::models::event::{classify, CallEvent, IncomingSms, WifiInfo};
use domain::models::{
    AlertKind, AlertLevel, CallDirection, CallKey, CallStatus, CommandName, CommandParams,
    CommandStatus, DeviceEvent, EventPayload, NewCall, NewSms, NewStatusSample, SimStatus,
    SlotUpdate, SmsDirection, SmsStatus,
};
use domain::services::SmsClassifier;
use domain::store::Stores;
use domain::GatewayError;
use serde::Serialize;
use serde_json::{json, Value};
use shared::crypto::new_transaction_id;
use tracing::Instrument;

use super::alerts::AlertSink;
use super::dispatcher::CommandDispatcher;
use crate::middleware::metrics::record_event;

/// Actor recorded on commands the ingestor sends by itself.
pub const CALLBACK_ACTOR: &str = "callback";

const DEFAULT_TTS: &str = "Hello";

/// Reply body sent back to the device.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ack {
    pub code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl Ack {
    pub fn ok() -> Self {
        Self { code: 0, msg: None }
    }

    pub fn missing_device_id() -> Self {
        Self {
            code: 101,
            msg: Some("Missing devId".to_string()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

pub struct EventIngestor {
    stores: Stores,
    alerts: Arc<AlertSink>,
    dispatcher: Arc<CommandDispatcher>,
    classifier: Arc<dyn SmsClassifier>,
}

impl EventIngestor {
    pub fn new(
        stores: Stores,
        alerts: Arc<AlertSink>,
        dispatcher: Arc<CommandDispatcher>,
        classifier: Arc<dyn SmsClassifier>,
    ) -> Self {
        Self {
            stores,
            alerts,
            dispatcher,
            classifier,
        }
    }

    /// Handles one callback body. `peer` is the forwarded client address,
    /// used when a heartbeat carries no IP of its own.
    pub async fn ingest(&self, body: Value, peer: Option<String>) -> Ack {
        let Some(payload) = EventPayload::new(body) else {
            return Ack::missing_device_id();
        };
        let Some(device_id) = payload.device_id() else {
            return Ack::missing_device_id();
        };

        let event = classify(&payload);
        let kind = event.kind();
        record_event(kind);

        let span = tracing::info_span!("ingest", device_id = %device_id, kind = kind);
        async {
            tracing::debug!(event_type = ?payload.event_type(), "Device event received");
            if let Err(e) = self.apply(&device_id, event, &payload, peer).await {
                tracing::warn!(error = %e, "Failed to apply device event");
            }
        }
        .instrument(span)
        .await;

        Ack::ok()
    }

    async fn apply(
        &self,
        device_id: &str,
        event: DeviceEvent,
        payload: &EventPayload,
        peer: Option<String>,
    ) -> Result<(), GatewayError> {
        let now = Utc::now();

        if let DeviceEvent::Unknown { event_type } = &event {
            tracing::debug!(event_type = ?event_type, "Ignoring unrecognized event");
            return Ok(());
        }

        let address = match &event {
            DeviceEvent::Heartbeat(wifi) => wifi.ip.clone().or(peer),
            _ => None,
        };
        self.stores
            .devices
            .touch_online(device_id, address.as_deref(), now)
            .await?;

        match event {
            DeviceEvent::StatusReport { slots, wifi } => {
                for (slot_num, update) in slots {
                    self.update_slot(device_id, slot_num, &update, now).await;
                }
                if let Some(wifi) = wifi {
                    self.record_wifi(device_id, &wifi, now).await?;
                }
            }
            DeviceEvent::Heartbeat(wifi) => self.record_wifi(device_id, &wifi, now).await?,
            DeviceEvent::SmsReceived(sms) => self.store_incoming_sms(device_id, sms, now).await?,
            DeviceEvent::SmsSent { tid } => self.acknowledge_sent(tid, payload, now).await?,
            DeviceEvent::CallRinging(call) => self.ring(device_id, call, now).await?,
            DeviceEvent::CallHangup(call) => self.hang_up(device_id, call, now).await?,
            DeviceEvent::SimReady { slot } => {
                self.update_slot(device_id, slot, &SlotUpdate::status(SimStatus::Ok), now)
                    .await;
                self.alerts.clear(device_id, AlertKind::SimError(slot)).await?;
                self.alerts
                    .clear(device_id, AlertKind::SlotModuleError(slot))
                    .await?;
            }
            DeviceEvent::SimError { slot } => {
                self.update_slot(device_id, slot, &SlotUpdate::status(SimStatus::Err), now)
                    .await;
                let kind = AlertKind::SimError(slot);
                self.alerts
                    .raise(device_id, kind, AlertLevel::Critical, kind.title())
                    .await?;
            }
            DeviceEvent::SlotModuleError { slot } => {
                self.update_slot(device_id, slot, &SlotUpdate::status(SimStatus::Err), now)
                    .await;
                let kind = AlertKind::SlotModuleError(slot);
                self.alerts
                    .raise(device_id, kind, AlertLevel::Critical, kind.title())
                    .await?;
            }
            DeviceEvent::SimInfo { slot, update } => {
                self.update_slot(device_id, slot, &update, now).await;
                if let Some(dbm) = update.signal_strength {
                    self.alerts
                        .evaluate_signal(device_id, AlertKind::SimSignal(slot), dbm)
                        .await?;
                }
            }
            DeviceEvent::Unknown { .. } => {}
        }

        Ok(())
    }

    /// Slot writes are independent: one failing slot does not stop the others.
    async fn update_slot(
        &self,
        device_id: &str,
        slot_num: i16,
        update: &SlotUpdate,
        now: DateTime<Utc>,
    ) {
        if let Err(e) = self
            .stores
            .devices
            .upsert_slot(device_id, slot_num, update, now)
            .await
        {
            tracing::warn!(slot = slot_num, error = %e, "Failed to update slot");
        }
    }

    async fn record_wifi(
        &self,
        device_id: &str,
        wifi: &WifiInfo,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let sample = NewStatusSample {
            device_id: device_id.to_string(),
            wifi_ssid: wifi.ssid.clone(),
            wifi_strength: wifi.dbm,
            temperature: wifi.temperature,
            uptime_secs: wifi.uptime_secs,
        };
        if sample.has_signal() {
            self.stores.devices.insert_status(sample, now).await?;
        }

        if let Some(dbm) = wifi.dbm {
            self.alerts
                .evaluate_signal(device_id, AlertKind::WifiSignal, dbm)
                .await?;
        }
        Ok(())
    }

    async fn store_incoming_sms(
        &self,
        device_id: &str,
        sms: IncomingSms,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let category = self.classifier.classify(&sms.content, Some(&sms.phone));
        let extracted = self.classifier.extract(&sms.content, category);

        let stored = self
            .stores
            .sms
            .insert(
                NewSms {
                    id: new_transaction_id(),
                    device_id: device_id.to_string(),
                    slot_num: sms.slot,
                    direction: SmsDirection::Incoming,
                    phone: sms.phone,
                    content: sms.content,
                    timestamp: sms.timestamp.unwrap_or(now),
                    status: SmsStatus::Received,
                    category: Some(category),
                    extracted_data: (!extracted.is_empty()).then_some(extracted),
                },
                now,
            )
            .await?;

        tracing::info!(sms_id = %stored.id, category = %category.as_str(), "SMS received");
        Ok(())
    }

    /// Joins a 502 ack to the outgoing message with this tid, else to the
    /// command history row.
    async fn acknowledge_sent(
        &self,
        tid: Option<String>,
        payload: &EventPayload,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let Some(tid) = tid else {
            tracing::debug!("SMS sent ack without tid");
            return Ok(());
        };

        if self.stores.sms.update_status(&tid, SmsStatus::Sent).await? {
            tracing::info!(tid = %tid, "Outgoing SMS confirmed");
            return Ok(());
        }

        if self
            .stores
            .commands
            .complete(&tid, CommandStatus::Success, payload.raw(), now)
            .await?
        {
            tracing::info!(tid = %tid, "Command confirmed by device");
            return Ok(());
        }

        let miss = GatewayError::CorrelationMiss(format!("tid {}", tid));
        tracing::warn!("{}", miss);
        Ok(())
    }

    async fn ring(
        &self,
        device_id: &str,
        call: CallEvent,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let record = self
            .stores
            .calls
            .insert(
                NewCall {
                    key: call_key(device_id, &call),
                    status: CallStatus::Ringing,
                    end_time: None,
                    duration: None,
                },
                now,
            )
            .await?;

        let Some(device) = self.stores.devices.find(device_id).await? else {
            return Ok(());
        };
        if !device.auto_answer || device.address().is_none() {
            return Ok(());
        }

        let mut params = CommandParams::new();
        params.insert("p1".into(), json!(call.slot));
        params.insert("p2".into(), json!(55));
        params.insert(
            "p3".into(),
            json!(device
                .tts_content
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TTS.to_string())),
        );
        params.insert("p4".into(), json!(1));
        params.insert("p5".into(), json!(1));
        params.insert("p6".into(), json!(1));

        let dispatcher = self.dispatcher.clone();
        let id = device_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = dispatcher
                .dispatch_command(
                    &id,
                    CommandName::Telanswer,
                    params,
                    Some(CALLBACK_ACTOR.to_string()),
                )
                .await
            {
                tracing::warn!(device_id = %id, error = %e, "Auto-answer failed");
            }
        });

        self.stores
            .calls
            .set_status(record.id, CallStatus::Answered)
            .await?;
        tracing::info!(call_id = %record.id, "Auto-answering call");
        Ok(())
    }

    async fn hang_up(
        &self,
        device_id: &str,
        call: CallEvent,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let key = call_key(device_id, &call);
        let end = call.end.unwrap_or(call.start);
        let duration = call_duration(call.start, end);

        match self.stores.calls.find_open(&key).await? {
            Some(open) => {
                self.stores.calls.complete(open.id, Some(end), duration).await?;
            }
            None => {
                tracing::debug!("Hangup without matching ring; recording completed call");
                self.stores
                    .calls
                    .insert(
                        NewCall {
                            key,
                            status: CallStatus::Completed,
                            end_time: Some(end),
                            duration: Some(duration),
                        },
                        now,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

fn call_key(device_id: &str, call: &CallEvent) -> CallKey {
    CallKey {
        device_id: device_id.to_string(),
        slot_num: call.slot,
        direction: CallDirection::Incoming,
        phone: call.phone.clone(),
        start_time: call.start,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlertsConfig, DeviceConfig};
    use crate::services::audit::AuditWriter;
    use crate::services::device_client::MockDeviceClient;
    use domain::models::{AlertFilter, SmsCategory, SmsFilter};
    use domain::services::{KeywordClassifier, MockNotificationService};
    use persistence::MemoryStore;

    fn ingestor(store: &MemoryStore) -> EventIngestor {
        let stores = store.stores();
        let audit = AuditWriter::new(stores.audit.clone());
        let dispatcher = Arc::new(CommandDispatcher::new(
            stores.clone(),
            Arc::new(MockDeviceClient::new()),
            audit,
            &DeviceConfig::default(),
        ));
        let alerts = Arc::new(AlertSink::new(
            stores.alerts.clone(),
            stores.devices.clone(),
            Arc::new(MockNotificationService::new()),
            AlertsConfig::default(),
        ));
        EventIngestor::new(stores, alerts, dispatcher, Arc::new(KeywordClassifier))
    }

    #[tokio::test]
    async fn test_missing_device_id() {
        let store = MemoryStore::new();
        let ack = ingestor(&store).ingest(json!({"type": 998}), None).await;
        assert_eq!(ack, Ack::missing_device_id());

        let ack = ingestor(&store).ingest(json!("not an object"), None).await;
        assert_eq!(ack.code, 101);
    }

    #[tokio::test]
    async fn test_unknown_event_is_acked_without_side_effects() {
        let store = MemoryStore::new();
        let ack = ingestor(&store)
            .ingest(json!({"devId": "dev-1", "type": 12345}), None)
            .await;
        assert!(ack.is_ok());
        assert!(store.stores().devices.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_heartbeat_uses_peer_address_when_missing() {
        let store = MemoryStore::new();
        ingestor(&store)
            .ingest(json!({"devId": "dev-1", "type": 998}), Some("10.1.1.1".into()))
            .await;

        let device = store.stores().devices.find("dev-1").await.unwrap().unwrap();
        assert_eq!(device.ip.as_deref(), Some("10.1.1.1"));
        assert_eq!(device.name, "Device ev-1");
    }

    #[tokio::test]
    async fn test_incoming_sms_is_classified() {
        let store = MemoryStore::new();
        ingestor(&store)
            .ingest(
                json!({
                    "devId": "dev-1",
                    "type": 501,
                    "slot": 2,
                    "phNum": "10086",
                    "content": "your code is 4821"
                }),
                None,
            )
            .await;

        let messages = store
            .stores()
            .sms
            .list(&SmsFilter::default(), 50)
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].slot_num, 2);
        assert_eq!(messages[0].category, Some(SmsCategory::Verification));
        assert_eq!(
            messages[0]
                .extracted_data
                .as_ref()
                .and_then(|d| d.verification_code.as_deref()),
            Some("4821")
        );
    }

    #[tokio::test]
    async fn test_sim_error_then_ready_resolves_alert() {
        let store = MemoryStore::new();
        let ingestor = ingestor(&store);
        let open_only = AlertFilter {
            unresolved_only: true,
            limit: None,
        };

        ingestor
            .ingest(json!({"devId": "dev-1", "type": 209, "slot": 1}), None)
            .await;
        ingestor
            .ingest(json!({"devId": "dev-1", "type": 209, "slot": 1}), None)
            .await;
        let open = store.stores().alerts.list(&open_only, 50).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].alert_type, "sim_error_1");
        assert_eq!(open[0].level, AlertLevel::Critical);

        ingestor
            .ingest(json!({"devId": "dev-1", "type": 204, "slot": 1}), None)
            .await;
        assert!(store
            .stores()
            .alerts
            .list(&open_only, 50)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_slot_module_error_marks_slot_faulted() {
        let store = MemoryStore::new();
        let ingestor = ingestor(&store);

        ingestor
            .ingest(json!({"devId": "dev-1", "type": 204, "slot": 2}), None)
            .await;
        ingestor
            .ingest(json!({"devId": "dev-1", "type": 301, "slot": 2}), None)
            .await;

        let slots = store.stores().devices.list_slots("dev-1").await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].slot_num, 2);
        assert_eq!(slots[0].sim_status, SimStatus::Err);

        let alerts = store
            .stores()
            .alerts
            .list(&AlertFilter::default(), 50)
            .await
            .unwrap();
        assert_eq!(alerts[0].alert_type, "slot_module_error_2");
    }

    #[tokio::test]
    async fn test_hangup_without_ring_records_completed_call() {
        let store = MemoryStore::new();
        ingestor(&store)
            .ingest(
                json!({
                    "devId": "dev-1",
                    "type": 603,
                    "slot": 1,
                    "phNum": "555",
                    "startTm": 1700000000,
                    "endTm": 1700000030
                }),
                None,
            )
            .await;

        let calls = store.stores().calls.list(Some("dev-1"), 50).await.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].status, CallStatus::Completed);
        assert_eq!(calls[0].duration, Some(30));
    }
}
