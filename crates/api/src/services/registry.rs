//! Device registry: manual registration, views, edits and liveness.

use std::sync::Arc;

use chrono::{Duration, Utc};
use domain::models::event::{fields, string_value, SlotTelemetry};
use domain::models::{
    Device, DeviceStatus, DeviceView, EventPayload, NewDevice, RegisterDeviceRequest,
    UpdateDeviceRequest,
};
use domain::services::audit_helpers;
use domain::store::DeviceStore;
use domain::{GatewayError, StoreError};
use serde_json::Value;

use super::audit::AuditWriter;
use super::dispatcher::CommandDispatcher;

pub struct DeviceRegistry {
    devices: Arc<dyn DeviceStore>,
    dispatcher: Arc<CommandDispatcher>,
    audit: AuditWriter,
}

impl DeviceRegistry {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        dispatcher: Arc<CommandDispatcher>,
        audit: AuditWriter,
    ) -> Self {
        Self {
            devices,
            dispatcher,
            audit,
        }
    }

    pub async fn list(&self) -> Result<Vec<DeviceView>, StoreError> {
        let devices = self.devices.list().await?;
        let mut views = Vec::with_capacity(devices.len());
        for device in devices {
            views.push(self.view(device).await?);
        }
        Ok(views)
    }

    pub async fn get(&self, id: &str) -> Result<Option<DeviceView>, StoreError> {
        match self.devices.find(id).await? {
            Some(device) => Ok(Some(self.view(device).await?)),
            None => Ok(None),
        }
    }

    /// Asks the device for `stat` and stores it.
    ///
    /// The device id comes from the reply, then the request, then a new UUID.
    /// An unreachable device is stored offline when the caller supplied its
    /// id, and rejected otherwise.
    pub async fn register(&self, req: RegisterDeviceRequest) -> Result<DeviceView, GatewayError> {
        let ip = req.ip.trim().to_string();
        let answer = self.dispatcher.query_status(&ip, &req.token).await;

        let (device_id, status, reply) = match answer {
            Ok(reply) if reply.accepted() => {
                let id = reply
                    .body
                    .get("devId")
                    .and_then(string_value)
                    .or_else(|| req.dev_id.clone())
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                (id, DeviceStatus::Online, Some(reply.body))
            }
            Ok(reply) => {
                tracing::warn!(ip = %ip, code = reply.code, "Device rejected registration");
                let id = req
                    .dev_id
                    .clone()
                    .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
                (id, DeviceStatus::Online, None)
            }
            Err(e) => match req.dev_id.clone() {
                Some(id) => {
                    tracing::warn!(ip = %ip, error = %e, "Registering unreachable device offline");
                    (id, DeviceStatus::Offline, None)
                }
                None => return Err(e),
            },
        };

        let name = req
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| Device::default_name(&device_id));

        let now = Utc::now();
        let device = self
            .devices
            .register(
                NewDevice {
                    id: device_id.clone(),
                    name: name.clone(),
                    ip: ip.clone(),
                    token: req.token.clone(),
                    status,
                },
                now,
            )
            .await?;

        if let Some(body) = reply {
            self.fold_slots(&device_id, body).await?;
        }

        tracing::info!(
            device_id = %device_id,
            ip = %ip,
            status = %status.as_str(),
            "Device registered"
        );
        self.audit
            .record(audit_helpers::device_registered(&device_id, &name, &ip));

        Ok(self.view(device).await?)
    }

    pub async fn update(
        &self,
        id: &str,
        changes: &UpdateDeviceRequest,
    ) -> Result<Option<Device>, StoreError> {
        let updated = self.devices.update(id, changes, Utc::now()).await?;
        if updated.is_some() {
            self.audit.record(audit_helpers::device_updated(id));
        }
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let deleted = self.devices.delete(id).await?;
        if deleted {
            tracing::info!(device_id = %id, "Device deleted");
            self.audit.record(audit_helpers::device_deleted(id));
        }
        Ok(deleted)
    }

    /// Marks devices silent for longer than `offline_after` offline.
    pub async fn sweep_offline(&self, offline_after: Duration) -> Result<u64, StoreError> {
        let marked = self
            .devices
            .mark_stale_offline(Utc::now() - offline_after)
            .await?;
        if marked > 0 {
            tracing::info!(count = marked, "Marked silent devices offline");
        }
        Ok(marked)
    }

    /// Stores the slot block of a `stat` reply.
    async fn fold_slots(&self, device_id: &str, body: Value) -> Result<(), StoreError> {
        let Some(payload) = EventPayload::new(body) else {
            return Ok(());
        };
        let Some(block) = payload.fields().object(fields::SLOT_BLOCK) else {
            return Ok(());
        };

        let now = Utc::now();
        for (slot_num, update) in SlotTelemetry::all(block) {
            self.devices
                .upsert_slot(device_id, slot_num, &update, now)
                .await?;
        }
        Ok(())
    }

    async fn view(&self, device: Device) -> Result<DeviceView, StoreError> {
        let slots = self.devices.list_slots(&device.id).await?;
        let latest_status = self.devices.latest_status(&device.id).await?;
        Ok(DeviceView {
            device,
            slots,
            latest_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::services::device_client::{MockDeviceClient, MockReply};
    use domain::models::SimStatus;
    use persistence::MemoryStore;
    use serde_json::json;

    fn registry(store: &MemoryStore, client: &MockDeviceClient) -> DeviceRegistry {
        let stores = store.stores();
        let audit = AuditWriter::new(stores.audit.clone());
        let dispatcher = Arc::new(CommandDispatcher::new(
            stores.clone(),
            Arc::new(client.clone()),
            audit.clone(),
            &DeviceConfig::default(),
        ));
        DeviceRegistry::new(stores.devices, dispatcher, audit)
    }

    fn request(dev_id: Option<&str>) -> RegisterDeviceRequest {
        RegisterDeviceRequest {
            ip: "192.168.1.50".into(),
            token: "secret".into(),
            name: Some("Front desk".into()),
            dev_id: dev_id.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_register_takes_id_and_slots_from_stat_reply() {
        let store = MemoryStore::new();
        let client = MockDeviceClient::new();
        client.script(
            "192.168.1.50",
            MockReply::Reply(json!({
                "code": 0,
                "devId": "A1B2C3",
                "slot": {"slot1_sta": "OK", "sim1_op": "Carrier", "sim1_dbm": "-80"}
            })),
        );

        let view = registry(&store, &client).register(request(None)).await.unwrap();

        assert_eq!(view.device.id, "A1B2C3");
        assert_eq!(view.device.status, DeviceStatus::Online);
        assert_eq!(view.slots.len(), 1);
        assert_eq!(view.slots[0].sim_status, SimStatus::Ok);
        assert_eq!(view.slots[0].operator.as_deref(), Some("Carrier"));
        assert_eq!(client.requests()[0].command.as_str(), "stat");
    }

    #[tokio::test]
    async fn test_register_unreachable_with_id_is_offline() {
        let store = MemoryStore::new();
        let client = MockDeviceClient::new();
        client.script("192.168.1.50", MockReply::Timeout);

        let view = registry(&store, &client)
            .register(request(Some("dev-9")))
            .await
            .unwrap();
        assert_eq!(view.device.id, "dev-9");
        assert_eq!(view.device.status, DeviceStatus::Offline);
    }

    #[tokio::test]
    async fn test_register_unreachable_without_id_fails() {
        let store = MemoryStore::new();
        let client = MockDeviceClient::new();
        client.script("192.168.1.50", MockReply::Unreachable);

        let err = registry(&store, &client)
            .register(request(None))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DeviceUnreachable(_)));
        assert!(store.stores().devices.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_marks_silent_devices_offline() {
        let store = MemoryStore::new();
        let client = MockDeviceClient::new();
        let registry = registry(&store, &client);

        store
            .stores()
            .devices
            .touch_online("dev-1", None, Utc::now() - Duration::minutes(10))
            .await
            .unwrap();

        let marked = registry.sweep_offline(Duration::minutes(5)).await.unwrap();
        assert_eq!(marked, 1);

        let device = registry.get("dev-1").await.unwrap().unwrap();
        assert_eq!(device.device.status, DeviceStatus::Offline);
    }
}
