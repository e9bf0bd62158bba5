//! Storage traits.
//!
//! Each ledger is reached through its own trait so engine services depend only
//! on what they write. The persistence crate provides a PostgreSQL backend and
//! an in-process backend implementing all of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use crate::error::StoreError;
use crate::models::{
    Alert, AlertFilter, AuditAction, AuditLog, CallKey, CallRecord, CallStatus, CommandRecord,
    CommandStatus, CreateAuditLogInput, Device, DeviceStatusSample, NewAlert, NewCall,
    NewCommand, NewDevice, NewSms, NewStatusSample, NewTask, ScheduledTask, Slot, SlotUpdate,
    SmsFilter, SmsMessage, SmsStatus, TaskPatch, UpdateDeviceRequest,
};

/// Device registry: devices, their slots and status samples.
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<Device>, StoreError>;

    async fn find_many(&self, ids: &[String]) -> Result<Vec<Device>, StoreError>;

    /// All devices, most recently seen first.
    async fn list(&self) -> Result<Vec<Device>, StoreError>;

    /// Marks a device online and seen at `now`, creating it on first contact.
    /// The stored address changes only when `ip` is given.
    async fn touch_online(
        &self,
        id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Inserts or overwrites a manually registered device.
    async fn register(&self, device: NewDevice, now: DateTime<Utc>) -> Result<Device, StoreError>;

    async fn update(
        &self,
        id: &str,
        changes: &UpdateDeviceRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Device>, StoreError>;

    /// Marks online devices not seen since `cutoff` offline. Returns the count.
    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    /// Deletes a device and every dependent record.
    async fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Atomic insert-or-update of one slot. `None` fields keep stored values.
    async fn upsert_slot(
        &self,
        device_id: &str,
        slot_num: i16,
        update: &SlotUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn list_slots(&self, device_id: &str) -> Result<Vec<Slot>, StoreError>;

    async fn insert_status(
        &self,
        sample: NewStatusSample,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn latest_status(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceStatusSample>, StoreError>;

    /// Connectivity check for the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait CallStore: Send + Sync {
    async fn insert(&self, call: NewCall, now: DateTime<Utc>) -> Result<CallRecord, StoreError>;

    /// Most recent ringing or answered call matching the composite key.
    async fn find_open(&self, key: &CallKey) -> Result<Option<CallRecord>, StoreError>;

    async fn set_status(&self, id: uuid::Uuid, status: CallStatus) -> Result<bool, StoreError>;

    async fn complete(
        &self,
        id: uuid::Uuid,
        end_time: Option<DateTime<Utc>>,
        duration: i32,
    ) -> Result<bool, StoreError>;

    async fn list(&self, device_id: Option<&str>, limit: i64)
        -> Result<Vec<CallRecord>, StoreError>;
}

#[async_trait]
pub trait SmsStore: Send + Sync {
    async fn insert(&self, sms: NewSms, now: DateTime<Utc>) -> Result<SmsMessage, StoreError>;

    async fn find(&self, id: &str) -> Result<Option<SmsMessage>, StoreError>;

    /// Returns `false` when no message has this id.
    async fn update_status(&self, id: &str, status: SmsStatus) -> Result<bool, StoreError>;

    /// Newest first.
    async fn list(&self, filter: &SmsFilter, limit: i64) -> Result<Vec<SmsMessage>, StoreError>;
}

#[async_trait]
pub trait CommandStore: Send + Sync {
    /// Inserts a `pending` row.
    async fn create(
        &self,
        command: NewCommand,
        now: DateTime<Utc>,
    ) -> Result<CommandRecord, StoreError>;

    /// Inserts several `pending` rows in one write.
    async fn create_many(
        &self,
        commands: Vec<NewCommand>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// pending → sent. Returns `false` if the row was not pending.
    async fn mark_sent(&self, tid: &str) -> Result<bool, StoreError>;

    /// pending | sent → `status`. Returns `false` if the row was already terminal
    /// or does not exist.
    async fn complete(
        &self,
        tid: &str,
        status: CommandStatus,
        result: Value,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn find(&self, tid: &str) -> Result<Option<CommandRecord>, StoreError>;

    /// Newest first.
    async fn list_for_device(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<CommandRecord>, StoreError>;

    /// Oldest first.
    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<CommandRecord>, StoreError>;
}

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Opens an alert unless one with the same (device, type) is unresolved.
    /// Check and insert happen as one conditional write. Returns the new alert,
    /// or `None` when suppressed.
    async fn open_if_absent(
        &self,
        alert: NewAlert,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError>;

    async fn resolve(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Alert>, StoreError>;

    /// Resolves the open alert of this type, if any. Returns the number resolved.
    async fn resolve_type(
        &self,
        device_id: &str,
        alert_type: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Newest first.
    async fn list(&self, filter: &AlertFilter, limit: i64) -> Result<Vec<Alert>, StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: NewTask, now: DateTime<Utc>) -> Result<ScheduledTask, StoreError>;

    async fn find(&self, id: i64) -> Result<Option<ScheduledTask>, StoreError>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<ScheduledTask>, StoreError>;

    async fn list_enabled(&self) -> Result<Vec<ScheduledTask>, StoreError>;

    async fn update(
        &self,
        id: i64,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledTask>, StoreError>;

    async fn delete(&self, id: i64) -> Result<bool, StoreError>;

    /// Sets `last_run = now` only if it still equals `expected`. A `false`
    /// return means another tick already claimed this run.
    async fn claim_run(
        &self,
        id: i64,
        expected: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn insert(&self, entry: CreateAuditLogInput, now: DateTime<Utc>)
        -> Result<(), StoreError>;

    /// Newest first, with the total count matching the filter.
    async fn list(
        &self,
        action: Option<AuditAction>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), StoreError>;
}

/// Handles to every store, shared by the engine services.
#[derive(Clone)]
pub struct Stores {
    pub devices: Arc<dyn DeviceStore>,
    pub calls: Arc<dyn CallStore>,
    pub sms: Arc<dyn SmsStore>,
    pub commands: Arc<dyn CommandStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub audit: Arc<dyn AuditStore>,
}

impl Stores {
    /// Uses one backend for every store.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: DeviceStore
            + CallStore
            + SmsStore
            + CommandStore
            + AlertStore
            + TaskStore
            + AuditStore
            + 'static,
    {
        Self {
            devices: backend.clone(),
            calls: backend.clone(),
            sms: backend.clone(),
            commands: backend.clone(),
            alerts: backend.clone(),
            tasks: backend.clone(),
            audit: backend,
        }
    }
}
