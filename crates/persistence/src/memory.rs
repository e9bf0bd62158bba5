//! In-process implementation of every storage trait.
//!
//! Backs the engine in tests and local runs without PostgreSQL. It keeps the
//! same atomicity guarantees as the SQL backend: each operation runs under one
//! lock, so upserts, the open-alert dedup and the task claim are indivisible.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{
    Alert, AlertFilter, AuditAction, AuditLog, CallKey, CallRecord, CallStatus, CommandRecord,
    CommandStatus, CreateAuditLogInput, Device, DeviceStatus, DeviceStatusSample, NewAlert,
    NewCall, NewCommand, NewDevice, NewSms, NewStatusSample, NewTask, ScheduledTask, SimStatus,
    Slot, SlotUpdate, SmsFilter, SmsMessage, SmsStatus, TaskPatch, UpdateDeviceRequest,
};
use domain::store::{
    AlertStore, AuditStore, CallStore, CommandStore, DeviceStore, SmsStore, Stores, TaskStore,
};
use domain::StoreError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    devices: BTreeMap<String, Device>,
    slots: BTreeMap<(String, i16), Slot>,
    status: Vec<DeviceStatusSample>,
    calls: Vec<CallRecord>,
    sms: Vec<SmsMessage>,
    commands: Vec<CommandRecord>,
    alerts: Vec<Alert>,
    tasks: BTreeMap<i64, ScheduledTask>,
    audit: Vec<AuditLog>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Storage backend held entirely in memory.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store handles for the engine services, all backed by this store.
    pub fn stores(&self) -> Stores {
        Stores::from_backend(Arc::new(self.clone()))
    }

    /// Every audit entry, oldest first.
    pub async fn audit_entries(&self) -> Vec<AuditLog> {
        self.inner.lock().await.audit.clone()
    }

    /// Every status sample, oldest first.
    pub async fn status_samples(&self) -> Vec<DeviceStatusSample> {
        self.inner.lock().await.status.clone()
    }

    /// Overwrites a task's `last_run`, bypassing the claim.
    pub async fn set_last_run(&self, id: i64, last_run: Option<DateTime<Utc>>) {
        if let Some(task) = self.inner.lock().await.tasks.get_mut(&id) {
            task.last_run = last_run;
        }
    }

    /// Overwrites a task's `created_at`.
    pub async fn set_task_created_at(&self, id: i64, created_at: DateTime<Utc>) {
        if let Some(task) = self.inner.lock().await.tasks.get_mut(&id) {
            task.created_at = created_at;
        }
    }
}

fn newest_first<T, K: Ord>(items: &mut [T], key: impl Fn(&T) -> K) {
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

fn take(limit: i64) -> usize {
    usize::try_from(limit.max(0)).unwrap_or(usize::MAX)
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn find(&self, id: &str) -> Result<Option<Device>, StoreError> {
        Ok(self.inner.lock().await.devices.get(id).cloned())
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<Device>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(ids
            .iter()
            .filter_map(|id| inner.devices.get(id).cloned())
            .collect())
    }

    async fn list(&self) -> Result<Vec<Device>, StoreError> {
        let mut devices: Vec<Device> = self.inner.lock().await.devices.values().cloned().collect();
        newest_first(&mut devices, |d| d.last_seen);
        Ok(devices)
    }

    async fn touch_online(
        &self,
        id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let device = inner.devices.entry(id.to_string()).or_insert_with(|| Device {
            id: id.to_string(),
            name: Device::default_name(id),
            ip: None,
            token: None,
            status: DeviceStatus::Offline,
            last_seen: None,
            auto_answer: false,
            tts_content: None,
            created_at: now,
            updated_at: now,
        });
        if let Some(ip) = ip {
            device.ip = Some(ip.to_string());
        }
        device.status = DeviceStatus::Online;
        device.last_seen = Some(now);
        device.updated_at = now;
        Ok(())
    }

    async fn register(&self, device: NewDevice, now: DateTime<Utc>) -> Result<Device, StoreError> {
        let mut inner = self.inner.lock().await;
        let online = device.status == DeviceStatus::Online;
        let entry = inner
            .devices
            .entry(device.id.clone())
            .or_insert_with(|| Device {
                id: device.id.clone(),
                name: device.name.clone(),
                ip: None,
                token: None,
                status: device.status,
                last_seen: None,
                auto_answer: false,
                tts_content: None,
                created_at: now,
                updated_at: now,
            });
        entry.name = device.name;
        entry.ip = Some(device.ip);
        entry.token = Some(device.token);
        entry.status = device.status;
        if online {
            entry.last_seen = Some(now);
        }
        entry.updated_at = now;
        Ok(entry.clone())
    }

    async fn update(
        &self,
        id: &str,
        changes: &UpdateDeviceRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Device>, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(device) = inner.devices.get_mut(id) else {
            return Ok(None);
        };
        if let Some(name) = &changes.name {
            device.name = name.clone();
        }
        if let Some(ip) = &changes.ip {
            device.ip = Some(ip.clone());
        }
        if let Some(token) = &changes.token {
            device.token = Some(token.clone());
        }
        if let Some(auto_answer) = changes.auto_answer {
            device.auto_answer = auto_answer;
        }
        if let Some(tts) = &changes.tts_content {
            device.tts_content = Some(tts.clone());
        }
        device.updated_at = now;
        Ok(Some(device.clone()))
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut count = 0;
        for device in inner.devices.values_mut() {
            let stale = device.last_seen.map_or(true, |seen| seen < cutoff);
            if device.status == DeviceStatus::Online && stale {
                device.status = DeviceStatus::Offline;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        if inner.devices.remove(id).is_none() {
            return Ok(false);
        }
        inner.slots.retain(|(device_id, _), _| device_id != id);
        inner.status.retain(|s| s.device_id != id);
        inner.calls.retain(|c| c.device_id != id);
        inner.sms.retain(|s| s.device_id != id);
        inner.commands.retain(|c| c.device_id != id);
        inner.alerts.retain(|a| a.device_id != id);
        inner
            .tasks
            .retain(|_, t| t.device_id.as_deref() != Some(id));
        Ok(true)
    }

    async fn upsert_slot(
        &self,
        device_id: &str,
        slot_num: i16,
        update: &SlotUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let slot = inner
            .slots
            .entry((device_id.to_string(), slot_num))
            .or_insert_with(|| Slot {
                device_id: device_id.to_string(),
                slot_num,
                sim_status: SimStatus::Unknown,
                operator: None,
                signal_strength: None,
                iccid: None,
                imsi: None,
                phone_number: None,
                updated_at: now,
            });
        if let Some(status) = update.sim_status {
            slot.sim_status = status;
        }
        if update.operator.is_some() {
            slot.operator = update.operator.clone();
        }
        if update.signal_strength.is_some() {
            slot.signal_strength = update.signal_strength;
        }
        if update.iccid.is_some() {
            slot.iccid = update.iccid.clone();
        }
        if update.imsi.is_some() {
            slot.imsi = update.imsi.clone();
        }
        if update.phone_number.is_some() {
            slot.phone_number = update.phone_number.clone();
        }
        slot.updated_at = now;
        Ok(())
    }

    async fn list_slots(&self, device_id: &str) -> Result<Vec<Slot>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .slots
            .values()
            .filter(|s| s.device_id == device_id)
            .cloned()
            .collect())
    }

    async fn insert_status(
        &self,
        sample: NewStatusSample,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id();
        inner.status.push(DeviceStatusSample {
            id,
            device_id: sample.device_id,
            wifi_ssid: sample.wifi_ssid,
            wifi_strength: sample.wifi_strength,
            temperature: sample.temperature,
            uptime_secs: sample.uptime_secs,
            timestamp: now,
        });
        Ok(())
    }

    async fn latest_status(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceStatusSample>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .status
            .iter()
            .filter(|s| s.device_id == device_id)
            .max_by_key(|s| (s.timestamp, s.id))
            .cloned())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
impl CallStore for MemoryStore {
    async fn insert(&self, call: NewCall, now: DateTime<Utc>) -> Result<CallRecord, StoreError> {
        let record = CallRecord {
            id: Uuid::new_v4(),
            device_id: call.key.device_id,
            slot_num: call.key.slot_num,
            direction: call.key.direction,
            phone: call.key.phone,
            start_time: call.key.start_time,
            end_time: call.end_time,
            duration: call.duration,
            status: call.status,
            created_at: now,
        };
        self.inner.lock().await.calls.push(record.clone());
        Ok(record)
    }

    async fn find_open(&self, key: &CallKey) -> Result<Option<CallRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .calls
            .iter()
            .rev()
            .find(|c| c.status.is_open() && &c.key() == key)
            .cloned())
    }

    async fn set_status(&self, id: Uuid, status: CallStatus) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.calls.iter_mut().find(|c| c.id == id) {
            Some(call) => {
                call.status = status;
                true
            }
            None => false,
        })
    }

    async fn complete(
        &self,
        id: Uuid,
        end_time: Option<DateTime<Utc>>,
        duration: i32,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.calls.iter_mut().find(|c| c.id == id) {
            Some(call) => {
                call.status = CallStatus::Completed;
                if end_time.is_some() {
                    call.end_time = end_time;
                }
                call.duration = Some(duration);
                true
            }
            None => false,
        })
    }

    async fn list(
        &self,
        device_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CallRecord>, StoreError> {
        let mut calls: Vec<CallRecord> = self
            .inner
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| device_id.map_or(true, |d| c.device_id == d))
            .cloned()
            .collect();
        newest_first(&mut calls, |c| (c.start_time, c.created_at));
        calls.truncate(take(limit));
        Ok(calls)
    }
}

#[async_trait]
impl SmsStore for MemoryStore {
    async fn insert(&self, sms: NewSms, now: DateTime<Utc>) -> Result<SmsMessage, StoreError> {
        let message = SmsMessage {
            id: sms.id,
            device_id: sms.device_id,
            slot_num: sms.slot_num,
            direction: sms.direction,
            phone: sms.phone,
            content: sms.content,
            timestamp: sms.timestamp,
            status: sms.status,
            is_read: false,
            category: sms.category,
            extracted_data: sms.extracted_data,
            created_at: now,
        };
        self.inner.lock().await.sms.push(message.clone());
        Ok(message)
    }

    async fn find(&self, id: &str) -> Result<Option<SmsMessage>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.sms.iter().find(|s| s.id == id).cloned())
    }

    async fn update_status(&self, id: &str, status: SmsStatus) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.sms.iter_mut().find(|s| s.id == id) {
            Some(sms) => {
                sms.status = status;
                true
            }
            None => false,
        })
    }

    async fn list(&self, filter: &SmsFilter, limit: i64) -> Result<Vec<SmsMessage>, StoreError> {
        let mut messages: Vec<SmsMessage> = self
            .inner
            .lock()
            .await
            .sms
            .iter()
            .filter(|s| filter.device_id.as_ref().map_or(true, |d| &s.device_id == d))
            .filter(|s| filter.direction.map_or(true, |d| s.direction == d))
            .filter(|s| filter.category.map_or(true, |c| s.category == Some(c)))
            .cloned()
            .collect();
        newest_first(&mut messages, |s| (s.timestamp, s.created_at));
        messages.truncate(take(limit));
        Ok(messages)
    }
}

#[async_trait]
impl CommandStore for MemoryStore {
    async fn create(
        &self,
        command: NewCommand,
        now: DateTime<Utc>,
    ) -> Result<CommandRecord, StoreError> {
        let record = pending_record(command, now);
        self.inner.lock().await.commands.push(record.clone());
        Ok(record)
    }

    async fn create_many(
        &self,
        commands: Vec<NewCommand>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .commands
            .extend(commands.into_iter().map(|c| pending_record(c, now)));
        Ok(())
    }

    async fn mark_sent(&self, tid: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(
            match inner
                .commands
                .iter_mut()
                .find(|c| c.id == tid && c.status == CommandStatus::Pending)
            {
                Some(record) => {
                    record.status = CommandStatus::Sent;
                    true
                }
                None => false,
            },
        )
    }

    async fn complete(
        &self,
        tid: &str,
        status: CommandStatus,
        result: Value,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(
            match inner
                .commands
                .iter_mut()
                .find(|c| c.id == tid && !c.status.is_terminal())
            {
                Some(record) => {
                    record.status = status;
                    record.result = Some(result);
                    record.executed_at = Some(at);
                    true
                }
                None => false,
            },
        )
    }

    async fn find(&self, tid: &str) -> Result<Option<CommandRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.commands.iter().find(|c| c.id == tid).cloned())
    }

    async fn list_for_device(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<CommandRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .commands
            .iter()
            .rev()
            .filter(|c| c.device_id == device_id)
            .take(take(limit))
            .cloned()
            .collect())
    }

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<CommandRecord>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .commands
            .iter()
            .filter(|c| c.batch_id.as_deref() == Some(batch_id))
            .cloned()
            .collect())
    }
}

fn pending_record(command: NewCommand, now: DateTime<Utc>) -> CommandRecord {
    CommandRecord {
        id: command.id,
        device_id: command.device_id,
        command: command.command,
        params: command.params,
        status: CommandStatus::Pending,
        result: None,
        batch_id: command.batch_id,
        batch_name: command.batch_name,
        actor: command.actor,
        sent_at: now,
        executed_at: None,
    }
}

#[async_trait]
impl AlertStore for MemoryStore {
    async fn open_if_absent(
        &self,
        alert: NewAlert,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        let mut inner = self.inner.lock().await;
        let alert_type = alert.kind.key();
        let open = inner
            .alerts
            .iter()
            .any(|a| {
                !a.is_resolved && a.device_id == alert.device_id && a.alert_type == alert_type
            });
        if open {
            return Ok(None);
        }

        let record = Alert {
            id: inner.next_id(),
            device_id: alert.device_id,
            alert_type,
            message: alert.message,
            level: alert.level,
            is_resolved: false,
            created_at: now,
            resolved_at: None,
        };
        inner.alerts.push(record.clone());
        Ok(Some(record))
    }

    async fn resolve(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Alert>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.alerts.iter_mut().find(|a| a.id == id).map(|alert| {
            if !alert.is_resolved {
                alert.is_resolved = true;
                alert.resolved_at = Some(now);
            }
            alert.clone()
        }))
    }

    async fn resolve_type(
        &self,
        device_id: &str,
        alert_type: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let mut count = 0;
        for alert in inner
            .alerts
            .iter_mut()
            .filter(|a| !a.is_resolved && a.device_id == device_id && a.alert_type == alert_type)
        {
            alert.is_resolved = true;
            alert.resolved_at = Some(now);
            count += 1;
        }
        Ok(count)
    }

    async fn list(&self, filter: &AlertFilter, limit: i64) -> Result<Vec<Alert>, StoreError> {
        let mut alerts: Vec<Alert> = self
            .inner
            .lock()
            .await
            .alerts
            .iter()
            .filter(|a| !filter.unresolved_only || !a.is_resolved)
            .cloned()
            .collect();
        newest_first(&mut alerts, |a| (a.created_at, a.id));
        alerts.truncate(take(limit));
        Ok(alerts)
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: NewTask, now: DateTime<Utc>) -> Result<ScheduledTask, StoreError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id();
        let record = ScheduledTask {
            id,
            name: task.name,
            device_id: task.device_id,
            schedule: task.schedule,
            command: task.command,
            params: task.params,
            trigger: task.trigger,
            enabled: task.enabled,
            last_run: None,
            created_at: now,
            updated_at: now,
        };
        inner.tasks.insert(id, record.clone());
        Ok(record)
    }

    async fn find(&self, id: i64) -> Result<Option<ScheduledTask>, StoreError> {
        Ok(self.inner.lock().await.tasks.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let mut tasks: Vec<ScheduledTask> =
            self.inner.lock().await.tasks.values().cloned().collect();
        newest_first(&mut tasks, |t| (t.created_at, t.id));
        Ok(tasks)
    }

    async fn list_enabled(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.tasks.values().filter(|t| t.enabled).cloned().collect())
    }

    async fn update(
        &self,
        id: i64,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledTask>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.tasks.get_mut(&id).map(|task| {
            patch.apply(task);
            task.updated_at = now;
            task.clone()
        }))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        Ok(self.inner.lock().await.tasks.remove(&id).is_some())
    }

    async fn claim_run(
        &self,
        id: i64,
        expected: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(match inner.tasks.get_mut(&id) {
            Some(task) if task.last_run == expected => {
                task.last_run = Some(now);
                true
            }
            _ => false,
        })
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn insert(
        &self,
        entry: CreateAuditLogInput,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let id = inner.next_id();
        inner.audit.push(AuditLog {
            id,
            actor: entry.actor,
            action: entry.action,
            target: entry.target,
            details: entry.details,
            timestamp: now,
        });
        Ok(())
    }

    async fn list(
        &self,
        action: Option<AuditAction>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), StoreError> {
        let inner = self.inner.lock().await;
        let matching: Vec<&AuditLog> = inner
            .audit
            .iter()
            .rev()
            .filter(|log| action.map_or(true, |a| log.action == a))
            .collect();
        let total = matching.len() as i64;
        let page = matching
            .into_iter()
            .skip(take(offset))
            .take(take(limit))
            .cloned()
            .collect();
        Ok((page, total))
    }
}
