//! Device registry repository: devices, slots and status samples.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{
    Device, DeviceStatus, DeviceStatusSample, NewDevice, NewStatusSample, Slot, SlotUpdate,
    UpdateDeviceRequest,
};
use domain::store::DeviceStore;
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::{DeviceEntity, DeviceStatusEntity, SlotEntity};
use crate::metrics::timed;

const DEVICE_COLUMNS: &str = "id, name, ip, token, status, last_seen, auto_answer, tts_content, \
                              created_at, updated_at";

/// Repository for device-related database operations.
#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl DeviceStore for DeviceRepository {
    async fn find(&self, id: &str) -> Result<Option<Device>, StoreError> {
        let entity = sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<Device>, StoreError> {
        let entities = sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ANY($1)"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn list(&self) -> Result<Vec<Device>, StoreError> {
        let entities = sqlx::query_as::<_, DeviceEntity>(&format!(
            "SELECT {DEVICE_COLUMNS} FROM devices ORDER BY last_seen DESC NULLS LAST, id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn touch_online(
        &self,
        id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        timed(
            "touch_online",
            sqlx::query(
                r#"
                INSERT INTO devices (id, name, ip, status, last_seen, created_at, updated_at)
                VALUES ($1, $2, $3, 'online', $4, $4, $4)
                ON CONFLICT (id) DO UPDATE SET
                    ip = COALESCE(EXCLUDED.ip, devices.ip),
                    status = 'online',
                    last_seen = EXCLUDED.last_seen,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(id)
            .bind(Device::default_name(id))
            .bind(ip)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn register(&self, device: NewDevice, now: DateTime<Utc>) -> Result<Device, StoreError> {
        let entity = sqlx::query_as::<_, DeviceEntity>(&format!(
            r#"
            INSERT INTO devices (id, name, ip, token, status, last_seen, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                ip = EXCLUDED.ip,
                token = EXCLUDED.token,
                status = EXCLUDED.status,
                last_seen = COALESCE(EXCLUDED.last_seen, devices.last_seen),
                updated_at = EXCLUDED.updated_at
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(&device.id)
        .bind(&device.name)
        .bind(&device.ip)
        .bind(&device.token)
        .bind(device.status.as_str())
        .bind((device.status == DeviceStatus::Online).then_some(now))
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(entity.into())
    }

    async fn update(
        &self,
        id: &str,
        changes: &UpdateDeviceRequest,
        now: DateTime<Utc>,
    ) -> Result<Option<Device>, StoreError> {
        let entity = sqlx::query_as::<_, DeviceEntity>(&format!(
            r#"
            UPDATE devices SET
                name = COALESCE($2, name),
                ip = COALESCE($3, ip),
                token = COALESCE($4, token),
                auto_answer = COALESCE($5, auto_answer),
                tts_content = COALESCE($6, tts_content),
                updated_at = $7
            WHERE id = $1
            RETURNING {DEVICE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&changes.name)
        .bind(&changes.ip)
        .bind(&changes.token)
        .bind(changes.auto_answer)
        .bind(&changes.tts_content)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn mark_stale_offline(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE devices
            SET status = 'offline', updated_at = NOW()
            WHERE status = 'online' AND (last_seen IS NULL OR last_seen < $1)
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn upsert_slot(
        &self,
        device_id: &str,
        slot_num: i16,
        update: &SlotUpdate,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        timed(
            "upsert_slot",
            sqlx::query(
                r#"
                INSERT INTO slots (
                    device_id, slot_num, sim_status, operator, signal_strength,
                    iccid, imsi, phone_number, updated_at
                )
                VALUES ($1, $2, COALESCE($3, 'UNKNOWN'), $4, $5, $6, $7, $8, $9)
                ON CONFLICT (device_id, slot_num) DO UPDATE SET
                    sim_status = COALESCE($3, slots.sim_status),
                    operator = COALESCE(EXCLUDED.operator, slots.operator),
                    signal_strength = COALESCE(EXCLUDED.signal_strength, slots.signal_strength),
                    iccid = COALESCE(EXCLUDED.iccid, slots.iccid),
                    imsi = COALESCE(EXCLUDED.imsi, slots.imsi),
                    phone_number = COALESCE(EXCLUDED.phone_number, slots.phone_number),
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(device_id)
            .bind(slot_num)
            .bind(update.sim_status.as_ref().map(|s| s.as_str()))
            .bind(&update.operator)
            .bind(update.signal_strength)
            .bind(&update.iccid)
            .bind(&update.imsi)
            .bind(&update.phone_number)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn list_slots(&self, device_id: &str) -> Result<Vec<Slot>, StoreError> {
        let entities = sqlx::query_as::<_, SlotEntity>(
            r#"
            SELECT device_id, slot_num, sim_status, operator, signal_strength,
                   iccid, imsi, phone_number, updated_at
            FROM slots
            WHERE device_id = $1
            ORDER BY slot_num
            "#,
        )
        .bind(device_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn insert_status(
        &self,
        sample: NewStatusSample,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO device_status (device_id, wifi_ssid, wifi_strength, temperature, uptime_secs, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&sample.device_id)
        .bind(&sample.wifi_ssid)
        .bind(sample.wifi_strength)
        .bind(sample.temperature)
        .bind(sample.uptime_secs)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_status(
        &self,
        device_id: &str,
    ) -> Result<Option<DeviceStatusSample>, StoreError> {
        let entity = sqlx::query_as::<_, DeviceStatusEntity>(
            r#"
            SELECT id, device_id, wifi_ssid, wifi_strength, temperature, uptime_secs, timestamp
            FROM device_status
            WHERE device_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        crate::metrics::record_pool_metrics(&self.pool);
        Ok(())
    }
}
