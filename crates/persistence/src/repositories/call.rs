//! Call ledger repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{CallKey, CallRecord, CallStatus, NewCall};
use domain::store::CallStore;
use domain::StoreError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::CallRecordEntity;

const CALL_COLUMNS: &str = "id, device_id, slot_num, direction, phone, start_time, end_time, \
                            duration, status, created_at";

#[derive(Clone)]
pub struct CallRepository {
    pool: PgPool,
}

impl CallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallStore for CallRepository {
    async fn insert(&self, call: NewCall, now: DateTime<Utc>) -> Result<CallRecord, StoreError> {
        let entity = sqlx::query_as::<_, CallRecordEntity>(&format!(
            r#"
            INSERT INTO call_records (
                id, device_id, slot_num, direction, phone, start_time,
                end_time, duration, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {CALL_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&call.key.device_id)
        .bind(call.key.slot_num)
        .bind(call.key.direction.as_str())
        .bind(&call.key.phone)
        .bind(call.key.start_time)
        .bind(call.end_time)
        .bind(call.duration)
        .bind(call.status.as_str())
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(entity.into())
    }

    async fn find_open(&self, key: &CallKey) -> Result<Option<CallRecord>, StoreError> {
        let entity = sqlx::query_as::<_, CallRecordEntity>(&format!(
            r#"
            SELECT {CALL_COLUMNS}
            FROM call_records
            WHERE device_id = $1
              AND slot_num = $2
              AND direction = $3
              AND phone = $4
              AND start_time = $5
              AND status IN ('ringing', 'answered')
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(&key.device_id)
        .bind(key.slot_num)
        .bind(key.direction.as_str())
        .bind(&key.phone)
        .bind(key.start_time)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn set_status(&self, id: Uuid, status: CallStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE call_records SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        id: Uuid,
        end_time: Option<DateTime<Utc>>,
        duration: i32,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE call_records
            SET status = 'completed',
                end_time = COALESCE($2, end_time),
                duration = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(end_time)
        .bind(duration)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(
        &self,
        device_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<CallRecord>, StoreError> {
        let entities = sqlx::query_as::<_, CallRecordEntity>(&format!(
            r#"
            SELECT {CALL_COLUMNS}
            FROM call_records
            WHERE ($1::TEXT IS NULL OR device_id = $1)
            ORDER BY start_time DESC, created_at DESC
            LIMIT $2
            "#
        ))
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }
}
