//! SMS ledger repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{NewSms, SmsFilter, SmsMessage, SmsStatus};
use domain::store::SmsStore;
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::SmsMessageEntity;

const SMS_COLUMNS: &str = "id, device_id, slot_num, direction, phone, content, timestamp, status, \
                           is_read, category, extracted_data, created_at";

#[derive(Clone)]
pub struct SmsRepository {
    pool: PgPool,
}

impl SmsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SmsStore for SmsRepository {
    async fn insert(&self, sms: NewSms, now: DateTime<Utc>) -> Result<SmsMessage, StoreError> {
        let extracted = sms
            .extracted_data
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let entity = sqlx::query_as::<_, SmsMessageEntity>(&format!(
            r#"
            INSERT INTO sms_messages (
                id, device_id, slot_num, direction, phone, content, timestamp,
                status, category, extracted_data, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {SMS_COLUMNS}
            "#
        ))
        .bind(&sms.id)
        .bind(&sms.device_id)
        .bind(sms.slot_num)
        .bind(sms.direction.as_str())
        .bind(&sms.phone)
        .bind(&sms.content)
        .bind(sms.timestamp)
        .bind(sms.status.as_str())
        .bind(sms.category.map(|c| c.as_str()))
        .bind(extracted)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(entity.into())
    }

    async fn find(&self, id: &str) -> Result<Option<SmsMessage>, StoreError> {
        let entity = sqlx::query_as::<_, SmsMessageEntity>(&format!(
            "SELECT {SMS_COLUMNS} FROM sms_messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn update_status(&self, id: &str, status: SmsStatus) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE sms_messages SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, filter: &SmsFilter, limit: i64) -> Result<Vec<SmsMessage>, StoreError> {
        let entities = sqlx::query_as::<_, SmsMessageEntity>(&format!(
            r#"
            SELECT {SMS_COLUMNS}
            FROM sms_messages
            WHERE ($1::TEXT IS NULL OR device_id = $1)
              AND ($2::TEXT IS NULL OR direction = $2)
              AND ($3::TEXT IS NULL OR category = $3)
            ORDER BY timestamp DESC, created_at DESC
            LIMIT $4
            "#
        ))
        .bind(&filter.device_id)
        .bind(filter.direction.map(|d| d.as_str()))
        .bind(filter.category.map(|c| c.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }
}
