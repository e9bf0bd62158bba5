//! Alert repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{Alert, AlertFilter, NewAlert};
use domain::store::AlertStore;
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::AlertEntity;
use crate::metrics::timed;

const ALERT_COLUMNS: &str =
    "id, device_id, alert_type, message, level, is_resolved, created_at, resolved_at";

/// Repository for alert operations.
#[derive(Clone)]
pub struct AlertRepository {
    pool: PgPool,
}

impl AlertRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AlertStore for AlertRepository {
    async fn open_if_absent(
        &self,
        alert: NewAlert,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, StoreError> {
        // Relies on the partial unique index over unresolved (device_id, alert_type).
        let sql = format!(
            r#"
            INSERT INTO alerts (device_id, alert_type, message, level, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (device_id, alert_type) WHERE is_resolved = FALSE DO NOTHING
            RETURNING {ALERT_COLUMNS}
            "#
        );
        let entity = timed(
            "open_alert",
            sqlx::query_as::<_, AlertEntity>(&sql)
                .bind(&alert.device_id)
                .bind(alert.kind.key())
                .bind(&alert.message)
                .bind(alert.level.as_str())
                .bind(now)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn resolve(&self, id: i64, now: DateTime<Utc>) -> Result<Option<Alert>, StoreError> {
        let entity = sqlx::query_as::<_, AlertEntity>(&format!(
            r#"
            UPDATE alerts
            SET is_resolved = TRUE, resolved_at = COALESCE(resolved_at, $2)
            WHERE id = $1
            RETURNING {ALERT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn resolve_type(
        &self,
        device_id: &str,
        alert_type: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE alerts
            SET is_resolved = TRUE, resolved_at = $3
            WHERE device_id = $1 AND alert_type = $2 AND is_resolved = FALSE
            "#,
        )
        .bind(device_id)
        .bind(alert_type)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn list(&self, filter: &AlertFilter, limit: i64) -> Result<Vec<Alert>, StoreError> {
        let entities = sqlx::query_as::<_, AlertEntity>(&format!(
            r#"
            SELECT {ALERT_COLUMNS}
            FROM alerts
            WHERE (NOT $1 OR is_resolved = FALSE)
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(filter.unresolved_only)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }
}
