//! Audit log repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{AuditAction, AuditLog, CreateAuditLogInput};
use domain::store::AuditStore;
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::AuditLogEntity;

/// Repository for audit log database operations.
#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    /// Create a new repository instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditStore for AuditLogRepository {
    async fn insert(
        &self,
        entry: CreateAuditLogInput,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (actor, action, target, details, timestamp)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&entry.actor)
        .bind(entry.action.as_str())
        .bind(&entry.target)
        .bind(&entry.details)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list(
        &self,
        action: Option<AuditAction>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditLog>, i64), StoreError> {
        let action = action.map(|a| a.as_str());

        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM audit_logs WHERE ($1::TEXT IS NULL OR action = $1)",
        )
        .bind(action)
        .fetch_one(&self.pool)
        .await?;

        let entities = sqlx::query_as::<_, AuditLogEntity>(
            r#"
            SELECT id, actor, action, target, details, timestamp
            FROM audit_logs
            WHERE ($1::TEXT IS NULL OR action = $1)
            ORDER BY timestamp DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(action)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        let logs = entities
            .into_iter()
            .filter_map(|entity| {
                let id = entity.id;
                AuditLog::try_from(entity)
                    .map_err(|e| tracing::warn!(audit_id = id, error = %e, "Skipping audit row"))
                    .ok()
            })
            .collect();

        Ok((logs, total.0))
    }
}
