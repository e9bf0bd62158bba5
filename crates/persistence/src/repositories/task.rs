//! Scheduled task repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{NewTask, ScheduledTask, TaskPatch};
use domain::store::TaskStore;
use domain::StoreError;
use sqlx::PgPool;

use crate::entities::ScheduledTaskEntity;

const TASK_COLUMNS: &str = "id, name, device_id, schedule, command, params, trigger_spec, \
                            enabled, last_run, created_at, updated_at";

/// Repository for scheduled task operations.
#[derive(Clone)]
pub struct TaskRepository {
    pool: PgPool,
}

impl TaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskStore for TaskRepository {
    async fn create(&self, task: NewTask, now: DateTime<Utc>) -> Result<ScheduledTask, StoreError> {
        let entity = sqlx::query_as::<_, ScheduledTaskEntity>(&format!(
            r#"
            INSERT INTO scheduled_tasks (
                name, device_id, schedule, command, params, trigger_spec, enabled,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&task.name)
        .bind(&task.device_id)
        .bind(task.schedule.to_string())
        .bind(&task.command)
        .bind(&task.params)
        .bind(serde_json::to_value(&task.trigger)?)
        .bind(task.enabled)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(entity.into())
    }

    async fn find(&self, id: i64) -> Result<Option<ScheduledTask>, StoreError> {
        let entity = sqlx::query_as::<_, ScheduledTaskEntity>(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn list(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let entities = sqlx::query_as::<_, ScheduledTaskEntity>(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn list_enabled(&self) -> Result<Vec<ScheduledTask>, StoreError> {
        let entities = sqlx::query_as::<_, ScheduledTaskEntity>(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE enabled = TRUE ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn update(
        &self,
        id: i64,
        patch: TaskPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<ScheduledTask>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, ScheduledTaskEntity>(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(current) = current else {
            return Ok(None);
        };
        let mut task: ScheduledTask = current.into();
        patch.apply(&mut task);

        let entity = sqlx::query_as::<_, ScheduledTaskEntity>(&format!(
            r#"
            UPDATE scheduled_tasks SET
                name = $2,
                device_id = $3,
                schedule = $4,
                command = $5,
                params = $6,
                trigger_spec = $7,
                enabled = $8,
                updated_at = $9
            WHERE id = $1
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&task.name)
        .bind(&task.device_id)
        .bind(task.schedule.to_string())
        .bind(&task.command)
        .bind(&task.params)
        .bind(serde_json::to_value(&task.trigger)?)
        .bind(task.enabled)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(entity.into()))
    }

    async fn delete(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM scheduled_tasks WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn claim_run(
        &self,
        id: i64,
        expected: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE scheduled_tasks
            SET last_run = $3
            WHERE id = $1 AND last_run IS NOT DISTINCT FROM $2
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
