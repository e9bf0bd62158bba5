//! Command history repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{CommandRecord, CommandStatus, NewCommand};
use domain::store::CommandStore;
use domain::StoreError;
use serde_json::Value;
use sqlx::PgPool;

use crate::entities::CommandHistoryEntity;
use crate::metrics::timed;

const COMMAND_COLUMNS: &str = "id, device_id, command, params, status, result, batch_id, \
                               batch_name, actor, sent_at, executed_at";

const INSERT_PENDING: &str = r#"
    INSERT INTO command_history (id, device_id, command, params, status, batch_id, batch_name, actor, sent_at)
    VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8)
"#;

/// Repository for command history operations.
#[derive(Debug, Clone)]
pub struct CommandRepository {
    pool: PgPool,
}

impl CommandRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CommandStore for CommandRepository {
    async fn create(
        &self,
        command: NewCommand,
        now: DateTime<Utc>,
    ) -> Result<CommandRecord, StoreError> {
        let entity = sqlx::query_as::<_, CommandHistoryEntity>(&format!(
            "{INSERT_PENDING} RETURNING {COMMAND_COLUMNS}"
        ))
        .bind(&command.id)
        .bind(&command.device_id)
        .bind(&command.command)
        .bind(&command.params)
        .bind(&command.batch_id)
        .bind(&command.batch_name)
        .bind(&command.actor)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(entity.into())
    }

    async fn create_many(
        &self,
        commands: Vec<NewCommand>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        for command in &commands {
            sqlx::query(INSERT_PENDING)
                .bind(&command.id)
                .bind(&command.device_id)
                .bind(&command.command)
                .bind(&command.params)
                .bind(&command.batch_id)
                .bind(&command.batch_name)
                .bind(&command.actor)
                .bind(now)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn mark_sent(&self, tid: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE command_history SET status = 'sent' WHERE id = $1 AND status = 'pending'",
        )
        .bind(tid)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(
        &self,
        tid: &str,
        status: CommandStatus,
        result: Value,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let outcome = timed(
            "complete_command",
            sqlx::query(
                r#"
                UPDATE command_history
                SET status = $2, result = $3, executed_at = $4
                WHERE id = $1 AND status IN ('pending', 'sent')
                "#,
            )
            .bind(tid)
            .bind(status.as_str())
            .bind(result)
            .bind(at)
            .execute(&self.pool),
        )
        .await?;
        Ok(outcome.rows_affected() > 0)
    }

    async fn find(&self, tid: &str) -> Result<Option<CommandRecord>, StoreError> {
        let entity = sqlx::query_as::<_, CommandHistoryEntity>(&format!(
            "SELECT {COMMAND_COLUMNS} FROM command_history WHERE id = $1"
        ))
        .bind(tid)
        .fetch_optional(&self.pool)
        .await?;
        Ok(entity.map(Into::into))
    }

    async fn list_for_device(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<CommandRecord>, StoreError> {
        let entities = sqlx::query_as::<_, CommandHistoryEntity>(&format!(
            r#"
            SELECT {COMMAND_COLUMNS}
            FROM command_history
            WHERE device_id = $1
            ORDER BY sent_at DESC
            LIMIT $2
            "#
        ))
        .bind(device_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }

    async fn list_by_batch(&self, batch_id: &str) -> Result<Vec<CommandRecord>, StoreError> {
        let entities = sqlx::query_as::<_, CommandHistoryEntity>(&format!(
            r#"
            SELECT {COMMAND_COLUMNS}
            FROM command_history
            WHERE batch_id = $1
            ORDER BY sent_at ASC, id ASC
            "#
        ))
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(entities.into_iter().map(Into::into).collect())
    }
}
