// SQLite-backed audit log of suppressed posts.
//
// Tables:
// - blocked_messages: append-only, one row per suppressed post

use crate::core::recorder::{BlockedMessage, BlockedMessageStore, StoreError};
use crate::infra::sqlite::is_busy;
use async_trait::async_trait;
use sqlx::{Executor, Pool, Row, Sqlite};

pub struct SqliteBlockedMessageStore {
    pool: Pool<Sqlite>,
}

impl SqliteBlockedMessageStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blocked_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL CHECK (message_id != 0),
                message_text TEXT NOT NULL DEFAULT '',
                blocked_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blocked_messages_group
                ON blocked_messages(group_id, blocked_at);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }
}

fn store_error(err: sqlx::Error) -> StoreError {
    if is_busy(&err) {
        StoreError::Busy
    } else {
        StoreError::StorageError(err.to_string())
    }
}

async fn insert_record<'e, E>(executor: E, record: &BlockedMessage) -> Result<(), sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO blocked_messages (group_id, channel_id, message_id, message_text, blocked_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(record.group_id as i64)
    .bind(record.channel_id as i64)
    .bind(record.message_id as i64)
    .bind(&record.text)
    .bind(record.blocked_at.to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

#[async_trait]
impl BlockedMessageStore for SqliteBlockedMessageStore {
    async fn insert_batch(&self, records: &[BlockedMessage]) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        for record in records {
            if let Err(err) = insert_record(&mut *tx, record).await {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback of blocked-message batch failed");
                }
                return Err(store_error(err));
            }
        }

        tx.commit().await.map_err(store_error)
    }

    async fn insert_one(&self, record: &BlockedMessage) -> Result<(), StoreError> {
        insert_record(&self.pool, record).await.map_err(store_error)
    }

    async fn count_for_group(&self, group_id: u64) -> Result<u64, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM blocked_messages WHERE group_id = ?")
            .bind(group_id as i64)
            .fetch_one(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(row.get::<i64, _>("total") as u64)
    }
}
