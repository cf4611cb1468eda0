// SQLite-backed daily prompt records.
//
// Tables:
// - channel_daily_prompts: one row per (group, channel, kind, day) a notice was sent

use crate::core::throttle::{NoticeKind, PromptStore, ThrottleError};
use crate::infra::sqlite::format_day;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{Pool, Sqlite};

pub struct SqlitePromptStore {
    pool: Pool<Sqlite>,
}

impl SqlitePromptStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), ThrottleError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_daily_prompts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                prompt_kind TEXT NOT NULL,
                prompt_date TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE(group_id, channel_id, prompt_kind, prompt_date)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ThrottleError::StorageError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl PromptStore for SqlitePromptStore {
    async fn exists(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError> {
        let row = sqlx::query(
            r#"
            SELECT 1 FROM channel_daily_prompts
            WHERE group_id = ? AND channel_id = ? AND prompt_kind = ? AND prompt_date = ?
            "#,
        )
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .bind(kind.as_str())
        .bind(format_day(day))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ThrottleError::StorageError(e.to_string()))?;

        Ok(row.is_some())
    }

    async fn insert(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO channel_daily_prompts
                (group_id, channel_id, prompt_kind, prompt_date, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .bind(kind.as_str())
        .bind(format_day(day))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ThrottleError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(
        &self,
        group_id: u64,
        channel_id: u64,
        kind: NoticeKind,
        day: NaiveDate,
    ) -> Result<bool, ThrottleError> {
        let result = sqlx::query(
            r#"
            DELETE FROM channel_daily_prompts
            WHERE group_id = ? AND channel_id = ? AND prompt_kind = ? AND prompt_date = ?
            "#,
        )
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .bind(kind.as_str())
        .bind(format_day(day))
        .execute(&self.pool)
        .await
        .map_err(|e| ThrottleError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_other_days(&self, keep: NaiveDate) -> Result<u64, ThrottleError> {
        let result = sqlx::query("DELETE FROM channel_daily_prompts WHERE prompt_date != ?")
            .bind(format_day(keep))
            .execute(&self.pool)
            .await
            .map_err(|e| ThrottleError::StorageError(e.to_string()))?;

        Ok(result.rows_affected())
    }
}
