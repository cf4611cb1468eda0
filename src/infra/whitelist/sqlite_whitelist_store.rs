// SQLite-backed whitelist.
//
// Tables:
// - whitelisted_channels: one row per (group, channel) allowed to post

use crate::core::whitelist::{WhitelistEntry, WhitelistError, WhitelistStore};
use crate::infra::sqlite::parse_timestamp;
use async_trait::async_trait;
use sqlx::{Executor, Pool, Row, Sqlite};

pub struct SqliteWhitelistStore {
    pool: Pool<Sqlite>,
}

impl SqliteWhitelistStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), WhitelistError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS whitelisted_channels (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                channel_title TEXT NOT NULL DEFAULT '',
                added_by INTEGER NOT NULL,
                added_at TEXT NOT NULL,
                UNIQUE(group_id, channel_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| WhitelistError::StorageError(e.to_string()))?;

        Ok(())
    }
}

/// Insert-or-ignore shared with application approval, which runs it inside
/// its own transaction.
pub(crate) async fn insert_entry<'e, E>(executor: E, entry: &WhitelistEntry) -> Result<bool, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let result = sqlx::query(
        r#"
        INSERT OR IGNORE INTO whitelisted_channels (group_id, channel_id, channel_title, added_by, added_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.group_id as i64)
    .bind(entry.channel_id as i64)
    .bind(&entry.channel_title)
    .bind(entry.added_by as i64)
    .bind(entry.added_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

#[async_trait]
impl WhitelistStore for SqliteWhitelistStore {
    async fn is_whitelisted(&self, group_id: u64, channel_id: u64) -> Result<bool, WhitelistError> {
        let row = sqlx::query(
            "SELECT 1 FROM whitelisted_channels WHERE group_id = ? AND channel_id = ?",
        )
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| WhitelistError::StorageError(e.to_string()))?;

        Ok(row.is_some())
    }

    async fn add(&self, entry: WhitelistEntry) -> Result<bool, WhitelistError> {
        insert_entry(&self.pool, &entry)
            .await
            .map_err(|e| WhitelistError::StorageError(e.to_string()))
    }

    async fn remove(&self, group_id: u64, channel_id: u64) -> Result<bool, WhitelistError> {
        let result =
            sqlx::query("DELETE FROM whitelisted_channels WHERE group_id = ? AND channel_id = ?")
                .bind(group_id as i64)
                .bind(channel_id as i64)
                .execute(&self.pool)
                .await
                .map_err(|e| WhitelistError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, group_id: u64) -> Result<Vec<WhitelistEntry>, WhitelistError> {
        let rows = sqlx::query(
            r#"
            SELECT group_id, channel_id, channel_title, added_by, added_at
            FROM whitelisted_channels
            WHERE group_id = ?
            ORDER BY added_at ASC
            "#,
        )
        .bind(group_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| WhitelistError::StorageError(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let added_at: String = row.get("added_at");
                WhitelistEntry {
                    group_id: row.get::<i64, _>("group_id") as u64,
                    channel_id: row.get::<i64, _>("channel_id") as u64,
                    channel_title: row.get("channel_title"),
                    added_by: row.get::<i64, _>("added_by") as u64,
                    added_at: parse_timestamp(&added_at),
                }
            })
            .collect())
    }
}
