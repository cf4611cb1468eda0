// SQLite-backed group settings.
//
// Tables:
// - group_settings: at most one row per group, absent until first changed

use crate::core::settings::{GroupSettings, SettingsError, SettingsStore};
use crate::infra::sqlite::parse_timestamp;
use async_trait::async_trait;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteSettingsStore {
    pool: Pool<Sqlite>,
}

impl SqliteSettingsStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), SettingsError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS group_settings (
                group_id INTEGER PRIMARY KEY,
                enabled INTEGER NOT NULL DEFAULT 1,
                updated_by INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| SettingsError::StorageError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl SettingsStore for SqliteSettingsStore {
    async fn get(&self, group_id: u64) -> Result<Option<GroupSettings>, SettingsError> {
        let row = sqlx::query(
            "SELECT group_id, enabled, updated_by, updated_at FROM group_settings WHERE group_id = ?",
        )
        .bind(group_id as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SettingsError::StorageError(e.to_string()))?;

        Ok(row.map(|row| {
            let updated_at: Option<String> = row.get("updated_at");
            GroupSettings {
                group_id: row.get::<i64, _>("group_id") as u64,
                enabled: row.get::<i64, _>("enabled") != 0,
                updated_by: row.get::<i64, _>("updated_by") as u64,
                updated_at: updated_at.as_deref().map(parse_timestamp),
            }
        }))
    }

    async fn upsert(&self, settings: &GroupSettings) -> Result<(), SettingsError> {
        sqlx::query(
            r#"
            INSERT INTO group_settings (group_id, enabled, updated_by, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(group_id) DO UPDATE SET
                enabled = excluded.enabled,
                updated_by = excluded.updated_by,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(settings.group_id as i64)
        .bind(settings.enabled)
        .bind(settings.updated_by as i64)
        .bind(settings.updated_at.map(|at| at.to_rfc3339()))
        .execute(&self.pool)
        .await
        .map_err(|e| SettingsError::StorageError(e.to_string()))?;

        Ok(())
    }
}
