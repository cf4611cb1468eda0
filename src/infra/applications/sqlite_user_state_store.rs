// SQLite-backed conversation cursors.
//
// Tables:
// - user_states: at most one row per user; no row means idle

use crate::core::applications::{ApplicationError, UserState, UserStateStore};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

const AWAITING_REASON: &str = "awaiting_reason";

pub struct SqliteUserStateStore {
    pool: Pool<Sqlite>,
}

impl SqliteUserStateStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> Result<(), ApplicationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_states (
                user_id INTEGER PRIMARY KEY,
                state TEXT NOT NULL,
                group_id INTEGER,
                channel_id INTEGER,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl UserStateStore for SqliteUserStateStore {
    async fn get(&self, user_id: u64) -> Result<UserState, ApplicationError> {
        let row = sqlx::query("SELECT state, group_id, channel_id FROM user_states WHERE user_id = ?")
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        let Some(row) = row else {
            return Ok(UserState::Idle);
        };

        let state: String = row.get("state");
        let group_id: Option<i64> = row.get("group_id");
        let channel_id: Option<i64> = row.get("channel_id");

        Ok(match (state.as_str(), group_id, channel_id) {
            (AWAITING_REASON, Some(group_id), Some(channel_id)) => UserState::AwaitingReason {
                group_id: group_id as u64,
                channel_id: channel_id as u64,
            },
            _ => UserState::Idle,
        })
    }

    async fn set(&self, user_id: u64, state: UserState) -> Result<(), ApplicationError> {
        match state {
            UserState::Idle => {
                sqlx::query("DELETE FROM user_states WHERE user_id = ?")
                    .bind(user_id as i64)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| ApplicationError::StorageError(e.to_string()))?;
            }
            UserState::AwaitingReason {
                group_id,
                channel_id,
            } => {
                sqlx::query(
                    r#"
                    INSERT INTO user_states (user_id, state, group_id, channel_id, updated_at)
                    VALUES (?, ?, ?, ?, ?)
                    ON CONFLICT(user_id) DO UPDATE SET
                        state = excluded.state,
                        group_id = excluded.group_id,
                        channel_id = excluded.channel_id,
                        updated_at = excluded.updated_at
                    "#,
                )
                .bind(user_id as i64)
                .bind(AWAITING_REASON)
                .bind(group_id as i64)
                .bind(channel_id as i64)
                .bind(Utc::now().to_rfc3339())
                .execute(&self.pool)
                .await
                .map_err(|e| ApplicationError::StorageError(e.to_string()))?;
            }
        }
        Ok(())
    }

    async fn awaiting_reason(
        &self,
        group_id: u64,
        channel_id: u64,
    ) -> Result<Vec<u64>, ApplicationError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id FROM user_states
            WHERE state = ? AND group_id = ? AND channel_id = ?
            ORDER BY updated_at ASC, user_id ASC
            "#,
        )
        .bind(AWAITING_REASON)
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| row.get::<i64, _>("user_id") as u64)
            .collect())
    }
}
