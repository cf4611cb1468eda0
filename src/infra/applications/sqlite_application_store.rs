// SQLite-backed channel applications.
//
// Tables:
// - channel_applications: one slot per (group, channel), reopened on resubmission
//
// Every workflow step is a single UPDATE guarded by a WHERE clause that
// encodes the step's precondition. rows_affected tells the registry whether
// it won.

use crate::core::applications::{
    ApplicationError, ApplicationStatus, ApplicationStore, ChannelApplication, Decision,
    NewApplication,
};
use crate::core::whitelist::WhitelistEntry;
use crate::infra::sqlite::{format_day, parse_day, parse_timestamp};
use crate::infra::whitelist::sqlite_whitelist_store::insert_entry;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteApplicationStore {
    pool: Pool<Sqlite>,
}

impl SqliteApplicationStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Approval also writes `whitelisted_channels`, so the whitelist store
    /// must be migrated first.
    pub async fn migrate(&self) -> Result<(), ApplicationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_applications (
                group_id INTEGER NOT NULL,
                channel_id INTEGER NOT NULL,
                channel_title TEXT NOT NULL DEFAULT '',
                claimant_user_id INTEGER NOT NULL DEFAULT 0,
                reason TEXT NOT NULL DEFAULT '',
                applied_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                verified BOOLEAN NOT NULL DEFAULT 0,
                last_prompt_date TEXT,
                PRIMARY KEY (group_id, channel_id)
            );
            CREATE INDEX IF NOT EXISTS idx_channel_applications_status
                ON channel_applications(group_id, status);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        Ok(())
    }
}

fn row_to_application(row: &SqliteRow) -> ChannelApplication {
    let status: String = row.get("status");
    let applied_at: String = row.get("applied_at");
    let last_prompt_date: Option<String> = row.get("last_prompt_date");

    ChannelApplication {
        group_id: row.get::<i64, _>("group_id") as u64,
        channel_id: row.get::<i64, _>("channel_id") as u64,
        channel_title: row.get("channel_title"),
        claimant_user_id: row.get::<i64, _>("claimant_user_id") as u64,
        reason: row.get("reason"),
        applied_at: parse_timestamp(&applied_at),
        // An unreadable status is treated as closed so the slot can be reopened.
        status: ApplicationStatus::parse(&status).unwrap_or(ApplicationStatus::Rejected),
        verified: row.get("verified"),
        last_prompt_date: last_prompt_date.as_deref().and_then(parse_day),
    }
}

#[async_trait]
impl ApplicationStore for SqliteApplicationStore {
    async fn get(
        &self,
        group_id: u64,
        channel_id: u64,
    ) -> Result<Option<ChannelApplication>, ApplicationError> {
        let row = sqlx::query("SELECT * FROM channel_applications WHERE group_id = ? AND channel_id = ?")
            .bind(group_id as i64)
            .bind(channel_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        Ok(row.as_ref().map(row_to_application))
    }

    async fn list_pending(&self, group_id: u64) -> Result<Vec<ChannelApplication>, ApplicationError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM channel_applications
            WHERE group_id = ? AND status = 'pending'
            ORDER BY applied_at ASC
            "#,
        )
        .bind(group_id as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        Ok(rows.iter().map(row_to_application).collect())
    }

    async fn open(&self, application: NewApplication) -> Result<bool, ApplicationError> {
        let result = sqlx::query(
            r#"
            INSERT INTO channel_applications (
                group_id, channel_id, channel_title, claimant_user_id, reason,
                applied_at, status, verified, last_prompt_date
            )
            VALUES (?, ?, ?, 0, ?, ?, 'pending', 0, NULL)
            ON CONFLICT(group_id, channel_id) DO UPDATE SET
                channel_title = excluded.channel_title,
                claimant_user_id = 0,
                reason = excluded.reason,
                applied_at = excluded.applied_at,
                status = 'pending',
                verified = 0,
                last_prompt_date = NULL
            WHERE channel_applications.status != 'pending'
            "#,
        )
        .bind(application.group_id as i64)
        .bind(application.channel_id as i64)
        .bind(&application.channel_title)
        .bind(&application.reason)
        .bind(application.applied_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn claim(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
        reason: Option<&str>,
        verify: bool,
    ) -> Result<bool, ApplicationError> {
        let result = sqlx::query(
            r#"
            UPDATE channel_applications
            SET claimant_user_id = ?,
                reason = COALESCE(?, reason),
                verified = CASE WHEN ? THEN 1 ELSE verified END
            WHERE group_id = ? AND channel_id = ?
              AND status = 'pending'
              AND (claimant_user_id = 0 OR claimant_user_id = ?)
              AND (? = 0 OR verified = 0)
            "#,
        )
        .bind(user_id as i64)
        .bind(reason)
        .bind(verify)
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .bind(user_id as i64)
        .bind(verify)
        .execute(&self.pool)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_verified(
        &self,
        group_id: u64,
        channel_id: u64,
        user_id: u64,
    ) -> Result<bool, ApplicationError> {
        let result = sqlx::query(
            r#"
            UPDATE channel_applications
            SET verified = 1
            WHERE group_id = ? AND channel_id = ?
              AND status = 'pending'
              AND claimant_user_id = ? AND claimant_user_id != 0
              AND verified = 0
            "#,
        )
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .bind(user_id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn finalize(
        &self,
        group_id: u64,
        channel_id: u64,
        decision: Decision,
        whitelist_entry: Option<WhitelistEntry>,
    ) -> Result<bool, ApplicationError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ApplicationError::StorageError(e.to_string()))?;

        let updated = sqlx::query(
            r#"
            UPDATE channel_applications
            SET status = ?
            WHERE group_id = ? AND channel_id = ?
              AND status = 'pending' AND verified = 1
            "#,
        )
        .bind(decision.resulting_status().as_str())
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?
        .rows_affected();

        if updated == 0 {
            tx.rollback()
                .await
                .map_err(|e| ApplicationError::StorageError(e.to_string()))?;
            return Ok(false);
        }

        if let Some(entry) = whitelist_entry {
            insert_entry(&mut *tx, &entry)
                .await
                .map_err(|e| ApplicationError::StorageError(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| ApplicationError::StorageError(e.to_string()))?;
        Ok(true)
    }

    async fn set_last_prompt_date(
        &self,
        group_id: u64,
        channel_id: u64,
        day: NaiveDate,
    ) -> Result<(), ApplicationError> {
        sqlx::query(
            "UPDATE channel_applications SET last_prompt_date = ? WHERE group_id = ? AND channel_id = ?",
        )
        .bind(format_day(day))
        .bind(group_id as i64)
        .bind(channel_id as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| ApplicationError::StorageError(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::whitelist::WhitelistStore;
    use crate::infra::sqlite::{connect, memory_pool};
    use crate::infra::whitelist::SqliteWhitelistStore;
    use chrono::Utc;
    use std::sync::Arc;

    async fn stores(pool: Pool<Sqlite>) -> (SqliteApplicationStore, SqliteWhitelistStore) {
        let whitelist = SqliteWhitelistStore::new(pool.clone());
        whitelist.migrate().await.unwrap();
        let applications = SqliteApplicationStore::new(pool);
        applications.migrate().await.unwrap();
        (applications, whitelist)
    }

    fn new_application(reason: &str) -> NewApplication {
        NewApplication {
            group_id: 1,
            channel_id: 10,
            channel_title: "news".to_string(),
            reason: reason.to_string(),
            applied_at: Utc::now(),
        }
    }

    fn approval() -> WhitelistEntry {
        WhitelistEntry {
            group_id: 1,
            channel_id: 10,
            channel_title: "news".to_string(),
            added_by: 100,
            added_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_open_refuses_second_pending() {
        let (store, _) = stores(memory_pool().await).await;

        assert!(store.open(new_application("first")).await.unwrap());
        assert!(!store.open(new_application("second")).await.unwrap());

        let app = store.get(1, 10).await.unwrap().unwrap();
        assert_eq!(app.reason, "first");
        assert_eq!(app.status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn test_claim_is_conditional_on_claimant() {
        let (store, _) = stores(memory_pool().await).await;
        store.open(new_application("")).await.unwrap();

        assert!(store.claim(1, 10, 20, Some("fan page"), false).await.unwrap());
        assert!(store.claim(1, 10, 20, None, false).await.unwrap());
        assert!(!store.claim(1, 10, 21, Some("mine"), false).await.unwrap());

        let app = store.get(1, 10).await.unwrap().unwrap();
        assert_eq!(app.claimant_user_id, 20);
        assert_eq!(app.reason, "fan page");
    }

    #[tokio::test]
    async fn test_claim_can_verify_in_the_same_write() {
        let (store, _) = stores(memory_pool().await).await;
        store.open(new_application("news outlet")).await.unwrap();

        assert!(store.claim(1, 10, 20, None, true).await.unwrap());
        let app = store.get(1, 10).await.unwrap().unwrap();
        assert_eq!(app.claimant_user_id, 20);
        assert!(app.verified);

        // A verified slot is never verified twice, even by its claimant.
        assert!(!store.claim(1, 10, 20, None, true).await.unwrap());
        assert!(!store.claim(1, 10, 21, None, true).await.unwrap());
        assert!(!store.mark_verified(1, 10, 20).await.unwrap());
    }

    #[tokio::test]
    async fn test_finalize_approves_and_whitelists_once() {
        let (store, whitelist) = stores(memory_pool().await).await;
        store.open(new_application("news outlet")).await.unwrap();
        store.claim(1, 10, 20, None, false).await.unwrap();

        // Not verified yet.
        assert!(!store
            .finalize(1, 10, Decision::Approve, Some(approval()))
            .await
            .unwrap());
        assert!(!whitelist.is_whitelisted(1, 10).await.unwrap());

        assert!(store.mark_verified(1, 10, 20).await.unwrap());
        assert!(!store.mark_verified(1, 10, 20).await.unwrap());

        assert!(store
            .finalize(1, 10, Decision::Approve, Some(approval()))
            .await
            .unwrap());
        assert!(!store
            .finalize(1, 10, Decision::Reject, None)
            .await
            .unwrap());

        let app = store.get(1, 10).await.unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Approved);
        assert!(whitelist.is_whitelisted(1, 10).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejected_slot_is_reopened_fresh() {
        let (store, _) = stores(memory_pool().await).await;
        store.open(new_application("first")).await.unwrap();
        store.claim(1, 10, 20, None, false).await.unwrap();
        store.mark_verified(1, 10, 20).await.unwrap();
        store.finalize(1, 10, Decision::Reject, None).await.unwrap();
        store
            .set_last_prompt_date(1, 10, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap())
            .await
            .unwrap();

        assert!(store.open(new_application("second")).await.unwrap());

        let app = store.get(1, 10).await.unwrap().unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert_eq!(app.claimant_user_id, 0);
        assert!(!app.verified);
        assert_eq!(app.reason, "second");
        assert_eq!(app.last_prompt_date, None);
        assert_eq!(store.list_pending(1).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_leave_one_pending() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.db");
        let pool = connect(path.to_str().unwrap()).await.unwrap();
        let (store, _) = stores(pool).await;
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.open(new_application(&format!("reason {i}"))).await
            }));
        }

        let mut opened = 0;
        for handle in handles {
            if handle.await.unwrap().unwrap() {
                opened += 1;
            }
        }

        assert_eq!(opened, 1);
        assert_eq!(store.list_pending(1).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_claims_have_one_winner() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("claims.db");
        let pool = connect(path.to_str().unwrap()).await.unwrap();
        let (store, _) = stores(pool).await;
        let store = Arc::new(store);
        store.open(new_application("news outlet")).await.unwrap();

        let mut handles = Vec::new();
        for user_id in 20..28u64 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let won = store.claim(1, 10, user_id, None, true).await?;
                Ok::<_, ApplicationError>((user_id, won))
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            let (user_id, won) = handle.await.unwrap().unwrap();
            if won {
                winners.push(user_id);
            }
        }

        assert_eq!(winners.len(), 1);
        let app = store.get(1, 10).await.unwrap().unwrap();
        assert_eq!(app.claimant_user_id, winners[0]);
        assert!(app.verified);
    }
}
