// Shared SQLite pool for every store.
//
// All feature stores run on one pool against one database file. WAL mode lets
// the audit-log flush and the gate's lookups proceed side by side, and the
// busy timeout makes SQLite wait for a lock before reporting "database is
// locked".

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_CONNECTIONS: u32 = 5;

// SQLite primary result codes. Extended codes keep these in the low byte.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Open (creating if needed) the database file and its parent directory.
pub async fn connect(database_path: &str) -> anyhow::Result<Pool<Sqlite>> {
    let path = Path::new(database_path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    tracing::info!(path = %database_path, "Connected to SQLite database");
    Ok(pool)
}

/// Whether the error means another writer holds the lock.
pub fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            let code_is_busy = db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
                .unwrap_or(false);
            code_is_busy || db.message().contains("database is locked")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

pub fn format_day(day: NaiveDate) -> String {
    day.format("%Y-%m-%d").to_string()
}

pub fn parse_day(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Single-connection in-memory pool. One connection, because every new
/// connection to `:memory:` would be a separate empty database.
#[cfg(test)]
pub async fn memory_pool() -> Pool<Sqlite> {
    SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Row;

    #[tokio::test]
    async fn test_connect_creates_nested_file_in_wal_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("whitelist.db");

        let pool = connect(path.to_str().unwrap()).await.unwrap();
        let mode: String = sqlx::query("PRAGMA journal_mode")
            .fetch_one(&pool)
            .await
            .unwrap()
            .get(0);

        assert!(path.exists());
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_day_format_round_trips() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(format_day(day), "2024-02-29");
        assert_eq!(parse_day("2024-02-29"), Some(day));
        assert_eq!(parse_day("yesterday"), None);
    }

    #[test]
    fn test_non_database_errors_are_not_busy() {
        assert!(!is_busy(&sqlx::Error::RowNotFound));
        assert!(is_busy(&sqlx::Error::PoolTimedOut));
    }
}
