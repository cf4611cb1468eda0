pub mod sqlite_blocked_store;

pub use sqlite_blocked_store::SqliteBlockedMessageStore;
