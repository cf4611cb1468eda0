pub mod sqlite_whitelist_store;

pub use sqlite_whitelist_store::SqliteWhitelistStore;
