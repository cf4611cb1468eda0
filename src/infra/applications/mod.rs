pub mod sqlite_application_store;
pub mod sqlite_user_state_store;

pub use sqlite_application_store::SqliteApplicationStore;
pub use sqlite_user_state_store::SqliteUserStateStore;
