pub mod sqlite_prompt_store;

pub use sqlite_prompt_store::SqlitePromptStore;
