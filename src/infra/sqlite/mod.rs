pub mod sqlite_pool;

pub use sqlite_pool::*;
