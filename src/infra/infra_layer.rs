// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule, all sharing one
// SQLite pool.

#[path = "sqlite/mod.rs"]
pub mod sqlite;

#[path = "whitelist/mod.rs"]
pub mod whitelist;

#[path = "settings/mod.rs"]
pub mod settings;

#[path = "applications/mod.rs"]
pub mod applications;

#[path = "throttle/mod.rs"]
pub mod throttle;

#[path = "recorder/mod.rs"]
pub mod recorder;
