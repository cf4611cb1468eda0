// The core module contains all business logic.
// Each feature gets its own submodule. Nothing in here knows about Discord
// or SQLite; those live behind the traits each feature declares.

#[path = "clock.rs"]
pub mod clock;

#[path = "retry.rs"]
pub mod retry;

#[path = "transport.rs"]
pub mod transport;

#[path = "access/mod.rs"]
pub mod access;

#[path = "whitelist/mod.rs"]
pub mod whitelist;

#[path = "settings/mod.rs"]
pub mod settings;

#[path = "throttle/mod.rs"]
pub mod throttle;

#[path = "applications/mod.rs"]
pub mod applications;

#[path = "recorder/mod.rs"]
pub mod recorder;

#[path = "deletion/mod.rs"]
pub mod deletion;

#[path = "scheduler/mod.rs"]
pub mod scheduler;

#[path = "gate/mod.rs"]
pub mod gate;

#[cfg(test)]
#[path = "testing.rs"]
pub mod testing;
