// Blocked-message audit trail.

pub mod blocked_recorder;
pub mod recorder_models;

pub use blocked_recorder::*;
pub use recorder_models::*;
