// Channel applications - models and the registry state machine.

pub mod application_models;
pub mod application_registry;

pub use application_models::*;
pub use application_registry::*;
