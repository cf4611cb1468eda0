// Channel whitelist - models and service.

pub mod whitelist_models;
pub mod whitelist_service;

pub use whitelist_models::*;
pub use whitelist_service::*;
