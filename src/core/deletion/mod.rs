pub mod deletion_actor;

pub use deletion_actor::*;
