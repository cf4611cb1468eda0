// Moderation gate - per-post decisions.

pub mod gate_models;
pub mod moderation_gate;

pub use gate_models::*;
pub use moderation_gate::*;
