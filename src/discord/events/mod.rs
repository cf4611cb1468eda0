// Gateway event handlers. main.rs routes FullEvent variants here.

pub mod interaction_events;
pub mod message_events;
pub mod workflow_replies;

pub use interaction_events::handle_component;
pub use message_events::handle_message;
