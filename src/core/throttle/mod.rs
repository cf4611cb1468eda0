pub mod prompt_throttle;

pub use prompt_throttle::*;
