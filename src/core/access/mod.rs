pub mod access_policy;

pub use access_policy::*;
