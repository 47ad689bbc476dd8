//! Local push: index, match and reconstruct two files on one filesystem

pub mod local;
pub mod types;

pub use local::{local_push, local_push_async};
pub use types::PushOptions;
