//! deltasync - rsync-style delta synchronization
//!
//! Indexes a reference file into fixed-size blocks, scans a new file with a
//! rolling checksum to find blocks it shares with the reference, and rebuilds
//! the new file from reference blocks plus literal bytes.

pub mod cli;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod push;
pub mod sync;

pub use config::{ConfigError, SyncConfig};
pub use logging::{init_logging, LogFormat};
pub use push::{local_push, local_push_async, PushOptions};
pub use sync::{ReconstructContext, SyncError, SyncResult};
