//! Metrics for sync passes
//!
//! Records through the `metrics` facade; installing an exporter is left to
//! the embedding process.
//!
//! Key metrics:
//! - Passes started, completed and failed
//! - Bytes reconstructed by reference, raw, tail and zero-diff elements
//! - Fast-checksum collisions
//! - Pass duration

pub mod recorder;

pub use recorder::{
    init_metrics, record_pass_complete, record_pass_failed, record_pass_started, PassMetrics,
};
