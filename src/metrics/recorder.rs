//! Metrics recorder for sync passes

use crate::sync::ReconstructContext;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return; // Already initialized
    }

    describe_counter!(
        "deltasync_passes_started_total",
        "Total number of sync passes started"
    );
    describe_counter!(
        "deltasync_passes_completed_total",
        "Total number of sync passes completed successfully"
    );
    describe_counter!(
        "deltasync_passes_failed_total",
        "Total number of sync passes that failed"
    );
    describe_counter!(
        "deltasync_elements_total",
        "Delta elements produced, by kind"
    );
    describe_counter!(
        "deltasync_bytes_total",
        "Bytes of the new file covered by each kind of delta element"
    );
    describe_counter!(
        "deltasync_fast_collisions_total",
        "Fast checksum hits rejected by the strong checksum"
    );

    describe_gauge!("deltasync_active_passes", "Number of passes in progress");

    describe_histogram!("deltasync_pass_duration_seconds", "Duration of one pass");
    describe_histogram!("deltasync_file_size_bytes", "Size of the new file per pass");
    describe_histogram!(
        "deltasync_match_ratio",
        "Percentage of the new file reconstructed from the reference"
    );
}

/// Record a pass starting
pub fn record_pass_started(file_size: u64) {
    counter!("deltasync_passes_started_total").increment(1);
    gauge!("deltasync_active_passes").increment(1.0);
    histogram!("deltasync_file_size_bytes").record(file_size as f64);
}

/// Record a pass completing successfully
pub fn record_pass_complete(ctx: &ReconstructContext, duration: Duration) {
    counter!("deltasync_passes_completed_total").increment(1);
    gauge!("deltasync_active_passes").decrement(1.0);

    let delta = &ctx.delta;
    for (kind, count, bytes) in [
        ("reference", delta.reference_count, delta.reference_bytes),
        ("raw", delta.raw_count, delta.raw_bytes),
        ("tail", delta.tail_count, delta.tail_bytes),
        ("zero_diff", delta.zero_diff_count, delta.zero_diff_bytes),
    ] {
        counter!("deltasync_elements_total", "kind" => kind).increment(count);
        counter!("deltasync_bytes_total", "kind" => kind).increment(bytes);
    }
    counter!("deltasync_fast_collisions_total").increment(ctx.fast_collisions);

    histogram!("deltasync_pass_duration_seconds").record(duration.as_secs_f64());
    histogram!("deltasync_match_ratio").record(ctx.match_ratio());
}

/// Record a pass failing
pub fn record_pass_failed(reason: &'static str) {
    counter!("deltasync_passes_failed_total", "reason" => reason).increment(1);
    gauge!("deltasync_active_passes").decrement(1.0);
}

/// Times one pass and records its outcome
pub struct PassMetrics {
    start_time: Instant,
}

impl PassMetrics {
    /// Start tracking a new pass
    pub fn start(file_size: u64) -> Self {
        record_pass_started(file_size);

        Self {
            start_time: Instant::now(),
        }
    }

    /// Mark the pass as complete
    pub fn complete(self, ctx: &ReconstructContext) {
        record_pass_complete(ctx, self.start_time.elapsed());
    }

    /// Mark the pass as failed
    pub fn fail(self, reason: &'static str) {
        record_pass_failed(reason);
    }

    /// Get current duration
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
