//! Per-session configuration and counters

use crate::config::SyncConfig;
use crate::sync::delta::{DeltaElement, MatchParams, MatchStats};
use crate::sync::error::SyncResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use uuid::Uuid;

/// Element and byte totals, one pair per delta element kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeltaCounters {
    pub reference_count: u64,
    pub reference_bytes: u64,
    pub raw_count: u64,
    pub raw_bytes: u64,
    pub tail_count: u64,
    pub tail_bytes: u64,
    pub zero_diff_count: u64,
    pub zero_diff_bytes: u64,
}

impl DeltaCounters {
    pub fn record(&mut self, element: &DeltaElement) {
        let length = element.length();
        match element {
            DeltaElement::Reference { .. } => {
                self.reference_count += 1;
                self.reference_bytes += length;
            }
            DeltaElement::RawBytes { .. } => {
                self.raw_count += 1;
                self.raw_bytes += length;
            }
            DeltaElement::Tail { .. } => {
                self.tail_count += 1;
                self.tail_bytes += length;
            }
            DeltaElement::ZeroDiff { .. } => {
                self.zero_diff_count += 1;
                self.zero_diff_bytes += length;
            }
        }
    }

    pub fn element_count(&self) -> u64 {
        self.reference_count + self.raw_count + self.tail_count + self.zero_diff_count
    }

    pub fn total_bytes(&self) -> u64 {
        self.reference_bytes + self.raw_bytes + self.tail_bytes + self.zero_diff_bytes
    }

    /// Bytes that did not have to be sent literally
    pub fn matched_bytes(&self) -> u64 {
        self.reference_bytes + self.tail_bytes + self.zero_diff_bytes
    }
}

/// State carried through one matching + reconstruction pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconstructContext {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,

    pub block_size: usize,
    pub copy_all_threshold: u64,
    pub copy_tail_threshold: u64,
    pub send_threshold: usize,

    /// Entries in the block index built from the reference
    pub index_entries: u64,
    /// Elements produced by the match engine
    pub delta: DeltaCounters,
    /// Elements applied by the reconstruction engine
    pub reconstructed: DeltaCounters,
    /// Fast-checksum hits rejected by the strong checksum
    pub fast_collisions: u64,
    pub copy_all_threshold_fired: bool,
    pub copy_tail_threshold_fired: bool,
    /// Reference was missing and the new file was copied instead
    pub force_created: bool,
    pub bytes_written: u64,
}

impl ReconstructContext {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        config.validate()?;

        Ok(Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            block_size: config.block_size,
            copy_all_threshold: config.copy_all_threshold,
            copy_tail_threshold: config.copy_tail_threshold,
            send_threshold: config.effective_send_threshold(),
            index_entries: 0,
            delta: DeltaCounters::default(),
            reconstructed: DeltaCounters::default(),
            fast_collisions: 0,
            copy_all_threshold_fired: false,
            copy_tail_threshold_fired: false,
            force_created: false,
            bytes_written: 0,
        })
    }

    pub fn match_params(&self) -> MatchParams {
        MatchParams {
            block_size: self.block_size,
            copy_all_threshold: self.copy_all_threshold,
            copy_tail_threshold: self.copy_tail_threshold,
            send_threshold: self.send_threshold,
        }
    }

    /// Fold the results of a finished match pass into the context.
    pub fn record_match(&mut self, stats: &MatchStats) {
        self.delta = stats.counters;
        self.fast_collisions = stats.fast_collisions;
        self.copy_all_threshold_fired = stats.copy_all_threshold_fired;
        self.copy_tail_threshold_fired = stats.copy_tail_threshold_fired;
    }

    /// Percentage of the new file that was reconstructed from the reference
    pub fn match_ratio(&self) -> f64 {
        let total = self.delta.total_bytes();
        if total == 0 {
            return 0.0;
        }
        self.delta.matched_bytes() as f64 / total as f64 * 100.0
    }
}

impl fmt::Display for ReconstructContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L={}: {} ref ({} B), {} raw ({} B), {} tail ({} B), {} zero-diff ({} B), {:.1}% matched, {} written",
            self.block_size,
            self.delta.reference_count,
            self.delta.reference_bytes,
            self.delta.raw_count,
            self.delta.raw_bytes,
            self.delta.tail_count,
            self.delta.tail_bytes,
            self.delta.zero_diff_count,
            self.delta.zero_diff_bytes,
            self.match_ratio(),
            self.bytes_written
        )
    }
}
