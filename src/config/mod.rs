//! Block length and threshold configuration for sync passes

pub mod error;

pub use error::{ConfigError, ConfigResult};

use crate::sync::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default block length in bytes
pub const DEFAULT_BLOCK_SIZE: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Block length L used for indexing and matching
    pub block_size: usize,
    /// New files up to this size are sent raw without matching (0 disables)
    pub copy_all_threshold: u64,
    /// Trailing windows up to this size are sent raw without matching (0 disables)
    pub copy_tail_threshold: u64,
    /// Maximum payload of one raw-bytes element (0 means `block_size`)
    pub send_threshold: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            copy_all_threshold: 0,
            copy_tail_threshold: 0,
            send_threshold: 0,
        }
    }
}

impl SyncConfig {
    pub fn with_block_size(block_size: usize) -> Self {
        Self {
            block_size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> SyncResult<()> {
        if self.block_size == 0 {
            return Err(SyncError::BadCall("block size must be positive".into()));
        }
        if u32::try_from(self.block_size).is_err() {
            return Err(SyncError::BadCall(format!(
                "block size {} does not fit a delta length",
                self.block_size
            )));
        }
        Ok(())
    }

    pub fn effective_send_threshold(&self) -> usize {
        if self.send_threshold == 0 {
            self.block_size
        } else {
            self.send_threshold
        }
    }

    /// Load from a JSON file; absent fields keep their defaults.
    pub fn from_json_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }
}
