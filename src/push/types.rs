use crate::config::SyncConfig;
use std::path::PathBuf;

/// Options for a local push
#[derive(Debug, Clone, Default)]
pub struct PushOptions {
    pub config: SyncConfig,
    /// Copy the new file byte-for-byte when the old file does not exist
    pub force_create_reference: bool,
    /// Write the result here instead of replacing the old file
    pub result_path: Option<PathBuf>,
}

impl PushOptions {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn force_create(mut self, force: bool) -> Self {
        self.force_create_reference = force;
        self
    }

    pub fn result_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.result_path = Some(path.into());
        self
    }
}
