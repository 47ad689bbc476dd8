//! Command-line argument parsing for the `deltasync` binary.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};

use crate::config::{ConfigResult, SyncConfig};
use crate::push::PushOptions;

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for crate::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => crate::LogFormat::Text,
            CliLogFormat::Json => crate::LogFormat::Json,
        }
    }
}

/// deltasync - bring a file up to date from a newer copy by delta transfer.
#[derive(Debug, Parser)]
#[command(name = "deltasync", version, about)]
pub struct Cli {
    /// Increase verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long = "log-format", value_enum, default_value = "text", global = true)]
    pub log_format: CliLogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Update OLD so that it matches NEW
    Push(PushArgs),
}

#[derive(Debug, Args)]
pub struct PushArgs {
    /// Up-to-date file
    #[arg(value_name = "NEW")]
    pub new: PathBuf,

    /// Reference file to bring up to date
    #[arg(value_name = "OLD")]
    pub old: PathBuf,

    /// Write the result here and leave OLD untouched
    #[arg(short = 'r', long = "result", value_name = "PATH")]
    pub result: Option<PathBuf>,

    /// Block length in bytes
    #[arg(short = 'L', long = "block-size", value_name = "BYTES")]
    pub block_size: Option<usize>,

    /// Send new files up to this size raw (0 = never)
    #[arg(long = "copy-all-threshold", value_name = "BYTES")]
    pub copy_all_threshold: Option<u64>,

    /// Send trailing windows up to this size raw (0 = never)
    #[arg(long = "copy-tail-threshold", value_name = "BYTES")]
    pub copy_tail_threshold: Option<u64>,

    /// Largest raw-bytes element (0 = block length)
    #[arg(long = "send-threshold", value_name = "BYTES")]
    pub send_threshold: Option<usize>,

    /// Create OLD from NEW if it does not exist
    #[arg(short = 'f', long = "force")]
    pub force: bool,

    /// JSON file with default settings, overridden by the flags above
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print the pass summary as JSON on stdout
    #[arg(long = "json")]
    pub json: bool,
}

impl PushArgs {
    /// Merge the config file (if any) with the command-line overrides.
    pub fn sync_config(&self) -> ConfigResult<SyncConfig> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::from_json_file(path)?,
            None => SyncConfig::default(),
        };

        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(threshold) = self.copy_all_threshold {
            config.copy_all_threshold = threshold;
        }
        if let Some(threshold) = self.copy_tail_threshold {
            config.copy_tail_threshold = threshold;
        }
        if let Some(threshold) = self.send_threshold {
            config.send_threshold = threshold;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn push_options(&self) -> ConfigResult<PushOptions> {
        Ok(PushOptions {
            config: self.sync_config()?,
            force_create_reference: self.force,
            result_path: self.result.clone(),
        })
    }
}
