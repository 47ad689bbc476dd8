use crate::sync::source::SourceRole;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Bad call: {0}")]
    BadCall(String),

    #[error("Too much requested: {requested} bytes at offset {offset} exceeds source size {size}")]
    TooMuchRequested {
        offset: u64,
        requested: u64,
        size: u64,
    },

    #[error("Unexpected end of file at offset {offset}: expected {expected} bytes, got {actual}")]
    UnexpectedEof {
        offset: u64,
        expected: u64,
        actual: u64,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot open {role} file {path}: {source}")]
    OpenFailure {
        role: SourceRole,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Reference read failed: {length} bytes at offset {offset}: {source}")]
    ReferenceRead {
        offset: u64,
        length: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Output write failed: {0}")]
    OutputWrite(#[source] std::io::Error),

    #[error("Size mismatch: expected {expected} bytes, reconstructed {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("Unknown delta element kind: {0}")]
    UnknownElementKind(u32),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Coarse classification of [`SyncError`] for callers that only need to
/// decide how to report a failed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    BadCall,
    TooMuchRequested,
    Io,
    Open,
    UnknownElementKind,
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::BadCall(_) | SyncError::SizeMismatch { .. } => ErrorKind::BadCall,
            SyncError::TooMuchRequested { .. } => ErrorKind::TooMuchRequested,
            SyncError::UnexpectedEof { .. }
            | SyncError::Io(_)
            | SyncError::ReferenceRead { .. }
            | SyncError::OutputWrite(_) => ErrorKind::Io,
            SyncError::OpenFailure { .. } => ErrorKind::Open,
            SyncError::UnknownElementKind(_) | SyncError::Encoding(_) => {
                ErrorKind::UnknownElementKind
            }
        }
    }

    /// Short label used for metrics and log fields.
    pub fn label(&self) -> &'static str {
        match self {
            SyncError::BadCall(_) => "bad_call",
            SyncError::TooMuchRequested { .. } => "too_much_requested",
            SyncError::UnexpectedEof { .. } => "unexpected_eof",
            SyncError::Io(_) => "io",
            SyncError::OpenFailure { .. } => "open",
            SyncError::ReferenceRead { .. } => "reference_read",
            SyncError::OutputWrite(_) => "output_write",
            SyncError::SizeMismatch { .. } => "size_mismatch",
            SyncError::UnknownElementKind(_) => "unknown_element_kind",
            SyncError::Encoding(_) => "encoding",
        }
    }
}

impl From<bincode::Error> for SyncError {
    fn from(err: bincode::Error) -> Self {
        SyncError::Encoding(err.to_string())
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
