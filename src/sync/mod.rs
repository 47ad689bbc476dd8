//! Delta synchronization engine
//!
//! Provides rsync-style delta transfer using a rolling fast checksum and a
//! strong hash over fixed-size, non-overlapping blocks of the reference
//! file. The flow is: reference → [`SignatureBuilder`] → [`BlockIndex`] →
//! [`DeltaBuilder`] (scanning the new file) → delta elements →
//! [`reconstruct`] (reading the reference) → output.

pub mod context;
pub mod delta;
pub mod error;
pub mod reconstruct;
pub mod rolling_hash;
pub mod signature;
pub mod source;
pub mod wire;

pub use context::{DeltaCounters, ReconstructContext};
pub use delta::{
    compute_delta, summarize, DeltaBuilder, DeltaElement, DeltaKind, DeltaStream, MatchParams,
    MatchStats,
};
pub use error::{ErrorKind, SyncError, SyncResult};
pub use reconstruct::{apply_to_bytes, reconstruct, Reconstructor};
pub use rolling_hash::{
    fast_checksum, fast_checksum_roll, fast_checksum_roll_tail, strong_checksum, ChecksumPair,
    RollingChecksum, FAST_CHECKSUM_MODULUS,
};
pub use signature::{build_index, BlockEntry, BlockIndex, Lookup, SignatureBuilder};
pub use source::{ReferenceSource, SourceRole, WindowReader};
pub use wire::{read_element, write_element, ElementReader};
