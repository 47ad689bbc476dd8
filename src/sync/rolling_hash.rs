//! Rolling checksum implementation for delta transfer
//!
//! The fast checksum is an Adler-style pair of running sums `r1, r2`
//! reduced modulo [`FAST_CHECKSUM_MODULUS`] and packed as `(r2 << 16) | r1`.
//! Unlike zlib's Adler-32, `r1` starts at zero, so the checksum of an
//! empty window is zero. A window can be rolled forward by one byte, or
//! shrunk from the front when no byte is left to enter, in O(1).
//!
//! When the fast checksum hits a block, a strong hash (BLAKE3, truncated
//! to 128 bits) confirms it.

use serde::{Deserialize, Serialize};

/// Modulus for both running sums (largest prime < 2^16).
pub const FAST_CHECKSUM_MODULUS: u32 = 65521;

/// Largest number of bytes that can be summed before `r2` may overflow a
/// `u32`, given both sums start below the modulus.
const REDUCE_BATCH: usize = 5552;

/// Size in bytes of the strong checksum.
pub const STRONG_CHECKSUM_LEN: usize = 16;

/// Compute the fast checksum of a byte window.
pub fn fast_checksum(data: &[u8]) -> u32 {
    let mut r1: u32 = 0;
    let mut r2: u32 = 0;

    for batch in data.chunks(REDUCE_BATCH) {
        for &byte in batch {
            r1 += byte as u32;
            r2 += r1;
        }
        r1 %= FAST_CHECKSUM_MODULUS;
        r2 %= FAST_CHECKSUM_MODULUS;
    }

    pack(r1, r2)
}

/// Roll the window forward by one byte.
///
/// Given the checksum of `[x0, x1, ..., x(n-1)]`, returns the checksum of
/// `[x1, ..., x(n-1), entering]` where `x0 == leaving` and
/// `n == window_len`:
///
/// - `r1' = r1 - x0 + entering`
/// - `r2' = r2 + r1' - n * x0`
pub fn fast_checksum_roll(prev: u32, leaving: u8, entering: u8, window_len: usize) -> u32 {
    let (r1, r2) = unpack(prev);
    let r1 = (r1 + FAST_CHECKSUM_MODULUS - leaving as u32 + entering as u32)
        % FAST_CHECKSUM_MODULUS;
    let r2 = (r2 + r1 + FAST_CHECKSUM_MODULUS - weighted(window_len, leaving))
        % FAST_CHECKSUM_MODULUS;
    pack(r1, r2)
}

/// Shrink the window from the front by one byte with nothing entering.
///
/// `new_window_len` is the length after `leaving` has been removed, so the
/// previous window was `new_window_len + 1` bytes long.
pub fn fast_checksum_roll_tail(prev: u32, leaving: u8, new_window_len: usize) -> u32 {
    let (r1, r2) = unpack(prev);
    let r1 = (r1 + FAST_CHECKSUM_MODULUS - leaving as u32) % FAST_CHECKSUM_MODULUS;
    let r2 = (r2 + FAST_CHECKSUM_MODULUS - weighted(new_window_len + 1, leaving))
        % FAST_CHECKSUM_MODULUS;
    pack(r1, r2)
}

/// Compute the strong checksum (BLAKE3 truncated to 128 bits).
pub fn strong_checksum(data: &[u8]) -> [u8; STRONG_CHECKSUM_LEN] {
    let full_hash = blake3::hash(data);
    let mut strong = [0u8; STRONG_CHECKSUM_LEN];
    strong.copy_from_slice(&full_hash.as_bytes()[..STRONG_CHECKSUM_LEN]);
    strong
}

// `n * byte mod M` without overflowing for large windows.
fn weighted(n: usize, byte: u8) -> u32 {
    let n = (n as u64 % FAST_CHECKSUM_MODULUS as u64) as u32;
    n * byte as u32 % FAST_CHECKSUM_MODULUS
}

fn pack(r1: u32, r2: u32) -> u32 {
    (r2 << 16) | r1
}

fn unpack(checksum: u32) -> (u32, u32) {
    (checksum & 0xFFFF, checksum >> 16)
}

/// Fast and strong checksum of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecksumPair {
    pub fast: u32,
    pub strong: [u8; STRONG_CHECKSUM_LEN],
}

impl ChecksumPair {
    pub fn compute(data: &[u8]) -> Self {
        Self {
            fast: fast_checksum(data),
            strong: strong_checksum(data),
        }
    }

    /// Check whether `data` has this checksum, strong hash computed only
    /// when the fast one agrees.
    pub fn matches(&self, data: &[u8]) -> bool {
        fast_checksum(data) == self.fast && strong_checksum(data) == self.strong
    }
}

/// Stateful fast checksum over a sliding window.
#[derive(Debug, Clone, Default)]
pub struct RollingChecksum {
    digest: u32,
    window_len: usize,
}

impl RollingChecksum {
    pub fn new() -> Self {
        Self::default()
    }

    /// Recompute from scratch over a whole window
    pub fn update_block(&mut self, data: &[u8]) {
        self.digest = fast_checksum(data);
        self.window_len = data.len();
    }

    /// Slide the window forward: `old_byte` leaves, `new_byte` enters.
    pub fn roll_byte(&mut self, old_byte: u8, new_byte: u8) {
        self.digest = fast_checksum_roll(self.digest, old_byte, new_byte, self.window_len);
    }

    /// Drop `old_byte` from the front of the window.
    pub fn roll_out(&mut self, old_byte: u8) {
        debug_assert!(self.window_len > 0);
        self.window_len -= 1;
        self.digest = fast_checksum_roll_tail(self.digest, old_byte, self.window_len);
    }

    pub fn digest(&self) -> u32 {
        self.digest
    }

    pub fn window_len(&self) -> usize {
        self.window_len
    }
}
