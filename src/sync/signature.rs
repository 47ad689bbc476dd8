//! Block index over the reference file
//!
//! The reference is split into non-overlapping blocks of `block_size`
//! bytes (the last one possibly shorter). Each block's checksum pair is
//! stored in a table keyed by its fast checksum; colliding blocks share a
//! bucket and are told apart by the strong checksum.

use crate::sync::error::{SyncError, SyncResult};
use crate::sync::rolling_hash::{strong_checksum, ChecksumPair};
use crate::sync::source::ReferenceSource;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Seek};

/// Index entry for one reference block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    pub checksum: ChecksumPair,
    /// Byte offset of the block in the reference
    pub reference: u64,
    /// Block length (less than the block size only for the tail)
    pub length: u32,
}

impl BlockEntry {
    pub fn new(reference: u64, data: &[u8]) -> Self {
        Self {
            checksum: ChecksumPair::compute(data),
            reference,
            length: data.len() as u32,
        }
    }

    /// Verify if data matches this block
    pub fn matches(&self, data: &[u8]) -> bool {
        data.len() == self.length as usize && self.checksum.matches(data)
    }
}

/// Outcome of looking up one window in the index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Hit(&'a BlockEntry),
    /// Fast checksum matched at least one block of the same length, the
    /// strong checksum none of them.
    Collision,
    Miss,
}

/// Hash table from fast checksum to the blocks carrying it
#[derive(Debug, Clone)]
pub struct BlockIndex {
    buckets: HashMap<u32, Vec<BlockEntry>>,
    block_size: usize,
    reference_size: u64,
    entry_count: usize,
}

impl BlockIndex {
    /// Create an empty index for a reference of `reference_size` bytes.
    pub fn new(block_size: usize, reference_size: u64) -> SyncResult<Self> {
        if block_size == 0 {
            return Err(SyncError::BadCall("block size must be positive".into()));
        }

        Ok(Self {
            buckets: HashMap::new(),
            block_size,
            reference_size,
            entry_count: 0,
        })
    }

    /// Build from entries computed elsewhere, e.g. received from the peer
    /// holding the reference.
    pub fn from_entries<I>(block_size: usize, reference_size: u64, entries: I) -> SyncResult<Self>
    where
        I: IntoIterator<Item = BlockEntry>,
    {
        let mut index = Self::new(block_size, reference_size)?;
        for entry in entries {
            index.insert(entry)?;
        }
        Ok(index)
    }

    pub fn insert(&mut self, entry: BlockEntry) -> SyncResult<()> {
        if entry.length == 0 || entry.length as usize > self.block_size {
            return Err(SyncError::BadCall(format!(
                "block length {} outside 1..={}",
                entry.length, self.block_size
            )));
        }
        if entry.reference.saturating_add(entry.length as u64) > self.reference_size {
            return Err(SyncError::TooMuchRequested {
                offset: entry.reference,
                requested: entry.length as u64,
                size: self.reference_size,
            });
        }

        self.buckets.entry(entry.checksum.fast).or_default().push(entry);
        self.entry_count += 1;
        Ok(())
    }

    pub fn block_count(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn reference_size(&self) -> u64 {
        self.reference_size
    }

    /// Blocks sharing the given fast checksum
    pub fn bucket(&self, fast: u32) -> &[BlockEntry] {
        self.buckets.get(&fast).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Look up a window whose fast checksum is already known.
    ///
    /// The strong checksum of `window` is only computed when the bucket
    /// holds a block of the same length.
    pub fn lookup(&self, fast: u32, window: &[u8]) -> Lookup<'_> {
        let mut candidates = self
            .bucket(fast)
            .iter()
            .filter(|entry| entry.length as usize == window.len())
            .peekable();

        if candidates.peek().is_none() {
            return Lookup::Miss;
        }

        let strong = strong_checksum(window);
        candidates
            .find(|entry| entry.checksum.strong == strong)
            .map_or(Lookup::Collision, Lookup::Hit)
    }

    /// All entries in reference order
    pub fn entries(&self) -> Vec<&BlockEntry> {
        let mut entries: Vec<&BlockEntry> = self.buckets.values().flatten().collect();
        entries.sort_by_key(|entry| entry.reference);
        entries
    }
}

/// Builder for block indexes
pub struct SignatureBuilder {
    block_size: usize,
}

impl SignatureBuilder {
    /// Create a new signature builder with default block size
    pub fn new() -> Self {
        Self {
            block_size: crate::config::DEFAULT_BLOCK_SIZE,
        }
    }

    /// Set the block size
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Build the index from a byte slice
    pub fn build_from_bytes(&self, data: &[u8]) -> SyncResult<BlockIndex> {
        let mut index = BlockIndex::new(self.block_size, data.len() as u64)?;
        let mut offset = 0u64;

        for chunk in data.chunks(self.block_size) {
            index.insert(BlockEntry::new(offset, chunk))?;
            offset += chunk.len() as u64;
        }

        Ok(index)
    }

    /// Build the index from a seekable reader (for large files)
    pub fn build_from_reader<R: Read + Seek>(&self, reader: &mut R) -> SyncResult<BlockIndex> {
        let mut source = ReferenceSource::from_seekable(reader)?;
        self.build_from_source(&mut source)
    }

    /// Build the index from a reference source of declared size
    pub fn build_from_source<R: Read + Seek>(
        &self,
        source: &mut ReferenceSource<R>,
    ) -> SyncResult<BlockIndex> {
        let size = source.size();
        let mut index = BlockIndex::new(self.block_size, size)?;
        let mut buffer = vec![0u8; (self.block_size as u64).min(size) as usize];
        let mut offset = 0u64;

        while offset < size {
            let length = (size - offset).min(self.block_size as u64) as usize;
            source.read_exact_at(offset, &mut buffer[..length])?;
            index.insert(BlockEntry::new(offset, &buffer[..length]))?;
            offset += length as u64;
        }

        tracing::debug!(
            block_size = self.block_size,
            reference_size = size,
            entries = index.block_count(),
            "built block index"
        );

        Ok(index)
    }
}

impl Default for SignatureBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Index a reference source, returning the index and its entry count.
pub fn build_index<R: Read + Seek>(
    reference: &mut ReferenceSource<R>,
    block_size: usize,
) -> SyncResult<(BlockIndex, usize)> {
    let index = SignatureBuilder::new()
        .block_size(block_size)
        .build_from_source(reference)?;
    let count = index.block_count();
    Ok((index, count))
}
