//! Wire encoding of checksums, block entries and delta elements
//!
//! All integers are fixed-width big-endian, the strong checksum is its raw
//! 16 bytes. A delta element starts with its `u32` kind tag; raw bytes
//! carry a `u64` length prefix.

use crate::sync::delta::{DeltaElement, DeltaKind};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::rolling_hash::ChecksumPair;
use crate::sync::signature::BlockEntry;
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};

/// Encoded size of a [`ChecksumPair`]
pub const CHECKSUM_PAIR_LEN: usize = 20;
/// Encoded size of a [`BlockEntry`]
pub const BLOCK_ENTRY_LEN: usize = 32;

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

fn encode<T: Serialize>(value: &T) -> SyncResult<Vec<u8>> {
    Ok(options().serialize(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> SyncResult<T> {
    Ok(options().deserialize(bytes)?)
}

impl ChecksumPair {
    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        decode(bytes)
    }
}

impl BlockEntry {
    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        decode(bytes)
    }
}

impl DeltaElement {
    pub fn to_bytes(&self) -> SyncResult<Vec<u8>> {
        encode(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> SyncResult<Self> {
        if bytes.len() < 4 {
            return Err(SyncError::Encoding(format!(
                "delta element needs at least 4 bytes, got {}",
                bytes.len()
            )));
        }
        let tag = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        DeltaKind::from_tag(tag)?;
        decode(bytes)
    }
}

/// Write one element to a byte stream
pub fn write_element<W: Write>(writer: &mut W, element: &DeltaElement) -> SyncResult<()> {
    options().serialize_into(writer, element)?;
    Ok(())
}

/// Read the next element, `None` at a clean end of stream
pub fn read_element<R: Read>(reader: &mut R) -> SyncResult<Option<DeltaElement>> {
    let mut tag = [0u8; 4];
    let mut filled = 0;

    while filled < tag.len() {
        match reader.read(&mut tag[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(SyncError::UnexpectedEof {
                    offset: 0,
                    expected: tag.len() as u64,
                    actual: filled as u64,
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    DeltaKind::from_tag(u32::from_be_bytes(tag))?;
    let element = options().deserialize_from((&tag[..]).chain(reader))?;
    Ok(Some(element))
}

/// Iterator over the elements of an encoded delta stream
pub struct ElementReader<R> {
    reader: R,
    failed: bool,
}

impl<R: Read> ElementReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            failed: false,
        }
    }
}

impl<R: Read> Iterator for ElementReader<R> {
    type Item = SyncResult<DeltaElement>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match read_element(&mut self.reader) {
            Ok(element) => element.map(Ok),
            Err(err) => {
                self.failed = true;
                Some(Err(err))
            }
        }
    }
}
