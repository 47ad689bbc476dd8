//! Delta computation between a block index and a new file
//!
//! The new file is scanned with a window of the index's block length.
//! While the window misses, its leading byte joins a pending raw run and the
//! fast checksum is rolled one byte forward; on a confirmed hit the raw run
//! is flushed, a back-reference is emitted and the window jumps past the
//! matched block. Near the end of the file the window shrinks from the front
//! so the reference's short tail block can still be found.

use crate::sync::context::{DeltaCounters, ReconstructContext};
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::rolling_hash::{fast_checksum, RollingChecksum};
use crate::sync::signature::{BlockEntry, BlockIndex, Lookup};
use crate::sync::source::WindowReader;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::{Cursor, Read};

/// Upper bound on one read when bytes are copied raw without matching
const RAW_READ_CHUNK: usize = 64 * 1024;

/// Instructions for reconstructing the new file
///
/// Variant order fixes the wire tag of each kind, see [`DeltaKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeltaElement {
    /// Copy `length` bytes of the reference at `block_offset`
    Reference { block_offset: u64, length: u32 },
    /// Literal bytes absent from the reference
    RawBytes { bytes: Vec<u8> },
    /// The new file equals the reference; copy `length` bytes from offset 0
    ZeroDiff { length: u64 },
    /// Copy the reference's short trailing block
    Tail { block_offset: u64, length: u32 },
}

impl DeltaElement {
    /// Number of bytes this element contributes to the output
    pub fn length(&self) -> u64 {
        match self {
            DeltaElement::Reference { length, .. } | DeltaElement::Tail { length, .. } => {
                *length as u64
            }
            DeltaElement::RawBytes { bytes } => bytes.len() as u64,
            DeltaElement::ZeroDiff { length } => *length,
        }
    }

    pub fn kind(&self) -> DeltaKind {
        match self {
            DeltaElement::Reference { .. } => DeltaKind::Reference,
            DeltaElement::RawBytes { .. } => DeltaKind::RawBytes,
            DeltaElement::ZeroDiff { .. } => DeltaKind::ZeroDiff,
            DeltaElement::Tail { .. } => DeltaKind::Tail,
        }
    }
}

/// Kind tag of a delta element as it appears on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    Reference = 0,
    RawBytes = 1,
    ZeroDiff = 2,
    Tail = 3,
}

impl DeltaKind {
    pub fn tag(self) -> u32 {
        self as u32
    }

    pub fn from_tag(tag: u32) -> SyncResult<Self> {
        match tag {
            0 => Ok(DeltaKind::Reference),
            1 => Ok(DeltaKind::RawBytes),
            2 => Ok(DeltaKind::ZeroDiff),
            3 => Ok(DeltaKind::Tail),
            other => Err(SyncError::UnknownElementKind(other)),
        }
    }
}

/// Count elements and bytes per kind
pub fn summarize(elements: &[DeltaElement]) -> DeltaCounters {
    let mut counters = DeltaCounters::default();
    for element in elements {
        counters.record(element);
    }
    counters
}

/// Block length and thresholds for one match pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchParams {
    pub block_size: usize,
    pub copy_all_threshold: u64,
    pub copy_tail_threshold: u64,
    pub send_threshold: usize,
}

impl MatchParams {
    fn validate(&self, index: &BlockIndex) -> SyncResult<()> {
        if self.block_size == 0 {
            return Err(SyncError::BadCall("block size must be positive".into()));
        }
        if self.block_size != index.block_size() {
            return Err(SyncError::BadCall(format!(
                "block size {} does not match index block size {}",
                self.block_size,
                index.block_size()
            )));
        }
        if self.send_threshold == 0 {
            return Err(SyncError::BadCall("send threshold must be positive".into()));
        }
        Ok(())
    }
}

/// What a finished (or partially drained) pass produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchStats {
    pub counters: DeltaCounters,
    pub fast_collisions: u64,
    pub copy_all_threshold_fired: bool,
    pub copy_tail_threshold_fired: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Scanning,
    /// Everything from the current offset on is sent as raw bytes
    RawRest,
    Done,
}

fn element_for(entry: &BlockEntry, block_size: usize) -> DeltaElement {
    if (entry.length as usize) < block_size {
        DeltaElement::Tail {
            block_offset: entry.reference,
            length: entry.length,
        }
    } else {
        DeltaElement::Reference {
            block_offset: entry.reference,
            length: entry.length,
        }
    }
}

// Append to the pending run, emitting a raw element whenever it fills up.
fn push_raw(
    pending: &mut Vec<u8>,
    ready: &mut VecDeque<DeltaElement>,
    send_threshold: usize,
    mut bytes: &[u8],
) {
    while !bytes.is_empty() {
        let take = (send_threshold - pending.len()).min(bytes.len());
        pending.extend_from_slice(&bytes[..take]);
        bytes = &bytes[take..];

        if pending.len() == send_threshold {
            ready.push_back(DeltaElement::RawBytes {
                bytes: std::mem::take(pending),
            });
        }
    }
}

fn flush_pending(pending: &mut Vec<u8>, ready: &mut VecDeque<DeltaElement>) {
    if !pending.is_empty() {
        ready.push_back(DeltaElement::RawBytes {
            bytes: std::mem::take(pending),
        });
    }
}

/// Ordered, one-shot sequence of delta elements for a new file.
///
/// Elements are produced lazily as the iterator is driven. After an error
/// the stream yields nothing more; a pass can only be restarted by building
/// a new stream.
pub struct DeltaStream<'a, R> {
    index: &'a BlockIndex,
    reader: WindowReader<R>,
    params: MatchParams,
    phase: Phase,
    offset: u64,
    rolling: RollingChecksum,
    /// `rolling` holds the checksum of the window at `offset`
    fresh: bool,
    pending: Vec<u8>,
    ready: VecDeque<DeltaElement>,
    stats: MatchStats,
}

impl<'a, R: Read> DeltaStream<'a, R> {
    fn new(index: &'a BlockIndex, reader: WindowReader<R>, params: MatchParams) -> Self {
        Self {
            index,
            reader,
            params,
            phase: Phase::Start,
            offset: 0,
            rolling: RollingChecksum::new(),
            fresh: false,
            pending: Vec::new(),
            ready: VecDeque::new(),
            stats: MatchStats::default(),
        }
    }

    /// Declared size of the new file
    pub fn size(&self) -> u64 {
        self.reader.size()
    }

    /// Statistics of the elements yielded so far
    pub fn stats(&self) -> &MatchStats {
        &self.stats
    }

    fn step(&mut self) -> SyncResult<()> {
        match self.phase {
            Phase::Start => self.start(),
            Phase::Scanning => self.scan(),
            Phase::RawRest => self.send_raw_rest(),
            Phase::Done => Ok(()),
        }
    }

    fn start(&mut self) -> SyncResult<()> {
        let size = self.reader.size();

        if size == 0 {
            self.phase = Phase::Done;
        } else if self.params.copy_all_threshold > 0 && size <= self.params.copy_all_threshold {
            self.stats.copy_all_threshold_fired = true;
            self.phase = Phase::RawRest;
        } else if size <= self.params.block_size as u64 {
            self.match_whole(size)?;
        } else {
            self.phase = Phase::Scanning;
        }

        Ok(())
    }

    // The whole file fits in one window: it is either the reference itself
    // or raw bytes.
    fn match_whole(&mut self, size: u64) -> SyncResult<()> {
        let index = self.index;
        let window = self.reader.window(0, size as usize)?;

        match index.lookup(fast_checksum(window), window) {
            Lookup::Hit(entry) if entry.reference == 0 && index.reference_size() == size => {
                self.ready.push_back(DeltaElement::ZeroDiff { length: size });
                self.offset = size;
                self.phase = Phase::Done;
            }
            Lookup::Hit(_) | Lookup::Miss => self.phase = Phase::RawRest,
            Lookup::Collision => {
                self.stats.fast_collisions += 1;
                self.phase = Phase::RawRest;
            }
        }

        Ok(())
    }

    fn scan(&mut self) -> SyncResult<()> {
        let index = self.index;
        let size = self.reader.size();
        let block_size = self.params.block_size;
        let send_threshold = self.params.send_threshold;

        while self.ready.is_empty() {
            if self.offset >= size {
                flush_pending(&mut self.pending, &mut self.ready);
                self.phase = Phase::Done;
                break;
            }

            let remaining = size - self.offset;
            let window_len = remaining.min(block_size as u64) as usize;

            if window_len < block_size
                && self.params.copy_tail_threshold > 0
                && remaining <= self.params.copy_tail_threshold
            {
                self.stats.copy_tail_threshold_fired = true;
                self.phase = Phase::RawRest;
                break;
            }

            let window = self.reader.window(self.offset, window_len)?;
            if !self.fresh {
                self.rolling.update_block(window);
                self.fresh = true;
            }
            let leaving = window[0];

            match index.lookup(self.rolling.digest(), window) {
                Lookup::Hit(entry) => {
                    tracing::trace!(
                        offset = self.offset,
                        block_offset = entry.reference,
                        length = entry.length,
                        "block match"
                    );
                    flush_pending(&mut self.pending, &mut self.ready);
                    self.ready.push_back(element_for(entry, block_size));
                    self.offset += window_len as u64;
                    self.fresh = false;
                    continue;
                }
                Lookup::Collision => self.stats.fast_collisions += 1,
                Lookup::Miss => {}
            }

            let next = self.offset + window_len as u64;
            if next < size {
                let entering = self.reader.byte(next)?;
                self.rolling.roll_byte(leaving, entering);
            } else {
                self.rolling.roll_out(leaving);
            }
            push_raw(&mut self.pending, &mut self.ready, send_threshold, &[leaving]);
            self.offset += 1;
        }

        Ok(())
    }

    fn send_raw_rest(&mut self) -> SyncResult<()> {
        let size = self.reader.size();
        if self.offset >= size {
            flush_pending(&mut self.pending, &mut self.ready);
            self.phase = Phase::Done;
            return Ok(());
        }

        let chunk = RAW_READ_CHUNK.max(self.params.send_threshold) as u64;
        let len = (size - self.offset).min(chunk) as usize;
        let window = self.reader.window(self.offset, len)?;
        push_raw(
            &mut self.pending,
            &mut self.ready,
            self.params.send_threshold,
            window,
        );
        self.offset += len as u64;

        Ok(())
    }
}

impl<'a, R: Read> Iterator for DeltaStream<'a, R> {
    type Item = SyncResult<DeltaElement>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(element) = self.ready.pop_front() {
                self.stats.counters.record(&element);
                return Some(Ok(element));
            }

            if self.phase == Phase::Done {
                return None;
            }

            if let Err(err) = self.step() {
                self.phase = Phase::Done;
                self.pending.clear();
                self.ready.clear();
                return Some(Err(err));
            }
        }
    }
}

/// Builder for match passes
pub struct DeltaBuilder<'a, R> {
    index: &'a BlockIndex,
    params: MatchParams,
    source: Option<(R, u64)>,
}

impl<'a, R: Read> DeltaBuilder<'a, R> {
    /// Create a builder matching against `index`
    pub fn new(index: &'a BlockIndex, params: MatchParams) -> Self {
        Self {
            index,
            params,
            source: None,
        }
    }

    /// Set the new file and its size
    pub fn source(mut self, reader: R, size: u64) -> Self {
        self.source = Some((reader, size));
        self
    }

    /// Start the pass, yielding elements lazily
    pub fn stream(self) -> SyncResult<DeltaStream<'a, R>> {
        let (reader, size) = self
            .source
            .ok_or_else(|| SyncError::BadCall("no new source given".into()))?;
        self.params.validate(self.index)?;

        Ok(DeltaStream::new(
            self.index,
            WindowReader::new(reader, size),
            self.params,
        ))
    }

    /// Run the pass to completion, recording its results in `ctx`.
    ///
    /// Nothing is returned when the pass fails part way.
    pub fn collect_into(self, ctx: &mut ReconstructContext) -> SyncResult<Vec<DeltaElement>> {
        if self.params.block_size != ctx.block_size {
            return Err(SyncError::BadCall(format!(
                "block size {} does not match session block size {}",
                self.params.block_size, ctx.block_size
            )));
        }

        let index = self.index;
        let mut stream = self.stream()?;
        let elements = stream.by_ref().collect::<SyncResult<Vec<_>>>()?;

        ctx.index_entries = index.block_count() as u64;
        ctx.record_match(stream.stats());

        tracing::debug!(
            session = %ctx.session_id,
            size = stream.size(),
            references = ctx.delta.reference_count,
            raw = ctx.delta.raw_count,
            raw_bytes = ctx.delta.raw_bytes,
            tails = ctx.delta.tail_count,
            zero_diff = ctx.delta.zero_diff_count,
            collisions = ctx.fast_collisions,
            "delta computed"
        );

        Ok(elements)
    }
}

/// Compute the delta of an in-memory new file against `index`.
pub fn compute_delta(
    ctx: &mut ReconstructContext,
    index: &BlockIndex,
    new: &[u8],
) -> SyncResult<Vec<DeltaElement>> {
    DeltaBuilder::new(index, ctx.match_params())
        .source(Cursor::new(new), new.len() as u64)
        .collect_into(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::sync::reconstruct::apply_to_bytes;
    use crate::sync::signature::SignatureBuilder;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen()).collect()
    }

    fn run(config: SyncConfig, old: &[u8], new: &[u8]) -> (Vec<DeltaElement>, ReconstructContext) {
        let mut ctx = ReconstructContext::new(&config).unwrap();
        let index = SignatureBuilder::new()
            .block_size(config.block_size)
            .build_from_bytes(old)
            .unwrap();
        let elements = compute_delta(&mut ctx, &index, new).unwrap();

        assert_eq!(apply_to_bytes(&elements, old).unwrap(), new);
        assert_eq!(ctx.delta.total_bytes(), new.len() as u64);
        (elements, ctx)
    }

    #[test]
    fn test_identical_files() {
        let data = random_bytes(4096, 1);
        let (elements, ctx) = run(SyncConfig::with_block_size(512), &data, &data);

        assert_eq!(elements.len(), 8);
        assert_eq!(ctx.delta.reference_count, 8);
        assert_eq!(ctx.delta.raw_bytes, 0);
        assert_eq!(ctx.match_ratio(), 100.0);
    }

    #[test]
    fn test_completely_different_files() {
        let source = b"AAAAAAAAAAAAAAAA";
        let target = b"BBBBBBBBBBBBBBBB";
        let (_, ctx) = run(SyncConfig::with_block_size(4), source, target);

        assert_eq!(ctx.delta.matched_bytes(), 0);
        assert_eq!(ctx.delta.raw_bytes, 16);
        // send threshold defaults to the block size
        assert_eq!(ctx.delta.raw_count, 4);
    }

    #[test]
    fn test_partial_modification() {
        let source = b"AAAABBBBCCCCDDDD";
        let target = b"AAAAXXXXCCCCDDDD";
        let (elements, _) = run(SyncConfig::with_block_size(4), source, target);

        assert_eq!(
            elements,
            vec![
                DeltaElement::Reference { block_offset: 0, length: 4 },
                DeltaElement::RawBytes { bytes: b"XXXX".to_vec() },
                DeltaElement::Reference { block_offset: 8, length: 4 },
                DeltaElement::Reference { block_offset: 12, length: 4 },
            ]
        );
    }

    #[test]
    fn test_appended_and_prepended_data() {
        let source = b"AAAABBBBCCCCDDDD";

        let mut appended = source.to_vec();
        appended.extend_from_slice(b"EE");
        let (_, ctx) = run(SyncConfig::with_block_size(4), source, &appended);
        assert_eq!(ctx.delta.reference_bytes, 16);
        assert_eq!(ctx.delta.raw_bytes, 2);

        let mut prepended = b"XY".to_vec();
        prepended.extend_from_slice(source);
        let (elements, ctx) = run(SyncConfig::with_block_size(4), source, &prepended);
        assert_eq!(elements[0], DeltaElement::RawBytes { bytes: b"XY".to_vec() });
        assert_eq!(ctx.delta.reference_count, 4);
    }

    #[test]
    fn test_empty_inputs() {
        let (elements, _) = run(SyncConfig::default(), b"Some data", b"");
        assert!(elements.is_empty());

        let (elements, ctx) = run(SyncConfig::with_block_size(4), b"", b"Some data");
        assert_eq!(ctx.index_entries, 0);
        assert!(elements.iter().all(|e| e.kind() == DeltaKind::RawBytes));
    }

    #[test]
    fn test_whole_file_zero_diff() {
        let data = random_bytes(20100, 2);
        let (elements, ctx) = run(SyncConfig::with_block_size(100_000), &data, &data);

        assert_eq!(elements, vec![DeltaElement::ZeroDiff { length: 20100 }]);
        assert_eq!(ctx.delta.zero_diff_bytes, 20100);
    }

    #[test]
    fn test_whole_file_changed() {
        let old = random_bytes(20100, 3);
        let mut new = old.clone();
        new[10_000] ^= 0xFF;
        let (elements, ctx) = run(SyncConfig::with_block_size(100_000), &old, &new);

        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].kind(), DeltaKind::RawBytes);
        assert_eq!(ctx.delta.reference_count, 0);
    }

    #[test]
    fn test_whole_file_equal_to_reference_block_is_raw() {
        // New file equals the first block of a longer reference.
        let old = random_bytes(1000, 4);
        let (elements, ctx) = run(SyncConfig::with_block_size(500), &old, &old[..500]);
        assert_eq!(elements, vec![DeltaElement::RawBytes { bytes: old[..500].to_vec() }]);
        assert_eq!(ctx.delta.reference_count, 0);

        // Same for the short tail block.
        let (elements, ctx) = run(SyncConfig::with_block_size(600), &old, &old[600..]);
        assert_eq!(elements, vec![DeltaElement::RawBytes { bytes: old[600..].to_vec() }]);
        assert_eq!(ctx.delta.tail_count, 0);
    }

    #[test]
    fn test_tail_match() {
        let data = random_bytes(1025, 5);
        let (elements, ctx) = run(SyncConfig::with_block_size(512), &data, &data);

        assert_eq!(ctx.delta.reference_count, 2);
        assert_eq!(
            elements.last(),
            Some(&DeltaElement::Tail { block_offset: 1024, length: 1 })
        );
    }

    #[test]
    fn test_tail_found_after_shrinking() {
        // Reference tail is 3 bytes; the new file ends with those bytes after
        // some fresh ones, so the window must shrink to find it.
        let old = b"AAAABBBBxyz".to_vec();
        let new = b"AAAABBBBqrxyz".to_vec();
        let (elements, ctx) = run(SyncConfig::with_block_size(4), &old, &new);

        assert_eq!(ctx.delta.tail_count, 1);
        assert_eq!(
            elements[2..],
            [
                DeltaElement::RawBytes { bytes: b"qr".to_vec() },
                DeltaElement::Tail { block_offset: 8, length: 3 },
            ]
        );
    }

    #[test]
    fn test_copy_tail_threshold() {
        let data = random_bytes(1025, 6);
        let config = SyncConfig {
            copy_tail_threshold: 16,
            ..SyncConfig::with_block_size(512)
        };
        let (elements, ctx) = run(config, &data, &data);

        assert!(ctx.copy_tail_threshold_fired);
        assert_eq!(ctx.delta.tail_count, 0);
        assert_eq!(elements.last(), Some(&DeltaElement::RawBytes { bytes: vec![data[1024]] }));
    }

    #[test]
    fn test_copy_all_threshold() {
        let data = random_bytes(3000, 7);
        let config = SyncConfig {
            copy_all_threshold: 4096,
            send_threshold: 1000,
            ..SyncConfig::with_block_size(512)
        };
        let (elements, ctx) = run(config, &data, &data);

        assert!(ctx.copy_all_threshold_fired);
        assert_eq!(ctx.delta.raw_count, 3);
        assert!(elements.iter().all(|e| e.length() == 1000));
    }

    #[test]
    fn test_send_threshold_splits_raw_runs() {
        let old = random_bytes(2048, 8);
        let new = random_bytes(2500, 9);
        let config = SyncConfig {
            send_threshold: 300,
            ..SyncConfig::with_block_size(256)
        };
        let (elements, ctx) = run(config, &old, &new);

        assert_eq!(ctx.delta.raw_count, 2500u64.div_ceil(300));
        for element in &elements {
            assert!(element.length() >= 1 && element.length() <= 300);
        }
    }

    #[test]
    fn test_fast_collision_counted() {
        let (elements, ctx) = run(SyncConfig::with_block_size(3), &[1, 0, 1], &[0, 2, 0]);
        assert_eq!(ctx.fast_collisions, 1);
        assert_eq!(elements, vec![DeltaElement::RawBytes { bytes: vec![0, 2, 0] }]);
    }

    #[test]
    fn test_missing_source_is_bad_call() {
        let index = SignatureBuilder::new().block_size(4).build_from_bytes(b"abcd").unwrap();
        let mut ctx = ReconstructContext::new(&SyncConfig::with_block_size(4)).unwrap();

        let result = DeltaBuilder::<Cursor<Vec<u8>>>::new(&index, ctx.match_params())
            .collect_into(&mut ctx);
        assert!(matches!(result, Err(SyncError::BadCall(_))));
        assert_eq!(ctx.delta.element_count(), 0);
    }

    #[test]
    fn test_block_size_mismatch_is_bad_call() {
        let index = SignatureBuilder::new().block_size(8).build_from_bytes(b"abcdefgh").unwrap();
        let mut ctx = ReconstructContext::new(&SyncConfig::with_block_size(4)).unwrap();

        let result = compute_delta(&mut ctx, &index, b"abcdefgh");
        assert!(matches!(result, Err(SyncError::BadCall(_))));
    }

    #[test]
    fn test_short_new_source_fails() {
        let index = SignatureBuilder::new().block_size(4).build_from_bytes(b"abcd").unwrap();
        let params = ReconstructContext::new(&SyncConfig::with_block_size(4))
            .unwrap()
            .match_params();

        // Declared 100 bytes, only 10 present.
        let mut stream = DeltaBuilder::new(&index, params)
            .source(Cursor::new(vec![9u8; 10]), 100)
            .stream()
            .unwrap();
        let results: Vec<_> = stream.by_ref().collect();

        assert!(matches!(results.last(), Some(Err(SyncError::UnexpectedEof { .. }))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_stream_is_lazy() {
        let data = random_bytes(1 << 20, 10);
        let index = SignatureBuilder::new().block_size(1024).build_from_bytes(&data).unwrap();
        let params = ReconstructContext::new(&SyncConfig::with_block_size(1024))
            .unwrap()
            .match_params();

        let mut stream = DeltaBuilder::new(&index, params)
            .source(Cursor::new(&data), data.len() as u64)
            .stream()
            .unwrap();

        let first = stream.next().unwrap().unwrap();
        assert_eq!(first, DeltaElement::Reference { block_offset: 0, length: 1024 });
        assert_eq!(stream.stats().counters.element_count(), 1);
    }

    #[test]
    fn test_kind_tags() {
        for kind in [
            DeltaKind::Reference,
            DeltaKind::RawBytes,
            DeltaKind::ZeroDiff,
            DeltaKind::Tail,
        ] {
            assert_eq!(DeltaKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert!(matches!(
            DeltaKind::from_tag(9),
            Err(SyncError::UnknownElementKind(9))
        ));
    }
}
