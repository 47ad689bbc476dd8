//! Rebuilding the new file from the reference and a delta stream
//!
//! Elements are applied strictly in order and appended to a sequential
//! writer. Back-references are read from the reference source; a short
//! read there is reported as [`SyncError::ReferenceRead`], a failed write as
//! [`SyncError::OutputWrite`].

use crate::sync::context::{DeltaCounters, ReconstructContext};
use crate::sync::delta::DeltaElement;
use crate::sync::error::{SyncError, SyncResult};
use crate::sync::source::ReferenceSource;
use std::io::{self, Cursor, Read, Seek, Write};

const COPY_CHUNK: u64 = 64 * 1024;

fn reference_read_error(err: SyncError, offset: u64, length: u64) -> SyncError {
    match err {
        SyncError::Io(source) => SyncError::ReferenceRead {
            offset,
            length,
            source,
        },
        SyncError::UnexpectedEof { actual, .. } => SyncError::ReferenceRead {
            offset,
            length,
            source: io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("reference ended after {} bytes", actual),
            ),
        },
        other => other,
    }
}

/// Applies delta elements one at a time
pub struct Reconstructor<'r, R, W> {
    reference: &'r mut ReferenceSource<R>,
    output: W,
    buffer: Vec<u8>,
    counters: DeltaCounters,
    written: u64,
    expected_size: Option<u64>,
}

impl<'r, R: Read + Seek, W: Write> Reconstructor<'r, R, W> {
    pub fn new(reference: &'r mut ReferenceSource<R>, output: W) -> Self {
        Self {
            reference,
            output,
            buffer: Vec::new(),
            counters: DeltaCounters::default(),
            written: 0,
            expected_size: None,
        }
    }

    /// Fail [`finish`](Self::finish) unless exactly `size` bytes were written
    pub fn expect_size(mut self, size: u64) -> Self {
        self.expected_size = Some(size);
        self
    }

    pub fn apply(&mut self, element: &DeltaElement) -> SyncResult<()> {
        match element {
            DeltaElement::Reference {
                block_offset,
                length,
            }
            | DeltaElement::Tail {
                block_offset,
                length,
            } => self.copy_from_reference(*block_offset, *length as u64)?,
            DeltaElement::RawBytes { bytes } => {
                self.output.write_all(bytes).map_err(SyncError::OutputWrite)?;
                self.written += bytes.len() as u64;
            }
            DeltaElement::ZeroDiff { length } => self.copy_from_reference(0, *length)?,
        }

        self.counters.record(element);
        Ok(())
    }

    fn copy_from_reference(&mut self, offset: u64, length: u64) -> SyncResult<()> {
        // Refuse the whole element before writing any part of it.
        if offset.saturating_add(length) > self.reference.size() {
            return Err(SyncError::TooMuchRequested {
                offset,
                requested: length,
                size: self.reference.size(),
            });
        }

        let mut done = 0u64;
        while done < length {
            let n = (length - done).min(COPY_CHUNK) as usize;
            self.buffer.resize(n, 0);
            self.reference
                .read_exact_at(offset + done, &mut self.buffer[..n])
                .map_err(|e| reference_read_error(e, offset, length))?;
            self.output
                .write_all(&self.buffer[..n])
                .map_err(SyncError::OutputWrite)?;
            done += n as u64;
        }

        self.written += length;
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn counters(&self) -> &DeltaCounters {
        &self.counters
    }

    /// Flush the output and hand it back with the totals.
    pub fn finish(mut self) -> SyncResult<(W, u64, DeltaCounters)> {
        self.output.flush().map_err(SyncError::OutputWrite)?;

        if let Some(expected) = self.expected_size {
            if expected != self.written {
                return Err(SyncError::SizeMismatch {
                    expected,
                    actual: self.written,
                });
            }
        }

        Ok((self.output, self.written, self.counters))
    }
}

/// Apply a whole delta stream, recording the totals in `ctx`.
///
/// Returns the number of bytes written. On error the output holds a
/// partial result the caller must discard.
pub fn reconstruct<I, R, W>(
    elements: I,
    reference: &mut ReferenceSource<R>,
    output: W,
    ctx: &mut ReconstructContext,
) -> SyncResult<u64>
where
    I: IntoIterator<Item = SyncResult<DeltaElement>>,
    R: Read + Seek,
    W: Write,
{
    let mut reconstructor = Reconstructor::new(reference, output);
    for element in elements {
        reconstructor.apply(&element?)?;
    }

    let (_, written, counters) = reconstructor.finish()?;
    ctx.reconstructed = counters;
    ctx.bytes_written = written;

    tracing::debug!(
        session = %ctx.session_id,
        written,
        by_reference = counters.reference_bytes,
        by_raw = counters.raw_bytes,
        by_tail = counters.tail_bytes,
        by_zero_diff = counters.zero_diff_bytes,
        "reconstruction finished"
    );

    Ok(written)
}

/// Rebuild in memory from an in-memory reference
pub fn apply_to_bytes(elements: &[DeltaElement], reference: &[u8]) -> SyncResult<Vec<u8>> {
    let mut source = ReferenceSource::new(Cursor::new(reference), reference.len() as u64);
    let mut reconstructor = Reconstructor::new(&mut source, Vec::new());

    for element in elements {
        reconstructor.apply(element)?;
    }

    let (output, _, _) = reconstructor.finish()?;
    Ok(output)
}
