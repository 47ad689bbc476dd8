//! Byte sources with a declared size
//!
//! The reference (old) file is read at random offsets; the new file is only
//! read forward through a sliding window. Both refuse reads past their
//! declared size with [`SyncError::TooMuchRequested`].

use crate::sync::error::{SyncError, SyncResult};
use std::fmt;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

const READ_CHUNK: usize = 64 * 1024;

/// Which side of a synchronization a file plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRole {
    /// The reference copy (Y).
    Old,
    /// The new version (X).
    New,
    /// The reconstructed result.
    Output,
}

impl fmt::Display for SourceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceRole::Old => write!(f, "old"),
            SourceRole::New => write!(f, "new"),
            SourceRole::Output => write!(f, "output"),
        }
    }
}

/// Open an existing file for reading, tagging failures with its role.
pub fn open_file(path: &Path, role: SourceRole) -> SyncResult<File> {
    File::open(path).map_err(|source| SyncError::OpenFailure {
        role,
        path: path.to_path_buf(),
        source,
    })
}

/// Create (truncate) the output file.
pub fn create_output(path: &Path) -> SyncResult<File> {
    File::create(path).map_err(|source| SyncError::OpenFailure {
        role: SourceRole::Output,
        path: path.to_path_buf(),
        source,
    })
}

fn check_bounds(offset: u64, requested: u64, size: u64) -> SyncResult<u64> {
    match offset.checked_add(requested) {
        Some(end) if end <= size => Ok(end),
        _ => Err(SyncError::TooMuchRequested {
            offset,
            requested,
            size,
        }),
    }
}

/// Random-access reader over the reference source.
#[derive(Debug)]
pub struct ReferenceSource<R> {
    inner: R,
    size: u64,
}

impl<R: Read + Seek> ReferenceSource<R> {
    pub fn new(inner: R, size: u64) -> Self {
        Self { inner, size }
    }

    /// Wrap a seekable reader, taking its current length as the size.
    pub fn from_seekable(mut inner: R) -> SyncResult<Self> {
        let size = inner.seek(SeekFrom::End(0))?;
        inner.seek(SeekFrom::Start(0))?;
        Ok(Self { inner, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Fill `buf` with the bytes at `offset`.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> SyncResult<()> {
        check_bounds(offset, buf.len() as u64, self.size)?;
        self.inner.seek(SeekFrom::Start(offset))?;

        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(SyncError::UnexpectedEof {
                        offset: offset + filled as u64,
                        expected: buf.len() as u64,
                        actual: filled as u64,
                    })
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }
}

/// Forward-only window over the new source.
///
/// Bytes before the most recently requested offset are released as the
/// window advances, so memory stays bounded by the block length plus one
/// read chunk.
#[derive(Debug)]
pub struct WindowReader<R> {
    inner: R,
    size: u64,
    buf: Vec<u8>,
    base: u64,
}

impl<R: Read> WindowReader<R> {
    pub fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            size,
            buf: Vec::new(),
            base: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Borrow `len` bytes starting at `offset`.
    pub fn window(&mut self, offset: u64, len: usize) -> SyncResult<&[u8]> {
        let end = check_bounds(offset, len as u64, self.size)?;
        if offset < self.base {
            return Err(SyncError::BadCall(format!(
                "window at offset {} already released (base {})",
                offset, self.base
            )));
        }

        self.release(offset);
        self.fill(end)?;

        let start = (offset - self.base) as usize;
        Ok(&self.buf[start..start + len])
    }

    pub fn byte(&mut self, offset: u64) -> SyncResult<u8> {
        Ok(self.window(offset, 1)?[0])
    }

    fn release(&mut self, offset: u64) {
        let consumed = ((offset - self.base) as usize).min(self.buf.len());
        if consumed >= READ_CHUNK && consumed * 2 >= self.buf.len() {
            self.buf.drain(..consumed);
            self.base += consumed as u64;
        }
    }

    fn fill(&mut self, end: u64) -> SyncResult<()> {
        loop {
            let filled = self.base + self.buf.len() as u64;
            if filled >= end {
                return Ok(());
            }

            let want = (end - filled).max(READ_CHUNK as u64).min(self.size - filled) as usize;
            let old_len = self.buf.len();
            self.buf.resize(old_len + want, 0);

            match self.inner.read(&mut self.buf[old_len..]) {
                Ok(0) => {
                    self.buf.truncate(old_len);
                    return Err(SyncError::UnexpectedEof {
                        offset: filled,
                        expected: self.size,
                        actual: filled,
                    });
                }
                Ok(n) => self.buf.truncate(old_len + n),
                Err(e) => {
                    self.buf.truncate(old_len);
                    if e.kind() != ErrorKind::Interrupted {
                        return Err(e.into());
                    }
                }
            }
        }
    }
}
