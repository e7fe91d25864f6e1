//! Byte-range access to slide files.
//!
//! The TIFF parser reads headers, IFDs, tile tables and single tiles through
//! [`RangeReader`], so opening a slide touches a few kilobytes and serving a
//! tile touches only that tile's bytes.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

use bytes::Bytes;

use crate::error::TiffError;

/// Random access to a byte source of known size.
///
/// Implementations are synchronous; callers run them on blocking threads.
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Fails without allocating when the range runs past [`size`](Self::size).
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, TiffError>;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// Name used in logs.
    fn identifier(&self) -> &str;
}

/// Reject ranges that end past `size`.
fn check_range(offset: u64, len: usize, size: u64) -> Result<(), TiffError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        end => Err(TiffError::Truncated {
            required: end.unwrap_or(u64::MAX),
            actual: size,
        }),
    }
}

// =============================================================================
// Local File
// =============================================================================

/// A file on local disk, read with seek + read under a lock.
#[derive(Debug)]
pub struct LocalFile {
    file: Mutex<File>,
    size: u64,
    identifier: String,
}

impl LocalFile {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let file = File::open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            file: Mutex::new(file),
            size,
            identifier: path.display().to_string(),
        })
    }
}

impl RangeReader for LocalFile {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, TiffError> {
        check_range(offset, len, self.size)?;

        let io_error = |e: std::io::Error| TiffError::Io {
            offset,
            message: e.to_string(),
        };
        let mut buf = vec![0u8; len];
        let mut file = self.file.lock().map_err(|_| TiffError::Io {
            offset,
            message: "file handle lock poisoned".to_string(),
        })?;
        file.seek(SeekFrom::Start(offset)).map_err(io_error)?;
        file.read_exact(&mut buf).map_err(io_error)?;

        Ok(Bytes::from(buf))
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

/// In-memory source.
impl RangeReader for Bytes {
    fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, TiffError> {
        check_range(offset, len, self.len() as u64)?;
        let start = offset as usize;
        Ok(self.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }

    fn identifier(&self) -> &str {
        "memory"
    }
}
