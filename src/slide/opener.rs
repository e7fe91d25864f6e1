//! Format dispatch for slide files.
//!
//! ```text
//! file ──▶ TIFF header? ──yes──▶ tiled levels? ──yes──▶ TiledTiffReader
//!               │                     │
//!               no                    no
//!               └─────────┬───────────┘
//!                         ▼
//!                    RasterPyramid (whole-image decode)
//! ```

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ReaderError, TiffError};

use super::range::{LocalFile, RangeReader};
use super::raster::RasterPyramid;
use super::reader::{PyramidOpener, PyramidReader};
use super::tiff::{is_tiff_header, BIG_HEADER_SIZE};
use super::tiled::{reader_error, TiledTiffReader};

/// [`PyramidOpener`] for local slide files, run on a blocking thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlideOpener;

impl SlideOpener {
    /// Open `path` on the calling thread.
    pub fn open_blocking(path: &Path) -> Result<Arc<dyn PyramidReader>, ReaderError> {
        let display = path.display().to_string();
        let file = LocalFile::open(path).map_err(|e| ReaderError::Io {
            path: display.clone(),
            message: e.to_string(),
        })?;

        let head_len = (BIG_HEADER_SIZE as u64).min(file.size()) as usize;
        let head = file
            .read_exact_at(0, head_len)
            .map_err(|e| reader_error(&display, e))?;

        if is_tiff_header(&head) {
            match TiledTiffReader::open(file) {
                Ok(reader) => return Ok(Arc::new(reader)),
                Err(TiffError::NotTiled) => {
                    debug!(path = %path.display(), "TIFF has no tiled levels, decoding whole image");
                }
                Err(e) => return Err(reader_error(&display, e)),
            }
        }

        Ok(Arc::new(RasterPyramid::open(path)?))
    }
}

#[async_trait]
impl PyramidOpener for SlideOpener {
    async fn open(&self, path: &Path) -> Result<Arc<dyn PyramidReader>, ReaderError> {
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::open_blocking(&path))
            .await
            .map_err(|e| ReaderError::Decode {
                message: format!("open worker failed: {e}"),
            })?
    }
}
