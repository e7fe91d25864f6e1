//! Slide discovery, resolution and pyramid access.
//!
//! # Architecture
//!
//! ```text
//!   slides root ──▶ scan ──────────▶ slides table (one row per name)
//!        │
//!        └──────▶ locator ──┬──▶ File ────▶ SlideRegistry ──▶ SlideOpener
//!                           │                (LRU + singleflight)   │
//!                           │                          ┌────────────┴─────────┐
//!                           │                          ▼                      ▼
//!                           │                   TiledTiffReader         RasterPyramid
//!                           │                   (tiles on demand)   (whole-image decode)
//!                           └──▶ DicomFolder ──▶ DicomDataset (tags only)
//! ```
//!
//! A slide is addressed by name: the file or folder name directly under the
//! slides root. The scan persists names; the locator turns a name back into
//! something a reader can open.

mod dicom;
mod locator;
mod opener;
mod range;
mod raster;
mod reader;
mod registry;
mod scan;
pub mod tiff;
mod tiled;

use serde::Serialize;

pub use dicom::{DicomDataset, DicomTag, BINARY_METADATA_LIMIT};
pub use locator::{locate_slide, SlideLocation};
pub use opener::SlideOpener;
pub use range::{LocalFile, RangeReader};
pub use raster::{RasterPyramid, MIN_SYNTHETIC_LEVEL_SIZE};
pub use reader::{LevelInfo, PyramidOpener, PyramidReader};
pub use registry::{SlideRegistry, DEFAULT_SLIDE_CACHE_CAPACITY};
pub use scan::{
    discover_slides, is_slide_file, is_slide_folder, reconcile_slides, ScanReport,
    SLIDE_FILE_EXTENSIONS, SLIDE_FOLDER_MARKERS,
};
pub use tiled::{TiledTiffReader, DECODED_TILE_CACHE_CAPACITY};

/// A persisted slide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlideRecord {
    pub id: String,
    pub slide_name: String,
    pub slide_label: Option<String>,
    pub slide_barcode: Option<String>,
    pub case_identifier: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SlideRecord {
    /// A new record with only the name populated.
    pub fn named(slide_name: impl Into<String>) -> Self {
        let now = crate::store::now_timestamp();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            slide_name: slide_name.into(),
            slide_label: None,
            slide_barcode: None,
            case_identifier: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Lowercased extension of `path`, with the leading dot.
pub(crate) fn dotted_extension(path: &std::path::Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
}
