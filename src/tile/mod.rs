//! Deep Zoom tile layer.
//!
//! Sits between the HTTP handlers and the slide readers:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  TileCache   │  │  DeepZoomGrid   │  │
//! │  │  (encoded    │  │  (DZ address →  │  │
//! │  │   JPEGs)     │  │   slide region) │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │        SlideRegistry / locator          │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: entry point for descriptors, tiles and metadata
//! - [`DeepZoomGrid`]: level sizes, tile counts and per-tile regions
//! - [`TileCache`]: LRU cache for encoded JPEG tiles with size-based eviction
//! - [`JpegTileEncoder`]: encodes composed tiles at a fixed quality

mod cache;
mod deepzoom;
mod encoder;
mod service;

pub use cache::{TileCache, TileCacheKey, DEFAULT_TILE_CACHE_CAPACITY};
pub use deepzoom::{
    parse_tile_filename, DeepZoomGrid, TileGeometry, DZI_FORMAT, TILE_OVERLAP, TILE_SIZE,
};
pub use encoder::{
    clamp_quality, is_valid_quality, JpegTileEncoder, DEFAULT_JPEG_QUALITY, MAX_JPEG_QUALITY,
    MIN_JPEG_QUALITY,
};
pub use service::{
    SlideMetadata, TileResponse, TileService, DEFAULT_DICOM_DIMENSION, DEFAULT_TILE_WORKERS,
};
