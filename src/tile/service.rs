//! Tile service for Deep Zoom descriptors, tiles and slide metadata.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                             │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Check cache       4. Acquire worker permit          │    │
//! │  │  2. Locate + open     5. Read region, resize, encode    │    │
//! │  │  3. Validate address  6. Cache & return                 │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │        │               │                 │             │        │
//! │        ▼               ▼                 ▼             ▼        │
//! │  ┌───────────┐  ┌──────────────┐  ┌────────────┐  ┌──────────┐  │
//! │  │ TileCache │  │ SlideRegistry│  │DeepZoomGrid│  │ Semaphore│  │
//! │  └───────────┘  └──────────────┘  └────────────┘  └──────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use image::imageops::{self, FilterType};
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::report::{self, Narrative};
use crate::slide::{
    locate_slide, DicomDataset, PyramidOpener, PyramidReader, SlideOpener, SlideLocation,
    SlideRegistry,
};
use crate::store::Database;

use super::cache::{TileCache, TileCacheKey};
use super::deepzoom::{DeepZoomGrid, TILE_SIZE};
use super::encoder::JpegTileEncoder;

/// Default number of tiles rendered at once.
pub const DEFAULT_TILE_WORKERS: usize = 4;

/// Size reported for a DICOM folder whose first file lacks Columns/Rows.
pub const DEFAULT_DICOM_DIMENSION: u32 = 1024;

// =============================================================================
// Responses
// =============================================================================

/// An encoded tile.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// JPEG bytes
    pub data: Bytes,

    /// Whether this tile was served from cache
    pub cache_hit: bool,
}

/// Slide metadata served to the viewer.
#[derive(Debug, Clone, Serialize)]
pub struct SlideMetadata {
    #[serde(flatten)]
    pub narrative: Narrative,
    pub levels: usize,
    pub tile_size: u32,
    /// `[width, height]` per level, Deep Zoom order
    pub level_dimensions: Vec<(u32, u32)>,
    pub max_width: u32,
    pub max_height: u32,
    /// Filtered DICOM tags, for DICOM folders only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
}

// =============================================================================
// Tile Service
// =============================================================================

/// Serves Deep Zoom tiles for slides under a root directory.
pub struct TileService<O: PyramidOpener = SlideOpener> {
    slides_root: PathBuf,

    /// Open pyramids
    registry: SlideRegistry<O>,

    /// Encoded tiles
    cache: TileCache,

    encoder: JpegTileEncoder,

    /// Bounds concurrent region reads and encodes
    workers: Arc<Semaphore>,

    /// Source of report narrative
    db: Arc<Database>,
}

impl<O: PyramidOpener> TileService<O> {
    /// Create a service with default cache size, quality and worker count.
    pub fn new(slides_root: impl Into<PathBuf>, registry: SlideRegistry<O>, db: Arc<Database>) -> Self {
        Self {
            slides_root: slides_root.into(),
            registry,
            cache: TileCache::new(),
            encoder: JpegTileEncoder::default(),
            workers: Arc::new(Semaphore::new(DEFAULT_TILE_WORKERS)),
            db,
        }
    }

    /// Bound the tile cache to `max_bytes` of encoded tiles.
    pub fn with_cache_capacity(mut self, max_bytes: usize) -> Self {
        self.cache = TileCache::with_capacity(max_bytes);
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.encoder = JpegTileEncoder::new(quality);
        self
    }

    /// Render at most `workers` tiles at once (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Arc::new(Semaphore::new(workers.max(1)));
        self
    }

    pub fn slides_root(&self) -> &Path {
        &self.slides_root
    }

    pub fn jpeg_quality(&self) -> u8 {
        self.encoder.quality()
    }

    /// `(entries, bytes used, byte capacity)` of the tile cache.
    pub async fn cache_stats(&self) -> (usize, usize, usize) {
        (
            self.cache.len().await,
            self.cache.size().await,
            self.cache.capacity(),
        )
    }

    // -------------------------------------------------------------------------
    // Metadata
    // -------------------------------------------------------------------------

    /// Pyramid geometry plus report narrative for `name`.
    pub async fn metadata(&self, name: &str) -> Result<SlideMetadata, TileError> {
        let location = self.locate(name).await?;

        let mut metadata = match location {
            SlideLocation::File(path) => {
                let (_, grid) = self.open_grid(name, &path).await?;
                let (max_width, max_height) = grid.dimensions();
                SlideMetadata {
                    narrative: Narrative::default(),
                    levels: grid.level_count(),
                    tile_size: TILE_SIZE,
                    level_dimensions: grid.level_dimensions().to_vec(),
                    max_width,
                    max_height,
                    metadata: None,
                }
            }
            SlideLocation::DicomFolder { sample, .. } => {
                let dataset = blocking(move || Ok(DicomDataset::open(&sample)?)).await?;
                let width = dataset.columns().unwrap_or(DEFAULT_DICOM_DIMENSION);
                let height = dataset.rows().unwrap_or(DEFAULT_DICOM_DIMENSION);
                SlideMetadata {
                    narrative: Narrative::default(),
                    levels: 1,
                    tile_size: TILE_SIZE,
                    level_dimensions: vec![(width, height)],
                    max_width: width,
                    max_height: height,
                    metadata: Some(dataset.filtered_metadata()),
                }
            }
        };

        let db = Arc::clone(&self.db);
        let slide = name.to_string();
        metadata.narrative = blocking(move || Ok(report::narrative_for_slide(&db, &slide)?)).await?;

        debug!(
            slide = name,
            levels = metadata.levels,
            width = metadata.max_width,
            height = metadata.max_height,
            "Built slide metadata"
        );
        Ok(metadata)
    }

    /// DZI descriptor for `name`.
    pub async fn dzi(&self, name: &str) -> Result<String, TileError> {
        let (_, grid) = self.open_slide(name).await?;
        Ok(grid.dzi_xml(name))
    }

    // -------------------------------------------------------------------------
    // Tiles
    // -------------------------------------------------------------------------

    /// Validate a tile address without rendering it.
    pub async fn check_tile(&self, name: &str, level: u32, col: u32, row: u32) -> Result<(), TileError> {
        let (_, grid) = self.open_slide(name).await?;
        grid.tile_geometry(level, col, row)
            .map(|_| ())
            .ok_or(TileError::InvalidCoordinates { level, col, row })
    }

    /// Get a tile, rendering and caching it on a miss.
    pub async fn get_tile(
        &self,
        name: &str,
        level: u32,
        col: u32,
        row: u32,
    ) -> Result<TileResponse, TileError> {
        // A slide removed from disk stops serving, cached tiles included
        let location = self.locate(name).await?;
        let cache_key = TileCacheKey::new(name, level, col, row, self.encoder.quality());

        if let Some(data) = self.cache.get(&cache_key).await {
            return Ok(TileResponse {
                data,
                cache_hit: true,
            });
        }

        let (reader, grid) = self.open_location(name, location).await?;
        let geometry = grid
            .tile_geometry(level, col, row)
            .ok_or(TileError::InvalidCoordinates { level, col, row })?;

        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .map_err(|e| TileError::Worker {
                message: e.to_string(),
            })?;

        let encoder = self.encoder;
        let data = blocking(move || {
            let _permit = permit;
            let region =
                reader.read_region(geometry.l0_location, geometry.slide_level, geometry.l_size)?;
            let tile = if geometry.needs_resize() {
                let (width, height) = geometry.z_size;
                imageops::resize(&region, width, height, FilterType::Lanczos3)
            } else {
                region
            };
            encoder.encode(&tile)
        })
        .await?;

        debug!(
            slide = name,
            level,
            col,
            row,
            bytes = data.len(),
            "Rendered tile"
        );
        self.cache.put(cache_key, data.clone()).await;

        Ok(TileResponse {
            data,
            cache_hit: false,
        })
    }

    // -------------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------------

    async fn locate(&self, name: &str) -> Result<SlideLocation, TileError> {
        let root = self.slides_root.clone();
        let slide = name.to_string();
        blocking(move || locate_slide(&root, &slide)).await
    }

    /// Locate and open a tileable slide.
    async fn open_slide(&self, name: &str) -> Result<(Arc<dyn PyramidReader>, DeepZoomGrid), TileError> {
        let location = self.locate(name).await?;
        self.open_location(name, location).await
    }

    async fn open_location(
        &self,
        name: &str,
        location: SlideLocation,
    ) -> Result<(Arc<dyn PyramidReader>, DeepZoomGrid), TileError> {
        match location {
            SlideLocation::File(path) => self.open_grid(name, &path).await,
            SlideLocation::DicomFolder { .. } => Err(TileError::UnsupportedSlide {
                slide: name.to_string(),
                reason: "DICOM folders are not tiled".to_string(),
            }),
        }
    }

    async fn open_grid(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<(Arc<dyn PyramidReader>, DeepZoomGrid), TileError> {
        let reader = self
            .registry
            .get(path)
            .await
            .inspect_err(|e| warn!(slide = name, "Failed to open slide: {}", e))?;

        let grid = DeepZoomGrid::new(reader.as_ref()).ok_or_else(|| TileError::UnsupportedSlide {
            slide: name.to_string(),
            reason: "slide has no pyramid levels".to_string(),
        })?;
        Ok((reader, grid))
    }
}

/// Run `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, TileError>
where
    F: FnOnce() -> Result<T, TileError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TileError::Worker {
            message: e.to_string(),
        })?
}
