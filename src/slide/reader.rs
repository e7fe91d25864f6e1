//! Pyramid reader seam.
//!
//! [`PyramidReader`] is the only view the Deep Zoom layer has of a slide:
//! level count, per-level size and downsample, and region reads. How a
//! format stores its levels stays behind the trait.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use image::RgbImage;

use crate::error::ReaderError;

// =============================================================================
// Level Information
// =============================================================================

/// Snapshot of a single pyramid level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelInfo {
    /// Width of this level in pixels
    pub width: u32,

    /// Height of this level in pixels
    pub height: u32,

    /// Downsample factor relative to level 0
    ///
    /// Level 0 has downsample 1.0, level 1 might have 2.0, etc.
    pub downsample: f64,
}

// =============================================================================
// PyramidReader Trait
// =============================================================================

/// Format-agnostic access to a multi-resolution image.
///
/// Implementations are synchronous; callers run them on blocking threads.
pub trait PyramidReader: Send + Sync {
    /// Number of levels. Level 0 is full resolution.
    fn level_count(&self) -> usize;

    /// `(width, height)` of a level, or `None` if out of range.
    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)>;

    /// Downsample of a level relative to level 0, or `None` if out of range.
    fn level_downsample(&self, level: usize) -> Option<f64>;

    /// Read `size` pixels of `level`, starting at `location` in level-0
    /// coordinates.
    fn read_region(
        &self,
        location: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbImage, ReaderError>;

    /// Dimensions of level 0.
    fn dimensions(&self) -> Option<(u32, u32)> {
        self.level_dimensions(0)
    }

    fn level_info(&self, level: usize) -> Option<LevelInfo> {
        let (width, height) = self.level_dimensions(level)?;
        let downsample = self.level_downsample(level)?;

        Some(LevelInfo {
            width,
            height,
            downsample,
        })
    }

    /// Level whose downsample is the largest one not exceeding `downsample`.
    ///
    /// Falls back to level 0 when every level is coarser than requested.
    fn best_level_for_downsample(&self, downsample: f64) -> usize {
        (0..self.level_count())
            .filter_map(|level| Some((level, self.level_downsample(level)?)))
            .filter(|(_, ds)| *ds <= downsample)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(level, _)| level)
            .unwrap_or(0)
    }
}

// =============================================================================
// PyramidOpener Trait
// =============================================================================

/// Opens pyramid readers from filesystem paths.
///
/// This abstraction lets the registry cache and deduplicate opens without
/// knowing which backend decodes the file.
#[async_trait]
pub trait PyramidOpener: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Arc<dyn PyramidReader>, ReaderError>;
}

// =============================================================================
// Tests
// =============================================================================
