//! Deep Zoom geometry over a [`PyramidReader`].
//!
//! Deep Zoom numbers levels the other way round from slide pyramids:
//!
//! ```text
//!   DZ level 0          1x1
//!   DZ level 1          2x2 (ceil halving)
//!   ...
//!   DZ level N-1        full resolution   ◀── slide level 0
//! ```
//!
//! Every DZ level is served from the slide level whose downsample is the
//! largest one not exceeding `2^(N-1-level)`, then resized. Tiles are 256
//! pixels with a 1 pixel overlap on each interior edge, so an interior tile
//! is 258 pixels wide and an edge tile is clipped to the level bounds.

use crate::slide::{LevelInfo, PyramidReader};

/// Edge length of a Deep Zoom tile, without overlap.
pub const TILE_SIZE: u32 = 256;

/// Pixels shared with each neighbouring tile.
pub const TILE_OVERLAP: u32 = 1;

/// Image format advertised in the DZI descriptor.
pub const DZI_FORMAT: &str = "jpeg";

const DZI_NAMESPACE: &str = "http://schemas.microsoft.com/deepzoom/2008";

/// Where one tile comes from and how big it ends up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileGeometry {
    /// Slide level to read from
    pub slide_level: usize,
    /// Region origin in level-0 coordinates
    pub l0_location: (i64, i64),
    /// Region size in slide-level pixels
    pub l_size: (u32, u32),
    /// Final tile size, overlap included
    pub z_size: (u32, u32),
}

impl TileGeometry {
    /// Whether the region read must be resized to the tile size.
    pub fn needs_resize(&self) -> bool {
        self.l_size != self.z_size
    }
}

/// Deep Zoom pyramid laid over a slide.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepZoomGrid {
    slide_levels: Vec<LevelInfo>,
    /// Level sizes in DZ order (index 0 is 1x1)
    z_dimensions: Vec<(u32, u32)>,
    t_dimensions: Vec<(u32, u32)>,
    slide_from_dz_level: Vec<usize>,
    l_z_downsamples: Vec<f64>,
}

impl DeepZoomGrid {
    /// Build the grid for `reader`. Returns `None` for a reader with no levels.
    pub fn new(reader: &dyn PyramidReader) -> Option<Self> {
        let slide_levels: Vec<LevelInfo> = (0..reader.level_count())
            .map(|level| reader.level_info(level))
            .collect::<Option<_>>()?;
        let &LevelInfo { width, height, .. } = slide_levels.first()?;

        let mut z_size = (width.max(1), height.max(1));
        let mut z_dimensions = vec![z_size];
        while z_size.0 > 1 || z_size.1 > 1 {
            z_size = (z_size.0.div_ceil(2).max(1), z_size.1.div_ceil(2).max(1));
            z_dimensions.push(z_size);
        }
        z_dimensions.reverse();

        let t_dimensions = z_dimensions
            .iter()
            .map(|(w, h)| (w.div_ceil(TILE_SIZE), h.div_ceil(TILE_SIZE)))
            .collect();

        let dz_levels = z_dimensions.len();
        let mut slide_from_dz_level = Vec::with_capacity(dz_levels);
        let mut l_z_downsamples = Vec::with_capacity(dz_levels);
        for dz_level in 0..dz_levels {
            let l0_z_downsample = 2f64.powi((dz_levels - dz_level - 1) as i32);
            let slide_level = reader.best_level_for_downsample(l0_z_downsample);
            let level_downsample = slide_levels
                .get(slide_level)
                .map(|l| l.downsample)
                .unwrap_or(1.0);
            slide_from_dz_level.push(slide_level);
            l_z_downsamples.push(l0_z_downsample / level_downsample);
        }

        Some(Self {
            slide_levels,
            z_dimensions,
            t_dimensions,
            slide_from_dz_level,
            l_z_downsamples,
        })
    }

    /// Number of Deep Zoom levels.
    pub fn level_count(&self) -> usize {
        self.z_dimensions.len()
    }

    /// Level sizes in Deep Zoom order.
    pub fn level_dimensions(&self) -> &[(u32, u32)] {
        &self.z_dimensions
    }

    /// Full-resolution size.
    pub fn dimensions(&self) -> (u32, u32) {
        self.z_dimensions.last().copied().unwrap_or((1, 1))
    }

    /// Columns and rows of tiles at `level`.
    pub fn tile_count(&self, level: u32) -> Option<(u32, u32)> {
        self.t_dimensions.get(level as usize).copied()
    }

    /// Geometry of tile `(col, row)` at `level`, or `None` if out of range.
    pub fn tile_geometry(&self, level: u32, col: u32, row: u32) -> Option<TileGeometry> {
        let dz_level = level as usize;
        let (cols, rows) = *self.t_dimensions.get(dz_level)?;
        if col >= cols || row >= rows {
            return None;
        }

        let slide_level = *self.slide_from_dz_level.get(dz_level)?;
        let slide = self.slide_levels.get(slide_level)?;
        let l_z_downsample = *self.l_z_downsamples.get(dz_level)?;
        let (z_w, z_h) = *self.z_dimensions.get(dz_level)?;

        let axis = |t: u32, t_lim: u32, z_lim: u32, l_lim: u32| {
            let overlap_tl = if t != 0 { TILE_OVERLAP } else { 0 };
            let overlap_br = if t != t_lim - 1 { TILE_OVERLAP } else { 0 };

            let z_size = TILE_SIZE.min(z_lim - TILE_SIZE * t) + overlap_tl + overlap_br;
            let z_location = (TILE_SIZE * t) as f64;
            let l_location = l_z_downsample * (z_location - overlap_tl as f64);
            let l0_location = (slide.downsample * l_location) as i64;

            let wanted = (l_z_downsample * z_size as f64).ceil();
            let available = l_lim as f64 - l_location.ceil();
            let l_size = wanted.min(available).max(1.0) as u32;

            (l0_location, l_size, z_size)
        };

        let (x0, l_w, z_tile_w) = axis(col, cols, z_w, slide.width);
        let (y0, l_h, z_tile_h) = axis(row, rows, z_h, slide.height);

        Some(TileGeometry {
            slide_level,
            l0_location: (x0, y0),
            l_size: (l_w, l_h),
            z_size: (z_tile_w, z_tile_h),
        })
    }

    /// DZI descriptor whose tile URL points at `/tiles/{slide}/`.
    pub fn dzi_xml(&self, slide: &str) -> String {
        let (width, height) = self.dimensions();
        let url = format!("/tiles/{}/", urlencoding::encode(slide));
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Image xmlns="{DZI_NAMESPACE}" Format="{DZI_FORMAT}" Overlap="{TILE_OVERLAP}" TileSize="{TILE_SIZE}" Url="{url}"><Size Height="{height}" Width="{width}"/></Image>"#
        )
    }
}

/// Parse a tile filename such as `"3_5.jpeg"` or `"3_5.jpg"` into `(col, row)`.
pub fn parse_tile_filename(filename: &str) -> Option<(u32, u32)> {
    let stem = filename
        .strip_suffix(".jpeg")
        .or_else(|| filename.strip_suffix(".jpg"))?;
    let (col, row) = stem.split_once('_')?;
    Some((col.parse().ok()?, row.parse().ok()?))
}
