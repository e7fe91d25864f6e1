//! Tiled TIFF backend.
//!
//! Opening a slide reads its header, directories and tile tables. A region
//! read fetches and decodes only the tiles it overlaps; recently decoded
//! tiles are kept in a small LRU because neighbouring Deep Zoom tiles share
//! source tiles along their overlap.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use image::imageops;
use image::{ImageFormat, Rgb, RgbImage};
use lru::LruCache;
use tracing::debug;

use crate::error::{ReaderError, TiffError};

use super::range::{LocalFile, RangeReader};
use super::reader::PyramidReader;
use super::tiff::{complete_tile_stream, TileCodec, TiffFlavor, TiffPyramid, TiledLevel};

/// Decoded source tiles kept per open slide.
pub const DECODED_TILE_CACHE_CAPACITY: usize = 64;

/// Fill for sparse tiles and for region pixels past a level's edge.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

type TileKey = (usize, u32, u32);

/// Map a parser error onto the reader taxonomy for `path`.
pub(crate) fn reader_error(path: &str, err: TiffError) -> ReaderError {
    match err {
        TiffError::Io { message, .. } => ReaderError::Io {
            path: path.to_string(),
            message,
        },
        TiffError::UnsupportedCompression(reason) => ReaderError::Unsupported {
            path: path.to_string(),
            reason: format!("tiles use {reason} compression"),
        },
        TiffError::NotTiled => ReaderError::Unsupported {
            path: path.to_string(),
            reason: TiffError::NotTiled.to_string(),
        },
        other => ReaderError::Decode {
            message: format!("{path}: {other}"),
        },
    }
}

/// Pyramid reader over the tiled levels of a TIFF, SVS or similar file.
pub struct TiledTiffReader<R: RangeReader = LocalFile> {
    source: R,
    flavor: TiffFlavor,
    levels: Vec<TiledLevel>,
    decoded: Mutex<LruCache<TileKey, Arc<RgbImage>>>,
}

impl<R: RangeReader> TiledTiffReader<R> {
    pub fn open(source: R) -> Result<Self, TiffError> {
        let pyramid = TiffPyramid::parse(&source)?;
        debug!(
            source = source.identifier(),
            format = pyramid.flavor.name(),
            levels = pyramid.levels.len(),
            bigtiff = pyramid.header.is_bigtiff,
            "Parsed tiled pyramid"
        );

        let capacity = NonZeroUsize::new(DECODED_TILE_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            source,
            flavor: pyramid.flavor,
            levels: pyramid.levels,
            decoded: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn flavor(&self) -> TiffFlavor {
        self.flavor
    }

    /// Decoded tile `(col, row)` of `level`, from the LRU when present.
    fn tile(&self, level: usize, col: u32, row: u32) -> Result<Arc<RgbImage>, ReaderError> {
        let key = (level, col, row);
        if let Ok(mut decoded) = self.decoded.lock() {
            if let Some(tile) = decoded.get(&key) {
                return Ok(Arc::clone(tile));
            }
        }

        let tile = Arc::new(self.decode_tile(level, col, row)?);
        if let Ok(mut decoded) = self.decoded.lock() {
            decoded.put(key, Arc::clone(&tile));
        }
        Ok(tile)
    }

    fn decode_tile(&self, level: usize, col: u32, row: u32) -> Result<RgbImage, ReaderError> {
        let path = self.source.identifier();
        let corrupt = |message: String| ReaderError::Decode {
            message: format!("{path}: tile ({col}, {row}) of level {level}: {message}"),
        };

        let lvl = self
            .levels
            .get(level)
            .ok_or_else(|| corrupt("no such level".to_string()))?;
        let (offset, len) = lvl
            .tile_location(col, row)
            .ok_or_else(|| corrupt("outside the tile grid".to_string()))?;

        // Sparse files leave empty regions unwritten
        if len == 0 {
            return Ok(RgbImage::from_pixel(lvl.tile_width, lvl.tile_height, BACKGROUND));
        }

        let len = usize::try_from(len).map_err(|_| corrupt(format!("{len} byte tile")))?;
        let raw = self
            .source
            .read_exact_at(offset, len)
            .map_err(|e| reader_error(path, e))?;

        match lvl.codec {
            TileCodec::Jpeg => {
                let stream = complete_tile_stream(lvl.jpeg_tables.as_deref(), &raw);
                let image = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
                    .map_err(|e| corrupt(e.to_string()))?;
                Ok(image.to_rgb8())
            }
            TileCodec::Raw => {
                let expected = lvl.tile_width as usize * lvl.tile_height as usize * 3;
                let pixels = raw
                    .get(..expected)
                    .ok_or_else(|| corrupt(format!("{} bytes, expected {expected}", raw.len())))?;
                RgbImage::from_raw(lvl.tile_width, lvl.tile_height, pixels.to_vec())
                    .ok_or_else(|| corrupt("pixel buffer size mismatch".to_string()))
            }
        }
    }
}

impl<R: RangeReader> PyramidReader for TiledTiffReader<R> {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|l| (l.width, l.height))
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(|l| l.downsample)
    }

    fn read_region(
        &self,
        location: (i64, i64),
        level: usize,
        size: (u32, u32),
    ) -> Result<RgbImage, ReaderError> {
        let invalid = || ReaderError::InvalidRegion {
            level,
            x: location.0,
            y: location.1,
            width: size.0,
            height: size.1,
        };

        let lvl = self.levels.get(level).ok_or_else(invalid)?;
        let x = (location.0 as f64 / lvl.downsample).round() as i64;
        let y = (location.1 as f64 / lvl.downsample).round() as i64;
        if size.0 == 0 || size.1 == 0 || x < 0 || y < 0 || x >= lvl.width as i64 || y >= lvl.height as i64 {
            return Err(invalid());
        }
        let (x, y) = (x as u32, y as u32);
        let x_end = x.saturating_add(size.0).min(lvl.width);
        let y_end = y.saturating_add(size.1).min(lvl.height);
        let (tw, th) = (lvl.tile_width, lvl.tile_height);

        let mut canvas = RgbImage::from_pixel(size.0, size.1, BACKGROUND);
        for row in y / th..=(y_end - 1) / th {
            for col in x / tw..=(x_end - 1) / tw {
                let tile = self.tile(level, col, row)?;

                // Overlap of the tile with the region, in level coordinates
                let (tile_x, tile_y) = (col * tw, row * th);
                let left = x.max(tile_x);
                let top = y.max(tile_y);
                let right = x_end.min(tile_x.saturating_add(tw));
                let bottom = y_end.min(tile_y.saturating_add(th));

                let part = imageops::crop_imm(
                    &*tile,
                    left - tile_x,
                    top - tile_y,
                    right - left,
                    bottom - top,
                )
                .to_image();
                imageops::replace(&mut canvas, &part, (left - x) as i64, (top - y) as i64);
            }
        }

        Ok(canvas)
    }
}
