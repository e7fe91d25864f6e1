//! Raster backend: a decoded image plus synthesized lower-resolution levels.
//!
//! Used for files without tiled levels (JPEG, PNG, stripped TIFF). They are
//! loaded whole, then halved with a triangle filter until the longest side
//! fits in [`MIN_SYNTHETIC_LEVEL_SIZE`]. Decoding runs under the `image`
//! crate's default allocation limit; larger images and formats the crate
//! cannot decode are reported as [`ReaderError::Unsupported`].

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{ImageError, ImageReader, Rgb, RgbImage};
use tracing::debug;

use crate::error::ReaderError;

use super::reader::PyramidReader;

/// Levels stop being synthesized once the longest side is at most this.
pub const MIN_SYNTHETIC_LEVEL_SIZE: u32 = 256;

/// Fill for region pixels past the right or bottom edge of a level.
const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);

/// In-memory pyramid built from one raster image.
pub struct RasterPyramid {
    levels: Vec<RgbImage>,
    downsamples: Vec<f64>,
}

impl RasterPyramid {
    /// Decode `path` and build its pyramid.
    ///
    /// The format is sniffed from the file contents, so a slide's extension
    /// does not have to match its encoding.
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let io_error = |e: std::io::Error| ReaderError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let reader = ImageReader::open(path)
            .map_err(io_error)?
            .with_guessed_format()
            .map_err(io_error)?;

        let image = reader.decode().map_err(|e| match e {
            ImageError::Unsupported(reason) => ReaderError::Unsupported {
                path: path.display().to_string(),
                reason: reason.to_string(),
            },
            ImageError::Limits(limit) => ReaderError::Unsupported {
                path: path.display().to_string(),
                reason: format!("too large to decode whole: {limit}"),
            },
            ImageError::IoError(io) => ReaderError::Io {
                path: path.display().to_string(),
                message: io.to_string(),
            },
            other => ReaderError::Decode {
                message: other.to_string(),
            },
        })?;

        let pyramid = Self::from_image(image.to_rgb8());
        debug!(
            path = %path.display(),
            levels = pyramid.levels.len(),
            dimensions = ?pyramid.level_dimensions(0),
            "Opened raster pyramid"
        );
        Ok(pyramid)
    }

    /// Build a pyramid over an already decoded image.
    pub fn from_image(base: RgbImage) -> Self {
        let (base_w, base_h) = base.dimensions();
        let mut levels = vec![base];

        loop {
            let Some(prev) = levels.last() else { break };
            let (w, h) = prev.dimensions();
            if w.max(h) <= MIN_SYNTHETIC_LEVEL_SIZE {
                break;
            }
            let next = imageops::resize(prev, w.div_ceil(2), h.div_ceil(2), FilterType::Triangle);
            levels.push(next);
        }

        let downsamples = levels
            .iter()
            .map(|level| {
                let (w, h) = level.dimensions();
                (base_w as f64 / w as f64 + base_h as f64 / h as f64) / 2.0
            })
            .collect();

        Self {
            levels,
            downsamples,
        }
    }
}

impl PyramidReader for RasterPyramid {
    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn level_dimensions(&self, level: usize) -> Option<(u32, u32)> {
        self.levels.get(level).map(|img| img.dimensions())
    }

    fn level_downsample(&self, level: usize) -> Option<f64> {
        self.downsamples.get(level).copied()
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

        let (Some(img), Some(ds)) = (self.levels.get(level), self.level_downsample(level)) else {
            return Err(invalid());
        };
        let (w, h) = img.dimensions();

        let x = (location.0 as f64 / ds).round() as i64;
        let y = (location.1 as f64 / ds).round() as i64;
        if size.0 == 0 || size.1 == 0 || x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            return Err(invalid());
        }
        let (x, y) = (x as u32, y as u32);

        let crop_w = size.0.min(w - x);
        let crop_h = size.1.min(h - y);
        let region = imageops::crop_imm(img, x, y, crop_w, crop_h).to_image();

        if (crop_w, crop_h) == size {
            return Ok(region);
        }

        let mut canvas = RgbImage::from_pixel(size.0, size.1, BACKGROUND);
        imageops::replace(&mut canvas, &region, 0, 0);
        Ok(canvas)
    }
}
