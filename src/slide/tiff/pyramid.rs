//! Pyramid levels of a tiled TIFF.
//!
//! Whole-slide TIFFs hold more than the pyramid: Aperio files carry a
//! stripped thumbnail, label and macro image between or after the levels.
//! Only tiled directories with tile tables are candidates; the largest is
//! level 0 and the others are kept when their aspect ratio matches it and
//! their downsample is close to a power of two.

use std::collections::HashSet;

use bytes::Bytes;

use crate::error::TiffError;

use super::super::range::RangeReader;
use super::header::{TiffHeader, BIG_HEADER_SIZE};
use super::ifd::{Ifd, TagReader, TiffTag};

/// Directories beyond this are ignored.
const MAX_IFDS: usize = 256;

/// Tiles larger than this on either side are rejected as corrupt.
const MAX_TILE_SIDE: u64 = 8192;

/// Relative tolerance on aspect ratio and power-of-two downsample.
const LEVEL_TOLERANCE: f64 = 0.2;

/// How the tiles of a level are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileCodec {
    /// Baseline JPEG, possibly abbreviated
    Jpeg,
    /// Uncompressed 8-bit RGB, interleaved
    Raw,
}

impl TileCodec {
    fn from_tag(compression: u64, samples: u64, bits: u64, planar: u64) -> Result<Self, TiffError> {
        let codec = match compression {
            7 => TileCodec::Jpeg,
            1 => TileCodec::Raw,
            5 => return Err(TiffError::UnsupportedCompression("LZW".into())),
            8 | 32946 => return Err(TiffError::UnsupportedCompression("Deflate".into())),
            33003 | 33005 => return Err(TiffError::UnsupportedCompression("JPEG 2000".into())),
            other => return Err(TiffError::UnsupportedCompression(format!("code {other}"))),
        };
        if codec == TileCodec::Raw && (samples != 3 || bits != 8 || planar != 1) {
            return Err(TiffError::UnsupportedCompression(format!(
                "uncompressed with {samples} samples of {bits} bits, planar {planar}"
            )));
        }
        Ok(codec)
    }
}

/// One level, with its tile table loaded.
#[derive(Debug, Clone)]
pub struct TiledLevel {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles_across: u32,
    pub tiles_down: u32,
    /// Relative to level 0
    pub downsample: f64,
    pub codec: TileCodec,
    pub offsets: Vec<u64>,
    pub byte_counts: Vec<u64>,
    pub jpeg_tables: Option<Bytes>,
}

impl TiledLevel {
    /// `(offset, length)` of the tile at `(col, row)`.
    pub fn tile_location(&self, col: u32, row: u32) -> Option<(u64, u64)> {
        if col >= self.tiles_across || row >= self.tiles_down {
            return None;
        }
        let index = row as usize * self.tiles_across as usize + col as usize;
        Some((*self.offsets.get(index)?, *self.byte_counts.get(index)?))
    }
}

/// Scanner vendor, from the first directory's ImageDescription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffFlavor {
    Aperio,
    Generic,
}

impl TiffFlavor {
    pub fn from_description(description: Option<&str>) -> Self {
        match description {
            Some(d) if d.contains("Aperio") => TiffFlavor::Aperio,
            _ => TiffFlavor::Generic,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            TiffFlavor::Aperio => "Aperio SVS",
            TiffFlavor::Generic => "pyramidal TIFF",
        }
    }
}

/// The parsed pyramid of a tiled TIFF.
#[derive(Debug, Clone)]
pub struct TiffPyramid {
    pub header: TiffHeader,
    pub flavor: TiffFlavor,
    /// Largest first
    pub levels: Vec<TiledLevel>,
}

struct Candidate {
    ifd: Ifd,
    width: u64,
    height: u64,
}

impl TiffPyramid {
    /// Walk the IFD chain of `reader` and load every pyramid level's tile table.
    pub fn parse<R: RangeReader + ?Sized>(reader: &R) -> Result<Self, TiffError> {
        let head_len = (BIG_HEADER_SIZE as u64).min(reader.size()) as usize;
        let head = reader.read_exact_at(0, head_len)?;
        let header = TiffHeader::parse(&head, reader.size())?;
        let tags = TagReader::new(reader, &header);

        let mut description = None;
        let mut candidates = Vec::new();
        let mut seen = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && seen.len() < MAX_IFDS {
            if !seen.insert(offset) {
                return Err(TiffError::InvalidIfdOffset(offset));
            }
            let ifd = Ifd::read(reader, &header, offset)?;
            offset = ifd.next_offset;

            if seen.len() == 1 {
                if let Some(entry) = ifd.entry(TiffTag::ImageDescription) {
                    description = tags.string(TiffTag::ImageDescription, entry).ok();
                }
            }

            let tiled = [
                TiffTag::TileWidth,
                TiffTag::TileLength,
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            ]
            .iter()
            .all(|tag| ifd.entry(*tag).is_some());
            if !tiled {
                continue;
            }
            let (Some(w), Some(h)) = (ifd.entry(TiffTag::ImageWidth), ifd.entry(TiffTag::ImageLength)) else {
                continue;
            };
            let width = tags.uint(TiffTag::ImageWidth, w)?;
            let height = tags.uint(TiffTag::ImageLength, h)?;
            if width == 0 || height == 0 || width > u32::MAX as u64 || height > u32::MAX as u64 {
                continue;
            }
            candidates.push(Candidate { ifd, width, height });
        }

        candidates.sort_by(|a, b| (b.width * b.height).cmp(&(a.width * a.height)));
        let Some(base) = candidates.first() else {
            return Err(TiffError::NotTiled);
        };
        let (base_w, base_h) = (base.width as f64, base.height as f64);

        let mut levels: Vec<TiledLevel> = Vec::new();
        for candidate in &candidates {
            let ds_x = base_w / candidate.width as f64;
            let ds_y = base_h / candidate.height as f64;
            let downsample = (ds_x + ds_y) / 2.0;

            if !levels.is_empty() && !is_pyramid_step(ds_x, ds_y, levels.last().map(|l| l.downsample)) {
                continue;
            }
            levels.push(Self::load_level(&tags, candidate, downsample)?);
        }

        Ok(Self {
            header,
            flavor: TiffFlavor::from_description(description.as_deref()),
            levels,
        })
    }

    fn load_level<R: RangeReader + ?Sized>(
        tags: &TagReader<'_, R>,
        candidate: &Candidate,
        downsample: f64,
    ) -> Result<TiledLevel, TiffError> {
        let ifd = &candidate.ifd;
        let required = |tag: TiffTag| ifd.entry(tag).ok_or(TiffError::MissingTag(tag.name()));
        let optional = |tag: TiffTag, default: u64| -> Result<u64, TiffError> {
            match ifd.entry(tag) {
                Some(entry) => tags.uint(tag, entry),
                None => Ok(default),
            }
        };

        let tile_width = tags.uint(TiffTag::TileWidth, required(TiffTag::TileWidth)?)?;
        let tile_height = tags.uint(TiffTag::TileLength, required(TiffTag::TileLength)?)?;
        for (tag, side) in [(TiffTag::TileWidth, tile_width), (TiffTag::TileLength, tile_height)] {
            if side == 0 || side > MAX_TILE_SIDE {
                return Err(TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: format!("tile side {side}"),
                });
            }
        }

        let codec = TileCodec::from_tag(
            optional(TiffTag::Compression, 1)?,
            optional(TiffTag::SamplesPerPixel, 1)?,
            optional(TiffTag::BitsPerSample, 1)?,
            optional(TiffTag::PlanarConfiguration, 1)?,
        )?;

        let tiles_across = candidate.width.div_ceil(tile_width);
        let tiles_down = candidate.height.div_ceil(tile_height);
        let tile_count = tiles_across * tiles_down;

        let offsets = tags.uints(TiffTag::TileOffsets, required(TiffTag::TileOffsets)?)?;
        let byte_counts = tags.uints(TiffTag::TileByteCounts, required(TiffTag::TileByteCounts)?)?;
        if (offsets.len() as u64) < tile_count || (byte_counts.len() as u64) < tile_count {
            return Err(TiffError::InvalidTagValue {
                tag: TiffTag::TileOffsets.name(),
                message: format!(
                    "{} offsets and {} byte counts for {tile_count} tiles",
                    offsets.len(),
                    byte_counts.len()
                ),
            });
        }

        let jpeg_tables = match ifd.entry(TiffTag::JpegTables) {
            Some(entry) if codec == TileCodec::Jpeg => Some(tags.bytes(TiffTag::JpegTables, entry)?),
            _ => None,
        };

        Ok(TiledLevel {
            width: candidate.width as u32,
            height: candidate.height as u32,
            tile_width: tile_width as u32,
            tile_height: tile_height as u32,
            tiles_across: tiles_across as u32,
            tiles_down: tiles_down as u32,
            downsample,
            codec,
            offsets,
            byte_counts,
            jpeg_tables,
        })
    }
}

/// Whether a candidate with per-axis downsamples `(ds_x, ds_y)` continues a
/// pyramid whose coarsest level so far has downsample `previous`.
fn is_pyramid_step(ds_x: f64, ds_y: f64, previous: Option<f64>) -> bool {
    if (ds_x - ds_y).abs() / ds_x.max(ds_y) > LEVEL_TOLERANCE {
        return false;
    }
    let downsample = (ds_x + ds_y) / 2.0;
    if previous.is_some_and(|p| downsample <= p * (1.0 + LEVEL_TOLERANCE)) {
        return false;
    }

    let power = downsample.log2().round();
    if power < 1.0 {
        return false;
    }
    let ratio = downsample / 2f64.powf(power);
    (1.0 - LEVEL_TOLERANCE..1.0 + LEVEL_TOLERANCE).contains(&ratio)
}
