//! Tiled TIFF parsing: headers, directories and pyramid levels.
//!
//! Covers classic TIFF and BigTIFF in either byte order. Level tile tables
//! are loaded once at open; tile bytes are read on demand.

mod header;
mod ifd;
mod jpeg;
mod pyramid;

pub use header::{is_tiff_header, ByteOrder, TiffHeader, BIG_HEADER_SIZE, CLASSIC_HEADER_SIZE};
pub use ifd::{FieldType, Ifd, IfdEntry, TagReader, TiffTag};
pub use jpeg::complete_tile_stream;
pub use pyramid::{TileCodec, TiffFlavor, TiffPyramid, TiledLevel};
