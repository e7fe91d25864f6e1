//! Image File Directories and their tag values.
//!
//! An entry's value lives inline in the entry when it fits the offset slot
//! (4 bytes classic, 8 BigTIFF); otherwise the slot holds a file offset.

use bytes::Bytes;

use crate::error::TiffError;

use super::super::range::RangeReader;
use super::header::TiffHeader;

/// Entry counts above this are treated as corrupt.
const MAX_IFD_ENTRIES: u64 = 4096;

// =============================================================================
// Field Types and Tags
// =============================================================================

/// Value encodings the reader understands. Other types are skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Byte,
    Ascii,
    Short,
    Long,
    Rational,
    Undefined,
    Long8,
}

impl FieldType {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(FieldType::Byte),
            2 => Some(FieldType::Ascii),
            3 => Some(FieldType::Short),
            4 => Some(FieldType::Long),
            5 => Some(FieldType::Rational),
            7 => Some(FieldType::Undefined),
            16 => Some(FieldType::Long8),
            _ => None,
        }
    }

    pub const fn size(self) -> u64 {
        match self {
            FieldType::Byte | FieldType::Ascii | FieldType::Undefined => 1,
            FieldType::Short => 2,
            FieldType::Long => 4,
            FieldType::Rational | FieldType::Long8 => 8,
        }
    }
}

/// Tags read when building a pyramid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TiffTag {
    ImageWidth = 256,
    ImageLength = 257,
    BitsPerSample = 258,
    Compression = 259,
    ImageDescription = 270,
    SamplesPerPixel = 277,
    PlanarConfiguration = 284,
    TileWidth = 322,
    TileLength = 323,
    TileOffsets = 324,
    TileByteCounts = 325,
    JpegTables = 347,
}

impl TiffTag {
    pub const fn name(self) -> &'static str {
        match self {
            TiffTag::ImageWidth => "ImageWidth",
            TiffTag::ImageLength => "ImageLength",
            TiffTag::BitsPerSample => "BitsPerSample",
            TiffTag::Compression => "Compression",
            TiffTag::ImageDescription => "ImageDescription",
            TiffTag::SamplesPerPixel => "SamplesPerPixel",
            TiffTag::PlanarConfiguration => "PlanarConfiguration",
            TiffTag::TileWidth => "TileWidth",
            TiffTag::TileLength => "TileLength",
            TiffTag::TileOffsets => "TileOffsets",
            TiffTag::TileByteCounts => "TileByteCounts",
            TiffTag::JpegTables => "JPEGTables",
        }
    }
}

// =============================================================================
// Entries
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfdEntry {
    pub tag: u16,
    /// `None` for encodings the reader skips
    pub field_type: Option<FieldType>,
    pub count: u64,
    /// Raw value/offset slot, zero-padded to 8 bytes
    pub slot: [u8; 8],
}

impl IfdEntry {
    /// Total size of the value, if the type is known and the size fits `u64`.
    pub fn byte_len(&self) -> Option<u64> {
        self.field_type?.size().checked_mul(self.count)
    }
}

/// One directory: its entries and the offset of the next one (0 ends the chain).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ifd {
    pub entries: Vec<IfdEntry>,
    pub next_offset: u64,
}

impl Ifd {
    /// Read the directory at `offset`.
    pub fn read<R: RangeReader + ?Sized>(
        reader: &R,
        header: &TiffHeader,
        offset: u64,
    ) -> Result<Self, TiffError> {
        let count_bytes = reader.read_exact_at(offset, header.count_size())?;
        let count = if header.is_bigtiff {
            header.byte_order.u64(&count_bytes)
        } else {
            header.byte_order.u16(&count_bytes) as u64
        };
        if count > MAX_IFD_ENTRIES {
            return Err(TiffError::InvalidTagValue {
                tag: "IFD",
                message: format!("{count} entries at offset {offset}"),
            });
        }

        let entry_size = header.entry_size();
        let body_len = count as usize * entry_size + header.offset_size();
        let body_start = offset + header.count_size() as u64;
        let body = reader.read_exact_at(body_start, body_len)?;

        let order = header.byte_order;
        let entries = body
            .chunks_exact(entry_size)
            .take(count as usize)
            .map(|raw| {
                let (count, slot_bytes) = if header.is_bigtiff {
                    (order.u64(&raw[4..12]), &raw[12..20])
                } else {
                    (order.u32(&raw[4..8]) as u64, &raw[8..12])
                };
                let mut slot = [0u8; 8];
                slot[..slot_bytes.len()].copy_from_slice(slot_bytes);
                IfdEntry {
                    tag: order.u16(&raw[0..2]),
                    field_type: FieldType::from_u16(order.u16(&raw[2..4])),
                    count,
                    slot,
                }
            })
            .collect();

        let next_offset = header.read_offset(&body[count as usize * entry_size..]);

        Ok(Self {
            entries,
            next_offset,
        })
    }

    pub fn entry(&self, tag: TiffTag) -> Option<&IfdEntry> {
        self.entries.iter().find(|e| e.tag == tag as u16)
    }
}

// =============================================================================
// Value Reading
// =============================================================================

/// Reads entry values inline or from the file, honouring the byte order.
pub struct TagReader<'a, R: RangeReader + ?Sized> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader + ?Sized> TagReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Raw value bytes of `entry`.
    pub fn bytes(&self, tag: TiffTag, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let len = entry.byte_len().ok_or_else(|| TiffError::InvalidTagValue {
            tag: tag.name(),
            message: format!("unreadable type with count {}", entry.count),
        })?;

        if len <= self.header.offset_size() as u64 {
            return Ok(Bytes::copy_from_slice(&entry.slot[..len as usize]));
        }

        let offset = self.header.read_offset(&entry.slot);
        let len = usize::try_from(len).map_err(|_| TiffError::Truncated {
            required: len,
            actual: self.reader.size(),
        })?;
        self.reader.read_exact_at(offset, len)
    }

    /// All values of an integer entry, widened to `u64`.
    pub fn uints(&self, tag: TiffTag, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let order = self.header.byte_order;
        let width = match entry.field_type {
            Some(FieldType::Byte) => 1,
            Some(FieldType::Short) => 2,
            Some(FieldType::Long) => 4,
            Some(FieldType::Long8) => 8,
            other => {
                return Err(TiffError::InvalidTagValue {
                    tag: tag.name(),
                    message: format!("expected an integer type, got {other:?}"),
                })
            }
        };

        let bytes = self.bytes(tag, entry)?;
        Ok(bytes
            .chunks_exact(width)
            .map(|chunk| match width {
                1 => chunk[0] as u64,
                2 => order.u16(chunk) as u64,
                4 => order.u32(chunk) as u64,
                _ => order.u64(chunk),
            })
            .collect())
    }

    /// First value of an integer entry.
    pub fn uint(&self, tag: TiffTag, entry: &IfdEntry) -> Result<u64, TiffError> {
        self.uints(tag, entry)?
            .first()
            .copied()
            .ok_or_else(|| TiffError::InvalidTagValue {
                tag: tag.name(),
                message: "empty value".to_string(),
            })
    }

    /// ASCII value up to the first NUL.
    pub fn string(&self, tag: TiffTag, entry: &IfdEntry) -> Result<String, TiffError> {
        let bytes = self.bytes(tag, entry)?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slide::tiff::header::ByteOrder;

    fn classic_le() -> TiffHeader {
        TiffHeader {
            byte_order: ByteOrder::LittleEndian,
            is_bigtiff: false,
            first_ifd_offset: 8,
        }
    }

    fn entry(tag: u16, field_type: u16, count: u32, slot: [u8; 4]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&tag.to_le_bytes());
        raw.extend_from_slice(&field_type.to_le_bytes());
        raw.extend_from_slice(&count.to_le_bytes());
        raw.extend_from_slice(&slot);
        raw
    }

    /// Header, one IFD at offset 8 and an out-of-line array after it.
    fn file() -> Bytes {
        let mut data = vec![0x49, 0x49, 0x2A, 0x00, 0x08, 0x00, 0x00, 0x00];
        data.extend_from_slice(&3u16.to_le_bytes());
        data.extend(entry(256, 3, 1, [0x00, 0x04, 0, 0]));
        data.extend(entry(324, 4, 3, 50u32.to_le_bytes()));
        data.extend(entry(270, 2, 4, *b"abc\0"));
        data.extend_from_slice(&0u32.to_le_bytes());
        data.resize(50, 0);
        for value in [100u32, 200, 300] {
            data.extend_from_slice(&value.to_le_bytes());
        }
        Bytes::from(data)
    }

    #[test]
    fn test_read_ifd_entries() {
        let data = file();
        let ifd = Ifd::read(&data, &classic_le(), 8).unwrap();

        assert_eq!(ifd.entries.len(), 3);
        assert_eq!(ifd.next_offset, 0);
        assert_eq!(ifd.entry(TiffTag::TileOffsets).map(|e| e.count), Some(3));
        assert!(ifd.entry(TiffTag::TileWidth).is_none());
    }

    #[test]
    fn test_inline_and_offset_values() {
        let data = file();
        let header = classic_le();
        let ifd = Ifd::read(&data, &header, 8).unwrap();
        let tags = TagReader::new(&data, &header);

        let width = ifd.entry(TiffTag::ImageWidth).unwrap();
        assert_eq!(tags.uint(TiffTag::ImageWidth, width).unwrap(), 1024);

        let offsets = ifd.entry(TiffTag::TileOffsets).unwrap();
        assert_eq!(tags.uints(TiffTag::TileOffsets, offsets).unwrap(), vec![100, 200, 300]);

        let description = ifd.entry(TiffTag::ImageDescription).unwrap();
        assert_eq!(tags.string(TiffTag::ImageDescription, description).unwrap(), "abc");
        assert!(tags.uint(TiffTag::ImageDescription, description).is_err());
    }

    #[test]
    fn test_corrupt_counts_are_rejected() {
        let mut data = file().to_vec();
        data[8..10].copy_from_slice(&u16::MAX.to_le_bytes());
        assert!(Ifd::read(&Bytes::from(data), &classic_le(), 8).is_err());

        let huge = IfdEntry {
            tag: 324,
            field_type: Some(FieldType::Long8),
            count: u64::MAX,
            slot: [0; 8],
        };
        let data = file();
        let header = classic_le();
        assert!(TagReader::new(&data, &header).bytes(TiffTag::TileOffsets, &huge).is_err());
    }
}
