//! TIFF and BigTIFF file headers.
//!
//! ```text
//! classic  II|MM  42  first IFD (u32)
//! BigTIFF  II|MM  43  8  0  first IFD (u64)
//! ```

use crate::error::TiffError;

const LITTLE_ENDIAN_MARKER: u16 = 0x4949;
const BIG_ENDIAN_MARKER: u16 = 0x4D4D;

const VERSION_CLASSIC: u16 = 42;
const VERSION_BIG: u16 = 43;

pub const CLASSIC_HEADER_SIZE: usize = 8;
pub const BIG_HEADER_SIZE: usize = 16;

/// Endianness declared by the first two bytes of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    LittleEndian,
    BigEndian,
}

impl ByteOrder {
    /// Read a `u16` from the first two bytes of `bytes`.
    ///
    /// Callers slice exactly; short input reads as zero-padded.
    pub fn u16(self, bytes: &[u8]) -> u16 {
        let mut buf = [0u8; 2];
        copy_prefix(&mut buf, bytes);
        match self {
            ByteOrder::LittleEndian => u16::from_le_bytes(buf),
            ByteOrder::BigEndian => u16::from_be_bytes(buf),
        }
    }

    pub fn u32(self, bytes: &[u8]) -> u32 {
        let mut buf = [0u8; 4];
        copy_prefix(&mut buf, bytes);
        match self {
            ByteOrder::LittleEndian => u32::from_le_bytes(buf),
            ByteOrder::BigEndian => u32::from_be_bytes(buf),
        }
    }

    pub fn u64(self, bytes: &[u8]) -> u64 {
        let mut buf = [0u8; 8];
        copy_prefix(&mut buf, bytes);
        match self {
            ByteOrder::LittleEndian => u64::from_le_bytes(buf),
            ByteOrder::BigEndian => u64::from_be_bytes(buf),
        }
    }
}

fn copy_prefix(buf: &mut [u8], bytes: &[u8]) {
    let n = buf.len().min(bytes.len());
    buf[..n].copy_from_slice(&bytes[..n]);
}

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TiffHeader {
    pub byte_order: ByteOrder,
    pub is_bigtiff: bool,
    pub first_ifd_offset: u64,
}

impl TiffHeader {
    /// Parse the leading bytes of a file of `file_size` bytes.
    pub fn parse(bytes: &[u8], file_size: u64) -> Result<Self, TiffError> {
        if bytes.len() < CLASSIC_HEADER_SIZE {
            return Err(TiffError::Truncated {
                required: CLASSIC_HEADER_SIZE as u64,
                actual: bytes.len() as u64,
            });
        }

        let byte_order = match u16::from_le_bytes([bytes[0], bytes[1]]) {
            LITTLE_ENDIAN_MARKER => ByteOrder::LittleEndian,
            BIG_ENDIAN_MARKER => ByteOrder::BigEndian,
            other => return Err(TiffError::InvalidMagic(other)),
        };

        let (is_bigtiff, first_ifd_offset) = match byte_order.u16(&bytes[2..4]) {
            VERSION_CLASSIC => (false, byte_order.u32(&bytes[4..8]) as u64),
            VERSION_BIG => {
                if bytes.len() < BIG_HEADER_SIZE {
                    return Err(TiffError::Truncated {
                        required: BIG_HEADER_SIZE as u64,
                        actual: bytes.len() as u64,
                    });
                }
                let offset_size = byte_order.u16(&bytes[4..6]);
                if offset_size != 8 {
                    return Err(TiffError::InvalidBigTiffOffsetSize(offset_size));
                }
                (true, byte_order.u64(&bytes[8..16]))
            }
            other => return Err(TiffError::InvalidVersion(other)),
        };

        if first_ifd_offset >= file_size {
            return Err(TiffError::InvalidIfdOffset(first_ifd_offset));
        }

        Ok(Self {
            byte_order,
            is_bigtiff,
            first_ifd_offset,
        })
    }

    /// Bytes per IFD entry: 12 classic, 20 BigTIFF.
    pub const fn entry_size(&self) -> usize {
        if self.is_bigtiff {
            20
        } else {
            12
        }
    }

    /// Width of the entry count that opens an IFD.
    pub const fn count_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            2
        }
    }

    /// Width of offsets, and of the inline value slot in an entry.
    pub const fn offset_size(&self) -> usize {
        if self.is_bigtiff {
            8
        } else {
            4
        }
    }

    pub fn read_offset(&self, bytes: &[u8]) -> u64 {
        if self.is_bigtiff {
            self.byte_order.u64(bytes)
        } else {
            self.byte_order.u32(bytes) as u64
        }
    }
}

/// Whether `bytes` starts like a TIFF or BigTIFF file.
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    matches!(
        bytes,
        [0x49, 0x49, 0x2A, 0x00, ..]
            | [0x4D, 0x4D, 0x00, 0x2A, ..]
            | [0x49, 0x49, 0x2B, 0x00, ..]
            | [0x4D, 0x4D, 0x00, 0x2B, ..]
    )
}
