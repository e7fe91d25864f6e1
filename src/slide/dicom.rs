//! Minimal DICOM element walker.
//!
//! Reads the data elements of one Part 10 file into a tag map, enough to
//! size a single-level pyramid and to show the header in the viewer. Pixel
//! data is never decoded.
//!
//! ```text
//! [128 byte preamble]["DICM"]
//! (0002,xxxx) file meta, always explicit VR little endian
//! (gggg,eeee) dataset, VR encoding set by (0002,0010)
//!
//! explicit:  tag(4) VR(2) len(2)            value
//!            tag(4) VR(2) 00 00 len(4)      value      OB OW SQ UN UT ...
//! implicit:  tag(4) len(4)                  value
//! ```
//!
//! Undefined-length sequences are skipped item by item. Reading stops at
//! the Pixel Data tag, so the frames themselves are never loaded. Big endian
//! transfer syntaxes are rejected.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::ReaderError;

/// Binary values larger than this many bytes are left out of the metadata map.
pub const BINARY_METADATA_LIMIT: usize = 1000;

const PREAMBLE_LEN: usize = 128;
const MAGIC: &[u8; 4] = b"DICM";
const UNDEFINED_LENGTH: u32 = 0xFFFF_FFFF;

const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
const EXPLICIT_VR_BIG_ENDIAN: &str = "1.2.840.10008.1.2.2";

/// VRs with a 2-byte reserved field and a 4-byte length in explicit encoding.
const LONG_LENGTH_VRS: [&[u8; 2]; 13] = [
    b"OB", b"OD", b"OF", b"OL", b"OV", b"OW", b"SQ", b"SV", b"UC", b"UN", b"UR", b"UT", b"UV",
];

const TEXT_VRS: [&[u8; 2]; 17] = [
    b"AE", b"AS", b"CS", b"DA", b"DS", b"DT", b"IS", b"LO", b"LT", b"PN", b"SH", b"ST", b"TM",
    b"UC", b"UI", b"UR", b"UT",
];

/// A `(group, element)` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DicomTag {
    pub group: u16,
    pub element: u16,
}

impl DicomTag {
    pub const fn new(group: u16, element: u16) -> Self {
        Self { group, element }
    }

    pub const TRANSFER_SYNTAX: DicomTag = DicomTag::new(0x0002, 0x0010);
    pub const ROWS: DicomTag = DicomTag::new(0x0028, 0x0010);
    pub const COLUMNS: DicomTag = DicomTag::new(0x0028, 0x0011);
    pub const ENCAPSULATED_DOCUMENT: DicomTag = DicomTag::new(0x0042, 0x0011);
    pub const PIXEL_DATA: DicomTag = DicomTag::new(0x7FE0, 0x0010);

    const ITEM: DicomTag = DicomTag::new(0xFFFE, 0xE000);
    const ITEM_DELIMITATION: DicomTag = DicomTag::new(0xFFFE, 0xE00D);
    const SEQUENCE_DELIMITATION: DicomTag = DicomTag::new(0xFFFE, 0xE0DD);

    /// VR of a few image-pixel tags, for implicit VR streams.
    fn implicit_vr(&self) -> Option<&'static [u8; 2]> {
        match (self.group, self.element) {
            (0x0028, 0x0002 | 0x0010 | 0x0011 | 0x0100 | 0x0101 | 0x0102 | 0x0103) => Some(b"US"),
            (0x0028, 0x0008) => Some(b"IS"),
            (0x0028, 0x0004) => Some(b"CS"),
            (0x7FE0, 0x0010) => Some(b"OW"),
            _ => None,
        }
    }
}

impl fmt::Display for DicomTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X}, {:04X})", self.group, self.element)
    }
}

/// Decoded value of one element.
#[derive(Debug, Clone, PartialEq)]
pub enum DicomValue {
    Text(String),
    Unsigned(Vec<u32>),
    Signed(Vec<i32>),
    Float(Vec<f64>),
    /// Raw bytes, kept by length only
    Binary(usize),
    Sequence,
}

impl fmt::Display for DicomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
            match values {
                [single] => write!(f, "{single}"),
                many => {
                    let parts: Vec<String> = many.iter().map(ToString::to_string).collect();
                    write!(f, "[{}]", parts.join(", "))
                }
            }
        }

        match self {
            DicomValue::Text(s) => f.write_str(s),
            DicomValue::Unsigned(v) => list(f, v),
            DicomValue::Signed(v) => list(f, v),
            DicomValue::Float(v) => list(f, v),
            DicomValue::Binary(len) => write!(f, "<{len} bytes>"),
            DicomValue::Sequence => f.write_str("<sequence>"),
        }
    }
}

/// Top-level elements of one DICOM file.
#[derive(Debug, Clone, Default)]
pub struct DicomDataset {
    elements: BTreeMap<DicomTag, DicomValue>,
}

impl DicomDataset {
    /// Read the header elements of `path`, stopping at pixel data.
    pub fn open(path: &Path) -> Result<Self, ReaderError> {
        let io_error = |e: std::io::Error| ReaderError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let file = File::open(path).map_err(io_error)?;
        let len = file.metadata().map_err(io_error)?.len();
        Self::read_from(BufReader::new(file), len)
    }

    pub fn parse(bytes: &[u8]) -> Result<Self, ReaderError> {
        Self::read_from(io::Cursor::new(bytes), bytes.len() as u64)
    }

    fn read_from<R: Read + Seek>(source: R, len: u64) -> Result<Self, ReaderError> {
        let mut reader = ElementReader {
            source,
            pos: 0,
            len,
        };

        let has_preamble = len >= (PREAMBLE_LEN + MAGIC.len()) as u64
            && reader.take(PREAMBLE_LEN + MAGIC.len())?[PREAMBLE_LEN..] == MAGIC[..];
        if !has_preamble {
            reader.seek_to(0)?;
        }

        // Without file meta, guess the encoding from the first element
        let mut explicit = !has_preamble && looks_explicit(&reader.peek(6)?);
        let mut elements = BTreeMap::new();
        let mut meta_done = !has_preamble;

        while !reader.is_empty() {
            let header = reader.header(explicit)?;

            if !meta_done && header.tag.group != 0x0002 {
                meta_done = true;
                let syntax = elements
                    .get(&DicomTag::TRANSFER_SYNTAX)
                    .map(ToString::to_string)
                    .unwrap_or_default();
                if syntax == EXPLICIT_VR_BIG_ENDIAN {
                    return Err(ReaderError::Dicom(
                        "big endian transfer syntax is not supported".into(),
                    ));
                }
                explicit = syntax != IMPLICIT_VR_LITTLE_ENDIAN;
                reader.seek_to(header.start)?;
                continue;
            }

            // Nothing after the pixel data is read
            if header.tag == DicomTag::PIXEL_DATA {
                let length = if header.length == UNDEFINED_LENGTH { 0 } else { header.length };
                elements.insert(header.tag, DicomValue::Binary(length as usize));
                break;
            }

            let vr = header.vr.or_else(|| header.tag.implicit_vr().copied());
            let value = if header.length == UNDEFINED_LENGTH {
                reader.skip_undefined(explicit)?;
                match vr {
                    Some(vr) if &vr != b"SQ" => DicomValue::Binary(0),
                    _ => DicomValue::Sequence,
                }
            } else if header.length as usize > BINARY_METADATA_LIMIT && is_binary(vr.as_ref()) {
                reader.skip(header.length)?;
                DicomValue::Binary(header.length as usize)
            } else {
                let raw = reader.take(header.length as usize)?;
                decode_value(vr.as_ref(), &raw)
            };
            elements.insert(header.tag, value);
        }

        Ok(Self { elements })
    }

    pub fn get(&self, tag: DicomTag) -> Option<&DicomValue> {
        self.elements.get(&tag)
    }

    fn first_unsigned(&self, tag: DicomTag) -> Option<u32> {
        match self.get(tag)? {
            DicomValue::Unsigned(v) => v.first().copied(),
            DicomValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn rows(&self) -> Option<u32> {
        self.first_unsigned(DicomTag::ROWS)
    }

    pub fn columns(&self) -> Option<u32> {
        self.first_unsigned(DicomTag::COLUMNS)
    }

    /// Displayable header, without pixel data, encapsulated documents or
    /// binary values over [`BINARY_METADATA_LIMIT`] bytes.
    pub fn filtered_metadata(&self) -> BTreeMap<String, String> {
        self.elements
            .iter()
            .filter(|(tag, _)| {
                **tag != DicomTag::PIXEL_DATA && **tag != DicomTag::ENCAPSULATED_DOCUMENT
            })
            .filter(|(_, value)| {
                !matches!(value, DicomValue::Binary(len) if *len > BINARY_METADATA_LIMIT)
            })
            .map(|(tag, value)| (tag.to_string(), value.to_string()))
            .collect()
    }
}

fn looks_explicit(bytes: &[u8]) -> bool {
    bytes
        .get(4..6)
        .is_some_and(|vr| vr.iter().all(u8::is_ascii_uppercase))
}

/// Values of these VRs are kept by length only.
fn is_binary(vr: Option<&[u8; 2]>) -> bool {
    match vr {
        Some(vr) => {
            !TEXT_VRS.contains(&vr)
                && ![b"US", b"UL", b"SS", b"SL", b"FL", b"FD", b"SQ"].contains(&vr)
        }
        None => true,
    }
}

fn decode_value(vr: Option<&[u8; 2]>, raw: &[u8]) -> DicomValue {
    let text = || DicomValue::Text(
        String::from_utf8_lossy(raw)
            .trim_end_matches(['\0', ' '])
            .trim_start()
            .to_string(),
    );

    match vr.map(|v| &v[..]) {
        Some(b"US") => DicomValue::Unsigned(
            raw.chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u32)
                .collect(),
        ),
        Some(b"UL") => DicomValue::Unsigned(
            raw.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        Some(b"SS") => DicomValue::Signed(
            raw.chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]) as i32)
                .collect(),
        ),
        Some(b"SL") => DicomValue::Signed(
            raw.chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        ),
        Some(b"FL") => DicomValue::Float(
            raw.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
                .collect(),
        ),
        Some(b"FD") => DicomValue::Float(
            raw.chunks_exact(8)
                .map(|c| {
                    let mut b = [0u8; 8];
                    b.copy_from_slice(c);
                    f64::from_le_bytes(b)
                })
                .collect(),
        ),
        Some(b"SQ") => DicomValue::Sequence,
        Some(vr) if TEXT_VRS.iter().any(|t| &t[..] == vr) => text(),
        Some(_) => DicomValue::Binary(raw.len()),
        // Implicit VR with no dictionary entry
        None if raw.iter().all(|b| b.is_ascii_graphic() || *b == b' ' || *b == 0) => text(),
        None => DicomValue::Binary(raw.len()),
    }
}

// =============================================================================
// Element reader
// =============================================================================

struct Header {
    /// Offset of the tag, for rewinding
    start: u64,
    tag: DicomTag,
    vr: Option<[u8; 2]>,
    length: u32,
}

/// Sequential reads over a seekable source of known length.
struct ElementReader<R> {
    source: R,
    pos: u64,
    len: u64,
}

impl<R: Read + Seek> ElementReader<R> {
    fn is_empty(&self) -> bool {
        self.pos >= self.len
    }

    fn remaining(&self) -> u64 {
        self.len.saturating_sub(self.pos)
    }

    fn truncated(&self, wanted: u64) -> ReaderError {
        ReaderError::Dicom(format!(
            "truncated at offset {}: wanted {wanted} bytes, {} left",
            self.pos,
            self.remaining()
        ))
    }

    /// Read `len` bytes. The length is checked against the source before allocating.
    fn take(&mut self, len: usize) -> Result<Vec<u8>, ReaderError> {
        if len as u64 > self.remaining() {
            return Err(self.truncated(len as u64));
        }
        let mut buf = vec![0u8; len];
        self.source
            .read_exact(&mut buf)
            .map_err(|e| ReaderError::Dicom(format!("read at offset {}: {e}", self.pos)))?;
        self.pos += len as u64;
        Ok(buf)
    }

    /// Read `len` bytes without consuming them.
    fn peek(&mut self, len: usize) -> Result<Vec<u8>, ReaderError> {
        let start = self.pos;
        let len = (len as u64).min(self.remaining()) as usize;
        let bytes = self.take(len)?;
        self.seek_to(start)?;
        Ok(bytes)
    }

    fn skip(&mut self, len: u32) -> Result<(), ReaderError> {
        if len as u64 > self.remaining() {
            return Err(self.truncated(len as u64));
        }
        self.seek_to(self.pos + len as u64)
    }

    fn seek_to(&mut self, offset: u64) -> Result<(), ReaderError> {
        self.source
            .seek(SeekFrom::Start(offset))
            .map_err(|e| ReaderError::Dicom(format!("seek to offset {offset}: {e}")))?;
        self.pos = offset;
        Ok(())
    }

    fn u16(&mut self) -> Result<u16, ReaderError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32, ReaderError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a tag and its length. Group 0002 and item tags ignore `explicit`.
    fn header(&mut self, explicit: bool) -> Result<Header, ReaderError> {
        let start = self.pos;
        let tag = DicomTag::new(self.u16()?, self.u16()?);

        if tag.group == 0xFFFE {
            let length = self.u32()?;
            return Ok(Header { start, tag, vr: None, length });
        }

        if explicit || tag.group == 0x0002 {
            let raw = self.take(2)?;
            let vr = [raw[0], raw[1]];
            let length = if LONG_LENGTH_VRS.contains(&&vr) {
                self.take(2)?;
                self.u32()?
            } else {
                self.u16()? as u32
            };
            Ok(Header { start, tag, vr: Some(vr), length })
        } else {
            let length = self.u32()?;
            Ok(Header { start, tag, vr: None, length })
        }
    }

    /// Skip the items of an undefined-length value up to its sequence delimiter.
    fn skip_undefined(&mut self, explicit: bool) -> Result<(), ReaderError> {
        loop {
            let header = self.header(explicit)?;
            match header.tag {
                DicomTag::SEQUENCE_DELIMITATION => return Ok(()),
                DicomTag::ITEM if header.length == UNDEFINED_LENGTH => {
                    self.skip_item(explicit)?;
                }
                DicomTag::ITEM => self.skip(header.length)?,
                other => {
                    return Err(ReaderError::Dicom(format!(
                        "unexpected element {other} inside sequence"
                    )))
                }
            }
        }
    }

    /// Skip the elements of an undefined-length item up to its delimiter.
    fn skip_item(&mut self, explicit: bool) -> Result<(), ReaderError> {
        loop {
            let header = self.header(explicit)?;
            if header.tag == DicomTag::ITEM_DELIMITATION {
                return Ok(());
            }
            if header.length == UNDEFINED_LENGTH {
                self.skip_undefined(explicit)?;
            } else {
                self.skip(header.length)?;
            }
        }
    }
}
