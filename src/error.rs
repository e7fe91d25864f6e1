use thiserror::Error;

/// Errors raised by the relational store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite reported a failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The connection mutex was poisoned by a panicking writer
    #[error("Database lock poisoned: {0}")]
    LockPoisoned(String),

    /// A stored JSON column could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A row holds a value that the schema does not allow
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}

/// Errors from the template import, validation and export pipeline.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The uploaded document is not well-formed XML
    #[error("Failed to parse XML: {0}")]
    Parse(String),

    /// Unknown profile, or a profile without an active version
    #[error("{0}")]
    NotFound(String),

    /// Input rejected before touching the store
    #[error("{0}")]
    Invalid(String),

    /// The import ran past its deadline and was rolled back
    #[error("Template import timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// An export projection could not be rendered
    #[error("Export failed: {0}")]
    Export(String),

    /// Store-level failure; the surrounding transaction was rolled back
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl From<rusqlite::Error> for TemplateError {
    fn from(err: rusqlite::Error) -> Self {
        TemplateError::Persistence(StoreError::Sqlite(err))
    }
}

/// Errors from a batch path-mapping update.
#[derive(Debug, Error)]
pub enum MappingUpdateError {
    /// One or more items were rejected; nothing was written
    #[error("Mapping update rejected with {} error(s)", .0.len())]
    Rejected(Vec<String>),

    /// The request body was not a list of mapping items
    #[error("Invalid payload format. Expected a list.")]
    InvalidPayload,

    /// Store-level failure; the batch was rolled back
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl From<rusqlite::Error> for MappingUpdateError {
    fn from(err: rusqlite::Error) -> Self {
        MappingUpdateError::Persistence(StoreError::Sqlite(err))
    }
}

/// Errors from report creation and lookup.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Unknown slide, profile or active template
    #[error("{0}")]
    NotFound(String),

    /// A supplied value does not parse as the property datatype
    #[error("Value '{value}' for property '{property}' is not a valid {datatype}")]
    InvalidValue {
        property: String,
        datatype: String,
        value: String,
    },

    /// Store-level failure; the report was not created
    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl From<rusqlite::Error> for ReportError {
    fn from(err: rusqlite::Error) -> Self {
        ReportError::Persistence(StoreError::Sqlite(err))
    }
}

/// Errors from the pyramidal image and DICOM readers.
///
/// Cloneable so that a failed open can be shared with every request
/// waiting on the same slide.
#[derive(Debug, Clone, Error)]
pub enum ReaderError {
    /// Filesystem failure while opening or reading a slide
    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    /// The image could not be decoded
    #[error("Failed to decode image: {message}")]
    Decode { message: String },

    /// A region request falls outside the level bounds
    #[error("Region ({x}, {y}) {width}x{height} outside level {level}")]
    InvalidRegion {
        level: usize,
        x: i64,
        y: i64,
        width: u32,
        height: u32,
    },

    /// The file is readable but not in a format this reader decodes
    #[error("Unsupported format for {path}: {reason}")]
    Unsupported { path: String, reason: String },

    /// The DICOM stream is truncated or malformed
    #[error("Invalid DICOM data: {0}")]
    Dicom(String),
}

/// Errors from the tiled TIFF parser.
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// A byte range could not be read from the file
    #[error("I/O error at offset {offset}: {message}")]
    Io { offset: u64, message: String },

    /// A structure points past the end of the file
    #[error("Truncated TIFF: range ends at {required}, file has {actual} bytes")]
    Truncated { required: u64, actual: u64 },

    /// Byte order marker is neither II nor MM
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Version is neither 42 (TIFF) nor 43 (BigTIFF)
    #[error("Invalid TIFF version: expected 42 or 43, got {0}")]
    InvalidVersion(u16),

    /// BigTIFF offset byte size other than 8
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// IFD offset outside the file or revisited
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// A tiled IFD lacks a tag the tile reader needs
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// A tag has an unexpected type, count or value
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Tiles are stored with a codec the reader does not decode
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// No IFD qualifies as a tiled pyramid level
    #[error("No tiled pyramid levels")]
    NotTiled,
}

/// Errors from the slide directory scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The slides root or one of its folders could not be listed
    #[error("Cannot read slides directory {path}: {message}")]
    Io { path: String, message: String },

    /// Persisting discovered slides failed; nothing was written
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}

impl From<rusqlite::Error> for ScanError {
    fn from(err: rusqlite::Error) -> Self {
        ScanError::Store(StoreError::Sqlite(err))
    }
}

/// Errors that can occur during tile generation and slide metadata lookup.
#[derive(Debug, Error)]
pub enum TileError {
    /// No file or folder with this name under the slides root
    #[error("Slide not found: {slide}")]
    SlideNotFound { slide: String },

    /// Deep Zoom address outside the pyramid
    #[error("Invalid tile coordinates: level {level}, col {col}, row {row}")]
    InvalidCoordinates { level: u32, col: u32, row: u32 },

    /// The slide exists but this layer cannot tile it
    #[error("Unsupported slide {slide}: {reason}")]
    UnsupportedSlide { slide: String, reason: String },

    /// The underlying reader failed
    #[error("Reader error: {0}")]
    Reader(#[from] ReaderError),

    /// JPEG encoding failed
    #[error("Failed to encode tile: {message}")]
    Encode { message: String },

    /// A blocking worker panicked or was cancelled
    #[error("Tile worker failed: {message}")]
    Worker { message: String },

    /// Report lookup for the narrative overlay failed
    #[error("Persistence error: {0}")]
    Store(#[from] StoreError),
}
