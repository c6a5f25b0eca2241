use alloc::string::String;

/// All errors that can occur while compressing or decompressing tiles.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Bad axis count, or a zero axis or tile length.
    InvalidDimension(&'static str),
    /// Unrecognized compression-type tag.
    UnsupportedCodec(String),
    /// Pixel type or pixel values the codec cannot represent.
    BadDataType {
        tile: Option<usize>,
        codec: &'static str,
        reason: &'static str,
    },
    /// A codec encode step failed.
    CompressionFailure {
        tile: Option<usize>,
        codec: &'static str,
        reason: &'static str,
    },
    /// A codec decode step received a truncated or malformed byte stream.
    CorruptData {
        tile: Option<usize>,
        codec: &'static str,
        reason: &'static str,
    },
    /// A tile has neither a compressed nor an uncompressed representation.
    NoCompressedTile(usize),
    /// A scratch or result buffer could not be allocated.
    MemoryAllocation,
    /// Unrecognized BITPIX / ZBITPIX value.
    InvalidBitpix(i64),
    /// A required keyword was not found.
    MissingKeyword(&'static str),
    /// A keyword or parameter value is out of range or of the wrong type.
    InvalidValue(&'static str),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

impl Error {
    pub(crate) fn bad_data(codec: &'static str, reason: &'static str) -> Self {
        Error::BadDataType {
            tile: None,
            codec,
            reason,
        }
    }

    pub(crate) fn compression(codec: &'static str, reason: &'static str) -> Self {
        Error::CompressionFailure {
            tile: None,
            codec,
            reason,
        }
    }

    pub(crate) fn corrupt(codec: &'static str, reason: &'static str) -> Self {
        Error::CorruptData {
            tile: None,
            codec,
            reason,
        }
    }

    /// Attach a tile index to codec errors that do not carry one yet.
    pub fn at_tile(self, index: usize) -> Self {
        match self {
            Error::BadDataType {
                tile: None,
                codec,
                reason,
            } => Error::BadDataType {
                tile: Some(index),
                codec,
                reason,
            },
            Error::CompressionFailure {
                tile: None,
                codec,
                reason,
            } => Error::CompressionFailure {
                tile: Some(index),
                codec,
                reason,
            },
            Error::CorruptData {
                tile: None,
                codec,
                reason,
            } => Error::CorruptData {
                tile: Some(index),
                codec,
                reason,
            },
            other => other,
        }
    }

    /// The tile index the error refers to, if known.
    pub fn tile(&self) -> Option<usize> {
        match self {
            Error::BadDataType { tile, .. }
            | Error::CompressionFailure { tile, .. }
            | Error::CorruptData { tile, .. } => *tile,
            Error::NoCompressedTile(tile) => Some(*tile),
            _ => None,
        }
    }
}

struct TileSuffix(Option<usize>);

impl core::fmt::Display for TileSuffix {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.0 {
            Some(t) => write!(f, " in tile {t}"),
            None => Ok(()),
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::InvalidDimension(msg) => write!(f, "invalid dimension: {msg}"),
            Error::UnsupportedCodec(name) => write!(f, "unsupported compression type: {name}"),
            Error::BadDataType {
                tile,
                codec,
                reason,
            } => write!(f, "bad data type for {codec}{}: {reason}", TileSuffix(*tile)),
            Error::CompressionFailure {
                tile,
                codec,
                reason,
            } => write!(f, "{codec} compression failed{}: {reason}", TileSuffix(*tile)),
            Error::CorruptData {
                tile,
                codec,
                reason,
            } => write!(f, "corrupt {codec} data{}: {reason}", TileSuffix(*tile)),
            Error::NoCompressedTile(t) => {
                write!(f, "no compressed or uncompressed data for tile {t}")
            }
            Error::MemoryAllocation => write!(f, "memory allocation failed"),
            Error::InvalidBitpix(v) => write!(f, "invalid BITPIX value: {v}"),
            Error::MissingKeyword(kw) => write!(f, "missing required keyword: {kw}"),
            Error::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<alloc::collections::TryReserveError> for Error {
    fn from(_: alloc::collections::TryReserveError) -> Self {
        Error::MemoryAllocation
    }
}
