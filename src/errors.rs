//! Definitions of error related things.

use crate::las::laszip::{CompressorType, LazItemType};
use thiserror::Error;

/// Errors of this crate
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LasZipError {
    /// The decoder ran out of bytes before completing a symbol
    #[error("The compressed stream ended before the point could be decoded")]
    TruncatedStream,
    /// A chunk could not be decoded, other chunks are not affected
    #[error("Chunk {0} is corrupt")]
    ChunkCorrupt(usize),
    /// The point format id is not supported
    #[error("Point format {0} is not supported")]
    UnsupportedPointFormat(u8),
    /// A symbol was coded against a model that cannot represent it
    #[error("Symbol {symbol} does not fit in a model of {symbols} symbols")]
    ModelOverflow { symbol: u32, symbols: u32 },
    /// The decoder reached a state no valid stream can produce
    #[error("The compressed stream is corrupt")]
    CorruptStream,
    /// The Laz item it not known
    #[error("Item with type code: {0} is unknown")]
    UnknownLazItem(u16),
    /// The compression version used for the item is not supported
    #[error("Item {0:?} with compression version: {1} is not supported")]
    UnsupportedLazItemVersion(LazItemType, u16),
    /// The type of compressor used is not known
    #[error("Compressor type {0} is not valid")]
    UnknownCompressorType(u16),
    /// The type of compressor exists but it is not supported
    #[error("Compressor type {0:?} is not supported")]
    UnsupportedCompressorType(CompressorType),
    #[error("The len of the buffer ({buffer_len}) is not a multiple of the point size {point_size}")]
    BufferLenNotMultipleOfPointSize {
        buffer_len: usize,
        point_size: usize,
    },
    /// A chunk was requested past the last chunk of the stream
    #[error("Chunk {index} does not exist, the stream has {count} chunks")]
    ChunkIndexOutOfBounds { index: usize, count: usize },
    /// The chunk table could not be found in the file
    /// and it is required for the operation.
    #[error("The chunk table could not be found")]
    MissingChunkTable,
    /// Wrapper around and io error from the std lib
    #[error("IoError: {0}")]
    IoError(std::io::Error),
}

impl From<std::io::Error> for LasZipError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            LasZipError::TruncatedStream
        } else {
            LasZipError::IoError(e)
        }
    }
}

impl LasZipError {
    /// Turns errors that only mean "the bytes of this chunk are wrong"
    /// into a [`LasZipError::ChunkCorrupt`] for the given chunk.
    pub(crate) fn in_chunk(self, chunk_index: usize) -> Self {
        match self {
            LasZipError::CorruptStream => LasZipError::ChunkCorrupt(chunk_index),
            other => other,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_unexpected_eof_is_truncation() {
        let e = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(LasZipError::from(e), LasZipError::TruncatedStream));

        let e = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(LasZipError::from(e), LasZipError::IoError(_)));
    }

    #[test]
    fn test_in_chunk_keeps_truncation() {
        assert!(matches!(
            LasZipError::CorruptStream.in_chunk(3),
            LasZipError::ChunkCorrupt(3)
        ));
        assert!(matches!(
            LasZipError::TruncatedStream.in_chunk(3),
            LasZipError::TruncatedStream
        ));
    }
}
