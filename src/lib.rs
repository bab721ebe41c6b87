//! LASzip compatible compression of LAS point records.
//!
//! Points are compressed in chunks, each chunk is coded with adaptive
//! arithmetic coding and can be decoded on its own.
//!
//! There are two ways to use this crate:
//!
//! - [`las::stream`] works with [`las::Point`] values, one at a time.
//! - [`LasZipCompressor`] and [`LasZipDecompressor`] work with raw LAS point
//!   bytes, as they are found in a LAS file.
//!
//! # LasZipCompressor Examples
//!
//! ```
//! use laz_codec::{LasZipError, LasZipCompressor, LazItemType, LazItemRecordBuilder};
//!
//! # fn main() -> Result<(), LasZipError> {
//! // Here we use a Cursor but a std::fs::File will work just fine
//! let mut compressed_output = std::io::Cursor::new(vec![]);
//!
//! // LazItem may have multiple versions of the compression algorithm
//! // the builder selects a default one
//! let items = LazItemRecordBuilder::new()
//!             .add_item(LazItemType::Point10)
//!             .add_item(LazItemType::RGB12)
//!             .build();
//! let mut compressor = LasZipCompressor::from_laz_items(&mut compressed_output, items)?;
//!
//! let point = vec![0u8; 26];
//! compressor.compress_one(&point)?;
//! compressor.done()?; // don't forget to call done when you are...done compressing
//!
//! # Ok(())
//! # }
//! ```
//!
//! LasZipCompressors can also be constructed from a LazVlr if you need to change the chunk size
//! or if you have the LazVlr from the original LAZ file that you want to write back
//! ```
//! use laz_codec::{LasZipError, LasZipCompressor, LasZipDecompressor, LazItemRecordBuilder, LazVlrBuilder};
//!
//! # fn main() -> Result<(), LasZipError> {
//! let items = LazItemRecordBuilder::default_for_point_format_id(3, 0)?;
//! let vlr = LazVlrBuilder::new()
//!           .with_laz_items(items)
//!           .with_chunk_size(5_000)
//!           .build();
//!
//! let mut compressor = LasZipCompressor::new(std::io::Cursor::new(vec![]), vlr.clone())?;
//! let point = vec![0u8; 34];
//! compressor.compress_one(&point)?;
//! compressor.done()?;
//!
//! let compressed = compressor.into_inner().into_inner();
//! let mut decompressor = LasZipDecompressor::new(std::io::Cursor::new(compressed), vlr)?;
//! let mut decompressed = vec![1u8; 34];
//! decompressor.decompress_one(&mut decompressed)?;
//! assert_eq!(decompressed, point);
//! # Ok(())
//! # }
//! ```
//!
//! # Parallelism
//!
//! This crates has an optional feature 'parallel'.
//! When using this feature, additional `par_` methods are exposed.
//!
//! - [`par_compress_buffer`]
//! - [`par_decompress_buffer`]
//!
//! [`par_compress_buffer`]: las/laszip/fn.par_compress_buffer.html
//! [`par_decompress_buffer`]: las/laszip/fn.par_decompress_buffer.html

pub mod compressors;
pub mod decoders;
pub mod decompressors;
pub mod encoders;
pub mod models;

pub mod errors;
pub mod las;
pub mod packers;
pub mod record;

pub use errors::LasZipError;
pub use las::laszip::{compress_buffer, decompress_buffer};
#[cfg(feature = "parallel")]
pub use las::laszip::{par_compress_buffer, par_decompress_buffer};
pub use las::laszip::{
    CompressorType, LasZipCompressor, LasZipDecompressor, LazItem, LazItemRecordBuilder,
    LazItemType, LazVlr, LazVlrBuilder,
};
pub use las::stream::{open_reader, open_writer, CompressedPoints, Reader, Writer};
pub use las::{Point, PointFormat};

pub type Result<T> = std::result::Result<T, LasZipError>;
