//! Module with the important struct that people wishing
//! to compress or decompress LAZ data can use
//!
//! It defines the LaszipCompressor & LaszipDecompressor
//! as well as the Laszip VLr data and how to build it

mod chunk_table;
mod compression;
mod decompression;
mod details;
#[cfg(feature = "parallel")]
mod parallel;
mod vlr;

pub use chunk_table::{ChunkTable, ChunkTableEntry};
pub use compression::{compress_buffer, LasZipCompressor};
pub use decompression::{decompress_buffer, LasZipDecompressor};
pub(crate) use details::record_decompressor_from_vlr;
#[cfg(feature = "parallel")]
pub use parallel::{par_compress, par_compress_buffer, par_decompress_buffer};
pub use vlr::{CompressorType, LazItem, LazItemRecordBuilder, LazItemType, LazVlr, LazVlrBuilder};
