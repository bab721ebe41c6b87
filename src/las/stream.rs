//! Point-at-a-time access to compressed point data.
//!
//! A [`Writer`] compresses [`Point`]s into memory and hands back the point
//! data (chunk table offset, chunks, chunk table) on [`Writer::close`].
//! A [`Reader`] decompresses them back, one chunk in memory at a time,
//! and can jump to any chunk through the chunk table.
//!
//! ```
//! use laz_codec::las::point::Point;
//! use laz_codec::las::stream::{open_reader, open_writer};
//!
//! # fn main() -> laz_codec::Result<()> {
//! let mut writer = open_writer(1, 1_000)?;
//! for i in 0..2_500 {
//!     let point = Point {
//!         x: i,
//!         gps_time: f64::from(i) * 0.001,
//!         ..Default::default()
//!     };
//!     writer.write_point(&point)?;
//! }
//! let compressed = writer.close()?;
//! assert_eq!(compressed.chunk_offsets.len(), 3);
//!
//! let src = std::io::Cursor::new(compressed.data);
//! let mut reader = open_reader(1, 1_000, 2_500, src)?;
//! reader.seek_chunk(2)?;
//! let point = reader.read_point()?.unwrap();
//! assert_eq!(point.x, 2_000);
//! # Ok(())
//! # }
//! ```

use std::io::{Cursor, Read, Seek, SeekFrom};

use tracing::debug;

use crate::las::laszip::{
    record_decompressor_from_vlr, ChunkTable, CompressorType, LasZipCompressor, LazVlr,
    LazVlrBuilder,
};
use crate::las::point::{Point, PointFormat};
use crate::record::RecordDecompressor;
use crate::LasZipError;

fn stream_vlr(format: PointFormat, num_extra_bytes: u16, chunk_size: u32) -> LazVlr {
    let builder = LazVlrBuilder::new().with_laz_items(format.laz_items(num_extra_bytes));
    if chunk_size == 0 || chunk_size == LazVlr::VARIABLE_CHUNK_SIZE {
        builder.with_variable_chunk_size().build()
    } else {
        builder.with_chunk_size(chunk_size).build()
    }
}

/// The output of a [`Writer`].
#[derive(Debug, Clone)]
pub struct CompressedPoints {
    /// The point data: offset to the chunk table, chunks and chunk table
    pub data: Vec<u8>,
    /// Where each chunk starts in `data`
    pub chunk_offsets: Vec<u64>,
    pub point_count: u64,
    /// The laszip vlr to store next to the data
    pub vlr: LazVlr,
}

/// Opens a writer of points of the given format.
///
/// A `chunk_size` of 0 gives variable size chunks, closed
/// by [`Writer::finish_chunk`].
pub fn open_writer(point_format: u8, chunk_size: u32) -> crate::Result<Writer> {
    open_writer_with_extra_bytes(point_format, 0, chunk_size)
}

/// Opens a writer of points carrying `num_extra_bytes` extra bytes each.
pub fn open_writer_with_extra_bytes(
    point_format: u8,
    num_extra_bytes: u16,
    chunk_size: u32,
) -> crate::Result<Writer> {
    let format = PointFormat::new(point_format)?;
    Writer::from_vlr(format, stream_vlr(format, num_extra_bytes, chunk_size))
}

pub struct Writer {
    format: PointFormat,
    compressor: LasZipCompressor<'static, Cursor<Vec<u8>>>,
    buffer: Vec<u8>,
    point_count: u64,
}

impl Writer {
    /// Creates a writer compressing with the items of the vlr, they
    /// must describe the point format followed by its extra bytes.
    pub fn from_vlr(format: PointFormat, vlr: LazVlr) -> crate::Result<Self> {
        let point_size = vlr.items_size() as usize;
        if point_size < format.record_size() {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: format.record_size(),
                point_size,
            });
        }
        let compressor = LasZipCompressor::new(Cursor::new(Vec::new()), vlr)?;
        Ok(Self {
            format,
            compressor,
            buffer: vec![0u8; point_size],
            point_count: 0,
        })
    }

    pub fn write_point(&mut self, point: &Point) -> crate::Result<()> {
        let expected = self.buffer.len() - self.format.record_size();
        if point.extra_bytes.len() != expected {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: self.format.record_size() + point.extra_bytes.len(),
                point_size: self.buffer.len(),
            });
        }
        point.pack_into(self.format, &mut self.buffer);
        self.compressor.compress_one(&self.buffer)?;
        self.point_count += 1;
        Ok(())
    }

    /// Closes the current chunk, the next point starts a new one.
    pub fn finish_chunk(&mut self) -> crate::Result<()> {
        self.compressor.finish_current_chunk()
    }

    pub fn point_count(&self) -> u64 {
        self.point_count
    }

    pub fn close(mut self) -> crate::Result<CompressedPoints> {
        self.compressor.done()?;
        let chunk_offsets = self
            .compressor
            .chunk_table()
            .chunk_offsets(std::mem::size_of::<i64>() as u64);
        let vlr = self.compressor.vlr().clone();
        Ok(CompressedPoints {
            data: self.compressor.into_inner().into_inner(),
            chunk_offsets,
            point_count: self.point_count,
            vlr,
        })
    }
}

/// Opens a reader of `point_count` points of the given format,
/// `src` must be positioned at the start of the point data.
pub fn open_reader<R: Read + Seek>(
    point_format: u8,
    chunk_size: u32,
    point_count: u64,
    src: R,
) -> crate::Result<Reader<R>> {
    open_reader_with_extra_bytes(point_format, 0, chunk_size, point_count, src)
}

pub fn open_reader_with_extra_bytes<R: Read + Seek>(
    point_format: u8,
    num_extra_bytes: u16,
    chunk_size: u32,
    point_count: u64,
    src: R,
) -> crate::Result<Reader<R>> {
    let format = PointFormat::new(point_format)?;
    Reader::from_vlr(
        format,
        stream_vlr(format, num_extra_bytes, chunk_size),
        point_count,
        src,
    )
}

pub struct Reader<R> {
    src: R,
    format: PointFormat,
    vlr: LazVlr,
    /// position of the chunk table offset
    start: u64,
    chunk_table: ChunkTable,
    chunk_offsets: Vec<u64>,
    decompressor: Box<dyn RecordDecompressor<Cursor<Vec<u8>>> + Send>,
    buffer: Vec<u8>,
    point_count: u64,
    points_read: u64,
    next_chunk: usize,
    current_chunk: usize,
    chunk_points: u64,
    chunk_points_read: u64,
}

impl<R: Read + Seek> Reader<R> {
    /// Creates a reader decompressing with the items of the vlr.
    ///
    /// `point_count` must be the number of points in the data,
    /// the last chunk of fixed size chunks is sized from it.
    pub fn from_vlr(
        format: PointFormat,
        vlr: LazVlr,
        point_count: u64,
        mut src: R,
    ) -> crate::Result<Self> {
        if vlr.compressor_type() != CompressorType::PointWiseChunked
            && vlr.compressor_type() != CompressorType::LayeredChunked
        {
            return Err(LasZipError::UnsupportedCompressorType(
                vlr.compressor_type(),
            ));
        }
        let point_size = vlr.items_size() as usize;
        if point_size < format.record_size() {
            return Err(LasZipError::BufferLenNotMultipleOfPointSize {
                buffer_len: format.record_size(),
                point_size,
            });
        }
        let start = src.seek(SeekFrom::Current(0))?;
        let mut chunk_table = ChunkTable::read_from(&mut src, &vlr)?;
        if !vlr.uses_variably_sized_chunks() {
            chunk_table.set_total_point_count(point_count);
        }
        let chunk_offsets = chunk_table.chunk_offsets(std::mem::size_of::<i64>() as u64);
        let decompressor = record_decompressor_from_vlr(&vlr, Cursor::new(Vec::new()))?;

        Ok(Self {
            src,
            format,
            vlr,
            start,
            chunk_table,
            chunk_offsets,
            decompressor,
            buffer: vec![0u8; point_size],
            point_count,
            points_read: 0,
            next_chunk: 0,
            current_chunk: 0,
            chunk_points: 0,
            chunk_points_read: 0,
        })
    }

    /// Decompresses the next point, `None` once all points were read.
    pub fn read_point(&mut self) -> crate::Result<Option<Point>> {
        if self.points_read >= self.point_count {
            return Ok(None);
        }
        if self.chunk_points_read == self.chunk_points {
            self.load_chunk(self.next_chunk)?;
        }

        let index = self.current_chunk;
        self.decompressor
            .decompress_next(&mut self.buffer)
            .map_err(|e| e.in_chunk(index))?;
        self.chunk_points_read += 1;
        self.points_read += 1;

        if self.chunk_points_read == 1 {
            if let Some(count) = self.decompressor.record_count() {
                if u64::from(count) != self.chunk_points {
                    return Err(LasZipError::ChunkCorrupt(index));
                }
            }
        }
        if self.chunk_points_read == self.chunk_points {
            let chunk_bytes = self.decompressor.get();
            if chunk_bytes.position() != chunk_bytes.get_ref().len() as u64 {
                return Err(LasZipError::ChunkCorrupt(index));
            }
        }
        Ok(Some(Point::unpack_from(self.format, &self.buffer)))
    }

    /// Moves to the first point of the chunk, only that chunk's bytes are read.
    pub fn seek_chunk(&mut self, index: usize) -> crate::Result<()> {
        if index >= self.chunk_table.len() {
            return Err(LasZipError::ChunkIndexOutOfBounds {
                index,
                count: self.chunk_table.len(),
            });
        }
        self.points_read = self.chunk_table[..index]
            .iter()
            .map(|entry| entry.point_count)
            .sum();
        self.next_chunk = index;
        self.chunk_points = 0;
        self.chunk_points_read = 0;
        Ok(())
    }

    fn load_chunk(&mut self, index: usize) -> crate::Result<()> {
        let entry = *self
            .chunk_table
            .as_ref()
            .get(index)
            .ok_or(LasZipError::TruncatedStream)?;
        self.src
            .seek(SeekFrom::Start(self.start + self.chunk_offsets[index]))?;
        let mut bytes = vec![0u8; entry.byte_count as usize];
        self.src.read_exact(&mut bytes)?;
        debug!(
            chunk = index,
            points = entry.point_count,
            bytes = entry.byte_count,
            "chunk loaded"
        );

        *self.decompressor.get_mut() = Cursor::new(bytes);
        self.decompressor.reset();
        self.current_chunk = index;
        self.next_chunk = index + 1;
        self.chunk_points = entry.point_count;
        self.chunk_points_read = 0;
        Ok(())
    }

    /// Where each chunk starts, relative to the start of the point data.
    pub fn chunk_offsets(&self) -> &[u64] {
        &self.chunk_offsets
    }

    pub fn chunk_table(&self) -> &ChunkTable {
        &self.chunk_table
    }

    pub fn point_format(&self) -> PointFormat {
        self.format
    }

    pub fn vlr(&self) -> &LazVlr {
        &self.vlr
    }

    pub fn into_inner(self) -> R {
        self.src
    }
}

impl<R: Read + Seek> Iterator for Reader<R> {
    type Item = crate::Result<Point>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read_point().transpose()
    }
}
