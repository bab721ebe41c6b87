use super::chunk_table::{update_chunk_table_offset, ChunkTable, ChunkTableEntry};
use super::{details, CompressorType, LazVlr};
use crate::record::RecordCompressor;
use crate::{LasZipError, LazItem};
use byteorder::{LittleEndian, WriteBytesExt};
use std::io::{Seek, SeekFrom, Write};
use tracing::debug;

/// Struct that handles the compression of the points into the given destination
pub struct LasZipCompressor<'a, W: Write + Send + 'a> {
    vlr: LazVlr,
    /// compressor used for the current chunk
    record_compressor: Box<dyn RecordCompressor<W> + Send + 'a>,
    /// How many points in the current chunk
    chunk_point_written: u32,
    /// Entries of the chunks written so far
    chunk_table: ChunkTable,
    /// Position (offset from beginning)
    /// where the current chunk started
    chunk_start_pos: u64,
    /// Position where LasZipCompressor started
    start_pos: u64,
    started: bool,
}

impl<'a, W: Write + Seek + Send + 'a> LasZipCompressor<'a, W> {
    /// Creates a compressor using the provided vlr.
    pub fn new(output: W, vlr: LazVlr) -> crate::Result<Self> {
        let record_compressor = details::record_compressor_from_vlr(&vlr, output)?;
        Ok(Self {
            vlr,
            record_compressor,
            chunk_point_written: 0,
            chunk_table: ChunkTable::default(),
            chunk_start_pos: 0,
            start_pos: 0,
            started: false,
        })
    }

    /// Creates a new LasZipCompressor using the items provided,
    ///
    /// If you wish to use a different `chunk size` see [`new`]
    ///
    /// [`new`]: #method.new
    pub fn from_laz_items(output: W, items: Vec<LazItem>) -> crate::Result<Self> {
        let vlr = LazVlr::from_laz_items(items);
        Self::new(output, vlr)
    }

    /// Reserves and prepares the offset to chunk table that will be
    /// updated when [done] is called.
    ///
    /// This method will automatically be called on the first point being compressed,
    /// but for some scenarios, manually calling this might be useful.
    ///
    /// [done]: Self::done
    pub fn reserve_offset_to_chunk_table(&mut self) -> crate::Result<()> {
        let stream = self.record_compressor.get_mut();
        self.start_pos = stream.seek(SeekFrom::Current(0))?;
        self.chunk_start_pos = self.start_pos;
        if self.vlr.compressor != CompressorType::PointWise {
            stream.write_i64::<LittleEndian>(-1)?;
            self.chunk_start_pos += std::mem::size_of::<i64>() as u64;
        }
        self.started = true;
        Ok(())
    }

    /// Compress the point and write the compressed data to the destination given when
    /// the compressor was constructed
    ///
    /// The data is written in the buffer is expected to be exactly
    /// as it would have been in a LAS File, that is:
    ///
    /// - The fields/dimensions are in the same order as in the LAS point record
    /// - The data in the buffer is in Little Endian order
    pub fn compress_one(&mut self, input: &[u8]) -> crate::Result<()> {
        if !self.started {
            self.reserve_offset_to_chunk_table()?;
        }

        if self.vlr.compressor != CompressorType::PointWise
            && self.chunk_point_written == self.vlr.chunk_size()
        {
            self.finish_current_chunk()?;
        }

        self.record_compressor.compress_next(input)?;
        self.chunk_point_written += 1;
        Ok(())
    }

    /// Compress all the points contained in the `input` slice
    pub fn compress_many(&mut self, input: &[u8]) -> crate::Result<()> {
        let point_size = self.vlr.items_size() as usize;
        check_buffer_len(input.len(), point_size)?;
        for point in input.chunks_exact(point_size) {
            self.compress_one(point)?;
        }
        Ok(())
    }

    /// Compress the points as one chunk, meant for variable size chunks.
    ///
    /// The chunk being compressed, if any, is finished first.
    pub fn compress_chunk(&mut self, chunk_points: &[u8]) -> crate::Result<()> {
        self.finish_current_chunk()?;
        self.compress_many(chunk_points)?;
        self.finish_current_chunk()
    }

    /// Closes the chunk being compressed, the next point starts a new one.
    ///
    /// Does nothing if no points were compressed since the last chunk.
    pub fn finish_current_chunk(&mut self) -> crate::Result<()> {
        if self.chunk_point_written == 0 {
            return Ok(());
        }
        self.record_compressor.done()?;
        let current_pos = self
            .record_compressor
            .get_mut()
            .seek(SeekFrom::Current(0))?;
        let entry = ChunkTableEntry {
            point_count: u64::from(self.chunk_point_written),
            byte_count: current_pos - self.chunk_start_pos,
        };
        debug!(
            chunk = self.chunk_table.len(),
            points = entry.point_count,
            bytes = entry.byte_count,
            "chunk compressed"
        );
        self.chunk_table.push(entry);
        self.chunk_start_pos = current_pos;
        self.chunk_point_written = 0;
        self.record_compressor.reset();
        Ok(())
    }

    /// Must be called when you have compressed all your points
    /// using the [`compress_one`] method
    ///
    /// [`compress_one`]: #method.compress_one
    pub fn done(&mut self) -> crate::Result<()> {
        if !self.started {
            self.reserve_offset_to_chunk_table()?;
        }
        self.finish_current_chunk()?;
        if self.vlr.compressor != CompressorType::PointWise {
            let stream = self.record_compressor.get_mut();
            update_chunk_table_offset(stream, SeekFrom::Start(self.start_pos))?;
            self.chunk_table.write_to(stream, &self.vlr)?;
        }
        Ok(())
    }

    /// Returns the vlr used by this compressor
    pub fn vlr(&self) -> &LazVlr {
        &self.vlr
    }

    /// Returns the entries of the chunks finished so far.
    pub fn chunk_table(&self) -> &ChunkTable {
        &self.chunk_table
    }

    pub fn into_inner(self) -> W {
        self.record_compressor.box_into_inner()
    }

    pub fn get_mut(&mut self) -> &mut W {
        self.record_compressor.get_mut()
    }

    pub fn get(&self) -> &W {
        self.record_compressor.get()
    }
}

pub(super) fn check_buffer_len(buffer_len: usize, point_size: usize) -> crate::Result<()> {
    if point_size == 0 || buffer_len % point_size != 0 {
        Err(LasZipError::BufferLenNotMultipleOfPointSize {
            buffer_len,
            point_size,
        })
    } else {
        Ok(())
    }
}

/// Compresses all points
///
/// The data written will be a standard LAZ file data
/// that means its organized like this:
///  1) offset to the chunk_table (i64)
///  2) the points data compressed
///  3) the chunk table
///
/// `dst`: Where the compressed data will be written
///
/// `uncompressed_points`: byte slice of the uncompressed points to be compressed
pub fn compress_buffer<W: Write + Seek + Send>(
    dst: &mut W,
    uncompressed_points: &[u8],
    laz_vlr: LazVlr,
) -> crate::Result<()> {
    let mut compressor = LasZipCompressor::new(dst, laz_vlr)?;
    compressor.compress_many(uncompressed_points)?;
    compressor.done()?;
    Ok(())
}
