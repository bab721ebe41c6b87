//! Compression and decompression of whole buffers with one
//! rayon task per chunk.
//!
//! Chunks never share state so the output is byte-identical to
//! [`compress_buffer`](super::compress_buffer).

use super::chunk_table::{update_chunk_table_offset, ChunkTable, ChunkTableEntry};
use super::compression::check_buffer_len;
use super::details::{record_compressor_from_vlr, record_decompressor_from_vlr};
use super::{CompressorType, LazVlr};
use crate::LasZipError;
use byteorder::{LittleEndian, WriteBytesExt};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use std::io::{Cursor, Seek, SeekFrom, Write};
use tracing::debug;

/// Compresses all points in parallel.
///
/// Just like [`compress_buffer`](super::compress_buffer)
/// but each chunk is compressed in its own task.
pub fn par_compress_buffer<W: Write + Seek>(
    dst: &mut W,
    uncompressed_points: &[u8],
    laz_vlr: &LazVlr,
) -> crate::Result<()> {
    if laz_vlr.compressor_type() == CompressorType::PointWise {
        return Err(LasZipError::UnsupportedCompressorType(CompressorType::PointWise));
    }
    let start_pos = dst.seek(SeekFrom::Current(0))?;
    // Reserve the bytes for the chunk table offset that will be updated later
    dst.write_i64::<LittleEndian>(-1)?;

    let chunk_table = par_compress(dst, uncompressed_points, laz_vlr)?;

    update_chunk_table_offset(dst, SeekFrom::Start(start_pos))?;
    chunk_table.write_to(dst, laz_vlr)?;
    Ok(())
}

/// Compresses the points contained in `uncompressed_points` writing the result in the `dst`
///
/// Does not write nor update the offset to the chunk table
/// And does not write the chunk table
///
/// Returns the entries of the chunks written. With variable size
/// chunks all the points form one chunk.
pub fn par_compress<W: Write>(
    dst: &mut W,
    uncompressed_points: &[u8],
    laz_vlr: &LazVlr,
) -> crate::Result<ChunkTable> {
    let point_size = laz_vlr.items_size() as usize;
    check_buffer_len(uncompressed_points.len(), point_size)?;

    let points_per_chunk = laz_vlr.chunk_size() as usize;
    let chunk_size_in_bytes = points_per_chunk.saturating_mul(point_size).max(point_size);

    // The last chunk may not have the same size,
    // the chunks() method takes care of that for us
    let all_slices = uncompressed_points
        .chunks(chunk_size_in_bytes)
        .collect::<Vec<_>>();

    let chunks = all_slices
        .into_par_iter()
        .map(|slc| {
            let mut record_compressor =
                record_compressor_from_vlr(laz_vlr, Cursor::new(Vec::<u8>::new()))?;
            for raw_point in slc.chunks_exact(point_size) {
                record_compressor.compress_next(raw_point)?;
            }
            record_compressor.done()?;
            let point_count = (slc.len() / point_size) as u64;
            Ok((point_count, record_compressor.box_into_inner().into_inner()))
        })
        .collect::<crate::Result<Vec<(u64, Vec<u8>)>>>()?;

    let mut chunk_table = ChunkTable::with_capacity(chunks.len());
    for (point_count, chunk) in chunks {
        debug!(
            chunk = chunk_table.len(),
            points = point_count,
            bytes = chunk.len(),
            "chunk compressed"
        );
        chunk_table.push(ChunkTableEntry {
            point_count,
            byte_count: chunk.len() as u64,
        });
        dst.write_all(&chunk)?;
    }
    Ok(chunk_table)
}

/// Decompresses all points from the buffer in parallel.
///
/// Each chunk is sent for decompression in a thread.
///
/// Just like [`decompress_buffer`](super::decompress_buffer) but the decompression
/// is done using multiple threads, the chunk table is mandatory.
pub fn par_decompress_buffer(
    compressed_points_data: &[u8],
    decompressed_points: &mut [u8],
    laz_vlr: &LazVlr,
) -> crate::Result<()> {
    let point_size = laz_vlr.items_size() as usize;
    check_buffer_len(decompressed_points.len(), point_size)?;

    let mut cursor = Cursor::new(compressed_points_data);
    let mut chunk_table = ChunkTable::read_from(&mut cursor, laz_vlr)?;
    chunk_table.set_total_point_count((decompressed_points.len() / point_size) as u64);
    let data_start = cursor.position() as usize;

    let mut compressed_rest = compressed_points_data
        .get(data_start..)
        .ok_or(LasZipError::TruncatedStream)?;
    let mut decompressed_rest = decompressed_points;
    let mut jobs = Vec::<(usize, &[u8], &mut [u8])>::with_capacity(chunk_table.len());
    for (index, entry) in chunk_table.as_ref().iter().enumerate() {
        if decompressed_rest.is_empty() {
            break;
        }
        let byte_count = entry.byte_count as usize;
        if byte_count > compressed_rest.len() {
            return Err(LasZipError::TruncatedStream);
        }
        let (chunk_in, in_rest) = compressed_rest.split_at(byte_count);
        let out_len = (entry.point_count as usize * point_size).min(decompressed_rest.len());
        let (chunk_out, out_rest) = std::mem::take(&mut decompressed_rest).split_at_mut(out_len);
        jobs.push((index, chunk_in, chunk_out));
        compressed_rest = in_rest;
        decompressed_rest = out_rest;
    }
    if !decompressed_rest.is_empty() {
        return Err(LasZipError::TruncatedStream);
    }

    jobs.into_par_iter()
        .map(|(index, chunk_in, chunk_out)| {
            let mut record_decompressor =
                record_decompressor_from_vlr(laz_vlr, Cursor::new(chunk_in))?;
            for raw_point in chunk_out.chunks_exact_mut(point_size) {
                record_decompressor
                    .decompress_next(raw_point)
                    .map_err(|e| e.in_chunk(index))?;
            }
            Ok(())
        })
        .collect::<crate::Result<()>>()
}
