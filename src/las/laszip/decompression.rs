use super::chunk_table::ChunkTable;
use super::compression::check_buffer_len;
use super::{details, CompressorType, LazVlr};
use crate::errors::LasZipError::MissingChunkTable;
use crate::record::RecordDecompressor;
use crate::LasZipError;
use std::io::{Read, Seek, SeekFrom};
use tracing::{debug, warn};

pub struct LasZipDecompressor<'a, R: Read + Seek + 'a> {
    vlr: LazVlr,
    record_decompressor: Box<dyn RecordDecompressor<R> + Send + 'a>,
    data_start: u64,
    chunk_table: Option<ChunkTable>,
    current_chunk: usize,
    chunk_points_read: u64,
    num_points_in_chunk: u64,
}

impl<'a, R: Read + Seek + Send + 'a> LasZipDecompressor<'a, R> {
    /// Creates a new instance from a data source of compressed points
    /// and the LazVlr describing the compressed data
    ///
    /// A chunk table that cannot be read only disables [`seek`](Self::seek).
    pub fn new(mut source: R, vlr: LazVlr) -> crate::Result<Self> {
        let chunk_table = match vlr.compressor {
            CompressorType::None => {
                return Err(LasZipError::UnsupportedCompressorType(vlr.compressor));
            }
            CompressorType::PointWise => None,
            CompressorType::PointWiseChunked | CompressorType::LayeredChunked => {
                let start = source.seek(SeekFrom::Current(0))?;
                match ChunkTable::read_from(&mut source, &vlr) {
                    Ok(chunk_table) => Some(chunk_table),
                    Err(error) => {
                        warn!(%error, "chunk table could not be read");
                        source.seek(SeekFrom::Start(start + 8))?;
                        None
                    }
                }
            }
        };
        let data_start = source.seek(SeekFrom::Current(0))?;

        let record_decompressor = details::record_decompressor_from_vlr(&vlr, source)?;

        Ok(Self {
            vlr,
            record_decompressor,
            data_start,
            chunk_table,
            current_chunk: 0,
            chunk_points_read: 0,
            num_points_in_chunk: u64::MAX,
        })
    }

    /// Creates a new instance from a data source of compressed points
    /// and the `record data` of the laszip vlr
    pub fn new_with_record_data(source: R, laszip_vlr_record_data: &[u8]) -> crate::Result<Self> {
        let vlr = LazVlr::from_buffer(laszip_vlr_record_data)?;
        Self::new(source, vlr)
    }

    /// Decompress the next point and write the uncompressed data to the out buffer.
    ///
    /// - The buffer should have at least enough byte to store the decompressed data
    /// - The data is written in the buffer exactly as it would have been in a LAS File
    ///     in Little Endian order,
    pub fn decompress_one(&mut self, out: &mut [u8]) -> crate::Result<()> {
        if self.chunk_points_read == self.num_points_in_chunk {
            self.reset_for_new_chunk();
            self.current_chunk += 1;
        }

        let current_chunk = self.current_chunk;
        self.record_decompressor
            .decompress_next(out)
            .map_err(|e| e.in_chunk(current_chunk))?;
        self.chunk_points_read += 1;

        if self.chunk_points_read == 1 {
            self.num_points_in_chunk = self.points_in_current_chunk();
            debug!(
                chunk = self.current_chunk,
                points = self.num_points_in_chunk,
                "chunk opened"
            );
        }
        Ok(())
    }

    fn points_in_current_chunk(&self) -> u64 {
        let from_table = self
            .chunk_table
            .as_ref()
            .filter(|table| self.current_chunk < table.len())
            .map(|table| table[self.current_chunk].point_count);
        match (from_table, self.vlr.compressor) {
            (_, CompressorType::PointWise) => u64::MAX,
            (Some(count), _) => count,
            (None, CompressorType::LayeredChunked) => self
                .record_decompressor
                .record_count()
                .map_or(u64::from(self.vlr.chunk_size()), u64::from),
            (None, _) => u64::from(self.vlr.chunk_size()),
        }
    }

    /// Decompress as many points as the `out` slice can hold
    ///
    /// # Note
    ///
    /// If the `out` slice contains more space than there are points
    /// the function will still decompress and thus and error will occur
    pub fn decompress_many(&mut self, out: &mut [u8]) -> crate::Result<()> {
        let point_size = self.vlr.items_size() as usize;
        check_buffer_len(out.len(), point_size)?;
        for point in out.chunks_exact_mut(point_size) {
            self.decompress_one(point)?;
        }
        Ok(())
    }

    pub fn vlr(&self) -> &LazVlr {
        &self.vlr
    }

    /// Seeks to the point designed by the index
    ///
    /// # Important
    ///
    /// Seeking in compressed data has a higher cost than non compressed data
    /// because the stream has to be moved to the start of the chunk
    /// and then we have to decompress points in the chunk until we reach the
    /// one we want.
    pub fn seek(&mut self, point_idx: u64) -> crate::Result<()> {
        let chunk_table = self.chunk_table.as_ref().ok_or(MissingChunkTable)?;
        let end_of_data = self.data_start + chunk_table.into_iter().map(|e| e.byte_count).sum::<u64>();

        let mut start_of_chunk = self.data_start;
        let mut first_point_of_chunk = 0u64;
        let mut location = None;
        for (index, entry) in chunk_table.into_iter().enumerate() {
            if point_idx < first_point_of_chunk + entry.point_count {
                location = Some((index, start_of_chunk, point_idx - first_point_of_chunk));
                break;
            }
            first_point_of_chunk += entry.point_count;
            start_of_chunk += entry.byte_count;
        }

        let (chunk_of_point, start_of_chunk, delta) = match location {
            Some(location) => location,
            None => {
                // Out of bounds, the next decompression will fail
                self.record_decompressor.get_mut().seek(SeekFrom::End(0))?;
                return Ok(());
            }
        };

        self.record_decompressor
            .get_mut()
            .seek(SeekFrom::Start(start_of_chunk))?;
        self.reset_for_new_chunk();
        self.current_chunk = chunk_of_point;

        let mut tmp_out = vec![0u8; self.record_decompressor.record_size()];
        for _ in 0..delta {
            self.decompress_one(&mut tmp_out)?;
            // fixed-size tables give the last chunk a full point count
            // so the requested point may not exist
            let out_of_bounds = match self.record_decompressor.record_count() {
                Some(count) => delta >= u64::from(count),
                None => {
                    self.record_decompressor
                        .get_mut()
                        .seek(SeekFrom::Current(0))?
                        > end_of_data
                }
            };
            if out_of_bounds {
                self.record_decompressor.get_mut().seek(SeekFrom::End(0))?;
                return Ok(());
            }
        }
        Ok(())
    }

    #[inline(always)]
    fn reset_for_new_chunk(&mut self) {
        self.chunk_points_read = 0;
        self.num_points_in_chunk = u64::MAX;
        self.record_decompressor.reset();
    }

    pub fn into_inner(self) -> R {
        self.record_decompressor.box_into_inner()
    }

    pub fn get_mut(&mut self) -> &mut R {
        self.record_decompressor.get_mut()
    }

    pub fn get(&self) -> &R {
        self.record_decompressor.get()
    }
}

/// Decompresses all points from the buffer
///
/// The `compressed_points_data` slice must contain all the laszip data
/// that means:
///   1) The offset to the chunk table (i64)
///   2) the compressed points
///   3) the chunk table (optional)
///
///
/// This fn will decompress as many points as the `decompress_points` can hold.
///
/// # Important
///
/// In a LAZ file, the chunk table offset is counted from the start of the
/// LAZ file. Here since we only have the buffer points data, you must make
/// sure the offset is counted since the start of point data.
pub fn decompress_buffer(
    compressed_points_data: &[u8],
    decompressed_points: &mut [u8],
    laz_vlr: LazVlr,
) -> crate::Result<()> {
    let src = std::io::Cursor::new(compressed_points_data);
    let mut decompressor = LasZipDecompressor::new(src, laz_vlr)?;
    decompressor.decompress_many(decompressed_points)
}
