//! Module with all the things related to LAZ chunk tables
use crate::compressors::IntegerCompressorBuilder;
use crate::decoders::ArithmeticDecoder;
use crate::decompressors::IntegerDecompressorBuilder;
use crate::encoders::ArithmeticEncoder;
use crate::{LasZipError, LazVlr};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Index;
use std::slice::SliceIndex;
use tracing::{trace, warn};

/// An entry describe one chunk and contains 2 information:
///
/// - The number of bytes in the compressed chunk
/// - The number of points in the compressed chunk
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ChunkTableEntry {
    pub point_count: u64,
    pub byte_count: u64,
}

/// The ChunkTable contains chunk entries for a LAZ file.
///
/// The ChunkTable has two ways of being stored in a LAZ file
/// depending on if the chunks are fixed-size variable-sized
///
/// fixed-size chunks -> Only the number of bytes of the chunk is stored
/// variable-size chunks -> Both the number of points and the number of bytes are stored
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ChunkTable(Vec<ChunkTableEntry>);

impl ChunkTable {
    /// Reads the chunk table from the source
    ///
    /// The source position **must** be at the start of the point data
    ///
    /// This functions set position of the `src` where the points actually starts
    /// (that is, after the chunk table offset).
    ///
    /// # Important
    ///
    /// When the chunks are `fixed-size`, each entry will have the same number of points,
    /// the `chunk_size` registered in the `vlr`.
    /// This means that for the **last** chunk, the [ChunkTableEntry]'s `point_count`
    /// may be too big, see [ChunkTable::set_total_point_count].
    pub fn read_from<R: Read + Seek>(mut src: R, vlr: &LazVlr) -> crate::Result<Self> {
        let (data_start, chunk_table_start) =
            Self::read_offset(&mut src)?.ok_or(LasZipError::MissingChunkTable)?;
        src.seek(SeekFrom::Start(chunk_table_start))?;
        let variable = vlr.uses_variably_sized_chunks();
        let mut chunk_table = Self::read(&mut src, variable)?;
        src.seek(SeekFrom::Start(data_start + 8))?;

        if !variable {
            let point_count = u64::from(vlr.chunk_size());
            for entry in &mut chunk_table.0 {
                entry.point_count = point_count;
            }
        }
        Ok(chunk_table)
    }

    /// Reads the offset to the chunk table.
    ///
    /// `src` should be at the start of LAZ data.
    ///
    /// Returns the start of the data and the position of the chunk table.
    fn read_offset<R: Read + Seek>(src: &mut R) -> crate::Result<Option<(u64, u64)>> {
        let current_pos = src.seek(SeekFrom::Current(0))?;

        let mut offset_to_chunk_table = src.read_i64::<LittleEndian>()?;
        if offset_to_chunk_table <= current_pos as i64 {
            // The writer could not update the offset
            // so we have to find it at the end of the data
            warn!(
                offset = offset_to_chunk_table,
                "chunk table offset not set, looking for it at the end of the data"
            );
            src.seek(SeekFrom::End(-8))?;
            offset_to_chunk_table = src.read_i64::<LittleEndian>()?;

            if offset_to_chunk_table <= current_pos as i64 {
                return Ok(None);
            }
        }

        Ok(Some((current_pos, offset_to_chunk_table as u64)))
    }

    /// Actual implementation of the reading of the chunk table.
    fn read<R: Read>(src: &mut R, contains_point_count: bool) -> crate::Result<Self> {
        let _version = src.read_u32::<LittleEndian>()?;
        let number_of_chunks = src.read_u32::<LittleEndian>()?;
        trace!(number_of_chunks, contains_point_count, "reading chunk table");

        let mut decoder = ArithmeticDecoder::new(src);
        let mut decompressor = IntegerDecompressorBuilder::new()
            .bits(32)
            .contexts(2)
            .build_in(decoder.models_mut())?;
        decoder.read_init_bytes()?;

        let mut chunk_table = ChunkTable::with_capacity(number_of_chunks as usize);
        let mut last_entry = ChunkTableEntry::default();
        for _ in 0..number_of_chunks {
            let mut current_entry = ChunkTableEntry::default();
            if contains_point_count {
                current_entry.point_count = u64::from(decompressor.decompress(
                    &mut decoder,
                    last_entry.point_count as i32,
                    0,
                )? as u32);
            }
            current_entry.byte_count = u64::from(decompressor.decompress(
                &mut decoder,
                last_entry.byte_count as i32,
                1,
            )? as u32);

            chunk_table.0.push(current_entry);
            last_entry = current_entry;
        }
        Ok(chunk_table)
    }

    /// Encodes and writes the chunk table.
    ///
    /// Point counts are only written for variable-size chunks.
    pub fn write_to<W: Write>(&self, dst: &mut W, vlr: &LazVlr) -> crate::Result<()> {
        let with_point_count = vlr.uses_variably_sized_chunks();
        trace!(
            number_of_chunks = self.len(),
            with_point_count,
            "writing chunk table"
        );
        dst.write_u32::<LittleEndian>(0)?;
        dst.write_u32::<LittleEndian>(self.len() as u32)?;

        let mut encoder = ArithmeticEncoder::new(dst);
        let mut compressor = IntegerCompressorBuilder::new()
            .bits(32)
            .contexts(2)
            .build_in(encoder.models_mut())?;

        let mut last_entry = ChunkTableEntry::default();
        for entry in &self.0 {
            if with_point_count {
                compressor.compress(
                    &mut encoder,
                    last_entry.point_count as i32,
                    entry.point_count as i32,
                    0,
                )?;
            }
            compressor.compress(
                &mut encoder,
                last_entry.byte_count as i32,
                entry.byte_count as i32,
                1,
            )?;
            last_entry = *entry;
        }
        encoder.done()?;
        Ok(())
    }

    /// Corrects the point count of the last chunk of a fixed-size chunk table.
    pub fn set_total_point_count(&mut self, total: u64) {
        let before_last: u64 = self
            .0
            .iter()
            .rev()
            .skip(1)
            .map(|entry| entry.point_count)
            .sum();
        if let Some(last) = self.0.last_mut() {
            last.point_count = total.saturating_sub(before_last).min(last.point_count);
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self(Vec::with_capacity(capacity))
    }

    pub fn push(&mut self, entry: ChunkTableEntry) {
        self.0.push(entry);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Byte offset of each chunk relative to `data_start`.
    pub fn chunk_offsets(&self, data_start: u64) -> Vec<u64> {
        self.0
            .iter()
            .scan(data_start, |offset, entry| {
                let start = *offset;
                *offset += entry.byte_count;
                Some(start)
            })
            .collect()
    }
}

impl AsRef<[ChunkTableEntry]> for ChunkTable {
    fn as_ref(&self) -> &[ChunkTableEntry] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ChunkTable {
    type Item = <std::slice::Iter<'a, ChunkTableEntry> as Iterator>::Item;
    type IntoIter = std::slice::Iter<'a, ChunkTableEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<I> Index<I> for ChunkTable
where
    I: SliceIndex<[ChunkTableEntry]>,
{
    type Output = <I as SliceIndex<[ChunkTableEntry]>>::Output;

    fn index(&self, index: I) -> &Self::Output {
        &self.0[index]
    }
}

/// Updates the 'chunk table offset'
///
/// It is the first 8 byte (i64) of a Laszip compressed data
///
/// This function expects the position of the destination to be at the start of the chunk_table
/// (whether it is written or not).
///
/// This function also expects the i64 to have been already written/reserved
/// (even if its garbage bytes / 0s)
///
/// The position of the destination is untouched
pub(crate) fn update_chunk_table_offset<W: Write + Seek>(
    dst: &mut W,
    offset_pos: SeekFrom,
) -> std::io::Result<()> {
    let start_of_chunk_table_pos = dst.seek(SeekFrom::Current(0))?;
    dst.seek(offset_pos)?;
    dst.write_i64::<LittleEndian>(start_of_chunk_table_pos as i64)?;
    dst.seek(SeekFrom::Start(start_of_chunk_table_pos))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::las::laszip::LazVlrBuilder;
    use std::io::Cursor;

    fn table(entries: &[(u64, u64)]) -> ChunkTable {
        let mut table = ChunkTable::default();
        for &(point_count, byte_count) in entries {
            table.push(ChunkTableEntry {
                point_count,
                byte_count,
            });
        }
        table
    }

    fn write_with_offset(table: &ChunkTable, vlr: &LazVlr, data_len: usize) -> Vec<u8> {
        let mut dst = Cursor::new(vec![]);
        dst.write_i64::<LittleEndian>(-1).unwrap();
        dst.write_all(&vec![0xAB; data_len]).unwrap();
        update_chunk_table_offset(&mut dst, SeekFrom::Start(0)).unwrap();
        table.write_to(&mut dst, vlr).unwrap();
        dst.into_inner()
    }

    #[test]
    fn test_variable_size_round_trip() {
        let vlr = LazVlrBuilder::new().with_variable_chunk_size().build();
        let expected = table(&[(10, 300), (25, 512), (3, 40)]);
        let data = write_with_offset(&expected, &vlr, 852);

        let mut src = Cursor::new(data);
        let read = ChunkTable::read_from(&mut src, &vlr).unwrap();
        assert_eq!(read, expected);
        assert_eq!(src.position(), 8);
        assert_eq!(read.chunk_offsets(8), vec![8, 308, 820]);
    }

    #[test]
    fn test_fixed_size_uses_chunk_size() {
        let vlr = LazVlrBuilder::new().with_chunk_size(100).build();
        let data = write_with_offset(&table(&[(100, 20), (42, 12)]), &vlr, 32);

        let mut read = ChunkTable::read_from(Cursor::new(data), &vlr).unwrap();
        assert_eq!(read[1].point_count, 100);
        assert_eq!(read[1].byte_count, 12);
        read.set_total_point_count(142);
        assert_eq!(read[1].point_count, 42);
        assert_eq!(read[0].point_count, 100);
    }

    #[test]
    fn test_offset_recovered_from_the_end() {
        let vlr = LazVlrBuilder::new().with_chunk_size(100).build();
        let mut data = write_with_offset(&table(&[(100, 16)]), &vlr, 16);
        let offset = data[..8].to_vec();
        data[..8].copy_from_slice(&(-1i64).to_le_bytes());
        data.extend_from_slice(&offset);

        let read = ChunkTable::read_from(Cursor::new(data), &vlr).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].byte_count, 16);
    }

    #[test]
    fn test_missing_table() {
        let vlr = LazVlrBuilder::new().build();
        let mut data = (-1i64).to_le_bytes().to_vec();
        data.extend_from_slice(&[0u8; 8]);
        assert!(matches!(
            ChunkTable::read_from(Cursor::new(data), &vlr),
            Err(LasZipError::MissingChunkTable)
        ));
    }
}
