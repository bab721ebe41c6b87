mod common;

use std::io::Cursor;

use common::{generate_points, pack_points};
use laz_codec::las::laszip::{ChunkTable, ChunkTableEntry};
use laz_codec::las::stream::CompressedPoints;
use laz_codec::record::{RecordDecompressor, SequentialPointRecordDecompressor};
use laz_codec::{
    compress_buffer, decompress_buffer, open_reader, open_writer, LasZipCompressor,
    LasZipDecompressor, LasZipError, LazVlr, LazVlrBuilder, Point, PointFormat,
};

fn write_points(format_id: u8, chunk_size: u32, points: &[Point]) -> CompressedPoints {
    let mut writer = open_writer(format_id, chunk_size).unwrap();
    for point in points {
        writer.write_point(point).unwrap();
    }
    writer.close().unwrap()
}

/// The bytes of each chunk along with their entries.
fn split_chunks(
    format_id: u8,
    chunk_size: u32,
    compressed: &CompressedPoints,
) -> Vec<(ChunkTableEntry, Vec<u8>)> {
    let reader = open_reader(
        format_id,
        chunk_size,
        compressed.point_count,
        Cursor::new(compressed.data.clone()),
    )
    .unwrap();
    reader
        .chunk_table()
        .as_ref()
        .iter()
        .zip(reader.chunk_offsets())
        .map(|(entry, offset)| {
            let start = *offset as usize;
            let end = start + entry.byte_count as usize;
            (*entry, compressed.data[start..end].to_vec())
        })
        .collect()
}

/// Lays out the chunks again, with their chunk table.
fn assemble(vlr: &LazVlr, chunks: &[(ChunkTableEntry, Vec<u8>)]) -> Vec<u8> {
    let mut chunk_table = ChunkTable::default();
    let mut body = vec![];
    for (entry, bytes) in chunks {
        chunk_table.push(ChunkTableEntry {
            point_count: entry.point_count,
            byte_count: bytes.len() as u64,
        });
        body.extend_from_slice(bytes);
    }
    let mut data = vec![];
    data.extend_from_slice(&(8 + body.len() as i64).to_le_bytes());
    data.extend_from_slice(&body);
    chunk_table.write_to(&mut data, vlr).unwrap();
    data
}

#[test]
fn test_seek_to_third_chunk_of_three() {
    let format = PointFormat::new(1).unwrap();
    let points = generate_points(format, 150_000, 0, 1);
    let compressed = write_points(1, 50_000, &points);
    assert_eq!(compressed.chunk_offsets.len(), 3);
    assert_eq!(compressed.chunk_offsets[0], 8);

    let mut reader = open_reader(1, 50_000, 150_000, Cursor::new(compressed.data)).unwrap();
    let counts = reader
        .chunk_table()
        .as_ref()
        .iter()
        .map(|entry| entry.point_count)
        .collect::<Vec<_>>();
    assert_eq!(counts, vec![50_000, 50_000, 50_000]);

    reader.seek_chunk(2).unwrap();
    for expected in &points[100_000..] {
        assert_eq!(&reader.read_point().unwrap().unwrap(), expected);
    }
    assert!(reader.read_point().unwrap().is_none());

    reader.seek_chunk(1).unwrap();
    assert_eq!(reader.read_point().unwrap().unwrap(), points[50_000]);
}

#[test]
fn test_corrupted_chunk_does_not_affect_others() {
    let format = PointFormat::new(3).unwrap();
    let points = generate_points(format, 3_000, 0, 2);
    let mut compressed = write_points(3, 1_000, &points);

    let start = compressed.chunk_offsets[0] as usize + 10;
    for byte in &mut compressed.data[start..start + 64] {
        *byte = 0xAB;
    }

    let mut reader = open_reader(3, 1_000, 3_000, Cursor::new(compressed.data)).unwrap();
    reader.seek_chunk(2).unwrap();
    let read = reader.collect::<laz_codec::Result<Vec<Point>>>().unwrap();
    assert_eq!(read.as_slice(), &points[2_000..]);
}

#[test]
fn test_chunk_decodes_from_its_bytes_alone() {
    let format = PointFormat::new(1).unwrap();
    let points = generate_points(format, 2_500, 0, 3);
    let compressed = write_points(1, 1_000, &points);
    let chunks = split_chunks(1, 1_000, &compressed);
    assert_eq!(chunks.len(), 3);

    let (entry, bytes) = &chunks[1];
    let mut decompressor = SequentialPointRecordDecompressor::new(Cursor::new(bytes.clone()));
    decompressor.set_fields_from(compressed.vlr.items()).unwrap();

    let expected = pack_points(format, &points[1_000..2_000]);
    let mut decompressed = vec![0u8; format.record_size()];
    for expected_point in expected.chunks_exact(format.record_size()).take(entry.point_count as usize) {
        decompressor.decompress_next(&mut decompressed).unwrap();
        assert_eq!(decompressed, expected_point);
    }
}

#[test]
fn test_truncated_chunk() {
    let format = PointFormat::new(1).unwrap();
    let points = generate_points(format, 2_500, 0, 4);
    let compressed = write_points(1, 1_000, &points);
    let mut chunks = split_chunks(1, 1_000, &compressed);
    if let Some((_, last)) = chunks.last_mut() {
        last.pop();
    }
    let data = assemble(&compressed.vlr, &chunks);

    let reader = open_reader(1, 1_000, 2_500, Cursor::new(data)).unwrap();
    let result = reader.collect::<laz_codec::Result<Vec<Point>>>();
    assert!(matches!(result, Err(LasZipError::TruncatedStream)));
}

#[test]
fn test_chunk_with_leftover_bytes_is_corrupt() {
    let format = PointFormat::new(1).unwrap();
    let points = generate_points(format, 2_500, 0, 5);
    let compressed = write_points(1, 1_000, &points);
    let mut chunks = split_chunks(1, 1_000, &compressed);
    chunks[1].1.extend_from_slice(&[0, 0, 0, 0]);
    let data = assemble(&compressed.vlr, &chunks);

    let mut reader = open_reader(1, 1_000, 2_500, Cursor::new(data)).unwrap();
    for expected in &points[..1_999] {
        assert_eq!(&reader.read_point().unwrap().unwrap(), expected);
    }
    assert!(matches!(reader.read_point(), Err(LasZipError::ChunkCorrupt(1))));

    // the chunk after is still fine
    reader.seek_chunk(2).unwrap();
    assert_eq!(reader.read_point().unwrap().unwrap(), points[2_000]);
}

#[test]
fn test_layered_chunk_with_wrong_point_count_is_corrupt() {
    let format = PointFormat::new(6).unwrap();
    let points = generate_points(format, 2_500, 0, 6);
    let compressed = write_points(6, 1_000, &points);
    let mut chunks = split_chunks(6, 1_000, &compressed);
    // fixed size tables do not store point counts, use a variable one
    // that claims one point less than the chunk holds
    chunks[0].0.point_count = 999;
    let variable_vlr = LazVlrBuilder::new()
        .with_laz_items(compressed.vlr.items().clone())
        .with_variable_chunk_size()
        .build();
    let data = assemble(&variable_vlr, &chunks);

    let mut reader =
        laz_codec::Reader::from_vlr(format, variable_vlr, 2_499, Cursor::new(data)).unwrap();
    assert!(matches!(reader.read_point(), Err(LasZipError::ChunkCorrupt(0))));
}

#[test]
fn test_decompressor_seek() {
    for format_id in [3u8, 7].iter().copied() {
        let format = PointFormat::new(format_id).unwrap();
        let points = generate_points(format, 1_050, 0, 7);
        let raw_points = pack_points(format, &points);
        let point_size = format.record_size();
        let vlr = LazVlrBuilder::new()
            .with_laz_items(format.laz_items(0))
            .with_chunk_size(100)
            .build();

        let mut compressed = Cursor::new(Vec::<u8>::new());
        compress_buffer(&mut compressed, &raw_points, vlr.clone()).unwrap();
        compressed.set_position(0);

        let mut decompressor = LasZipDecompressor::new(compressed, vlr).unwrap();
        let mut point = vec![0u8; point_size];
        for index in [537usize, 12, 1_049, 100, 0].iter().copied() {
            decompressor.seek(index as u64).unwrap();
            decompressor.decompress_one(&mut point).unwrap();
            assert_eq!(
                point.as_slice(),
                &raw_points[index * point_size..(index + 1) * point_size],
                "format {} point {}",
                format_id,
                index
            );
        }
    }
}

#[test]
fn test_variable_size_chunks() {
    let format = PointFormat::new(7).unwrap();
    let points = generate_points(format, 1_000, 0, 8);
    let raw_points = pack_points(format, &points);
    let point_size = format.record_size();
    let vlr = LazVlrBuilder::new()
        .with_laz_items(format.laz_items(0))
        .with_variable_chunk_size()
        .build();

    let sizes = [10usize, 490, 1, 299, 200];
    let mut compressor = LasZipCompressor::new(Cursor::new(Vec::<u8>::new()), vlr.clone()).unwrap();
    let mut start = 0;
    for size in sizes.iter() {
        let end = start + size * point_size;
        compressor.compress_chunk(&raw_points[start..end]).unwrap();
        start = end;
    }
    compressor.done().unwrap();
    let counts = compressor
        .chunk_table()
        .as_ref()
        .iter()
        .map(|entry| entry.point_count as usize)
        .collect::<Vec<_>>();
    assert_eq!(counts, sizes);
    let compressed = compressor.into_inner().into_inner();

    let mut decompressed = vec![0u8; raw_points.len()];
    decompress_buffer(&compressed, &mut decompressed, vlr.clone()).unwrap();
    assert_eq!(decompressed, raw_points);

    let mut decompressor = LasZipDecompressor::new(Cursor::new(compressed), vlr).unwrap();
    let mut point = vec![0u8; point_size];
    decompressor.seek(501).unwrap();
    decompressor.decompress_one(&mut point).unwrap();
    assert_eq!(point.as_slice(), &raw_points[501 * point_size..502 * point_size]);
}

fn compress_without_offset(format: PointFormat, raw_points: &[u8], vlr: &LazVlr) -> Vec<u8> {
    let mut compressed = Cursor::new(Vec::<u8>::new());
    compress_buffer(&mut compressed, raw_points, vlr.clone()).unwrap();
    let mut compressed = compressed.into_inner();
    assert!(compressed.len() > format.record_size());
    // as if the writer could not come back to write the offset
    compressed[..8].copy_from_slice(&(-1i64).to_le_bytes());
    compressed
}

#[test]
fn test_chunk_table_offset_at_the_end() {
    let format = PointFormat::new(1).unwrap();
    let raw_points = pack_points(format, &generate_points(format, 500, 0, 9));
    let vlr = LazVlrBuilder::new()
        .with_laz_items(format.laz_items(0))
        .with_chunk_size(200)
        .build();

    let mut original = Cursor::new(Vec::<u8>::new());
    compress_buffer(&mut original, &raw_points, vlr.clone()).unwrap();
    let offset = original.into_inner()[..8].to_vec();
    let mut compressed = compress_without_offset(format, &raw_points, &vlr);
    compressed.extend_from_slice(&offset);

    let mut decompressor = LasZipDecompressor::new(Cursor::new(compressed), vlr).unwrap();
    let point_size = format.record_size();
    let mut point = vec![0u8; point_size];
    decompressor.seek(450).unwrap();
    decompressor.decompress_one(&mut point).unwrap();
    assert_eq!(point.as_slice(), &raw_points[450 * point_size..451 * point_size]);
}

#[test]
fn test_missing_chunk_table_still_decompresses() {
    let format = PointFormat::new(1).unwrap();
    let raw_points = pack_points(format, &generate_points(format, 500, 0, 10));
    let vlr = LazVlrBuilder::new()
        .with_laz_items(format.laz_items(0))
        .with_chunk_size(200)
        .build();

    let mut compressed = compress_without_offset(format, &raw_points, &vlr);
    compressed.extend_from_slice(&(-1i64).to_le_bytes());

    let mut decompressor = LasZipDecompressor::new(Cursor::new(compressed), vlr).unwrap();
    let mut decompressed = vec![0u8; raw_points.len()];
    decompressor.decompress_many(&mut decompressed).unwrap();
    assert_eq!(decompressed, raw_points);
    assert!(matches!(decompressor.seek(10), Err(LasZipError::MissingChunkTable)));
}
