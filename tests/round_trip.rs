mod common;

use std::io::Cursor;

use common::{generate_points, pack_points};
use laz_codec::las::stream::{open_reader_with_extra_bytes, open_writer_with_extra_bytes};
use laz_codec::{
    compress_buffer, decompress_buffer, CompressorType, LasZipCompressor, LasZipDecompressor,
    LazItemRecordBuilder, LazVlr, LazVlrBuilder, Point, PointFormat,
};

const ALL_FORMATS: std::ops::RangeInclusive<u8> = 0..=10;

fn stream_round_trip(format_id: u8, num_extra_bytes: u16, count: usize, chunk_size: u32) {
    let format = PointFormat::new(format_id).unwrap();
    let expected = generate_points(format, count, num_extra_bytes as usize, u64::from(format_id));

    let mut writer = open_writer_with_extra_bytes(format_id, num_extra_bytes, chunk_size).unwrap();
    for point in &expected {
        writer.write_point(point).unwrap();
    }
    let compressed = writer.close().unwrap();
    assert_eq!(compressed.point_count, count as u64);

    let reader = open_reader_with_extra_bytes(
        format_id,
        num_extra_bytes,
        chunk_size,
        count as u64,
        Cursor::new(compressed.data),
    )
    .unwrap();
    let points = reader.collect::<laz_codec::Result<Vec<Point>>>().unwrap();
    assert_eq!(points.len(), expected.len(), "format {}", format_id);
    for (i, (read, written)) in points.iter().zip(expected.iter()).enumerate() {
        assert_eq!(read, written, "format {} point {}", format_id, i);
    }
}

fn buffer_round_trip(vlr: LazVlr, raw_points: &[u8]) {
    let mut compressed = Cursor::new(Vec::<u8>::new());
    compress_buffer(&mut compressed, raw_points, vlr.clone()).unwrap();
    let compressed = compressed.into_inner();
    assert!(compressed.len() < raw_points.len());

    let mut decompressed = vec![0u8; raw_points.len()];
    decompress_buffer(&compressed, &mut decompressed, vlr).unwrap();
    assert_eq!(decompressed, raw_points);
}

#[test]
fn test_every_point_format() {
    for format_id in ALL_FORMATS {
        stream_round_trip(format_id, 0, 3_000, 1_000);
    }
}

#[test]
fn test_every_point_format_with_extra_bytes() {
    for format_id in ALL_FORMATS {
        stream_round_trip(format_id, 5, 1_200, 500);
    }
}

#[test]
fn test_single_point() {
    for format_id in ALL_FORMATS {
        stream_round_trip(format_id, 0, 1, 50_000);
    }
}

#[test]
fn test_legacy_formats_version_1() {
    for format_id in 0..=5u8 {
        let format = PointFormat::new(format_id).unwrap();
        let items = LazItemRecordBuilder::versioned_for_point_format_id(format_id, 3, 1).unwrap();
        assert!(items.iter().all(|item| item.version() == 1));
        let vlr = LazVlrBuilder::new()
            .with_laz_items(items)
            .with_chunk_size(700)
            .build();
        assert_eq!(vlr.compressor_type(), CompressorType::PointWiseChunked);

        let points = generate_points(format, 2_000, 3, 11);
        buffer_round_trip(vlr, &pack_points(format, &points));
    }
}

#[test]
fn test_legacy_formats_version_2() {
    for format_id in 0..=5u8 {
        let format = PointFormat::new(format_id).unwrap();
        let items = LazItemRecordBuilder::versioned_for_point_format_id(format_id, 0, 2).unwrap();
        let vlr = LazVlrBuilder::new()
            .with_laz_items(items)
            .with_chunk_size(700)
            .build();

        let points = generate_points(format, 2_000, 0, 12);
        buffer_round_trip(vlr, &pack_points(format, &points));
    }
}

#[test]
fn test_extended_formats_layered() {
    for format_id in 6..=10u8 {
        let format = PointFormat::new(format_id).unwrap();
        let items = LazItemRecordBuilder::default_for_point_format_id(format_id, 2).unwrap();
        let vlr = LazVlrBuilder::new()
            .with_laz_items(items)
            .with_chunk_size(700)
            .build();
        assert_eq!(vlr.compressor_type(), CompressorType::LayeredChunked);

        let points = generate_points(format, 2_000, 2, 13);
        buffer_round_trip(vlr, &pack_points(format, &points));
    }
}

#[test]
fn test_point_wise_without_chunks() {
    let format = PointFormat::new(3).unwrap();
    let vlr = LazVlrBuilder::new()
        .with_laz_items(format.laz_items(0))
        .with_compressor_type(CompressorType::PointWise)
        .build();
    let raw_points = pack_points(format, &generate_points(format, 300, 0, 14));

    let mut compressor = LasZipCompressor::new(Cursor::new(Vec::<u8>::new()), vlr.clone()).unwrap();
    compressor.compress_many(&raw_points).unwrap();
    compressor.done().unwrap();
    let compressed = compressor.into_inner().into_inner();

    let mut decompressor = LasZipDecompressor::new(Cursor::new(compressed), vlr).unwrap();
    let mut decompressed = vec![0u8; raw_points.len()];
    decompressor.decompress_many(&mut decompressed).unwrap();
    assert_eq!(decompressed, raw_points);
}

#[test]
fn test_compression_is_deterministic() {
    for format_id in [1u8, 3, 6, 8, 10].iter().copied() {
        let format = PointFormat::new(format_id).unwrap();
        let points = generate_points(format, 2_500, 1, 99);

        let compress = || {
            let mut writer = open_writer_with_extra_bytes(format_id, 1, 1_000).unwrap();
            for point in &points {
                writer.write_point(point).unwrap();
            }
            writer.close().unwrap()
        };
        let first = compress();
        let second = compress();
        assert_eq!(first.data, second.data, "format {}", format_id);
        assert_eq!(first.chunk_offsets, second.chunk_offsets);
    }
}

#[test]
fn test_vlr_survives_serialization() {
    let items = LazItemRecordBuilder::default_for_point_format_id(8, 4).unwrap();
    let vlr = LazVlrBuilder::new()
        .with_laz_items(items)
        .with_chunk_size(1_234)
        .build();
    let mut record_data = vec![];
    vlr.write_to(&mut record_data).unwrap();

    let read_vlr = LazVlr::from_buffer(&record_data).unwrap();
    assert_eq!(read_vlr.chunk_size(), 1_234);
    assert_eq!(read_vlr.compressor_type(), CompressorType::LayeredChunked);
    assert_eq!(read_vlr.items(), vlr.items());
    assert_eq!(read_vlr.items_size(), 38 + 4);

    // the decompressor can be built from the raw record data alone
    let format = PointFormat::new(8).unwrap();
    let raw_points = pack_points(format, &generate_points(format, 100, 4, 3));
    let mut compressed = Cursor::new(Vec::<u8>::new());
    compress_buffer(&mut compressed, &raw_points, vlr).unwrap();
    compressed.set_position(0);

    let mut decompressor =
        LasZipDecompressor::new_with_record_data(compressed, &record_data).unwrap();
    let mut decompressed = vec![0u8; raw_points.len()];
    decompressor.decompress_many(&mut decompressed).unwrap();
    assert_eq!(decompressed, raw_points);
}
