#![cfg(feature = "parallel")]
mod common;

use std::io::Cursor;

use common::{generate_points, pack_points};
use laz_codec::{
    compress_buffer, decompress_buffer, par_compress_buffer, par_decompress_buffer,
    CompressorType, LasZipError, LazVlrBuilder, PointFormat,
};

#[test]
fn test_parallel_matches_sequential() {
    for format_id in [1u8, 3, 6, 8].iter().copied() {
        let format = PointFormat::new(format_id).unwrap();
        let raw_points = pack_points(format, &generate_points(format, 10_500, 0, 31));
        let vlr = LazVlrBuilder::new()
            .with_laz_items(format.laz_items(0))
            .with_chunk_size(1_000)
            .build();

        let mut sequential = Cursor::new(Vec::<u8>::new());
        compress_buffer(&mut sequential, &raw_points, vlr.clone()).unwrap();
        let mut parallel = Cursor::new(Vec::<u8>::new());
        par_compress_buffer(&mut parallel, &raw_points, &vlr).unwrap();
        let compressed = parallel.into_inner();
        assert_eq!(compressed, sequential.into_inner(), "format {}", format_id);

        let mut decompressed = vec![0u8; raw_points.len()];
        par_decompress_buffer(&compressed, &mut decompressed, &vlr).unwrap();
        assert_eq!(decompressed, raw_points);

        let mut decompressed = vec![0u8; raw_points.len()];
        decompress_buffer(&compressed, &mut decompressed, vlr).unwrap();
        assert_eq!(decompressed, raw_points);
    }
}

#[test]
fn test_parallel_rejects_point_wise() {
    let format = PointFormat::new(0).unwrap();
    let vlr = LazVlrBuilder::new()
        .with_laz_items(format.laz_items(0))
        .with_compressor_type(CompressorType::PointWise)
        .build();
    let raw_points = pack_points(format, &generate_points(format, 10, 0, 32));
    let mut output = Cursor::new(Vec::<u8>::new());
    assert!(matches!(
        par_compress_buffer(&mut output, &raw_points, &vlr),
        Err(LasZipError::UnsupportedCompressorType(CompressorType::PointWise))
    ));
}
