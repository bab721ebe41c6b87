//! Chunks frozen byte for byte, any change to the coder or to a field codec shows up here.

use std::io::Cursor;

use laz_codec::las::rgb::RGB;
use laz_codec::las::v3::{NirCompressor, RGBCompressor};
use laz_codec::packers::Packable;
use laz_codec::record::{
    LayeredFieldCompressor, LayeredPointRecordCompressor, RecordCompressor, RecordDecompressor,
    SequentialPointRecordCompressor, SequentialPointRecordDecompressor,
};
use laz_codec::{Point, PointFormat};

const FORMAT_1_CHUNK: [u8; 119] = [
    0xe8, 0x03, 0x00, 0x00, 0xd0, 0x07, 0x00, 0x00, 0x2c, 0x01, 0x00, 0x00,
    0x64, 0x00, 0x11, 0x01, 0xfb, 0x07, 0x2a, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x44, 0x8f, 0x40, 0xf0, 0x49, 0x59, 0x1d, 0x3d, 0x6c, 0xa0, 0xf5,
    0x34, 0x58, 0x44, 0x28, 0x9e, 0xac, 0x42, 0x5f, 0x81, 0xf9, 0x05, 0x07,
    0x51, 0xa7, 0x5d, 0x99, 0xce, 0xe9, 0x61, 0xbc, 0x9c, 0x37, 0x5c, 0x9d,
    0x6a, 0x5a, 0xdd, 0x22, 0x64, 0x72, 0x8e, 0x6d, 0x34, 0xd3, 0x7e, 0x8c,
    0xb1, 0x6c, 0xfd, 0x56, 0x13, 0x8d, 0xe0, 0x9e, 0x01, 0xa3, 0xc9, 0x65,
    0x62, 0x36, 0xcb, 0xaf, 0xd1, 0x04, 0x01, 0x90, 0x77, 0xde, 0x5c, 0xc5,
    0x80, 0x77, 0x84, 0xba, 0x54, 0xf2, 0x19, 0xb6, 0x24, 0xe5, 0x92, 0xe4,
    0x9c, 0xf6, 0x4b, 0xd1, 0x01, 0x1a, 0xfb, 0xd3, 0x00, 0x00, 0x00,
];

const FORMAT_3_CHUNK: [u8; 162] = [
    0xe8, 0x03, 0x00, 0x00, 0xd0, 0x07, 0x00, 0x00, 0x2c, 0x01, 0x00, 0x00,
    0x64, 0x00, 0x11, 0x01, 0xfb, 0x07, 0x2a, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x44, 0x8f, 0x40, 0xe8, 0x03, 0xe8, 0x03, 0xa0, 0x0f, 0xf0, 0x49,
    0x59, 0x1d, 0x3d, 0x6c, 0xa0, 0xf5, 0x34, 0x58, 0x44, 0x27, 0xc1, 0x34,
    0xe6, 0xd2, 0xc9, 0x58, 0x84, 0xbf, 0x03, 0xc5, 0x5e, 0x46, 0xa9, 0xc5,
    0x60, 0xb6, 0x50, 0x4b, 0x1d, 0x23, 0x2d, 0x93, 0xdc, 0xf2, 0xa5, 0x84,
    0x07, 0x32, 0xc4, 0x26, 0x8c, 0xfe, 0x2e, 0x87, 0xc1, 0xfb, 0x07, 0xf5,
    0x07, 0x9b, 0x0d, 0xeb, 0xdd, 0xed, 0x08, 0x0b, 0x79, 0x19, 0x93, 0xf5,
    0x90, 0x2b, 0x9d, 0xb4, 0x4f, 0x86, 0x51, 0xb9, 0x24, 0x8c, 0xef, 0x2d,
    0xf1, 0x65, 0x7b, 0xf3, 0x22, 0x41, 0x64, 0xdc, 0xd2, 0xbd, 0xcc, 0x85,
    0x32, 0xb6, 0x7f, 0xe0, 0xb6, 0x67, 0x95, 0xd4, 0x6c, 0x5b, 0xaf, 0xac,
    0x06, 0x71, 0x56, 0x0d, 0x82, 0x34, 0x59, 0x33, 0x14, 0x24, 0x34, 0x30,
    0xef, 0x63, 0xd1, 0x21, 0x8a, 0x41, 0x34, 0xc3, 0xb1, 0x29, 0x13, 0x08,
    0xbd, 0x3e, 0x52, 0x00, 0x00, 0x00,
];

/// Offsets added to the bit pattern of the first gps time: equal steps,
/// a repeated time, a doubled step and a step backwards.
const GPS_TIME_STEPS: [u64; 10] = [0, 1200, 2400, 3580, 3580, 4830, 7230, 8430, 9630, 9330];

fn reference_point(i: usize) -> Point {
    let n = i as i32;
    let red = 1000 + 3 * i as u16;
    Point {
        x: 1000 + n * 17 + (n * n) % 5,
        y: 2000 - n * 3 + n % 3,
        z: 300 + (n * 7) % 11,
        intensity: 100 + ((n * 13) % 40) as u16,
        return_number: 1 + (i % 2) as u8,
        number_of_returns: 2,
        scan_direction_flag: i >= 5,
        classification: if i % 4 == 0 { 1 } else { 2 },
        scan_angle: n as i16 - 5,
        user_data: 7,
        point_source_id: if i < 6 { 42 } else { 43 },
        gps_time: f64::from_bits(1000.5f64.to_bits() + GPS_TIME_STEPS[i]),
        rgb: RGB {
            red,
            green: if i < 3 { red } else { 1000 + 5 * i as u16 },
            blue: 4000 - 256 * i as u16,
        },
        ..Default::default()
    }
}

fn packed_reference_points(format: PointFormat) -> Vec<Vec<u8>> {
    (0..GPS_TIME_STEPS.len())
        .map(|i| {
            let mut raw = vec![0u8; format.record_size()];
            reference_point(i).pack_into(format, &mut raw);
            raw
        })
        .collect()
}

fn check_reference_chunk(format_id: u8, expected: &[u8]) {
    let format = PointFormat::new(format_id).unwrap();
    let points = packed_reference_points(format);

    let mut compressor = SequentialPointRecordCompressor::new(Cursor::new(Vec::<u8>::new()));
    compressor.set_fields_from(&format.laz_items(0)).unwrap();
    for raw in &points {
        compressor.compress_next(raw).unwrap();
    }
    compressor.done().unwrap();
    let chunk = Box::new(compressor).box_into_inner().into_inner();
    assert_eq!(&chunk[..], expected, "format {}", format_id);

    let mut decompressor = SequentialPointRecordDecompressor::new(Cursor::new(expected.to_vec()));
    decompressor.set_fields_from(&format.laz_items(0)).unwrap();
    let mut out = vec![0u8; format.record_size()];
    for (i, raw) in points.iter().enumerate() {
        decompressor.decompress_next(&mut out).unwrap();
        assert_eq!(&out, raw, "format {} point {}", format_id, i);
    }
}

#[test]
fn test_point_format_1_chunk() {
    check_reference_chunk(1, &FORMAT_1_CHUNK);
}

#[test]
fn test_point_format_3_chunk() {
    check_reference_chunk(3, &FORMAT_3_CHUNK);
}

fn channel_of(i: usize) -> usize {
    (i / 5) % 2
}

fn two_channel_points(count: usize) -> Vec<Point> {
    (0..count)
        .map(|i| {
            let on_first_channel = channel_of(i) == 0;
            Point {
                x: 10 * i as i32,
                y: 3 * i as i32,
                z: 100,
                return_number: 1,
                number_of_returns: 1,
                scanner_channel: channel_of(i) as u8,
                gps_time: 1.0 + i as f64,
                rgb: if on_first_channel {
                    RGB {
                        red: 100 + i as u16,
                        green: 200,
                        blue: 300,
                    }
                } else {
                    RGB {
                        red: 5000,
                        green: 6000 + 2 * i as u16,
                        blue: 7000,
                    }
                },
                nir: if on_first_channel { 1000 + i as u16 } else { 9000 },
                ..Default::default()
            }
        })
        .collect()
}

fn layered_chunk(format: PointFormat, points: &[Point]) -> Vec<u8> {
    let mut compressor = LayeredPointRecordCompressor::new(Cursor::new(Vec::<u8>::new()));
    compressor.set_fields_from(&format.laz_items(0)).unwrap();
    let mut raw = vec![0u8; format.record_size()];
    for point in points {
        point.pack_into(format, &mut raw);
        compressor.compress_next(&raw).unwrap();
    }
    compressor.done().unwrap();
    Box::new(compressor).box_into_inner().into_inner()
}

/// Compresses `fields` on their own and returns the bytes of their single layer.
fn single_layer<C, P>(mut compressor: C, fields: &[P], contexts: &[usize]) -> Vec<u8>
where
    C: LayeredFieldCompressor<Cursor<Vec<u8>>>,
    P: Packable,
{
    let mut dst = Cursor::new(Vec::<u8>::new());
    let mut buf = vec![0u8; compressor.size_of_field()];
    for (i, (field, context)) in fields.iter().zip(contexts).enumerate() {
        let mut context = *context;
        field.pack_into(&mut buf);
        if i == 0 {
            compressor
                .init_first_point(&mut dst, &buf, &mut context)
                .unwrap();
        } else {
            compressor.compress_field_with(&buf, &mut context).unwrap();
        }
    }
    compressor.write_layers_sizes(&mut dst).unwrap();
    compressor.write_layers(&mut dst).unwrap();
    let out = dst.into_inner();
    out[buf.len() + 4..].to_vec()
}

/// The scanner channel of every point, not only of the points where it changes.
fn per_point_contexts(count: usize) -> Vec<usize> {
    (0..count).map(channel_of).collect()
}

fn switch_only_contexts(count: usize) -> Vec<usize> {
    (0..count)
        .map(|i| {
            if i > 0 && channel_of(i) != channel_of(i - 1) {
                channel_of(i)
            } else {
                0
            }
        })
        .collect()
}

#[test]
fn test_rgb_follows_the_scanner_channel_of_every_point() {
    let format = PointFormat::new(7).unwrap();
    let points = two_channel_points(40);
    let chunk = layered_chunk(format, &points);

    let colors: Vec<RGB> = points.iter().map(|p| p.rgb).collect();
    let expected = single_layer(
        RGBCompressor::default(),
        &colors,
        &per_point_contexts(points.len()),
    );
    let switch_only = single_layer(
        RGBCompressor::default(),
        &colors,
        &switch_only_contexts(points.len()),
    );
    assert!(!expected.is_empty());
    assert_ne!(expected, switch_only);
    // the rgb layer is the last one of the chunk
    assert!(chunk.ends_with(&expected));
}

#[test]
fn test_nir_follows_the_scanner_channel_of_every_point() {
    let format = PointFormat::new(8).unwrap();
    let points = two_channel_points(40);
    let chunk = layered_chunk(format, &points);

    let nirs: Vec<u16> = points.iter().map(|p| p.nir).collect();
    let expected = single_layer(
        NirCompressor::default(),
        &nirs,
        &per_point_contexts(points.len()),
    );
    let switch_only = single_layer(
        NirCompressor::default(),
        &nirs,
        &switch_only_contexts(points.len()),
    );
    assert!(!expected.is_empty());
    assert_ne!(expected, switch_only);
    assert!(chunk.ends_with(&expected));
}
