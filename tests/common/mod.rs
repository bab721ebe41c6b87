#![allow(dead_code)]

use laz_codec::las::rgb::RGB;
use laz_codec::las::wavepacket::Wavepacket;
use laz_codec::{Point, PointFormat};

/// Small deterministic generator, the tests must not depend on a rand crate.
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Lcg(seed ^ 0x5DEE_CE66_D)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    pub fn below(&mut self, n: u32) -> u32 {
        self.next_u32() % n
    }

    pub fn delta(&mut self, spread: u32) -> i32 {
        self.below(2 * spread + 1) as i32 - spread as i32
    }
}

/// Points resembling a LiDAR scan line, only using the fields
/// the format stores so that they survive a round trip unchanged.
pub fn generate_points(format: PointFormat, count: usize, num_extra_bytes: usize, seed: u64) -> Vec<Point> {
    let mut rng = Lcg::new(seed);
    let extended = format.is_extended();
    let mut x = 1_000_000i32;
    let mut y = 2_000_000i32;
    let mut z = 30_000i32;
    let mut gps_time = 250_000.5f64;
    let mut rgb = RGB {
        red: 1200,
        green: 2400,
        blue: 3600,
    };

    let mut points = Vec::with_capacity(count);
    for i in 0..count {
        x = x.wrapping_add(rng.delta(150));
        y = y.wrapping_add(rng.delta(40));
        z = z.wrapping_add(rng.delta(25));

        let number_of_returns = 1 + rng.below(if extended { 15 } else { 7 }) as u8;
        let return_number = 1 + rng.below(u32::from(number_of_returns)) as u8;

        let mut point = Point {
            x,
            y,
            z,
            intensity: (400 + rng.delta(60)) as u16,
            return_number,
            number_of_returns,
            scan_direction_flag: (i / 500) % 2 == 1,
            edge_of_flight_line: i % 997 == 0,
            user_data: (i / 1000) as u8,
            point_source_id: 7 + (i / 4000) as u16,
            ..Default::default()
        };

        if extended {
            point.classification = [2u8, 2, 2, 5, 6, 45][rng.below(6) as usize];
            point.classification_flags = if rng.below(50) == 0 { 0b1000 } else { 0 };
            point.scanner_channel = ((i / 333) % 4) as u8;
            point.scan_angle = (i as i16 % 3000).wrapping_mul(5).wrapping_sub(7500);
        } else {
            point.classification = [2u8, 2, 2, 3, 5, 9][rng.below(6) as usize];
            point.classification_flags = if rng.below(50) == 0 { 0b001 } else { 0 };
            point.scan_angle = (i % 60) as i16 - 30;
        }

        if format.has_gps_time() {
            if rng.below(3) != 0 {
                gps_time += 0.000_01 * f64::from(1 + rng.below(3));
            }
            point.gps_time = gps_time;
        }
        if format.has_rgb() {
            if rng.below(4) == 0 {
                rgb.red = (i32::from(rgb.red) + rng.delta(300)) as u16;
                rgb.green = (i32::from(rgb.green) + rng.delta(300)) as u16;
                rgb.blue = (i32::from(rgb.blue) + rng.delta(300)) as u16;
            }
            point.rgb = rgb;
        }
        if format.has_nir() {
            point.nir = 5000u16.wrapping_add((i % 700) as u16);
        }
        if format.has_waveform() {
            point.wavepacket = Wavepacket {
                descriptor_index: 1 + rng.below(2) as u8,
                offset: 4096 + 256 * i as u64,
                size: 256,
                return_point: 10.0 + rng.below(100) as f32 * 0.5,
                dx: 0.000_1,
                dy: -0.000_2,
                dz: 0.25 + (i % 5) as f32 * 0.125,
            };
        }
        point.extra_bytes = (0..num_extra_bytes)
            .map(|b| (i as u8).wrapping_mul(b as u8 + 1).wrapping_add(rng.below(2) as u8))
            .collect();
        points.push(point);
    }
    points
}

/// The points laid out as raw LAS records.
pub fn pack_points(format: PointFormat, points: &[Point]) -> Vec<u8> {
    let mut data = vec![];
    for point in points {
        let mut record = vec![0u8; format.record_size() + point.extra_bytes.len()];
        point.pack_into(format, &mut record);
        data.extend_from_slice(&record);
    }
    data
}
