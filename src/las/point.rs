//! The attribute record handed to and returned by the stream API,
//! and the LAS point formats it can be laid out as.

use crate::las::gps::GpsTime;
use crate::las::laszip::{LazItem, LazItemRecordBuilder};
use crate::las::point10::Point10;
use crate::las::point14::Point14;
use crate::las::rgb::RGB;
use crate::las::utils::i8_clamp;
use crate::las::wavepacket::Wavepacket;
use crate::packers::Packable;
use crate::LasZipError;

/// One LAS point, whatever its format.
///
/// Fields a format does not store are ignored when packing
/// and left to their default when unpacking.
#[derive(Default, Clone, PartialEq, Debug)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,
    pub return_number: u8,
    pub number_of_returns: u8,
    pub scan_direction_flag: bool,
    pub edge_of_flight_line: bool,
    /// 5 bits for formats 0 to 5, 8 bits for the extended formats
    pub classification: u8,
    /// synthetic, key-point, withheld and, for the extended formats, overlap
    pub classification_flags: u8,
    /// only stored by the extended formats
    pub scanner_channel: u8,
    /// The scan angle rank for formats 0 to 5,
    /// in 0.006 degree increments for the extended formats.
    pub scan_angle: i16,
    pub user_data: u8,
    pub point_source_id: u16,
    pub gps_time: f64,
    pub rgb: RGB,
    pub nir: u16,
    pub wavepacket: Wavepacket,
    pub extra_bytes: Vec<u8>,
}

/// A LAS point format id, 0 to 10.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PointFormat {
    id: u8,
}

impl PointFormat {
    const COMPRESSION_BITS: u8 = 0b1100_0000;

    pub fn new(id: u8) -> crate::Result<Self> {
        if id > 10 {
            Err(LasZipError::UnsupportedPointFormat(id))
        } else {
            Ok(Self { id })
        }
    }

    /// Reads the point format byte of a LAS header, where the
    /// high bits flag compressed point data.
    pub fn from_header_byte(byte: u8) -> crate::Result<Self> {
        Self::new(byte & !Self::COMPRESSION_BITS)
    }

    /// Whether a LAS header point format byte flags compressed point data.
    pub fn is_compressed_header_byte(byte: u8) -> bool {
        byte & Self::COMPRESSION_BITS != 0
    }

    pub fn to_header_byte(self, compressed: bool) -> u8 {
        if compressed {
            self.id | 0x80
        } else {
            self.id
        }
    }

    pub fn id(self) -> u8 {
        self.id
    }

    pub fn is_extended(self) -> bool {
        self.id >= 6
    }

    pub fn has_gps_time(self) -> bool {
        self.id != 0 && self.id != 2
    }

    pub fn has_rgb(self) -> bool {
        matches!(self.id, 2 | 3 | 5 | 7 | 8 | 10)
    }

    pub fn has_nir(self) -> bool {
        matches!(self.id, 8 | 10)
    }

    pub fn has_waveform(self) -> bool {
        matches!(self.id, 4 | 5 | 9 | 10)
    }

    /// Size in bytes of a record, extra bytes excluded.
    pub fn record_size(self) -> usize {
        let mut size = if self.is_extended() {
            Point14::SIZE
        } else {
            Point10::SIZE
        };
        if !self.is_extended() && self.has_gps_time() {
            size += GpsTime::SIZE;
        }
        if self.has_rgb() {
            size += RGB::SIZE;
        }
        if self.has_nir() {
            size += std::mem::size_of::<u16>();
        }
        if self.has_waveform() {
            size += Wavepacket::SIZE;
        }
        size
    }

    /// The items compressing this format with the default algorithm versions.
    pub fn laz_items(self, num_extra_bytes: u16) -> Vec<LazItem> {
        LazItemRecordBuilder::items_for_point_format(self, num_extra_bytes)
    }
}

impl Point {
    /// Reads a point laid out as `format`, any byte after the
    /// format's record becomes an extra byte.
    pub fn unpack_from(format: PointFormat, input: &[u8]) -> Self {
        let mut point = Point::default();
        let mut offset = if format.is_extended() {
            let base = Point14::unpack_from(&input[..Point14::SIZE]);
            point.set_from_point14(&base);
            Point14::SIZE
        } else {
            let base = Point10::unpack_from(&input[..Point10::SIZE]);
            point.set_from_point10(&base);
            Point10::SIZE
        };

        if !format.is_extended() && format.has_gps_time() {
            point.gps_time = f64::from(GpsTime::unpack_from(&input[offset..offset + GpsTime::SIZE]));
            offset += GpsTime::SIZE;
        }
        if format.has_rgb() {
            point.rgb = RGB::unpack_from(&input[offset..offset + RGB::SIZE]);
            offset += RGB::SIZE;
        }
        if format.has_nir() {
            point.nir = u16::unpack_from(&input[offset..offset + 2]);
            offset += 2;
        }
        if format.has_waveform() {
            point.wavepacket = Wavepacket::unpack_from(&input[offset..offset + Wavepacket::SIZE]);
            offset += Wavepacket::SIZE;
        }
        point.extra_bytes = input[offset..].to_vec();
        point
    }

    /// Writes the point laid out as `format`, the output must hold
    /// the format's record and the point's extra bytes.
    pub fn pack_into(&self, format: PointFormat, output: &mut [u8]) {
        let mut offset = if format.is_extended() {
            self.to_point14().pack_into(&mut output[..Point14::SIZE]);
            Point14::SIZE
        } else {
            self.to_point10().pack_into(&mut output[..Point10::SIZE]);
            Point10::SIZE
        };

        if !format.is_extended() && format.has_gps_time() {
            GpsTime::from(self.gps_time).pack_into(&mut output[offset..offset + GpsTime::SIZE]);
            offset += GpsTime::SIZE;
        }
        if format.has_rgb() {
            self.rgb.pack_into(&mut output[offset..offset + RGB::SIZE]);
            offset += RGB::SIZE;
        }
        if format.has_nir() {
            self.nir.pack_into(&mut output[offset..offset + 2]);
            offset += 2;
        }
        if format.has_waveform() {
            self.wavepacket
                .pack_into(&mut output[offset..offset + Wavepacket::SIZE]);
            offset += Wavepacket::SIZE;
        }
        let end = offset + self.extra_bytes.len();
        output[offset..end].copy_from_slice(&self.extra_bytes);
    }

    fn to_point10(&self) -> Point10 {
        Point10 {
            x: self.x,
            y: self.y,
            z: self.z,
            intensity: self.intensity,
            return_number: self.return_number & 0x7,
            number_of_returns_of_given_pulse: self.number_of_returns & 0x7,
            scan_direction_flag: self.scan_direction_flag,
            edge_of_flight_line: self.edge_of_flight_line,
            classification: (self.classification & 0x1F) | ((self.classification_flags & 0x7) << 5),
            scan_angle_rank: i8_clamp(i32::from(self.scan_angle)),
            user_data: self.user_data,
            point_source_id: self.point_source_id,
        }
    }

    fn set_from_point10(&mut self, p: &Point10) {
        self.x = p.x;
        self.y = p.y;
        self.z = p.z;
        self.intensity = p.intensity;
        self.return_number = p.return_number;
        self.number_of_returns = p.number_of_returns_of_given_pulse;
        self.scan_direction_flag = p.scan_direction_flag;
        self.edge_of_flight_line = p.edge_of_flight_line;
        self.classification = p.classification & 0x1F;
        self.classification_flags = p.classification >> 5;
        self.scan_angle = i16::from(p.scan_angle_rank);
        self.user_data = p.user_data;
        self.point_source_id = p.point_source_id;
    }

    fn to_point14(&self) -> Point14 {
        Point14 {
            x: self.x,
            y: self.y,
            z: self.z,
            intensity: self.intensity,
            return_number: self.return_number & 0xF,
            number_of_returns: self.number_of_returns & 0xF,
            classification_flags: self.classification_flags & 0xF,
            scanner_channel: self.scanner_channel & 0x3,
            scan_direction_flag: self.scan_direction_flag,
            edge_of_flight_line: self.edge_of_flight_line,
            classification: self.classification,
            user_data: self.user_data,
            scan_angle: self.scan_angle,
            point_source_id: self.point_source_id,
            gps_time: self.gps_time,
        }
    }

    fn set_from_point14(&mut self, p: &Point14) {
        self.x = p.x;
        self.y = p.y;
        self.z = p.z;
        self.intensity = p.intensity;
        self.return_number = p.return_number;
        self.number_of_returns = p.number_of_returns;
        self.classification_flags = p.classification_flags;
        self.scanner_channel = p.scanner_channel;
        self.scan_direction_flag = p.scan_direction_flag;
        self.edge_of_flight_line = p.edge_of_flight_line;
        self.classification = p.classification;
        self.user_data = p.user_data;
        self.scan_angle = p.scan_angle;
        self.point_source_id = p.point_source_id;
        self.gps_time = p.gps_time;
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_record_sizes() {
        let expected = [20, 28, 26, 34, 57, 63, 30, 36, 38, 59, 67];
        for (id, size) in expected.iter().enumerate() {
            let format = PointFormat::new(id as u8).unwrap();
            assert_eq!(format.record_size(), *size, "format {}", id);
            let items_size: u16 = format.laz_items(0).iter().map(|i| i.size()).sum();
            assert_eq!(usize::from(items_size), *size, "format {}", id);
        }
    }

    #[test]
    fn test_unsupported_format() {
        assert!(matches!(
            PointFormat::new(11),
            Err(LasZipError::UnsupportedPointFormat(11))
        ));
    }

    #[test]
    fn test_header_byte() {
        let format = PointFormat::from_header_byte(0x83).unwrap();
        assert_eq!(format.id(), 3);
        assert!(PointFormat::is_compressed_header_byte(0x83));
        assert!(!PointFormat::is_compressed_header_byte(3));
        assert_eq!(format.to_header_byte(true), 0x83);
        assert_eq!(PointFormat::from_header_byte(0x46).unwrap().id(), 6);
    }

    #[test]
    fn test_legacy_classification_byte() {
        let format = PointFormat::new(0).unwrap();
        let point = Point {
            classification: 2,
            classification_flags: 0b101,
            scan_angle: -12,
            return_number: 2,
            number_of_returns: 3,
            ..Default::default()
        };
        let mut buf = vec![0u8; format.record_size()];
        point.pack_into(format, &mut buf);
        assert_eq!(buf[15], 2 | (0b101 << 5));
        assert_eq!(buf[16] as i8, -12);
        assert_eq!(Point::unpack_from(format, &buf), point);
    }

    #[test]
    fn test_extended_layout() {
        let format = PointFormat::new(10).unwrap();
        let point = Point {
            x: -5,
            classification: 200,
            classification_flags: 0b1000,
            scanner_channel: 3,
            scan_angle: -15_000,
            gps_time: 123.25,
            rgb: RGB {
                red: 1,
                green: 2,
                blue: 3,
            },
            nir: 0xBEEF,
            wavepacket: Wavepacket {
                descriptor_index: 4,
                offset: 1 << 40,
                size: 256,
                return_point: 1.5,
                dx: 0.25,
                dy: -0.25,
                dz: 1.0,
            },
            extra_bytes: vec![7, 8, 9],
            ..Default::default()
        };
        let mut buf = vec![0u8; format.record_size() + 3];
        point.pack_into(format, &mut buf);
        assert_eq!(u16::unpack_from(&buf[36..38]), 0xBEEF);
        assert_eq!(&buf[67..], &[7, 8, 9]);
        assert_eq!(Point::unpack_from(format, &buf), point);
    }
}
