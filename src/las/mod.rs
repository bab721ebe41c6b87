//! The LAS point items, their codecs, and the LAZ layer driving them.

#[macro_use]
mod utils;

pub mod extra_bytes;
pub mod gps;
pub mod laszip;
pub mod nir;
pub mod point;
pub mod point10;
pub mod point14;
pub mod rgb;
pub mod stream;
pub mod wavepacket;

pub use point::{Point, PointFormat};

/// Codecs of the first algorithm version (point formats 0 to 5).
pub mod v1 {
    pub use crate::las::extra_bytes::v1::{ExtraBytesCompressor, ExtraBytesDecompressor};
    pub use crate::las::gps::v1::{GpsTimeCompressor, GpsTimeDecompressor};
    pub use crate::las::point10::v1::{Point10Compressor, Point10Decompressor};
    pub use crate::las::rgb::v1::{RGBCompressor, RGBDecompressor};
    pub use crate::las::wavepacket::v1::{WavepacketCompressor, WavepacketDecompressor};
}

/// Codecs of the second algorithm version (point formats 0 to 5).
pub mod v2 {
    pub use crate::las::extra_bytes::v2::{ExtraBytesCompressor, ExtraBytesDecompressor};
    pub use crate::las::gps::v2::{GpsTimeCompressor, GpsTimeDecompressor};
    pub use crate::las::point10::v2::{Point10Compressor, Point10Decompressor};
    pub use crate::las::rgb::v2::{RGBCompressor, RGBDecompressor};
}

/// Layered codecs (point formats 6 to 10).
pub mod v3 {
    pub use crate::las::extra_bytes::v3::{ExtraBytesCompressor, ExtraBytesDecompressor};
    pub use crate::las::nir::v3::{NirCompressor, NirDecompressor};
    pub use crate::las::point14::v3::{Point14Compressor, Point14Decompressor};
    pub use crate::las::rgb::v3::{RGBCompressor, RGBDecompressor};
    pub use crate::las::wavepacket::v3::{WavepacketCompressor, WavepacketDecompressor};
}
