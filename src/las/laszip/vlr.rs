use crate::las::gps::GpsTime;
use crate::las::point::PointFormat;
use crate::las::point10::Point10;
use crate::las::point14::Point14;
use crate::las::rgb::RGB;
use crate::las::wavepacket::Wavepacket;
use crate::LasZipError;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

pub(crate) const DEFAULT_CHUNK_SIZE: u32 = 50_000;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
struct Version {
    major: u8,
    minor: u8,
    revision: u16,
}

impl Version {
    fn read_from<R: Read>(src: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            major: src.read_u8()?,
            minor: src.read_u8()?,
            revision: src.read_u16::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u8(self.major)?;
        dst.write_u8(self.minor)?;
        dst.write_u16::<LittleEndian>(self.revision)?;
        Ok(())
    }
}

impl Default for Version {
    fn default() -> Self {
        Self {
            major: 2,
            minor: 2,
            revision: 0,
        }
    }
}

/// The different type of data / fields found in the definition of LAS points
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum LazItemType {
    /// ExtraBytes of point formats 0 to 5
    Byte(u16),
    /// The 20 bytes shared by point formats 0 to 5
    Point10,
    /// GpsTime of point formats 1, 3, 4 and 5
    GpsTime,
    /// RGB of point formats 2, 3 and 5
    RGB12,
    /// Wave packet descriptor of point formats 4 and 5
    WavePacket13,
    /// The 30 bytes shared by point formats 6 to 10
    Point14,
    /// RGB of point format 7
    RGB14,
    /// RGB + Nir of point formats 8 and 10
    RGBNIR14,
    /// Wave packet descriptor of point formats 9 and 10
    WavePacket14,
    /// ExtraBytes of point formats 6 to 10
    Byte14(u16),
}

impl LazItemType {
    fn size(&self) -> u16 {
        match self {
            LazItemType::Byte(size) => *size,
            LazItemType::Point10 => Point10::SIZE as u16,
            LazItemType::GpsTime => GpsTime::SIZE as u16,
            LazItemType::RGB12 => RGB::SIZE as u16,
            LazItemType::WavePacket13 => Wavepacket::SIZE as u16,
            LazItemType::Point14 => Point14::SIZE as u16,
            LazItemType::RGB14 => RGB::SIZE as u16,
            LazItemType::RGBNIR14 => (RGB::SIZE + std::mem::size_of::<u16>()) as u16,
            LazItemType::WavePacket14 => Wavepacket::SIZE as u16,
            LazItemType::Byte14(size) => *size,
        }
    }

    /// The algorithm version used when none is asked for.
    fn default_version(&self) -> u16 {
        match self {
            LazItemType::Byte(_)
            | LazItemType::Point10
            | LazItemType::GpsTime
            | LazItemType::RGB12 => 2,
            LazItemType::WavePacket13 => 1,
            LazItemType::Point14
            | LazItemType::RGB14
            | LazItemType::RGBNIR14
            | LazItemType::WavePacket14
            | LazItemType::Byte14(_) => 3,
        }
    }
}

impl From<LazItemType> for u16 {
    fn from(t: LazItemType) -> Self {
        match t {
            LazItemType::Byte(_) => 0,
            LazItemType::Point10 => 6,
            LazItemType::GpsTime => 7,
            LazItemType::RGB12 => 8,
            LazItemType::WavePacket13 => 9,
            LazItemType::Point14 => 10,
            LazItemType::RGB14 => 11,
            LazItemType::RGBNIR14 => 12,
            LazItemType::WavePacket14 => 13,
            LazItemType::Byte14(_) => 14,
        }
    }
}

/// Struct stored as part of the laszip's vlr record_data
///
/// This gives information about the dimension compressed
/// and the version used for the compression.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LazItem {
    // coded on a u16
    pub(crate) item_type: LazItemType,
    pub(crate) size: u16,
    pub(crate) version: u16,
}

impl LazItem {
    pub fn new(item_type: LazItemType, version: u16) -> Self {
        let size = item_type.size();
        Self {
            item_type,
            size,
            version,
        }
    }

    pub fn item_type(&self) -> LazItemType {
        self.item_type
    }

    pub fn size(&self) -> u16 {
        self.size
    }

    pub fn version(&self) -> u16 {
        self.version
    }

    fn read_from<R: Read>(src: &mut R) -> crate::Result<Self> {
        let item_type = src.read_u16::<LittleEndian>()?;
        let size = src.read_u16::<LittleEndian>()?;
        let item_type = match item_type {
            0 => LazItemType::Byte(size),
            6 => LazItemType::Point10,
            7 => LazItemType::GpsTime,
            8 => LazItemType::RGB12,
            9 => LazItemType::WavePacket13,
            10 => LazItemType::Point14,
            11 => LazItemType::RGB14,
            12 => LazItemType::RGBNIR14,
            13 => LazItemType::WavePacket14,
            14 => LazItemType::Byte14(size),
            _ => return Err(LasZipError::UnknownLazItem(item_type)),
        };
        Ok(Self {
            item_type,
            size,
            version: src.read_u16::<LittleEndian>()?,
        })
    }

    fn write_to<W: Write>(&self, dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.item_type.into())?;
        dst.write_u16::<LittleEndian>(self.size)?;
        dst.write_u16::<LittleEndian>(self.version)?;
        Ok(())
    }
}

/// Builds the list of [`LazItem`] describing a point record.
#[derive(Default)]
pub struct LazItemRecordBuilder {
    items: Vec<LazItemType>,
}

impl LazItemRecordBuilder {
    /// The items of the point format, each with its default version.
    pub fn default_for_point_format_id(
        point_format_id: u8,
        num_extra_bytes: u16,
    ) -> crate::Result<Vec<LazItem>> {
        let format = PointFormat::new(point_format_id)?;
        Ok(Self::items_for_point_format(format, num_extra_bytes))
    }

    /// The items of the point format, all compressed with the given version.
    ///
    /// Formats 0 to 5 accept versions 1 and 2 (wave packets only
    /// exist in version 1), formats 6 to 10 only accept version 3.
    pub fn versioned_for_point_format_id(
        point_format_id: u8,
        num_extra_bytes: u16,
        version: u16,
    ) -> crate::Result<Vec<LazItem>> {
        let format = PointFormat::new(point_format_id)?;
        let accepted = if format.is_extended() {
            version == 3
        } else {
            version == 1 || version == 2
        };
        let items = Self::items_for_point_format(format, num_extra_bytes);
        if !accepted {
            let first = items
                .first()
                .map_or(LazItemType::Point10, LazItem::item_type);
            return Err(LasZipError::UnsupportedLazItemVersion(first, version));
        }
        Ok(items
            .into_iter()
            .map(|item| match item.item_type {
                LazItemType::WavePacket13 => item,
                item_type => LazItem::new(item_type, version),
            })
            .collect())
    }

    pub(crate) fn items_for_point_format(format: PointFormat, num_extra_bytes: u16) -> Vec<LazItem> {
        let mut builder = Self::new();
        if format.is_extended() {
            builder.add_item(LazItemType::Point14);
            if format.has_nir() {
                builder.add_item(LazItemType::RGBNIR14);
            } else if format.has_rgb() {
                builder.add_item(LazItemType::RGB14);
            }
            if format.has_waveform() {
                builder.add_item(LazItemType::WavePacket14);
            }
            if num_extra_bytes > 0 {
                builder.add_item(LazItemType::Byte14(num_extra_bytes));
            }
        } else {
            builder.add_item(LazItemType::Point10);
            if format.has_gps_time() {
                builder.add_item(LazItemType::GpsTime);
            }
            if format.has_rgb() {
                builder.add_item(LazItemType::RGB12);
            }
            if format.has_waveform() {
                builder.add_item(LazItemType::WavePacket13);
            }
            if num_extra_bytes > 0 {
                builder.add_item(LazItemType::Byte(num_extra_bytes));
            }
        }
        builder.build()
    }

    pub fn new() -> Self {
        Self { items: vec![] }
    }

    pub fn add_item(&mut self, item_type: LazItemType) -> &mut Self {
        self.items.push(item_type);
        self
    }

    pub fn build(&self) -> Vec<LazItem> {
        self.items
            .iter()
            .map(|item_type| LazItem::new(*item_type, item_type.default_version()))
            .collect()
    }
}

fn read_laz_items_from<R: Read>(mut src: &mut R) -> crate::Result<Vec<LazItem>> {
    let num_items = src.read_u16::<LittleEndian>()?;
    let mut items = Vec::<LazItem>::with_capacity(num_items as usize);
    for _ in 0..num_items {
        items.push(LazItem::read_from(&mut src)?)
    }
    Ok(items)
}

fn write_laz_items_to<W: Write>(laz_items: &[LazItem], mut dst: &mut W) -> std::io::Result<()> {
    dst.write_u16::<LittleEndian>(laz_items.len() as u16)?;
    for item in laz_items {
        item.write_to(&mut dst)?;
    }
    Ok(())
}

/// The possibilities for how the compressed data is organized.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum CompressorType {
    None = 0,
    /// No chunks, or rather only 1 chunk with all the points
    PointWise = 1,
    /// Compress points into chunks with chunk_size points in each chunks
    PointWiseChunked = 2,
    /// Compress points into chunk, but also separate the different point dimension / fields
    /// into layers. This CompressorType is only use for point 6,7,8,9,10
    LayeredChunked = 3,
}

impl CompressorType {
    fn from_u16(t: u16) -> Option<Self> {
        match t {
            0 => Some(CompressorType::None),
            1 => Some(CompressorType::PointWise),
            2 => Some(CompressorType::PointWiseChunked),
            3 => Some(CompressorType::LayeredChunked),
            _ => None,
        }
    }

    /// The chunked layout able to hold the items.
    fn for_items(items: &[LazItem]) -> Self {
        if items.iter().any(|item| item.version >= 3) {
            CompressorType::LayeredChunked
        } else {
            CompressorType::PointWiseChunked
        }
    }
}

impl Default for CompressorType {
    fn default() -> Self {
        CompressorType::PointWiseChunked
    }
}

/// The data stored in the record_data of the Laszip Vlr
///
/// This vlr contains information needed to compress or decompress
/// LAZ/LAS data. Such as the points per chunk, the fields & version
/// of the compression/decompression algorithm.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LazVlr {
    // coded on u16
    pub(crate) compressor: CompressorType,
    // 0 means ArithmeticCoder, its the only choice
    coder: u16,

    version: Version,
    options: u32,
    /// Number of points per chunk
    chunk_size: u32,

    // -1 if unused
    number_of_special_evlrs: i64,
    // -1 if unused
    offset_to_special_evlrs: i64,

    items: Vec<LazItem>,
}

impl LazVlr {
    /// The user id of the LasZip VLR header.
    pub const USER_ID: &'static str = "laszip encoded";
    /// The record id of the LasZip VLR header.
    pub const RECORD_ID: u16 = 22204;
    /// The description of the LasZip VLR header.
    pub const DESCRIPTION: &'static str = "http://laszip.org";
    /// Sentinel chunk size of streams whose chunks have a variable size.
    pub const VARIABLE_CHUNK_SIZE: u32 = u32::MAX;

    pub fn from_laz_items(items: Vec<LazItem>) -> Self {
        Self {
            compressor: CompressorType::for_items(&items),
            items,
            ..Default::default()
        }
    }

    /// Tries to read the Vlr information from the record_data buffer
    pub fn from_buffer(record_data: &[u8]) -> crate::Result<Self> {
        let mut cursor = std::io::Cursor::new(record_data);
        Self::read_from(&mut cursor)
    }

    /// Tries to read the Vlr information from the record_data source
    pub fn read_from<R: Read>(mut src: &mut R) -> crate::Result<Self> {
        let compressor_type = src.read_u16::<LittleEndian>()?;
        let compressor = CompressorType::from_u16(compressor_type)
            .ok_or(LasZipError::UnknownCompressorType(compressor_type))?;

        Ok(Self {
            compressor,
            coder: src.read_u16::<LittleEndian>()?,
            version: Version::read_from(&mut src)?,
            options: src.read_u32::<LittleEndian>()?,
            chunk_size: src.read_u32::<LittleEndian>()?,
            number_of_special_evlrs: src.read_i64::<LittleEndian>()?,
            offset_to_special_evlrs: src.read_i64::<LittleEndian>()?,
            items: read_laz_items_from(&mut src)?,
        })
    }

    /// Writes the Vlr to the source, this only write the 'record_data' the
    /// header should be written before-hand
    pub fn write_to<W: Write>(&self, mut dst: &mut W) -> std::io::Result<()> {
        dst.write_u16::<LittleEndian>(self.compressor as u16)?;
        dst.write_u16::<LittleEndian>(self.coder)?;
        self.version.write_to(&mut dst)?;
        dst.write_u32::<LittleEndian>(self.options)?;
        dst.write_u32::<LittleEndian>(self.chunk_size)?;
        dst.write_i64::<LittleEndian>(self.number_of_special_evlrs)?;
        dst.write_i64::<LittleEndian>(self.offset_to_special_evlrs)?;
        write_laz_items_to(&self.items, &mut dst)?;
        Ok(())
    }

    pub fn uses_variably_sized_chunks(&self) -> bool {
        self.chunk_size == Self::VARIABLE_CHUNK_SIZE
    }

    pub fn compressor_type(&self) -> CompressorType {
        self.compressor
    }

    /// Returns the chunk size, that is, the number of points
    /// in each chunk.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Returns the items compressed by this VLR
    pub fn items(&self) -> &Vec<LazItem> {
        &self.items
    }

    /// Returns the sum of the size of the laz_items, which should correspond to the
    /// expected size of points (uncompressed).
    pub fn items_size(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.size)).sum()
    }
}

impl Default for LazVlr {
    fn default() -> Self {
        Self {
            compressor: Default::default(),
            coder: 0,
            version: Version::default(),
            options: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
            number_of_special_evlrs: -1,
            offset_to_special_evlrs: -1,
            items: vec![],
        }
    }
}

/// Builder struct to personalize the LazVlr
#[derive(Default)]
pub struct LazVlrBuilder {
    laz_vlr: LazVlr,
}

impl LazVlrBuilder {
    pub fn new() -> Self {
        Self {
            laz_vlr: Default::default(),
        }
    }

    pub fn from_laz_items(laz_items: Vec<LazItem>) -> Self {
        Self {
            laz_vlr: LazVlr::from_laz_items(laz_items),
        }
    }

    /// Sets the items, the compressor type follows their versions.
    pub fn with_laz_items(mut self, laz_items: Vec<LazItem>) -> Self {
        self.laz_vlr.compressor = CompressorType::for_items(&laz_items);
        self.laz_vlr.items = laz_items;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.laz_vlr.chunk_size = chunk_size;
        self
    }

    /// Chunks will be as big as the points given to each
    /// call to `compress_chunk`, their point counts are stored in the chunk table.
    pub fn with_variable_chunk_size(mut self) -> Self {
        self.laz_vlr.chunk_size = LazVlr::VARIABLE_CHUNK_SIZE;
        self
    }

    pub fn with_compressor_type(mut self, compressor: CompressorType) -> Self {
        self.laz_vlr.compressor = compressor;
        self
    }

    pub fn build(self) -> LazVlr {
        self.laz_vlr
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_vlr_round_trip() {
        let items = LazItemRecordBuilder::default_for_point_format_id(10, 3).unwrap();
        let vlr = LazVlrBuilder::new()
            .with_laz_items(items)
            .with_chunk_size(5_000)
            .build();
        assert_eq!(vlr.compressor_type(), CompressorType::LayeredChunked);

        let mut data = vec![];
        vlr.write_to(&mut data).unwrap();
        // 34 bytes of fixed fields then 6 bytes per item
        assert_eq!(data.len(), 34 + 6 * vlr.items().len());
        assert_eq!(&data[..2], &[3, 0]);

        let read = LazVlr::from_buffer(&data).unwrap();
        assert_eq!(read, vlr);
        assert_eq!(read.items_size(), 67 + 3);
    }

    #[test]
    fn test_item_codes() {
        let items = LazItemRecordBuilder::new()
            .add_item(LazItemType::Point10)
            .add_item(LazItemType::GpsTime)
            .add_item(LazItemType::WavePacket13)
            .add_item(LazItemType::Byte(2))
            .build();
        let vlr = LazVlr::from_laz_items(items);
        assert_eq!(vlr.compressor_type(), CompressorType::PointWiseChunked);

        let mut data = vec![];
        vlr.write_to(&mut data).unwrap();
        let item_data = &data[34..];
        assert_eq!(&item_data[..6], &[6, 0, 20, 0, 2, 0]);
        assert_eq!(&item_data[6..12], &[7, 0, 8, 0, 2, 0]);
        assert_eq!(&item_data[12..18], &[9, 0, 29, 0, 1, 0]);
        assert_eq!(&item_data[18..24], &[0, 0, 2, 0, 2, 0]);
    }

    #[test]
    fn test_unknown_item_and_compressor() {
        let mut data = vec![];
        LazVlr::from_laz_items(vec![LazItem::new(LazItemType::Point10, 2)])
            .write_to(&mut data)
            .unwrap();

        let mut bad_item = data.clone();
        bad_item[34] = 42;
        assert!(matches!(
            LazVlr::from_buffer(&bad_item),
            Err(LasZipError::UnknownLazItem(42))
        ));

        data[0] = 7;
        assert!(matches!(
            LazVlr::from_buffer(&data),
            Err(LasZipError::UnknownCompressorType(7))
        ));
    }

    #[test]
    fn test_versioned_items() {
        let items = LazItemRecordBuilder::versioned_for_point_format_id(5, 0, 1).unwrap();
        let versions: Vec<u16> = items.iter().map(|i| i.version()).collect();
        assert_eq!(versions, vec![1, 1, 1, 1]);

        let items = LazItemRecordBuilder::versioned_for_point_format_id(4, 0, 2).unwrap();
        let versions: Vec<u16> = items.iter().map(|i| i.version()).collect();
        assert_eq!(versions, vec![2, 2, 1]);

        assert!(LazItemRecordBuilder::versioned_for_point_format_id(6, 0, 2).is_err());
        assert!(LazItemRecordBuilder::versioned_for_point_format_id(1, 0, 3).is_err());
        assert!(matches!(
            LazItemRecordBuilder::default_for_point_format_id(12, 0),
            Err(LasZipError::UnsupportedPointFormat(12))
        ));
    }
}
