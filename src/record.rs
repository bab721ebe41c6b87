//! Record compressors and decompressors.
//!
//! A point record is made of fields (Point10, GpsTime, RGB, ...), each field
//! has its own codec, the record codecs drive them in order and know how the
//! compressed bytes of a chunk are laid out.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::decoders::ArithmeticDecoder;
use crate::encoders::ArithmeticEncoder;
use crate::las;
use crate::las::laszip::{LazItem, LazItemType};
use crate::LasZipError;

/***************************************************************************************************
                    Decompression Related Traits
***************************************************************************************************/

pub trait FieldDecompressor<R: Read> {
    fn size_of_field(&self) -> usize;

    /// Reads the raw first point of a chunk and re-seeds every prediction from it.
    fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()>;

    fn decompress_with(
        &mut self,
        decoder: &mut ArithmeticDecoder<R>,
        buf: &mut [u8],
    ) -> crate::Result<()>;
}

pub trait LayeredFieldDecompressor<R: Read> {
    fn size_of_field(&self) -> usize;

    fn init_first_point(
        &mut self,
        src: &mut R,
        first_point: &mut [u8],
        context: &mut usize,
    ) -> crate::Result<()>;

    fn decompress_field_with(
        &mut self,
        current_point: &mut [u8],
        context: &mut usize,
    ) -> crate::Result<()>;

    fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()>;
    fn read_layers(&mut self, src: &mut R) -> crate::Result<()>;
}

pub trait RecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()>;
    fn record_size(&self) -> usize;

    /// The number of points the current chunk says it holds,
    /// only known for layouts that store it, once the first point is read.
    fn record_count(&self) -> Option<u32>;

    fn decompress_next(&mut self, out: &mut [u8]) -> crate::Result<()>;
    /// Prepares the decompressor for a new chunk, the fields are kept.
    fn reset(&mut self);

    fn get_mut(&mut self) -> &mut R;
    fn get(&self) -> &R;
    fn box_into_inner(self: Box<Self>) -> R;
}

fn check_point_buffer(buffer_len: usize, point_size: usize) -> crate::Result<()> {
    if buffer_len < point_size {
        Err(LasZipError::BufferLenNotMultipleOfPointSize {
            buffer_len,
            point_size,
        })
    } else {
        Ok(())
    }
}

/***************************************************************************************************
                    Record Decompressors implementations
***************************************************************************************************/

/// Decompresses records made of [`FieldDecompressor`] fields.
///
/// The points data of a chunk is organized as follow;
///
/// 1) 1 Raw Point (as per ASPRS LAS definition)
/// 2) n compressed Points, all fields interleaved in one arithmetic coded stream
pub struct SequentialPointRecordDecompressor<R: Read> {
    field_decompressors: Vec<Box<dyn FieldDecompressor<R> + Send>>,
    decoder: ArithmeticDecoder<R>,
    is_first_decompression: bool,
    record_size: usize,
}

impl<R: Read> SequentialPointRecordDecompressor<R> {
    pub fn new(input: R) -> Self {
        Self {
            field_decompressors: vec![],
            decoder: ArithmeticDecoder::new(input),
            is_first_decompression: true,
            record_size: 0,
        }
    }

    pub fn add_field_decompressor<T: 'static + FieldDecompressor<R> + Send>(&mut self, field: T) {
        self.record_size += field.size_of_field();
        self.field_decompressors.push(Box::new(field));
    }

    pub fn decompress(&mut self, out: &mut [u8]) -> crate::Result<()> {
        check_point_buffer(out.len(), self.record_size)?;
        let mut field_start = 0;
        if self.is_first_decompression {
            for field in &mut self.field_decompressors {
                let field_end = field_start + field.size_of_field();
                field.decompress_first(self.decoder.get_mut(), &mut out[field_start..field_end])?;
                field_start = field_end;
            }
            self.is_first_decompression = false;

            // the decoder needs to be told that it should read the
            // init bytes after the first record has been read
            self.decoder.read_init_bytes()?;
        } else {
            for field in &mut self.field_decompressors {
                let field_end = field_start + field.size_of_field();
                field.decompress_with(&mut self.decoder, &mut out[field_start..field_end])?;
                field_start = field_end;
            }
        }
        Ok(())
    }
}

impl<R: Read> RecordDecompressor<R> for SequentialPointRecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for record_item in laz_items {
            let models = self.decoder.models_mut();
            let field: Box<dyn FieldDecompressor<R> + Send> =
                match (record_item.item_type, record_item.version) {
                    (LazItemType::Byte(count), 1) => {
                        Box::new(las::v1::ExtraBytesDecompressor::new(models, count as usize)?)
                    }
                    (LazItemType::Point10, 1) => {
                        Box::new(las::v1::Point10Decompressor::new(models)?)
                    }
                    (LazItemType::GpsTime, 1) => {
                        Box::new(las::v1::GpsTimeDecompressor::new(models)?)
                    }
                    (LazItemType::RGB12, 1) => Box::new(las::v1::RGBDecompressor::new(models)?),
                    (LazItemType::WavePacket13, 1) => {
                        Box::new(las::v1::WavepacketDecompressor::new(models)?)
                    }
                    (LazItemType::Byte(count), 2) => {
                        Box::new(las::v2::ExtraBytesDecompressor::new(models, count as usize)?)
                    }
                    (LazItemType::Point10, 2) => {
                        Box::new(las::v2::Point10Decompressor::new(models)?)
                    }
                    (LazItemType::GpsTime, 2) => {
                        Box::new(las::v2::GpsTimeDecompressor::new(models)?)
                    }
                    (LazItemType::RGB12, 2) => Box::new(las::v2::RGBDecompressor::new(models)?),
                    (item_type, version) => {
                        return Err(LasZipError::UnsupportedLazItemVersion(item_type, version));
                    }
                };
            self.record_size += field.size_of_field();
            self.field_decompressors.push(field);
        }
        Ok(())
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    fn record_count(&self) -> Option<u32> {
        None
    }

    fn decompress_next(&mut self, out: &mut [u8]) -> crate::Result<()> {
        self.decompress(out)
    }

    fn reset(&mut self) {
        self.decoder.reset();
        self.is_first_decompression = true;
    }

    fn get_mut(&mut self) -> &mut R {
        self.decoder.get_mut()
    }

    fn get(&self) -> &R {
        self.decoder.get_ref()
    }

    fn box_into_inner(self: Box<Self>) -> R {
        self.decoder.into_inner()
    }
}

/// Decompresses records made of [`LayeredFieldDecompressor`] fields.
///
/// The points data of a chunk is organized in layers as follow:
///
/// 1) 1 Raw Point (as per ASPRS LAS definition)
/// 2) Number of points in the chunk
/// 3) Number of bytes for each layer of the chunk
/// 4) Data of the layers
pub struct LayeredPointRecordDecompressor<R: Read> {
    field_decompressors: Vec<Box<dyn LayeredFieldDecompressor<R> + Send>>,
    input: R,
    is_first_decompression: bool,
    record_size: usize,
    context: usize,
    point_count: Option<u32>,
}

impl<R: Read> LayeredPointRecordDecompressor<R> {
    pub fn new(input: R) -> Self {
        Self {
            field_decompressors: vec![],
            input,
            is_first_decompression: true,
            record_size: 0,
            context: 0,
            point_count: None,
        }
    }

    pub fn add_field_decompressor<T: 'static + LayeredFieldDecompressor<R> + Send>(
        &mut self,
        field: T,
    ) {
        self.record_size += field.size_of_field();
        self.field_decompressors.push(Box::new(field));
    }

    pub fn decompress(&mut self, out: &mut [u8]) -> crate::Result<()> {
        check_point_buffer(out.len(), self.record_size)?;
        let mut field_start = 0;
        if self.is_first_decompression {
            for field in &mut self.field_decompressors {
                let field_end = field_start + field.size_of_field();
                field.init_first_point(
                    &mut self.input,
                    &mut out[field_start..field_end],
                    &mut self.context,
                )?;
                field_start = field_end;
            }

            self.point_count = Some(self.input.read_u32::<LittleEndian>()?);
            for field in &mut self.field_decompressors {
                field.read_layers_sizes(&mut self.input)?;
            }
            for field in &mut self.field_decompressors {
                field.read_layers(&mut self.input)?;
            }
            self.is_first_decompression = false;
        } else {
            for field in &mut self.field_decompressors {
                let field_end = field_start + field.size_of_field();
                field.decompress_field_with(&mut out[field_start..field_end], &mut self.context)?;
                field_start = field_end;
            }
        }
        Ok(())
    }
}

impl<R: Read> RecordDecompressor<R> for LayeredPointRecordDecompressor<R> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for record_item in laz_items {
            match (record_item.item_type, record_item.version) {
                (LazItemType::Point14, 3) => {
                    self.add_field_decompressor(las::v3::Point14Decompressor::default())
                }
                (LazItemType::RGB14, 3) => {
                    self.add_field_decompressor(las::v3::RGBDecompressor::default())
                }
                (LazItemType::RGBNIR14, 3) => {
                    self.add_field_decompressor(las::v3::RGBDecompressor::default());
                    self.add_field_decompressor(las::v3::NirDecompressor::default());
                }
                (LazItemType::WavePacket14, 3) => {
                    self.add_field_decompressor(las::v3::WavepacketDecompressor::default())
                }
                (LazItemType::Byte14(count), 3) => self.add_field_decompressor(
                    las::v3::ExtraBytesDecompressor::new(count as usize),
                ),
                (item_type, version) => {
                    return Err(LasZipError::UnsupportedLazItemVersion(item_type, version));
                }
            }
        }
        Ok(())
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    fn record_count(&self) -> Option<u32> {
        self.point_count
    }

    fn decompress_next(&mut self, out: &mut [u8]) -> crate::Result<()> {
        self.decompress(out)
    }

    fn reset(&mut self) {
        self.is_first_decompression = true;
        self.context = 0;
        self.point_count = None;
    }

    fn get_mut(&mut self) -> &mut R {
        &mut self.input
    }

    fn get(&self) -> &R {
        &self.input
    }

    fn box_into_inner(self: Box<Self>) -> R {
        self.input
    }
}

/***************************************************************************************************
                    Compression related Traits
***************************************************************************************************/
pub trait FieldCompressor<W: Write> {
    fn size_of_field(&self) -> usize;

    /// Writes the first point of a chunk raw and re-seeds every prediction from it.
    fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()>;

    fn compress_with(&mut self, encoder: &mut ArithmeticEncoder<W>, buf: &[u8])
        -> crate::Result<()>;
}

pub trait LayeredFieldCompressor<W: Write> {
    fn size_of_field(&self) -> usize;

    fn init_first_point(
        &mut self,
        dst: &mut W,
        first_point: &[u8],
        context: &mut usize,
    ) -> crate::Result<()>;

    fn compress_field_with(&mut self, current_point: &[u8], context: &mut usize)
        -> crate::Result<()>;

    fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()>;
    fn write_layers(&mut self, dst: &mut W) -> crate::Result<()>;
}

pub trait RecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()>;
    fn record_size(&self) -> usize;

    fn compress_next(&mut self, input: &[u8]) -> crate::Result<()>;
    /// Flushes the chunk being compressed.
    fn done(&mut self) -> crate::Result<()>;
    /// Prepares the compressor for a new chunk, the fields are kept.
    fn reset(&mut self);

    fn get_mut(&mut self) -> &mut W;
    fn get(&self) -> &W;
    fn box_into_inner(self: Box<Self>) -> W;
}

/***************************************************************************************************
                    Record Compressors implementations
***************************************************************************************************/
pub struct SequentialPointRecordCompressor<W: Write> {
    is_first_compression: bool,
    field_compressors: Vec<Box<dyn FieldCompressor<W> + Send>>,
    encoder: ArithmeticEncoder<W>,
    record_size: usize,
}

impl<W: Write> SequentialPointRecordCompressor<W> {
    pub fn new(output: W) -> Self {
        Self {
            is_first_compression: true,
            field_compressors: vec![],
            encoder: ArithmeticEncoder::new(output),
            record_size: 0,
        }
    }

    pub fn add_field_compressor<T: 'static + FieldCompressor<W> + Send>(&mut self, field: T) {
        self.record_size += field.size_of_field();
        self.field_compressors.push(Box::new(field));
    }
}

impl<W: Write> RecordCompressor<W> for SequentialPointRecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for record_item in laz_items {
            let models = self.encoder.models_mut();
            let field: Box<dyn FieldCompressor<W> + Send> =
                match (record_item.item_type, record_item.version) {
                    (LazItemType::Byte(count), 1) => {
                        Box::new(las::v1::ExtraBytesCompressor::new(models, count as usize)?)
                    }
                    (LazItemType::Point10, 1) => Box::new(las::v1::Point10Compressor::new(models)?),
                    (LazItemType::GpsTime, 1) => Box::new(las::v1::GpsTimeCompressor::new(models)?),
                    (LazItemType::RGB12, 1) => Box::new(las::v1::RGBCompressor::new(models)?),
                    (LazItemType::WavePacket13, 1) => {
                        Box::new(las::v1::WavepacketCompressor::new(models)?)
                    }
                    (LazItemType::Byte(count), 2) => {
                        Box::new(las::v2::ExtraBytesCompressor::new(models, count as usize)?)
                    }
                    (LazItemType::Point10, 2) => Box::new(las::v2::Point10Compressor::new(models)?),
                    (LazItemType::GpsTime, 2) => Box::new(las::v2::GpsTimeCompressor::new(models)?),
                    (LazItemType::RGB12, 2) => Box::new(las::v2::RGBCompressor::new(models)?),
                    (item_type, version) => {
                        return Err(LasZipError::UnsupportedLazItemVersion(item_type, version));
                    }
                };
            self.record_size += field.size_of_field();
            self.field_compressors.push(field);
        }
        Ok(())
    }

    fn record_size(&self) -> usize {
        self.record_size
    }

    fn compress_next(&mut self, input: &[u8]) -> crate::Result<()> {
        check_point_buffer(input.len(), self.record_size)?;
        let mut field_start = 0;
        if self.is_first_compression {
            for field in &mut self.field_compressors {
                let field_end = field_start + field.size_of_field();
                field.compress_first(self.encoder.get_mut(), &input[field_start..field_end])?;
                field_start = field_end;
            }
            self.is_first_compression = false;
        } else {
            for field in &mut self.field_compressors {
                let field_end = field_start + field.size_of_field();
                field.compress_with(&mut self.encoder, &input[field_start..field_end])?;
                field_start = field_end;
            }
        }
        Ok(())
    }

    fn done(&mut self) -> crate::Result<()> {
        self.encoder.done()
    }

    fn reset(&mut self) {
        self.is_first_compression = true;
        self.encoder.reset();
    }

    fn get_mut(&mut self) -> &mut W {
        self.encoder.get_mut()
    }

    fn get(&self) -> &W {
        self.encoder.get_ref()
    }

    fn box_into_inner(self: Box<Self>) -> W {
        self.encoder.into_inner()
    }
}

pub struct LayeredPointRecordCompressor<W: Write> {
    field_compressors: Vec<Box<dyn LayeredFieldCompressor<W> + Send>>,
    point_size: usize,
    point_count: u32,
    context: usize,
    dst: W,
}

impl<W: Write> LayeredPointRecordCompressor<W> {
    pub fn new(dst: W) -> Self {
        Self {
            field_compressors: vec![],
            point_size: 0,
            point_count: 0,
            context: 0,
            dst,
        }
    }

    pub fn add_field_compressor<T: 'static + LayeredFieldCompressor<W> + Send>(
        &mut self,
        field: T,
    ) {
        self.point_size += field.size_of_field();
        self.field_compressors.push(Box::new(field));
    }
}

impl<W: Write> RecordCompressor<W> for LayeredPointRecordCompressor<W> {
    fn set_fields_from(&mut self, laz_items: &[LazItem]) -> crate::Result<()> {
        for item in laz_items {
            match (item.item_type, item.version) {
                (LazItemType::Point14, 3) => {
                    self.add_field_compressor(las::v3::Point14Compressor::default())
                }
                (LazItemType::RGB14, 3) => {
                    self.add_field_compressor(las::v3::RGBCompressor::default())
                }
                (LazItemType::RGBNIR14, 3) => {
                    self.add_field_compressor(las::v3::RGBCompressor::default());
                    self.add_field_compressor(las::v3::NirCompressor::default());
                }
                (LazItemType::WavePacket14, 3) => {
                    self.add_field_compressor(las::v3::WavepacketCompressor::default())
                }
                (LazItemType::Byte14(count), 3) => {
                    self.add_field_compressor(las::v3::ExtraBytesCompressor::new(count as usize))
                }
                (item_type, version) => {
                    return Err(LasZipError::UnsupportedLazItemVersion(item_type, version));
                }
            }
        }
        Ok(())
    }

    fn record_size(&self) -> usize {
        self.point_size
    }

    fn compress_next(&mut self, point: &[u8]) -> crate::Result<()> {
        check_point_buffer(point.len(), self.point_size)?;
        let mut field_start = 0;
        if self.point_count == 0 {
            for compressor in &mut self.field_compressors {
                let field_end = field_start + compressor.size_of_field();
                compressor.init_first_point(
                    &mut self.dst,
                    &point[field_start..field_end],
                    &mut self.context,
                )?;
                field_start = field_end;
            }
        } else {
            for compressor in &mut self.field_compressors {
                let field_end = field_start + compressor.size_of_field();
                compressor.compress_field_with(&point[field_start..field_end], &mut self.context)?;
                field_start = field_end;
            }
        }
        self.point_count += 1;
        Ok(())
    }

    fn done(&mut self) -> crate::Result<()> {
        if self.point_count > 0 {
            self.dst.write_u32::<LittleEndian>(self.point_count)?;
            for compressor in &mut self.field_compressors {
                compressor.write_layers_sizes(&mut self.dst)?;
            }
            for compressor in &mut self.field_compressors {
                compressor.write_layers(&mut self.dst)?;
            }
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.point_count = 0;
        self.context = 0;
    }

    fn get_mut(&mut self) -> &mut W {
        &mut self.dst
    }

    fn get(&self) -> &W {
        &self.dst
    }

    fn box_into_inner(self: Box<Self>) -> W {
        self.dst
    }
}
