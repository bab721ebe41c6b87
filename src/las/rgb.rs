/*
===============================================================================

  PROGRAMMERS:

    martin.isenburg@rapidlasso.com  -  http://rapidlasso.com
    uday.karan@gmail.com - Hobu, Inc.

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality
    (c) 2014, Uday Verma, Hobu, Inc.
    (c) 2019, Thomas Montaigu

    This is free software; you can redistribute and/or modify it under the
    terms of the GNU Lesser General Licence as published by the Free Software
    Foundation. See the COPYING file for more information.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

  CHANGE HISTORY:
    6 June 2019: Translated to Rust
===============================================================================
*/

//! Compression of the RGB item, the three 16 bit colour channels
//! of point formats 2, 3, 5, 7 and 8.

use crate::packers::Packable;

#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct RGB {
    pub red: u16,
    pub green: u16,
    pub blue: u16,
}

impl RGB {
    pub const SIZE: usize = 6;
}

impl Packable for RGB {
    type Type = RGB;

    fn unpack_from(input: &[u8]) -> Self::Type {
        Self {
            red: u16::unpack_from(&input[0..2]),
            green: u16::unpack_from(&input[2..4]),
            blue: u16::unpack_from(&input[4..6]),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.red.pack_into(&mut output[0..2]);
        self.green.pack_into(&mut output[2..4]);
        self.blue.pack_into(&mut output[4..6]);
    }
}

/// Which bytes of the colour changed, bit 6 (only used since version 2)
/// tells that the channels of the current colour are not all equal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct ColorDiff(u8);

impl ColorDiff {
    fn from_points(current: &RGB, last: &RGB) -> Self {
        use crate::las::utils::{lower_byte_changed as lbc, upper_byte_changed as ubc};
        let v = (lbc(last.red, current.red) as u8)
            | (ubc(last.red, current.red) as u8) << 1
            | (lbc(last.green, current.green) as u8) << 2
            | (ubc(last.green, current.green) as u8) << 3
            | (lbc(last.blue, current.blue) as u8) << 4
            | (ubc(last.blue, current.blue) as u8) << 5
            | ((current.red != current.green || current.red != current.blue) as u8) << 6;
        ColorDiff(v)
    }

    fn lower_red_byte_changed(self) -> bool {
        is_nth_bit_set!(self.0, 0)
    }

    fn upper_red_byte_changed(self) -> bool {
        is_nth_bit_set!(self.0, 1)
    }

    fn lower_green_byte_changed(self) -> bool {
        is_nth_bit_set!(self.0, 2)
    }

    fn upper_green_byte_changed(self) -> bool {
        is_nth_bit_set!(self.0, 3)
    }

    fn lower_blue_byte_changed(self) -> bool {
        is_nth_bit_set!(self.0, 4)
    }

    fn upper_blue_byte_changed(self) -> bool {
        is_nth_bit_set!(self.0, 5)
    }

    fn channels_differ(self) -> bool {
        is_nth_bit_set!(self.0, 6)
    }
}

pub mod v1 {
    //! Contains the implementation for the Version 1 of the RGB Compression / Decompression
    //!
    //! The algorithm is pretty simple:
    //!
    //! - Each bytes of each color components are encoded separately with their own context.
    //! - A byte is compressed only if it has changed
    //! - A u8 symbol is first encoded with the information on which byte changed or not
    use std::io::{Read, Write};

    use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::{lower_byte, read_and_unpack, upper_byte};
    use crate::models::{ModelArena, SymbolModelId};
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    use super::{ColorDiff, RGB};

    const LOWER_RED_BYTE_CONTEXT: u32 = 0;
    const UPPER_RED_BYTE_CONTEXT: u32 = 1;
    const LOWER_GREEN_BYTE_CONTEXT: u32 = 2;
    const UPPER_GREEN_BYTE_CONTEXT: u32 = 3;
    const LOWER_BLUE_BYTE_CONTEXT: u32 = 4;
    const UPPER_BLUE_BYTE_CONTEXT: u32 = 5;

    pub struct RGBCompressor {
        last: RGB,
        byte_used_model: SymbolModelId,
        compressor: IntegerCompressor,
    }

    impl RGBCompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last: RGB::default(),
                byte_used_model: models.add_symbol_model(64)?,
                compressor: IntegerCompressorBuilder::new()
                    .bits(8) // 8 bits, because we encode byte by byte
                    .contexts(6) // there are 6 bytes in a RGB component
                    .build_in(models)?,
            })
        }

        fn compress_byte<W: Write>(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            last: u8,
            current: u8,
            context: u32,
        ) -> crate::Result<()> {
            self.compressor
                .compress(encoder, i32::from(last), i32::from(current), context)
        }
    }

    impl<W: Write> FieldCompressor<W> for RGBCompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()> {
            self.last = RGB::unpack_from(buf);
            dst.write_all(&buf[..RGB::SIZE])?;
            Ok(())
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> crate::Result<()> {
            let current = RGB::unpack_from(buf);
            let last = self.last;
            // bit 6 is not part of this version
            let color_diff = ColorDiff(ColorDiff::from_points(&current, &last).0 & 0x3F);
            encoder.encode_symbol(self.byte_used_model, u32::from(color_diff.0))?;

            if color_diff.lower_red_byte_changed() {
                self.compress_byte(
                    encoder,
                    lower_byte(last.red),
                    lower_byte(current.red),
                    LOWER_RED_BYTE_CONTEXT,
                )?;
            }
            if color_diff.upper_red_byte_changed() {
                self.compress_byte(
                    encoder,
                    upper_byte(last.red),
                    upper_byte(current.red),
                    UPPER_RED_BYTE_CONTEXT,
                )?;
            }
            if color_diff.lower_green_byte_changed() {
                self.compress_byte(
                    encoder,
                    lower_byte(last.green),
                    lower_byte(current.green),
                    LOWER_GREEN_BYTE_CONTEXT,
                )?;
            }
            if color_diff.upper_green_byte_changed() {
                self.compress_byte(
                    encoder,
                    upper_byte(last.green),
                    upper_byte(current.green),
                    UPPER_GREEN_BYTE_CONTEXT,
                )?;
            }
            if color_diff.lower_blue_byte_changed() {
                self.compress_byte(
                    encoder,
                    lower_byte(last.blue),
                    lower_byte(current.blue),
                    LOWER_BLUE_BYTE_CONTEXT,
                )?;
            }
            if color_diff.upper_blue_byte_changed() {
                self.compress_byte(
                    encoder,
                    upper_byte(last.blue),
                    upper_byte(current.blue),
                    UPPER_BLUE_BYTE_CONTEXT,
                )?;
            }
            self.last = current;
            Ok(())
        }
    }

    pub struct RGBDecompressor {
        last: RGB,
        byte_used_model: SymbolModelId,
        decompressor: IntegerDecompressor,
    }

    impl RGBDecompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last: RGB::default(),
                byte_used_model: models.add_symbol_model(64)?,
                decompressor: IntegerDecompressorBuilder::new()
                    .bits(8)
                    .contexts(6)
                    .build_in(models)?,
            })
        }

        /// Decodes the byte if it changed, otherwise keeps the last one
        fn decompress_byte<R: Read>(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            changed: bool,
            last: u8,
            context: u32,
        ) -> crate::Result<u16> {
            if changed {
                let value = self
                    .decompressor
                    .decompress(decoder, i32::from(last), context)?;
                Ok(u16::from(value as u8))
            } else {
                Ok(u16::from(last))
            }
        }
    }

    impl<R: Read> FieldDecompressor<R> for RGBDecompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()> {
            self.last = read_and_unpack::<_, RGB>(src, &mut first_point[..RGB::SIZE])?;
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> crate::Result<()> {
            let color_diff = ColorDiff(decoder.decode_symbol(self.byte_used_model)? as u8);
            let last = self.last;

            let red = self.decompress_byte(
                decoder,
                color_diff.lower_red_byte_changed(),
                lower_byte(last.red),
                LOWER_RED_BYTE_CONTEXT,
            )? | self.decompress_byte(
                decoder,
                color_diff.upper_red_byte_changed(),
                upper_byte(last.red),
                UPPER_RED_BYTE_CONTEXT,
            )? << 8;
            let green = self.decompress_byte(
                decoder,
                color_diff.lower_green_byte_changed(),
                lower_byte(last.green),
                LOWER_GREEN_BYTE_CONTEXT,
            )? | self.decompress_byte(
                decoder,
                color_diff.upper_green_byte_changed(),
                upper_byte(last.green),
                UPPER_GREEN_BYTE_CONTEXT,
            )? << 8;
            let blue = self.decompress_byte(
                decoder,
                color_diff.lower_blue_byte_changed(),
                lower_byte(last.blue),
                LOWER_BLUE_BYTE_CONTEXT,
            )? | self.decompress_byte(
                decoder,
                color_diff.upper_blue_byte_changed(),
                upper_byte(last.blue),
                UPPER_BLUE_BYTE_CONTEXT,
            )? << 8;

            self.last = RGB { red, green, blue };
            self.last.pack_into(buf);
            Ok(())
        }
    }
}

pub mod v2 {
    //! Contains the implementation for the Version 2 of the RGB Compression / Decompression
    //!
    //! Red bytes are coded as differences to the last red, green and blue
    //! are predicted from the red difference. Greys only cost the red channel.
    use std::io::{Read, Write};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::{lower_byte, read_and_unpack, u8_clamp, upper_byte};
    use crate::models::{ModelArena, SymbolModelId};
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    use super::{ColorDiff, RGB};

    #[derive(Copy, Clone)]
    pub(crate) struct RGBModels {
        byte_used: SymbolModelId,
        lower_red_byte: SymbolModelId,
        upper_red_byte: SymbolModelId,
        lower_green_byte: SymbolModelId,
        upper_green_byte: SymbolModelId,
        lower_blue_byte: SymbolModelId,
        upper_blue_byte: SymbolModelId,
    }

    impl RGBModels {
        pub(crate) fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                byte_used: models.add_symbol_model(128)?,
                lower_red_byte: models.add_symbol_model(256)?,
                upper_red_byte: models.add_symbol_model(256)?,
                lower_green_byte: models.add_symbol_model(256)?,
                upper_green_byte: models.add_symbol_model(256)?,
                lower_blue_byte: models.add_symbol_model(256)?,
                upper_blue_byte: models.add_symbol_model(256)?,
            })
        }
    }

    /// Compresses `current` against `last`, returns the symbol
    /// telling which bytes changed.
    pub(crate) fn compress_rgb_using<W: Write>(
        encoder: &mut ArithmeticEncoder<W>,
        models: &RGBModels,
        current: &RGB,
        last: &RGB,
    ) -> crate::Result<u8> {
        let mut diff_l = 0i32;
        let mut diff_h = 0i32;

        let color_diff = ColorDiff::from_points(current, last);
        encoder.encode_symbol(models.byte_used, u32::from(color_diff.0))?;

        if color_diff.lower_red_byte_changed() {
            diff_l = i32::from(lower_byte(current.red)) - i32::from(lower_byte(last.red));
            encoder.encode_symbol(models.lower_red_byte, u32::from(diff_l as u8))?;
        }
        if color_diff.upper_red_byte_changed() {
            diff_h = i32::from(upper_byte(current.red)) - i32::from(upper_byte(last.red));
            encoder.encode_symbol(models.upper_red_byte, u32::from(diff_h as u8))?;
        }

        if color_diff.channels_differ() {
            if color_diff.lower_green_byte_changed() {
                let corr = i32::from(lower_byte(current.green))
                    - i32::from(u8_clamp(diff_l + i32::from(lower_byte(last.green))));
                encoder.encode_symbol(models.lower_green_byte, u32::from(corr as u8))?;
            }
            if color_diff.lower_blue_byte_changed() {
                diff_l = (diff_l + i32::from(lower_byte(current.green))
                    - i32::from(lower_byte(last.green)))
                    / 2;
                let corr = i32::from(lower_byte(current.blue))
                    - i32::from(u8_clamp(diff_l + i32::from(lower_byte(last.blue))));
                encoder.encode_symbol(models.lower_blue_byte, u32::from(corr as u8))?;
            }
            if color_diff.upper_green_byte_changed() {
                let corr = i32::from(upper_byte(current.green))
                    - i32::from(u8_clamp(diff_h + i32::from(upper_byte(last.green))));
                encoder.encode_symbol(models.upper_green_byte, u32::from(corr as u8))?;
            }
            if color_diff.upper_blue_byte_changed() {
                diff_h = (diff_h + i32::from(upper_byte(current.green))
                    - i32::from(upper_byte(last.green)))
                    / 2;
                let corr = i32::from(upper_byte(current.blue))
                    - i32::from(u8_clamp(diff_h + i32::from(upper_byte(last.blue))));
                encoder.encode_symbol(models.upper_blue_byte, u32::from(corr as u8))?;
            }
        }
        Ok(color_diff.0)
    }

    pub(crate) fn decompress_rgb_using<R: Read>(
        decoder: &mut ArithmeticDecoder<R>,
        models: &RGBModels,
        last: &RGB,
    ) -> crate::Result<RGB> {
        let color_diff = ColorDiff(decoder.decode_symbol(models.byte_used)? as u8);
        let mut this_val = RGB::default();

        if color_diff.lower_red_byte_changed() {
            let corr = decoder.decode_symbol(models.lower_red_byte)? as u8;
            this_val.red = u16::from(corr.wrapping_add(lower_byte(last.red)));
        } else {
            this_val.red = last.red & 0x00FF;
        }
        if color_diff.upper_red_byte_changed() {
            let corr = decoder.decode_symbol(models.upper_red_byte)? as u8;
            this_val.red |= u16::from(corr.wrapping_add(upper_byte(last.red))) << 8;
        } else {
            this_val.red |= last.red & 0xFF00;
        }

        if color_diff.channels_differ() {
            let mut diff =
                i32::from(lower_byte(this_val.red)) - i32::from(lower_byte(last.red));
            if color_diff.lower_green_byte_changed() {
                let corr = decoder.decode_symbol(models.lower_green_byte)? as u8;
                this_val.green = u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(lower_byte(last.green)))),
                );
            } else {
                this_val.green = last.green & 0x00FF;
            }
            if color_diff.lower_blue_byte_changed() {
                let corr = decoder.decode_symbol(models.lower_blue_byte)? as u8;
                diff = (diff + i32::from(lower_byte(this_val.green))
                    - i32::from(lower_byte(last.green)))
                    / 2;
                this_val.blue = u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(lower_byte(last.blue)))),
                );
            } else {
                this_val.blue = last.blue & 0x00FF;
            }

            diff = i32::from(upper_byte(this_val.red)) - i32::from(upper_byte(last.red));
            if color_diff.upper_green_byte_changed() {
                let corr = decoder.decode_symbol(models.upper_green_byte)? as u8;
                this_val.green |= u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(upper_byte(last.green)))),
                ) << 8;
            } else {
                this_val.green |= last.green & 0xFF00;
            }
            if color_diff.upper_blue_byte_changed() {
                let corr = decoder.decode_symbol(models.upper_blue_byte)? as u8;
                diff = (diff + i32::from(upper_byte(this_val.green))
                    - i32::from(upper_byte(last.green)))
                    / 2;
                this_val.blue |= u16::from(
                    corr.wrapping_add(u8_clamp(diff + i32::from(upper_byte(last.blue)))),
                ) << 8;
            } else {
                this_val.blue |= last.blue & 0xFF00;
            }
        } else {
            this_val.green = this_val.red;
            this_val.blue = this_val.red;
        }
        Ok(this_val)
    }

    pub struct RGBCompressor {
        last: RGB,
        models: RGBModels,
    }

    impl RGBCompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last: RGB::default(),
                models: RGBModels::new(models)?,
            })
        }
    }

    impl<W: Write> FieldCompressor<W> for RGBCompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()> {
            self.last = RGB::unpack_from(buf);
            dst.write_all(&buf[..RGB::SIZE])?;
            Ok(())
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> crate::Result<()> {
            let current = RGB::unpack_from(buf);
            compress_rgb_using(encoder, &self.models, &current, &self.last)?;
            self.last = current;
            Ok(())
        }
    }

    pub struct RGBDecompressor {
        last: RGB,
        models: RGBModels,
    }

    impl RGBDecompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last: RGB::default(),
                models: RGBModels::new(models)?,
            })
        }
    }

    impl<R: Read> FieldDecompressor<R> for RGBDecompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()> {
            self.last = read_and_unpack::<_, RGB>(src, &mut first_point[..RGB::SIZE])?;
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> crate::Result<()> {
            self.last = decompress_rgb_using(decoder, &self.models, &self.last)?;
            self.last.pack_into(buf);
            Ok(())
        }
    }
}

pub mod v3 {
    //! Contains the implementation for the Version 3 of the RGB Compression / Decompression
    //!
    //! The version 3 of the compression / decompression algorithm
    //! is the same as the version 2, but with the support for the contexts system,
    //! the colours of a chunk are stored in their own layer.
    use std::io::{Cursor, Read, Write};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::{
        read_and_unpack, read_layer, read_layer_size, reset_layer_decoder, reset_layer_encoder,
        write_layer, write_layer_size,
    };
    use crate::models::ModelArena;
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    use super::v2::{compress_rgb_using, decompress_rgb_using, RGBModels};
    use super::RGB;

    #[derive(Default, Copy, Clone)]
    struct RGBContext {
        models: Option<RGBModels>,
        last: RGB,
        unused: bool,
    }

    /// The 4 contexts of the layer, the models of a context
    /// are only created the first time a point uses it.
    #[derive(Default)]
    struct RGBContexts {
        contexts: [RGBContext; 4],
        last_context_used: usize,
    }

    impl RGBContexts {
        fn init_with(&mut self, first: RGB, context: usize, models: &mut ModelArena) -> crate::Result<()> {
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.activate(context, first, models)?;
            self.last_context_used = context;
            Ok(())
        }

        fn activate(&mut self, context: usize, last: RGB, models: &mut ModelArena) -> crate::Result<()> {
            let ctx = &mut self.contexts[context];
            if ctx.models.is_none() {
                ctx.models = Some(RGBModels::new(models)?);
            }
            ctx.last = last;
            ctx.unused = false;
            Ok(())
        }

        /// Switches to `context`, returns the models to use and
        /// the index of the context holding the value to predict from
        fn switch_to(
            &mut self,
            context: usize,
            models: &mut ModelArena,
        ) -> crate::Result<(RGBModels, usize)> {
            let mut last_index = self.last_context_used;
            if last_index != context {
                self.last_context_used = context;
                if self.contexts[context].unused {
                    let last = self.contexts[last_index].last;
                    self.activate(context, last, models)?;
                    last_index = context;
                }
            }
            match self.contexts[context].models {
                Some(rgb_models) => Ok((rgb_models, last_index)),
                None => {
                    let rgb_models = RGBModels::new(models)?;
                    self.contexts[context].models = Some(rgb_models);
                    Ok((rgb_models, last_index))
                }
            }
        }
    }

    pub struct RGBCompressor {
        encoder: ArithmeticEncoder<Cursor<Vec<u8>>>,
        rgb_has_changed: bool,
        contexts: RGBContexts,
    }

    impl Default for RGBCompressor {
        fn default() -> Self {
            Self {
                encoder: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                rgb_has_changed: false,
                contexts: RGBContexts::default(),
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for RGBCompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            reset_layer_encoder(&mut self.encoder);
            self.rgb_has_changed = false;
            dst.write_all(&first_point[..RGB::SIZE])?;
            self.contexts.init_with(
                RGB::unpack_from(first_point),
                *context,
                self.encoder.models_mut(),
            )
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let current = RGB::unpack_from(current_point);
            let (models, last_index) =
                self.contexts.switch_to(*context, self.encoder.models_mut())?;
            let last = self.contexts.contexts[last_index].last;
            if last != current {
                self.rgb_has_changed = true;
            }
            compress_rgb_using(&mut self.encoder, &models, &current, &last)?;
            self.contexts.contexts[last_index].last = current;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()> {
            write_layer_size(&mut self.encoder, self.rgb_has_changed, dst)
        }

        fn write_layers(&mut self, dst: &mut W) -> crate::Result<()> {
            write_layer(&self.encoder, self.rgb_has_changed, dst)
        }
    }

    pub struct RGBDecompressor {
        decoder: ArithmeticDecoder<Cursor<Vec<u8>>>,
        changed_rgb: bool,
        layer_size: usize,
        contexts: RGBContexts,
    }

    impl Default for RGBDecompressor {
        fn default() -> Self {
            Self {
                decoder: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                changed_rgb: false,
                layer_size: 0,
                contexts: RGBContexts::default(),
            }
        }
    }

    impl<R: Read> LayeredFieldDecompressor<R> for RGBDecompressor {
        fn size_of_field(&self) -> usize {
            RGB::SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            reset_layer_decoder(&mut self.decoder);
            let first = read_and_unpack::<_, RGB>(src, &mut first_point[..RGB::SIZE])?;
            self.contexts
                .init_with(first, *context, self.decoder.models_mut())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let (models, last_index) =
                self.contexts.switch_to(*context, self.decoder.models_mut())?;
            let last = &mut self.contexts.contexts[last_index].last;
            if self.changed_rgb {
                *last = decompress_rgb_using(&mut self.decoder, &models, last)?;
            }
            last.pack_into(current_point);
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()> {
            self.layer_size = read_layer_size(src)?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> crate::Result<()> {
            self.changed_rgb = read_layer(src, self.layer_size, &mut self.decoder)?;
            Ok(())
        }
    }
}
