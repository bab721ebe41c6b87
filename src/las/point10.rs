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

//! Compression of the Point10 item, the 20 bytes shared by LAS point formats 0 to 5.

use crate::packers::Packable;

#[derive(Default, Copy, Clone, PartialEq, Debug)]
pub struct Point10 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,

    // 3 bits
    pub return_number: u8,
    // 3 bits
    pub number_of_returns_of_given_pulse: u8,
    // 1 bit
    pub scan_direction_flag: bool,
    // 1 bit
    pub edge_of_flight_line: bool,

    // 5 bits for classification the rest are bit flags
    pub classification: u8,

    pub scan_angle_rank: i8,
    pub user_data: u8,
    pub point_source_id: u16,
}

impl Point10 {
    pub const SIZE: usize = 20;

    pub fn populate_bit_fields_from(&mut self, byte: u8) {
        self.return_number = byte & 0x7;
        self.number_of_returns_of_given_pulse = (byte >> 3) & 0x7;
        self.scan_direction_flag = ((byte >> 6) & 0x1) != 0;
        self.edge_of_flight_line = ((byte >> 7) & 0x1) != 0;
    }

    pub fn bit_fields_to_byte(&self) -> u8 {
        let a = self.return_number;
        let b = self.number_of_returns_of_given_pulse;
        let c = self.scan_direction_flag as u8;
        let d = self.edge_of_flight_line as u8;

        ((d & 0x1) << 7) | (c & 0x1) << 6 | (b & 0x7) << 3 | (a & 0x7)
    }
}

impl Packable for Point10 {
    type Type = Point10;

    fn unpack_from(input: &[u8]) -> Self::Type {
        let mut point = Point10 {
            x: i32::unpack_from(&input[0..4]),
            y: i32::unpack_from(&input[4..8]),
            z: i32::unpack_from(&input[8..12]),
            intensity: u16::unpack_from(&input[12..14]),
            classification: input[15],
            scan_angle_rank: i8::unpack_from(&input[16..17]),
            user_data: input[17],
            point_source_id: u16::unpack_from(&input[18..20]),
            ..Default::default()
        };
        point.populate_bit_fields_from(input[14]);
        point
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.x.pack_into(&mut output[0..4]);
        self.y.pack_into(&mut output[4..8]);
        self.z.pack_into(&mut output[8..12]);
        self.intensity.pack_into(&mut output[12..14]);
        output[14] = self.bit_fields_to_byte();
        output[15] = self.classification;
        self.scan_angle_rank.pack_into(&mut output[16..17]);
        output[17] = self.user_data;
        self.point_source_id.pack_into(&mut output[18..20]);
    }
}

pub mod v1 {
    use std::io::{Read, Write};

    use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::read_and_unpack;
    use crate::models::{ModelArena, SymbolModelId};
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    use super::Point10;

    /// find median difference from 3 preceding differences
    fn median_diff(diff_array: &[i32; 3]) -> i32 {
        if diff_array[0] < diff_array[1] {
            if diff_array[1] < diff_array[2] {
                diff_array[1]
            } else if diff_array[0] < diff_array[2] {
                diff_array[2]
            } else {
                diff_array[0]
            }
        } else if diff_array[0] < diff_array[2] {
            diff_array[0]
        } else if diff_array[1] < diff_array[2] {
            diff_array[2]
        } else {
            diff_array[1]
        }
    }

    #[derive(Copy, Clone, Default)]
    struct Point10ChangedValues(u32);

    impl Point10ChangedValues {
        fn from_points(current: &Point10, last: &Point10) -> Self {
            Self(
                ((last.intensity != current.intensity) as u32) << 5
                    | ((last.bit_fields_to_byte() != current.bit_fields_to_byte()) as u32) << 4
                    | ((last.classification != current.classification) as u32) << 3
                    | ((last.scan_angle_rank != current.scan_angle_rank) as u32) << 2
                    | ((last.user_data != current.user_data) as u32) << 1
                    | (last.point_source_id != current.point_source_id) as u32,
            )
        }

        fn intensity_changed(self) -> bool {
            is_nth_bit_set!(self.0, 5)
        }

        fn bit_fields_changed(self) -> bool {
            is_nth_bit_set!(self.0, 4)
        }

        fn classification_changed(self) -> bool {
            is_nth_bit_set!(self.0, 3)
        }

        fn scan_angle_rank_changed(self) -> bool {
            is_nth_bit_set!(self.0, 2)
        }

        fn user_data_changed(self) -> bool {
            is_nth_bit_set!(self.0, 1)
        }

        fn point_source_id_changed(self) -> bool {
            is_nth_bit_set!(self.0, 0)
        }
    }

    /// Prediction state shared by the compressor and the decompressor
    struct Common {
        last: Point10,
        last_x_diffs: [i32; 3],
        last_y_diffs: [i32; 3],
        last_incr: usize,

        changed_values_model: SymbolModelId,
        // 256 slots each, the models are only created when first needed
        bit_byte_models: Vec<Option<SymbolModelId>>,
        classification_models: Vec<Option<SymbolModelId>>,
        user_data_models: Vec<Option<SymbolModelId>>,
    }

    impl Common {
        fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last: Point10::default(),
                last_x_diffs: [0i32; 3],
                last_y_diffs: [0i32; 3],
                last_incr: 0,
                changed_values_model: models.add_symbol_model(64)?,
                bit_byte_models: vec![None; 256],
                classification_models: vec![None; 256],
                user_data_models: vec![None; 256],
            })
        }

        fn reset_with(&mut self, first: Point10) {
            self.last = first;
            self.last_x_diffs = [0i32; 3];
            self.last_y_diffs = [0i32; 3];
            self.last_incr = 0;
        }

        fn record_diffs(&mut self, x_diff: i32, y_diff: i32) {
            self.last_x_diffs[self.last_incr] = x_diff;
            self.last_y_diffs[self.last_incr] = y_diff;
            self.last_incr += 1;
            if self.last_incr > 2 {
                self.last_incr = 0;
            }
        }
    }

    pub struct Point10Compressor {
        common: Common,
        ic_dx: IntegerCompressor,
        ic_dy: IntegerCompressor,
        ic_z: IntegerCompressor,
        ic_intensity: IntegerCompressor,
        ic_scan_angle_rank: IntegerCompressor,
        ic_point_source_id: IntegerCompressor,
    }

    impl Point10Compressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                common: Common::new(models)?,
                ic_dx: IntegerCompressorBuilder::new().bits(32).build_in(models)?,
                ic_dy: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(20)
                    .build_in(models)?,
                ic_z: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(20)
                    .build_in(models)?,
                ic_intensity: IntegerCompressorBuilder::new().bits(16).build_in(models)?,
                ic_scan_angle_rank: IntegerCompressorBuilder::new()
                    .bits(8)
                    .contexts(2)
                    .build_in(models)?,
                ic_point_source_id: IntegerCompressorBuilder::new().bits(16).build_in(models)?,
            })
        }
    }

    impl<W: Write> FieldCompressor<W> for Point10Compressor {
        fn size_of_field(&self) -> usize {
            Point10::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()> {
            dst.write_all(&buf[..Point10::SIZE])?;
            self.common.reset_with(Point10::unpack_from(buf));
            Ok(())
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> crate::Result<()> {
            let current = Point10::unpack_from(buf);
            let last = self.common.last;
            let median_x = median_diff(&self.common.last_x_diffs);
            let median_y = median_diff(&self.common.last_y_diffs);

            let x_diff = current.x.wrapping_sub(last.x);
            let y_diff = current.y.wrapping_sub(last.y);

            self.ic_dx.compress(encoder, median_x, x_diff, 0)?;
            // the number k of corrector bits selects the contexts
            let k_bits = self.ic_dx.k();
            self.ic_dy.compress(encoder, median_y, y_diff, k_bits.min(19))?;
            let k_bits = (k_bits + self.ic_dy.k()) / 2;
            self.ic_z.compress(encoder, last.z, current.z, k_bits.min(19))?;

            let changed_values = Point10ChangedValues::from_points(&current, &last);
            encoder.encode_symbol(self.common.changed_values_model, changed_values.0)?;

            if changed_values.intensity_changed() {
                self.ic_intensity.compress(
                    encoder,
                    i32::from(last.intensity),
                    i32::from(current.intensity),
                    0,
                )?;
            }

            if changed_values.bit_fields_changed() {
                let slot = &mut self.common.bit_byte_models[last.bit_fields_to_byte() as usize];
                let model = encoder.models_mut().lazy_symbol_model(slot, 256)?;
                encoder.encode_symbol(model, u32::from(current.bit_fields_to_byte()))?;
            }

            if changed_values.classification_changed() {
                let slot = &mut self.common.classification_models[last.classification as usize];
                let model = encoder.models_mut().lazy_symbol_model(slot, 256)?;
                encoder.encode_symbol(model, u32::from(current.classification))?;
            }

            if changed_values.scan_angle_rank_changed() {
                self.ic_scan_angle_rank.compress(
                    encoder,
                    i32::from(last.scan_angle_rank),
                    i32::from(current.scan_angle_rank),
                    (k_bits < 3) as u32,
                )?;
            }

            if changed_values.user_data_changed() {
                let slot = &mut self.common.user_data_models[last.user_data as usize];
                let model = encoder.models_mut().lazy_symbol_model(slot, 256)?;
                encoder.encode_symbol(model, u32::from(current.user_data))?;
            }

            if changed_values.point_source_id_changed() {
                self.ic_point_source_id.compress(
                    encoder,
                    i32::from(last.point_source_id),
                    i32::from(current.point_source_id),
                    0,
                )?;
            }

            self.common.record_diffs(x_diff, y_diff);
            self.common.last = current;
            Ok(())
        }
    }

    pub struct Point10Decompressor {
        common: Common,
        ic_dx: IntegerDecompressor,
        ic_dy: IntegerDecompressor,
        ic_z: IntegerDecompressor,
        ic_intensity: IntegerDecompressor,
        ic_scan_angle_rank: IntegerDecompressor,
        ic_point_source_id: IntegerDecompressor,
    }

    impl Point10Decompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                common: Common::new(models)?,
                ic_dx: IntegerDecompressorBuilder::new().bits(32).build_in(models)?,
                ic_dy: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(20)
                    .build_in(models)?,
                ic_z: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(20)
                    .build_in(models)?,
                ic_intensity: IntegerDecompressorBuilder::new().bits(16).build_in(models)?,
                ic_scan_angle_rank: IntegerDecompressorBuilder::new()
                    .bits(8)
                    .contexts(2)
                    .build_in(models)?,
                ic_point_source_id: IntegerDecompressorBuilder::new()
                    .bits(16)
                    .build_in(models)?,
            })
        }
    }

    impl<R: Read> FieldDecompressor<R> for Point10Decompressor {
        fn size_of_field(&self) -> usize {
            Point10::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()> {
            let first = read_and_unpack::<_, Point10>(src, &mut first_point[..Point10::SIZE])?;
            self.common.reset_with(first);
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> crate::Result<()> {
            let median_x = median_diff(&self.common.last_x_diffs);
            let median_y = median_diff(&self.common.last_y_diffs);

            let x_diff = self.ic_dx.decompress(decoder, median_x, 0)?;
            let k_bits = self.ic_dx.k();
            let y_diff = self.ic_dy.decompress(decoder, median_y, k_bits.min(19))?;
            let k_bits = (k_bits + self.ic_dy.k()) / 2;

            let last = &mut self.common.last;
            last.x = last.x.wrapping_add(x_diff);
            last.y = last.y.wrapping_add(y_diff);
            last.z = self.ic_z.decompress(decoder, last.z, k_bits.min(19))?;

            let changed_values =
                Point10ChangedValues(decoder.decode_symbol(self.common.changed_values_model)?);

            if changed_values.intensity_changed() {
                last.intensity =
                    self.ic_intensity
                        .decompress(decoder, i32::from(last.intensity), 0)? as u16;
            }

            if changed_values.bit_fields_changed() {
                let slot = &mut self.common.bit_byte_models[last.bit_fields_to_byte() as usize];
                let model = decoder.models_mut().lazy_symbol_model(slot, 256)?;
                last.populate_bit_fields_from(decoder.decode_symbol(model)? as u8);
            }

            if changed_values.classification_changed() {
                let slot = &mut self.common.classification_models[last.classification as usize];
                let model = decoder.models_mut().lazy_symbol_model(slot, 256)?;
                last.classification = decoder.decode_symbol(model)? as u8;
            }

            if changed_values.scan_angle_rank_changed() {
                last.scan_angle_rank = self.ic_scan_angle_rank.decompress(
                    decoder,
                    i32::from(last.scan_angle_rank),
                    (k_bits < 3) as u32,
                )? as i8;
            }

            if changed_values.user_data_changed() {
                let slot = &mut self.common.user_data_models[last.user_data as usize];
                let model = decoder.models_mut().lazy_symbol_model(slot, 256)?;
                last.user_data = decoder.decode_symbol(model)? as u8;
            }

            if changed_values.point_source_id_changed() {
                last.point_source_id = self.ic_point_source_id.decompress(
                    decoder,
                    i32::from(last.point_source_id),
                    0,
                )? as u16;
            }

            last.pack_into(buf);
            self.common.record_diffs(x_diff, y_diff);
            Ok(())
        }
    }
}

pub mod v2 {
    use std::io::{Read, Write};

    use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::{
        read_and_unpack, u32_zero_bit, StreamingMedian, NUMBER_RETURN_LEVEL, NUMBER_RETURN_MAP,
    };
    use crate::models::{ModelArena, SymbolModelId};
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    use super::Point10;

    /// Compared to version 1, the flag bits used for
    /// the intensity & bit_fields have been swapped
    #[derive(Copy, Clone)]
    struct Point10ChangedValues(u32);

    impl Point10ChangedValues {
        fn from_points(current: &Point10, last: &Point10, last_intensity: u16) -> Self {
            let bit_fields_changed = (last.return_number != current.return_number)
                | (last.number_of_returns_of_given_pulse
                    != current.number_of_returns_of_given_pulse)
                | (last.scan_direction_flag != current.scan_direction_flag)
                | (last.edge_of_flight_line != current.edge_of_flight_line);

            Self(
                (bit_fields_changed as u32) << 5
                    | ((last_intensity != current.intensity) as u32) << 4
                    | ((last.classification != current.classification) as u32) << 3
                    | ((last.scan_angle_rank != current.scan_angle_rank) as u32) << 2
                    | ((last.user_data != current.user_data) as u32) << 1
                    | (last.point_source_id != current.point_source_id) as u32,
            )
        }

        fn bit_fields_changed(self) -> bool {
            is_nth_bit_set!(self.0, 5)
        }

        fn intensity_changed(self) -> bool {
            is_nth_bit_set!(self.0, 4)
        }

        fn classification_changed(self) -> bool {
            is_nth_bit_set!(self.0, 3)
        }

        fn scan_angle_rank_changed(self) -> bool {
            is_nth_bit_set!(self.0, 2)
        }

        fn user_data_changed(self) -> bool {
            is_nth_bit_set!(self.0, 1)
        }

        fn point_source_id_changed(self) -> bool {
            is_nth_bit_set!(self.0, 0)
        }
    }

    // All the things we need to compress a point, group them into structs
    // so we don't have too many names flying around
    struct Common {
        last_point: Point10,
        last_intensity: [u16; 16],

        last_x_diff_median: [StreamingMedian<i32>; 16],
        last_y_diff_median: [StreamingMedian<i32>; 16],

        last_height: [i32; 8],

        changed_values: SymbolModelId,
        // indexed by the scan direction flag
        scan_angle_rank: [SymbolModelId; 2],
        // 256 slots each
        bit_byte: Vec<Option<SymbolModelId>>,
        classification: Vec<Option<SymbolModelId>>,
        user_data: Vec<Option<SymbolModelId>>,
    }

    impl Common {
        fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last_point: Point10::default(),
                last_intensity: [0u16; 16],
                last_x_diff_median: [StreamingMedian::new(); 16],
                last_y_diff_median: [StreamingMedian::new(); 16],
                last_height: [0i32; 8],
                changed_values: models.add_symbol_model(64)?,
                scan_angle_rank: [models.add_symbol_model(256)?, models.add_symbol_model(256)?],
                bit_byte: vec![None; 256],
                classification: vec![None; 256],
                user_data: vec![None; 256],
            })
        }

        fn reset_with(&mut self, first: Point10) {
            self.last_point = first;
            self.last_point.intensity = 0;
            self.last_intensity = [0u16; 16];
            self.last_x_diff_median = [StreamingMedian::new(); 16];
            self.last_y_diff_median = [StreamingMedian::new(); 16];
            self.last_height = [0i32; 8];
        }
    }

    #[inline]
    pub(crate) fn y_context(n: u8, k_bits: u32) -> u32 {
        (n == 1) as u32 + if k_bits < 20 { u32_zero_bit(k_bits) } else { 20 }
    }

    #[inline]
    pub(crate) fn z_context(n: u8, k_bits: u32) -> u32 {
        (n == 1) as u32 + if k_bits < 18 { u32_zero_bit(k_bits) } else { 18 }
    }

    pub struct Point10Compressor {
        ic_intensity: IntegerCompressor,
        ic_point_source_id: IntegerCompressor,
        ic_dx: IntegerCompressor,
        ic_dy: IntegerCompressor,
        ic_z: IntegerCompressor,

        common: Common,
    }

    impl Point10Compressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                ic_intensity: IntegerCompressorBuilder::new()
                    .bits(16)
                    .contexts(4)
                    .build_in(models)?,
                ic_point_source_id: IntegerCompressorBuilder::new().bits(16).build_in(models)?,
                ic_dx: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(2)
                    .build_in(models)?,
                ic_dy: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(22)
                    .build_in(models)?,
                ic_z: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(20)
                    .build_in(models)?,
                common: Common::new(models)?,
            })
        }
    }

    impl<W: Write> FieldCompressor<W> for Point10Compressor {
        fn size_of_field(&self) -> usize {
            Point10::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()> {
            dst.write_all(&buf[..Point10::SIZE])?;
            self.common.reset_with(Point10::unpack_from(buf));
            Ok(())
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> crate::Result<()> {
            let this_val = Point10::unpack_from(buf);
            let common = &mut self.common;
            let last = common.last_point;

            let r = this_val.return_number as usize;
            let n = this_val.number_of_returns_of_given_pulse;
            let m = NUMBER_RETURN_MAP[n as usize][r] as usize;
            let l = NUMBER_RETURN_LEVEL[n as usize][r] as usize;

            let changed_values =
                Point10ChangedValues::from_points(&this_val, &last, common.last_intensity[m]);
            encoder.encode_symbol(common.changed_values, changed_values.0)?;

            if changed_values.bit_fields_changed() {
                let slot = &mut common.bit_byte[last.bit_fields_to_byte() as usize];
                let model = encoder.models_mut().lazy_symbol_model(slot, 256)?;
                encoder.encode_symbol(model, u32::from(this_val.bit_fields_to_byte()))?;
            }

            if changed_values.intensity_changed() {
                self.ic_intensity.compress(
                    encoder,
                    i32::from(common.last_intensity[m]),
                    i32::from(this_val.intensity),
                    (m as u32).min(3),
                )?;
                common.last_intensity[m] = this_val.intensity;
            }

            if changed_values.classification_changed() {
                let slot = &mut common.classification[last.classification as usize];
                let model = encoder.models_mut().lazy_symbol_model(slot, 256)?;
                encoder.encode_symbol(model, u32::from(this_val.classification))?;
            }

            if changed_values.scan_angle_rank_changed() {
                // the difference is coded as an u8, the "as u8" before "as u32" is vital
                let diff = this_val.scan_angle_rank.wrapping_sub(last.scan_angle_rank) as u8;
                encoder.encode_symbol(
                    common.scan_angle_rank[this_val.scan_direction_flag as usize],
                    u32::from(diff),
                )?;
            }

            if changed_values.user_data_changed() {
                let slot = &mut common.user_data[last.user_data as usize];
                let model = encoder.models_mut().lazy_symbol_model(slot, 256)?;
                encoder.encode_symbol(model, u32::from(this_val.user_data))?;
            }

            if changed_values.point_source_id_changed() {
                self.ic_point_source_id.compress(
                    encoder,
                    i32::from(last.point_source_id),
                    i32::from(this_val.point_source_id),
                    0,
                )?;
            }

            // x
            let median = common.last_x_diff_median[m].get();
            let diff = this_val.x.wrapping_sub(last.x);
            self.ic_dx.compress(encoder, median, diff, (n == 1) as u32)?;
            common.last_x_diff_median[m].add(diff);

            // y
            let k_bits = self.ic_dx.k();
            let median = common.last_y_diff_median[m].get();
            let diff = this_val.y.wrapping_sub(last.y);
            self.ic_dy.compress(encoder, median, diff, y_context(n, k_bits))?;
            common.last_y_diff_median[m].add(diff);

            // z
            let k_bits = (self.ic_dx.k() + self.ic_dy.k()) / 2;
            self.ic_z.compress(
                encoder,
                common.last_height[l],
                this_val.z,
                z_context(n, k_bits),
            )?;
            common.last_height[l] = this_val.z;

            common.last_point = this_val;
            Ok(())
        }
    }

    pub struct Point10Decompressor {
        ic_intensity: IntegerDecompressor,
        ic_point_source_id: IntegerDecompressor,
        ic_dx: IntegerDecompressor,
        ic_dy: IntegerDecompressor,
        ic_z: IntegerDecompressor,

        common: Common,
    }

    impl Point10Decompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                ic_intensity: IntegerDecompressorBuilder::new()
                    .bits(16)
                    .contexts(4)
                    .build_in(models)?,
                ic_point_source_id: IntegerDecompressorBuilder::new()
                    .bits(16)
                    .build_in(models)?,
                ic_dx: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(2)
                    .build_in(models)?,
                ic_dy: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(22)
                    .build_in(models)?,
                ic_z: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(20)
                    .build_in(models)?,
                common: Common::new(models)?,
            })
        }
    }

    impl<R: Read> FieldDecompressor<R> for Point10Decompressor {
        fn size_of_field(&self) -> usize {
            Point10::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()> {
            let first = read_and_unpack::<_, Point10>(src, &mut first_point[..Point10::SIZE])?;
            self.common.reset_with(first);
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> crate::Result<()> {
            let common = &mut self.common;
            let changed_values = Point10ChangedValues(decoder.decode_symbol(common.changed_values)?);
            let last = &mut common.last_point;

            // the return fields are needed to select the contexts of everything else
            if changed_values.bit_fields_changed() {
                let slot = &mut common.bit_byte[last.bit_fields_to_byte() as usize];
                let model = decoder.models_mut().lazy_symbol_model(slot, 256)?;
                last.populate_bit_fields_from(decoder.decode_symbol(model)? as u8);
            }

            let r = last.return_number as usize;
            let n = last.number_of_returns_of_given_pulse;
            let m = NUMBER_RETURN_MAP[n as usize][r] as usize;
            let l = NUMBER_RETURN_LEVEL[n as usize][r] as usize;

            if changed_values.intensity_changed() {
                last.intensity = self.ic_intensity.decompress(
                    decoder,
                    i32::from(common.last_intensity[m]),
                    (m as u32).min(3),
                )? as u16;
                common.last_intensity[m] = last.intensity;
            } else {
                last.intensity = common.last_intensity[m];
            }

            if changed_values.classification_changed() {
                let slot = &mut common.classification[last.classification as usize];
                let model = decoder.models_mut().lazy_symbol_model(slot, 256)?;
                last.classification = decoder.decode_symbol(model)? as u8;
            }

            if changed_values.scan_angle_rank_changed() {
                let diff = decoder
                    .decode_symbol(common.scan_angle_rank[last.scan_direction_flag as usize])?
                    as u8 as i8;
                last.scan_angle_rank = last.scan_angle_rank.wrapping_add(diff);
            }

            if changed_values.user_data_changed() {
                let slot = &mut common.user_data[last.user_data as usize];
                let model = decoder.models_mut().lazy_symbol_model(slot, 256)?;
                last.user_data = decoder.decode_symbol(model)? as u8;
            }

            if changed_values.point_source_id_changed() {
                last.point_source_id = self.ic_point_source_id.decompress(
                    decoder,
                    i32::from(last.point_source_id),
                    0,
                )? as u16;
            }

            // x
            let median = common.last_x_diff_median[m].get();
            let diff = self.ic_dx.decompress(decoder, median, (n == 1) as u32)?;
            last.x = last.x.wrapping_add(diff);
            common.last_x_diff_median[m].add(diff);

            // y
            let median = common.last_y_diff_median[m].get();
            let k_bits = self.ic_dx.k();
            let diff = self
                .ic_dy
                .decompress(decoder, median, y_context(n, k_bits))?;
            last.y = last.y.wrapping_add(diff);
            common.last_y_diff_median[m].add(diff);

            // z
            let k_bits = (self.ic_dx.k() + self.ic_dy.k()) / 2;
            last.z = self
                .ic_z
                .decompress(decoder, common.last_height[l], z_context(n, k_bits))?;
            common.last_height[l] = last.z;

            last.pack_into(buf);
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::record::{FieldCompressor, FieldDecompressor};

    fn make_points() -> Vec<Point10> {
        (0..300i32)
            .map(|i| {
                let mut p = Point10 {
                    x: (i32::MAX - 1000).wrapping_add(i * 7),
                    y: -i * 13 + (i % 5),
                    z: 100 + (i % 17) * 3,
                    intensity: (i * 31 % 700) as u16,
                    classification: (i % 4) as u8 | 0x20,
                    scan_angle_rank: ((i % 181) - 90) as i8,
                    user_data: (i / 50) as u8,
                    point_source_id: (i / 100) as u16,
                    ..Default::default()
                };
                p.number_of_returns_of_given_pulse = (i % 3 + 1) as u8;
                p.return_number = (i % 3) as u8 + 1;
                p.scan_direction_flag = i % 2 == 0;
                p.edge_of_flight_line = i % 97 == 0;
                p
            })
            .collect()
    }

    fn round_trip(version: u16) {
        let points = make_points();
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut compressor: Box<dyn FieldCompressor<Cursor<Vec<u8>>>> = if version == 1 {
            Box::new(v1::Point10Compressor::new(encoder.models_mut()).unwrap())
        } else {
            Box::new(v2::Point10Compressor::new(encoder.models_mut()).unwrap())
        };
        let mut buf = [0u8; Point10::SIZE];
        for (i, point) in points.iter().enumerate() {
            point.pack_into(&mut buf);
            if i == 0 {
                compressor.compress_first(encoder.get_mut(), &buf).unwrap();
            } else {
                compressor.compress_with(&mut encoder, &buf).unwrap();
            }
        }
        encoder.done().unwrap();
        let data = encoder.into_inner().into_inner();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(data));
        let mut decompressor: Box<dyn FieldDecompressor<Cursor<Vec<u8>>>> = if version == 1 {
            Box::new(v1::Point10Decompressor::new(decoder.models_mut()).unwrap())
        } else {
            Box::new(v2::Point10Decompressor::new(decoder.models_mut()).unwrap())
        };
        for (i, point) in points.iter().enumerate() {
            if i == 0 {
                decompressor
                    .decompress_first(decoder.get_mut(), &mut buf)
                    .unwrap();
                decoder.read_init_bytes().unwrap();
            } else {
                decompressor.decompress_with(&mut decoder, &mut buf).unwrap();
            }
            assert_eq!(&Point10::unpack_from(&buf), point, "point {}", i);
        }
    }

    #[test]
    fn test_bit_fields() {
        let mut point = Point10::default();
        point.populate_bit_fields_from(0b1101_0011);
        assert_eq!(point.return_number, 3);
        assert_eq!(point.number_of_returns_of_given_pulse, 2);
        assert!(point.scan_direction_flag);
        assert!(point.edge_of_flight_line);
        assert_eq!(point.bit_fields_to_byte(), 0b1101_0011);
    }

    #[test]
    fn test_pack_layout() {
        let point = Point10 {
            x: 1,
            y: -1,
            z: 2,
            intensity: 0x0102,
            return_number: 1,
            number_of_returns_of_given_pulse: 1,
            classification: 2,
            scan_angle_rank: -3,
            user_data: 4,
            point_source_id: 0x0506,
            ..Default::default()
        };
        let mut buf = [0u8; Point10::SIZE];
        point.pack_into(&mut buf);
        assert_eq!(
            buf,
            [1, 0, 0, 0, 255, 255, 255, 255, 2, 0, 0, 0, 2, 1, 9, 2, 253, 4, 6, 5]
        );
        assert_eq!(Point10::unpack_from(&buf), point);
    }

    #[test]
    fn test_v1_wrapping_coordinates() {
        round_trip(1);
    }

    #[test]
    fn test_v2_wrapping_coordinates() {
        round_trip(2);
    }
}
