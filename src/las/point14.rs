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

//! Point14, the point record of the point formats 6 to 10,
//! only compressed with the layered (version 3) algorithm.

use crate::las::utils::{i16_quantize, i8_clamp};
use crate::packers::Packable;

#[derive(Default, Copy, Clone, PartialEq, Debug)]
pub struct Point14 {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub intensity: u16,

    // 4 bits
    pub return_number: u8,
    // 4 bits
    pub number_of_returns: u8,

    // 4 bits
    pub classification_flags: u8,
    // 2 bits
    pub scanner_channel: u8,
    // 1 bit
    pub scan_direction_flag: bool,
    // 1 bit
    pub edge_of_flight_line: bool,

    pub classification: u8,
    pub user_data: u8,
    pub scan_angle: i16,
    pub point_source_id: u16,
    pub gps_time: f64,
}

impl Point14 {
    pub const SIZE: usize = 30;

    pub fn populate_return_fields_from(&mut self, byte: u8) {
        self.return_number = byte & 0xF;
        self.number_of_returns = (byte >> 4) & 0xF;
    }

    pub fn return_fields_to_byte(&self) -> u8 {
        (self.number_of_returns & 0xF) << 4 | (self.return_number & 0xF)
    }

    pub fn populate_flags_from(&mut self, byte: u8) {
        self.classification_flags = byte & 0xF;
        self.scanner_channel = (byte >> 4) & 0x3;
        self.scan_direction_flag = ((byte >> 6) & 0x1) != 0;
        self.edge_of_flight_line = ((byte >> 7) & 0x1) != 0;
    }

    pub fn flags_to_byte(&self) -> u8 {
        (self.edge_of_flight_line as u8) << 7
            | (self.scan_direction_flag as u8) << 6
            | (self.scanner_channel & 0x3) << 4
            | (self.classification_flags & 0xF)
    }

    /// Classification as point formats 0 to 5 see it.
    pub fn legacy_classification(&self) -> u8 {
        if self.classification < 32 {
            self.classification
        } else {
            0
        }
    }

    pub fn legacy_return_number(&self) -> u8 {
        self.return_number.min(7)
    }

    pub fn legacy_number_of_returns(&self) -> u8 {
        self.number_of_returns.min(7)
    }

    /// The scan angle in degrees, as the `i8` rank of point formats 0 to 5.
    pub fn legacy_scan_angle_rank(&self) -> i8 {
        i8_clamp(i32::from(i16_quantize(0.006f32 * f32::from(self.scan_angle))))
    }
}

impl Packable for Point14 {
    type Type = Point14;

    fn unpack_from(input: &[u8]) -> Self::Type {
        let mut point = Point14 {
            x: i32::unpack_from(&input[0..4]),
            y: i32::unpack_from(&input[4..8]),
            z: i32::unpack_from(&input[8..12]),
            intensity: u16::unpack_from(&input[12..14]),
            classification: input[16],
            user_data: input[17],
            scan_angle: i16::unpack_from(&input[18..20]),
            point_source_id: u16::unpack_from(&input[20..22]),
            gps_time: f64::unpack_from(&input[22..30]),
            ..Default::default()
        };
        point.populate_return_fields_from(input[14]);
        point.populate_flags_from(input[15]);
        point
    }

    fn pack_into(&self, output: &mut [u8]) {
        self.x.pack_into(&mut output[0..4]);
        self.y.pack_into(&mut output[4..8]);
        self.z.pack_into(&mut output[8..12]);
        self.intensity.pack_into(&mut output[12..14]);
        output[14] = self.return_fields_to_byte();
        output[15] = self.flags_to_byte();
        output[16] = self.classification;
        output[17] = self.user_data;
        self.scan_angle.pack_into(&mut output[18..20]);
        self.point_source_id.pack_into(&mut output[20..22]);
        self.gps_time.pack_into(&mut output[22..30]);
    }
}

pub mod v3 {
    //! The layered compression of Point14.
    //!
    //! A point is split into 9 layers, each one coded with its own arithmetic coder:
    //! channel / returns / xy, z, classification, flags, intensity,
    //! scan angle, user data, point source and gps time.
    //!
    //! Each of the 4 scanner channels has its own prediction context.
    use std::io::{Cursor, Read, Write};

    use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
    use crate::encoders::ArithmeticEncoder;
    use crate::las::gps::{GpsTime, LASZIP_GPS_TIME_MULTI, LASZIP_GPS_TIME_MULTI_MINUS};
    use crate::las::point10::v2::{y_context, z_context};
    use crate::las::utils::{
        i32_quantize, read_and_unpack, read_layer, read_layer_size, reset_layer_decoder,
        reset_layer_encoder, write_layer, write_layer_size, StreamingMedian,
        NUMBER_RETURN_LEVEL_8CT, NUMBER_RETURN_MAP_6CTX,
    };
    use crate::models::{ModelArena, SymbolModelId};
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};
    use crate::LasZipError;

    use super::Point14;

    const LASZIP_GPS_TIME_MULTI_CODE_FULL: i32 =
        LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 1;
    const LASZIP_GPS_TIME_MULTI_TOTAL: i32 =
        LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 5;

    /// One value per layer, fields are in the order the layers are written.
    struct Layers<T> {
        channel_returns_xy: T,
        z: T,
        classification: T,
        flags: T,
        intensity: T,
        scan_angle: T,
        user_data: T,
        point_source: T,
        gps_time: T,
    }

    impl<T> Layers<T> {
        fn from_fn<F: FnMut() -> T>(mut f: F) -> Self {
            Self {
                channel_returns_xy: f(),
                z: f(),
                classification: f(),
                flags: f(),
                intensity: f(),
                scan_angle: f(),
                user_data: f(),
                point_source: f(),
                gps_time: f(),
            }
        }

        fn as_array_mut(&mut self) -> [&mut T; 9] {
            [
                &mut self.channel_returns_xy,
                &mut self.z,
                &mut self.classification,
                &mut self.flags,
                &mut self.intensity,
                &mut self.scan_angle,
                &mut self.user_data,
                &mut self.point_source,
                &mut self.gps_time,
            ]
        }
    }

    impl<T: Copy> Layers<T> {
        fn to_array(&self) -> [T; 9] {
            [
                self.channel_returns_xy,
                self.z,
                self.classification,
                self.flags,
                self.intensity,
                self.scan_angle,
                self.user_data,
                self.point_source,
                self.gps_time,
            ]
        }
    }

    impl Layers<bool> {
        /// The channel / returns / xy and the z layers are always written.
        fn unchanged() -> Self {
            let mut changed = Self::from_fn(|| false);
            changed.channel_returns_xy = true;
            changed.z = true;
            changed
        }
    }

    impl Layers<ArithmeticEncoder<Cursor<Vec<u8>>>> {
        fn arenas_mut(&mut self) -> Layers<&mut ModelArena> {
            Layers {
                channel_returns_xy: self.channel_returns_xy.models_mut(),
                z: self.z.models_mut(),
                classification: self.classification.models_mut(),
                flags: self.flags.models_mut(),
                intensity: self.intensity.models_mut(),
                scan_angle: self.scan_angle.models_mut(),
                user_data: self.user_data.models_mut(),
                point_source: self.point_source.models_mut(),
                gps_time: self.gps_time.models_mut(),
            }
        }
    }

    impl Layers<ArithmeticDecoder<Cursor<Vec<u8>>>> {
        fn arenas_mut(&mut self) -> Layers<&mut ModelArena> {
            Layers {
                channel_returns_xy: self.channel_returns_xy.models_mut(),
                z: self.z.models_mut(),
                classification: self.classification.models_mut(),
                flags: self.flags.models_mut(),
                intensity: self.intensity.models_mut(),
                scan_angle: self.scan_angle.models_mut(),
                user_data: self.user_data.models_mut(),
                point_source: self.point_source.models_mut(),
                gps_time: self.gps_time.models_mut(),
            }
        }
    }

    trait IntegerCoder: Sized {
        fn build(bits: u32, contexts: u32, models: &mut ModelArena) -> crate::Result<Self>;
    }

    impl IntegerCoder for IntegerCompressor {
        fn build(bits: u32, contexts: u32, models: &mut ModelArena) -> crate::Result<Self> {
            IntegerCompressorBuilder::new()
                .bits(bits)
                .contexts(contexts)
                .build_in(models)
        }
    }

    impl IntegerCoder for IntegerDecompressor {
        fn build(bits: u32, contexts: u32, models: &mut ModelArena) -> crate::Result<Self> {
            IntegerDecompressorBuilder::new()
                .bits(bits)
                .contexts(contexts)
                .build_in(models)
        }
    }

    /// The models of one scanner channel context, each one lives
    /// in the arena of the layer it codes.
    struct Point14Models<IC> {
        changed_values: Vec<SymbolModelId>,
        scanner_channel: SymbolModelId,
        number_of_returns: [Option<SymbolModelId>; 16],
        return_number: [Option<SymbolModelId>; 16],
        return_number_gps_same: SymbolModelId,
        ic_dx: IC,
        ic_dy: IC,

        ic_z: IC,

        // 64 slots each
        classification: Vec<Option<SymbolModelId>>,
        flags: Vec<Option<SymbolModelId>>,
        user_data: Vec<Option<SymbolModelId>>,

        ic_intensity: IC,
        ic_scan_angle: IC,
        ic_point_source_id: IC,

        gps_time_multi: SymbolModelId,
        gps_time_0_diff: SymbolModelId,
        ic_gps_time: IC,
    }

    impl<IC: IntegerCoder> Point14Models<IC> {
        fn new(arenas: Layers<&mut ModelArena>) -> crate::Result<Self> {
            let Layers {
                channel_returns_xy,
                z,
                intensity,
                scan_angle,
                point_source,
                gps_time,
                ..
            } = arenas;
            Ok(Self {
                changed_values: channel_returns_xy.add_symbol_models(128, 8)?,
                scanner_channel: channel_returns_xy.add_symbol_model(3)?,
                number_of_returns: [None; 16],
                return_number: [None; 16],
                return_number_gps_same: channel_returns_xy.add_symbol_model(13)?,
                ic_dx: IC::build(32, 2, channel_returns_xy)?,
                ic_dy: IC::build(32, 22, channel_returns_xy)?,
                ic_z: IC::build(32, 20, z)?,
                classification: vec![None; 64],
                flags: vec![None; 64],
                user_data: vec![None; 64],
                ic_intensity: IC::build(16, 4, intensity)?,
                ic_scan_angle: IC::build(16, 2, scan_angle)?,
                ic_point_source_id: IC::build(16, 1, point_source)?,
                gps_time_multi: gps_time.add_symbol_model(LASZIP_GPS_TIME_MULTI_TOTAL as u32)?,
                gps_time_0_diff: gps_time.add_symbol_model(5)?,
                ic_gps_time: IC::build(32, 9, gps_time)?,
            })
        }
    }

    /// Up to 4 interleaved time sequences, as in the version 2 of the gps time.
    struct GpsSequences {
        last: usize,
        next: usize,
        last_gps_times: [GpsTime; 4],
        last_gps_time_diffs: [i32; 4],
        multi_extreme_counters: [i32; 4],
    }

    impl GpsSequences {
        fn new(first: GpsTime) -> Self {
            let mut last_gps_times = [GpsTime::default(); 4];
            last_gps_times[0] = first;
            Self {
                last: 0,
                next: 0,
                last_gps_times,
                last_gps_time_diffs: [0i32; 4],
                multi_extreme_counters: [0i32; 4],
            }
        }

        fn count_extreme(&mut self, diff: i32) {
            let counter = &mut self.multi_extreme_counters[self.last];
            *counter += 1;
            if *counter > 3 {
                self.last_gps_time_diffs[self.last] = diff;
                *counter = 0;
            }
        }

        fn other_sequence(&self, gps_time: GpsTime) -> Option<usize> {
            (1..4).find(|i| {
                gps_time
                    .diff_32(self.last_gps_times[(self.last + i) & 3])
                    .is_some()
            })
        }

        fn start_new_sequence(&mut self, gps_time: GpsTime) {
            self.next = (self.next + 1) & 3;
            self.last = self.next;
            self.last_gps_times[self.last] = gps_time;
            self.last_gps_time_diffs[self.last] = 0;
            self.multi_extreme_counters[self.last] = 0;
        }

        fn add_to_last(&mut self, diff: i32) {
            let last = &mut self.last_gps_times[self.last];
            last.value = last.value.wrapping_add(i64::from(diff));
        }

        fn current(&self) -> GpsTime {
            self.last_gps_times[self.last]
        }
    }

    struct Point14Context<IC> {
        models: Option<Point14Models<IC>>,
        last_item: Point14,
        last_x_diff_median: [StreamingMedian<i32>; 12],
        last_y_diff_median: [StreamingMedian<i32>; 12],
        last_z: [i32; 8],
        last_intensity: [u16; 8],
        gps: GpsSequences,
        gps_time_change: bool,
        unused: bool,
    }

    impl<IC> Point14Context<IC> {
        fn new() -> Self {
            Self {
                models: None,
                last_item: Point14::default(),
                last_x_diff_median: [StreamingMedian::new(); 12],
                last_y_diff_median: [StreamingMedian::new(); 12],
                last_z: [0i32; 8],
                last_intensity: [0u16; 8],
                gps: GpsSequences::new(GpsTime::default()),
                gps_time_change: false,
                unused: true,
            }
        }

        fn models_mut(&mut self) -> crate::Result<&mut Point14Models<IC>> {
            self.models.as_mut().ok_or(LasZipError::CorruptStream)
        }

        /// Context of the changed values model
        fn lpr(&self) -> usize {
            let last = &self.last_item;
            (last.return_number == 1) as usize
                | ((last.return_number >= last.number_of_returns) as usize) << 1
                | (self.gps_time_change as usize) << 2
        }
    }

    struct Point14Contexts<IC> {
        contexts: [Point14Context<IC>; 4],
        current: usize,
    }

    impl<IC: IntegerCoder> Point14Contexts<IC> {
        fn new() -> Self {
            Self {
                contexts: [
                    Point14Context::new(),
                    Point14Context::new(),
                    Point14Context::new(),
                    Point14Context::new(),
                ],
                current: 0,
            }
        }

        fn init_with(
            &mut self,
            first: Point14,
            arenas: Layers<&mut ModelArena>,
        ) -> crate::Result<usize> {
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.current = first.scanner_channel as usize;
            self.activate(self.current, first, arenas)?;
            Ok(self.current)
        }

        /// Starts using `context` with predictions seeded from `seed`.
        /// The models are those of the arenas, which are reset at each chunk.
        fn activate(
            &mut self,
            context: usize,
            seed: Point14,
            arenas: Layers<&mut ModelArena>,
        ) -> crate::Result<()> {
            let ctx = &mut self.contexts[context];
            if ctx.models.is_none() {
                ctx.models = Some(Point14Models::new(arenas)?);
            }
            ctx.last_item = seed;
            ctx.last_x_diff_median = [StreamingMedian::new(); 12];
            ctx.last_y_diff_median = [StreamingMedian::new(); 12];
            ctx.last_z = [seed.z; 8];
            ctx.last_intensity = [seed.intensity; 8];
            ctx.gps = GpsSequences::new(GpsTime::from(seed.gps_time));
            ctx.gps_time_change = false;
            ctx.unused = false;
            Ok(())
        }

        /// Moves to the scanner channel `context`, creating it from
        /// the current context if it was never used in this chunk.
        fn switch_to(
            &mut self,
            context: usize,
            arenas: Layers<&mut ModelArena>,
        ) -> crate::Result<()> {
            if self.contexts[context].unused {
                let seed = self.contexts[self.current].last_item;
                self.activate(context, seed, arenas)?;
            }
            self.current = context;
            Ok(())
        }
    }

    #[inline]
    fn flags_symbol(point: &Point14) -> u32 {
        u32::from(point.edge_of_flight_line) << 5
            | u32::from(point.scan_direction_flag) << 4
            | u32::from(point.classification_flags & 0xF)
    }

    /// Prediction contexts derived from the return number `r` of the `n` returns
    #[inline]
    fn return_contexts(n: u8, r: u8) -> (usize, usize, usize) {
        let m = NUMBER_RETURN_MAP_6CTX[n as usize][r as usize] as usize;
        let l = NUMBER_RETURN_LEVEL_8CT[n as usize][r as usize] as usize;
        let cpr = ((r == 1) as usize) << 1 | (r >= n) as usize;
        (m, l, cpr)
    }

    pub struct Point14Compressor {
        encoders: Layers<ArithmeticEncoder<Cursor<Vec<u8>>>>,
        changed: Layers<bool>,
        contexts: Point14Contexts<IntegerCompressor>,
    }

    impl Default for Point14Compressor {
        fn default() -> Self {
            Self {
                encoders: Layers::from_fn(|| ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()))),
                changed: Layers::unchanged(),
                contexts: Point14Contexts::new(),
            }
        }
    }

    fn compress_gps_diff<W: Write>(
        encoder: &mut ArithmeticEncoder<W>,
        models: &mut Point14Models<IntegerCompressor>,
        gps: &mut GpsSequences,
        diff: i32,
    ) -> crate::Result<()> {
        let last_diff = gps.last_gps_time_diffs[gps.last];
        let multi = i32_quantize(diff as f32 / last_diff as f32);
        let ic = &mut models.ic_gps_time;

        if multi == 1 {
            encoder.encode_symbol(models.gps_time_multi, 1)?;
            ic.compress(encoder, last_diff, diff, 1)?;
            gps.multi_extreme_counters[gps.last] = 0;
        } else if multi > 0 {
            if multi < LASZIP_GPS_TIME_MULTI {
                encoder.encode_symbol(models.gps_time_multi, multi as u32)?;
                let context = if multi < 10 { 2 } else { 3 };
                ic.compress(encoder, multi.wrapping_mul(last_diff), diff, context)?;
            } else {
                encoder.encode_symbol(models.gps_time_multi, LASZIP_GPS_TIME_MULTI as u32)?;
                ic.compress(
                    encoder,
                    LASZIP_GPS_TIME_MULTI.wrapping_mul(last_diff),
                    diff,
                    4,
                )?;
                gps.count_extreme(diff);
            }
        } else if multi < 0 {
            if multi > LASZIP_GPS_TIME_MULTI_MINUS {
                encoder.encode_symbol(models.gps_time_multi, (LASZIP_GPS_TIME_MULTI - multi) as u32)?;
                ic.compress(encoder, multi.wrapping_mul(last_diff), diff, 5)?;
            } else {
                encoder.encode_symbol(
                    models.gps_time_multi,
                    (LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS) as u32,
                )?;
                ic.compress(
                    encoder,
                    LASZIP_GPS_TIME_MULTI_MINUS.wrapping_mul(last_diff),
                    diff,
                    6,
                )?;
                gps.count_extreme(diff);
            }
        } else {
            encoder.encode_symbol(models.gps_time_multi, 0)?;
            ic.compress(encoder, 0, diff, 7)?;
            gps.count_extreme(diff);
        }
        gps.add_to_last(diff);
        Ok(())
    }

    fn write_new_sequence<W: Write>(
        encoder: &mut ArithmeticEncoder<W>,
        models: &mut Point14Models<IntegerCompressor>,
        gps: &mut GpsSequences,
        gps_time: GpsTime,
    ) -> crate::Result<()> {
        models.ic_gps_time.compress(
            encoder,
            (gps.current().value >> 32) as i32,
            (gps_time.value >> 32) as i32,
            8,
        )?;
        encoder.write_int(gps_time.value as u32)?;
        gps.start_new_sequence(gps_time);
        Ok(())
    }

    fn compress_gps_time<W: Write>(
        encoder: &mut ArithmeticEncoder<W>,
        models: &mut Point14Models<IntegerCompressor>,
        gps: &mut GpsSequences,
        gps_time: GpsTime,
    ) -> crate::Result<()> {
        let last = gps.last;
        if gps.last_gps_time_diffs[last] == 0 {
            if let Some(diff) = gps_time.diff_32(gps.current()) {
                encoder.encode_symbol(models.gps_time_0_diff, 0)?;
                models.ic_gps_time.compress(encoder, 0, diff, 0)?;
                gps.last_gps_time_diffs[last] = diff;
                gps.multi_extreme_counters[last] = 0;
                gps.add_to_last(diff);
            } else if let Some(i) = gps.other_sequence(gps_time) {
                encoder.encode_symbol(models.gps_time_0_diff, (i + 1) as u32)?;
                gps.last = (last + i) & 3;
                return compress_gps_time(encoder, models, gps, gps_time);
            } else {
                encoder.encode_symbol(models.gps_time_0_diff, 1)?;
                write_new_sequence(encoder, models, gps, gps_time)?;
            }
        } else if let Some(diff) = gps_time.diff_32(gps.current()) {
            compress_gps_diff(encoder, models, gps, diff)?;
        } else if let Some(i) = gps.other_sequence(gps_time) {
            encoder.encode_symbol(
                models.gps_time_multi,
                (LASZIP_GPS_TIME_MULTI_CODE_FULL + i as i32) as u32,
            )?;
            gps.last = (last + i) & 3;
            return compress_gps_time(encoder, models, gps, gps_time);
        } else {
            encoder.encode_symbol(models.gps_time_multi, LASZIP_GPS_TIME_MULTI_CODE_FULL as u32)?;
            write_new_sequence(encoder, models, gps, gps_time)?;
        }
        Ok(())
    }

    impl<W: Write> LayeredFieldCompressor<W> for Point14Compressor {
        fn size_of_field(&self) -> usize {
            Point14::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            for encoder in self.encoders.as_array_mut().iter_mut() {
                reset_layer_encoder(encoder);
            }
            self.changed = Layers::unchanged();
            dst.write_all(&first_point[..Point14::SIZE])?;
            let first = Point14::unpack_from(first_point);
            *context = self
                .contexts
                .init_with(first, self.encoders.arenas_mut())?;
            Ok(())
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let item = Point14::unpack_from(current_point);
            let Self {
                encoders,
                changed,
                contexts,
            } = self;

            let current = contexts.current;
            let channel = item.scanner_channel as usize;
            let lpr = contexts.contexts[current].lpr();
            let mut last = contexts.contexts[current].last_item;
            if channel != current && !contexts.contexts[channel].unused {
                last = contexts.contexts[channel].last_item;
            }

            let point_source_change = item.point_source_id != last.point_source_id;
            let gps_time_change = GpsTime::from(item.gps_time) != GpsTime::from(last.gps_time);
            let scan_angle_change = item.scan_angle != last.scan_angle;
            let (n, r) = (item.number_of_returns, item.return_number);
            let (last_n, last_r) = (last.number_of_returns, last.return_number);

            let mut changed_values = ((channel != current) as u32) << 6
                | (point_source_change as u32) << 5
                | (gps_time_change as u32) << 4
                | (scan_angle_change as u32) << 3
                | ((n != last_n) as u32) << 2;
            if r != last_r {
                if r == (last_r + 1) % 16 {
                    changed_values |= 1;
                } else if r == (last_r + 15) % 16 {
                    changed_values |= 2;
                } else {
                    changed_values |= 3;
                }
            }

            {
                let encoder = &mut encoders.channel_returns_xy;
                let models = contexts.contexts[current].models_mut()?;
                encoder.encode_symbol(models.changed_values[lpr], changed_values)?;
                if channel != current {
                    let diff = channel as i32 - current as i32;
                    let sym = if diff > 0 { diff - 1 } else { diff + 4 - 1 };
                    encoder.encode_symbol(models.scanner_channel, sym as u32)?;
                }
            }
            if channel != current {
                contexts.switch_to(channel, encoders.arenas_mut())?;
                last = contexts.contexts[channel].last_item;
            }

            let ctx = &mut contexts.contexts[contexts.current];
            let models = ctx.models.as_mut().ok_or(LasZipError::CorruptStream)?;

            let encoder = &mut encoders.channel_returns_xy;
            if n != last_n {
                let model = encoder
                    .models_mut()
                    .lazy_symbol_model(&mut models.number_of_returns[last_n as usize], 16)?;
                encoder.encode_symbol(model, u32::from(n))?;
            }
            if changed_values & 3 == 3 {
                if gps_time_change {
                    let model = encoder
                        .models_mut()
                        .lazy_symbol_model(&mut models.return_number[last_r as usize], 16)?;
                    encoder.encode_symbol(model, u32::from(r))?;
                } else {
                    let diff = i32::from(r) - i32::from(last_r);
                    let sym = if diff > 1 { diff - 2 } else { diff + 16 - 2 };
                    encoder.encode_symbol(models.return_number_gps_same, sym as u32)?;
                }
            }

            let (m, l, cpr) = return_contexts(n, r);
            let gps_bit = gps_time_change as usize;

            // x
            let median = ctx.last_x_diff_median[m << 1 | gps_bit].get();
            let diff = item.x.wrapping_sub(last.x);
            models.ic_dx.compress(encoder, median, diff, (n == 1) as u32)?;
            ctx.last_x_diff_median[m << 1 | gps_bit].add(diff);

            // y
            let k_bits = models.ic_dx.k();
            let median = ctx.last_y_diff_median[m << 1 | gps_bit].get();
            let diff = item.y.wrapping_sub(last.y);
            models
                .ic_dy
                .compress(encoder, median, diff, y_context(n, k_bits))?;
            ctx.last_y_diff_median[m << 1 | gps_bit].add(diff);

            // z
            let k_bits = (models.ic_dx.k() + models.ic_dy.k()) / 2;
            models.ic_z.compress(
                &mut encoders.z,
                ctx.last_z[l],
                item.z,
                z_context(n, k_bits),
            )?;
            ctx.last_z[l] = item.z;

            // classification
            if item.classification != last.classification {
                changed.classification = true;
            }
            let ccc = ((last.classification & 0x1F) as usize) << 1 | (cpr == 3) as usize;
            let encoder = &mut encoders.classification;
            let model = encoder
                .models_mut()
                .lazy_symbol_model(&mut models.classification[ccc], 256)?;
            encoder.encode_symbol(model, u32::from(item.classification))?;

            // flags
            let last_flags = flags_symbol(&last);
            let flags = flags_symbol(&item);
            if flags != last_flags {
                changed.flags = true;
            }
            let encoder = &mut encoders.flags;
            let model = encoder
                .models_mut()
                .lazy_symbol_model(&mut models.flags[last_flags as usize], 64)?;
            encoder.encode_symbol(model, flags)?;

            // intensity
            if item.intensity != last.intensity {
                changed.intensity = true;
            }
            let intensity_index = cpr << 1 | gps_bit;
            models.ic_intensity.compress(
                &mut encoders.intensity,
                i32::from(ctx.last_intensity[intensity_index]),
                i32::from(item.intensity),
                cpr as u32,
            )?;
            ctx.last_intensity[intensity_index] = item.intensity;

            if scan_angle_change {
                changed.scan_angle = true;
                models.ic_scan_angle.compress(
                    &mut encoders.scan_angle,
                    i32::from(last.scan_angle),
                    i32::from(item.scan_angle),
                    gps_bit as u32,
                )?;
            }

            // user data
            if item.user_data != last.user_data {
                changed.user_data = true;
            }
            let encoder = &mut encoders.user_data;
            let model = encoder
                .models_mut()
                .lazy_symbol_model(&mut models.user_data[(last.user_data / 4) as usize], 256)?;
            encoder.encode_symbol(model, u32::from(item.user_data))?;

            if point_source_change {
                changed.point_source = true;
                models.ic_point_source_id.compress(
                    &mut encoders.point_source,
                    i32::from(last.point_source_id),
                    i32::from(item.point_source_id),
                    0,
                )?;
            }

            if gps_time_change {
                changed.gps_time = true;
                compress_gps_time(
                    &mut encoders.gps_time,
                    models,
                    &mut ctx.gps,
                    GpsTime::from(item.gps_time),
                )?;
            }

            ctx.last_item = item;
            ctx.gps_time_change = gps_time_change;
            *context = contexts.current;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()> {
            let changed = self.changed.to_array();
            for (encoder, has_changed) in self.encoders.as_array_mut().iter_mut().zip(&changed) {
                write_layer_size(encoder, *has_changed, dst)?;
            }
            Ok(())
        }

        fn write_layers(&mut self, dst: &mut W) -> crate::Result<()> {
            let changed = self.changed.to_array();
            for (encoder, has_changed) in self.encoders.as_array_mut().iter().zip(&changed) {
                write_layer(encoder, *has_changed, dst)?;
            }
            Ok(())
        }
    }

    pub struct Point14Decompressor {
        decoders: Layers<ArithmeticDecoder<Cursor<Vec<u8>>>>,
        changed: Layers<bool>,
        layer_sizes: Layers<usize>,
        contexts: Point14Contexts<IntegerDecompressor>,
    }

    impl Default for Point14Decompressor {
        fn default() -> Self {
            Self {
                decoders: Layers::from_fn(|| ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new()))),
                changed: Layers::unchanged(),
                layer_sizes: Layers::from_fn(|| 0),
                contexts: Point14Contexts::new(),
            }
        }
    }

    fn read_gps_diff<R: Read>(
        decoder: &mut ArithmeticDecoder<R>,
        models: &mut Point14Models<IntegerDecompressor>,
        gps: &mut GpsSequences,
        multi: i32,
    ) -> crate::Result<i32> {
        let last_diff = gps.last_gps_time_diffs[gps.last];
        let ic = &mut models.ic_gps_time;
        let diff = if multi == 0 {
            let diff = ic.decompress(decoder, 0, 7)?;
            gps.count_extreme(diff);
            diff
        } else if multi < LASZIP_GPS_TIME_MULTI {
            let context = if multi < 10 { 2 } else { 3 };
            ic.decompress(decoder, multi.wrapping_mul(last_diff), context)?
        } else if multi == LASZIP_GPS_TIME_MULTI {
            let diff = ic.decompress(decoder, LASZIP_GPS_TIME_MULTI.wrapping_mul(last_diff), 4)?;
            gps.count_extreme(diff);
            diff
        } else {
            let multi = LASZIP_GPS_TIME_MULTI - multi;
            if multi > LASZIP_GPS_TIME_MULTI_MINUS {
                ic.decompress(decoder, multi.wrapping_mul(last_diff), 5)?
            } else {
                let diff = ic.decompress(
                    decoder,
                    LASZIP_GPS_TIME_MULTI_MINUS.wrapping_mul(last_diff),
                    6,
                )?;
                gps.count_extreme(diff);
                diff
            }
        };
        Ok(diff)
    }

    fn read_new_sequence<R: Read>(
        decoder: &mut ArithmeticDecoder<R>,
        models: &mut Point14Models<IntegerDecompressor>,
        gps: &mut GpsSequences,
    ) -> crate::Result<()> {
        let upper = models
            .ic_gps_time
            .decompress(decoder, (gps.current().value >> 32) as i32, 8)?;
        let lower = decoder.read_int()?;
        gps.start_new_sequence(GpsTime::from(
            (i64::from(upper) << 32) | i64::from(lower),
        ));
        Ok(())
    }

    /// `switched` tells that the time was announced as part of another
    /// sequence, which a valid stream never does twice in a row.
    fn decompress_gps_time<R: Read>(
        decoder: &mut ArithmeticDecoder<R>,
        models: &mut Point14Models<IntegerDecompressor>,
        gps: &mut GpsSequences,
        switched: bool,
    ) -> crate::Result<()> {
        let last = gps.last;
        if gps.last_gps_time_diffs[last] == 0 {
            let multi = decoder.decode_symbol(models.gps_time_0_diff)? as usize;
            match multi {
                0 => {
                    let diff = models.ic_gps_time.decompress(decoder, 0, 0)?;
                    gps.last_gps_time_diffs[last] = diff;
                    gps.multi_extreme_counters[last] = 0;
                    gps.add_to_last(diff);
                }
                1 => read_new_sequence(decoder, models, gps)?,
                _ if switched => return Err(LasZipError::CorruptStream),
                _ => {
                    gps.last = (last + multi - 1) & 3;
                    decompress_gps_time(decoder, models, gps, true)?;
                }
            }
        } else {
            let multi = decoder.decode_symbol(models.gps_time_multi)? as i32;
            if multi == 1 {
                let last_diff = gps.last_gps_time_diffs[last];
                let diff = models.ic_gps_time.decompress(decoder, last_diff, 1)?;
                gps.multi_extreme_counters[last] = 0;
                gps.add_to_last(diff);
            } else if multi < LASZIP_GPS_TIME_MULTI_CODE_FULL {
                let diff = read_gps_diff(decoder, models, gps, multi)?;
                gps.add_to_last(diff);
            } else if multi == LASZIP_GPS_TIME_MULTI_CODE_FULL {
                read_new_sequence(decoder, models, gps)?;
            } else {
                if switched {
                    return Err(LasZipError::CorruptStream);
                }
                gps.last = (last + (multi - LASZIP_GPS_TIME_MULTI_CODE_FULL) as usize) & 3;
                decompress_gps_time(decoder, models, gps, true)?;
            }
        }
        Ok(())
    }

    impl<R: Read> LayeredFieldDecompressor<R> for Point14Decompressor {
        fn size_of_field(&self) -> usize {
            Point14::SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            for decoder in self.decoders.as_array_mut().iter_mut() {
                reset_layer_decoder(decoder);
            }
            let first = read_and_unpack::<_, Point14>(src, &mut first_point[..Point14::SIZE])?;
            *context = self
                .contexts
                .init_with(first, self.decoders.arenas_mut())?;
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let Self {
                decoders,
                changed,
                contexts,
                ..
            } = self;

            let current = contexts.current;
            let (changed_values, channel) = {
                let ctx = &mut contexts.contexts[current];
                let lpr = ctx.lpr();
                let models = ctx.models_mut()?;
                let decoder = &mut decoders.channel_returns_xy;
                let changed_values = decoder.decode_symbol(models.changed_values[lpr])?;
                let channel = if is_nth_bit_set!(changed_values, 6) {
                    let diff = decoder.decode_symbol(models.scanner_channel)? as usize;
                    (current + diff + 1) % 4
                } else {
                    current
                };
                (changed_values, channel)
            };
            if channel != current {
                contexts.switch_to(channel, decoders.arenas_mut())?;
            }

            let ctx = &mut contexts.contexts[contexts.current];
            let models = ctx.models.as_mut().ok_or(LasZipError::CorruptStream)?;
            let last = ctx.last_item;
            let mut point = last;
            point.scanner_channel = contexts.current as u8;

            let gps_time_change = is_nth_bit_set!(changed_values, 4);
            let gps_bit = gps_time_change as usize;
            let (last_n, last_r) = (last.number_of_returns, last.return_number);

            let decoder = &mut decoders.channel_returns_xy;
            let n = if is_nth_bit_set!(changed_values, 2) {
                let model = decoder
                    .models_mut()
                    .lazy_symbol_model(&mut models.number_of_returns[last_n as usize], 16)?;
                decoder.decode_symbol(model)? as u8
            } else {
                last_n
            };

            let r = match changed_values & 3 {
                0 => last_r,
                1 => (last_r + 1) % 16,
                2 => (last_r + 15) % 16,
                _ => {
                    if gps_time_change {
                        let model = decoder
                            .models_mut()
                            .lazy_symbol_model(&mut models.return_number[last_r as usize], 16)?;
                        decoder.decode_symbol(model)? as u8
                    } else {
                        let sym = decoder.decode_symbol(models.return_number_gps_same)?;
                        ((u32::from(last_r) + sym + 2) % 16) as u8
                    }
                }
            };
            point.number_of_returns = n;
            point.return_number = r;

            let (m, l, cpr) = return_contexts(n, r);

            // x
            let median = ctx.last_x_diff_median[m << 1 | gps_bit].get();
            let diff = models.ic_dx.decompress(decoder, median, (n == 1) as u32)?;
            point.x = last.x.wrapping_add(diff);
            ctx.last_x_diff_median[m << 1 | gps_bit].add(diff);

            // y
            let k_bits = models.ic_dx.k();
            let median = ctx.last_y_diff_median[m << 1 | gps_bit].get();
            let diff = models
                .ic_dy
                .decompress(decoder, median, y_context(n, k_bits))?;
            point.y = last.y.wrapping_add(diff);
            ctx.last_y_diff_median[m << 1 | gps_bit].add(diff);

            if changed.z {
                let k_bits = (models.ic_dx.k() + models.ic_dy.k()) / 2;
                point.z = models.ic_z.decompress(
                    &mut decoders.z,
                    ctx.last_z[l],
                    z_context(n, k_bits),
                )?;
                ctx.last_z[l] = point.z;
            }

            if changed.classification {
                let ccc = ((last.classification & 0x1F) as usize) << 1 | (cpr == 3) as usize;
                let decoder = &mut decoders.classification;
                let model = decoder
                    .models_mut()
                    .lazy_symbol_model(&mut models.classification[ccc], 256)?;
                point.classification = decoder.decode_symbol(model)? as u8;
            }

            if changed.flags {
                let last_flags = flags_symbol(&last);
                let decoder = &mut decoders.flags;
                let model = decoder
                    .models_mut()
                    .lazy_symbol_model(&mut models.flags[last_flags as usize], 64)?;
                let flags = decoder.decode_symbol(model)?;
                point.edge_of_flight_line = is_nth_bit_set!(flags, 5);
                point.scan_direction_flag = is_nth_bit_set!(flags, 4);
                point.classification_flags = (flags & 0xF) as u8;
            }

            if changed.intensity {
                let intensity_index = cpr << 1 | gps_bit;
                point.intensity = models.ic_intensity.decompress(
                    &mut decoders.intensity,
                    i32::from(ctx.last_intensity[intensity_index]),
                    cpr as u32,
                )? as u16;
                ctx.last_intensity[intensity_index] = point.intensity;
            }

            if changed.scan_angle && is_nth_bit_set!(changed_values, 3) {
                point.scan_angle = models.ic_scan_angle.decompress(
                    &mut decoders.scan_angle,
                    i32::from(last.scan_angle),
                    gps_bit as u32,
                )? as i16;
            }

            if changed.user_data {
                let decoder = &mut decoders.user_data;
                let model = decoder
                    .models_mut()
                    .lazy_symbol_model(&mut models.user_data[(last.user_data / 4) as usize], 256)?;
                point.user_data = decoder.decode_symbol(model)? as u8;
            }

            if changed.point_source && is_nth_bit_set!(changed_values, 5) {
                point.point_source_id = models.ic_point_source_id.decompress(
                    &mut decoders.point_source,
                    i32::from(last.point_source_id),
                    0,
                )? as u16;
            }

            if changed.gps_time && gps_time_change {
                decompress_gps_time(&mut decoders.gps_time, models, &mut ctx.gps, false)?;
                point.gps_time = f64::from(ctx.gps.current());
            }

            ctx.last_item = point;
            ctx.gps_time_change = gps_time_change;
            point.pack_into(current_point);
            *context = contexts.current;
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()> {
            for size in self.layer_sizes.as_array_mut().iter_mut() {
                **size = read_layer_size(src)?;
            }
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> crate::Result<()> {
            let sizes = self.layer_sizes.to_array();
            let mut decoders = self.decoders.as_array_mut();
            let mut changed = self.changed.as_array_mut();
            for ((decoder, has_changed), size) in decoders
                .iter_mut()
                .zip(changed.iter_mut())
                .zip(sizes.iter())
            {
                **has_changed = read_layer(src, *size, decoder)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    fn make_points(count: usize) -> Vec<Point14> {
        let mut points = Vec::with_capacity(count);
        let mut gps_time = 400_000.0f64;
        for i in 0..count {
            let number_of_returns = (i % 4 + 1) as u8;
            let return_number = (i % number_of_returns as usize + 1) as u8;
            if return_number == 1 {
                gps_time += 0.000_05;
            }
            points.push(Point14 {
                x: 1_000_000 + (i as i32) * 7,
                y: -2_000_000 + (i as i32 % 50) * 13,
                z: 5_000 + ((i * 31) % 200) as i32,
                intensity: ((i * 97) % 4096) as u16,
                return_number,
                number_of_returns,
                classification_flags: if i % 90 == 0 { 0b0010 } else { 0 },
                scanner_channel: 0,
                scan_direction_flag: (i / 40) % 2 == 0,
                edge_of_flight_line: i % 40 == 39,
                classification: if i % 13 == 0 { 40 } else { 2 },
                user_data: 0,
                scan_angle: ((i as i16 % 300) - 150) * 10,
                point_source_id: 17 + (i / 250) as u16,
                gps_time,
            });
        }
        points
    }

    fn compress(points: &[Point14]) -> Vec<u8> {
        let mut compressor = v3::Point14Compressor::default();
        let mut dst = Cursor::new(Vec::<u8>::new());
        let mut buf = [0u8; Point14::SIZE];
        let mut context = 0usize;
        for (i, point) in points.iter().enumerate() {
            point.pack_into(&mut buf);
            if i == 0 {
                compressor
                    .init_first_point(&mut dst, &buf, &mut context)
                    .unwrap();
            } else {
                LayeredFieldCompressor::<Cursor<Vec<u8>>>::compress_field_with(
                    &mut compressor,
                    &buf,
                    &mut context,
                )
                .unwrap();
            }
            assert_eq!(context, point.scanner_channel as usize);
        }
        compressor.write_layers_sizes(&mut dst).unwrap();
        compressor.write_layers(&mut dst).unwrap();
        dst.into_inner()
    }

    fn decompress(data: Vec<u8>, count: usize) -> Vec<Point14> {
        let mut decompressor = v3::Point14Decompressor::default();
        let mut src = Cursor::new(data);
        let mut buf = [0u8; Point14::SIZE];
        let mut context = 0usize;
        let mut points = Vec::with_capacity(count);
        for i in 0..count {
            if i == 0 {
                decompressor
                    .init_first_point(&mut src, &mut buf, &mut context)
                    .unwrap();
                decompressor.read_layers_sizes(&mut src).unwrap();
                decompressor.read_layers(&mut src).unwrap();
            } else {
                LayeredFieldDecompressor::<Cursor<Vec<u8>>>::decompress_field_with(
                    &mut decompressor,
                    &mut buf,
                    &mut context,
                )
                .unwrap();
            }
            let point = Point14::unpack_from(&buf);
            assert_eq!(context, point.scanner_channel as usize);
            points.push(point);
        }
        points
    }

    #[test]
    fn test_pack_layout() {
        let point = Point14 {
            x: 1,
            y: 2,
            z: 3,
            intensity: 0x0102,
            return_number: 3,
            number_of_returns: 12,
            classification_flags: 0b1001,
            scanner_channel: 2,
            scan_direction_flag: true,
            edge_of_flight_line: false,
            classification: 67,
            user_data: 8,
            scan_angle: -2,
            point_source_id: 0x0A0B,
            gps_time: 1.0,
        };
        let mut buf = [0u8; Point14::SIZE];
        point.pack_into(&mut buf);
        assert_eq!(buf[14], 0xC3);
        assert_eq!(buf[15], 0b0110_1001);
        assert_eq!(buf[16], 67);
        assert_eq!(&buf[18..20], &[0xFE, 0xFF]);
        assert_eq!(&buf[20..22], &[0x0B, 0x0A]);
        assert_eq!(&buf[22..30], &1.0f64.to_le_bytes());
        assert_eq!(Point14::unpack_from(&buf), point);
    }

    #[test]
    fn test_legacy_views() {
        let point = Point14 {
            return_number: 9,
            number_of_returns: 15,
            classification: 40,
            scan_angle: 15_000,
            ..Default::default()
        };
        assert_eq!(point.legacy_classification(), 0);
        assert_eq!(point.legacy_return_number(), 7);
        assert_eq!(point.legacy_number_of_returns(), 7);
        assert_eq!(point.legacy_scan_angle_rank(), 90);

        let point = Point14 {
            return_number: 2,
            number_of_returns: 3,
            classification: 6,
            scan_angle: -30_000,
            ..Default::default()
        };
        assert_eq!(point.legacy_classification(), 6);
        assert_eq!(point.legacy_return_number(), 2);
        assert_eq!(point.legacy_number_of_returns(), 3);
        assert_eq!(point.legacy_scan_angle_rank(), -128);
    }

    #[test]
    fn test_round_trip() {
        let points = make_points(2_000);
        let data = compress(&points);
        assert!(data.len() < points.len() * Point14::SIZE / 2);
        assert_eq!(decompress(data, points.len()), points);
    }

    #[test]
    fn test_round_trip_with_scanner_channels() {
        let mut points = make_points(1_500);
        for (i, point) in points.iter_mut().enumerate() {
            point.scanner_channel = ((i / 9) % 4) as u8;
            if point.scanner_channel == 3 {
                point.gps_time += 1.0e6;
            }
        }
        let data = compress(&points);
        assert_eq!(decompress(data, points.len()), points);
    }

    #[test]
    fn test_unchanged_layers_are_empty() {
        let mut points = make_points(300);
        for point in &mut points {
            point.classification = 2;
            point.intensity = 100;
            point.user_data = 3;
        }
        let data = compress(&points);
        let layer_size = |i: usize| {
            let start = Point14::SIZE + 4 * i;
            u32::from_le_bytes([data[start], data[start + 1], data[start + 2], data[start + 3]])
        };
        // channel / returns / xy and z are always written
        assert!(layer_size(0) > 0);
        assert!(layer_size(1) > 0);
        // classification, intensity, user data
        assert_eq!(layer_size(2), 0);
        assert_eq!(layer_size(4), 0);
        assert_eq!(layer_size(6), 0);
        // flags, scan angle, point source, gps time
        assert!(layer_size(3) > 0);
        assert!(layer_size(5) > 0);
        assert!(layer_size(7) > 0);
        assert!(layer_size(8) > 0);

        assert_eq!(decompress(data, points.len()), points);
    }

    #[test]
    fn test_gps_time_sequences_and_jumps() {
        let mut points = make_points(600);
        for (i, point) in points.iter_mut().enumerate() {
            point.gps_time = match i % 5 {
                0 | 1 => 1000.0 + i as f64 * 0.001,
                2 => 5.0e8 + i as f64 * 0.25,
                3 => -(i as f64),
                _ => {
                    if i % 50 == 4 {
                        f64::NAN
                    } else {
                        1.0e300
                    }
                }
            };
        }
        let data = compress(&points);
        let decompressed = decompress(data, points.len());
        for (expected, point) in points.iter().zip(&decompressed) {
            assert_eq!(expected.gps_time.to_bits(), point.gps_time.to_bits());
            assert_eq!(expected.x, point.x);
        }
    }
}
