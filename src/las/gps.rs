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

//! Compression of the GpsTime item, the f64 that follows Point10 in point formats 1, 3, 4 and 5.
//!
//! The time is reinterpreted (not converted) as an i64, consecutive times of
//! a pulse sequence have small integer differences that are predicted from the
//! previous difference.

use std::convert::TryFrom;

use crate::packers::Packable;

pub(crate) const LASZIP_GPS_TIME_MULTI: i32 = 500;
pub(crate) const LASZIP_GPS_TIME_MULTI_MINUS: i32 = -10;
const LASZIP_GPS_TIME_MULTI_UNCHANGED: i32 = LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 1;
const LASZIP_GPS_TIME_MULTI_CODE_FULL: i32 = LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 2;
const LASZIP_GPS_TIME_MULTI_TOTAL: i32 = LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS + 6;

/// Struct to store GpsTime
///
/// As the value (f64 as per LAS spec) needs to be reinterpreted
/// (not simply converted with 'as') to i64 (or u64)
/// during compression / decompression this struct provides a convenient wrapper
#[derive(Default, Copy, Clone, Debug, PartialEq, Eq)]
pub struct GpsTime {
    pub value: i64,
}

impl GpsTime {
    pub const SIZE: usize = 8;

    /// The integer difference to `other` if it fits in 32 bits
    #[inline]
    pub(crate) fn diff_32(self, other: GpsTime) -> Option<i32> {
        i32::try_from(self.value.wrapping_sub(other.value)).ok()
    }
}

impl From<f64> for GpsTime {
    fn from(v: f64) -> Self {
        Self {
            value: v.to_bits() as i64,
        }
    }
}

impl From<GpsTime> for f64 {
    fn from(gps: GpsTime) -> Self {
        f64::from_bits(gps.value as u64)
    }
}

impl From<i64> for GpsTime {
    fn from(v: i64) -> Self {
        Self { value: v }
    }
}

impl From<GpsTime> for i64 {
    fn from(gps: GpsTime) -> Self {
        gps.value
    }
}

impl Packable for GpsTime {
    type Type = GpsTime;

    fn unpack_from(input: &[u8]) -> Self::Type {
        let lower = u32::unpack_from(&input[0..4]);
        let upper = u32::unpack_from(&input[4..8]);
        GpsTime {
            value: (i64::from(upper) << 32) | i64::from(lower),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        ((self.value & 0xFFFF_FFFF) as u32).pack_into(&mut output[0..4]);
        ((self.value >> 32) as u32).pack_into(&mut output[4..8]);
    }
}

pub mod v1 {
    use std::io::{Read, Write};

    use num_traits::clamp;

    use crate::compressors::{IntegerCompressor, IntegerCompressorBuilder};
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::{IntegerDecompressor, IntegerDecompressorBuilder};
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::read_and_unpack;
    use crate::models::{ModelArena, SymbolModelId};
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};

    use super::GpsTime;

    const LASZIP_GPS_TIME_MULTI_MAX: u32 = 512;

    struct Common {
        last_gps: GpsTime,
        gps_time_multi_model: SymbolModelId,
        gps_time_0_diff_model: SymbolModelId,
        multi_extreme_counter: i32,
        last_gps_time_diff: i32,
    }

    impl Common {
        fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last_gps: GpsTime::default(),
                gps_time_multi_model: models.add_symbol_model(LASZIP_GPS_TIME_MULTI_MAX)?,
                gps_time_0_diff_model: models.add_symbol_model(3)?,
                multi_extreme_counter: 0,
                last_gps_time_diff: 0,
            })
        }

        fn reset_with(&mut self, first: GpsTime) {
            self.last_gps = first;
            self.multi_extreme_counter = 0;
            self.last_gps_time_diff = 0;
        }

        fn count_extreme(&mut self, diff: i32) {
            self.multi_extreme_counter += 1;
            if self.multi_extreme_counter > 3 {
                self.last_gps_time_diff = diff;
                self.multi_extreme_counter = 0;
            }
        }
    }

    fn multi_context(multi: u32) -> u32 {
        if multi < 10 {
            3
        } else if multi < 50 {
            4
        } else {
            5
        }
    }

    pub struct GpsTimeCompressor {
        common: Common,
        ic_gps_time: IntegerCompressor,
    }

    impl GpsTimeCompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                common: Common::new(models)?,
                ic_gps_time: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(6)
                    .build_in(models)?,
            })
        }
    }

    impl<W: Write> FieldCompressor<W> for GpsTimeCompressor {
        fn size_of_field(&self) -> usize {
            GpsTime::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()> {
            self.common.reset_with(GpsTime::unpack_from(buf));
            dst.write_all(&buf[..GpsTime::SIZE])?;
            Ok(())
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> crate::Result<()> {
            let this_val = GpsTime::unpack_from(buf);
            let common = &mut self.common;

            if common.last_gps_time_diff == 0 {
                if this_val == common.last_gps {
                    encoder.encode_symbol(common.gps_time_0_diff_model, 0)?;
                } else if let Some(diff) = this_val.diff_32(common.last_gps) {
                    // this difference can be represented with 32 bits
                    encoder.encode_symbol(common.gps_time_0_diff_model, 1)?;
                    self.ic_gps_time.compress(encoder, 0, diff, 0)?;
                    common.last_gps_time_diff = diff;
                } else {
                    // the difference is huge
                    encoder.encode_symbol(common.gps_time_0_diff_model, 2)?;
                    encoder.write_int64(this_val.value as u64)?;
                }
            } else if this_val == common.last_gps {
                // if the doubles have not changed use a special symbol
                encoder.encode_symbol(common.gps_time_multi_model, LASZIP_GPS_TIME_MULTI_MAX - 1)?;
            } else if let Some(diff) = this_val.diff_32(common.last_gps) {
                // compute multiplier between current and last integer difference
                let multi = ((diff as f32 / common.last_gps_time_diff as f32) + 0.5f32) as i32;
                let multi = clamp(multi, 0, (LASZIP_GPS_TIME_MULTI_MAX - 3) as i32) as u32;
                encoder.encode_symbol(common.gps_time_multi_model, multi)?;

                if multi == 1 {
                    self.ic_gps_time
                        .compress(encoder, common.last_gps_time_diff, diff, 1)?;
                    common.last_gps_time_diff = diff;
                    common.multi_extreme_counter = 0;
                } else if multi == 0 {
                    self.ic_gps_time
                        .compress(encoder, common.last_gps_time_diff / 4, diff, 2)?;
                    common.count_extreme(diff);
                } else {
                    self.ic_gps_time.compress(
                        encoder,
                        common.last_gps_time_diff.wrapping_mul(multi as i32),
                        diff,
                        multi_context(multi),
                    )?;
                    if multi == LASZIP_GPS_TIME_MULTI_MAX - 3 {
                        common.count_extreme(diff);
                    }
                }
            } else {
                // if difference is so huge ... we simply write the double
                encoder.encode_symbol(common.gps_time_multi_model, LASZIP_GPS_TIME_MULTI_MAX - 2)?;
                encoder.write_int64(this_val.value as u64)?;
            }
            common.last_gps = this_val;
            Ok(())
        }
    }

    pub struct GpsTimeDecompressor {
        common: Common,
        ic_gps_time: IntegerDecompressor,
    }

    impl GpsTimeDecompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                common: Common::new(models)?,
                ic_gps_time: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(6)
                    .build_in(models)?,
            })
        }
    }

    impl<R: Read> FieldDecompressor<R> for GpsTimeDecompressor {
        fn size_of_field(&self) -> usize {
            GpsTime::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()> {
            let first = read_and_unpack::<_, GpsTime>(src, &mut first_point[..GpsTime::SIZE])?;
            self.common.reset_with(first);
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> crate::Result<()> {
            let common = &mut self.common;
            if common.last_gps_time_diff == 0 {
                let multi = decoder.decode_symbol(common.gps_time_0_diff_model)?;
                if multi == 1 {
                    let diff = self.ic_gps_time.decompress(decoder, 0, 0)?;
                    common.last_gps_time_diff = diff;
                    common.last_gps.value = common.last_gps.value.wrapping_add(i64::from(diff));
                } else if multi == 2 {
                    common.last_gps.value = decoder.read_int_64()? as i64;
                }
            } else {
                let multi = decoder.decode_symbol(common.gps_time_multi_model)?;
                if multi < LASZIP_GPS_TIME_MULTI_MAX - 2 {
                    let diff = if multi == 1 {
                        let diff =
                            self.ic_gps_time
                                .decompress(decoder, common.last_gps_time_diff, 1)?;
                        common.last_gps_time_diff = diff;
                        common.multi_extreme_counter = 0;
                        diff
                    } else if multi == 0 {
                        let diff =
                            self.ic_gps_time
                                .decompress(decoder, common.last_gps_time_diff / 4, 2)?;
                        common.count_extreme(diff);
                        diff
                    } else {
                        let diff = self.ic_gps_time.decompress(
                            decoder,
                            common.last_gps_time_diff.wrapping_mul(multi as i32),
                            multi_context(multi),
                        )?;
                        if multi == LASZIP_GPS_TIME_MULTI_MAX - 3 {
                            common.count_extreme(diff);
                        }
                        diff
                    };
                    common.last_gps.value = common.last_gps.value.wrapping_add(i64::from(diff));
                } else if multi == LASZIP_GPS_TIME_MULTI_MAX - 2 {
                    common.last_gps.value = decoder.read_int_64()? as i64;
                }
            }
            common.last_gps.pack_into(buf);
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
    use crate::las::utils::{i32_quantize, read_and_unpack};
    use crate::models::{ModelArena, SymbolModelId};
    use crate::packers::Packable;
    use crate::record::{FieldCompressor, FieldDecompressor};
    use crate::LasZipError;

    use super::{
        GpsTime, LASZIP_GPS_TIME_MULTI, LASZIP_GPS_TIME_MULTI_CODE_FULL,
        LASZIP_GPS_TIME_MULTI_MINUS, LASZIP_GPS_TIME_MULTI_TOTAL, LASZIP_GPS_TIME_MULTI_UNCHANGED,
    };

    // Up to 4 interleaved time sequences are tracked, `last` is the one
    // the previous point belonged to, `next` the slot a new sequence goes to.
    struct Common {
        gps_time_multi: SymbolModelId,
        gps_time_0_diff: SymbolModelId,
        last: usize,
        next: usize,
        last_gps_times: [GpsTime; 4],
        last_gps_time_diffs: [i32; 4],
        multi_extreme_counters: [i32; 4],
    }

    impl Common {
        fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                gps_time_multi: models.add_symbol_model(LASZIP_GPS_TIME_MULTI_TOTAL as u32)?,
                gps_time_0_diff: models.add_symbol_model(6)?,
                last: 0,
                next: 0,
                last_gps_times: [GpsTime::default(); 4],
                last_gps_time_diffs: [0i32; 4],
                multi_extreme_counters: [0i32; 4],
            })
        }

        fn reset_with(&mut self, first: GpsTime) {
            self.last = 0;
            self.next = 0;
            self.last_gps_times = [GpsTime::default(); 4];
            self.last_gps_times[0] = first;
            self.last_gps_time_diffs = [0i32; 4];
            self.multi_extreme_counters = [0i32; 4];
        }

        fn count_extreme(&mut self, diff: i32) {
            let counter = &mut self.multi_extreme_counters[self.last];
            *counter += 1;
            if *counter > 3 {
                self.last_gps_time_diffs[self.last] = diff;
                *counter = 0;
            }
        }

        /// Offset (1..=3) of another tracked sequence close enough to `gps_time`
        fn other_sequence(&self, gps_time: GpsTime) -> Option<usize> {
            (1..4).find(|i| {
                gps_time
                    .diff_32(self.last_gps_times[(self.last + i) & 3])
                    .is_some()
            })
        }

        fn start_new_sequence(&mut self) {
            self.next = (self.next + 1) & 3;
            self.last = self.next;
            self.last_gps_time_diffs[self.last] = 0;
            self.multi_extreme_counters[self.last] = 0;
        }
    }

    pub struct GpsTimeCompressor {
        ic_gps_time: IntegerCompressor,
        common: Common,
    }

    impl GpsTimeCompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                ic_gps_time: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(9)
                    .build_in(models)?,
                common: Common::new(models)?,
            })
        }

        fn write_new_sequence<W: Write>(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            this_val: GpsTime,
        ) -> crate::Result<()> {
            let last_gps = self.common.last_gps_times[self.common.last];
            self.ic_gps_time.compress(
                encoder,
                (last_gps.value >> 32) as i32,
                (this_val.value >> 32) as i32,
                8,
            )?;
            encoder.write_int(this_val.value as u32)?;
            self.common.start_new_sequence();
            Ok(())
        }

        fn compress_diff<W: Write>(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            diff: i32,
        ) -> crate::Result<()> {
            let common = &mut self.common;
            let last_diff = common.last_gps_time_diffs[common.last];
            // compute multiplier between current and last integer difference
            let multi = i32_quantize(diff as f32 / last_diff as f32);

            if multi == 1 {
                // the case we assume we get most often for regular spaced pulses
                encoder.encode_symbol(common.gps_time_multi, 1)?;
                self.ic_gps_time.compress(encoder, last_diff, diff, 1)?;
                common.multi_extreme_counters[common.last] = 0;
            } else if multi > 0 {
                if multi < LASZIP_GPS_TIME_MULTI {
                    // positive multipliers up to LASZIP_GPS_TIME_MULTI are compressed directly
                    encoder.encode_symbol(common.gps_time_multi, multi as u32)?;
                    let context = if multi < 10 { 2 } else { 3 };
                    self.ic_gps_time
                        .compress(encoder, multi.wrapping_mul(last_diff), diff, context)?;
                } else {
                    encoder.encode_symbol(common.gps_time_multi, LASZIP_GPS_TIME_MULTI as u32)?;
                    self.ic_gps_time.compress(
                        encoder,
                        LASZIP_GPS_TIME_MULTI.wrapping_mul(last_diff),
                        diff,
                        4,
                    )?;
                    common.count_extreme(diff);
                }
            } else if multi < 0 {
                if multi > LASZIP_GPS_TIME_MULTI_MINUS {
                    // negative multipliers larger than LASZIP_GPS_TIME_MULTI_MINUS are compressed directly
                    encoder.encode_symbol(
                        common.gps_time_multi,
                        (LASZIP_GPS_TIME_MULTI - multi) as u32,
                    )?;
                    self.ic_gps_time
                        .compress(encoder, multi.wrapping_mul(last_diff), diff, 5)?;
                } else {
                    encoder.encode_symbol(
                        common.gps_time_multi,
                        (LASZIP_GPS_TIME_MULTI - LASZIP_GPS_TIME_MULTI_MINUS) as u32,
                    )?;
                    self.ic_gps_time.compress(
                        encoder,
                        LASZIP_GPS_TIME_MULTI_MINUS.wrapping_mul(last_diff),
                        diff,
                        6,
                    )?;
                    common.count_extreme(diff);
                }
            } else {
                encoder.encode_symbol(common.gps_time_multi, 0)?;
                self.ic_gps_time.compress(encoder, 0, diff, 7)?;
                common.count_extreme(diff);
            }
            Ok(())
        }
    }

    impl<W: Write> FieldCompressor<W> for GpsTimeCompressor {
        fn size_of_field(&self) -> usize {
            GpsTime::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()> {
            self.common.reset_with(GpsTime::unpack_from(buf));
            dst.write_all(&buf[..GpsTime::SIZE])?;
            Ok(())
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> crate::Result<()> {
            let this_val = GpsTime::unpack_from(buf);
            let last = self.common.last;
            let last_gps = self.common.last_gps_times[last];

            if self.common.last_gps_time_diffs[last] == 0 {
                if this_val == last_gps {
                    encoder.encode_symbol(self.common.gps_time_0_diff, 0)?;
                    return Ok(());
                }
                if let Some(diff) = this_val.diff_32(last_gps) {
                    // this difference is small enough to be represented with 32 bits
                    encoder.encode_symbol(self.common.gps_time_0_diff, 1)?;
                    self.ic_gps_time.compress(encoder, 0, diff, 0)?;
                    self.common.last_gps_time_diffs[last] = diff;
                    self.common.multi_extreme_counters[last] = 0;
                } else if let Some(i) = self.common.other_sequence(this_val) {
                    // the difference is huge, but the time belongs to another sequence
                    encoder.encode_symbol(self.common.gps_time_0_diff, (i + 2) as u32)?;
                    self.common.last = (last + i) & 3;
                    return self.compress_with(encoder, buf);
                } else {
                    encoder.encode_symbol(self.common.gps_time_0_diff, 2)?;
                    self.write_new_sequence(encoder, this_val)?;
                }
            } else {
                if this_val == last_gps {
                    // if the doubles have not changed use a special symbol
                    encoder.encode_symbol(
                        self.common.gps_time_multi,
                        LASZIP_GPS_TIME_MULTI_UNCHANGED as u32,
                    )?;
                    return Ok(());
                }
                if let Some(diff) = this_val.diff_32(last_gps) {
                    self.compress_diff(encoder, diff)?;
                } else if let Some(i) = self.common.other_sequence(this_val) {
                    encoder.encode_symbol(
                        self.common.gps_time_multi,
                        (LASZIP_GPS_TIME_MULTI_CODE_FULL + i as i32) as u32,
                    )?;
                    self.common.last = (last + i) & 3;
                    return self.compress_with(encoder, buf);
                } else {
                    encoder.encode_symbol(
                        self.common.gps_time_multi,
                        LASZIP_GPS_TIME_MULTI_CODE_FULL as u32,
                    )?;
                    self.write_new_sequence(encoder, this_val)?;
                }
            }
            self.common.last_gps_times[self.common.last] = this_val;
            Ok(())
        }
    }

    pub struct GpsTimeDecompressor {
        common: Common,
        ic_gps_time: IntegerDecompressor,
    }

    impl GpsTimeDecompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                common: Common::new(models)?,
                ic_gps_time: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(9)
                    .build_in(models)?,
            })
        }

        fn read_new_sequence<R: Read>(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
        ) -> crate::Result<()> {
            let last_gps = self.common.last_gps_times[self.common.last];
            let upper = self
                .ic_gps_time
                .decompress(decoder, (last_gps.value >> 32) as i32, 8)?;
            let lower = decoder.read_int()?;
            self.common.start_new_sequence();
            self.common.last_gps_times[self.common.last] =
                GpsTime::from((i64::from(upper) << 32) | i64::from(lower));
            Ok(())
        }

        fn read_diff<R: Read>(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            multi: i32,
        ) -> crate::Result<i32> {
            let common = &mut self.common;
            let last_diff = common.last_gps_time_diffs[common.last];
            let diff = if multi == 0 {
                let diff = self.ic_gps_time.decompress(decoder, 0, 7)?;
                common.count_extreme(diff);
                diff
            } else if multi < LASZIP_GPS_TIME_MULTI {
                let context = if multi < 10 { 2 } else { 3 };
                self.ic_gps_time
                    .decompress(decoder, multi.wrapping_mul(last_diff), context)?
            } else if multi == LASZIP_GPS_TIME_MULTI {
                let diff = self.ic_gps_time.decompress(
                    decoder,
                    LASZIP_GPS_TIME_MULTI.wrapping_mul(last_diff),
                    4,
                )?;
                common.count_extreme(diff);
                diff
            } else {
                let multi = LASZIP_GPS_TIME_MULTI - multi;
                if multi > LASZIP_GPS_TIME_MULTI_MINUS {
                    self.ic_gps_time
                        .decompress(decoder, multi.wrapping_mul(last_diff), 5)?
                } else {
                    let diff = self.ic_gps_time.decompress(
                        decoder,
                        LASZIP_GPS_TIME_MULTI_MINUS.wrapping_mul(last_diff),
                        6,
                    )?;
                    common.count_extreme(diff);
                    diff
                }
            };
            Ok(diff)
        }

        /// `switched` tells that the point was announced as part of another
        /// sequence, which a valid stream never does twice in a row.
        fn decompress_gps_time<R: Read>(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            switched: bool,
        ) -> crate::Result<()> {
            let last = self.common.last;
            if self.common.last_gps_time_diffs[last] == 0 {
                let multi = decoder.decode_symbol(self.common.gps_time_0_diff)? as usize;
                match multi {
                    0 => {}
                    1 => {
                        let diff = self.ic_gps_time.decompress(decoder, 0, 0)?;
                        let common = &mut self.common;
                        common.last_gps_time_diffs[last] = diff;
                        common.last_gps_times[last].value =
                            common.last_gps_times[last].value.wrapping_add(i64::from(diff));
                        common.multi_extreme_counters[last] = 0;
                    }
                    2 => self.read_new_sequence(decoder)?,
                    _ if switched => return Err(LasZipError::CorruptStream),
                    _ => {
                        self.common.last = (last + multi - 2) & 3;
                        self.decompress_gps_time(decoder, true)?;
                    }
                }
            } else {
                let multi = decoder.decode_symbol(self.common.gps_time_multi)? as i32;
                if multi == 1 {
                    let last_diff = self.common.last_gps_time_diffs[last];
                    let diff = self.ic_gps_time.decompress(decoder, last_diff, 1)?;
                    let common = &mut self.common;
                    common.last_gps_times[last].value =
                        common.last_gps_times[last].value.wrapping_add(i64::from(diff));
                    common.multi_extreme_counters[last] = 0;
                } else if multi < LASZIP_GPS_TIME_MULTI_UNCHANGED {
                    let diff = self.read_diff(decoder, multi)?;
                    let common = &mut self.common;
                    common.last_gps_times[last].value =
                        common.last_gps_times[last].value.wrapping_add(i64::from(diff));
                } else if multi == LASZIP_GPS_TIME_MULTI_CODE_FULL {
                    self.read_new_sequence(decoder)?;
                } else if multi > LASZIP_GPS_TIME_MULTI_CODE_FULL {
                    if switched {
                        return Err(LasZipError::CorruptStream);
                    }
                    self.common.last =
                        (last + (multi - LASZIP_GPS_TIME_MULTI_CODE_FULL) as usize) & 3;
                    self.decompress_gps_time(decoder, true)?;
                }
            }
            Ok(())
        }
    }

    impl<R: Read> FieldDecompressor<R> for GpsTimeDecompressor {
        fn size_of_field(&self) -> usize {
            GpsTime::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()> {
            let first = read_and_unpack::<_, GpsTime>(src, &mut first_point[..GpsTime::SIZE])?;
            self.common.reset_with(first);
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> crate::Result<()> {
            self.decompress_gps_time(decoder, false)?;
            self.common.last_gps_times[self.common.last].pack_into(buf);
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

    fn compress(version: u16, times: &[f64]) -> Vec<u8> {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut compressor: Box<dyn FieldCompressor<Cursor<Vec<u8>>>> = if version == 1 {
            Box::new(v1::GpsTimeCompressor::new(encoder.models_mut()).unwrap())
        } else {
            Box::new(v2::GpsTimeCompressor::new(encoder.models_mut()).unwrap())
        };
        let mut buf = [0u8; GpsTime::SIZE];
        for (i, t) in times.iter().enumerate() {
            GpsTime::from(*t).pack_into(&mut buf);
            if i == 0 {
                compressor.compress_first(encoder.get_mut(), &buf).unwrap();
            } else {
                compressor.compress_with(&mut encoder, &buf).unwrap();
            }
        }
        encoder.done().unwrap();
        encoder.into_inner().into_inner()
    }

    fn decompress(version: u16, data: Vec<u8>, count: usize) -> Vec<u64> {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(data));
        let mut decompressor: Box<dyn FieldDecompressor<Cursor<Vec<u8>>>> = if version == 1 {
            Box::new(v1::GpsTimeDecompressor::new(decoder.models_mut()).unwrap())
        } else {
            Box::new(v2::GpsTimeDecompressor::new(decoder.models_mut()).unwrap())
        };
        let mut buf = [0u8; GpsTime::SIZE];
        let mut out = Vec::with_capacity(count);
        for i in 0..count {
            if i == 0 {
                decompressor
                    .decompress_first(decoder.get_mut(), &mut buf)
                    .unwrap();
                decoder.read_init_bytes().unwrap();
            } else {
                decompressor.decompress_with(&mut decoder, &mut buf).unwrap();
            }
            out.push(GpsTime::unpack_from(&buf).value as u64);
        }
        out
    }

    fn check_round_trip(times: &[f64]) {
        for version in 1..=2 {
            let data = compress(version, times);
            let decompressed = decompress(version, data, times.len());
            let expected: Vec<u64> = times.iter().map(|t| t.to_bits()).collect();
            assert_eq!(decompressed, expected, "version {}", version);
        }
    }

    #[test]
    fn test_gps_time_bit_pattern() {
        let gps = GpsTime::from(-1.5f64);
        let mut buf = [0u8; 8];
        gps.pack_into(&mut buf);
        assert_eq!(buf, (-1.5f64).to_le_bytes());
        assert_eq!(f64::from(GpsTime::unpack_from(&buf)), -1.5f64);
    }

    #[test]
    fn test_identical_times_cost_almost_nothing() {
        let times = vec![123_456.789f64; 1000];
        for version in 1..=2 {
            let data = compress(version, &times);
            // raw first point + a few bytes of almost certain symbols
            assert!(data.len() < 64, "version {}: {} bytes", version, data.len());
        }
        check_round_trip(&times);
    }

    #[test]
    fn test_gps_time_ramp() {
        let times: Vec<f64> = (0..1000).map(|i| 1000.0 + f64::from(i) * 0.001).collect();
        let data = compress(2, &times);
        assert!(data.len() < 1000, "{} bytes", data.len());
        check_round_trip(&times);
    }

    #[test]
    fn test_interleaved_sequences_and_jumps() {
        let mut times = Vec::new();
        for i in 0..400 {
            let t = f64::from(i);
            match i % 4 {
                0 => times.push(10.0 + t * 0.5),
                1 => times.push(5.0e8 + t * 0.25),
                2 => times.push(-3.0e-5 * t),
                _ => times.push(if i % 40 == 3 { f64::MAX } else { 1.0e6 - t }),
            }
        }
        times.push(0.0);
        times.push(f64::NAN);
        times.push(f64::MIN_POSITIVE);
        check_round_trip(&times);
    }
}
