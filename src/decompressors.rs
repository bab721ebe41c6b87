/*
===============================================================================

  CONTENTS:
    Integer compressor

  PROGRAMMERS:

    martin.isenburg@rapidlasso.com  -  http://rapidlasso.com
    uday.karan@gmail.com - Hobu, Inc.

  COPYRIGHT:

    (c) 2007-2014, martin isenburg, rapidlasso - tools to catch reality
    (c) 2014, Uday Verma, Hobu, Inc.
    (c) 2019, Thomas Montaigu

    This is free software; you can redistribute and/or modify it under the
    terms of the Apache Public License 2.0 published by the Apache Software
    Foundation. See the COPYING file for more information.

    This software is distributed WITHOUT ANY WARRANTY and without even the
    implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.

  CHANGE HISTORY:
    6 June 2019: Translated to Rust

===============================================================================
*/

//! Decompression of integers coded as a corrector of a prediction.

use std::io::Read;

use crate::compressors::{
    CorrectorRange, IntegerModels, DEFAULT_BITS, DEFAULT_BITS_HIGH, DEFAULT_CONTEXTS,
    DEFAULT_RANGE,
};
use crate::decoders::ArithmeticDecoder;
use crate::models::ModelArena;

#[derive(Debug, Clone)]
pub struct IntegerDecompressor {
    k: u32,
    bits_high: u32,
    range: CorrectorRange,
    models: IntegerModels,
}

impl IntegerDecompressor {
    /// Creates the decompressor, its models are allocated in `models`
    /// which must be the arena of the decoder it will read from.
    pub fn new(
        models: &mut ModelArena,
        bits: u32,
        contexts: u32,
        bits_high: u32,
        range: u32,
    ) -> crate::Result<Self> {
        let range = CorrectorRange::new(bits, range);
        Ok(Self {
            k: 0,
            bits_high,
            models: IntegerModels::allocate(models, &range, contexts, bits_high)?,
            range,
        })
    }

    /// The number of bits of the last corrector decompressed
    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn decompress<R: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<R>,
        pred: i32,
        context: u32,
    ) -> crate::Result<i32> {
        let corr = self.read_corrector(decoder, context)?;
        let mut real = pred.wrapping_add(corr);
        if real < 0 {
            real = real.wrapping_add(self.range.corr_range as i32);
        } else if (real as u32) >= self.range.corr_range {
            real = real.wrapping_sub(self.range.corr_range as i32);
        }
        Ok(real)
    }

    fn read_corrector<R: Read>(
        &mut self,
        decoder: &mut ArithmeticDecoder<R>,
        context: u32,
    ) -> crate::Result<i32> {
        // decode within which interval the corrector is falling
        self.k = decoder.decode_symbol(self.models.bits_model(context)?)?;
        let k = self.k;

        if k == 0 {
            return Ok(decoder.decode_bit(self.models.m_corrector_0)? as i32);
        }
        if k >= 32 {
            return Ok(self.range.corr_min);
        }

        // decode the exact location of the corrector within the interval
        let corrector = self.models.m_corrector[(k - 1) as usize];
        let mut c = if k <= self.bits_high {
            // for small k we can do this in one step
            decoder.decode_symbol(corrector)? as i32
        } else {
            // for larger k we need to do this in two steps
            let k1 = k - self.bits_high;
            let high = decoder.decode_symbol(corrector)? as i32;
            let low = decoder.read_bits(k1)?;
            // put the corrector back together
            (high << k1) | low as i32
        };

        // translate c back into its correct interval
        if c >= (1u32 << (k - 1)) as i32 {
            // into [ 2^(k-1) + 1  ...  2^k ] by adding 1
            c = c.wrapping_add(1);
        } else {
            // into [ - (2^k - 1)  ...  - (2^(k-1)) ] by subtracting (2^k - 1)
            c -= ((1u32 << k) - 1) as i32;
        }
        Ok(c)
    }
}

pub struct IntegerDecompressorBuilder {
    bits: u32,
    contexts: u32,
    bits_high: u32,
    range: u32,
}

impl IntegerDecompressorBuilder {
    pub fn new() -> Self {
        Self {
            bits: DEFAULT_BITS,
            contexts: DEFAULT_CONTEXTS,
            bits_high: DEFAULT_BITS_HIGH,
            range: DEFAULT_RANGE,
        }
    }

    pub fn bits(&mut self, bits: u32) -> &mut Self {
        self.bits = bits;
        self
    }

    pub fn contexts(&mut self, contexts: u32) -> &mut Self {
        self.contexts = contexts;
        self
    }

    /// Builds the decompressor with its models allocated in `models`
    pub fn build_in(&self, models: &mut ModelArena) -> crate::Result<IntegerDecompressor> {
        IntegerDecompressor::new(models, self.bits, self.contexts, self.bits_high, self.range)
    }
}
