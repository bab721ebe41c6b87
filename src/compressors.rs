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

//! Compression of integers as a corrector of a prediction.

use std::io::Write;

use crate::encoders::ArithmeticEncoder;
use crate::models::{BitModelId, ModelArena, SymbolModelId};
use crate::LasZipError;

pub const DEFAULT_BITS: u32 = 16;
pub const DEFAULT_CONTEXTS: u32 = 1;
pub const DEFAULT_BITS_HIGH: u32 = 8;
pub const DEFAULT_RANGE: u32 = 0;

/// The interval a corrector is folded into, shared by the compressor
/// and the decompressor.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct CorrectorRange {
    pub(crate) corr_bits: u32,
    pub(crate) corr_range: u32,
    pub(crate) corr_min: i32,
    pub(crate) corr_max: i32,
}

impl CorrectorRange {
    pub(crate) fn new(bits: u32, mut range: u32) -> Self {
        if range != 0 {
            let corr_range = range;
            let mut corr_bits = 0;
            while range != 0 {
                range >>= 1;
                corr_bits += 1;
            }
            if corr_range == (1u32 << (corr_bits - 1)) {
                corr_bits -= 1;
            }
            // the corrector must fall into this interval
            let corr_min = -((corr_range / 2) as i32);
            Self {
                corr_bits,
                corr_range,
                corr_min,
                corr_max: corr_min + (corr_range - 1) as i32,
            }
        } else if bits >= 1 && bits < 32 {
            let corr_range = 1u32 << bits;
            let corr_min = -((corr_range / 2) as i32);
            Self {
                corr_bits: bits,
                corr_range,
                corr_min,
                corr_max: corr_min + (corr_range - 1) as i32,
            }
        } else {
            Self {
                corr_bits: 32,
                corr_range: 0,
                corr_min: i32::MIN,
                corr_max: i32::MAX,
            }
        }
    }

    /// Number of symbols of the model coding the corrector of `k` bits
    pub(crate) fn corrector_symbols(k: u32, bits_high: u32) -> u32 {
        if k <= bits_high {
            1 << k
        } else {
            1 << bits_high
        }
    }
}

/// Handles of the models an integer compressor or decompressor codes with.
#[derive(Debug, Clone)]
pub(crate) struct IntegerModels {
    pub(crate) m_bits: Vec<SymbolModelId>,
    pub(crate) m_corrector_0: BitModelId,
    pub(crate) m_corrector: Vec<SymbolModelId>,
}

impl IntegerModels {
    pub(crate) fn allocate(
        models: &mut ModelArena,
        range: &CorrectorRange,
        contexts: u32,
        bits_high: u32,
    ) -> crate::Result<Self> {
        let m_bits = models.add_symbol_models(range.corr_bits + 1, contexts as usize)?;
        let m_corrector_0 = models.add_bit_model();
        let m_corrector = (1..=range.corr_bits)
            .map(|k| models.add_symbol_model(CorrectorRange::corrector_symbols(k, bits_high)))
            .collect::<crate::Result<Vec<_>>>()?;
        Ok(Self {
            m_bits,
            m_corrector_0,
            m_corrector,
        })
    }

    #[inline]
    pub(crate) fn bits_model(&self, context: u32) -> crate::Result<SymbolModelId> {
        self.m_bits
            .get(context as usize)
            .copied()
            .ok_or(LasZipError::ModelOverflow {
                symbol: context,
                symbols: self.m_bits.len() as u32,
            })
    }
}

#[derive(Debug, Clone)]
pub struct IntegerCompressor {
    k: u32,
    bits_high: u32,
    range: CorrectorRange,
    models: IntegerModels,
}

impl IntegerCompressor {
    /// Creates the compressor, its models are allocated in `models`
    /// which must be the arena of the encoder it will write to.
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

    /// The number of bits of the last corrector compressed
    pub fn k(&self) -> u32 {
        self.k
    }

    pub fn compress<W: Write>(
        &mut self,
        encoder: &mut ArithmeticEncoder<W>,
        pred: i32,
        real: i32,
        context: u32,
    ) -> crate::Result<()> {
        let models = &self.models;
        let range = &self.range;

        // the corrector will be within the interval [ - (corr_range - 1)  ...  + (corr_range - 1) ]
        let mut c = real.wrapping_sub(pred);
        // we fold the corrector into the interval [ corr_min  ...  corr_max ]
        if c < range.corr_min {
            c = c.wrapping_add(range.corr_range as i32);
        } else if c > range.corr_max {
            c = c.wrapping_sub(range.corr_range as i32);
        }

        // find the tightest interval [ - (2^k - 1)  ...  + (2^k) ] that contains c
        // by checking the absolute value of c (adjusted for the case that c is 2^k)
        let mut c1 = if c <= 0 { c.wrapping_neg() } else { c - 1 } as u32;
        self.k = 0;
        while c1 != 0 {
            c1 >>= 1;
            self.k += 1;
        }
        let k = self.k;

        // the number k is between 0 and corr_bits and describes the interval the corrector
        encoder.encode_symbol(models.bits_model(context)?, k)?;

        if k == 0 {
            // then c is 0 or 1
            debug_assert!(c == 0 || c == 1);
            encoder.encode_bit(models.m_corrector_0, c as u32)?;
        } else if k < 32 {
            // translate the corrector c into the k-bit interval [ 0 ... 2^k - 1 ]
            if c >= 0 {
                // into [ 2^(k-1) ...  + 2^k - 1 ] by subtracting 1
                c -= 1;
            } else {
                // into [ 0 ...  + 2^(k-1) - 1 ] by adding (2^k - 1)
                c += ((1u32 << k) - 1) as i32;
            }

            let corrector = models.m_corrector[(k - 1) as usize];
            if k <= self.bits_high {
                // for small k we code the interval in one step
                encoder.encode_symbol(corrector, c as u32)?;
            } else {
                // for larger k we need to code the interval in two steps
                let k1 = k - self.bits_high;
                // the lowest k1 bits are stored raw
                let low = (c as u32) & ((1u32 << k1) - 1);
                // the highest bits_high bits use a context table
                encoder.encode_symbol(corrector, (c >> k1) as u32)?;
                encoder.write_bits(k1, low)?;
            }
        }
        Ok(())
    }
}

pub struct IntegerCompressorBuilder {
    bits: u32,
    contexts: u32,
    bits_high: u32,
    range: u32,
}

impl IntegerCompressorBuilder {
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

    /// Builds the compressor with its models allocated in `models`
    pub fn build_in(&self, models: &mut ModelArena) -> crate::Result<IntegerCompressor> {
        IntegerCompressor::new(models, self.bits, self.contexts, self.bits_high, self.range)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoders::ArithmeticDecoder;
    use crate::decompressors::IntegerDecompressorBuilder;
    use std::io::Cursor;

    #[test]
    fn test_corrector_ranges() {
        let r = CorrectorRange::new(16, 0);
        assert_eq!(r.corr_bits, 16);
        assert_eq!(r.corr_min, -32768);
        assert_eq!(r.corr_max, 32767);

        let r = CorrectorRange::new(32, 0);
        assert_eq!(r.corr_bits, 32);
        assert_eq!(r.corr_range, 0);

        let r = CorrectorRange::new(16, 256);
        assert_eq!(r.corr_bits, 8);
        assert_eq!(r.corr_min, -128);
        assert_eq!(r.corr_max, 127);
    }

    #[test]
    fn test_compress_extreme_correctors() {
        let values = [
            (0, 0),
            (0, 1),
            (1, 0),
            (-5, 300),
            (1000, -1000),
            (i32::MAX, i32::MIN),
            (i32::MIN, i32::MAX),
            (0, i32::MIN),
            (123_456, 123_457),
        ];
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut ic = IntegerCompressorBuilder::new()
            .bits(32)
            .contexts(3)
            .build_in(encoder.models_mut())
            .unwrap();
        for (i, (pred, real)) in values.iter().enumerate() {
            ic.compress(&mut encoder, *pred, *real, (i % 3) as u32).unwrap();
        }
        encoder.done().unwrap();

        let data = encoder.into_inner().into_inner();
        let mut decoder = ArithmeticDecoder::new(Cursor::new(data));
        let mut id = IntegerDecompressorBuilder::new()
            .bits(32)
            .contexts(3)
            .build_in(decoder.models_mut())
            .unwrap();
        decoder.read_init_bytes().unwrap();
        for (i, (pred, real)) in values.iter().enumerate() {
            let decompressed = id.decompress(&mut decoder, *pred, (i % 3) as u32).unwrap();
            assert_eq!(decompressed, *real);
        }
    }

    #[test]
    fn test_wrong_context_is_reported() {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut ic = IntegerCompressorBuilder::new()
            .contexts(2)
            .build_in(encoder.models_mut())
            .unwrap();
        assert!(ic.compress(&mut encoder, 0, 1, 1).is_ok());
        assert!(matches!(
            ic.compress(&mut encoder, 0, 1, 2),
            Err(LasZipError::ModelOverflow {
                symbol: 2,
                symbols: 2
            })
        ));
    }
}
