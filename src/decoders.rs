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

// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
//                       ****************************                        -
//                        ARITHMETIC CODING EXAMPLES                         -
//                       ****************************                        -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// Fast arithmetic coding implementation                                     -
// -> 32-bit variables, 32-bit product, periodic updates, table decoding     -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// Version 1.00  -  April 25, 2004                                           -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
//                                  WARNING                                  -
//                                 =========                                 -
//                                                                           -
// The only purpose of this program is to demonstrate the basic principles   -
// of arithmetic coding. The original version of this code can be found in   -
// Digital Signal Compression: Principles and Practice                       -
// (Cambridge University Press, 2011, ISBN: 9780511984655)                   -
//                                                                           -
// Copyright (c) 2019 by Amir Said (said@ieee.org) &                         -
//                       William A. Pearlman (pearlw@ecse.rpi.edu)           -
//                                                                           -
// Redistribution and use in source and binary forms, with or without        -
// modification, are permitted provided that the following conditions are    -
// met:                                                                      -
//                                                                           -
// 1. Redistributions of source code must retain the above copyright notice, -
// this list of conditions and the following disclaimer.                     -
//                                                                           -
// 2. Redistributions in binary form must reproduce the above copyright      -
// notice, this list of conditions and the following disclaimer in the       -
// documentation and/or other materials provided with the distribution.      -
//                                                                           -
// THIS SOFTWARE IS PROVIDED BY THE COPYRIGHT HOLDERS AND CONTRIBUTORS       -
// "AS IS" AND ANY EXPRESS OR IMPLIED WARRANTIES, INCLUDING, BUT NOT LIMITED -
// TO, THE IMPLIED WARRANTIES OF MERCHANTABILITY AND FITNESS FOR A           -
// PARTICULAR PURPOSE ARE DISCLAIMED. IN NO EVENT SHALL THE COPYRIGHT HOLDER -
// OR CONTRIBUTORS BE LIABLE FOR ANY DIRECT, INDIRECT, INCIDENTAL, SPECIAL,  -
// EXEMPLARY, OR CONSEQUENTIAL DAMAGES (INCLUDING, BUT NOT LIMITED TO,       -
// PROCUREMENT OF SUBSTITUTE GOODS OR SERVICES; LOSS OF USE, DATA, OR        -
// PROFITS; OR BUSINESS INTERRUPTION) HOWEVER CAUSED AND ON ANY THEORY OF    -
// LIABILITY, WHETHER IN CONTRACT, STRICT LIABILITY, OR TORT (INCLUDING      -
// NEGLIGENCE OR OTHERWISE) ARISING IN ANY WAY OUT OF THE USE OF THIS        -
// SOFTWARE, EVEN IF ADVISED OF THE POSSIBILITY OF SUCH DAMAGE.              -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -
//                                                                           -
// A description of the arithmetic coding method used here is available in   -
//                                                                           -
// Lossless Compression Handbook, ed. K. Sayood                              -
// Chapter 5: Arithmetic Coding (A. Said), pp. 101-152, Academic Press, 2003 -
//                                                                           -
// A. Said, Introduction to Arithetic Coding Theory and Practice             -
// HP Labs report HPL-2004-76  -  http://www.hpl.hp.com/techreports/         -
//                                                                           -
// - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - - -

//! The arithmetic decoder, reading from any [`Read`] source.

use byteorder::ReadBytesExt;
use std::io::Read;

use crate::models::{BitModelId, ModelArena, SymbolModelId, BM_LENGTH_SHIFT, DM_LENGTH_SHIFT};
use crate::LasZipError;

// maximum AC interval length
pub const AC_MAX_LENGTH: u32 = 0xFFFF_FFFF;
// threshold for renormalization
pub const AC_MIN_LENGTH: u32 = 0x0100_0000;

pub struct ArithmeticDecoder<R: Read> {
    in_stream: R,
    value: u32,
    length: u32,
    models: ModelArena,
}

impl<R: Read> ArithmeticDecoder<R> {
    pub fn new(in_stream: R) -> Self {
        Self {
            in_stream,
            value: 0,
            length: AC_MAX_LENGTH,
            models: ModelArena::new(false),
        }
    }

    /// Resets the coder state and every model allocated in the arena.
    pub fn reset(&mut self) {
        self.value = 0;
        self.length = AC_MAX_LENGTH;
        self.models.reset();
    }

    pub fn models(&self) -> &ModelArena {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelArena {
        &mut self.models
    }

    pub fn read_init_bytes(&mut self) -> crate::Result<()> {
        let mut v = [0u8; 4];
        self.in_stream.read_exact(&mut v)?;
        self.value = u32::from_be_bytes(v);
        self.length = AC_MAX_LENGTH;
        Ok(())
    }

    pub fn decode_bit(&mut self, id: BitModelId) -> crate::Result<u32> {
        self.check_interval()?;
        let model = self.models.bit_model_mut(id);
        let x = model.bit_0_prob * (self.length >> BM_LENGTH_SHIFT); // product l x p0
        let sym = self.value >= x;

        if !sym {
            self.length = x;
            model.bit_0_count += 1;
        } else {
            self.value -= x;
            self.length -= x;
        }
        model.bits_until_update -= 1;
        if model.bits_until_update == 0 {
            model.update();
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }
        Ok(sym as u32)
    }

    pub fn decode_symbol(&mut self, id: SymbolModelId) -> crate::Result<u32> {
        self.check_interval()?;
        let model = self.models.symbol_model(id);
        let mut sym;
        let x;
        let mut y = self.length;

        if !model.decoder_table.is_empty() {
            // use table look-up for faster decoding
            self.length >>= DM_LENGTH_SHIFT;
            let dv = self.value / self.length;
            let t = (dv >> model.table_shift) as usize;

            // initial decision based on table look-up
            sym = model.decoder_table[t];
            let mut n = model.decoder_table[t + 1] + 1;

            // finish with bisection search
            while n > sym + 1 {
                let k = (sym + n) >> 1;
                if model.distribution[k as usize] > dv {
                    n = k;
                } else {
                    sym = k;
                }
            }
            // compute products
            x = model.distribution[sym as usize] * self.length;
            if sym != model.last_symbol {
                y = model.distribution[sym as usize + 1] * self.length;
            }
        } else {
            let mut lower = 0;
            sym = 0;
            self.length >>= DM_LENGTH_SHIFT;
            let mut n = model.symbols;
            let mut k = n >> 1;
            // bisection search of the symbol, a do-while in disguise
            loop {
                let z = self.length * model.distribution[k as usize];
                if z > self.value {
                    n = k;
                    y = z; // value is smaller
                } else {
                    sym = k;
                    lower = z; // value is larger or equal
                }
                k = (sym + n) >> 1;
                if k == sym {
                    break;
                }
            }
            x = lower;
        }

        // update interval
        self.value -= x;
        self.length = y - x;

        let model = self.models.symbol_model_mut(id);
        model.symbol_count[sym as usize] += 1;
        model.symbols_until_update -= 1;
        if model.symbols_until_update == 0 {
            model.update();
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }
        Ok(sym)
    }

    pub fn read_bit(&mut self) -> crate::Result<u32> {
        self.read_uniform(1)
    }

    pub fn read_bits(&mut self, mut bits: u32) -> crate::Result<u32> {
        debug_assert!(bits > 0 && (bits <= 32));
        if bits > 19 {
            let lower = u32::from(self.read_short()?);
            bits -= 16;
            let upper = self.read_uniform(bits)? << 16;
            Ok(upper | lower)
        } else {
            self.read_uniform(bits)
        }
    }

    pub fn read_byte(&mut self) -> crate::Result<u8> {
        Ok(self.read_uniform(8)? as u8)
    }

    pub fn read_short(&mut self) -> crate::Result<u16> {
        Ok(self.read_uniform(16)? as u16)
    }

    pub fn read_int(&mut self) -> crate::Result<u32> {
        let lower_int = self.read_short()?;
        let upper_int = self.read_short()?;
        Ok(u32::from(upper_int) << 16 | u32::from(lower_int))
    }

    pub fn read_int_64(&mut self) -> crate::Result<u64> {
        let lower_int = u64::from(self.read_int()?);
        let upper_int = u64::from(self.read_int()?);
        Ok((upper_int << 32) | lower_int)
    }

    pub fn get_ref(&self) -> &R {
        &self.in_stream
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.in_stream
    }

    pub fn into_inner(self) -> R {
        self.in_stream
    }

    #[inline]
    fn read_uniform(&mut self, bits: u32) -> crate::Result<u32> {
        self.check_interval()?;
        // decode symbol, change length
        self.length >>= bits;
        let sym = self.value / self.length;
        if bits < 32 && sym >= (1u32 << bits) {
            return Err(LasZipError::CorruptStream);
        }
        // update interval
        self.value -= self.length * sym;

        if self.length < AC_MIN_LENGTH {
            self.renorm_dec_interval()?;
        }
        Ok(sym)
    }

    /// A valid stream always keeps the code value inside the interval
    #[inline(always)]
    fn check_interval(&self) -> crate::Result<()> {
        if self.value >= self.length {
            Err(LasZipError::CorruptStream)
        } else {
            Ok(())
        }
    }

    fn renorm_dec_interval(&mut self) -> crate::Result<()> {
        loop {
            self.value = (self.value << 8) | u32::from(self.in_stream.read_u8()?);
            self.length <<= 8;
            if self.length >= AC_MIN_LENGTH {
                break;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_init_bytes_are_big_endian() {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![1u8, 2, 3, 4]));
        decoder.read_init_bytes().unwrap();
        assert_eq!(decoder.value, 0x0102_0304);
    }

    #[test]
    fn test_missing_init_bytes_is_truncation() {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![1u8, 2]));
        assert!(matches!(
            decoder.read_init_bytes(),
            Err(LasZipError::TruncatedStream)
        ));
    }

    #[test]
    fn test_impossible_state_is_reported() {
        let mut decoder = ArithmeticDecoder::new(Cursor::new(vec![0xFFu8; 16]));
        let id = decoder.models_mut().add_symbol_model(300).unwrap();
        decoder.read_init_bytes().unwrap();
        assert!(matches!(
            decoder.decode_symbol(id),
            Err(LasZipError::CorruptStream)
        ));
    }
}
