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

//! The arithmetic encoder, writing to any [`Write`] destination.

use std::io::Write;

use crate::decoders::{AC_MAX_LENGTH, AC_MIN_LENGTH};
use crate::models::{BitModelId, ModelArena, SymbolModelId, BM_LENGTH_SHIFT, DM_LENGTH_SHIFT};
use crate::LasZipError;

const AC_BUFFER_SIZE: usize = 1024;

/// Range encoder with carry propagation.
///
/// Bytes are staged in a circular buffer of two halves, a half is only
/// given to the output stream once the other half starts being filled
/// so that carries can still reach it.
pub struct ArithmeticEncoder<W: Write> {
    out_buffer: Vec<u8>,
    out_byte: usize,
    end_byte: usize,

    base: u32,
    length: u32,

    models: ModelArena,
    out_stream: W,
}

impl<W: Write> ArithmeticEncoder<W> {
    pub fn new(out_stream: W) -> Self {
        Self {
            out_buffer: vec![0u8; 2 * AC_BUFFER_SIZE],
            out_byte: 0,
            end_byte: 2 * AC_BUFFER_SIZE,
            base: 0,
            length: AC_MAX_LENGTH,
            models: ModelArena::new(true),
            out_stream,
        }
    }

    /// Resets the coder state and every model allocated in the arena.
    pub fn reset(&mut self) {
        self.base = 0;
        self.length = AC_MAX_LENGTH;
        self.out_byte = 0;
        self.end_byte = 2 * AC_BUFFER_SIZE;
        self.models.reset();
    }

    pub fn models(&self) -> &ModelArena {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut ModelArena {
        &mut self.models
    }

    /// Flushes the final bytes, after that the encoder must be `reset`
    /// before being used again.
    pub fn done(&mut self) -> crate::Result<()> {
        // done encoding: set final data bytes
        let init_base = self.base;
        let another_byte;

        if self.length > 2 * AC_MIN_LENGTH {
            // base offset
            self.base = self.base.wrapping_add(AC_MIN_LENGTH);
            // set new length for 1 more byte
            self.length = AC_MIN_LENGTH >> 1;
            another_byte = true;
        } else {
            // base offset
            self.base = self.base.wrapping_add(AC_MIN_LENGTH >> 1);
            // set new length for 2 more bytes
            self.length = AC_MIN_LENGTH >> 9;
            another_byte = false;
        }

        if init_base > self.base {
            self.propagate_carry();
        }
        self.renorm_enc_interval()?;

        if self.end_byte != 2 * AC_BUFFER_SIZE {
            debug_assert!(self.out_byte < AC_BUFFER_SIZE);
            self.out_stream
                .write_all(&self.out_buffer[AC_BUFFER_SIZE..2 * AC_BUFFER_SIZE])?;
        }

        if self.out_byte != 0 {
            self.out_stream.write_all(&self.out_buffer[..self.out_byte])?;
        }

        // write two or three zero bytes to be in sync with the decoder's byte reads
        self.out_stream.write_all(&[0u8, 0u8])?;
        if another_byte {
            self.out_stream.write_all(&[0u8])?;
        }
        Ok(())
    }

    pub fn encode_bit(&mut self, id: BitModelId, bit: u32) -> crate::Result<()> {
        debug_assert!(bit <= 1);
        let model = self.models.bit_model_mut(id);
        // product l x p0
        let x = model.bit_0_prob * (self.length >> BM_LENGTH_SHIFT);

        // update interval
        if bit == 0 {
            self.length = x;
            model.bit_0_count += 1;
        } else {
            let init_base = self.base;
            self.base = self.base.wrapping_add(x);
            self.length -= x;
            if init_base > self.base {
                // overflow = carry
                self.propagate_carry();
            }
        }

        let model = self.models.bit_model_mut(id);
        model.bits_until_update -= 1;
        if model.bits_until_update == 0 {
            model.update();
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        Ok(())
    }

    pub fn encode_symbol(&mut self, id: SymbolModelId, sym: u32) -> crate::Result<()> {
        let model = self.models.symbol_model(id);
        if sym > model.last_symbol {
            return Err(LasZipError::ModelOverflow {
                symbol: sym,
                symbols: model.symbols,
            });
        }

        let init_base = self.base;
        // compute products
        if sym == model.last_symbol {
            let x = model.distribution[sym as usize] * (self.length >> DM_LENGTH_SHIFT);
            self.base = self.base.wrapping_add(x); // update interval
            self.length -= x; // no product needed
        } else {
            self.length >>= DM_LENGTH_SHIFT;
            let x = model.distribution[sym as usize] * self.length;
            self.base = self.base.wrapping_add(x); // update interval
            self.length = model.distribution[(sym + 1) as usize] * self.length - x;
        }

        if init_base > self.base {
            self.propagate_carry();
        }

        let model = self.models.symbol_model_mut(id);
        model.symbol_count[sym as usize] += 1;
        model.symbols_until_update -= 1;
        if model.symbols_until_update == 0 {
            model.update();
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        Ok(())
    }

    /// Encodes a bit without modelling
    pub fn write_bit(&mut self, sym: u32) -> crate::Result<()> {
        debug_assert!(sym <= 1);
        self.write_uniform(1, sym)
    }

    /// Encodes `bits` raw bits of `sym`, without modelling
    pub fn write_bits(&mut self, mut bits: u32, mut sym: u32) -> crate::Result<()> {
        debug_assert!(bits > 0 && bits <= 32);
        debug_assert!(bits == 32 || sym < (1u32 << bits));

        if bits > 19 {
            self.write_short((sym & u32::from(u16::MAX)) as u16)?;
            sym >>= 16;
            bits -= 16;
        }
        self.write_uniform(bits, sym)
    }

    pub fn write_byte(&mut self, sym: u8) -> crate::Result<()> {
        self.write_uniform(8, u32::from(sym))
    }

    pub fn write_short(&mut self, sym: u16) -> crate::Result<()> {
        self.write_uniform(16, u32::from(sym))
    }

    pub fn write_int(&mut self, sym: u32) -> crate::Result<()> {
        // lower 16 bits
        self.write_short((sym & 0xFFFF_u32) as u16)?;
        // upper 16 bits
        self.write_short((sym >> 16) as u16)
    }

    pub fn write_int64(&mut self, sym: u64) -> crate::Result<()> {
        // lower 32 bits
        self.write_int((sym & 0xFFFF_FFFF) as u32)?;
        // upper 32 bits
        self.write_int((sym >> 32) as u32)
    }

    pub fn get_ref(&self) -> &W {
        &self.out_stream
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.out_stream
    }

    pub fn into_inner(self) -> W {
        self.out_stream
    }

    #[inline]
    fn write_uniform(&mut self, bits: u32, sym: u32) -> crate::Result<()> {
        let init_base = self.base;
        // new interval base and length
        self.length >>= bits;
        self.base = self.base.wrapping_add(sym * self.length);

        // overflow = carry
        if init_base > self.base {
            self.propagate_carry();
        }

        if self.length < AC_MIN_LENGTH {
            self.renorm_enc_interval()?;
        }
        Ok(())
    }

    fn propagate_carry(&mut self) {
        let last = 2 * AC_BUFFER_SIZE - 1;
        let mut b = if self.out_byte == 0 {
            last
        } else {
            self.out_byte - 1
        };

        while self.out_buffer[b] == 0xFF {
            self.out_buffer[b] = 0;
            b = if b == 0 { last } else { b - 1 };
        }
        self.out_buffer[b] += 1;
    }

    fn renorm_enc_interval(&mut self) -> crate::Result<()> {
        loop {
            debug_assert!(self.out_byte < self.end_byte);
            self.out_buffer[self.out_byte] = (self.base >> 24) as u8;
            self.out_byte += 1;
            if self.out_byte == self.end_byte {
                self.manage_out_buffer()?;
            }
            self.base <<= 8;
            self.length <<= 8; // length multiplied by 256
            if self.length >= AC_MIN_LENGTH {
                break;
            }
        }
        Ok(())
    }

    fn manage_out_buffer(&mut self) -> crate::Result<()> {
        if self.out_byte == 2 * AC_BUFFER_SIZE {
            self.out_byte = 0;
        }
        self.out_stream
            .write_all(&self.out_buffer[self.out_byte..self.out_byte + AC_BUFFER_SIZE])?;
        self.end_byte = self.out_byte + AC_BUFFER_SIZE;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoders::ArithmeticDecoder;
    use std::io::Cursor;

    #[test]
    fn test_done_on_empty_encoder() {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        encoder.done().unwrap();
        assert_eq!(encoder.get_ref().get_ref(), &[1u8, 0, 0, 0]);
    }

    #[test]
    fn test_symbol_out_of_alphabet() {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let id = encoder.models_mut().add_symbol_model(4).unwrap();
        encoder.encode_symbol(id, 3).unwrap();
        let result = encoder.encode_symbol(id, 4);
        assert!(matches!(
            result,
            Err(LasZipError::ModelOverflow {
                symbol: 4,
                symbols: 4
            })
        ));
    }

    #[test]
    fn test_mixed_symbols_bits_and_raw_values() {
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let sym_id = encoder.models_mut().add_symbol_model(256).unwrap();
        let small_id = encoder.models_mut().add_symbol_model(5).unwrap();
        let bit_id = encoder.models_mut().add_bit_model();

        for i in 0..20_000u32 {
            encoder.encode_symbol(sym_id, (i * 7) % 256).unwrap();
            encoder.encode_symbol(small_id, i % 5).unwrap();
            encoder.encode_bit(bit_id, (i % 3 == 0) as u32).unwrap();
            encoder.write_bits(23, (i * 313) & 0x7F_FFFF).unwrap();
            encoder.write_int64(u64::from(i) << 33 | 0xABCD).unwrap();
        }
        encoder.done().unwrap();
        let data = encoder.into_inner().into_inner();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(data.as_slice()));
        let sym_id = decoder.models_mut().add_symbol_model(256).unwrap();
        let small_id = decoder.models_mut().add_symbol_model(5).unwrap();
        let bit_id = decoder.models_mut().add_bit_model();
        decoder.read_init_bytes().unwrap();
        for i in 0..20_000u32 {
            assert_eq!(decoder.decode_symbol(sym_id).unwrap(), (i * 7) % 256);
            assert_eq!(decoder.decode_symbol(small_id).unwrap(), i % 5);
            assert_eq!(decoder.decode_bit(bit_id).unwrap(), (i % 3 == 0) as u32);
            assert_eq!(decoder.read_bits(23).unwrap(), (i * 313) & 0x7F_FFFF);
            assert_eq!(decoder.read_int_64().unwrap(), u64::from(i) << 33 | 0xABCD);
        }
        // the decoder consumes exactly what the encoder produced
        assert_eq!(decoder.get_ref().position(), data.len() as u64);
    }
}
