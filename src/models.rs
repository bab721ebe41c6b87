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

//! Adaptive probability models and the arena that owns them.
//!
//! Item codecs never hold a model directly, they hold a [`SymbolModelId`]
//! or a [`BitModelId`] into the [`ModelArena`] of the coder they write to
//! or read from.

use crate::LasZipError;

// length bits discarded before mult.
pub(crate) const DM_LENGTH_SHIFT: u32 = 15;
pub(crate) const DM_MAX_COUNT: u32 = 1 << DM_LENGTH_SHIFT; // for adaptive models

// length bits discarded before mult.
pub(crate) const BM_LENGTH_SHIFT: u32 = 13;
pub(crate) const BM_MAX_COUNT: u32 = 1 << BM_LENGTH_SHIFT; // for adaptive models

pub(crate) const MIN_SYMBOLS: u32 = 2;
pub(crate) const MAX_SYMBOLS: u32 = 1 << 11;

#[derive(Debug, Clone)]
pub struct ArithmeticModel {
    pub(crate) symbols: u32,
    pub(crate) compress: bool,

    pub(crate) distribution: Vec<u32>,
    pub(crate) symbol_count: Vec<u32>,
    pub(crate) decoder_table: Vec<u32>,

    pub(crate) total_count: u32,
    pub(crate) update_cycle: u32,
    pub(crate) symbols_until_update: u32,
    pub(crate) last_symbol: u32,
    pub(crate) table_size: u32,
    pub(crate) table_shift: u32,
}

impl ArithmeticModel {
    pub fn new(symbols: u32, compress: bool) -> crate::Result<Self> {
        if symbols < MIN_SYMBOLS || symbols > MAX_SYMBOLS {
            return Err(LasZipError::ModelOverflow {
                symbol: symbols,
                symbols: MAX_SYMBOLS,
            });
        }

        let (table_size, table_shift) = if !compress && symbols > 16 {
            let mut table_bits = 3u32;
            while symbols > (1u32 << (table_bits + 2)) {
                table_bits += 1;
            }
            (1 << table_bits, DM_LENGTH_SHIFT - table_bits)
        } else {
            (0, 0)
        };

        let mut model = Self {
            symbols,
            compress,
            distribution: vec![0u32; symbols as usize],
            symbol_count: vec![0u32; symbols as usize],
            decoder_table: if table_size > 0 {
                vec![0u32; (table_size + 2) as usize]
            } else {
                Vec::new()
            },
            total_count: 0,
            update_cycle: 0,
            symbols_until_update: 0,
            last_symbol: symbols - 1,
            table_size,
            table_shift,
        };
        model.reset();
        Ok(model)
    }

    /// Puts the model back into its equiprobable starting state.
    pub fn reset(&mut self) {
        self.total_count = 0;
        self.update_cycle = self.symbols;
        for count in &mut self.symbol_count {
            *count = 1;
        }
        self.update();
        self.update_cycle = (self.symbols + 6) >> 1;
        self.symbols_until_update = self.update_cycle;
    }

    pub fn update(&mut self) {
        // halve counts when a threshold is reached
        self.total_count += self.update_cycle;
        if self.total_count > DM_MAX_COUNT {
            self.total_count = 0;
            for symbol_count in &mut self.symbol_count {
                *symbol_count = (*symbol_count + 1) >> 1;
                self.total_count += *symbol_count;
            }
        }

        // compute cumulative distribution, decoder table
        let mut sum = 0u32;
        let scale = 0x8000_0000u32 / self.total_count;

        if self.compress || self.table_size == 0 {
            for (symbol_distribution, symbol_count) in
                self.distribution.iter_mut().zip(&self.symbol_count)
            {
                *symbol_distribution = (scale.wrapping_mul(sum)) >> (31 - DM_LENGTH_SHIFT);
                sum += *symbol_count;
            }
        } else {
            let mut s = 0usize;
            for (k, (symbol_distribution, symbol_count)) in self
                .distribution
                .iter_mut()
                .zip(&self.symbol_count)
                .enumerate()
            {
                *symbol_distribution = (scale.wrapping_mul(sum)) >> (31 - DM_LENGTH_SHIFT);
                sum += *symbol_count;
                let w = (*symbol_distribution >> self.table_shift) as usize;
                while s < w {
                    s += 1;
                    self.decoder_table[s] = (k - 1) as u32;
                }
            }
            self.decoder_table[0] = 0;
            while s <= self.table_size as usize {
                s += 1;
                self.decoder_table[s] = self.symbols - 1;
            }
        }

        // set frequency of model updates
        self.update_cycle = (5 * self.update_cycle) >> 2;
        let max_cycle = (self.symbols + 6) << 3;
        if self.update_cycle > max_cycle {
            self.update_cycle = max_cycle;
        }
        self.symbols_until_update = self.update_cycle;
    }

    /// Number of symbols of the alphabet
    pub fn symbols(&self) -> u32 {
        self.symbols
    }

    /// Sum of the symbol counts after the last update
    pub fn total_count(&self) -> u32 {
        self.total_count
    }

    #[cfg(test)]
    pub(crate) fn counts(&self) -> &[u32] {
        &self.symbol_count
    }
}

#[derive(Debug, Clone)]
pub struct ArithmeticBitModel {
    pub(crate) bit_0_count: u32,
    pub(crate) bit_count: u32,
    pub(crate) bit_0_prob: u32,
    pub(crate) bits_until_update: u32,
    pub(crate) update_cycle: u32,
}

impl ArithmeticBitModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn update(&mut self) {
        // halve counts when a threshold is reached
        self.bit_count += self.update_cycle;
        if self.bit_count > BM_MAX_COUNT {
            self.bit_count = (self.bit_count + 1) >> 1;
            self.bit_0_count = (self.bit_0_count + 1) >> 1;

            if self.bit_0_count == self.bit_count {
                self.bit_count += 1;
            }
        }

        // compute scaled bit 0 probability
        let scale = 0x8000_0000u32 / self.bit_count;
        self.bit_0_prob = (self.bit_0_count * scale) >> (31 - BM_LENGTH_SHIFT);

        // set frequency of model updates
        self.update_cycle = (5 * self.update_cycle) >> 2;
        if self.update_cycle > 64 {
            self.update_cycle = 64;
        }
        self.bits_until_update = self.update_cycle;
    }

    pub fn bit_count(&self) -> u32 {
        self.bit_count
    }

    pub fn bit_0_count(&self) -> u32 {
        self.bit_0_count
    }
}

impl Default for ArithmeticBitModel {
    fn default() -> Self {
        // initialization to equiprobable model
        Self {
            bit_0_count: 1,
            bit_count: 2,
            bit_0_prob: 1u32 << (BM_LENGTH_SHIFT - 1),
            // start with frequent updates
            bits_until_update: 4,
            update_cycle: 4,
        }
    }
}

/// Handle to a symbol model stored in a [`ModelArena`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SymbolModelId(u32);

/// Handle to a bit model stored in a [`ModelArena`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BitModelId(u32);

/// Owner of every model used together with one encoder or decoder.
///
/// Handles stay valid for the whole life of the arena, [`ModelArena::reset`]
/// only puts the models back into their initial state.
#[derive(Debug, Clone)]
pub struct ModelArena {
    compress: bool,
    symbol_models: Vec<ArithmeticModel>,
    bit_models: Vec<ArithmeticBitModel>,
}

impl ModelArena {
    pub fn new(compress: bool) -> Self {
        Self {
            compress,
            symbol_models: vec![],
            bit_models: vec![],
        }
    }

    pub fn add_symbol_model(&mut self, symbols: u32) -> crate::Result<SymbolModelId> {
        let model = ArithmeticModel::new(symbols, self.compress)?;
        self.symbol_models.push(model);
        Ok(SymbolModelId((self.symbol_models.len() - 1) as u32))
    }

    pub fn add_symbol_models(&mut self, symbols: u32, count: usize) -> crate::Result<Vec<SymbolModelId>> {
        (0..count).map(|_| self.add_symbol_model(symbols)).collect()
    }

    pub fn add_bit_model(&mut self) -> BitModelId {
        self.bit_models.push(ArithmeticBitModel::new());
        BitModelId((self.bit_models.len() - 1) as u32)
    }

    /// Returns the model held by `slot`, adding it to the arena
    /// the first time it is needed.
    pub fn lazy_symbol_model(
        &mut self,
        slot: &mut Option<SymbolModelId>,
        symbols: u32,
    ) -> crate::Result<SymbolModelId> {
        match slot {
            Some(id) => Ok(*id),
            None => {
                let id = self.add_symbol_model(symbols)?;
                *slot = Some(id);
                Ok(id)
            }
        }
    }

    #[inline(always)]
    pub fn symbol_model(&self, id: SymbolModelId) -> &ArithmeticModel {
        &self.symbol_models[id.0 as usize]
    }

    #[inline(always)]
    pub fn symbol_model_mut(&mut self, id: SymbolModelId) -> &mut ArithmeticModel {
        &mut self.symbol_models[id.0 as usize]
    }

    #[inline(always)]
    pub fn bit_model(&self, id: BitModelId) -> &ArithmeticBitModel {
        &self.bit_models[id.0 as usize]
    }

    #[inline(always)]
    pub fn bit_model_mut(&mut self, id: BitModelId) -> &mut ArithmeticBitModel {
        &mut self.bit_models[id.0 as usize]
    }

    pub fn reset(&mut self) {
        for model in &mut self.symbol_models {
            model.reset();
        }
        for model in &mut self.bit_models {
            model.reset();
        }
    }

    pub fn num_symbol_models(&self) -> usize {
        self.symbol_models.len()
    }

    pub fn num_bit_models(&self) -> usize {
        self.bit_models.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn assert_well_formed(model: &ArithmeticModel) {
        assert!(model.total_count() <= DM_MAX_COUNT);
        assert!(model.counts().iter().all(|c| *c >= 1));
    }

    #[test]
    fn test_symbol_count_limits() {
        assert!(ArithmeticModel::new(1, true).is_err());
        assert!(ArithmeticModel::new(2, true).is_ok());
        assert!(ArithmeticModel::new(2048, false).is_ok());
        assert!(matches!(
            ArithmeticModel::new(2049, true),
            Err(LasZipError::ModelOverflow { .. })
        ));
    }

    #[test]
    fn test_symbol_model_rescale_keeps_counts_positive() {
        let mut model = ArithmeticModel::new(256, true).unwrap();
        for i in 0..200_000u32 {
            // hammer a single symbol the way encoders do
            model.symbol_count[(i % 3) as usize] += 1;
            model.symbols_until_update -= 1;
            if model.symbols_until_update == 0 {
                model.update();
                assert_well_formed(&model);
            }
        }
        assert_well_formed(&model);
    }

    #[test]
    fn test_bit_model_rescale() {
        let mut model = ArithmeticBitModel::new();
        for _ in 0..100_000 {
            model.bit_0_count += 1;
            model.bits_until_update -= 1;
            if model.bits_until_update == 0 {
                model.update();
                assert!(model.bit_count() <= BM_MAX_COUNT);
                assert!(model.bit_0_count() < model.bit_count());
            }
        }
    }

    #[test]
    fn test_decoder_table_is_built_for_large_alphabets() {
        let model = ArithmeticModel::new(256, false).unwrap();
        assert_eq!(model.table_size, 64);
        assert_eq!(model.decoder_table.len(), 66);

        let model = ArithmeticModel::new(16, false).unwrap();
        assert_eq!(model.table_size, 0);

        let model = ArithmeticModel::new(256, true).unwrap();
        assert_eq!(model.table_size, 0);
    }

    #[test]
    fn test_arena_reset_keeps_handles() {
        let mut arena = ModelArena::new(true);
        let sym = arena.add_symbol_model(8).unwrap();
        let bit = arena.add_bit_model();

        arena.symbol_model_mut(sym).symbol_count[3] += 40;
        arena.symbol_model_mut(sym).update();
        arena.bit_model_mut(bit).bit_0_count += 3;
        arena.bit_model_mut(bit).update();

        arena.reset();
        let fresh = ArithmeticModel::new(8, true).unwrap();
        assert_eq!(arena.symbol_model(sym).distribution, fresh.distribution);
        assert_eq!(arena.symbol_model(sym).counts(), fresh.counts());
        assert_eq!(arena.bit_model(bit).bit_0_prob, ArithmeticBitModel::new().bit_0_prob);
        assert_eq!(arena.num_symbol_models(), 1);
        assert_eq!(arena.num_bit_models(), 1);
    }

    #[test]
    fn test_lazy_model_is_added_once() {
        let mut arena = ModelArena::new(false);
        let mut slot = None;
        let first = arena.lazy_symbol_model(&mut slot, 256).unwrap();
        let second = arena.lazy_symbol_model(&mut slot, 256).unwrap();
        assert_eq!(first, second);
        assert_eq!(slot, Some(first));
        assert_eq!(arena.num_symbol_models(), 1);
    }
}
