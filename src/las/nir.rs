//! Compression of the near infrared channel of point formats 8 and 10.
//!
//! Only a layered (version 3) algorithm exists, its layer follows the RGB one.

pub mod v3 {
    use std::io::{Cursor, Read, Write};

    use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::{
        lower_byte, read_layer, read_layer_size, reset_layer_decoder, reset_layer_encoder,
        upper_byte, write_layer, write_layer_size,
    };
    use crate::models::{ModelArena, SymbolModelId};
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    const NIR_SIZE: usize = 2;

    #[derive(Copy, Clone)]
    struct NirModels {
        bytes_used: SymbolModelId,
        diff_0: SymbolModelId,
        diff_1: SymbolModelId,
    }

    impl NirModels {
        fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                bytes_used: models.add_symbol_model(4)?,
                diff_0: models.add_symbol_model(256)?,
                diff_1: models.add_symbol_model(256)?,
            })
        }
    }

    #[derive(Default, Copy, Clone)]
    struct NirContext {
        models: Option<NirModels>,
        last_nir: u16,
        unused: bool,
    }

    #[derive(Default)]
    struct NirContexts {
        contexts: [NirContext; 4],
        last_context_used: usize,
    }

    impl NirContexts {
        fn init_with(&mut self, first: u16, context: usize, models: &mut ModelArena) -> crate::Result<()> {
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.activate(context, first, models)?;
            self.last_context_used = context;
            Ok(())
        }

        fn activate(&mut self, context: usize, last: u16, models: &mut ModelArena) -> crate::Result<()> {
            let ctx = &mut self.contexts[context];
            if ctx.models.is_none() {
                ctx.models = Some(NirModels::new(models)?);
            }
            ctx.last_nir = last;
            ctx.unused = false;
            Ok(())
        }

        /// Switches to `context`, returns its models and the index of
        /// the context holding the value to predict from
        fn switch_to(
            &mut self,
            context: usize,
            models: &mut ModelArena,
        ) -> crate::Result<(NirModels, usize)> {
            let mut last_index = self.last_context_used;
            if last_index != context {
                self.last_context_used = context;
                if self.contexts[context].unused {
                    let last = self.contexts[last_index].last_nir;
                    self.activate(context, last, models)?;
                    last_index = context;
                }
            }
            let nir_models = match self.contexts[context].models {
                Some(nir_models) => nir_models,
                None => {
                    let nir_models = NirModels::new(models)?;
                    self.contexts[context].models = Some(nir_models);
                    nir_models
                }
            };
            Ok((nir_models, last_index))
        }
    }

    pub struct NirCompressor {
        encoder: ArithmeticEncoder<Cursor<Vec<u8>>>,
        nir_has_changed: bool,
        contexts: NirContexts,
    }

    impl Default for NirCompressor {
        fn default() -> Self {
            Self {
                encoder: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                nir_has_changed: false,
                contexts: NirContexts::default(),
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for NirCompressor {
        fn size_of_field(&self) -> usize {
            NIR_SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            reset_layer_encoder(&mut self.encoder);
            self.nir_has_changed = false;
            let nir = u16::from_le_bytes([first_point[0], first_point[1]]);
            dst.write_u16::<LittleEndian>(nir)?;
            self.contexts
                .init_with(nir, *context, self.encoder.models_mut())
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let (models, last_index) =
                self.contexts.switch_to(*context, self.encoder.models_mut())?;
            let last = self.contexts.contexts[last_index].last_nir;
            let current = u16::from_le_bytes([current_point[0], current_point[1]]);

            let sym = (lower_byte(last) != lower_byte(current)) as u32
                | ((upper_byte(last) != upper_byte(current)) as u32) << 1;
            self.encoder.encode_symbol(models.bytes_used, sym)?;
            if is_nth_bit_set!(sym, 0) {
                let diff = lower_byte(current).wrapping_sub(lower_byte(last));
                self.encoder.encode_symbol(models.diff_0, u32::from(diff))?;
            }
            if is_nth_bit_set!(sym, 1) {
                let diff = upper_byte(current).wrapping_sub(upper_byte(last));
                self.encoder.encode_symbol(models.diff_1, u32::from(diff))?;
            }
            if sym != 0 {
                self.nir_has_changed = true;
            }
            self.contexts.contexts[last_index].last_nir = current;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()> {
            write_layer_size(&mut self.encoder, self.nir_has_changed, dst)
        }

        fn write_layers(&mut self, dst: &mut W) -> crate::Result<()> {
            write_layer(&self.encoder, self.nir_has_changed, dst)
        }
    }

    pub struct NirDecompressor {
        decoder: ArithmeticDecoder<Cursor<Vec<u8>>>,
        changed_nir: bool,
        layer_size: usize,
        contexts: NirContexts,
    }

    impl Default for NirDecompressor {
        fn default() -> Self {
            Self {
                decoder: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                changed_nir: false,
                layer_size: 0,
                contexts: NirContexts::default(),
            }
        }
    }

    impl<R: Read> LayeredFieldDecompressor<R> for NirDecompressor {
        fn size_of_field(&self) -> usize {
            NIR_SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            reset_layer_decoder(&mut self.decoder);
            let nir = src.read_u16::<LittleEndian>()?;
            first_point[..NIR_SIZE].copy_from_slice(&nir.to_le_bytes());
            self.contexts
                .init_with(nir, *context, self.decoder.models_mut())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let (models, last_index) =
                self.contexts.switch_to(*context, self.decoder.models_mut())?;
            let last = self.contexts.contexts[last_index].last_nir;

            let nir = if self.changed_nir {
                let sym = self.decoder.decode_symbol(models.bytes_used)?;
                let lower = if is_nth_bit_set!(sym, 0) {
                    let corr = self.decoder.decode_symbol(models.diff_0)? as u8;
                    corr.wrapping_add(lower_byte(last))
                } else {
                    lower_byte(last)
                };
                let upper = if is_nth_bit_set!(sym, 1) {
                    let corr = self.decoder.decode_symbol(models.diff_1)? as u8;
                    corr.wrapping_add(upper_byte(last))
                } else {
                    upper_byte(last)
                };
                u16::from_le_bytes([lower, upper])
            } else {
                last
            };
            self.contexts.contexts[last_index].last_nir = nir;
            current_point[..NIR_SIZE].copy_from_slice(&nir.to_le_bytes());
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()> {
            self.layer_size = read_layer_size(src)?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> crate::Result<()> {
            self.changed_nir = read_layer(src, self.layer_size, &mut self.decoder)?;
            Ok(())
        }
    }

    #[cfg(test)]
    mod test {
        use super::*;

        fn compress(values: &[(u16, usize)]) -> Vec<u8> {
            let mut compressor = NirCompressor::default();
            let mut dst = Cursor::new(Vec::<u8>::new());
            for (i, (nir, context)) in values.iter().enumerate() {
                let mut context = *context;
                let bytes = nir.to_le_bytes();
                if i == 0 {
                    compressor
                        .init_first_point(&mut dst, &bytes, &mut context)
                        .unwrap();
                } else {
                    LayeredFieldCompressor::<Cursor<Vec<u8>>>::compress_field_with(
                        &mut compressor,
                        &bytes,
                        &mut context,
                    )
                    .unwrap();
                }
            }
            compressor.write_layers_sizes(&mut dst).unwrap();
            compressor.write_layers(&mut dst).unwrap();
            dst.into_inner()
        }

        fn decompress(data: Vec<u8>, contexts: &[usize]) -> Vec<u16> {
            let mut decompressor = NirDecompressor::default();
            let mut src = Cursor::new(data);
            let mut buf = [0u8; NIR_SIZE];
            let mut values = Vec::with_capacity(contexts.len());
            for (i, context) in contexts.iter().enumerate() {
                let mut context = *context;
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
                values.push(u16::from_le_bytes(buf));
            }
            values
        }

        #[test]
        fn test_constant_nir_writes_empty_layer() {
            let values = vec![(0xBEEFu16, 2usize); 20];
            let data = compress(&values);
            assert_eq!(data, vec![0xEF, 0xBE, 0, 0, 0, 0]);
            assert_eq!(decompress(data, &[2; 20]), vec![0xBEEF; 20]);
        }

        #[test]
        fn test_round_trip_with_context_switches() {
            let values: Vec<(u16, usize)> = (0..400u32)
                .map(|i| ((i * 613 % 65_536) as u16, ((i / 3) % 4) as usize))
                .collect();
            let contexts: Vec<usize> = values.iter().map(|(_, c)| *c).collect();
            let expected: Vec<u16> = values.iter().map(|(v, _)| *v).collect();
            let data = compress(&values);
            assert_eq!(decompress(data, &contexts), expected);
        }
    }
}
