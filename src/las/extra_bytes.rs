/*
===============================================================================

  PROGRAMMERS:

    martin.isenburg@rapidlasso.com  -  http://rapidlasso.com
    uday.karan@gmail.com - Hobu, Inc.
    andrew.bell.ia@gmail.com - Hobu Inc.

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
//! Defines the different version of compressors and decompressors for ExtraBytes contained in points

/// Just re-export v1 as v2 as they are both the same implementation
pub use v1 as v2;

pub mod v1 {
    //! The Algorithm is simple:
    //! encode the difference between byte for each extra bytes
    use std::io::{Read, Write};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::models::{ModelArena, SymbolModelId};
    use crate::record::{FieldCompressor, FieldDecompressor};

    fn byte_models(models: &mut ModelArena, count: usize) -> crate::Result<Vec<SymbolModelId>> {
        models.add_symbol_models(256, count)
    }

    pub struct ExtraBytesCompressor {
        last_bytes: Vec<u8>,
        models: Vec<SymbolModelId>,
    }

    impl ExtraBytesCompressor {
        pub fn new(models: &mut ModelArena, count: usize) -> crate::Result<Self> {
            Ok(Self {
                last_bytes: vec![0u8; count],
                models: byte_models(models, count)?,
            })
        }
    }

    impl<W: Write> FieldCompressor<W> for ExtraBytesCompressor {
        fn size_of_field(&self) -> usize {
            self.last_bytes.len()
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()> {
            let count = self.last_bytes.len();
            self.last_bytes.copy_from_slice(&buf[..count]);
            dst.write_all(&buf[..count])?;
            Ok(())
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> crate::Result<()> {
            for ((last, current), model) in self
                .last_bytes
                .iter_mut()
                .zip(buf.iter())
                .zip(self.models.iter())
            {
                let diff = current.wrapping_sub(*last);
                encoder.encode_symbol(*model, u32::from(diff))?;
                *last = *current;
            }
            Ok(())
        }
    }

    pub struct ExtraBytesDecompressor {
        last_bytes: Vec<u8>,
        models: Vec<SymbolModelId>,
    }

    impl ExtraBytesDecompressor {
        pub fn new(models: &mut ModelArena, count: usize) -> crate::Result<Self> {
            Ok(Self {
                last_bytes: vec![0u8; count],
                models: byte_models(models, count)?,
            })
        }
    }

    impl<R: Read> FieldDecompressor<R> for ExtraBytesDecompressor {
        fn size_of_field(&self) -> usize {
            self.last_bytes.len()
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()> {
            let count = self.last_bytes.len();
            src.read_exact(&mut first_point[..count])?;
            self.last_bytes.copy_from_slice(&first_point[..count]);
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> crate::Result<()> {
            for ((last, out), model) in self
                .last_bytes
                .iter_mut()
                .zip(buf.iter_mut())
                .zip(self.models.iter())
            {
                let diff = decoder.decode_symbol(*model)? as u8;
                *last = last.wrapping_add(diff);
                *out = *last;
            }
            Ok(())
        }
    }
}

pub mod v3 {
    //! The algorithm is similar to v1 (& v2), the changes are
    //! that compressor / decompressor uses contexts (4)
    //! and each byte of the extra bytes is encoded in its own layer
    //! with its own encoder
    use std::io::{Cursor, Read, Write};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::{
        read_layer, read_layer_size, reset_layer_decoder, reset_layer_encoder, write_layer,
        write_layer_size,
    };
    use crate::models::SymbolModelId;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};

    struct ExtraBytesContext {
        last_bytes: Vec<u8>,
        // model of byte i lives in the arena of layer i
        models: Vec<Option<SymbolModelId>>,
        unused: bool,
    }

    struct ExtraBytesContexts {
        contexts: Vec<ExtraBytesContext>,
        last_context_used: usize,
    }

    impl ExtraBytesContexts {
        fn new(count: usize) -> Self {
            Self {
                contexts: (0..4)
                    .map(|_| ExtraBytesContext {
                        last_bytes: vec![0u8; count],
                        models: vec![None; count],
                        unused: true,
                    })
                    .collect(),
                last_context_used: 0,
            }
        }

        fn init_with(&mut self, first: &[u8], context: usize) {
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            let ctx = &mut self.contexts[context];
            ctx.last_bytes.copy_from_slice(first);
            ctx.unused = false;
            self.last_context_used = context;
        }

        /// Switches to `context`, returns the index of the context
        /// holding the bytes to predict from
        fn switch_to(&mut self, context: usize) -> usize {
            let mut last_index = self.last_context_used;
            if last_index != context {
                self.last_context_used = context;
                if self.contexts[context].unused {
                    let (src, dst) = if last_index < context {
                        let (head, tail) = self.contexts.split_at_mut(context);
                        (&head[last_index], &mut tail[0])
                    } else {
                        let (head, tail) = self.contexts.split_at_mut(last_index);
                        (&tail[0], &mut head[context])
                    };
                    dst.last_bytes.copy_from_slice(&src.last_bytes);
                    dst.unused = false;
                    last_index = context;
                }
            }
            last_index
        }
    }

    pub struct ExtraBytesCompressor {
        // Each extra bytes has is own layer, thus its own encoder
        encoders: Vec<ArithmeticEncoder<Cursor<Vec<u8>>>>,
        has_byte_changed: Vec<bool>,
        contexts: ExtraBytesContexts,
        num_extra_bytes: usize,
    }

    impl ExtraBytesCompressor {
        pub fn new(count: usize) -> Self {
            Self {
                encoders: (0..count)
                    .map(|_| ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())))
                    .collect(),
                has_byte_changed: vec![false; count],
                contexts: ExtraBytesContexts::new(count),
                num_extra_bytes: count,
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for ExtraBytesCompressor {
        fn size_of_field(&self) -> usize {
            self.num_extra_bytes
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            for encoder in &mut self.encoders {
                reset_layer_encoder(encoder);
            }
            for changed in &mut self.has_byte_changed {
                *changed = false;
            }
            let first = &first_point[..self.num_extra_bytes];
            dst.write_all(first)?;
            self.contexts.init_with(first, *context);
            Ok(())
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let last_index = self.contexts.switch_to(*context);
            for i in 0..self.num_extra_bytes {
                let diff = current_point[i].wrapping_sub(self.contexts.contexts[last_index].last_bytes[i]);
                let encoder = &mut self.encoders[i];
                let model = encoder
                    .models_mut()
                    .lazy_symbol_model(&mut self.contexts.contexts[*context].models[i], 256)?;
                encoder.encode_symbol(model, u32::from(diff))?;
                if diff != 0 {
                    self.has_byte_changed[i] = true;
                }
            }
            self.contexts.contexts[last_index]
                .last_bytes
                .copy_from_slice(&current_point[..self.num_extra_bytes]);
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()> {
            for (encoder, changed) in self.encoders.iter_mut().zip(&self.has_byte_changed) {
                write_layer_size(encoder, *changed, dst)?;
            }
            Ok(())
        }

        fn write_layers(&mut self, dst: &mut W) -> crate::Result<()> {
            for (encoder, changed) in self.encoders.iter().zip(&self.has_byte_changed) {
                write_layer(encoder, *changed, dst)?;
            }
            Ok(())
        }
    }

    pub struct ExtraBytesDecompressor {
        // Each extra bytes has is own layer, thus its own decoder
        decoders: Vec<ArithmeticDecoder<Cursor<Vec<u8>>>>,
        num_bytes_per_layer: Vec<usize>,
        has_byte_changed: Vec<bool>,
        contexts: ExtraBytesContexts,
        num_extra_bytes: usize,
    }

    impl ExtraBytesDecompressor {
        pub fn new(count: usize) -> Self {
            Self {
                decoders: (0..count)
                    .map(|_| ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())))
                    .collect(),
                num_bytes_per_layer: vec![0; count],
                has_byte_changed: vec![false; count],
                contexts: ExtraBytesContexts::new(count),
                num_extra_bytes: count,
            }
        }
    }

    impl<R: Read> LayeredFieldDecompressor<R> for ExtraBytesDecompressor {
        fn size_of_field(&self) -> usize {
            self.num_extra_bytes
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            for decoder in &mut self.decoders {
                reset_layer_decoder(decoder);
            }
            let first = &mut first_point[..self.num_extra_bytes];
            src.read_exact(first)?;
            self.contexts.init_with(first, *context);
            Ok(())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let last_index = self.contexts.switch_to(*context);
            for i in 0..self.num_extra_bytes {
                if self.has_byte_changed[i] {
                    let decoder = &mut self.decoders[i];
                    let model = decoder
                        .models_mut()
                        .lazy_symbol_model(&mut self.contexts.contexts[*context].models[i], 256)?;
                    let diff = decoder.decode_symbol(model)? as u8;
                    let last = &mut self.contexts.contexts[last_index].last_bytes[i];
                    *last = last.wrapping_add(diff);
                }
            }
            current_point[..self.num_extra_bytes]
                .copy_from_slice(&self.contexts.contexts[last_index].last_bytes);
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()> {
            for layer_size in &mut self.num_bytes_per_layer {
                *layer_size = read_layer_size(src)?;
            }
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> crate::Result<()> {
            for i in 0..self.num_extra_bytes {
                self.has_byte_changed[i] =
                    read_layer(src, self.num_bytes_per_layer[i], &mut self.decoders[i])?;
            }
            Ok(())
        }
    }
}
