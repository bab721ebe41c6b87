//! Compression of the wave packet descriptor item of point formats 4, 5, 9 and 10.

use crate::packers::Packable;

/// ASPRS definition of wavepacket data.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Wavepacket {
    pub descriptor_index: u8,
    // offset in bytes to waveform data
    pub offset: u64,
    // in bytes
    pub size: u32,
    pub return_point: f32,
    pub dx: f32,
    pub dy: f32,
    pub dz: f32,
}

impl Wavepacket {
    pub const SIZE: usize = 29;
}

impl Packable for Wavepacket {
    type Type = Wavepacket;

    fn unpack_from(input: &[u8]) -> Self::Type {
        Self {
            descriptor_index: input[0],
            offset: u64::unpack_from(&input[1..9]),
            size: u32::unpack_from(&input[9..13]),
            return_point: f32::unpack_from(&input[13..17]),
            dx: f32::unpack_from(&input[17..21]),
            dy: f32::unpack_from(&input[21..25]),
            dz: f32::unpack_from(&input[25..29]),
        }
    }

    fn pack_into(&self, output: &mut [u8]) {
        output[0] = self.descriptor_index;
        self.offset.pack_into(&mut output[1..9]);
        self.size.pack_into(&mut output[9..13]);
        self.return_point.pack_into(&mut output[13..17]);
        self.dx.pack_into(&mut output[17..21]);
        self.dy.pack_into(&mut output[21..25]);
        self.dz.pack_into(&mut output[25..29]);
    }
}

// the floats are predicted through their bit patterns
#[inline]
fn float_bits(v: f32) -> i32 {
    v.to_bits() as i32
}

#[inline]
fn float_from_bits(v: i32) -> f32 {
    f32::from_bits(v as u32)
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

    use super::{float_bits, float_from_bits, Wavepacket};

    const DX_CONTEXT: u32 = 0;
    const DY_CONTEXT: u32 = 1;
    const DZ_CONTEXT: u32 = 2;

    // Symbols of the offset model
    const OFFSET_UNCHANGED: u32 = 0;
    const OFFSET_FOLLOWS_LAST: u32 = 1;
    const OFFSET_DIFF_32: u32 = 2;
    const OFFSET_FULL: u32 = 3;

    /// Models and prediction state needed to code one wavepacket
    /// against the previous one.
    pub(crate) struct PacketCompressor {
        packet_index: SymbolModelId,
        offset_diff: [SymbolModelId; 4],
        ic_offset_diff: IntegerCompressor,
        ic_packet_size: IntegerCompressor,
        ic_return_point: IntegerCompressor,
        ic_xyz: IntegerCompressor,
        last_diff_32: i32,
        sym_last_offset_diff: u32,
    }

    impl PacketCompressor {
        pub(crate) fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                packet_index: models.add_symbol_model(256)?,
                offset_diff: [
                    models.add_symbol_model(4)?,
                    models.add_symbol_model(4)?,
                    models.add_symbol_model(4)?,
                    models.add_symbol_model(4)?,
                ],
                ic_offset_diff: IntegerCompressorBuilder::new().bits(32).build_in(models)?,
                ic_packet_size: IntegerCompressorBuilder::new().bits(32).build_in(models)?,
                ic_return_point: IntegerCompressorBuilder::new().bits(32).build_in(models)?,
                // 3 contexts as this is used to compress dx, dy, dz
                ic_xyz: IntegerCompressorBuilder::new()
                    .bits(32)
                    .contexts(3)
                    .build_in(models)?,
                last_diff_32: 0,
                sym_last_offset_diff: 0,
            })
        }

        pub(crate) fn reset_prediction(&mut self) {
            self.last_diff_32 = 0;
            self.sym_last_offset_diff = 0;
        }

        pub(crate) fn compress<W: Write>(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            current: &Wavepacket,
            last: &Wavepacket,
        ) -> crate::Result<()> {
            encoder.encode_symbol(self.packet_index, u32::from(current.descriptor_index))?;

            let offset_model = self.offset_diff[self.sym_last_offset_diff as usize];
            let diff_64 = current.offset.wrapping_sub(last.offset) as i64;
            let diff_32 = diff_64 as i32;
            if diff_64 == i64::from(diff_32) {
                let sym = if diff_32 == 0 {
                    OFFSET_UNCHANGED
                } else if diff_32 == last.size as i32 {
                    OFFSET_FOLLOWS_LAST
                } else {
                    OFFSET_DIFF_32
                };
                encoder.encode_symbol(offset_model, sym)?;
                if sym == OFFSET_DIFF_32 {
                    self.ic_offset_diff
                        .compress(encoder, self.last_diff_32, diff_32, 0)?;
                    self.last_diff_32 = diff_32;
                }
                self.sym_last_offset_diff = sym;
            } else {
                encoder.encode_symbol(offset_model, OFFSET_FULL)?;
                self.sym_last_offset_diff = OFFSET_FULL;
                encoder.write_int64(current.offset)?;
            }

            self.ic_packet_size
                .compress(encoder, last.size as i32, current.size as i32, 0)?;
            self.ic_return_point.compress(
                encoder,
                float_bits(last.return_point),
                float_bits(current.return_point),
                0,
            )?;
            self.ic_xyz
                .compress(encoder, float_bits(last.dx), float_bits(current.dx), DX_CONTEXT)?;
            self.ic_xyz
                .compress(encoder, float_bits(last.dy), float_bits(current.dy), DY_CONTEXT)?;
            self.ic_xyz
                .compress(encoder, float_bits(last.dz), float_bits(current.dz), DZ_CONTEXT)?;
            Ok(())
        }
    }

    pub(crate) struct PacketDecompressor {
        packet_index: SymbolModelId,
        offset_diff: [SymbolModelId; 4],
        ic_offset_diff: IntegerDecompressor,
        ic_packet_size: IntegerDecompressor,
        ic_return_point: IntegerDecompressor,
        ic_xyz: IntegerDecompressor,
        last_diff_32: i32,
        sym_last_offset_diff: u32,
    }

    impl PacketDecompressor {
        pub(crate) fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                packet_index: models.add_symbol_model(256)?,
                offset_diff: [
                    models.add_symbol_model(4)?,
                    models.add_symbol_model(4)?,
                    models.add_symbol_model(4)?,
                    models.add_symbol_model(4)?,
                ],
                ic_offset_diff: IntegerDecompressorBuilder::new().bits(32).build_in(models)?,
                ic_packet_size: IntegerDecompressorBuilder::new().bits(32).build_in(models)?,
                ic_return_point: IntegerDecompressorBuilder::new().bits(32).build_in(models)?,
                ic_xyz: IntegerDecompressorBuilder::new()
                    .bits(32)
                    .contexts(3)
                    .build_in(models)?,
                last_diff_32: 0,
                sym_last_offset_diff: 0,
            })
        }

        pub(crate) fn reset_prediction(&mut self) {
            self.last_diff_32 = 0;
            self.sym_last_offset_diff = 0;
        }

        pub(crate) fn decompress<R: Read>(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            last: &Wavepacket,
        ) -> crate::Result<Wavepacket> {
            let mut current = Wavepacket {
                descriptor_index: decoder.decode_symbol(self.packet_index)? as u8,
                ..Default::default()
            };

            self.sym_last_offset_diff =
                decoder.decode_symbol(self.offset_diff[self.sym_last_offset_diff as usize])?;
            current.offset = match self.sym_last_offset_diff {
                OFFSET_UNCHANGED => last.offset,
                OFFSET_FOLLOWS_LAST => last.offset.wrapping_add(u64::from(last.size)),
                OFFSET_DIFF_32 => {
                    self.last_diff_32 = self.ic_offset_diff.decompress(decoder, self.last_diff_32, 0)?;
                    last.offset.wrapping_add(self.last_diff_32 as u64)
                }
                _ => decoder.read_int_64()?,
            };

            current.size = self
                .ic_packet_size
                .decompress(decoder, last.size as i32, 0)? as u32;
            current.return_point = float_from_bits(self.ic_return_point.decompress(
                decoder,
                float_bits(last.return_point),
                0,
            )?);
            current.dx = float_from_bits(self.ic_xyz.decompress(
                decoder,
                float_bits(last.dx),
                DX_CONTEXT,
            )?);
            current.dy = float_from_bits(self.ic_xyz.decompress(
                decoder,
                float_bits(last.dy),
                DY_CONTEXT,
            )?);
            current.dz = float_from_bits(self.ic_xyz.decompress(
                decoder,
                float_bits(last.dz),
                DZ_CONTEXT,
            )?);
            Ok(current)
        }
    }

    pub struct WavepacketCompressor {
        last_wavepacket: Wavepacket,
        packet: PacketCompressor,
    }

    impl WavepacketCompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last_wavepacket: Wavepacket::default(),
                packet: PacketCompressor::new(models)?,
            })
        }
    }

    impl<W: Write> FieldCompressor<W> for WavepacketCompressor {
        fn size_of_field(&self) -> usize {
            Wavepacket::SIZE
        }

        fn compress_first(&mut self, dst: &mut W, buf: &[u8]) -> crate::Result<()> {
            self.last_wavepacket = Wavepacket::unpack_from(buf);
            self.packet.reset_prediction();
            dst.write_all(&buf[..Wavepacket::SIZE])?;
            Ok(())
        }

        fn compress_with(
            &mut self,
            encoder: &mut ArithmeticEncoder<W>,
            buf: &[u8],
        ) -> crate::Result<()> {
            let current = Wavepacket::unpack_from(buf);
            self.packet
                .compress(encoder, &current, &self.last_wavepacket)?;
            self.last_wavepacket = current;
            Ok(())
        }
    }

    pub struct WavepacketDecompressor {
        last_wavepacket: Wavepacket,
        packet: PacketDecompressor,
    }

    impl WavepacketDecompressor {
        pub fn new(models: &mut ModelArena) -> crate::Result<Self> {
            Ok(Self {
                last_wavepacket: Wavepacket::default(),
                packet: PacketDecompressor::new(models)?,
            })
        }
    }

    impl<R: Read> FieldDecompressor<R> for WavepacketDecompressor {
        fn size_of_field(&self) -> usize {
            Wavepacket::SIZE
        }

        fn decompress_first(&mut self, src: &mut R, first_point: &mut [u8]) -> crate::Result<()> {
            self.last_wavepacket =
                read_and_unpack::<_, Wavepacket>(src, &mut first_point[..Wavepacket::SIZE])?;
            self.packet.reset_prediction();
            Ok(())
        }

        fn decompress_with(
            &mut self,
            decoder: &mut ArithmeticDecoder<R>,
            buf: &mut [u8],
        ) -> crate::Result<()> {
            self.last_wavepacket = self.packet.decompress(decoder, &self.last_wavepacket)?;
            self.last_wavepacket.pack_into(buf);
            Ok(())
        }
    }
}

pub mod v3 {
    //! Same algorithm as v1, each of the 4 contexts owns its models
    //! and the packets of a chunk are stored in their own layer.
    use std::io::{Cursor, Read, Write};

    use crate::decoders::ArithmeticDecoder;
    use crate::encoders::ArithmeticEncoder;
    use crate::las::utils::{
        read_and_unpack, read_layer, read_layer_size, reset_layer_decoder, reset_layer_encoder,
        write_layer, write_layer_size,
    };
    use crate::models::ModelArena;
    use crate::packers::Packable;
    use crate::record::{LayeredFieldCompressor, LayeredFieldDecompressor};
    use crate::LasZipError;

    use super::v1::{PacketCompressor, PacketDecompressor};
    use super::Wavepacket;

    trait PacketCoder: Sized {
        fn create(models: &mut ModelArena) -> crate::Result<Self>;
        fn reset_prediction(&mut self);
    }

    impl PacketCoder for PacketCompressor {
        fn create(models: &mut ModelArena) -> crate::Result<Self> {
            PacketCompressor::new(models)
        }

        fn reset_prediction(&mut self) {
            PacketCompressor::reset_prediction(self)
        }
    }

    impl PacketCoder for PacketDecompressor {
        fn create(models: &mut ModelArena) -> crate::Result<Self> {
            PacketDecompressor::new(models)
        }

        fn reset_prediction(&mut self) {
            PacketDecompressor::reset_prediction(self)
        }
    }

    struct WavepacketContext<C> {
        coder: Option<C>,
        last: Wavepacket,
        unused: bool,
    }

    struct WavepacketContexts<C> {
        contexts: [WavepacketContext<C>; 4],
        last_context_used: usize,
    }

    impl<C: PacketCoder> Default for WavepacketContexts<C> {
        fn default() -> Self {
            let context = || WavepacketContext {
                coder: None,
                last: Wavepacket::default(),
                unused: true,
            };
            Self {
                contexts: [context(), context(), context(), context()],
                last_context_used: 0,
            }
        }
    }

    impl<C: PacketCoder> WavepacketContexts<C> {
        fn init_with(
            &mut self,
            first: Wavepacket,
            context: usize,
            models: &mut ModelArena,
        ) -> crate::Result<()> {
            for ctx in &mut self.contexts {
                ctx.unused = true;
            }
            self.activate(context, first, models)?;
            self.last_context_used = context;
            Ok(())
        }

        fn activate(
            &mut self,
            context: usize,
            last: Wavepacket,
            models: &mut ModelArena,
        ) -> crate::Result<()> {
            let ctx = &mut self.contexts[context];
            match ctx.coder.as_mut() {
                Some(coder) => coder.reset_prediction(),
                None => ctx.coder = Some(C::create(models)?),
            }
            ctx.last = last;
            ctx.unused = false;
            Ok(())
        }

        /// Switches to `context`, returns the index of the context
        /// holding the value to predict from
        fn switch_to(&mut self, context: usize, models: &mut ModelArena) -> crate::Result<usize> {
            let mut last_index = self.last_context_used;
            if last_index != context {
                self.last_context_used = context;
                if self.contexts[context].unused {
                    let last = self.contexts[last_index].last;
                    self.activate(context, last, models)?;
                    last_index = context;
                }
            }
            Ok(last_index)
        }

        /// The coder of `context` along with the value to predict from
        fn coder_and_last(
            &mut self,
            context: usize,
            last_index: usize,
        ) -> crate::Result<(&mut C, Wavepacket)> {
            let last = self.contexts[last_index].last;
            let coder = self.contexts[context]
                .coder
                .as_mut()
                .ok_or(LasZipError::CorruptStream)?;
            Ok((coder, last))
        }
    }

    pub struct WavepacketCompressor {
        encoder: ArithmeticEncoder<Cursor<Vec<u8>>>,
        wavepacket_has_changed: bool,
        contexts: WavepacketContexts<PacketCompressor>,
    }

    impl Default for WavepacketCompressor {
        fn default() -> Self {
            Self {
                encoder: ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new())),
                wavepacket_has_changed: false,
                contexts: WavepacketContexts::default(),
            }
        }
    }

    impl<W: Write> LayeredFieldCompressor<W> for WavepacketCompressor {
        fn size_of_field(&self) -> usize {
            Wavepacket::SIZE
        }

        fn init_first_point(
            &mut self,
            dst: &mut W,
            first_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            reset_layer_encoder(&mut self.encoder);
            self.wavepacket_has_changed = false;
            dst.write_all(&first_point[..Wavepacket::SIZE])?;
            self.contexts.init_with(
                Wavepacket::unpack_from(first_point),
                *context,
                self.encoder.models_mut(),
            )
        }

        fn compress_field_with(
            &mut self,
            current_point: &[u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let last_index = self.contexts.switch_to(*context, self.encoder.models_mut())?;
            let mut last_bytes = [0u8; Wavepacket::SIZE];
            self.contexts.contexts[last_index]
                .last
                .pack_into(&mut last_bytes);
            if last_bytes[..] != current_point[..Wavepacket::SIZE] {
                self.wavepacket_has_changed = true;
            }

            let current = Wavepacket::unpack_from(current_point);
            let (coder, last) = self.contexts.coder_and_last(*context, last_index)?;
            coder.compress(&mut self.encoder, &current, &last)?;
            self.contexts.contexts[last_index].last = current;
            Ok(())
        }

        fn write_layers_sizes(&mut self, dst: &mut W) -> crate::Result<()> {
            write_layer_size(&mut self.encoder, self.wavepacket_has_changed, dst)
        }

        fn write_layers(&mut self, dst: &mut W) -> crate::Result<()> {
            write_layer(&self.encoder, self.wavepacket_has_changed, dst)
        }
    }

    pub struct WavepacketDecompressor {
        decoder: ArithmeticDecoder<Cursor<Vec<u8>>>,
        changed_wavepacket: bool,
        layer_size: usize,
        contexts: WavepacketContexts<PacketDecompressor>,
    }

    impl Default for WavepacketDecompressor {
        fn default() -> Self {
            Self {
                decoder: ArithmeticDecoder::new(Cursor::new(Vec::<u8>::new())),
                changed_wavepacket: false,
                layer_size: 0,
                contexts: WavepacketContexts::default(),
            }
        }
    }

    impl<R: Read> LayeredFieldDecompressor<R> for WavepacketDecompressor {
        fn size_of_field(&self) -> usize {
            Wavepacket::SIZE
        }

        fn init_first_point(
            &mut self,
            src: &mut R,
            first_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            reset_layer_decoder(&mut self.decoder);
            let first =
                read_and_unpack::<_, Wavepacket>(src, &mut first_point[..Wavepacket::SIZE])?;
            self.contexts
                .init_with(first, *context, self.decoder.models_mut())
        }

        fn decompress_field_with(
            &mut self,
            current_point: &mut [u8],
            context: &mut usize,
        ) -> crate::Result<()> {
            let last_index = self.contexts.switch_to(*context, self.decoder.models_mut())?;
            if self.changed_wavepacket {
                let (coder, last) = self.contexts.coder_and_last(*context, last_index)?;
                let current = coder.decompress(&mut self.decoder, &last)?;
                self.contexts.contexts[last_index].last = current;
            }
            self.contexts.contexts[last_index]
                .last
                .pack_into(current_point);
            Ok(())
        }

        fn read_layers_sizes(&mut self, src: &mut R) -> crate::Result<()> {
            self.layer_size = read_layer_size(src)?;
            Ok(())
        }

        fn read_layers(&mut self, src: &mut R) -> crate::Result<()> {
            self.changed_wavepacket = read_layer(src, self.layer_size, &mut self.decoder)?;
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
    use crate::record::{
        FieldCompressor, FieldDecompressor, LayeredFieldCompressor, LayeredFieldDecompressor,
    };

    fn make_packets() -> Vec<Wavepacket> {
        let mut offset = 1_000u64;
        (0..200u32)
            .map(|i| {
                let size = 64 + (i % 3) * 8;
                let packet = Wavepacket {
                    descriptor_index: (i % 2) as u8 + 1,
                    offset,
                    size,
                    return_point: 12.5 + i as f32 * 0.25,
                    dx: 0.001 * i as f32,
                    dy: -0.002,
                    dz: 1.0 / (i + 1) as f32,
                };
                offset = match i % 10 {
                    // contiguous packets
                    0..=5 => offset + u64::from(size),
                    6 => offset,
                    7 => offset + 17,
                    8 => offset.saturating_sub(300),
                    _ => offset + (1u64 << 40),
                };
                packet
            })
            .collect()
    }

    #[test]
    fn test_pack_layout() {
        let packet = Wavepacket {
            descriptor_index: 3,
            offset: 0x0102_0304_0506_0708,
            size: 9,
            ..Default::default()
        };
        let mut buf = [0u8; Wavepacket::SIZE];
        packet.pack_into(&mut buf);
        assert_eq!(&buf[0..13], &[3, 8, 7, 6, 5, 4, 3, 2, 1, 9, 0, 0, 0]);
        assert_eq!(Wavepacket::unpack_from(&buf), packet);
    }

    #[test]
    fn test_v1_round_trip() {
        let packets = make_packets();
        let mut encoder = ArithmeticEncoder::new(Cursor::new(Vec::<u8>::new()));
        let mut compressor = v1::WavepacketCompressor::new(encoder.models_mut()).unwrap();
        let mut buf = [0u8; Wavepacket::SIZE];
        for (i, packet) in packets.iter().enumerate() {
            packet.pack_into(&mut buf);
            if i == 0 {
                compressor.compress_first(encoder.get_mut(), &buf).unwrap();
            } else {
                compressor.compress_with(&mut encoder, &buf).unwrap();
            }
        }
        encoder.done().unwrap();

        let mut decoder = ArithmeticDecoder::new(Cursor::new(encoder.into_inner().into_inner()));
        let mut decompressor = v1::WavepacketDecompressor::new(decoder.models_mut()).unwrap();
        for (i, packet) in packets.iter().enumerate() {
            if i == 0 {
                decompressor
                    .decompress_first(decoder.get_mut(), &mut buf)
                    .unwrap();
                decoder.read_init_bytes().unwrap();
            } else {
                decompressor.decompress_with(&mut decoder, &mut buf).unwrap();
            }
            assert_eq!(Wavepacket::unpack_from(&buf), *packet, "packet {}", i);
        }
    }

    #[test]
    fn test_v3_round_trip_with_context_switches() {
        let packets = make_packets();
        let contexts: Vec<usize> = (0..packets.len()).map(|i| (i / 7) % 4).collect();

        let mut compressor = v3::WavepacketCompressor::default();
        let mut dst = Cursor::new(Vec::<u8>::new());
        let mut buf = [0u8; Wavepacket::SIZE];
        for (i, packet) in packets.iter().enumerate() {
            let mut context = contexts[i];
            packet.pack_into(&mut buf);
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
        }
        compressor.write_layers_sizes(&mut dst).unwrap();
        compressor.write_layers(&mut dst).unwrap();

        let mut src = Cursor::new(dst.into_inner());
        let mut decompressor = v3::WavepacketDecompressor::default();
        for (i, packet) in packets.iter().enumerate() {
            let mut context = contexts[i];
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
            assert_eq!(Wavepacket::unpack_from(&buf), *packet, "packet {}", i);
        }
    }
}
