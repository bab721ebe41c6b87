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


//! Little-endian packing of the fixed size fields found in LAS points.
//!
//! Buffers handed to these functions are sized by the point layout,
//! a too short buffer is a bug of the caller and panics.

pub trait Packable {
    type Type;

    fn unpack_from(input: &[u8]) -> Self::Type;
    fn pack_into(&self, output: &mut [u8]);
}

macro_rules! impl_packable_for_primitive {
    ($type:ty, $size:expr) => {
        impl Packable for $type {
            type Type = $type;

            #[inline]
            fn unpack_from(input: &[u8]) -> Self::Type {
                let mut bytes = [0u8; $size];
                bytes.copy_from_slice(&input[..$size]);
                <$type>::from_le_bytes(bytes)
            }

            #[inline]
            fn pack_into(&self, output: &mut [u8]) {
                output[..$size].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

impl_packable_for_primitive!(u8, 1);
impl_packable_for_primitive!(i8, 1);
impl_packable_for_primitive!(u16, 2);
impl_packable_for_primitive!(i16, 2);
impl_packable_for_primitive!(u32, 4);
impl_packable_for_primitive!(i32, 4);
impl_packable_for_primitive!(u64, 8);
impl_packable_for_primitive!(f32, 4);
impl_packable_for_primitive!(f64, 8);

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_packer() {
        let in_val: i32 = -25;
        let mut buf = [0u8; std::mem::size_of::<i32>()];
        in_val.pack_into(&mut buf);
        let v = i32::unpack_from(&buf);
        assert_eq!(v, in_val);
    }

    #[test]
    fn test_packing_is_little_endian() {
        let mut buf = [0u8; 4];
        0x0403_0201u32.pack_into(&mut buf);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(u16::unpack_from(&buf[2..]), 0x0403);
    }

    #[test]
    fn test_f64_keeps_bit_pattern() {
        let value = f64::from_bits(0x7FF8_0000_0000_0001);
        let mut buf = [0u8; 8];
        value.pack_into(&mut buf);
        assert_eq!(f64::unpack_from(&buf).to_bits(), 0x7FF8_0000_0000_0001);
    }
}
