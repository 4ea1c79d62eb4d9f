// Copyright 2017 Matthew Plant. This file is part of Kinetic.
//
// Kinetic is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// Kinetic is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with Kinetic. If not, see <http://www.gnu.org/licenses/>.

use std::fmt::Binary;

/// A bit set of fixed, limited capacity. Collision groups and masks are
/// stored as plain integers and manipulated through this trait, one bit per
/// collision layer.
pub trait FixedSizeBitSet : Copy + Default + Binary {
    /// Maximum number of bits allowed in the set.
    const NUM_BITS: usize;

    /// Retrieve a bit value at the index.
    fn get(&self, i: usize) -> bool;

    /// Set the bit at the given index.
    fn insert(&mut self, i: usize);

    /// Unset the bit at the given index.
    fn remove(&mut self, i: usize);

    /// Returns true if any bit is set in both sets.
    fn intersects(&self, other: &Self) -> bool;
}

macro_rules! impl_bit_set {
    (
        $type:ty, $num_bits:expr
    ) => {
        impl FixedSizeBitSet for $type {
            const NUM_BITS: usize = $num_bits;

            fn get(&self, i: usize) -> bool {
                if i >= Self::NUM_BITS {
                    panic!("layer is out of bounds: the len is {} but the layer is {}",
                           Self::NUM_BITS, i);
                }
                (*self >> i & 0b_1) == 1
            }

            fn insert(&mut self, i: usize) {
                if i >= Self::NUM_BITS {
                    panic!("layer is out of bounds: the len is {} but the layer is {}",
                           Self::NUM_BITS, i);
                }
                *self |= 1 << i;
            }

            fn remove(&mut self, i: usize) {
                if i >= Self::NUM_BITS {
                    panic!("layer is out of bounds: the len is {} but the layer is {}",
                           Self::NUM_BITS, i);
                }
                *self &= !(1 << i);
            }

            fn intersects(&self, other: &Self) -> bool {
                *self & *other != 0
            }
        }
    };
}

impl_bit_set!(u8, 8);
impl_bit_set!(u16, 16);
impl_bit_set!(u32, 32);
impl_bit_set!(u64, 64);
