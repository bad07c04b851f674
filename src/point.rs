//! K-dimensional points over a fixed-width key type.

use crate::key::Key;

/// A fixed-length tuple of `K` keys. `K` is a tree-construction-time
/// constant (1..=6 per the data model) carried as a const generic so the
/// whole engine is monomorphized per dimension count, the way this
/// codebase's own node types are monomorphized per fixed stride size.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point<KY: Key, const K: usize>(pub [KY; K]);

impl<KY: Key, const K: usize> Point<KY, K> {
    pub fn new(values: [KY; K]) -> Self {
        Self(values)
    }

    pub fn get(&self, dimension: usize) -> KY {
        self.0[dimension]
    }

    /// Builds the K-bit hypercube address of this point at the given
    /// postfix length: bit `postfix_length` of each coordinate, dimension 0
    /// contributing the most significant bit of the address.
    pub fn hypercube_address(&self, postfix_length: u32) -> usize {
        let mut address = 0usize;
        for coordinate in self.0.iter() {
            let bit = (*coordinate >> postfix_length as usize) & KY::one();
            address = (address << 1) | usize::from(!bit.is_zero());
        }
        address
    }

    /// The divergence measure between two points: 0 if they are equal,
    /// otherwise `BITS - leading_zeros` of the OR of all per-dimension
    /// XORs. This is a *count* (1 means "differ only in the lowest bit"),
    /// not a zero-indexed bit position.
    pub fn diverging_bits(&self, other: &Self) -> u32 {
        let mut difference = KY::zero();
        for (a, b) in self.0.iter().zip(other.0.iter()) {
            difference = difference | (*a ^ *b);
        }
        if difference.is_zero() {
            0
        } else {
            KY::BITS - difference.leading_zeros()
        }
    }

    /// Returns a copy of this point canonicalized as a node prefix at the
    /// given postfix length: every coordinate has bits `<= postfix_length`
    /// zeroed, then bit `postfix_length` set. This makes the prefix the
    /// geometric center of the node's region.
    pub fn canonicalize(&self, postfix_length: u32) -> Self {
        let bits = KY::BITS;
        let mask = if postfix_length + 1 >= bits {
            KY::zero()
        } else {
            KY::max_value() << (postfix_length as usize + 1)
        };
        let center_bit = KY::one() << postfix_length as usize;
        let mut out = *self;
        for coordinate in out.0.iter_mut() {
            *coordinate = (*coordinate & mask) | center_bit;
        }
        out
    }

    /// True iff, after shifting every coordinate right by `shift` bits,
    /// `self`'s coordinates are all `>=` the corresponding coordinate of
    /// `other`. A `shift` of `KY::BITS` or more compares as trivially true
    /// (both sides shift to zero), which is what makes the root's
    /// prefix-in-window test pass unconditionally.
    pub fn ge_shifted(&self, other: &Self, shift: u32) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| Self::shr_saturating(*a, shift) >= Self::shr_saturating(*b, shift))
    }

    /// See [`Point::ge_shifted`]; the `<=` counterpart.
    pub fn le_shifted(&self, other: &Self, shift: u32) -> bool {
        self.0
            .iter()
            .zip(other.0.iter())
            .all(|(a, b)| Self::shr_saturating(*a, shift) <= Self::shr_saturating(*b, shift))
    }

    fn shr_saturating(value: KY, shift: u32) -> KY {
        if shift >= KY::BITS {
            KY::zero()
        } else {
            value >> shift as usize
        }
    }

    /// Coordinate-wise `self >= other`.
    pub fn ge(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a >= b)
    }

    /// Coordinate-wise `self <= other`.
    pub fn le(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a <= b)
    }

    /// True iff this point lies within the closed box `[min, max]`.
    pub fn in_window(&self, min: &Self, max: &Self) -> bool {
        self.ge(min) && self.le(max)
    }
}
