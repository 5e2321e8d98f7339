use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not, Sub};

use super::{Cap, CAP_BITMASK};

/// A bit vector over the capabilities in the registry; the representation of one capability
/// set.
///
/// Bit `n` corresponds to capability number `n`, exactly as the kernel lays out its sets.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(from = "u64", into = "u64"))]
#[derive(Copy, Clone, Default, Eq, Hash, PartialEq)]
pub struct CapSet {
    pub(super) bits: u64,
}

impl CapSet {
    #[inline]
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    /// A set containing every capability in the registry.
    ///
    /// Note that the running kernel may not support all of them; see [`Cap::probe_supported()`].
    #[inline]
    pub const fn full() -> Self {
        Self { bits: CAP_BITMASK }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.bits = 0;
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.bits.count_ones() as usize
    }

    #[inline]
    pub fn has(&self, cap: Cap) -> bool {
        self.bits & cap.to_single_bitfield() != 0
    }

    #[inline]
    pub fn add(&mut self, cap: Cap) {
        self.bits |= cap.to_single_bitfield();
    }

    #[inline]
    pub fn drop(&mut self, cap: Cap) {
        self.bits &= !cap.to_single_bitfield();
    }

    pub fn set_state(&mut self, cap: Cap, val: bool) {
        if val {
            self.add(cap);
        } else {
            self.drop(cap);
        }
    }

    /// Check whether every capability in `other` is also in this set.
    #[inline]
    pub fn is_superset(&self, other: Self) -> bool {
        self.bits & other.bits == other.bits
    }

    #[inline]
    pub fn iter(&self) -> CapSetIterator {
        self.into_iter()
    }

    #[inline]
    pub const fn union(&self, other: Self) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    #[inline]
    pub const fn intersection(&self, other: Self) -> Self {
        Self {
            bits: self.bits & other.bits,
        }
    }

    /// The raw bitmask (bit `n` is capability number `n`).
    #[inline]
    pub const fn bits(&self) -> u64 {
        self.bits
    }

    /// Build a set from a raw bitmask, discarding bits that are not in the registry.
    #[inline]
    pub const fn from_bitmask_truncate(bitmask: u64) -> Self {
        Self {
            bits: bitmask & CAP_BITMASK,
        }
    }

    /// Build a set from the two 32-bit halves the kernel uses.
    #[inline]
    pub(crate) const fn from_bitmasks_u32(lower: u32, upper: u32) -> Self {
        Self::from_bitmask_truncate(((upper as u64) << 32) | (lower as u64))
    }

    /// Split the set into the two 32-bit halves the kernel uses (lower word first).
    #[inline]
    pub(crate) const fn to_bitmasks_u32(self) -> (u32, u32) {
        (self.bits as u32, (self.bits >> 32) as u32)
    }
}

impl From<u64> for CapSet {
    #[inline]
    fn from(bits: u64) -> Self {
        Self::from_bitmask_truncate(bits)
    }
}

impl From<CapSet> for u64 {
    #[inline]
    fn from(set: CapSet) -> Self {
        set.bits
    }
}

impl Not for CapSet {
    type Output = Self;

    #[inline]
    fn not(self) -> Self::Output {
        Self {
            bits: (!self.bits) & CAP_BITMASK,
        }
    }
}

impl BitAnd for CapSet {
    type Output = Self;

    #[inline]
    fn bitand(self, rhs: Self) -> Self::Output {
        self.intersection(rhs)
    }
}

impl BitAndAssign for CapSet {
    #[inline]
    fn bitand_assign(&mut self, rhs: Self) {
        self.bits &= rhs.bits;
    }
}

impl BitOr for CapSet {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self::Output {
        self.union(rhs)
    }
}

impl BitOrAssign for CapSet {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.bits |= rhs.bits;
    }
}

impl Sub for CapSet {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            bits: self.bits & (!rhs.bits),
        }
    }
}

impl Extend<Cap> for CapSet {
    #[inline]
    fn extend<I: IntoIterator<Item = Cap>>(&mut self, it: I) {
        for cap in it {
            self.add(cap);
        }
    }
}

impl FromIterator<Cap> for CapSet {
    #[inline]
    fn from_iter<I: IntoIterator<Item = Cap>>(it: I) -> Self {
        let mut res = Self::empty();
        res.extend(it);
        res
    }
}

impl IntoIterator for CapSet {
    type Item = Cap;
    type IntoIter = CapSetIterator;

    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        CapSetIterator { bits: self.bits }
    }
}

impl fmt::Debug for CapSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A helper macro to statically construct a `CapSet` from a list of capabilities.
///
/// ```
/// use capng::capset;
/// use capng::{Cap, CapSet};
///
/// assert_eq!(capset!(), CapSet::empty());
/// assert_eq!(capset!(Cap::CHOWN, Cap::SYSLOG), [Cap::CHOWN, Cap::SYSLOG].iter().copied().collect::<CapSet>());
/// ```
#[macro_export]
macro_rules! capset {
    () => {
        $crate::CapSet::empty()
    };
    ($cap:expr$(, $caps:expr)* $(,)?) => {
        $crate::CapSet::from_bitmask_truncate((1 << ($cap as u8)) $(| (1 << ($caps as u8)))*)
    };
}

/// An iterator over the capabilities in a [`CapSet`], in numeric order.
#[derive(Clone, Debug)]
pub struct CapSetIterator {
    bits: u64,
}

impl Iterator for CapSetIterator {
    type Item = Cap;

    fn next(&mut self) -> Option<Cap> {
        if self.bits == 0 {
            return None;
        }

        let code = self.bits.trailing_zeros();
        // Clear the lowest raised bit
        self.bits &= self.bits - 1;
        Cap::from_code(code)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.bits.count_ones() as usize;
        (len, Some(len))
    }
}

impl ExactSizeIterator for CapSetIterator {}

impl std::iter::FusedIterator for CapSetIterator {}
