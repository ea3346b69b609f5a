//! Compact leaf-set bitsets used to encode clades and bipartitions.
//!
//! Bit `i` stands for the taxon with index `i` in the sorted taxon list of a
//! [`TreeSnapshot`](crate::snapshot::TreeSnapshot). For taxa [A, B, C, D]:
//! - clade {A, C} → `0b0101`
//! - clade {B, C, D} → `0b1110`

/// A set of leaf indices packed into `u64` words.
///
/// Bits past the number of leaves are always zero, so two bitsets built for
/// the same taxon set compare equal exactly when they hold the same leaves.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bitset(pub Vec<u64>);

impl Bitset {
    /// Number of words needed to hold `num_leaves` bits.
    pub fn words_for(num_leaves: usize) -> usize {
        num_leaves.div_ceil(64)
    }

    /// An empty set with room for `words * 64` leaves.
    ///
    /// ```
    /// # use tree_distance_logger::bitset::Bitset;
    /// let bs = Bitset::zeros(Bitset::words_for(100));
    /// assert_eq!(bs.0.len(), 2);
    /// ```
    pub fn zeros(words: usize) -> Self {
        Bitset(vec![0u64; words])
    }

    /// Adds leaf `idx` to the set.
    #[inline]
    pub fn set(&mut self, idx: usize) {
        self.0[idx >> 6] |= 1u64 << (idx & 63);
    }

    #[inline]
    pub fn contains(&self, idx: usize) -> bool {
        self.0[idx >> 6] & (1u64 << (idx & 63)) != 0
    }

    /// In-place union: `self` becomes `self ∪ other`.
    ///
    /// ```
    /// # use tree_distance_logger::bitset::Bitset;
    /// let mut left = Bitset::zeros(1);
    /// left.set(0);
    /// let mut right = Bitset::zeros(1);
    /// right.set(1);
    /// left.or_assign(&right);
    /// assert_eq!(left.0[0], 0b11);
    /// ```
    #[inline]
    pub fn or_assign(&mut self, other: &Bitset) {
        for (a, b) in self.0.iter_mut().zip(&other.0) {
            *a |= *b;
        }
    }

    /// Number of leaves in the set.
    #[inline]
    pub fn count_ones(&self) -> usize {
        self.0.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// The leaves of `0..num_leaves` that are not in this set.
    ///
    /// Bits at or above `num_leaves` stay cleared.
    pub fn complement(&self, num_leaves: usize) -> Bitset {
        let mut out = Bitset(self.0.iter().map(|w| !w).collect());
        let tail = num_leaves & 63;
        if tail != 0 {
            if let Some(last) = out.0.last_mut() {
                *last &= (1u64 << tail) - 1;
            }
        }
        out
    }
}
