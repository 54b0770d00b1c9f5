//! RNS polynomials over a modulus chain.
//!
//! An [`RnsPoly`] stores one coefficient vector per active modulus limb,
//! together with a domain flag distinguishing the coefficient and transform
//! (NTT) representations. The number of limbs is `level + 1`; dropping
//! limbs from the top of the chain lowers the level.
//!
//! The data type is deliberately passive: all arithmetic lives on
//! [`crate::math::rns::RnsContext`], which owns the per-limb NTT tables and
//! Montgomery constants.

use serde::{Deserialize, Serialize};

/// Polynomial in RNS representation over an active modulus chain.
///
/// # Fields
///
/// * `limbs` - One residue vector per modulus, `limbs[j][c]` being the
///   residue of coefficient `c` modulo the j-th chain modulus
/// * `is_ntt` - Whether the limbs hold transform-domain values
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RnsPoly {
    limbs: Vec<Vec<u64>>,
    is_ntt: bool,
}

impl RnsPoly {
    /// Create a zero polynomial with `level + 1` limbs of dimension `n`,
    /// in coefficient domain.
    pub fn zero(n: usize, level: usize) -> Self {
        Self {
            limbs: vec![vec![0u64; n]; level + 1],
            is_ntt: false,
        }
    }

    /// Build a polynomial from raw limbs.
    pub fn from_limbs(limbs: Vec<Vec<u64>>, is_ntt: bool) -> Self {
        debug_assert!(!limbs.is_empty(), "polynomial needs at least one limb");
        debug_assert!(
            limbs.iter().all(|l| l.len() == limbs[0].len()),
            "limbs must share the ring dimension"
        );
        Self { limbs, is_ntt }
    }

    /// Ring dimension.
    pub fn dimension(&self) -> usize {
        self.limbs[0].len()
    }

    /// Current level (number of active limbs minus one).
    pub fn level(&self) -> usize {
        self.limbs.len() - 1
    }

    /// Whether the limbs are in the transform domain.
    pub fn is_ntt(&self) -> bool {
        self.is_ntt
    }

    /// Mark the domain flag without touching the data.
    ///
    /// Only for callers that transformed the limbs themselves (for example
    /// a transform-domain permutation that preserves the representation).
    pub fn set_ntt_flag(&mut self, is_ntt: bool) {
        self.is_ntt = is_ntt;
    }

    /// Borrow limb `j`.
    pub fn limb(&self, j: usize) -> &[u64] {
        &self.limbs[j]
    }

    /// Mutably borrow limb `j`.
    pub fn limb_mut(&mut self, j: usize) -> &mut [u64] {
        &mut self.limbs[j]
    }

    /// Borrow all limbs.
    pub fn limbs(&self) -> &[Vec<u64>] {
        &self.limbs
    }

    /// Remove the top `count` limbs, lowering the level accordingly.
    ///
    /// # Panics
    ///
    /// Panics if the polynomial would be left without limbs.
    pub fn drop_limbs(&mut self, count: usize) {
        assert!(
            count < self.limbs.len(),
            "cannot drop all limbs of a polynomial"
        );
        self.limbs.truncate(self.limbs.len() - count);
    }

    /// Clone the polynomial truncated to `level + 1` limbs.
    pub fn clone_at_level(&self, level: usize) -> Self {
        debug_assert!(level <= self.level(), "cannot clone above own level");
        Self {
            limbs: self.limbs[..=level].to_vec(),
            is_ntt: self.is_ntt,
        }
    }

    /// True if every active residue is zero.
    pub fn is_zero(&self) -> bool {
        self.limbs.iter().all(|l| l.iter().all(|&c| c == 0))
    }
}
