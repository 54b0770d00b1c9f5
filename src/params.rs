//! Parameter sets for the multi-key CKKS evaluator.
//!
//! A parameter set fixes the ring dimension, the ciphertext modulus chain
//! Q, the auxiliary key-switching chain P, the optional power-of-two
//! sub-digit base, the default encoding scale and the error width. Presets
//! search for NTT-friendly primes at runtime instead of hardcoding chain
//! constants.

use serde::{Deserialize, Serialize};

use crate::math::modular::mod_pow;
use crate::math::prime::generate_ntt_primes;

/// Generator of the rotation subgroup of the Galois group for power-of-two
/// cyclotomics.
const GALOIS_GEN: u64 = 5;

/// Core parameters of the multi-key scheme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MkParams {
    /// Ring dimension N (power of two).
    pub ring_dim: usize,

    /// Ciphertext modulus chain Q, level 0 first.
    /// Each prime must satisfy q ≡ 1 (mod 2N).
    pub moduli_q: Vec<u64>,

    /// Auxiliary chain P for key switching. May be empty (no extension).
    pub moduli_p: Vec<u64>,

    /// Power-of-two sub-digit width for the bit-decomposition path;
    /// 0 selects pure RNS digits. Requires at most one P modulus.
    pub pow2_base: usize,

    /// Default fixed-point encoding scale.
    pub scale: f64,

    /// Standard deviation for Gaussian error sampling.
    pub sigma: f64,
}

impl MkParams {
    /// Default parameters at N = 4096: a 55-bit base prime, five 45-bit
    /// rescaling primes and two 55-bit auxiliary primes.
    pub fn default_4096() -> Self {
        let n = 4096;
        let p55 = generate_ntt_primes(55, n, 3);
        let q45 = generate_ntt_primes(45, n, 5);

        let mut moduli_q = vec![p55[0]];
        moduli_q.extend_from_slice(&q45);

        Self {
            ring_dim: n,
            moduli_q,
            moduli_p: p55[1..3].to_vec(),
            pow2_base: 0,
            scale: (1u64 << 45) as f64,
            sigma: 3.2,
        }
    }

    /// Highest ciphertext level.
    pub fn max_level(&self) -> usize {
        self.moduli_q.len() - 1
    }

    /// Level of the auxiliary chain, `None` when there is no extension.
    pub fn level_p(&self) -> Option<usize> {
        if self.moduli_p.is_empty() {
            None
        } else {
            Some(self.moduli_p.len() - 1)
        }
    }

    /// Number of Q limbs grouped into one CRT digit.
    pub fn alpha(&self) -> usize {
        self.moduli_p.len().max(1)
    }

    /// Number of CRT digits at the given Q level.
    pub fn decomp_rns(&self, level_q: usize) -> usize {
        (level_q + self.alpha()) / self.alpha()
    }

    /// Number of power-of-two sub-digits per CRT digit at the given level.
    pub fn decomp_pw2(&self, level_q: usize) -> usize {
        if self.pow2_base == 0 {
            return 1;
        }
        let max_bits = self.moduli_q[..=level_q]
            .iter()
            .map(|q| 64 - q.leading_zeros() as usize)
            .max()
            .unwrap();
        (max_bits + self.pow2_base - 1) / self.pow2_base
    }

    /// The Galois group element realizing a rotation by `n` slots.
    pub fn galois_element_for_rotation(&self, n: i64) -> u64 {
        let two_n = 2 * self.ring_dim as u64;
        // Rotations form a cyclic group of order N/2 generated by 5.
        let order = self.ring_dim as i64 / 2;
        let exp = n.rem_euclid(order) as u64;
        mod_pow(GALOIS_GEN, exp, two_n)
    }

    /// Check structural validity of the parameter set.
    pub fn validate(&self) -> Result<(), &'static str> {
        if !self.ring_dim.is_power_of_two() || self.ring_dim < 8 {
            return Err("ring dimension must be a power of two >= 8");
        }
        if self.moduli_q.is_empty() {
            return Err("ciphertext chain must be non-empty");
        }
        let two_n = 2 * self.ring_dim as u64;
        let mut seen = std::collections::HashSet::new();
        for &q in self.moduli_q.iter().chain(self.moduli_p.iter()) {
            if q % two_n != 1 {
                return Err("every modulus must be 1 mod 2N");
            }
            if !seen.insert(q) {
                return Err("chain moduli must be distinct");
            }
        }
        if self.pow2_base > 0 && self.moduli_p.len() > 1 {
            return Err("bit decomposition requires at most one auxiliary modulus");
        }
        if !(self.scale > 0.0) {
            return Err("scale must be positive");
        }
        Ok(())
    }
}
