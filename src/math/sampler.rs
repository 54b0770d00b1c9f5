//! Gaussian, ternary and uniform sampling for key generation.

use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use super::modular::from_signed;
use super::poly::RnsPoly;

/// Default Gaussian standard deviation.
pub const DEFAULT_SIGMA: f64 = 3.2;

/// Discrete Gaussian sampler over Z.
pub struct GaussianSampler {
    sigma: f64,
    rng: ChaCha20Rng,
}

impl GaussianSampler {
    /// Create a new Gaussian sampler with given standard deviation.
    pub fn new(sigma: f64) -> Self {
        Self {
            sigma,
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Create a seeded sampler for reproducibility.
    pub fn with_seed(sigma: f64, seed: u64) -> Self {
        Self {
            sigma,
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Get the standard deviation.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Sample from the discrete Gaussian using the Box-Muller transform.
    pub fn sample(&mut self) -> i64 {
        let u1: f64 = self.rng.gen_range(0.0001..1.0);
        let u2: f64 = self.rng.gen_range(0.0..1.0);

        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        (z * self.sigma).round() as i64
    }

    /// Sample a signed error vector of length `n`.
    pub fn sample_vec(&mut self, n: usize) -> Vec<i64> {
        (0..n).map(|_| self.sample()).collect()
    }

    /// Sample a uniform ternary vector with entries in {-1, 0, 1}.
    pub fn sample_ternary_vec(&mut self, n: usize) -> Vec<i64> {
        (0..n).map(|_| self.rng.gen_range(-1i64..=1)).collect()
    }

    /// Sample a coefficient-domain RNS polynomial with uniform residues.
    pub fn sample_uniform_poly(&mut self, n: usize, moduli: &[u64]) -> RnsPoly {
        let limbs = moduli
            .iter()
            .map(|&q| (0..n).map(|_| self.rng.gen_range(0..q)).collect())
            .collect();
        RnsPoly::from_limbs(limbs, false)
    }
}

impl std::fmt::Debug for GaussianSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaussianSampler")
            .field("sigma", &self.sigma)
            .finish()
    }
}

/// Spread one signed coefficient vector across a modulus chain.
///
/// Every limb holds the same underlying integer, reduced per modulus, so
/// the result represents that small integer in RNS form.
pub fn signed_to_rns(coeffs: &[i64], moduli: &[u64]) -> RnsPoly {
    let limbs = moduli
        .iter()
        .map(|&q| coeffs.iter().map(|&v| from_signed(v, q)).collect())
        .collect();
    RnsPoly::from_limbs(limbs, false)
}
