//! Ciphertext and plaintext value types.

use serde::{Deserialize, Serialize};

use crate::math::RnsPoly;

/// RLWE ciphertext: an ordered sequence of polynomial parts, a fixed-point
/// scale, a level and a domain flag.
///
/// A part may be **absent**, which is a sparsity marker rather than an
/// error state: absent acts as the additive identity under addition and
/// the absorbing element under multiplication. The multi-key layer uses
/// this to skip arithmetic for participants that never touched a
/// ciphertext.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Ciphertext {
    /// Polynomial parts; `parts[0]` is the shared component.
    pub parts: Vec<Option<RnsPoly>>,
    /// Fixed-point scaling factor of the encoded values.
    pub scale: f64,
    /// Number of active moduli minus one.
    pub level: usize,
    /// Whether the parts are in the transform domain.
    pub is_ntt: bool,
}

impl Ciphertext {
    /// Create a ciphertext of `degree + 1` absent parts.
    pub fn new(degree: usize, level: usize, scale: f64, is_ntt: bool) -> Self {
        Self {
            parts: vec![None; degree + 1],
            scale,
            level,
            is_ntt,
        }
    }

    /// Degree: number of parts minus one.
    pub fn degree(&self) -> usize {
        self.parts.len() - 1
    }

    /// Borrow part `i`, `None` when absent.
    pub fn part(&self, i: usize) -> Option<&RnsPoly> {
        self.parts[i].as_ref()
    }
}

/// Plaintext: one polynomial carrying a scale.
///
/// Encoding numeric slots into the polynomial is the job of an outer
/// encoder; this core only consumes the already-encoded value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Plaintext {
    /// The encoded polynomial.
    pub value: RnsPoly,
    /// Fixed-point scaling factor.
    pub scale: f64,
}

impl Plaintext {
    /// Wrap an encoded polynomial.
    pub fn new(value: RnsPoly, scale: f64) -> Self {
        Self { value, scale }
    }

    /// Level of the encoded polynomial.
    pub fn level(&self) -> usize {
        self.value.level()
    }

    /// Whether the value is in the transform domain.
    pub fn is_ntt(&self) -> bool {
        self.value.is_ntt()
    }
}
