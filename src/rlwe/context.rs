//! Shared arithmetic context: ring contexts, basis extender, decomposer.

use crate::math::{BasisExtender, RnsContext};
use crate::params::MkParams;

use super::decompose::Decomposer;

/// Everything derived from a parameter set that operations need to run:
/// the Q and P ring contexts, the Q x P basis extender and the digit
/// decomposer.
///
/// A context is immutable after construction and can be shared by an
/// evaluator and the key-generation routines. Scratch state lives in the
/// [`super::KeySwitcher`], not here.
#[derive(Clone, Debug)]
pub struct Context {
    /// The validated parameter set.
    pub params: MkParams,
    /// Ring arithmetic over the ciphertext chain Q.
    pub ring_q: RnsContext,
    /// Ring arithmetic over the auxiliary chain P, when present.
    pub ring_p: Option<RnsContext>,
    /// Q x P mod-down machinery, when an auxiliary chain is present.
    pub extender: Option<BasisExtender>,
    /// CRT digit decomposition tables.
    pub decomposer: Decomposer,
}

impl Context {
    /// Build the context for a parameter set.
    pub fn new(params: MkParams) -> Result<Self, &'static str> {
        params.validate()?;

        let ring_q = RnsContext::new(params.ring_dim, &params.moduli_q);
        let ring_p = if params.moduli_p.is_empty() {
            None
        } else {
            Some(RnsContext::new(params.ring_dim, &params.moduli_p))
        };
        let extender = if params.moduli_p.is_empty() {
            None
        } else {
            Some(BasisExtender::new(&params.moduli_q, &params.moduli_p))
        };
        let decomposer = Decomposer::new(&params);

        tracing::debug!(
            ring_dim = params.ring_dim,
            q_limbs = params.moduli_q.len(),
            p_limbs = params.moduli_p.len(),
            "built rlwe context"
        );

        Ok(Self {
            params,
            ring_q,
            ring_p,
            extender,
            decomposer,
        })
    }

    /// Ring dimension N.
    pub fn dimension(&self) -> usize {
        self.params.ring_dim
    }

    /// Highest ciphertext level.
    pub fn max_level(&self) -> usize {
        self.params.max_level()
    }

    /// Level of the auxiliary chain.
    pub fn level_p(&self) -> Option<usize> {
        self.params.level_p()
    }
}
