//! CRT digit decomposition into the extended Q x P basis.
//!
//! A polynomial over the Q chain is split into `decomp_rns` digits, digit
//! `i` being its centered residue modulo the product `D_i` of `alpha`
//! consecutive chain moduli. Each digit is then lifted to every limb of
//! both chains: limbs inside the digit keep their residues verbatim, limbs
//! outside receive the exact integer lift through the approximate CRT
//! conversion with a floating-point overflow correction.
//!
//! Digits leave in the transform domain, ready for multiply-accumulate
//! against a gadget table.

use crate::math::modular::{mod_add, mod_inverse, mod_mul, mod_sub};
use crate::math::{RnsContext, RnsPoly};
use crate::params::MkParams;

use super::gadget::DecomposedPoly;

/// Conversion constants for one digit at one Q level.
#[derive(Clone, Debug)]
struct DigitTable {
    /// Q-limb range [start, end) forming the digit.
    start: usize,
    end: usize,
    /// (D/q_u)^{-1} mod q_u for limbs inside the digit.
    d_hat_inv: Vec<u64>,
    /// floor(D/2) mod q_u for limbs inside the digit.
    half_d_mod_digit: Vec<u64>,
    /// Digit moduli as f64 for the overflow correction.
    d_f64: Vec<f64>,
    /// [t][u]: (D/q_u) mod target t. Targets are the Q limbs `0..=level_q`
    /// followed by the P limbs.
    d_hat_mod_t: Vec<Vec<u64>>,
    /// D mod target t.
    d_mod_t: Vec<u64>,
    /// floor(D/2) mod target t.
    half_d_mod_t: Vec<u64>,
}

/// Precomputed digit decomposition for every reachable Q level.
#[derive(Clone, Debug)]
pub struct Decomposer {
    moduli_q: Vec<u64>,
    moduli_p: Vec<u64>,
    /// tables[level_q][digit].
    tables: Vec<Vec<DigitTable>>,
}

impl Decomposer {
    /// Precompute the digit tables for a parameter set.
    pub fn new(params: &MkParams) -> Self {
        let moduli_q = params.moduli_q.clone();
        let moduli_p = params.moduli_p.clone();
        let alpha = params.alpha();

        let mut tables = Vec::with_capacity(moduli_q.len());
        for level_q in 0..moduli_q.len() {
            let beta = params.decomp_rns(level_q);
            let mut level_tables = Vec::with_capacity(beta);
            for digit in 0..beta {
                let start = digit * alpha;
                let end = ((digit + 1) * alpha).min(level_q + 1);
                level_tables.push(DigitTable::new(
                    &moduli_q, &moduli_p, level_q, start, end,
                ));
            }
            tables.push(level_tables);
        }

        Self {
            moduli_q,
            moduli_p,
            tables,
        }
    }

    /// Number of digits at the given level.
    pub fn decomp_rns(&self, level_q: usize) -> usize {
        self.tables[level_q].len()
    }

    /// Compute digit `digit` of `cx` into `(out_q, out_p)`, in the
    /// transform domain.
    ///
    /// `cx_coeff` is the coefficient-domain input; `cx_ntt`, when given,
    /// lets limbs inside the digit be copied without re-transforming.
    pub fn decompose_single_ntt(
        &self,
        ring_q: &RnsContext,
        ring_p: Option<&RnsContext>,
        level_q: usize,
        digit: usize,
        cx_ntt: Option<&RnsPoly>,
        cx_coeff: &RnsPoly,
        out_q: &mut RnsPoly,
        mut out_p: Option<&mut RnsPoly>,
    ) {
        debug_assert!(!cx_coeff.is_ntt(), "decomposition reads coefficients");
        let dt = &self.tables[level_q][digit];
        let n = cx_coeff.dimension();
        let nd = dt.end - dt.start;

        // Limbs inside the digit hold their residues unchanged.
        for u in dt.start..dt.end {
            match cx_ntt {
                Some(ntt) => out_q.limb_mut(u).copy_from_slice(ntt.limb(u)),
                None => out_q.limb_mut(u).copy_from_slice(cx_coeff.limb(u)),
            }
        }

        // Exact centered lift to every limb outside the digit.
        let mut y = vec![0u64; nd];
        for c in 0..n {
            let mut corr = 0.5f64;
            for (idx, u) in (dt.start..dt.end).enumerate() {
                let q_u = self.moduli_q[u];
                let shifted = mod_add(cx_coeff.limb(u)[c], dt.half_d_mod_digit[idx], q_u);
                y[idx] = mod_mul(shifted, dt.d_hat_inv[idx], q_u);
                corr += y[idx] as f64 / dt.d_f64[idx];
            }
            let k = corr as u64;

            for j in 0..=level_q {
                if j >= dt.start && j < dt.end {
                    continue;
                }
                out_q.limb_mut(j)[c] = dt.lift(&y, k, j, self.moduli_q[j]);
            }
            if let Some(op) = out_p.as_deref_mut() {
                for (u, &p_u) in self.moduli_p.iter().enumerate() {
                    op.limb_mut(u)[c] = dt.lift(&y, k, level_q + 1 + u, p_u);
                }
            }
        }

        // Transform: copied NTT limbs are already done, everything else
        // goes through the per-limb forward transform.
        for j in 0..=level_q {
            let inside = j >= dt.start && j < dt.end;
            if !(inside && cx_ntt.is_some()) {
                ring_q.table(j).forward(out_q.limb_mut(j));
            }
        }
        out_q.set_ntt_flag(true);
        if let (Some(op), Some(rp)) = (out_p, ring_p) {
            for u in 0..self.moduli_p.len() {
                rp.table(u).forward(op.limb_mut(u));
            }
            op.set_ntt_flag(true);
        }
    }

    /// Full digit decomposition of a transform-domain polynomial.
    pub fn decompose(
        &self,
        ring_q: &RnsContext,
        ring_p: Option<&RnsContext>,
        level_q: usize,
        cx: &RnsPoly,
    ) -> DecomposedPoly {
        debug_assert!(cx.is_ntt(), "expected a transform-domain input");
        let mut cx_coeff = cx.clone_at_level(level_q);
        ring_q.inv_ntt_lvl(level_q, &mut cx_coeff);

        let beta = self.decomp_rns(level_q);
        let mut q_digits = Vec::with_capacity(beta);
        let mut p_digits = Vec::with_capacity(if ring_p.is_some() { beta } else { 0 });
        for digit in 0..beta {
            let mut out_q = ring_q.new_poly(level_q);
            let mut out_p = ring_p.map(|rp| rp.new_poly(rp.max_level()));
            self.decompose_single_ntt(
                ring_q,
                ring_p,
                level_q,
                digit,
                Some(cx),
                &cx_coeff,
                &mut out_q,
                out_p.as_mut(),
            );
            q_digits.push(out_q);
            if let Some(p) = out_p {
                p_digits.push(p);
            }
        }
        DecomposedPoly {
            q: q_digits,
            p: p_digits,
        }
    }
}

impl DigitTable {
    fn new(
        moduli_q: &[u64],
        moduli_p: &[u64],
        level_q: usize,
        start: usize,
        end: usize,
    ) -> Self {
        let digit: Vec<u64> = moduli_q[start..end].to_vec();

        let prod_mod = |t: u64, skip: Option<usize>| -> u64 {
            digit
                .iter()
                .enumerate()
                .filter(|(u, _)| Some(*u) != skip)
                .fold(1u64, |acc, (_, &q)| mod_mul(acc, q % t, t))
        };
        // D is odd, so floor(D/2) = (D-1) * 2^{-1} mod t.
        let half_mod = |t: u64| -> u64 {
            mod_mul(mod_sub(prod_mod(t, None), 1, t), mod_inverse(2, t), t)
        };

        let d_hat_inv: Vec<u64> = (0..digit.len())
            .map(|u| mod_inverse(prod_mod(digit[u], Some(u)), digit[u]))
            .collect();
        let half_d_mod_digit: Vec<u64> = digit.iter().map(|&q| half_mod(q)).collect();

        let targets: Vec<u64> = moduli_q[..=level_q]
            .iter()
            .chain(moduli_p.iter())
            .copied()
            .collect();
        let d_hat_mod_t: Vec<Vec<u64>> = targets
            .iter()
            .map(|&t| (0..digit.len()).map(|u| prod_mod(t, Some(u))).collect())
            .collect();
        let d_mod_t: Vec<u64> = targets.iter().map(|&t| prod_mod(t, None)).collect();
        let half_d_mod_t: Vec<u64> = targets.iter().map(|&t| half_mod(t)).collect();

        Self {
            start,
            end,
            d_hat_inv,
            half_d_mod_digit,
            d_f64: digit.iter().map(|&q| q as f64).collect(),
            d_hat_mod_t,
            d_mod_t,
            half_d_mod_t,
        }
    }

    /// Lift the digit described by `y` (shifted residues) to target `t`.
    #[inline]
    fn lift(&self, y: &[u64], k: u64, t: usize, m_t: u64) -> u64 {
        let mut acc = 0u128;
        for (u, &yu) in y.iter().enumerate() {
            acc += yu as u128 * self.d_hat_mod_t[t][u] as u128;
        }
        let mut v = (acc % m_t as u128) as u64;
        v = mod_sub(v, mod_mul(k % m_t, self.d_mod_t[t], m_t), m_t);
        mod_sub(v, self.half_d_mod_t[t], m_t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::generate_ntt_primes;

    fn test_params() -> MkParams {
        let n = 32;
        MkParams {
            ring_dim: n,
            moduli_q: generate_ntt_primes(45, n, 4),
            moduli_p: generate_ntt_primes(50, n, 2),
            pow2_base: 0,
            scale: (1u64 << 40) as f64,
            sigma: 3.2,
        }
    }

    #[test]
    fn test_digit_count() {
        let params = test_params();
        let dec = Decomposer::new(&params);
        assert_eq!(dec.decomp_rns(3), 2);
        assert_eq!(dec.decomp_rns(1), 1);
    }

    #[test]
    fn test_reconstruction_from_digits() {
        // sum_i digit_i * (D_i selector) recovers the value: verified here
        // through the defining property that digit i is congruent to the
        // input modulo every limb inside the digit and is an exact lift of
        // that residue everywhere else.
        let params = test_params();
        let dec = Decomposer::new(&params);
        let ring_q = RnsContext::new(params.ring_dim, &params.moduli_q);
        let ring_p = RnsContext::new(params.ring_dim, &params.moduli_p);
        let level = params.max_level();

        // A small positive value is its own centered digit, so the lift
        // reproduces it at every limb of both chains.
        let v = 123456u64;
        let mut cx = ring_q.new_poly(level);
        for j in 0..=level {
            cx.limb_mut(j)[2] = v % params.moduli_q[j];
        }
        ring_q.ntt_lvl(level, &mut cx);

        let d = dec.decompose(&ring_q, Some(&ring_p), level, &cx);
        assert_eq!(d.q.len(), 2);
        assert_eq!(d.p.len(), 2);

        // Digit 0 covers q0,q1; its value is v itself (v << D_0), so its
        // lift equals v modulo every limb.
        let mut d0 = d.q[0].clone();
        ring_q.inv_ntt_lvl(level, &mut d0);
        for j in 0..=level {
            assert_eq!(d0.limb(j)[2], v % params.moduli_q[j], "q limb {}", j);
        }
        let mut d0p = d.p[0].clone();
        ring_p.inv_ntt_lvl(ring_p.max_level(), &mut d0p);
        for u in 0..params.moduli_p.len() {
            assert_eq!(d0p.limb(u)[2], v % params.moduli_p[u], "p limb {}", u);
        }

        // Digit 1 covers q2,q3; v mod that digit is still v, so the same
        // holds there.
        let mut d1 = d.q[1].clone();
        ring_q.inv_ntt_lvl(level, &mut d1);
        for j in 0..=level {
            assert_eq!(d1.limb(j)[2], v % params.moduli_q[j], "q limb {}", j);
        }
    }

    #[test]
    fn test_negative_residue_lifts_centered() {
        // q0*q1 - 1 is congruent to -1 modulo digit 0, so the centered
        // lift must be -1 at every limb.
        let params = test_params();
        let dec = Decomposer::new(&params);
        let ring_q = RnsContext::new(params.ring_dim, &params.moduli_q);
        let ring_p = RnsContext::new(params.ring_dim, &params.moduli_p);
        let level = params.max_level();

        let mut cx = ring_q.new_poly(level);
        for j in 0..2 {
            // -1 mod q_j for the digit limbs
            cx.limb_mut(j)[0] = params.moduli_q[j] - 1;
        }
        // Limbs outside the digit are irrelevant for digit 0.
        ring_q.ntt_lvl(level, &mut cx);

        let d = dec.decompose(&ring_q, Some(&ring_p), level, &cx);
        let mut d0 = d.q[0].clone();
        ring_q.inv_ntt_lvl(level, &mut d0);
        for j in 0..=level {
            assert_eq!(d0.limb(j)[0], params.moduli_q[j] - 1, "q limb {}", j);
        }
        let mut d0p = d.p[0].clone();
        ring_p.inv_ntt_lvl(ring_p.max_level(), &mut d0p);
        for u in 0..params.moduli_p.len() {
            assert_eq!(d0p.limb(u)[0], params.moduli_p[u] - 1, "p limb {}", u);
        }
    }
}
