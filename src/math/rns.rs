//! Leveled RNS arithmetic and CRT basis conversion.
//!
//! [`RnsContext`] owns the per-limb NTT tables of one modulus chain and
//! provides the leveled operations the evaluator consumes: add/sub/negate,
//! Montgomery-form conversion and multiply-accumulate (with lazy variants
//! for deferred reduction), domain conversion, transform-domain Galois
//! permutation, and the rescale primitive.
//!
//! [`BasisExtender`] converts values from the extended Q x P basis back to
//! Q ("mod-down") using the approximate CRT conversion with a
//! floating-point overflow correction: for residues `x_u` of `x mod P`,
//!
//! ```text
//! x mod t = sum_u [x_u * (P/p_u)^{-1} mod p_u] * (P/p_u mod t) - k * (P mod t)
//! k       = round(sum_u [x_u * (P/p_u)^{-1} mod p_u] / p_u)
//! ```
//!
//! Centering is obtained by shifting by floor(P/2) before the conversion
//! and removing it afterwards, so the mod-down computes a rounded rather
//! than floored division by P.

use super::modular::{mod_add, mod_inverse, mod_mul, mod_neg, mod_sub};
use super::ntt::NttTable;
use super::poly::RnsPoly;

/// Per-chain ring arithmetic: moduli, NTT tables and leveled operations.
///
/// All leveled operations touch limbs `0..=level` and debug-assert the
/// operands' domain flags agree; mixing domains is a programmer error.
#[derive(Clone, Debug)]
pub struct RnsContext {
    n: usize,
    moduli: Vec<u64>,
    tables: Vec<NttTable>,
}

impl RnsContext {
    /// Build a context for dimension `n` over the given modulus chain.
    pub fn new(n: usize, moduli: &[u64]) -> Self {
        assert!(!moduli.is_empty(), "modulus chain must be non-empty");
        let tables = moduli.iter().map(|&q| NttTable::new(n, q)).collect();
        Self {
            n,
            moduli: moduli.to_vec(),
            tables,
        }
    }

    /// Ring dimension.
    pub fn dimension(&self) -> usize {
        self.n
    }

    /// The modulus chain.
    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// Highest level this chain supports.
    pub fn max_level(&self) -> usize {
        self.moduli.len() - 1
    }

    /// NTT table of limb `j`.
    pub fn table(&self, j: usize) -> &NttTable {
        &self.tables[j]
    }

    /// Allocate a zero polynomial at `level`.
    pub fn new_poly(&self, level: usize) -> RnsPoly {
        debug_assert!(level <= self.max_level());
        RnsPoly::zero(self.n, level)
    }

    /// How many lazy accumulations fit before an explicit reduction is
    /// needed at this level; each lazy product lies in `[0, 2q)`.
    pub fn overflow_margin(&self, level: usize) -> usize {
        let max_q = self.moduli[..=level].iter().copied().max().unwrap();
        (u64::MAX / max_q) as usize
    }

    /// `out = a + b` on limbs `0..=level`.
    pub fn add_lvl(&self, level: usize, a: &RnsPoly, b: &RnsPoly, out: &mut RnsPoly) {
        debug_assert_eq!(a.is_ntt(), b.is_ntt(), "domain flags must agree");
        for j in 0..=level {
            let q = self.moduli[j];
            let (la, lb) = (a.limb(j), b.limb(j));
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = mod_add(la[c], lb[c], q);
            }
        }
        out.set_ntt_flag(a.is_ntt());
    }

    /// `acc += a` on limbs `0..=level`.
    pub fn add_assign_lvl(&self, level: usize, a: &RnsPoly, acc: &mut RnsPoly) {
        debug_assert_eq!(a.is_ntt(), acc.is_ntt(), "domain flags must agree");
        for j in 0..=level {
            let q = self.moduli[j];
            let la = a.limb(j);
            for (c, o) in acc.limb_mut(j).iter_mut().enumerate() {
                *o = mod_add(*o, la[c], q);
            }
        }
    }

    /// `out = a - b` on limbs `0..=level`.
    pub fn sub_lvl(&self, level: usize, a: &RnsPoly, b: &RnsPoly, out: &mut RnsPoly) {
        debug_assert_eq!(a.is_ntt(), b.is_ntt(), "domain flags must agree");
        for j in 0..=level {
            let q = self.moduli[j];
            let (la, lb) = (a.limb(j), b.limb(j));
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = mod_sub(la[c], lb[c], q);
            }
        }
        out.set_ntt_flag(a.is_ntt());
    }

    /// `out = -a` on limbs `0..=level`.
    pub fn neg_lvl(&self, level: usize, a: &RnsPoly, out: &mut RnsPoly) {
        for j in 0..=level {
            let q = self.moduli[j];
            let la = a.limb(j);
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = mod_neg(la[c], q);
            }
        }
        out.set_ntt_flag(a.is_ntt());
    }

    /// Copy limbs `0..=level` of `src` into `out`.
    pub fn copy_lvl(&self, level: usize, src: &RnsPoly, out: &mut RnsPoly) {
        for j in 0..=level {
            out.limb_mut(j).copy_from_slice(src.limb(j));
        }
        out.set_ntt_flag(src.is_ntt());
    }

    /// Convert limbs `0..=level` into Montgomery form.
    pub fn mform_lvl(&self, level: usize, a: &RnsPoly, out: &mut RnsPoly) {
        for j in 0..=level {
            let m = &self.tables[j].modulus;
            let la = a.limb(j);
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = m.to_mont(la[c]);
            }
        }
        out.set_ntt_flag(a.is_ntt());
    }

    /// `out = a_mont * b` on limbs `0..=level`, fully reduced.
    ///
    /// `a_mont` must be in Montgomery form; `b` and the result are in
    /// standard form.
    pub fn mul_montgomery_lvl(&self, level: usize, a_mont: &RnsPoly, b: &RnsPoly, out: &mut RnsPoly) {
        debug_assert_eq!(a_mont.is_ntt(), b.is_ntt(), "domain flags must agree");
        for j in 0..=level {
            let m = &self.tables[j].modulus;
            let (la, lb) = (a_mont.limb(j), b.limb(j));
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = m.mont_mul(la[c], lb[c]);
            }
        }
        out.set_ntt_flag(a_mont.is_ntt());
    }

    /// `acc += a_mont * b` on limbs `0..=level`, reduced each step.
    pub fn mul_montgomery_and_add_lvl(
        &self,
        level: usize,
        a_mont: &RnsPoly,
        b: &RnsPoly,
        acc: &mut RnsPoly,
    ) {
        for j in 0..=level {
            let m = &self.tables[j].modulus;
            let q = self.moduli[j];
            let (la, lb) = (a_mont.limb(j), b.limb(j));
            for (c, o) in acc.limb_mut(j).iter_mut().enumerate() {
                *o = mod_add(*o, m.mont_mul(la[c], lb[c]), q);
            }
        }
    }

    /// `out = a_mont * b` on limbs `0..=level`, lazy (result in `[0, 2q)`).
    pub fn mul_montgomery_lazy_lvl(
        &self,
        level: usize,
        a_mont: &RnsPoly,
        b: &RnsPoly,
        out: &mut RnsPoly,
    ) {
        debug_assert_eq!(a_mont.is_ntt(), b.is_ntt(), "domain flags must agree");
        for j in 0..=level {
            let m = &self.tables[j].modulus;
            let (la, lb) = (a_mont.limb(j), b.limb(j));
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = m.mont_mul_lazy(la[c], lb[c]);
            }
        }
        out.set_ntt_flag(a_mont.is_ntt());
    }

    /// `acc += a_mont * b` on limbs `0..=level` without any reduction.
    ///
    /// The caller is responsible for staying within
    /// [`Self::overflow_margin`] accumulations and reducing afterwards.
    pub fn mul_montgomery_and_add_lazy_lvl(
        &self,
        level: usize,
        a_mont: &RnsPoly,
        b: &RnsPoly,
        acc: &mut RnsPoly,
    ) {
        for j in 0..=level {
            let m = &self.tables[j].modulus;
            let (la, lb) = (a_mont.limb(j), b.limb(j));
            for (c, o) in acc.limb_mut(j).iter_mut().enumerate() {
                *o = o.wrapping_add(m.mont_mul_lazy(la[c], lb[c]));
            }
        }
    }

    /// Fully reduce limbs `0..=level` into `[0, q)`.
    pub fn reduce_lvl(&self, level: usize, a: &mut RnsPoly) {
        for j in 0..=level {
            let q = self.moduli[j];
            for o in a.limb_mut(j).iter_mut() {
                *o %= q;
            }
        }
    }

    /// `a *= scalar` on limbs `0..=level`.
    pub fn scalar_mul_assign_lvl(&self, level: usize, scalar: u64, a: &mut RnsPoly) {
        for j in 0..=level {
            let q = self.moduli[j];
            let s = scalar % q;
            for o in a.limb_mut(j).iter_mut() {
                *o = mod_mul(*o, s, q);
            }
        }
    }

    /// Forward-transform limbs `0..=level` into the NTT domain.
    pub fn ntt_lvl(&self, level: usize, a: &mut RnsPoly) {
        debug_assert!(!a.is_ntt(), "polynomial already in transform domain");
        for j in 0..=level {
            self.tables[j].forward(a.limb_mut(j));
        }
        a.set_ntt_flag(true);
    }

    /// Inverse-transform limbs `0..=level` into the coefficient domain.
    pub fn inv_ntt_lvl(&self, level: usize, a: &mut RnsPoly) {
        debug_assert!(a.is_ntt(), "polynomial already in coefficient domain");
        for j in 0..=level {
            self.tables[j].inverse(a.limb_mut(j));
        }
        a.set_ntt_flag(false);
    }

    /// Apply a transform-domain Galois permutation on limbs `0..=level`.
    pub fn permute_ntt_lvl(&self, level: usize, a: &RnsPoly, index: &[usize], out: &mut RnsPoly) {
        debug_assert!(a.is_ntt(), "permutation index is transform-domain");
        for j in 0..=level {
            let la = a.limb(j);
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = la[index[c]];
            }
        }
        out.set_ntt_flag(true);
    }

    /// Divide by the top modulus of the active chain with rounding, in the
    /// transform domain, dropping the top limb (the rescale primitive).
    ///
    /// # Panics
    ///
    /// Panics if the polynomial has a single limb left.
    pub fn div_round_by_last_modulus_ntt(&self, a: &mut RnsPoly) {
        assert!(a.level() >= 1, "cannot rescale below the base level");
        debug_assert!(a.is_ntt(), "rescale operates in the transform domain");
        let last = a.level();
        let q_l = self.moduli[last];
        let half = q_l >> 1;

        let mut top = a.limb(last).to_vec();
        self.tables[last].inverse(&mut top);
        for c in top.iter_mut() {
            *c = mod_add(*c, half, q_l);
        }

        let mut r = vec![0u64; self.n];
        for j in 0..last {
            let q_j = self.moduli[j];
            let inv_l = mod_inverse(q_l % q_j, q_j);
            let half_j = half % q_j;
            for (c, o) in r.iter_mut().enumerate() {
                *o = mod_sub(top[c] % q_j, half_j, q_j);
            }
            self.tables[j].forward(&mut r);
            let la = a.limb_mut(j);
            for (c, o) in la.iter_mut().enumerate() {
                *o = mod_mul(mod_sub(*o, r[c], q_j), inv_l, q_j);
            }
        }
        a.drop_limbs(1);
    }
}

/// Converts accumulators from the extended Q x P basis back to Q.
///
/// Owns the precomputed CRT constants of a fixed (Q, P) chain pair.
#[derive(Clone, Debug)]
pub struct BasisExtender {
    moduli_q: Vec<u64>,
    moduli_p: Vec<u64>,
    /// (P/p_u)^{-1} mod p_u.
    p_hat_inv: Vec<u64>,
    /// [u][j]: (P/p_u) mod q_j.
    p_hat_mod_q: Vec<Vec<u64>>,
    /// P mod q_j.
    p_mod_q: Vec<u64>,
    /// P^{-1} mod q_j.
    p_inv_mod_q: Vec<u64>,
    /// floor(P/2) mod p_u.
    half_p_mod_p: Vec<u64>,
    /// floor(P/2) mod q_j.
    half_p_mod_q: Vec<u64>,
    /// p_u as f64 for the overflow correction.
    p_f64: Vec<f64>,
}

impl BasisExtender {
    /// Precompute the conversion constants for a (Q, P) chain pair.
    pub fn new(moduli_q: &[u64], moduli_p: &[u64]) -> Self {
        assert!(!moduli_p.is_empty(), "extender needs an auxiliary chain");

        let residue_prod = |t: u64, skip: Option<usize>| -> u64 {
            moduli_p
                .iter()
                .enumerate()
                .filter(|(u, _)| Some(*u) != skip)
                .fold(1u64, |acc, (_, &p)| mod_mul(acc, p % t, t))
        };

        let p_hat_inv: Vec<u64> = (0..moduli_p.len())
            .map(|u| mod_inverse(residue_prod(moduli_p[u], Some(u)), moduli_p[u]))
            .collect();
        let p_hat_mod_q: Vec<Vec<u64>> = (0..moduli_p.len())
            .map(|u| moduli_q.iter().map(|&q| residue_prod(q, Some(u))).collect())
            .collect();
        let p_mod_q: Vec<u64> = moduli_q.iter().map(|&q| residue_prod(q, None)).collect();
        let p_inv_mod_q: Vec<u64> = moduli_q
            .iter()
            .zip(p_mod_q.iter())
            .map(|(&q, &pm)| mod_inverse(pm, q))
            .collect();

        // P is odd, so floor(P/2) = (P-1)/2 = (P-1) * 2^{-1} mod t.
        let half_mod = |t: u64| -> u64 {
            let p_m = residue_prod(t, None);
            mod_mul(mod_sub(p_m, 1, t), mod_inverse(2, t), t)
        };
        let half_p_mod_p: Vec<u64> = moduli_p.iter().map(|&p| half_mod(p)).collect();
        let half_p_mod_q: Vec<u64> = moduli_q.iter().map(|&q| half_mod(q)).collect();

        Self {
            moduli_q: moduli_q.to_vec(),
            moduli_p: moduli_p.to_vec(),
            p_hat_inv,
            p_hat_mod_q,
            p_mod_q,
            p_inv_mod_q,
            half_p_mod_p,
            half_p_mod_q,
            p_f64: moduli_p.iter().map(|&p| p as f64).collect(),
        }
    }

    /// Centered lift of the P-residues into the Q limbs: writes the
    /// representative of `a_p mod P` in `(-P/2, P/2]` reduced mod each
    /// `q_j` into `conv`.
    fn convert_p_to_q_centered(&self, level_q: usize, a_p: &RnsPoly, conv: &mut RnsPoly) {
        debug_assert_eq!(a_p.level() + 1, self.moduli_p.len());
        let n = a_p.dimension();
        let np = self.moduli_p.len();

        let mut y = vec![0u64; np];
        for c in 0..n {
            let mut corr = 0.5f64;
            for u in 0..np {
                let p_u = self.moduli_p[u];
                let shifted = mod_add(a_p.limb(u)[c], self.half_p_mod_p[u], p_u);
                y[u] = mod_mul(shifted, self.p_hat_inv[u], p_u);
                corr += y[u] as f64 / self.p_f64[u];
            }
            let k = corr as u64;

            for j in 0..=level_q {
                let q_j = self.moduli_q[j];
                let mut acc = 0u128;
                for u in 0..np {
                    acc += y[u] as u128 * self.p_hat_mod_q[u][j] as u128;
                }
                let mut t = (acc % q_j as u128) as u64;
                t = mod_sub(t, mod_mul(k % q_j, self.p_mod_q[j], q_j), q_j);
                t = mod_sub(t, self.half_p_mod_q[j], q_j);
                conv.limb_mut(j)[c] = t;
            }
        }
        conv.set_ntt_flag(false);
    }

    /// `out = round((a_q, a_p) / P) mod Q` in the coefficient domain.
    ///
    /// Both inputs must be fully reduced coefficient-domain polynomials;
    /// `a_p` must span the whole P chain.
    pub fn mod_down_qp_to_q(
        &self,
        level_q: usize,
        a_q: &RnsPoly,
        a_p: &RnsPoly,
        out: &mut RnsPoly,
    ) {
        debug_assert!(!a_q.is_ntt() && !a_p.is_ntt(), "expected coefficient domain");
        let mut conv = RnsPoly::zero(a_q.dimension(), level_q);
        self.convert_p_to_q_centered(level_q, a_p, &mut conv);
        for j in 0..=level_q {
            let q_j = self.moduli_q[j];
            let p_inv = self.p_inv_mod_q[j];
            let (la, lc) = (a_q.limb(j), conv.limb(j));
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = mod_mul(mod_sub(la[c], lc[c], q_j), p_inv, q_j);
            }
        }
        out.set_ntt_flag(false);
    }

    /// Transform-domain mod-down: `a_p` is inverse-transformed in place,
    /// the conversion result is transformed back per Q limb, and the
    /// combination happens slot-wise in the transform domain.
    ///
    /// `a_q` stays in the transform domain; `a_p` is consumed as scratch.
    pub fn mod_down_qp_to_q_ntt(
        &self,
        ring_q: &RnsContext,
        ring_p: &RnsContext,
        level_q: usize,
        a_q: &RnsPoly,
        a_p: &mut RnsPoly,
        out: &mut RnsPoly,
    ) {
        debug_assert!(a_q.is_ntt(), "expected transform domain");
        let level_p = a_p.level();
        ring_p.inv_ntt_lvl(level_p, a_p);

        let mut conv = RnsPoly::zero(a_q.dimension(), level_q);
        self.convert_p_to_q_centered(level_q, a_p, &mut conv);
        ring_q.ntt_lvl(level_q, &mut conv);
        for j in 0..=level_q {
            let q_j = self.moduli_q[j];
            let p_inv = self.p_inv_mod_q[j];
            let (la, lc) = (a_q.limb(j), conv.limb(j));
            for (c, o) in out.limb_mut(j).iter_mut().enumerate() {
                *o = mod_mul(mod_sub(la[c], lc[c], q_j), p_inv, q_j);
            }
        }
        out.set_ntt_flag(true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::generate_ntt_primes;

    fn contexts(n: usize) -> (RnsContext, RnsContext) {
        let q = generate_ntt_primes(45, n, 3);
        let p = generate_ntt_primes(50, n, 2);
        (RnsContext::new(n, &q), RnsContext::new(n, &p))
    }

    fn poly_from_value(ctx: &RnsContext, level: usize, value: u64, coeff: usize) -> RnsPoly {
        let mut p = ctx.new_poly(level);
        for j in 0..=level {
            p.limb_mut(j)[coeff] = value % ctx.moduli()[j];
        }
        p
    }

    #[test]
    fn test_add_sub_roundtrip() {
        let (ring_q, _) = contexts(32);
        let level = ring_q.max_level();
        let a = poly_from_value(&ring_q, level, 123456, 3);
        let b = poly_from_value(&ring_q, level, 999, 3);
        let mut s = ring_q.new_poly(level);
        let mut d = ring_q.new_poly(level);
        ring_q.add_lvl(level, &a, &b, &mut s);
        ring_q.sub_lvl(level, &s, &b, &mut d);
        for j in 0..=level {
            assert_eq!(d.limb(j), a.limb(j));
        }
    }

    #[test]
    fn test_mform_montgomery_mul() {
        let (ring_q, _) = contexts(32);
        let level = ring_q.max_level();
        let a = poly_from_value(&ring_q, level, 7, 0);
        let b = poly_from_value(&ring_q, level, 6, 0);
        let mut am = ring_q.new_poly(level);
        ring_q.mform_lvl(level, &a, &mut am);
        let mut out = ring_q.new_poly(level);
        ring_q.mul_montgomery_lvl(level, &am, &b, &mut out);
        // Constant-coefficient product in coefficient domain is pointwise.
        for j in 0..=level {
            assert_eq!(out.limb(j)[0], 42);
        }
    }

    #[test]
    fn test_lazy_accumulation_matches_reduced() {
        let (ring_q, _) = contexts(32);
        let level = ring_q.max_level();
        let a = poly_from_value(&ring_q, level, 12345, 1);
        let b = poly_from_value(&ring_q, level, 678, 1);
        let mut am = ring_q.new_poly(level);
        ring_q.mform_lvl(level, &a, &mut am);

        let rounds = 10usize;
        assert!(rounds < ring_q.overflow_margin(level) / 2);

        let mut lazy = ring_q.new_poly(level);
        let mut exact = ring_q.new_poly(level);
        for _ in 0..rounds {
            ring_q.mul_montgomery_and_add_lazy_lvl(level, &am, &b, &mut lazy);
            ring_q.mul_montgomery_and_add_lvl(level, &am, &b, &mut exact);
        }
        ring_q.reduce_lvl(level, &mut lazy);
        for j in 0..=level {
            assert_eq!(lazy.limb(j), exact.limb(j));
        }
    }

    #[test]
    fn test_mod_down_recovers_value() {
        // Represent P * v + r (|r| small) in the QP basis; mod-down must
        // return v (rounded).
        let (ring_q, ring_p) = contexts(32);
        let level = ring_q.max_level();
        let ext = BasisExtender::new(ring_q.moduli(), ring_p.moduli());

        let v: u64 = 1_000_003;
        let r: i64 = -17;

        // a_q = P*v + r mod q_j, a_p = r mod p_u  (value P*v + r)
        let mut a_q = ring_q.new_poly(level);
        for j in 0..=level {
            let q_j = ring_q.moduli()[j];
            let p_mod = ring_p
                .moduli()
                .iter()
                .fold(1u64, |acc, &p| mod_mul(acc, p % q_j, q_j));
            let t = mod_mul(p_mod, v % q_j, q_j);
            let r_mod = crate::math::modular::from_signed(r, q_j);
            a_q.limb_mut(j)[5] = mod_add(t, r_mod, q_j);
        }
        let mut a_p = ring_p.new_poly(ring_p.max_level());
        for u in 0..=ring_p.max_level() {
            a_p.limb_mut(u)[5] = crate::math::modular::from_signed(r, ring_p.moduli()[u]);
        }

        let mut out = ring_q.new_poly(level);
        ext.mod_down_qp_to_q(level, &a_q, &a_p, &mut out);
        for j in 0..=level {
            assert_eq!(out.limb(j)[5], v % ring_q.moduli()[j], "limb {}", j);
            for c in 0..32 {
                if c != 5 {
                    assert_eq!(out.limb(j)[c], 0);
                }
            }
        }
    }

    #[test]
    fn test_mod_down_ntt_matches_coeff_domain() {
        let (ring_q, ring_p) = contexts(32);
        let level = ring_q.max_level();
        let ext = BasisExtender::new(ring_q.moduli(), ring_p.moduli());

        let mut a_q = ring_q.new_poly(level);
        let mut a_p = ring_p.new_poly(ring_p.max_level());
        for (j, &q) in ring_q.moduli().iter().enumerate() {
            for c in 0..32 {
                a_q.limb_mut(j)[c] = (c as u64 * 37 + j as u64 * 11 + 1) % q;
            }
        }
        for (u, &p) in ring_p.moduli().iter().enumerate() {
            for c in 0..32 {
                a_p.limb_mut(u)[c] = (c as u64 * 53 + u as u64 * 29 + 2) % p;
            }
        }

        let mut expected = ring_q.new_poly(level);
        ext.mod_down_qp_to_q(level, &a_q, &a_p, &mut expected);

        let mut a_q_ntt = a_q.clone();
        ring_q.ntt_lvl(level, &mut a_q_ntt);
        let mut a_p_ntt = a_p.clone();
        ring_p.ntt_lvl(ring_p.max_level(), &mut a_p_ntt);
        let mut out = ring_q.new_poly(level);
        ext.mod_down_qp_to_q_ntt(&ring_q, &ring_p, level, &a_q_ntt, &mut a_p_ntt, &mut out);
        ring_q.inv_ntt_lvl(level, &mut out);

        for j in 0..=level {
            assert_eq!(out.limb(j), expected.limb(j), "limb {}", j);
        }
    }

    #[test]
    fn test_rescale_constant() {
        // Rescaling q_last * v leaves exactly v.
        let (ring_q, _) = contexts(32);
        let level = ring_q.max_level();
        let q_last = ring_q.moduli()[level];
        let v = 424242u64;

        let mut a = ring_q.new_poly(level);
        for j in 0..=level {
            let q_j = ring_q.moduli()[j];
            a.limb_mut(j)[7] = mod_mul(q_last % q_j, v % q_j, q_j);
        }
        ring_q.ntt_lvl(level, &mut a);
        ring_q.div_round_by_last_modulus_ntt(&mut a);
        ring_q.inv_ntt_lvl(level - 1, &mut a);

        assert_eq!(a.level(), level - 1);
        for j in 0..level {
            assert_eq!(a.limb(j)[7], v % ring_q.moduli()[j]);
        }
    }
}
