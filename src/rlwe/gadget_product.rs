//! The gadget-product key-switching engine.
//!
//! `GadgetProduct(level_q, cx, gct)` evaluates
//!
//! ```text
//! p0 = sum_digits decompose(cx)_digit * gct[digit][0]  mod Q
//! p1 = sum_digits decompose(cx)_digit * gct[digit][1]  mod Q
//! ```
//!
//! accumulating over the extended Q x P basis and reducing back to Q with a
//! final mod-down. Two accumulation strategies exist:
//!
//! - the **RNS-digit path** (more than one auxiliary modulus): each CRT
//!   digit of the input is lifted to both chains and multiplied lazily
//!   against the matching gadget cell;
//! - the **single-P / bit-decomposition path** (at most one auxiliary
//!   modulus): each limb residue is further split into power-of-two
//!   windows, each window transformed per limb and accumulated the same
//!   way.
//!
//! Lazy Montgomery products are accumulated without reduction; an explicit
//! reduction is forced every `margin/2` accumulations to bound coefficient
//! growth, plus once at the end. Contract violations here are programmer
//! errors: the engine asserts and never returns a recoverable failure.

use crate::math::RnsPoly;

use super::context::Context;
use super::gadget::{GadgetCiphertext, PolyQP};

/// Scratch-owning key-switching engine.
///
/// The buffers are reused across calls, so a single instance must not be
/// shared between threads; give each concurrent caller its own.
#[derive(Debug)]
pub struct KeySwitcher {
    /// Domain-conversion copy of the input polynomial.
    buf_domain: RnsPoly,
    /// Digit scratch over Q for the RNS path.
    buf_digit_q: RnsPoly,
    /// Digit scratch over P for the RNS path.
    buf_digit_p: Option<RnsPoly>,
    /// Extended-basis accumulators, one per output polynomial.
    acc: [PolyQP; 2],
    /// Masked window scratch for the bit-decomposition path.
    buf_window: Vec<u64>,
    buf_window_ntt: Vec<u64>,
}

impl KeySwitcher {
    /// Allocate the scratch for a context.
    pub fn new(ctx: &Context) -> Self {
        let n = ctx.dimension();
        let level_q = ctx.max_level();
        let level_p = ctx.level_p();
        let acc = [
            PolyQP::zero(n, level_q, level_p),
            PolyQP::zero(n, level_q, level_p),
        ];
        Self {
            buf_domain: RnsPoly::zero(n, level_q),
            buf_digit_q: RnsPoly::zero(n, level_q),
            buf_digit_p: level_p.map(|lp| RnsPoly::zero(n, lp)),
            acc,
            buf_window: vec![0u64; n],
            buf_window_ntt: vec![0u64; n],
        }
    }

    /// Full gadget product: decompose, accumulate, mod-down.
    ///
    /// The requested level is clamped to the table's `level_q`. The output
    /// domain matches the input domain: a transform-domain input yields
    /// transform-domain outputs (mod-down happens directly there), a
    /// coefficient-domain input is inverse-transformed before mod-down.
    pub fn gadget_product(
        &mut self,
        ctx: &Context,
        level_q: usize,
        cx: &RnsPoly,
        gct: &GadgetCiphertext,
    ) -> (RnsPoly, RnsPoly) {
        let level_q = level_q.min(gct.level_q());
        let is_ntt = cx.is_ntt();
        let level_p = gct.level_p();

        self.gadget_product_no_mod_down(ctx, level_q, cx, gct);

        let mut out0 = ctx.ring_q.new_poly(level_q);
        let mut out1 = ctx.ring_q.new_poly(level_q);

        match (is_ntt, level_p) {
            (true, Some(_)) => {
                let ring_p = ctx.ring_p.as_ref().unwrap();
                let ext = ctx.extender.as_ref().unwrap();
                for (col, out) in [&mut out0, &mut out1].into_iter().enumerate() {
                    let PolyQP { q, p } = &mut self.acc[col];
                    ext.mod_down_qp_to_q_ntt(
                        &ctx.ring_q,
                        ring_p,
                        level_q,
                        q,
                        p.as_mut().unwrap(),
                        out,
                    );
                }
            }
            (false, Some(lp)) => {
                let ring_p = ctx.ring_p.as_ref().unwrap();
                let ext = ctx.extender.as_ref().unwrap();
                for (col, out) in [&mut out0, &mut out1].into_iter().enumerate() {
                    let PolyQP { q, p } = &mut self.acc[col];
                    let p = p.as_mut().unwrap();
                    ctx.ring_q.inv_ntt_lvl(level_q, q);
                    ring_p.inv_ntt_lvl(lp, p);
                    ext.mod_down_qp_to_q(level_q, q, p, out);
                }
            }
            (true, None) => {
                for (col, out) in [&mut out0, &mut out1].into_iter().enumerate() {
                    ctx.ring_q.copy_lvl(level_q, &self.acc[col].q, out);
                }
            }
            (false, None) => {
                for (col, out) in [&mut out0, &mut out1].into_iter().enumerate() {
                    let q = &mut self.acc[col].q;
                    ctx.ring_q.inv_ntt_lvl(level_q, q);
                    ctx.ring_q.copy_lvl(level_q, q, out);
                }
            }
        }
        (out0, out1)
    }

    /// Gadget product without the final mod-down: the accumulators stay in
    /// the extended Q x P basis (transform domain, fully reduced) and are
    /// returned by reference.
    ///
    /// Callers that batch the expensive basis extension (rotation) sum
    /// several of these before a single mod-down per output slot.
    pub fn gadget_product_no_mod_down(
        &mut self,
        ctx: &Context,
        level_q: usize,
        cx: &RnsPoly,
        gct: &GadgetCiphertext,
    ) -> &[PolyQP; 2] {
        let level_q = level_q.min(gct.level_q());
        assert!(
            gct.decomp_rns() >= ctx.params.decomp_rns(level_q),
            "gadget table too small for the active level"
        );

        match gct.level_p() {
            Some(lp) if lp > 0 => self.accumulate_rns_digits(ctx, level_q, cx, gct),
            _ => self.accumulate_bit_windows(ctx, level_q, cx, gct),
        }

        for col in 0..2 {
            self.acc[col].q.set_ntt_flag(true);
            if let Some(p) = self.acc[col].p.as_mut() {
                p.set_ntt_flag(true);
            }
        }
        &self.acc
    }

    /// RNS-digit accumulation: one lifted CRT digit per gadget row.
    fn accumulate_rns_digits(
        &mut self,
        ctx: &Context,
        level_q: usize,
        cx: &RnsPoly,
        gct: &GadgetCiphertext,
    ) {
        assert_eq!(gct.decomp_pw2(), 1, "RNS path expects pure CRT digits");
        let ring_q = &ctx.ring_q;
        let ring_p = ctx.ring_p.as_ref().expect("RNS path needs the P chain");
        let level_p = ring_p.max_level();

        // One domain conversion up front; the decomposer wants the
        // coefficient form and reuses the transform form for in-digit limbs.
        let (cx_ntt, cx_coeff): (&RnsPoly, &RnsPoly) = if cx.is_ntt() {
            ring_q.copy_lvl(level_q, cx, &mut self.buf_domain);
            ring_q.inv_ntt_lvl(level_q, &mut self.buf_domain);
            (cx, &self.buf_domain)
        } else {
            ring_q.copy_lvl(level_q, cx, &mut self.buf_domain);
            ring_q.ntt_lvl(level_q, &mut self.buf_domain);
            (&self.buf_domain, cx)
        };

        let beta = ctx.params.decomp_rns(level_q);
        let q_over_f = ring_q.overflow_margin(level_q) >> 1;
        let p_over_f = ring_p.overflow_margin(level_p) >> 1;

        let mut reduce = 0usize;
        for i in 0..beta {
            ctx.decomposer.decompose_single_ntt(
                ring_q,
                Some(ring_p),
                level_q,
                i,
                Some(cx_ntt),
                cx_coeff,
                &mut self.buf_digit_q,
                self.buf_digit_p.as_mut(),
            );
            let cell = gct.cell(i, 0);
            let digit_p = self.buf_digit_p.as_ref().unwrap();

            for col in 0..2 {
                let key = &cell[col];
                let key_p = key.p.as_ref().expect("gadget cell lacks a P part");
                let acc = &mut self.acc[col];
                let acc_p = acc.p.as_mut().unwrap();
                if i == 0 {
                    ring_q.mul_montgomery_lazy_lvl(level_q, &key.q, &self.buf_digit_q, &mut acc.q);
                    ring_p.mul_montgomery_lazy_lvl(level_p, key_p, digit_p, acc_p);
                } else {
                    ring_q.mul_montgomery_and_add_lazy_lvl(
                        level_q,
                        &key.q,
                        &self.buf_digit_q,
                        &mut acc.q,
                    );
                    ring_p.mul_montgomery_and_add_lazy_lvl(level_p, key_p, digit_p, acc_p);
                }
            }

            if reduce % q_over_f == q_over_f - 1 {
                for col in 0..2 {
                    ring_q.reduce_lvl(level_q, &mut self.acc[col].q);
                }
            }
            if reduce % p_over_f == p_over_f - 1 {
                for col in 0..2 {
                    ring_p.reduce_lvl(level_p, self.acc[col].p.as_mut().unwrap());
                }
            }
            reduce += 1;
        }

        if reduce % q_over_f != 0 {
            for col in 0..2 {
                ring_q.reduce_lvl(level_q, &mut self.acc[col].q);
            }
        }
        if reduce % p_over_f != 0 {
            for col in 0..2 {
                ring_p.reduce_lvl(level_p, self.acc[col].p.as_mut().unwrap());
            }
        }
    }

    /// Single-P / bit-decomposition accumulation: each limb residue is
    /// split into `pow2_base`-bit windows, transformed per limb and
    /// accumulated against the matching gadget cell.
    fn accumulate_bit_windows(
        &mut self,
        ctx: &Context,
        level_q: usize,
        cx: &RnsPoly,
        gct: &GadgetCiphertext,
    ) {
        let ring_q = &ctx.ring_q;
        let with_p = gct.level_p().is_some();
        let ring_p = ctx.ring_p.as_ref();

        let pw2 = ctx.params.pow2_base;
        let decomp_pw2 = ctx.params.decomp_pw2(level_q);
        assert!(
            gct.decomp_pw2() >= decomp_pw2,
            "gadget table too narrow for the bit decomposition"
        );
        let mask = if pw2 == 0 || pw2 >= 64 {
            u64::MAX
        } else {
            (1u64 << pw2) - 1
        };

        let cx_coeff: &RnsPoly = if cx.is_ntt() {
            ring_q.copy_lvl(level_q, cx, &mut self.buf_domain);
            ring_q.inv_ntt_lvl(level_q, &mut self.buf_domain);
            &self.buf_domain
        } else {
            cx
        };

        let q_over_f = ring_q.overflow_margin(level_q) >> 1;
        let p_over_f = ring_p.map(|rp| rp.overflow_margin(rp.max_level()) >> 1);

        let mut reduce = 0usize;
        for i in 0..=level_q {
            for j in 0..decomp_pw2 {
                let src = cx_coeff.limb(i);
                for (c, w) in self.buf_window.iter_mut().enumerate() {
                    *w = (src[c] >> (j * pw2)) & mask;
                }
                let first = i == 0 && j == 0;
                let cell = gct.cell(i, j);

                for u in 0..=level_q {
                    let table = ring_q.table(u);
                    self.buf_window_ntt.copy_from_slice(&self.buf_window);
                    table.forward(&mut self.buf_window_ntt);
                    for col in 0..2 {
                        let key = cell[col].q.limb(u);
                        let acc = self.acc[col].q.limb_mut(u);
                        accumulate_window(&self.buf_window_ntt, key, acc, &table.modulus, first);
                    }
                }
                if with_p {
                    let rp = ring_p.unwrap();
                    for u in 0..=rp.max_level() {
                        let table = rp.table(u);
                        self.buf_window_ntt.copy_from_slice(&self.buf_window);
                        table.forward(&mut self.buf_window_ntt);
                        for col in 0..2 {
                            let key = cell[col].p.as_ref().unwrap().limb(u);
                            let acc = self.acc[col].p.as_mut().unwrap().limb_mut(u);
                            accumulate_window(
                                &self.buf_window_ntt,
                                key,
                                acc,
                                &table.modulus,
                                first,
                            );
                        }
                    }
                }

                if reduce % q_over_f == q_over_f - 1 {
                    for col in 0..2 {
                        ring_q.reduce_lvl(level_q, &mut self.acc[col].q);
                    }
                }
                if let Some(p_over_f) = p_over_f {
                    if with_p && reduce % p_over_f == p_over_f - 1 {
                        let rp = ring_p.unwrap();
                        for col in 0..2 {
                            rp.reduce_lvl(rp.max_level(), self.acc[col].p.as_mut().unwrap());
                        }
                    }
                }
                reduce += 1;
            }
        }

        if reduce % q_over_f != 0 {
            for col in 0..2 {
                ring_q.reduce_lvl(level_q, &mut self.acc[col].q);
            }
        }
        if let (Some(p_over_f), true) = (p_over_f, with_p) {
            if reduce % p_over_f != 0 {
                let rp = ring_p.unwrap();
                for col in 0..2 {
                    rp.reduce_lvl(rp.max_level(), self.acc[col].p.as_mut().unwrap());
                }
            }
        }
    }
}

/// One limb of window accumulation: `acc (+)= key * window` with the lazy
/// Montgomery product.
#[inline]
fn accumulate_window(
    window_ntt: &[u64],
    key: &[u64],
    acc: &mut [u64],
    modulus: &crate::math::Modulus,
    overwrite: bool,
) {
    if overwrite {
        for (c, a) in acc.iter_mut().enumerate() {
            *a = modulus.mont_mul_lazy(key[c], window_ntt[c]);
        }
    } else {
        for (c, a) in acc.iter_mut().enumerate() {
            *a = a.wrapping_add(modulus.mont_mul_lazy(key[c], window_ntt[c]));
        }
    }
}
