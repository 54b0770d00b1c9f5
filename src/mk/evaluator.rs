//! The multi-key homomorphic evaluator.
//!
//! Operations pad both operands to the sorted union of their peer sets,
//! reconcile scales by exact integer factors, and preserve the absent-part
//! algebra: absent is the additive identity for add/sub and the absorbing
//! element for tensor multiplication. Tensor products square the part
//! count; relinearization (see [`super::relin`]) restores the canonical
//! shape, and rotation batches the expensive basis extension across
//! participants.
//!
//! An evaluator owns reusable scratch (the key-switching buffers), so a
//! single instance must not be invoked concurrently; use one evaluator per
//! thread or add external mutual exclusion.

use crate::math::ntt::permute_index;
use crate::rlwe::{Context, KeySwitcher, Plaintext, PolyQP};

use super::ciphertext::{pad, MkCiphertext};
use super::error::{mk_err, Result};
use super::keys::{check_peer_match, sorted_by_peer, GaloisKey, PublicKey, RelinKey};
use super::relin;

/// Multi-key ciphertext evaluator.
pub struct Evaluator<'a> {
    ctx: &'a Context,
    switcher: KeySwitcher,
}

impl<'a> Evaluator<'a> {
    /// Create an evaluator over a context.
    pub fn new(ctx: &'a Context) -> Self {
        Self {
            ctx,
            switcher: KeySwitcher::new(ctx),
        }
    }

    /// The underlying context.
    pub fn context(&self) -> &Context {
        self.ctx
    }

    /// Component-wise addition over the padded peer union.
    pub fn add(&self, a: &MkCiphertext, b: &MkCiphertext) -> Result<MkCiphertext> {
        self.combine(a, b, false)
    }

    /// Component-wise subtraction over the padded peer union.
    pub fn sub(&self, a: &MkCiphertext, b: &MkCiphertext) -> Result<MkCiphertext> {
        self.combine(a, b, true)
    }

    /// Additive inverse; absent parts stay absent.
    pub fn neg(&self, ct: &MkCiphertext) -> Result<MkCiphertext> {
        let ring_q = &self.ctx.ring_q;
        let level = ct.ct.level;
        let mut out = MkCiphertext::new(ct.peer_ids.clone(), level, ct.ct.scale, ct.ct.is_ntt);
        out.ct.parts = ct
            .ct
            .parts
            .iter()
            .map(|part| {
                part.as_ref().map(|p| {
                    let mut o = ring_q.new_poly(level);
                    ring_q.neg_lvl(level, p, &mut o);
                    o
                })
            })
            .collect();
        Ok(out)
    }

    /// Add a plaintext; only the shared part is touched, since plaintext
    /// is common knowledge rather than participant-specific.
    pub fn add_plaintext(&self, ct: &MkCiphertext, pt: &Plaintext) -> Result<MkCiphertext> {
        self.combine_plaintext(ct, pt, false)
    }

    /// Subtract a plaintext from the shared part.
    pub fn sub_plaintext(&self, ct: &MkCiphertext, pt: &Plaintext) -> Result<MkCiphertext> {
        self.combine_plaintext(ct, pt, true)
    }

    /// Multiply every part by a plaintext polynomial. An absent part
    /// behaves as the implicit identity: the result at that slot is the
    /// plaintext polynomial itself. Output scale is the product of scales.
    pub fn mul_plaintext(&self, ct: &MkCiphertext, pt: &Plaintext) -> Result<MkCiphertext> {
        if !ct.ct.is_ntt || !pt.is_ntt() {
            return Err(mk_err!(
                "plaintext multiplication requires transform-domain operands"
            ));
        }
        let ring_q = &self.ctx.ring_q;
        let level = ct.ct.level.min(pt.level());

        let mut pt_m = ring_q.new_poly(level);
        ring_q.mform_lvl(level, &pt.value, &mut pt_m);

        let mut out = MkCiphertext::new(
            ct.peer_ids.clone(),
            level,
            ct.ct.scale * pt.scale,
            true,
        );
        out.ct.parts = ct
            .ct
            .parts
            .iter()
            .map(|part| match part {
                Some(v) => {
                    let mut o = ring_q.new_poly(level);
                    ring_q.mul_montgomery_lvl(level, &pt_m, v, &mut o);
                    Some(o)
                }
                None => Some(pt.value.clone_at_level(level)),
            })
            .collect();
        Ok(out)
    }

    /// Tensor multiplication: two padded `k + 1`-part ciphertexts yield
    /// `(k + 1)^2` parts, `out[i*(k+1)+j] = a[i] * b[j]`, with absent
    /// factors absorbing their products. The result must be relinearized
    /// before any further operation.
    pub fn mul(&self, a: &MkCiphertext, b: &MkCiphertext) -> Result<MkCiphertext> {
        let (pa, pb) = pad(a, b)?;
        if !pa.ct.is_ntt || !pb.ct.is_ntt {
            return Err(mk_err!(
                "tensor multiplication requires transform-domain operands"
            ));
        }
        if !pa.is_canonical() || !pb.is_canonical() {
            return Err(mk_err!("tensor multiplication requires canonical operands"));
        }

        let ring_q = &self.ctx.ring_q;
        let level = pa.ct.level.min(pb.ct.level);
        let parts_in = pa.ct.parts.len();

        let mut out = MkCiphertext::new(
            pa.peer_ids.clone(),
            level,
            pa.ct.scale * pb.ct.scale,
            true,
        );
        out.ct.parts = vec![None; parts_in * parts_in];

        let mut tmp = ring_q.new_poly(level);
        for (i, left) in pa.ct.parts.iter().enumerate() {
            let Some(v1) = left else { continue };
            ring_q.mform_lvl(level, v1, &mut tmp);
            for (j, right) in pb.ct.parts.iter().enumerate() {
                let Some(v2) = right else { continue };
                let mut prod = ring_q.new_poly(level);
                ring_q.mul_montgomery_lvl(level, &tmp, v2, &mut prod);
                out.ct.parts[i * parts_in + j] = Some(prod);
            }
        }
        Ok(out)
    }

    /// Relinearize a tensored ciphertext in place, reducing `(k + 1)^2`
    /// parts back to `k + 1` using each participant's relinearization and
    /// public key.
    pub fn relinearize(
        &self,
        ct: &mut MkCiphertext,
        relin_keys: &[RelinKey],
        public_keys: &[PublicKey],
    ) -> Result<()> {
        relin::relinearize_in_place(self.ctx, ct, relin_keys, public_keys)
    }

    /// Rotate the ciphertext slots by `n`, key-switching each
    /// participant's part with its rotation key.
    ///
    /// Per-participant contributions are summed in the extended Q x P
    /// basis and mod-downed once per output slot, so the expensive basis
    /// extension runs `k + 1` times instead of `2k`.
    pub fn rotate(
        &mut self,
        ct: &MkCiphertext,
        n: i64,
        gal_keys: &[GaloisKey],
    ) -> Result<MkCiphertext> {
        let ctx = self.ctx;
        if !ct.ct.is_ntt {
            return Err(mk_err!("rotation requires a transform-domain ciphertext"));
        }
        if !ct.is_canonical() {
            return Err(mk_err!("rotation requires a canonical ciphertext"));
        }
        let ring_p = ctx
            .ring_p
            .as_ref()
            .ok_or_else(|| mk_err!("rotation requires an auxiliary modulus chain"))?;
        let ext = ctx.extender.as_ref().unwrap();

        let gks = sorted_by_peer(gal_keys, |k| k.peer_id);
        check_peer_match(&ct.peer_ids, &gks, |k| k.peer_id, "rotation")?;

        let galois_el = ctx.params.galois_element_for_rotation(n);
        for gk in &gks {
            if gk.galois_el != galois_el {
                return Err(mk_err!(
                    "rotation key of peer {} targets galois element {}, rotation needs {}",
                    gk.peer_id,
                    gk.galois_el,
                    galois_el
                ));
            }
        }

        let index = permute_index(galois_el, ctx.dimension());
        let level = ct.ct.level;
        let level_p = ring_p.max_level();
        let k = ct.participants();

        let mut acc0 = PolyQP::zero(ctx.dimension(), level, Some(level_p));
        acc0.q.set_ntt_flag(true);
        acc0.p.as_mut().unwrap().set_ntt_flag(true);
        let mut own: Vec<Option<PolyQP>> = vec![None; k];
        let mut any_contribution = false;

        let mut permuted = ctx.ring_q.new_poly(level);
        for i in 1..=k {
            let Some(part) = ct.ct.part(i) else { continue };
            ctx.ring_q.permute_ntt_lvl(level, part, &index, &mut permuted);

            let accs =
                self.switcher
                    .gadget_product_no_mod_down(ctx, level, &permuted, &gks[i - 1].key);
            ctx.ring_q.add_assign_lvl(level, &accs[0].q, &mut acc0.q);
            ring_p.add_assign_lvl(
                level_p,
                accs[0].p.as_ref().unwrap(),
                acc0.p.as_mut().unwrap(),
            );
            own[i - 1] = Some(accs[1].clone());
            any_contribution = true;
        }

        let mut out = MkCiphertext::new(ct.peer_ids.clone(), level, ct.ct.scale, true);

        // Shared slot: permute the input's shared part and fold in the
        // mod-downed sum of all participants' contributions.
        if any_contribution {
            let mut shared = ctx.ring_q.new_poly(level);
            ext.mod_down_qp_to_q_ntt(
                &ctx.ring_q,
                ring_p,
                level,
                &acc0.q,
                acc0.p.as_mut().unwrap(),
                &mut shared,
            );
            if let Some(c0) = ct.ct.part(0) {
                ctx.ring_q.permute_ntt_lvl(level, c0, &index, &mut permuted);
                ctx.ring_q.add_assign_lvl(level, &permuted, &mut shared);
            }
            out.ct.parts[0] = Some(shared);
        } else if let Some(c0) = ct.ct.part(0) {
            let mut shared = ctx.ring_q.new_poly(level);
            ctx.ring_q.permute_ntt_lvl(level, c0, &index, &mut shared);
            out.ct.parts[0] = Some(shared);
        }

        for (i, qp) in own.into_iter().enumerate() {
            if let Some(mut qp) = qp {
                let mut o = ctx.ring_q.new_poly(level);
                ext.mod_down_qp_to_q_ntt(
                    &ctx.ring_q,
                    ring_p,
                    level,
                    &qp.q,
                    qp.p.as_mut().unwrap(),
                    &mut o,
                );
                out.ct.parts[i + 1] = Some(o);
            }
        }
        Ok(out)
    }

    /// Divide out the top modulus of every part to control scale growth,
    /// lowering the level by one and dividing the scale accordingly.
    pub fn rescale(&self, ct: &mut MkCiphertext) -> Result<()> {
        if ct.ct.level == 0 {
            return Err(mk_err!("cannot rescale below the base level"));
        }
        if !ct.ct.is_ntt {
            return Err(mk_err!("rescale requires a transform-domain ciphertext"));
        }
        for part in ct.ct.parts.iter().flatten() {
            if part.level() != ct.ct.level {
                return Err(mk_err!("ciphertext part level does not match its level"));
            }
        }

        let q_last = self.ctx.params.moduli_q[ct.ct.level];
        for part in ct.ct.parts.iter_mut().flatten() {
            self.ctx.ring_q.div_round_by_last_modulus_ntt(part);
        }
        ct.ct.level -= 1;
        ct.ct.scale /= q_last as f64;
        Ok(())
    }

    /// Remove `levels` moduli without any scale adjustment; used purely to
    /// align levels between ciphertexts before a combining operation.
    pub fn drop_level(&self, ct: &mut MkCiphertext, levels: usize) -> Result<()> {
        if levels == 0 {
            return Ok(());
        }
        if levels > ct.ct.level {
            return Err(mk_err!(
                "cannot drop {} levels from a level-{} ciphertext",
                levels,
                ct.ct.level
            ));
        }
        for part in ct.ct.parts.iter().flatten() {
            if part.level() != ct.ct.level {
                return Err(mk_err!("ciphertext part level does not match its level"));
            }
        }
        for part in ct.ct.parts.iter_mut().flatten() {
            part.drop_limbs(levels);
        }
        ct.ct.level -= levels;
        Ok(())
    }

    /// Shared add/sub core over padded operands.
    fn combine(&self, a: &MkCiphertext, b: &MkCiphertext, is_sub: bool) -> Result<MkCiphertext> {
        let (mut pa, mut pb) = pad(a, b)?;
        if pa.ct.is_ntt != pb.ct.is_ntt {
            return Err(mk_err!("operands must be in the same domain"));
        }
        self.reconcile_scales(&mut pa, &mut pb)?;

        let ring_q = &self.ctx.ring_q;
        let level = pa.ct.level.min(pb.ct.level);
        let scale = pa.ct.scale.max(pb.ct.scale);
        let len = pa.ct.parts.len().max(pb.ct.parts.len());

        let mut out = MkCiphertext::new(pa.peer_ids.clone(), level, scale, pa.ct.is_ntt);
        out.ct.parts = vec![None; len];

        for idx in 0..len {
            let left = pa.ct.parts.get(idx).and_then(|p| p.as_ref());
            let right = pb.ct.parts.get(idx).and_then(|p| p.as_ref());
            out.ct.parts[idx] = match (left, right) {
                (None, None) => None,
                // One side absent: copy (or negate, for subtraction) the
                // present side with no arithmetic.
                (Some(x), None) => Some(x.clone_at_level(level)),
                (None, Some(y)) => {
                    if is_sub {
                        let mut o = ring_q.new_poly(level);
                        ring_q.neg_lvl(level, y, &mut o);
                        Some(o)
                    } else {
                        Some(y.clone_at_level(level))
                    }
                }
                (Some(x), Some(y)) => {
                    let mut o = ring_q.new_poly(level);
                    if is_sub {
                        ring_q.sub_lvl(level, x, y, &mut o);
                    } else {
                        ring_q.add_lvl(level, x, y, &mut o);
                    }
                    Some(o)
                }
            };
        }
        Ok(out)
    }

    /// Shared plaintext add/sub core; only part 0 is combined.
    fn combine_plaintext(
        &self,
        ct: &MkCiphertext,
        pt: &Plaintext,
        is_sub: bool,
    ) -> Result<MkCiphertext> {
        if ct.ct.is_ntt != pt.is_ntt() {
            return Err(mk_err!("operands must be in the same domain"));
        }
        let ring_q = &self.ctx.ring_q;
        let level = ct.ct.level.min(pt.level());

        // Align scales by an exact integer factor, whichever side is lower.
        let mut ct_work = ct.clone();
        let mut pt_val = pt.value.clone_at_level(level);
        if ct.ct.scale > pt.scale {
            let factor = integer_ratio(ct.ct.scale, pt.scale)?;
            if factor > 1 {
                ring_q.scalar_mul_assign_lvl(level, factor, &mut pt_val);
            }
        } else if pt.scale > ct.ct.scale {
            self.scale_up(&mut ct_work, pt.scale)?;
        }
        let scale = ct.ct.scale.max(pt.scale);

        let mut out = MkCiphertext::new(ct.peer_ids.clone(), level, scale, ct.ct.is_ntt);
        out.ct.parts = ct_work
            .ct
            .parts
            .iter()
            .map(|p| p.as_ref().map(|p| p.clone_at_level(level)))
            .collect();

        out.ct.parts[0] = match out.ct.parts[0].take() {
            Some(c0) => {
                let mut o = ring_q.new_poly(level);
                if is_sub {
                    ring_q.sub_lvl(level, &c0, &pt_val, &mut o);
                } else {
                    ring_q.add_lvl(level, &c0, &pt_val, &mut o);
                }
                Some(o)
            }
            None => {
                if is_sub {
                    let mut o = ring_q.new_poly(level);
                    ring_q.neg_lvl(level, &pt_val, &mut o);
                    Some(o)
                } else {
                    Some(pt_val)
                }
            }
        };
        Ok(out)
    }

    /// Multiply the lower-scale operand up to the higher scale; scales
    /// must be equal or related by an exact integer ratio.
    fn reconcile_scales(&self, a: &mut MkCiphertext, b: &mut MkCiphertext) -> Result<()> {
        if a.ct.scale == b.ct.scale {
            return Ok(());
        }
        if a.ct.scale > b.ct.scale {
            self.scale_up(b, a.ct.scale)
        } else {
            self.scale_up(a, b.ct.scale)
        }
    }

    fn scale_up(&self, ct: &mut MkCiphertext, target: f64) -> Result<()> {
        let factor = integer_ratio(target, ct.ct.scale)?;
        if factor > 1 {
            let level = ct.ct.level;
            for part in ct.ct.parts.iter_mut().flatten() {
                self.ctx.ring_q.scalar_mul_assign_lvl(level, factor, part);
            }
        }
        ct.ct.scale = target;
        Ok(())
    }
}

/// The exact integer ratio `hi / lo`, or an error when the scales are not
/// related by one.
fn integer_ratio(hi: f64, lo: f64) -> Result<u64> {
    let ratio = hi / lo;
    let rounded = ratio.round();
    if rounded < 1.0 || (ratio - rounded).abs() > 1e-9 * rounded {
        return Err(mk_err!(
            "scales {} and {} are not related by an integer factor",
            hi,
            lo
        ));
    }
    Ok(rounded as u64)
}
