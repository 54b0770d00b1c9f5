//! Local key generation, encryption and joint decryption.
//!
//! Every participant derives its key material against a common reference
//! vector `a` (distributed out of band, here reproduced from a seed):
//!
//! - public key: `b = -s*a + e`
//! - relinearization key: the uni-encryption triple
//!   `d0 = -s*d1 + e + g*r`, `d1` uniform, `d2 = r*a + g*s + e'`
//!   for fresh small `r`, where `g` is the gadget basis scaled by P
//! - rotation key: `g0 = -s*g1 + e + g*tau(s)`, `g1` uniform
//!
//! The distributed protocol rounds that would exchange these values
//! between parties are an external concern; only the local computations
//! live here. Encryption produces a canonical two-part multi-key
//! ciphertext under one participant's public key; decryption needs every
//! referenced participant's secret.

use crate::math::modular::{mod_add, mod_inverse, mod_mul};
use crate::math::ntt::permute_index;
use crate::math::sampler::signed_to_rns;
use crate::math::{GaussianSampler, RnsPoly};
use crate::rlwe::{Context, GadgetCiphertext, GadgetVector, Plaintext, PolyQP};

use super::ciphertext::{MkCiphertext, PeerId};
use super::error::{mk_err, Result};
use super::keys::{
    check_peer_match, sorted_by_peer, CommonRefString, GaloisKey, PublicKey, RelinKey, SecretKey,
};

/// Sample the common reference vector from a seed.
///
/// Deterministic in the seed, so every participant reproduces the same
/// reference locally.
pub fn sample_crs(ctx: &Context, seed: u64) -> CommonRefString {
    let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, seed);
    let beta = ctx.params.decomp_rns(ctx.max_level());
    let polys = (0..beta).map(|_| uniform_qp(ctx, &mut sampler)).collect();
    CommonRefString {
        value: GadgetVector { polys },
    }
}

/// Generate a participant's secret key: a ternary polynomial over both
/// chains, transform domain.
pub fn gen_secret_key(ctx: &Context, peer_id: PeerId, sampler: &mut GaussianSampler) -> SecretKey {
    let coeffs = sampler.sample_ternary_vec(ctx.dimension());
    SecretKey {
        peer_id,
        value: signed_qp(ctx, &coeffs),
    }
}

/// Generate a participant's public key against the common reference.
pub fn gen_public_key(
    ctx: &Context,
    sk: &SecretKey,
    crs: &CommonRefString,
    sampler: &mut GaussianSampler,
) -> PublicKey {
    let mut cells = Vec::with_capacity(crs.value.len());
    for a_i in &crs.value.polys {
        let mut b = qp_mont_mul(ctx, a_i, &sk.value);
        qp_neg_assign(ctx, &mut b);
        qp_add_error(ctx, sampler, &mut b);
        let b = qp_mform(ctx, &b);
        cells.push(vec![[b, a_i.clone()]]);
    }
    PublicKey {
        peer_id: sk.peer_id,
        key: GadgetCiphertext::new(cells, ctx.max_level(), ctx.level_p()),
    }
}

/// Generate a participant's relinearization key (uni-encryption triple).
pub fn gen_relin_key(
    ctx: &Context,
    sk: &SecretKey,
    crs: &CommonRefString,
    sampler: &mut GaussianSampler,
) -> RelinKey {
    let r = {
        let coeffs = sampler.sample_ternary_vec(ctx.dimension());
        signed_qp(ctx, &coeffs)
    };

    let mut cells = Vec::with_capacity(crs.value.len());
    let mut aux = Vec::with_capacity(crs.value.len());
    for (i, a_i) in crs.value.polys.iter().enumerate() {
        let consts = gadget_constants(ctx, i, 0);

        let d1 = uniform_qp(ctx, sampler);
        let mut d0 = qp_mont_mul(ctx, &d1, &sk.value);
        qp_neg_assign(ctx, &mut d0);
        qp_add_error(ctx, sampler, &mut d0);
        add_scaled_gadget(ctx, &consts, &r, &mut d0);

        let mut d2 = qp_mont_mul(ctx, a_i, &r);
        qp_add_error(ctx, sampler, &mut d2);
        add_scaled_gadget(ctx, &consts, &sk.value, &mut d2);

        cells.push(vec![[qp_mform(ctx, &d0), d1]]);
        aux.push(qp_mform(ctx, &d2));
    }
    RelinKey {
        peer_id: sk.peer_id,
        key: GadgetCiphertext::new(cells, ctx.max_level(), ctx.level_p()),
        aux: GadgetVector { polys: aux },
    }
}

/// Generate a participant's rotation key for one Galois element.
pub fn gen_galois_key(
    ctx: &Context,
    sk: &SecretKey,
    galois_el: u64,
    sampler: &mut GaussianSampler,
) -> GaloisKey {
    let index = permute_index(galois_el, ctx.dimension());
    let tau_s = PolyQP {
        q: permute_poly(ctx, &sk.value.q, &index, false),
        p: sk
            .value
            .p
            .as_ref()
            .map(|p| permute_poly(ctx, p, &index, true)),
    };

    let beta = ctx.params.decomp_rns(ctx.max_level());
    let mut cells = Vec::with_capacity(beta);
    for i in 0..beta {
        let consts = gadget_constants(ctx, i, 0);
        let g1 = uniform_qp(ctx, sampler);
        let mut g0 = qp_mont_mul(ctx, &g1, &sk.value);
        qp_neg_assign(ctx, &mut g0);
        qp_add_error(ctx, sampler, &mut g0);
        add_scaled_gadget(ctx, &consts, &tau_s, &mut g0);
        cells.push(vec![[qp_mform(ctx, &g0), g1]]);
    }
    GaloisKey {
        peer_id: sk.peer_id,
        galois_el,
        key: GadgetCiphertext::new(cells, ctx.max_level(), ctx.level_p()),
    }
}

/// Generate a plain gadget switching key re-encrypting `s_from` under
/// `sk_to`, honoring the parameter set's power-of-two sub-digit width.
///
/// This is the single-key building block exercised by the gadget-product
/// engine on both accumulation paths.
pub fn gen_gadget_switching_key(
    ctx: &Context,
    s_from: &PolyQP,
    sk_to: &SecretKey,
    sampler: &mut GaussianSampler,
) -> GadgetCiphertext {
    let level_q = ctx.max_level();
    let beta = ctx.params.decomp_rns(level_q);
    let width = ctx.params.decomp_pw2(level_q);

    let mut cells = Vec::with_capacity(beta);
    for i in 0..beta {
        let mut row = Vec::with_capacity(width);
        for jw in 0..width {
            let consts = gadget_constants(ctx, i, jw);
            let a = uniform_qp(ctx, sampler);
            let mut b = qp_mont_mul(ctx, &a, &sk_to.value);
            qp_neg_assign(ctx, &mut b);
            qp_add_error(ctx, sampler, &mut b);
            add_scaled_gadget(ctx, &consts, s_from, &mut b);
            row.push([qp_mform(ctx, &b), a]);
        }
        cells.push(row);
    }
    GadgetCiphertext::new(cells, level_q, ctx.level_p())
}

/// Encrypt a plaintext under one participant's public key.
///
/// The result is a canonical two-part multi-key ciphertext in the
/// transform domain.
pub fn encrypt(
    ctx: &Context,
    pt: &Plaintext,
    pk: &PublicKey,
    sampler: &mut GaussianSampler,
) -> Result<MkCiphertext> {
    if !pt.is_ntt() {
        return Err(mk_err!("encryption expects a transform-domain plaintext"));
    }
    let level = pt.level();
    let ring_q = &ctx.ring_q;

    let v = {
        let coeffs = sampler.sample_ternary_vec(ctx.dimension());
        let mut v = signed_to_rns(&coeffs, &ctx.params.moduli_q[..=level]);
        ring_q.ntt_lvl(level, &mut v);
        v
    };

    let cell = pk.key.cell(0, 0);
    let mut c0 = ring_q.new_poly(level);
    ring_q.mul_montgomery_lvl(level, &cell[0].q, &v, &mut c0);
    add_error_q(ctx, level, sampler, &mut c0);
    ring_q.add_assign_lvl(level, &pt.value, &mut c0);

    let mut c1 = ring_q.new_poly(level);
    ring_q.mul_montgomery_lvl(level, &cell[1].q, &v, &mut c1);
    add_error_q(ctx, level, sampler, &mut c1);

    let mut out = MkCiphertext::new(vec![pk.peer_id], level, pt.scale, true);
    out.ct.parts[0] = Some(c0);
    out.ct.parts[1] = Some(c1);
    Ok(out)
}

/// Joint decryption: `m = c0 + sum_i s_i * c_i`, requiring every
/// referenced participant's secret key. Returns the coefficient-domain
/// message polynomial.
pub fn decrypt(ctx: &Context, ct: &MkCiphertext, sks: &[SecretKey]) -> Result<RnsPoly> {
    if !ct.is_canonical() {
        return Err(mk_err!("cannot decrypt a non-relinearized ciphertext"));
    }
    if !ct.ct.is_ntt {
        return Err(mk_err!("decryption expects a transform-domain ciphertext"));
    }
    let sorted = sorted_by_peer(sks, |k| k.peer_id);
    check_peer_match(&ct.peer_ids, &sorted, |k| k.peer_id, "secret")?;

    let ring_q = &ctx.ring_q;
    let level = ct.ct.level;
    let mut m = ring_q.new_poly(level);
    m.set_ntt_flag(true);
    if let Some(c0) = ct.ct.part(0) {
        ring_q.copy_lvl(level, c0, &mut m);
    }

    let mut s_m = ring_q.new_poly(level);
    for (i, sk) in sorted.iter().enumerate() {
        if let Some(part) = ct.ct.part(i + 1) {
            ring_q.mform_lvl(level, &sk.value.q, &mut s_m);
            ring_q.mul_montgomery_and_add_lvl(level, &s_m, part, &mut m);
        }
    }
    ring_q.inv_ntt_lvl(level, &mut m);
    Ok(m)
}

/// Encode real coefficients into a transform-domain plaintext at the
/// given level: each value is scaled and rounded into the chain.
///
/// This is raw coefficient encoding, not slot packing; the canonical
/// embedding of complex slot vectors belongs to an outer encoder.
pub fn encode_coeffs(ctx: &Context, values: &[f64], level: usize, scale: f64) -> Plaintext {
    let n = ctx.dimension();
    debug_assert!(values.len() <= n, "too many coefficients for the ring");
    let mut coeffs = vec![0i64; n];
    for (c, &v) in values.iter().enumerate() {
        coeffs[c] = (v * scale).round() as i64;
    }
    let mut value = signed_to_rns(&coeffs, &ctx.params.moduli_q[..=level]);
    ctx.ring_q.ntt_lvl(level, &mut value);
    Plaintext::new(value, scale)
}

/// Decode a coefficient-domain message polynomial back to reals.
///
/// Supports levels 0 and 1 (one or two limbs), where the composite value
/// fits exact 128-bit reconstruction; drop the ciphertext level before
/// decoding.
pub fn decode_coeffs(ctx: &Context, m: &RnsPoly, scale: f64) -> Vec<f64> {
    assert!(!m.is_ntt(), "decode expects a coefficient-domain input");
    assert!(m.level() <= 1, "decode supports at most two limbs");
    let n = m.dimension();
    let q0 = ctx.params.moduli_q[0];

    let mut out = Vec::with_capacity(n);
    if m.level() == 0 {
        for c in 0..n {
            let x = m.limb(0)[c];
            let centered = if x > q0 / 2 {
                x as i128 - q0 as i128
            } else {
                x as i128
            };
            out.push(centered as f64 / scale);
        }
    } else {
        let q1 = ctx.params.moduli_q[1];
        let q0_inv_mod_q1 = mod_inverse(q0 % q1, q1);
        let big_q = q0 as u128 * q1 as u128;
        for c in 0..n {
            let x0 = m.limb(0)[c];
            let x1 = m.limb(1)[c];
            // x = x0 + q0 * ((x1 - x0) * q0^{-1} mod q1)
            let diff = mod_mul(mod_add(x1, q1 - x0 % q1, q1), q0_inv_mod_q1, q1);
            let x = x0 as u128 + q0 as u128 * diff as u128;
            let centered = if x > big_q / 2 {
                x as i128 - big_q as i128
            } else {
                x as i128
            };
            out.push(centered as f64 / scale);
        }
    }
    out
}

// --- helpers over the extended basis ---

/// Uniform Q x P polynomial, treated as transform-domain Montgomery form.
fn uniform_qp(ctx: &Context, sampler: &mut GaussianSampler) -> PolyQP {
    let n = ctx.dimension();
    let mut q = sampler.sample_uniform_poly(n, &ctx.params.moduli_q);
    q.set_ntt_flag(true);
    let p = ctx.ring_p.as_ref().map(|_| {
        let mut p = sampler.sample_uniform_poly(n, &ctx.params.moduli_p);
        p.set_ntt_flag(true);
        p
    });
    PolyQP { q, p }
}

/// Spread one signed coefficient vector over both chains, transformed.
fn signed_qp(ctx: &Context, coeffs: &[i64]) -> PolyQP {
    let mut q = signed_to_rns(coeffs, &ctx.params.moduli_q);
    ctx.ring_q.ntt_lvl(ctx.max_level(), &mut q);
    let p = ctx.ring_p.as_ref().map(|ring_p| {
        let mut p = signed_to_rns(coeffs, &ctx.params.moduli_p);
        ring_p.ntt_lvl(ring_p.max_level(), &mut p);
        p
    });
    PolyQP { q, p }
}

/// Convert both chains into Montgomery form.
fn qp_mform(ctx: &Context, a: &PolyQP) -> PolyQP {
    let mut q = ctx.ring_q.new_poly(ctx.max_level());
    ctx.ring_q.mform_lvl(ctx.max_level(), &a.q, &mut q);
    let p = ctx.ring_p.as_ref().map(|ring_p| {
        let mut p = ring_p.new_poly(ring_p.max_level());
        ring_p.mform_lvl(ring_p.max_level(), a.p.as_ref().unwrap(), &mut p);
        p
    });
    PolyQP { q, p }
}

/// `a_mform * b` over both chains.
fn qp_mont_mul(ctx: &Context, a_mform: &PolyQP, b: &PolyQP) -> PolyQP {
    let mut q = ctx.ring_q.new_poly(ctx.max_level());
    ctx.ring_q
        .mul_montgomery_lvl(ctx.max_level(), &a_mform.q, &b.q, &mut q);
    let p = ctx.ring_p.as_ref().map(|ring_p| {
        let mut p = ring_p.new_poly(ring_p.max_level());
        ring_p.mul_montgomery_lvl(
            ring_p.max_level(),
            a_mform.p.as_ref().unwrap(),
            b.p.as_ref().unwrap(),
            &mut p,
        );
        p
    });
    PolyQP { q, p }
}

/// Negate in place over both chains.
fn qp_neg_assign(ctx: &Context, a: &mut PolyQP) {
    let tmp = a.q.clone();
    ctx.ring_q.neg_lvl(ctx.max_level(), &tmp, &mut a.q);
    if let (Some(ring_p), Some(p)) = (ctx.ring_p.as_ref(), a.p.as_mut()) {
        let tmp = p.clone();
        ring_p.neg_lvl(ring_p.max_level(), &tmp, p);
    }
}

/// Add a fresh transformed error term over both chains.
fn qp_add_error(ctx: &Context, sampler: &mut GaussianSampler, acc: &mut PolyQP) {
    let e = sampler.sample_vec(ctx.dimension());
    let eq = {
        let mut eq = signed_to_rns(&e, &ctx.params.moduli_q);
        ctx.ring_q.ntt_lvl(ctx.max_level(), &mut eq);
        eq
    };
    ctx.ring_q.add_assign_lvl(ctx.max_level(), &eq, &mut acc.q);
    if let (Some(ring_p), Some(p)) = (ctx.ring_p.as_ref(), acc.p.as_mut()) {
        let mut ep = signed_to_rns(&e, &ctx.params.moduli_p);
        ring_p.ntt_lvl(ring_p.max_level(), &mut ep);
        ring_p.add_assign_lvl(ring_p.max_level(), &ep, p);
    }
}

/// Add a Q-chain error term at the given level.
fn add_error_q(ctx: &Context, level: usize, sampler: &mut GaussianSampler, acc: &mut RnsPoly) {
    let e = sampler.sample_vec(ctx.dimension());
    let mut eq = signed_to_rns(&e, &ctx.params.moduli_q[..=level]);
    ctx.ring_q.ntt_lvl(level, &mut eq);
    ctx.ring_q.add_assign_lvl(level, &eq, acc);
}

/// Gadget constants of cell `(digit, window)`: per Q limb,
/// `P * 2^(window * pow2_base)` inside the digit's limb range and zero
/// elsewhere; the P limbs are always zero.
fn gadget_constants(ctx: &Context, digit: usize, window: usize) -> Vec<u64> {
    let alpha = ctx.params.alpha();
    let start = digit * alpha;
    let end = ((digit + 1) * alpha).min(ctx.max_level() + 1);
    let shift = (window * ctx.params.pow2_base) as u32;

    ctx.params
        .moduli_q
        .iter()
        .enumerate()
        .map(|(j, &q_j)| {
            if j < start || j >= end {
                return 0;
            }
            let p_mod = ctx
                .params
                .moduli_p
                .iter()
                .fold(1u64, |acc, &p| mod_mul(acc, p % q_j, q_j));
            let w = if shift == 0 {
                1
            } else {
                crate::math::modular::mod_pow(2, shift as u64, q_j)
            };
            mod_mul(p_mod, w, q_j)
        })
        .collect()
}

/// `acc += consts * factor` per Q limb, transform domain.
fn add_scaled_gadget(ctx: &Context, consts: &[u64], factor: &PolyQP, acc: &mut PolyQP) {
    for (j, &w) in consts.iter().enumerate() {
        if w == 0 {
            continue;
        }
        let q_j = ctx.params.moduli_q[j];
        let src = factor.q.limb(j);
        for (c, o) in acc.q.limb_mut(j).iter_mut().enumerate() {
            *o = mod_add(*o, mod_mul(w, src[c], q_j), q_j);
        }
    }
}

/// Permute one chain's polynomial under a transform-domain index.
fn permute_poly(ctx: &Context, src: &RnsPoly, index: &[usize], is_p: bool) -> RnsPoly {
    let ring = if is_p {
        ctx.ring_p.as_ref().unwrap()
    } else {
        &ctx.ring_q
    };
    let mut out = ring.new_poly(src.level());
    ring.permute_ntt_lvl(src.level(), src, index, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::generate_ntt_primes;
    use crate::params::MkParams;

    fn test_params() -> MkParams {
        let n = 64;
        MkParams {
            ring_dim: n,
            moduli_q: generate_ntt_primes(45, n, 3),
            moduli_p: generate_ntt_primes(50, n, 2),
            pow2_base: 0,
            scale: (1u64 << 40) as f64,
            sigma: 3.2,
        }
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let ctx = Context::new(test_params()).unwrap();
        let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 11);
        let crs = sample_crs(&ctx, 99);

        let sk = gen_secret_key(&ctx, 7, &mut sampler);
        let pk = gen_public_key(&ctx, &sk, &crs, &mut sampler);

        let values: Vec<f64> = (0..8).map(|i| i as f64 / 4.0).collect();
        let pt = encode_coeffs(&ctx, &values, ctx.max_level(), ctx.params.scale);
        let ct = encrypt(&ctx, &pt, &pk, &mut sampler).unwrap();

        assert_eq!(ct.peer_ids, vec![7]);
        assert!(ct.is_canonical());

        let m = decrypt(&ctx, &ct, &[sk]).unwrap();
        // Decode needs at most two limbs; project down first.
        let low = m.clone_at_level(1);
        let decoded = decode_coeffs(&ctx, &low, ctx.params.scale);
        for (c, &v) in values.iter().enumerate() {
            assert!(
                (decoded[c] - v).abs() < 1e-3,
                "coeff {}: {} vs {}",
                c,
                decoded[c],
                v
            );
        }
    }

    #[test]
    fn test_decrypt_rejects_wrong_keys() {
        let ctx = Context::new(test_params()).unwrap();
        let mut sampler = GaussianSampler::with_seed(ctx.params.sigma, 12);
        let crs = sample_crs(&ctx, 99);

        let sk = gen_secret_key(&ctx, 7, &mut sampler);
        let other = gen_secret_key(&ctx, 8, &mut sampler);
        let pk = gen_public_key(&ctx, &sk, &crs, &mut sampler);

        let pt = encode_coeffs(&ctx, &[1.0], ctx.max_level(), ctx.params.scale);
        let ct = encrypt(&ctx, &pt, &pk, &mut sampler).unwrap();

        assert!(decrypt(&ctx, &ct, &[other]).is_err());
        assert!(decrypt(&ctx, &ct, &[]).is_err());
    }

    #[test]
    fn test_crs_deterministic() {
        let ctx = Context::new(test_params()).unwrap();
        let a = sample_crs(&ctx, 5);
        let b = sample_crs(&ctx, 5);
        assert_eq!(a.value.polys[0].q.limb(0), b.value.polys[0].q.limb(0));
    }

    #[test]
    fn test_gadget_constants_shape() {
        let ctx = Context::new(test_params()).unwrap();
        // Digit 0 covers limbs 0..2, digit 1 covers limb 2.
        let c0 = gadget_constants(&ctx, 0, 0);
        assert!(c0[0] != 0 && c0[1] != 0 && c0[2] == 0);
        let c1 = gadget_constants(&ctx, 1, 0);
        assert!(c1[0] == 0 && c1[1] == 0 && c1[2] != 0);
    }
}
