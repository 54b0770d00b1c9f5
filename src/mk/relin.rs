//! In-place relinearization of tensored multi-key ciphertexts.
//!
//! After tensor multiplication a ciphertext over `k` participants has
//! `(k + 1)^2` parts. The shared row and column (index 0) carry no
//! participant-specific secret and pass through unchanged; every cross
//! term `c_{i,j}` with `i, j >= 1` is re-encrypted under the combined key
//! material of participants `i` and `j`:
//!
//! ```text
//! c'      = ModDown(<g^-1(c_ij), b_j>)          -- public key of j
//! acc_0  += <g^-1(c'), d0_i>                    -- relin key of i
//! acc_i  += <g^-1(c'), d1_i>
//! acc_j  += <g^-1(c_ij), d2_i>
//! ```
//!
//! and the output folds back to `k + 1` parts as
//! `c0' = c_{0,0} + ModDown(acc_0)`,
//! `ci' = c_{0,i} + c_{i,0} + ModDown(acc_i)`.
//!
//! The index-to-slot fold above is validated by the multiplicative
//! homomorphism decryption tests rather than derived anew here.

use crate::rlwe::gadget::{dot_qp, PolyQP};
use crate::rlwe::Context;

use super::ciphertext::MkCiphertext;
use super::error::{mk_err, Result};
use super::keys::{check_peer_match, sorted_by_peer, PublicKey, RelinKey};

/// Relinearize `ct` in place, reducing its degree from `(k + 1)^2` back
/// to `k + 1`.
///
/// Both key lists are sorted by participant internally (the caller's
/// slices are never mutated) and must then match the ciphertext's peer
/// list positionally.
pub fn relinearize_in_place(
    ctx: &Context,
    ct: &mut MkCiphertext,
    relin_keys: &[RelinKey],
    public_keys: &[PublicKey],
) -> Result<()> {
    let k = ct.participants();
    let width = k + 1;
    if ct.ct.parts.len() != width * width {
        return Err(mk_err!(
            "relinearization expects {} parts for {} participants, got {}",
            width * width,
            k,
            ct.ct.parts.len()
        ));
    }
    if !ct.ct.is_ntt {
        return Err(mk_err!(
            "relinearization requires a transform-domain ciphertext"
        ));
    }
    let ring_q = &ctx.ring_q;
    let ring_p = ctx
        .ring_p
        .as_ref()
        .ok_or_else(|| mk_err!("relinearization requires an auxiliary modulus chain"))?;
    let ext = ctx.extender.as_ref().unwrap();

    let rks = sorted_by_peer(relin_keys, |key| key.peer_id);
    check_peer_match(&ct.peer_ids, &rks, |key| key.peer_id, "relinearization")?;
    let pks = sorted_by_peer(public_keys, |key| key.peer_id);
    check_peer_match(&ct.peer_ids, &pks, |key| key.peer_id, "public")?;

    let level = ct.ct.level;
    let level_p = ring_p.max_level();
    let n = ctx.dimension();

    let mut acc: Vec<PolyQP> = (0..width)
        .map(|_| {
            let mut a = PolyQP::zero(n, level, Some(level_p));
            a.q.set_ntt_flag(true);
            a.p.as_mut().unwrap().set_ntt_flag(true);
            a
        })
        .collect();

    for i in 1..=k {
        let rk = rks[i - 1];
        let d0 = rk.key.column(0);
        let d1 = rk.key.column(1);
        let d2: Vec<&PolyQP> = rk.aux.polys.iter().collect();

        for j in 1..=k {
            let Some(c_ij) = ct.ct.parts[i * width + j].as_ref() else {
                continue;
            };
            let dec_ij = ctx
                .decomposer
                .decompose(ring_q, Some(ring_p), level, c_ij);

            // Strip participant j's secret with their public key, then
            // come back to the Q basis before the second decomposition.
            let b_j = pks[j - 1].key.column(0);
            let mut t0 = dot_qp(level, &dec_ij, &b_j, ring_q, Some(ring_p));
            let mut c_prime = ring_q.new_poly(level);
            ext.mod_down_qp_to_q_ntt(
                ring_q,
                ring_p,
                level,
                &t0.q,
                t0.p.as_mut().unwrap(),
                &mut c_prime,
            );

            let dec_prime = ctx
                .decomposer
                .decompose(ring_q, Some(ring_p), level, &c_prime);

            let t_shared = dot_qp(level, &dec_prime, &d0, ring_q, Some(ring_p));
            add_assign_qp(ctx, ring_p, level, level_p, &t_shared, &mut acc[0]);
            let t_row = dot_qp(level, &dec_prime, &d1, ring_q, Some(ring_p));
            add_assign_qp(ctx, ring_p, level, level_p, &t_row, &mut acc[i]);
            let t_col = dot_qp(level, &dec_ij, &d2, ring_q, Some(ring_p));
            add_assign_qp(ctx, ring_p, level, level_p, &t_col, &mut acc[j]);
        }
    }

    let mut new_parts = Vec::with_capacity(width);
    for slot in 0..width {
        let mut res = ring_q.new_poly(level);
        let a = &mut acc[slot];
        ext.mod_down_qp_to_q_ntt(
            ring_q,
            ring_p,
            level,
            &a.q,
            a.p.as_mut().unwrap(),
            &mut res,
        );
        if slot == 0 {
            if let Some(c00) = ct.ct.parts[0].as_ref() {
                ring_q.add_assign_lvl(level, c00, &mut res);
            }
        } else {
            if let Some(c0i) = ct.ct.parts[slot].as_ref() {
                ring_q.add_assign_lvl(level, c0i, &mut res);
            }
            if let Some(ci0) = ct.ct.parts[slot * width].as_ref() {
                ring_q.add_assign_lvl(level, ci0, &mut res);
            }
        }
        new_parts.push(Some(res));
    }

    ct.ct.parts = new_parts;
    tracing::debug!(participants = k, level, "relinearized tensor ciphertext");
    Ok(())
}

fn add_assign_qp(
    ctx: &Context,
    ring_p: &crate::math::RnsContext,
    level: usize,
    level_p: usize,
    src: &PolyQP,
    acc: &mut PolyQP,
) {
    ctx.ring_q.add_assign_lvl(level, &src.q, &mut acc.q);
    ring_p.add_assign_lvl(level_p, src.p.as_ref().unwrap(), acc.p.as_mut().unwrap());
}
