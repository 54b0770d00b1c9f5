//! Participant-indexed ciphertexts and peer-set alignment.
//!
//! A multi-key ciphertext couples an RLWE ciphertext with a strictly
//! increasing list of participant identifiers: part 0 is the shared
//! component, part `i` belongs to `peer_ids[i - 1]`. Before any binary
//! operation the two operands are re-expressed over the sorted union of
//! their peer sets, inserting absent parts at the newly introduced
//! positions so the positional correspondence is preserved.

use serde::{Deserialize, Serialize};

use crate::math::RnsPoly;
use crate::rlwe::Ciphertext;

use super::error::{mk_err, Result};

/// Identifier of one participant in the multi-key setting.
pub type PeerId = u64;

/// Ciphertext under the concatenation of several participants' keys.
///
/// Invariant: `peer_ids` is sorted ascending without duplicates, and a
/// canonical ciphertext has exactly `peer_ids.len() + 1` parts. Tensor
/// multiplication temporarily squares the part count until
/// relinearization restores the canonical shape.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MkCiphertext {
    /// The underlying parts, scale, level and domain flag.
    pub ct: Ciphertext,
    /// Participants owning parts `1..`, sorted ascending.
    pub peer_ids: Vec<PeerId>,
}

impl MkCiphertext {
    /// Create a ciphertext of absent parts over the given peer set.
    pub fn new(peer_ids: Vec<PeerId>, level: usize, scale: f64, is_ntt: bool) -> Self {
        debug_assert!(ids_sorted(&peer_ids), "peer ids must be sorted and unique");
        let degree = peer_ids.len();
        Self {
            ct: Ciphertext::new(degree, level, scale, is_ntt),
            peer_ids,
        }
    }

    /// Number of participants `k`.
    pub fn participants(&self) -> usize {
        self.peer_ids.len()
    }

    /// Whether the part list has the canonical `k + 1` length.
    pub fn is_canonical(&self) -> bool {
        self.ct.parts.len() == self.peer_ids.len() + 1
    }

    /// Position of a participant's part, if present in the peer set.
    pub fn index_of(&self, peer: PeerId) -> Option<usize> {
        self.peer_ids.iter().position(|&p| p == peer).map(|i| i + 1)
    }

    /// Wrap a single-key RLWE pair `(c0, c1)` under one participant into
    /// the multi-key form.
    pub fn from_rlwe_pair(peer_id: PeerId, c0: RnsPoly, c1: RnsPoly, scale: f64) -> Self {
        debug_assert_eq!(c0.level(), c1.level(), "pair must share the level");
        debug_assert_eq!(c0.is_ntt(), c1.is_ntt(), "pair must share the domain");
        let mut out = Self::new(vec![peer_id], c0.level(), scale, c0.is_ntt());
        out.ct.parts[0] = Some(c0);
        out.ct.parts[1] = Some(c1);
        out
    }

    /// Validate the structural invariants.
    pub fn check(&self) -> Result<()> {
        if !ids_sorted(&self.peer_ids) {
            return Err(mk_err!("peer ids must be sorted ascending without duplicates"));
        }
        Ok(())
    }
}

fn ids_sorted(ids: &[PeerId]) -> bool {
    ids.windows(2).all(|w| w[0] < w[1])
}

/// Sorted union of two peer-id lists.
pub fn merge_peer_ids(a: &[PeerId], b: &[PeerId]) -> Vec<PeerId> {
    let mut out = a.to_vec();
    for &id in b {
        if !out.contains(&id) {
            out.push(id);
        }
    }
    out.sort_unstable();
    out
}

/// Re-express both ciphertexts over the sorted union of their peer sets.
///
/// Existing parts keep their participant association; positions introduced
/// by the union hold absent parts. Requires canonical operands: a tensored
/// ciphertext must be relinearized before it can be aligned with another
/// peer set.
pub fn pad(a: &MkCiphertext, b: &MkCiphertext) -> Result<(MkCiphertext, MkCiphertext)> {
    a.check()?;
    b.check()?;
    if a.peer_ids == b.peer_ids {
        return Ok((a.clone(), b.clone()));
    }
    if !a.is_canonical() || !b.is_canonical() {
        return Err(mk_err!(
            "cannot pad non-canonical ciphertexts over different peer sets"
        ));
    }

    let union = merge_peer_ids(&a.peer_ids, &b.peer_ids);
    Ok((pad_to(a, &union), pad_to(b, &union)))
}

fn pad_to(c: &MkCiphertext, union: &[PeerId]) -> MkCiphertext {
    let mut out = MkCiphertext::new(union.to_vec(), c.ct.level, c.ct.scale, c.ct.is_ntt);
    out.ct.parts[0] = c.ct.parts[0].clone();
    for (i, &peer) in union.iter().enumerate() {
        if let Some(src) = c.index_of(peer) {
            out.ct.parts[i + 1] = c.ct.parts[src].clone();
        }
    }
    out
}
