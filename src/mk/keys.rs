//! Per-participant key material.
//!
//! Every key is tagged with the participant it belongs to. Key lists
//! supplied to relinearization or rotation are sorted by participant and
//! must then match the ciphertext's peer list positionally; a mismatch is
//! a fatal precondition violation.
//!
//! All gadget tables are stored over the extended Q x P basis in the
//! transform domain and Montgomery form, ready for digit dot products.

use serde::{Deserialize, Serialize};

use crate::rlwe::{GadgetCiphertext, GadgetVector, PolyQP};

use super::ciphertext::PeerId;

/// One participant's secret key over both chains, transform domain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecretKey {
    /// Owning participant.
    pub peer_id: PeerId,
    /// The secret polynomial over Q and P.
    pub value: PolyQP,
}

/// One participant's public key: digit-indexed pairs `(b, a)` with
/// `b = -s*a + e` against the common reference vector `a`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PublicKey {
    /// Owning participant.
    pub peer_id: PeerId,
    /// Gadget table of `(b, a)` pairs.
    pub key: GadgetCiphertext,
}

/// One participant's relinearization key: the uni-encryption triple
/// `(d0, d1, d2)` of its secret against the shared reference vector.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelinKey {
    /// Owning participant.
    pub peer_id: PeerId,
    /// Gadget table of `(d0, d1)` pairs.
    pub key: GadgetCiphertext,
    /// Companion column `d2`.
    pub aux: GadgetVector,
}

/// One participant's rotation key for a fixed Galois element.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GaloisKey {
    /// Owning participant.
    pub peer_id: PeerId,
    /// The Galois group element this key switches.
    pub galois_el: u64,
    /// Gadget table of `(g0, g1)` pairs.
    pub key: GadgetCiphertext,
}

/// The common reference vector `a`, shared by all participants' keys.
///
/// Produced once (by seed) and distributed out of band; every public and
/// relinearization key must be generated against the same reference.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommonRefString {
    /// One uniform Q x P polynomial per gadget digit.
    pub value: GadgetVector,
}

/// Sort key references by participant id.
pub(crate) fn sorted_by_peer<'a, K, F>(keys: &'a [K], peer_of: F) -> Vec<&'a K>
where
    F: Fn(&K) -> PeerId,
{
    let mut refs: Vec<&K> = keys.iter().collect();
    refs.sort_by_key(|k| peer_of(*k));
    refs
}

/// Check that sorted keys match the ciphertext's peer list positionally.
pub(crate) fn check_peer_match<K, F>(
    peer_ids: &[PeerId],
    keys: &[&K],
    peer_of: F,
    what: &str,
) -> super::error::Result<()>
where
    F: Fn(&K) -> PeerId,
{
    if peer_ids.len() != keys.len() {
        return Err(super::error::mk_err!(
            "expected {} {} keys, got {}",
            peer_ids.len(),
            what,
            keys.len()
        ));
    }
    for (i, &id) in peer_ids.iter().enumerate() {
        if peer_of(keys[i]) != id {
            return Err(super::error::mk_err!(
                "{} key at position {} belongs to peer {}, ciphertext expects {}",
                what,
                i,
                peer_of(keys[i]),
                id
            ));
        }
    }
    Ok(())
}
