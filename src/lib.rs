//! Multi-key CKKS ciphertext algebra engine.
//!
//! This crate implements the homomorphic ciphertext algebra of a multi-key
//! CKKS scheme: several independent parties contribute key material, and
//! ciphertexts carry one polynomial part per participant.
//!
//! Key components:
//! - Gadget-product key switching: CRT digit decomposition, extended-modulus
//!   (Q x P) accumulation and mod-down reduction
//! - Participant-indexed ciphertexts with padding/alignment over the sorted
//!   union of peer sets
//! - Homomorphic add, tensor multiplication, relinearization and Galois
//!   rotation over ciphertexts whose size scales with the number of peers
//!
//! Slot encoding of complex vectors, distributed key-generation protocol
//! rounds and wire serialization are out of scope; the value types carry
//! `serde` derives so an outer layer can supply those.

pub mod math;
pub mod mk;
pub mod params;
pub mod rlwe;

pub use mk::{
    decrypt, encrypt, sample_crs, CommonRefString, Evaluator, GaloisKey, MkCiphertext, MkError,
    PeerId, PublicKey, RelinKey, SecretKey,
};
pub use params::MkParams;
pub use rlwe::{Ciphertext, Context, GadgetCiphertext, Plaintext};
