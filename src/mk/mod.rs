//! Multi-key layer: participant-indexed ciphertexts, key material and the
//! homomorphic evaluator.

pub mod ciphertext;
pub mod error;
pub mod evaluator;
pub mod keygen;
pub mod keys;
pub mod relin;

pub use ciphertext::{merge_peer_ids, MkCiphertext, PeerId};
pub use error::{MkError, Result};
pub use evaluator::Evaluator;
pub use keygen::{
    decode_coeffs, decrypt, encode_coeffs, encrypt, gen_galois_key, gen_public_key,
    gen_relin_key, gen_secret_key, sample_crs,
};
pub use keys::{CommonRefString, GaloisKey, PublicKey, RelinKey, SecretKey};
