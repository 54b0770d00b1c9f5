//! Mathematical primitives for the multi-key ciphertext algebra.
//!
//! This module provides the ring-arithmetic capability the evaluator is
//! built on:
//!
//! - **Modular arithmetic** over each prime limb using Montgomery reduction
//! - **Number-Theoretic Transform (NTT)** per limb for fast negacyclic
//!   polynomial multiplication
//! - **RNS polynomials** over a modulus chain, with leveled operations
//! - **CRT basis conversion** between the Q chain and the auxiliary P chain
//!   (mod-down), and the rescale primitive
//! - **Prime generation** for NTT-friendly modulus chains
//! - **Discrete Gaussian and ternary sampling** for key generation
//!
//! All operations here are plain arithmetic with `assert!`-style contracts;
//! recoverable errors only exist at the evaluator surface.

pub mod modular;
pub mod ntt;
pub mod poly;
pub mod prime;
pub mod rns;
pub mod sampler;

pub use modular::Modulus;
pub use ntt::{permute_index, NttTable};
pub use poly::RnsPoly;
pub use prime::generate_ntt_primes;
pub use rns::{BasisExtender, RnsContext};
pub use sampler::GaussianSampler;
