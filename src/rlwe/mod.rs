//! Single-key RLWE machinery: value types, gadget tables, CRT digit
//! decomposition and the gadget-product key-switching engine.
//!
//! The multi-key layer in [`crate::mk`] builds on these primitives; nothing
//! here knows about participants.

pub mod ciphertext;
pub mod context;
pub mod decompose;
pub mod gadget;
pub mod gadget_product;

pub use ciphertext::{Ciphertext, Plaintext};
pub use context::Context;
pub use decompose::Decomposer;
pub use gadget::{dot_qp, DecomposedPoly, GadgetCiphertext, GadgetVector, PolyQP};
pub use gadget_product::KeySwitcher;
