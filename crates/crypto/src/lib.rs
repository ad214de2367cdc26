//! ElGamal encryption primitives for the confidential trade ledger.
//!
//! This crate implements the two ciphertext forms the ledger stores, both on
//! the BLS12-381 G1 group under a single oracle keypair:
//!
//! 1. **Field encryption (hashed ElGamal)**: each trade field is packed into
//!    a fixed 32-byte block and masked with a keystream derived from an
//!    ephemeral Diffie-Hellman shared point. Only the oracle's secret key
//!    recovers the block, and recovery is exact for arbitrary field bytes.
//!
//! 2. **Counter encryption (exponent ElGamal)**: per-seller settlement
//!    counters are encrypted in the exponent, so ciphertexts add
//!    homomorphically. Decryption solves a discrete log over a small bound.
//!
//! Decryption correctness is attested with Chaum-Pedersen DLEQ proofs: the
//! oracle reveals the shared point for each field and proves it was derived
//! with the same secret that backs its published public key.

pub mod dleq;
pub mod elgamal;
pub mod error;

pub use dleq::{prove_field_opening, verify_field_opening};
pub use elgamal::{
    add_counters, decrypt_counter, decrypt_field, derive_keystream, encrypt_counter,
    encrypt_field, encrypt_trade, keygen, recover_shared, trivial_counter, verify_masked_payload,
};
pub use error::CryptoError;
