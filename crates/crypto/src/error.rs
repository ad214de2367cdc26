//! Error types for cryptographic operations.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid G1 point encoding")]
    InvalidG1Point,

    #[error("Invalid scalar encoding")]
    InvalidScalar,

    #[error("Field cleartext too long: {len} bytes")]
    FieldTooLong { len: usize },

    #[error("DLEQ proof verification failed")]
    DleqVerificationFailed,

    #[error("Masked payload does not match claimed cleartext")]
    PayloadMismatch,

    #[error("Counter value exceeds recovery bound {bound}")]
    CounterOutOfRange { bound: u64 },
}
