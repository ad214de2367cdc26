//! Trade ledger module error types.

use thiserror::Error;

/// Errors that can occur in the trade ledger module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Record not found: {0}")]
    RecordNotFound(u64),

    #[error("Record already settled")]
    AlreadySettled,

    #[error("Unknown or already-consumed request token")]
    InvalidRequest,

    #[error("Correctness proof verification failed")]
    ProofInvalid,

    #[error("Oracle public key not set")]
    OracleKeyNotSet,

    #[error("Invalid oracle public key")]
    InvalidOracleKey,

    #[error("Invalid ciphertext")]
    InvalidCiphertext,
}
