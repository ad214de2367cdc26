//! Call message types for the trade ledger module.

use borsh::{BorshDeserialize, BorshSerialize};
use grid_types::{ClearTrade, FieldCiphertext, G1Point, RequestToken, SettlementAttestation};

/// Call messages for the trade ledger module.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub enum LedgerCall {
    // === Record Lifecycle ===
    /// Submit an encrypted trade record (permissionless).
    SubmitRecord {
        seller_id: FieldCiphertext,
        buyer_id: FieldCiphertext,
        energy_amount: FieldCiphertext,
        price: FieldCiphertext,
    },

    /// Ask the decryption oracle to open a record (permissionless).
    RequestSettlement { record_id: u64 },

    /// Deliver verified cleartext for an outstanding request (oracle callback).
    FulfillSettlement {
        token: RequestToken,
        cleartext: ClearTrade,
        attestation: SettlementAttestation,
    },

    // === Admin ===
    /// Set the oracle public key used for proof verification.
    SetOracleKey { public_key: G1Point },
}
