//! RPC-compatible types for the mock chain.
//!
//! These types are JSON-serializable versions of the core ledger types.

use grid_types::{CounterCiphertext, EncryptedRecord, FieldCiphertext, SettlementProjection};
use serde::{Deserialize, Serialize};

/// Genesis configuration for RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenesisConfigRpc {
    /// Hex-encoded G1 point (48 bytes), if the oracle key is known up front
    pub oracle_public_key: Option<String>,
    pub counter_recovery_bound: Option<u64>,
    pub max_list_page: Option<u64>,
    pub initial_timestamp: Option<u64>,
}

/// Block info response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockInfo {
    pub height: u64,
    pub timestamp: u64,
}

/// Field ciphertext for RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldCiphertextRpc {
    /// Hex-encoded G1 point (48 bytes)
    pub ephemeral: String,
    /// Hex-encoded masked block (32 bytes)
    pub masked: String,
}

impl From<&FieldCiphertext> for FieldCiphertextRpc {
    fn from(ct: &FieldCiphertext) -> Self {
        Self {
            ephemeral: hex::encode(ct.ephemeral.0),
            masked: hex::encode(ct.masked),
        }
    }
}

/// Parameters for submitting a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRecordParams {
    pub sender: String,
    pub seller_id: FieldCiphertextRpc,
    pub buyer_id: FieldCiphertextRpc,
    pub energy_amount: FieldCiphertextRpc,
    pub price: FieldCiphertextRpc,
}

/// Parameters for requesting settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestSettlementParams {
    pub sender: String,
    pub record_id: u64,
}

/// Encrypted record for RPC responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedRecordRpc {
    pub record_id: u64,
    pub seller_id: FieldCiphertextRpc,
    pub buyer_id: FieldCiphertextRpc,
    pub energy_amount: FieldCiphertextRpc,
    pub price: FieldCiphertextRpc,
    pub submitted_at: u64,
}

impl From<&EncryptedRecord> for EncryptedRecordRpc {
    fn from(record: &EncryptedRecord) -> Self {
        Self {
            record_id: record.record_id,
            seller_id: FieldCiphertextRpc::from(&record.seller_id),
            buyer_id: FieldCiphertextRpc::from(&record.buyer_id),
            energy_amount: FieldCiphertextRpc::from(&record.energy_amount),
            price: FieldCiphertextRpc::from(&record.price),
            submitted_at: record.submitted_at,
        }
    }
}

/// Settlement projection for RPC responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementProjectionRpc {
    pub seller_id: String,
    pub buyer_id: String,
    pub energy_amount: String,
    pub price: String,
    pub settled: bool,
}

impl From<&SettlementProjection> for SettlementProjectionRpc {
    fn from(p: &SettlementProjection) -> Self {
        Self {
            seller_id: p.seller_id.clone(),
            buyer_id: p.buyer_id.clone(),
            energy_amount: p.energy_amount.clone(),
            price: p.price.clone(),
            settled: p.settled,
        }
    }
}

/// Seller accumulator for RPC responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellerTotalRpc {
    pub seller_id: String,
    /// Hex-encoded G1 point (48 bytes)
    pub c1: String,
    /// Hex-encoded G1 point (48 bytes)
    pub c2: String,
    pub initialized: bool,
}

impl SellerTotalRpc {
    pub fn new(seller_id: String, total: &CounterCiphertext) -> Self {
        Self {
            seller_id,
            c1: hex::encode(total.c1.0),
            c2: hex::encode(total.c2.0),
            initialized: total.is_initialized(),
        }
    }
}

/// Receipt returned when a decryption request settles a record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementReceiptRpc {
    pub record_id: u64,
    pub seller_id: String,
    pub buyer_id: String,
    pub energy_amount: String,
    pub price: String,
}
