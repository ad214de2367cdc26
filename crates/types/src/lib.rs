//! Core type definitions for the confidential energy-trade ledger.
//!
//! This crate provides the shared data structures used across the system:
//! ciphertext handles, ledger records, settlement projections, request
//! tokens, emitted events, and the interface contract of the external
//! decryption capability.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

// =========================
// CRYPTOGRAPHIC PRIMITIVES
// =========================

/// Compressed G1 point on BLS12-381 (48 bytes)
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct G1Point(#[serde_as(as = "[_; 48]")] pub [u8; 48]);

impl Default for G1Point {
    fn default() -> Self {
        Self([0u8; 48])
    }
}

/// Scalar field element (32 bytes, little-endian)
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Scalar(#[serde_as(as = "[_; 32]")] pub [u8; 32]);

impl Default for Scalar {
    fn default() -> Self {
        Self([0u8; 32])
    }
}

/// DLEQ proof that a shared point was derived with the oracle's key
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct DleqProof {
    pub challenge: Scalar,
    pub response: Scalar,
}

// =========================
// CIPHERTEXT HANDLES
// =========================

/// Width of the fixed plaintext domain for record fields, in bytes.
pub const FIELD_BLOCK: usize = 32;

/// Maximum cleartext length of a record field (one byte is the length prefix).
pub const MAX_FIELD_BYTES: usize = FIELD_BLOCK - 1;

/// Opaque ciphertext handle for one record field (hashed ElGamal).
///
/// The plaintext domain is a fixed 32-byte block; see [`encode_field`].
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct FieldCiphertext {
    /// Ephemeral public key: E = r·G1
    pub ephemeral: G1Point,

    /// Plaintext block masked with the keystream derived from the shared point
    #[serde_as(as = "[_; 32]")]
    pub masked: [u8; FIELD_BLOCK],
}

impl Default for FieldCiphertext {
    fn default() -> Self {
        Self {
            ephemeral: G1Point::default(),
            masked: [0u8; FIELD_BLOCK],
        }
    }
}

impl FieldCiphertext {
    /// Whether this handle holds a real ciphertext (default bytes mean "never written").
    pub fn is_initialized(&self) -> bool {
        self.ephemeral != G1Point::default()
    }

    /// Canonical byte representation used in digests and proof transcripts.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(48 + FIELD_BLOCK);
        out.extend_from_slice(&self.ephemeral.0);
        out.extend_from_slice(&self.masked);
        out
    }
}

/// Additively homomorphic counter handle (exponent ElGamal)
#[derive(
    Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct CounterCiphertext {
    pub c1: G1Point,
    pub c2: G1Point,
}

impl CounterCiphertext {
    /// Whether this handle holds a real ciphertext (default bytes mean "never written").
    pub fn is_initialized(&self) -> bool {
        self.c1 != G1Point::default() || self.c2 != G1Point::default()
    }
}

// =========================
// LEDGER RECORDS
// =========================

/// Generic address type (32 bytes)
pub type Address = [u8; 32];

/// One submitted encrypted trade, stored on the ledger forever.
///
/// Immutable after creation; the cleartext lives in the parallel
/// [`SettlementProjection`] keyed by the same identifier.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct EncryptedRecord {
    /// Dense 1-based identifier assigned at submission
    pub record_id: u64,
    pub seller_id: FieldCiphertext,
    pub buyer_id: FieldCiphertext,
    pub energy_amount: FieldCiphertext,
    pub price: FieldCiphertext,
    /// Ledger timestamp at submission
    pub submitted_at: u64,
}

impl EncryptedRecord {
    /// The four ciphertext handles in canonical order (seller, buyer, amount, price).
    pub fn ciphertexts(&self) -> [&FieldCiphertext; 4] {
        [
            &self.seller_id,
            &self.buyer_id,
            &self.energy_amount,
            &self.price,
        ]
    }
}

/// Cleartext projection of a record, populated at most once by settlement.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct SettlementProjection {
    pub seller_id: String,
    pub buyer_id: String,
    pub energy_amount: String,
    pub price: String,
    pub settled: bool,
}

/// Decoded cleartext payload delivered by the decryption capability.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize,
)]
pub struct ClearTrade {
    pub seller_id: String,
    pub buyer_id: String,
    pub energy_amount: String,
    pub price: String,
}

impl ClearTrade {
    /// The four cleartext fields in canonical order (seller, buyer, amount, price).
    pub fn fields(&self) -> [&str; 4] {
        [
            &self.seller_id,
            &self.buyer_id,
            &self.energy_amount,
            &self.price,
        ]
    }
}

// =========================
// SETTLEMENT CORRELATION
// =========================

/// Opaque correlation token issued by the decryption capability.
#[serde_as]
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct RequestToken(#[serde_as(as = "[_; 32]")] pub [u8; 32]);

impl Default for RequestToken {
    fn default() -> Self {
        Self([0u8; 32])
    }
}

/// Designated callback identifier handed to the capability with each batch.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    BorshSerialize,
    BorshDeserialize,
    Serialize,
    Deserialize,
)]
pub struct CallbackId(pub u32);

/// Attestation for one decrypted field: the shared Diffie-Hellman point
/// plus a DLEQ proof that it was derived with the oracle's key.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct FieldOpening {
    pub shared: G1Point,
    pub proof: DleqProof,
}

/// Correctness proof binding a [`ClearTrade`] to a record's original
/// ciphertexts and the request token it answers. Openings are in
/// canonical field order (seller, buyer, amount, price).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct SettlementAttestation {
    pub openings: Vec<FieldOpening>,
}

// =========================
// EVENTS
// =========================

/// Notifications emitted to external observers (no acknowledgement required).
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum LedgerEvent {
    /// A new encrypted record was appended
    RecordSubmitted { record_id: u64, timestamp: u64 },
    /// Decryption of a record was requested from the external capability
    DecryptionRequested { record_id: u64 },
    /// A record's projection was settled with verified cleartext
    TransactionDecrypted { record_id: u64 },
}

// =========================
// DECRYPTION CAPABILITY
// =========================

/// Interface contract of the external decryption capability.
///
/// `request_decryption` registers a batch of ciphertexts and synchronously
/// returns an opaque token; the recovered cleartext arrives later, out of
/// band, as a separate fulfillment call carrying that token and a
/// correctness proof. The capability is untrusted until the proof verifies.
pub trait DecryptionOracle {
    fn request_decryption(
        &mut self,
        ciphertexts: Vec<FieldCiphertext>,
        callback: CallbackId,
    ) -> RequestToken;
}

// =========================
// HELPER FUNCTIONS
// =========================

/// Pack a cleartext field into the fixed 32-byte plaintext domain.
///
/// Layout: length byte followed by the raw bytes, zero-padded. Returns
/// `None` if the cleartext exceeds [`MAX_FIELD_BYTES`].
pub fn encode_field(value: &str) -> Option<[u8; FIELD_BLOCK]> {
    let bytes = value.as_bytes();
    if bytes.len() > MAX_FIELD_BYTES {
        return None;
    }
    let mut block = [0u8; FIELD_BLOCK];
    block[0] = bytes.len() as u8;
    block[1..=bytes.len()].copy_from_slice(bytes);
    Some(block)
}

/// Unpack a 32-byte plaintext block back into a cleartext string.
///
/// Malformed blocks (oversized length byte, invalid UTF-8) decode lossily
/// rather than failing; the result is only trusted once the accompanying
/// proof verified against the re-encoded block.
pub fn decode_field(block: &[u8; FIELD_BLOCK]) -> String {
    let len = (block[0] as usize).min(MAX_FIELD_BYTES);
    String::from_utf8_lossy(&block[1..=len]).into_owned()
}

/// Derive the digest a request token is minted from
pub fn request_digest(nonce: u64, ciphertexts: &[FieldCiphertext]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(b"GRID_REQUEST_V1:");
    hasher.update(nonce.to_le_bytes());
    for ct in ciphertexts {
        hasher.update(ct.to_bytes());
    }
    hasher.finalize().into()
}

/// Compute SHA-256 hash
pub fn sha256(data: &[u8]) -> [u8; 32] {
    use sha2::{Digest, Sha256};
    Sha256::digest(data).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_field() {
        let block = encode_field("alice").unwrap();
        assert_eq!(block[0], 5);
        assert_eq!(decode_field(&block), "alice");

        let empty = encode_field("").unwrap();
        assert_eq!(decode_field(&empty), "");
    }

    #[test]
    fn test_encode_field_too_long() {
        let long = "x".repeat(MAX_FIELD_BYTES + 1);
        assert!(encode_field(&long).is_none());

        let max = "y".repeat(MAX_FIELD_BYTES);
        assert!(encode_field(&max).is_some());
    }

    #[test]
    fn test_decode_field_clamps_length() {
        let mut block = [0u8; FIELD_BLOCK];
        block[0] = 200;
        block[1] = b'a';
        // Must not panic on a length byte beyond the domain
        let _ = decode_field(&block);
    }

    #[test]
    fn test_request_digest_distinct() {
        let ct = FieldCiphertext::default();
        let d1 = request_digest(1, std::slice::from_ref(&ct));
        let d2 = request_digest(2, std::slice::from_ref(&ct));
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_field_ciphertext_serialization() {
        let ct = FieldCiphertext {
            ephemeral: G1Point([7u8; 48]),
            masked: [9u8; 32],
        };
        let encoded = borsh::to_vec(&ct).unwrap();
        let decoded: FieldCiphertext = borsh::from_slice(&encoded).unwrap();
        assert_eq!(ct, decoded);
    }

    #[test]
    fn test_handle_initialization_predicate() {
        assert!(!FieldCiphertext::default().is_initialized());
        assert!(!CounterCiphertext::default().is_initialized());

        let ct = FieldCiphertext {
            ephemeral: G1Point([1u8; 48]),
            masked: [0u8; 32],
        };
        assert!(ct.is_initialized());
    }

    #[test]
    fn test_projection_default_is_unsettled() {
        let projection = SettlementProjection::default();
        assert!(!projection.settled);
        assert!(projection.seller_id.is_empty());
        assert!(projection.price.is_empty());
    }
}
