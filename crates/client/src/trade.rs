//! Trade record preparation and encryption.

use rand::{CryptoRng, RngCore};
use thiserror::Error;

use grid_crypto::elgamal::{decompress_g1, encrypt_trade};
use grid_crypto::CryptoError;
use grid_types::{ClearTrade, FieldCiphertext, G1Point, MAX_FIELD_BYTES};

/// Errors that can occur during trade preparation.
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("Invalid oracle public key")]
    InvalidOracleKey,

    #[error("Field of {len} bytes exceeds the {MAX_FIELD_BYTES} byte limit")]
    FieldTooLong { len: usize },

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),
}

/// A prepared trade record ready for submission.
#[derive(Debug, Clone)]
pub struct PreparedTrade {
    /// Encrypted seller identifier
    pub seller_id: FieldCiphertext,
    /// Encrypted buyer identifier
    pub buyer_id: FieldCiphertext,
    /// Encrypted energy amount
    pub energy_amount: FieldCiphertext,
    /// Encrypted unit price
    pub price: FieldCiphertext,
}

/// Encrypt a cleartext trade against the oracle public key.
///
/// # Arguments
/// * `oracle_key` - Compressed oracle public key published on the ledger
/// * `trade` - Cleartext trade fields (each at most 31 bytes)
/// * `rng` - Cryptographically secure random number generator
///
/// # Returns
/// A prepared trade holding one field ciphertext per cleartext field
pub fn prepare_trade<R: RngCore + CryptoRng>(
    oracle_key: &G1Point,
    trade: &ClearTrade,
    rng: &mut R,
) -> Result<PreparedTrade, TradeError> {
    let public_key =
        decompress_g1(&oracle_key.0).map_err(|_| TradeError::InvalidOracleKey)?;

    let [seller_id, buyer_id, energy_amount, price] = encrypt_trade(&public_key, trade, rng)
        .map_err(|err| match err {
            CryptoError::FieldTooLong { len } => TradeError::FieldTooLong { len },
            other => TradeError::EncryptionFailed(other.to_string()),
        })?;

    Ok(PreparedTrade {
        seller_id,
        buyer_id,
        energy_amount,
        price,
    })
}

/// Builder for preparing trades field by field.
pub struct TradeBuilder {
    oracle_key: G1Point,
    trade: ClearTrade,
}

impl TradeBuilder {
    /// Create a new trade builder.
    pub fn new(oracle_key: G1Point) -> Self {
        Self {
            oracle_key,
            trade: ClearTrade::default(),
        }
    }

    /// Set the seller identifier.
    pub fn seller(mut self, id: impl Into<String>) -> Self {
        self.trade.seller_id = id.into();
        self
    }

    /// Set the buyer identifier.
    pub fn buyer(mut self, id: impl Into<String>) -> Self {
        self.trade.buyer_id = id.into();
        self
    }

    /// Set the energy amount.
    pub fn energy_amount(mut self, amount: impl Into<String>) -> Self {
        self.trade.energy_amount = amount.into();
        self
    }

    /// Set the unit price.
    pub fn price(mut self, price: impl Into<String>) -> Self {
        self.trade.price = price.into();
        self
    }

    /// Build the prepared trade.
    pub fn build<R: RngCore + CryptoRng>(self, rng: &mut R) -> Result<PreparedTrade, TradeError> {
        prepare_trade(&self.oracle_key, &self.trade, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_crypto::elgamal::compress_g1;
    use grid_crypto::keygen;
    use rand::rngs::OsRng;

    fn generate_oracle_key() -> G1Point {
        let (_, public) = keygen(&mut OsRng);
        compress_g1(&public)
    }

    fn sample_trade() -> ClearTrade {
        ClearTrade {
            seller_id: "alice".to_string(),
            buyer_id: "bob".to_string(),
            energy_amount: "10".to_string(),
            price: "500".to_string(),
        }
    }

    #[test]
    fn test_prepare_trade() {
        let mut rng = OsRng;
        let key = generate_oracle_key();

        let prepared = prepare_trade(&key, &sample_trade(), &mut rng);
        assert!(prepared.is_ok());

        let prepared = prepared.unwrap();
        assert!(prepared.seller_id.is_initialized());
        assert!(prepared.buyer_id.is_initialized());
        assert!(prepared.energy_amount.is_initialized());
        assert!(prepared.price.is_initialized());
    }

    #[test]
    fn test_rejects_garbage_oracle_key() {
        let mut rng = OsRng;
        let key = G1Point([0xFF; 48]);

        let result = prepare_trade(&key, &sample_trade(), &mut rng);
        assert!(matches!(result, Err(TradeError::InvalidOracleKey)));
    }

    #[test]
    fn test_rejects_oversized_field() {
        let mut rng = OsRng;
        let key = generate_oracle_key();

        let mut trade = sample_trade();
        trade.buyer_id = "b".repeat(MAX_FIELD_BYTES + 1);

        let result = prepare_trade(&key, &trade, &mut rng);
        assert!(matches!(
            result,
            Err(TradeError::FieldTooLong { len }) if len == MAX_FIELD_BYTES + 1
        ));
    }

    #[test]
    fn test_trade_builder() {
        let mut rng = OsRng;
        let key = generate_oracle_key();

        let prepared = TradeBuilder::new(key)
            .seller("alice")
            .buyer("bob")
            .energy_amount("10")
            .price("500")
            .build(&mut rng);

        assert!(prepared.is_ok());
    }
}
