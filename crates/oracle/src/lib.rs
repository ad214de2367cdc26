//! Decryption Oracle Service
//!
//! This service holds the oracle secret key and implements the asynchronous
//! decryption capability the ledger delegates to:
//! 1. Accepting batches of field ciphertexts and issuing correlation tokens
//! 2. Decrypting each field out of band with the oracle secret
//! 3. Producing DLEQ-attested openings binding cleartext to ciphertexts
//!    and token, for delivery through the ledger's fulfillment callback
//!
//! The service never talks to the ledger directly; a driver (test harness or
//! chain runtime) moves completed decryptions into fulfillment calls.

use bls12_381::{G1Affine, G1Projective, Scalar};
use group::Curve;
use rand::rngs::OsRng;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use grid_crypto::elgamal::{compress_g1, decrypt_counter, recover_shared, unmask_block};
use grid_crypto::{prove_field_opening, CryptoError};
use grid_types::{
    decode_field, request_digest, CallbackId, ClearTrade, CounterCiphertext, DecryptionOracle,
    FieldCiphertext, G1Point, RequestToken, SettlementAttestation,
};

/// Number of ciphertexts in a trade-record batch.
const TRADE_FIELDS: usize = 4;

/// Errors that can occur while servicing decryption requests.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Unknown request token")]
    UnknownToken,

    #[error("Malformed batch: expected {expected} ciphertexts, got {got}")]
    MalformedBatch { expected: usize, got: usize },

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A decryption request accepted but not yet executed.
#[derive(Debug, Clone)]
pub struct PendingDecryption {
    /// Correlation token issued for this request
    pub token: RequestToken,
    /// Ciphertexts to open, in the order they were handed over
    pub ciphertexts: Vec<FieldCiphertext>,
    /// Callback the requester designated for the result
    pub callback: CallbackId,
}

/// The result of executing one decryption request.
///
/// Carries everything the fulfillment callback needs: the token it answers,
/// the recovered cleartext and the attestation proving the opening.
#[derive(Debug, Clone)]
pub struct CompletedDecryption {
    pub token: RequestToken,
    pub callback: CallbackId,
    pub cleartext: ClearTrade,
    pub attestation: SettlementAttestation,
}

/// Oracle service managing outstanding decryption requests.
#[derive(Debug)]
pub struct DecryptionService {
    /// Oracle secret key
    secret: Scalar,
    /// Matching public key, published to the ledger
    public: G1Affine,
    /// Nonce folded into each issued token
    next_nonce: u64,
    /// Outstanding requests by token
    pending: HashMap<RequestToken, PendingDecryption>,
}

impl DecryptionService {
    /// Create a service around an existing secret key.
    pub fn new(secret: Scalar) -> Self {
        let public = (G1Projective::generator() * secret).to_affine();
        Self {
            secret,
            public,
            next_nonce: 0,
            pending: HashMap::new(),
        }
    }

    /// Create a service with a freshly generated keypair.
    pub fn generate() -> Self {
        let (secret, _) = grid_crypto::keygen(&mut OsRng);
        Self::new(secret)
    }

    /// The oracle public key in compressed form.
    pub fn public_key(&self) -> G1Point {
        compress_g1(&self.public)
    }

    /// Tokens of all outstanding requests.
    pub fn pending_tokens(&self) -> Vec<RequestToken> {
        self.pending.keys().copied().collect()
    }

    /// Execute one outstanding request: decrypt every field, decode the
    /// cleartext trade and attest each opening.
    ///
    /// The request stays pending if execution fails, so a transient failure
    /// can be retried or the request dropped explicitly.
    pub fn execute(&mut self, token: &RequestToken) -> Result<CompletedDecryption, OracleError> {
        let pending = self.pending.get(token).ok_or(OracleError::UnknownToken)?;

        if pending.ciphertexts.len() != TRADE_FIELDS {
            warn!(
                token = hex::encode(token.0),
                got = pending.ciphertexts.len(),
                "Batch does not describe a trade record"
            );
            return Err(OracleError::MalformedBatch {
                expected: TRADE_FIELDS,
                got: pending.ciphertexts.len(),
            });
        }

        let mut fields = Vec::with_capacity(TRADE_FIELDS);
        let mut openings = Vec::with_capacity(TRADE_FIELDS);
        for ciphertext in &pending.ciphertexts {
            let shared = recover_shared(&self.secret, ciphertext)?;
            let block = unmask_block(ciphertext, &shared);
            fields.push(decode_field(&block));

            let opening =
                prove_field_opening(&self.secret, &self.public, ciphertext, token, &mut OsRng)?;
            openings.push(opening);
        }

        let callback = pending.callback;
        self.pending.remove(token);

        let mut fields = fields.into_iter();
        let cleartext = ClearTrade {
            seller_id: fields.next().unwrap_or_default(),
            buyer_id: fields.next().unwrap_or_default(),
            energy_amount: fields.next().unwrap_or_default(),
            price: fields.next().unwrap_or_default(),
        };

        info!(
            token = hex::encode(token.0),
            seller = %cleartext.seller_id,
            "Decryption completed"
        );

        Ok(CompletedDecryption {
            token: *token,
            callback,
            cleartext,
            attestation: SettlementAttestation { openings },
        })
    }

    /// Execute every outstanding request, in no particular order.
    pub fn execute_all(&mut self) -> Vec<(RequestToken, Result<CompletedDecryption, OracleError>)> {
        self.pending_tokens()
            .into_iter()
            .map(|token| {
                let result = self.execute(&token);
                (token, result)
            })
            .collect()
    }

    /// Drop an outstanding request without executing it.
    pub fn drop_request(&mut self, token: &RequestToken) -> Option<PendingDecryption> {
        self.pending.remove(token)
    }

    /// Reveal the value of an encrypted settlement counter.
    ///
    /// This is the symmetric flow for accumulator handles: the holder of a
    /// counter ciphertext asks the oracle directly, bounded discrete-log
    /// search recovers the count.
    pub fn reveal_counter(
        &self,
        ciphertext: &CounterCiphertext,
        bound: u64,
    ) -> Result<u64, OracleError> {
        Ok(decrypt_counter(&self.secret, ciphertext, bound)?)
    }
}

impl DecryptionOracle for DecryptionService {
    fn request_decryption(
        &mut self,
        ciphertexts: Vec<FieldCiphertext>,
        callback: CallbackId,
    ) -> RequestToken {
        let nonce = self.next_nonce;
        self.next_nonce += 1;

        let token = RequestToken(request_digest(nonce, &ciphertexts));

        info!(
            token = hex::encode(token.0),
            batch = ciphertexts.len(),
            callback = callback.0,
            "Accepted decryption request"
        );
        debug!(nonce, "Issued token from request digest");

        self.pending.insert(
            token,
            PendingDecryption {
                token,
                ciphertexts,
                callback,
            },
        );

        token
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_crypto::elgamal::{encrypt_counter, encrypt_trade, keygen};
    use grid_crypto::verify_field_opening;

    fn sample_trade() -> ClearTrade {
        ClearTrade {
            seller_id: "alice".to_string(),
            buyer_id: "bob".to_string(),
            energy_amount: "10".to_string(),
            price: "500".to_string(),
        }
    }

    fn service_with_batch() -> (DecryptionService, RequestToken, Vec<FieldCiphertext>) {
        let mut service = DecryptionService::generate();
        let public = grid_crypto::elgamal::decompress_g1(&service.public_key().0).unwrap();

        let ciphertexts = encrypt_trade(&public, &sample_trade(), &mut OsRng)
            .unwrap()
            .to_vec();
        let token = service.request_decryption(ciphertexts.clone(), CallbackId(1));
        (service, token, ciphertexts)
    }

    #[test]
    fn test_repeated_requests_issue_distinct_tokens() {
        let mut service = DecryptionService::generate();
        let public = grid_crypto::elgamal::decompress_g1(&service.public_key().0).unwrap();
        let ciphertexts = encrypt_trade(&public, &sample_trade(), &mut OsRng)
            .unwrap()
            .to_vec();

        let first = service.request_decryption(ciphertexts.clone(), CallbackId(1));
        let second = service.request_decryption(ciphertexts, CallbackId(1));

        assert_ne!(first, second);
        assert_eq!(service.pending_tokens().len(), 2);
    }

    #[test]
    fn test_execute_recovers_cleartext_and_attests() {
        let (mut service, token, ciphertexts) = service_with_batch();

        let completed = service.execute(&token).unwrap();
        assert_eq!(completed.cleartext, sample_trade());
        assert_eq!(completed.callback, CallbackId(1));
        assert_eq!(completed.attestation.openings.len(), 4);

        // Every opening verifies against the original ciphertexts and token
        let public = service.public_key();
        for (ciphertext, opening) in ciphertexts.iter().zip(&completed.attestation.openings) {
            assert!(verify_field_opening(&public, ciphertext, &token, opening).is_ok());
        }

        // Consumed on success
        assert!(service.pending_tokens().is_empty());
        assert!(matches!(
            service.execute(&token),
            Err(OracleError::UnknownToken)
        ));
    }

    #[test]
    fn test_execute_unknown_token() {
        let mut service = DecryptionService::generate();
        let result = service.execute(&RequestToken([9u8; 32]));
        assert!(matches!(result, Err(OracleError::UnknownToken)));
    }

    #[test]
    fn test_execute_malformed_batch() {
        let mut service = DecryptionService::generate();
        let public = grid_crypto::elgamal::decompress_g1(&service.public_key().0).unwrap();

        let ciphertexts = encrypt_trade(&public, &sample_trade(), &mut OsRng).unwrap()[..2].to_vec();
        let token = service.request_decryption(ciphertexts, CallbackId(1));

        let result = service.execute(&token);
        assert!(matches!(
            result,
            Err(OracleError::MalformedBatch {
                expected: 4,
                got: 2
            })
        ));

        // Failed requests stay pending
        assert_eq!(service.pending_tokens().len(), 1);
    }

    #[test]
    fn test_execute_all_drains_pending() {
        let (mut service, _, _) = service_with_batch();
        let public = grid_crypto::elgamal::decompress_g1(&service.public_key().0).unwrap();
        let more = encrypt_trade(&public, &sample_trade(), &mut OsRng)
            .unwrap()
            .to_vec();
        service.request_decryption(more, CallbackId(1));

        let results = service.execute_all();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|(_, result)| result.is_ok()));
        assert!(service.pending_tokens().is_empty());
    }

    #[test]
    fn test_drop_request() {
        let (mut service, token, _) = service_with_batch();

        assert!(service.drop_request(&token).is_some());
        assert!(matches!(
            service.execute(&token),
            Err(OracleError::UnknownToken)
        ));
    }

    #[test]
    fn test_reveal_counter() {
        let (secret, public) = keygen(&mut OsRng);
        let service = DecryptionService::new(secret);

        let ciphertext = encrypt_counter(&public, 7, &mut OsRng);
        assert_eq!(service.reveal_counter(&ciphertext, 100).unwrap(), 7);
    }
}
