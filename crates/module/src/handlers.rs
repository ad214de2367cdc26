//! Call handlers for the trade ledger module.
//!
//! These functions implement the business logic for each call type.

use crate::error::LedgerError;
use crate::state::LedgerState;
use crate::SETTLEMENT_CALLBACK;
use grid_crypto::elgamal::{add_counters, decompress_g1, trivial_counter, verify_masked_payload};
use grid_crypto::verify_field_opening;
use grid_types::{
    encode_field, Address, ClearTrade, DecryptionOracle, EncryptedRecord, FieldCiphertext,
    G1Point, LedgerEvent, RequestToken, SettlementAttestation, SettlementProjection,
};

/// Context provided by the runtime for each call.
pub struct CallContext {
    /// Sender of the transaction
    pub sender: Address,
    /// Current block height
    pub block_height: u64,
    /// Current timestamp
    pub timestamp: u64,
}

/// Result type for handlers.
pub type HandlerResult<T> = Result<T, LedgerError>;

/// Handle SubmitRecord call.
///
/// Appends an encrypted record under the next dense identifier and creates
/// its empty projection. Permissionless: any sender may submit, and the
/// ledger never inspects field plaintext.
pub fn handle_submit_record(
    state: &mut LedgerState,
    ctx: &CallContext,
    seller_id: FieldCiphertext,
    buyer_id: FieldCiphertext,
    energy_amount: FieldCiphertext,
    price: FieldCiphertext,
) -> HandlerResult<u64> {
    // Reject never-written handles
    for ciphertext in [&seller_id, &buyer_id, &energy_amount, &price] {
        if !ciphertext.is_initialized() {
            return Err(LedgerError::InvalidCiphertext);
        }
    }

    let record_id = state.allocate_record_id();

    let record = EncryptedRecord {
        record_id,
        seller_id,
        buyer_id,
        energy_amount,
        price,
        submitted_at: ctx.timestamp,
    };

    state.records.insert(record_id, record);
    state
        .projections
        .insert(record_id, SettlementProjection::default());

    state.emit(LedgerEvent::RecordSubmitted {
        record_id,
        timestamp: ctx.timestamp,
    });

    Ok(record_id)
}

/// Handle RequestSettlement call.
///
/// Registers intent with the external decryption capability and records the
/// returned token so the later callback can be correlated. Repeatable while
/// the record stays unsettled; multiple outstanding tokens may map to the
/// same record.
pub fn handle_request_settlement(
    state: &mut LedgerState,
    _ctx: &CallContext,
    oracle: &mut dyn DecryptionOracle,
    record_id: u64,
) -> HandlerResult<RequestToken> {
    let record = state
        .get_record(record_id)
        .ok_or(LedgerError::RecordNotFound(record_id))?;

    // Linearization point against requests racing a completed settlement
    if state.is_settled(record_id) {
        return Err(LedgerError::AlreadySettled);
    }

    if state.oracle_public_key.is_none() {
        return Err(LedgerError::OracleKeyNotSet);
    }

    let ciphertexts: Vec<FieldCiphertext> =
        record.ciphertexts().into_iter().cloned().collect();

    let token = oracle.request_decryption(ciphertexts, SETTLEMENT_CALLBACK);
    state.pending_requests.insert(token, record_id);

    state.emit(LedgerEvent::DecryptionRequested { record_id });

    Ok(token)
}

/// Handle FulfillSettlement call (the oracle's completion callback).
///
/// The caller is untrusted: the token must resolve to an outstanding
/// request, the record must still be unsettled, and the cleartext must be
/// proven against the original ciphertexts before anything is written. Any
/// failure leaves all state untouched, including the pending token.
///
/// Returns the ID of the record that was settled.
pub fn handle_fulfill_settlement(
    state: &mut LedgerState,
    _ctx: &CallContext,
    token: RequestToken,
    cleartext: ClearTrade,
    attestation: SettlementAttestation,
) -> HandlerResult<u64> {
    // Resolve the token; unknown or consumed tokens are rejected outright
    let record_id = *state
        .pending_requests
        .get(&token)
        .ok_or(LedgerError::InvalidRequest)?;

    let record = state
        .get_record(record_id)
        .ok_or(LedgerError::RecordNotFound(record_id))?;

    // First verified callback wins; later ones land here
    if state.is_settled(record_id) {
        return Err(LedgerError::AlreadySettled);
    }

    let oracle_key = state
        .oracle_public_key
        .as_ref()
        .ok_or(LedgerError::OracleKeyNotSet)?;

    // Verify the attestation before trusting any cleartext
    if attestation.openings.len() != record.ciphertexts().len() {
        return Err(LedgerError::ProofInvalid);
    }

    for ((ciphertext, field), opening) in record
        .ciphertexts()
        .into_iter()
        .zip(cleartext.fields())
        .zip(&attestation.openings)
    {
        verify_field_opening(oracle_key, ciphertext, &token, opening)
            .map_err(|_| LedgerError::ProofInvalid)?;

        // The DLEQ proof pins the shared point; the claimed cleartext must
        // be exactly what that point unmasks
        let block = encode_field(field).ok_or(LedgerError::ProofInvalid)?;
        let shared =
            decompress_g1(&opening.shared.0).map_err(|_| LedgerError::ProofInvalid)?;
        verify_masked_payload(ciphertext, &shared, &block)
            .map_err(|_| LedgerError::ProofInvalid)?;
    }

    // Compute the updated accumulator before mutating anything, so failures
    // cannot leave a half-applied settlement
    let previous_total = state.seller_total(&cleartext.seller_id);
    let base = if previous_total.is_initialized() {
        previous_total
    } else {
        trivial_counter(0)
    };
    let updated_total =
        add_counters(&base, &trivial_counter(1)).map_err(|_| LedgerError::InvalidCiphertext)?;

    // Token is consumed only by a successful fulfillment
    state.pending_requests.remove(&token);

    let projection = state.projections.entry(record_id).or_default();
    projection.seller_id = cleartext.seller_id.clone();
    projection.buyer_id = cleartext.buyer_id;
    projection.energy_amount = cleartext.energy_amount;
    projection.price = cleartext.price;
    projection.settled = true;

    let seller = cleartext.seller_id;
    if !state.seller_totals.contains_key(&seller) {
        state.seller_order.push(seller.clone());
    }
    state.seller_totals.insert(seller, updated_total);

    state.emit(LedgerEvent::TransactionDecrypted { record_id });

    Ok(record_id)
}

/// Handle SetOracleKey call.
pub fn handle_set_oracle_key(
    state: &mut LedgerState,
    _ctx: &CallContext,
    public_key: G1Point,
) -> HandlerResult<()> {
    // In production, this would require governance authorization
    decompress_g1(&public_key.0).map_err(|_| LedgerError::InvalidOracleKey)?;
    state.oracle_public_key = Some(public_key);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bls12_381::{G1Affine, Scalar};
    use grid_crypto::elgamal::{compress_g1, encrypt_trade, keygen};
    use grid_crypto::prove_field_opening;
    use grid_types::CallbackId;
    use rand::rngs::OsRng;

    /// Hands out sequential tokens without doing any decryption.
    struct StubOracle {
        next_token: u8,
    }

    impl StubOracle {
        fn new() -> Self {
            Self { next_token: 0 }
        }
    }

    impl DecryptionOracle for StubOracle {
        fn request_decryption(
            &mut self,
            _ciphertexts: Vec<FieldCiphertext>,
            _callback: CallbackId,
        ) -> RequestToken {
            self.next_token += 1;
            RequestToken([self.next_token; 32])
        }
    }

    fn test_context(sender: Address) -> CallContext {
        CallContext {
            sender,
            block_height: 100,
            timestamp: 1000,
        }
    }

    fn sample_trade(seller: &str) -> ClearTrade {
        ClearTrade {
            seller_id: seller.to_string(),
            buyer_id: "bob".to_string(),
            energy_amount: "10".to_string(),
            price: "500".to_string(),
        }
    }

    /// State with the oracle key installed, plus the matching secret.
    fn setup_state_with_key() -> (LedgerState, Scalar, G1Affine) {
        let (secret, public) = keygen(&mut OsRng);
        let mut state = LedgerState::new();
        let ctx = test_context([0u8; 32]);
        handle_set_oracle_key(&mut state, &ctx, compress_g1(&public)).unwrap();
        (state, secret, public)
    }

    fn submit_trade(state: &mut LedgerState, public: &G1Affine, trade: &ClearTrade) -> u64 {
        let cts = encrypt_trade(public, trade, &mut OsRng).unwrap();
        let [seller_id, buyer_id, energy_amount, price] = cts;
        handle_submit_record(
            state,
            &test_context([1u8; 32]),
            seller_id,
            buyer_id,
            energy_amount,
            price,
        )
        .unwrap()
    }

    /// Produce the attestation the real oracle would send back.
    fn attest(
        state: &LedgerState,
        secret: &Scalar,
        public: &G1Affine,
        record_id: u64,
        token: &RequestToken,
    ) -> SettlementAttestation {
        let record = state.get_record(record_id).unwrap();
        let openings = record
            .ciphertexts()
            .into_iter()
            .map(|ct| prove_field_opening(secret, public, ct, token, &mut OsRng).unwrap())
            .collect();
        SettlementAttestation { openings }
    }

    #[test]
    fn test_submit_record_assigns_dense_ids() {
        let (mut state, _, public) = setup_state_with_key();
        let trade = sample_trade("alice");

        for expected in 1..=3u64 {
            let id = submit_trade(&mut state, &public, &trade);
            assert_eq!(id, expected);
        }

        assert_eq!(state.record_count(), 3);
        assert!(state.get_projection(2).is_some());
        assert!(!state.is_settled(2));
    }

    #[test]
    fn test_submit_record_emits_event() {
        let (mut state, _, public) = setup_state_with_key();
        let id = submit_trade(&mut state, &public, &sample_trade("alice"));

        assert_eq!(
            state.events.last(),
            Some(&LedgerEvent::RecordSubmitted {
                record_id: id,
                timestamp: 1000,
            })
        );
    }

    #[test]
    fn test_submit_record_rejects_uninitialized_handle() {
        let (mut state, _, public) = setup_state_with_key();
        let cts = encrypt_trade(&public, &sample_trade("alice"), &mut OsRng).unwrap();
        let [seller_id, buyer_id, energy_amount, _] = cts;

        let result = handle_submit_record(
            &mut state,
            &test_context([1u8; 32]),
            seller_id,
            buyer_id,
            energy_amount,
            FieldCiphertext::default(),
        );

        assert!(matches!(result, Err(LedgerError::InvalidCiphertext)));
        assert_eq!(state.record_count(), 0);
    }

    #[test]
    fn test_request_settlement_unknown_record() {
        let (mut state, _, _) = setup_state_with_key();
        let mut oracle = StubOracle::new();

        let result = handle_request_settlement(
            &mut state,
            &test_context([1u8; 32]),
            &mut oracle,
            42,
        );

        assert!(matches!(result, Err(LedgerError::RecordNotFound(42))));
    }

    #[test]
    fn test_request_settlement_requires_oracle_key() {
        let (mut state, _, public) = setup_state_with_key();
        let id = submit_trade(&mut state, &public, &sample_trade("alice"));

        state.oracle_public_key = None;

        let mut oracle = StubOracle::new();
        let result =
            handle_request_settlement(&mut state, &test_context([1u8; 32]), &mut oracle, id);

        assert!(matches!(result, Err(LedgerError::OracleKeyNotSet)));
    }

    #[test]
    fn test_request_settlement_tracks_pending_token() {
        let (mut state, _, public) = setup_state_with_key();
        let id = submit_trade(&mut state, &public, &sample_trade("alice"));

        let mut oracle = StubOracle::new();
        let token =
            handle_request_settlement(&mut state, &test_context([1u8; 32]), &mut oracle, id)
                .unwrap();

        assert_eq!(state.pending_requests.get(&token), Some(&id));
        assert_eq!(
            state.events.last(),
            Some(&LedgerEvent::DecryptionRequested { record_id: id })
        );
    }

    #[test]
    fn test_request_settlement_repeatable_while_unsettled() {
        let (mut state, _, public) = setup_state_with_key();
        let id = submit_trade(&mut state, &public, &sample_trade("alice"));

        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();
        let first = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();
        let second = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();

        assert_ne!(first, second);
        assert_eq!(state.pending_count_for(id), 2);
    }

    #[test]
    fn test_fulfill_settlement_happy_path() {
        let (mut state, secret, public) = setup_state_with_key();
        let trade = sample_trade("alice");
        let id = submit_trade(&mut state, &public, &trade);

        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();
        let token = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();
        let attestation = attest(&state, &secret, &public, id, &token);

        let settled_id =
            handle_fulfill_settlement(&mut state, &ctx, token, trade.clone(), attestation).unwrap();
        assert_eq!(settled_id, id);

        let projection = state.get_projection(id).unwrap();
        assert!(projection.settled);
        assert_eq!(projection.seller_id, "alice");
        assert_eq!(projection.buyer_id, "bob");
        assert_eq!(projection.energy_amount, "10");
        assert_eq!(projection.price, "500");

        // Token consumed, seller registered, event emitted
        assert!(!state.pending_requests.contains_key(&token));
        assert_eq!(state.seller_order, vec!["alice".to_string()]);
        assert!(state.seller_total("alice").is_initialized());
        assert_eq!(
            state.events.last(),
            Some(&LedgerEvent::TransactionDecrypted { record_id: id })
        );
    }

    #[test]
    fn test_fulfill_settlement_unknown_token() {
        let (mut state, secret, public) = setup_state_with_key();
        let trade = sample_trade("alice");
        let id = submit_trade(&mut state, &public, &trade);

        let never_issued = RequestToken([0xAB; 32]);
        let attestation = attest(&state, &secret, &public, id, &never_issued);

        let result = handle_fulfill_settlement(
            &mut state,
            &test_context([1u8; 32]),
            never_issued,
            trade,
            attestation,
        );

        assert!(matches!(result, Err(LedgerError::InvalidRequest)));
        assert!(!state.is_settled(id));
    }

    #[test]
    fn test_fulfill_settlement_replay_of_consumed_token() {
        let (mut state, secret, public) = setup_state_with_key();
        let trade = sample_trade("alice");
        let id = submit_trade(&mut state, &public, &trade);

        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();
        let token = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();
        let attestation = attest(&state, &secret, &public, id, &token);

        handle_fulfill_settlement(&mut state, &ctx, token, trade.clone(), attestation.clone())
            .unwrap();

        // The exact same callback again: token is gone
        let replay = handle_fulfill_settlement(&mut state, &ctx, token, trade, attestation);
        assert!(matches!(replay, Err(LedgerError::InvalidRequest)));
    }

    #[test]
    fn test_fulfill_settlement_second_token_already_settled() {
        let (mut state, secret, public) = setup_state_with_key();
        let trade = sample_trade("alice");
        let id = submit_trade(&mut state, &public, &trade);

        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();
        let first = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();
        let second = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();

        let attestation = attest(&state, &secret, &public, id, &first);
        handle_fulfill_settlement(&mut state, &ctx, first, trade.clone(), attestation).unwrap();

        // The losing token still resolves, but the projection is final
        let attestation = attest(&state, &secret, &public, id, &second);
        let result = handle_fulfill_settlement(&mut state, &ctx, second, trade, attestation);
        assert!(matches!(result, Err(LedgerError::AlreadySettled)));

        // Only one settlement made it into the accumulator; the losing
        // token was not consumed
        assert_eq!(state.seller_order.len(), 1);
        assert!(state.pending_requests.contains_key(&second));
    }

    #[test]
    fn test_request_settlement_after_settled() {
        let (mut state, secret, public) = setup_state_with_key();
        let trade = sample_trade("alice");
        let id = submit_trade(&mut state, &public, &trade);

        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();
        let token = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();
        let attestation = attest(&state, &secret, &public, id, &token);
        handle_fulfill_settlement(&mut state, &ctx, token, trade, attestation).unwrap();

        let result = handle_request_settlement(&mut state, &ctx, &mut oracle, id);
        assert!(matches!(result, Err(LedgerError::AlreadySettled)));
    }

    #[test]
    fn test_fulfill_settlement_tampered_cleartext() {
        let (mut state, secret, public) = setup_state_with_key();
        let trade = sample_trade("alice");
        let id = submit_trade(&mut state, &public, &trade);

        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();
        let token = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();
        let attestation = attest(&state, &secret, &public, id, &token);

        let mut tampered = trade;
        tampered.price = "999999".to_string();

        let result =
            handle_fulfill_settlement(&mut state, &ctx, token, tampered, attestation);
        assert!(matches!(result, Err(LedgerError::ProofInvalid)));

        // Nothing was written and the token is still outstanding
        assert!(!state.is_settled(id));
        assert!(state.pending_requests.contains_key(&token));
        assert!(!state.seller_total("alice").is_initialized());
    }

    #[test]
    fn test_fulfill_settlement_forged_proof() {
        let (mut state, secret, public) = setup_state_with_key();
        let trade = sample_trade("alice");
        let id = submit_trade(&mut state, &public, &trade);

        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();
        let token = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();

        // Openings made by a key that is not the oracle's
        let (forged_secret, forged_public) = keygen(&mut OsRng);
        let attestation = attest(&state, &forged_secret, &forged_public, id, &token);

        let result = handle_fulfill_settlement(&mut state, &ctx, token, trade, attestation);
        assert!(matches!(result, Err(LedgerError::ProofInvalid)));
        assert!(!state.is_settled(id));
    }

    #[test]
    fn test_fulfill_settlement_truncated_attestation() {
        let (mut state, secret, public) = setup_state_with_key();
        let trade = sample_trade("alice");
        let id = submit_trade(&mut state, &public, &trade);

        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();
        let token = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();

        let mut attestation = attest(&state, &secret, &public, id, &token);
        attestation.openings.truncate(2);

        let result = handle_fulfill_settlement(&mut state, &ctx, token, trade, attestation);
        assert!(matches!(result, Err(LedgerError::ProofInvalid)));
    }

    #[test]
    fn test_accumulator_counts_settlements_per_seller() {
        let (mut state, secret, public) = setup_state_with_key();
        let ctx = test_context([1u8; 32]);
        let mut oracle = StubOracle::new();

        // alice settles twice, carol once
        for trade in [
            sample_trade("alice"),
            sample_trade("alice"),
            sample_trade("carol"),
        ] {
            let id = submit_trade(&mut state, &public, &trade);
            let token = handle_request_settlement(&mut state, &ctx, &mut oracle, id).unwrap();
            let attestation = attest(&state, &secret, &public, id, &token);
            handle_fulfill_settlement(&mut state, &ctx, token, trade, attestation).unwrap();
        }

        use grid_crypto::elgamal::decrypt_counter;
        let alice = state.seller_total("alice");
        let carol = state.seller_total("carol");
        assert_eq!(decrypt_counter(&secret, &alice, 100).unwrap(), 2);
        assert_eq!(decrypt_counter(&secret, &carol, 100).unwrap(), 1);

        assert_eq!(
            state.seller_order,
            vec!["alice".to_string(), "carol".to_string()]
        );
    }

    #[test]
    fn test_set_oracle_key_rejects_garbage() {
        let mut state = LedgerState::new();
        let ctx = test_context([0u8; 32]);

        let result = handle_set_oracle_key(&mut state, &ctx, G1Point([0xFF; 48]));
        assert!(matches!(result, Err(LedgerError::InvalidOracleKey)));
        assert!(state.oracle_public_key.is_none());
    }
}
