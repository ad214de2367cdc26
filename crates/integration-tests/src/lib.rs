//! End-to-end integration tests for the confidential trade ledger.
//!
//! These tests exercise the full settlement lifecycle:
//! 1. Oracle key setup
//! 2. Record encryption and submission
//! 3. Settlement requests and token issuance
//! 4. Oracle-side decryption with attested openings
//! 5. Verified callbacks, projections and accumulators

use grid_client::prepare_trade;
use grid_crypto::elgamal::compress_g1;
use grid_crypto::keygen;
use grid_module::queries::{get_unsettled_records, handle_query};
use grid_module::{
    handlers, CallContext, LedgerCall, LedgerError, LedgerGenesisConfig, LedgerQuery,
    LedgerQueryResponse, LedgerState, SETTLEMENT_CALLBACK,
};
use grid_oracle::{DecryptionService, OracleError};
use grid_types::{ClearTrade, G1Point, LedgerEvent, RequestToken};

use borsh::BorshDeserialize;
use rand::rngs::OsRng;

/// Test the complete settlement flow with an in-process oracle.
#[test]
fn test_full_settlement_flow() {
    let mut rng = OsRng;

    // ========================================
    // Phase 1: Setup - oracle keypair and genesis
    // ========================================

    let mut service = DecryptionService::generate();
    let genesis = LedgerGenesisConfig::with_oracle_key(service.public_key());
    genesis.validate().expect("genesis config should validate");
    let mut state = genesis.build_state();

    println!("Setup complete: oracle key published at genesis");

    // ========================================
    // Phase 2: Participant submits an encrypted record
    // ========================================

    let cleartext = ClearTrade {
        seller_id: "alice".to_string(),
        buyer_id: "bob".to_string(),
        energy_amount: "10".to_string(),
        price: "500".to_string(),
    };

    let oracle_key = service.public_key();
    let prepared =
        prepare_trade(&oracle_key, &cleartext, &mut rng).expect("Failed to prepare trade");

    let record_id = handlers::handle_submit_record(
        &mut state,
        &test_context(1),
        prepared.seller_id,
        prepared.buyer_id,
        prepared.energy_amount,
        prepared.price,
    )
    .expect("Failed to submit record");

    assert_eq!(record_id, 1);
    assert!(matches!(
        state.events.last(),
        Some(LedgerEvent::RecordSubmitted { record_id: 1, .. })
    ));

    println!("Record {} submitted", record_id);

    // ========================================
    // Phase 3: Settlement requested
    // ========================================

    let token =
        handlers::handle_request_settlement(&mut state, &test_context(2), &mut service, record_id)
            .expect("Failed to request settlement");

    assert_eq!(state.pending_requests.get(&token), Some(&record_id));
    assert_eq!(service.pending_tokens(), vec![token]);

    println!("Settlement requested, token issued");

    // ========================================
    // Phase 4: Oracle executes the request
    // ========================================

    let completed = service.execute(&token).expect("Failed to execute request");

    assert_eq!(completed.callback, SETTLEMENT_CALLBACK);
    assert_eq!(completed.cleartext, cleartext);
    assert_eq!(completed.attestation.openings.len(), 4);

    println!(
        "Oracle recovered cleartext: {} -> {}",
        completed.cleartext.seller_id, completed.cleartext.buyer_id
    );

    // ========================================
    // Phase 5: Verified callback settles the record
    // ========================================

    let settled_id = handlers::handle_fulfill_settlement(
        &mut state,
        &test_context(9),
        completed.token,
        completed.cleartext,
        completed.attestation,
    )
    .expect("Failed to fulfill settlement");

    assert_eq!(settled_id, record_id);

    let projection = state
        .get_projection(record_id)
        .expect("projection should exist");
    assert!(projection.settled);
    assert_eq!(projection.seller_id, "alice");
    assert_eq!(projection.buyer_id, "bob");
    assert_eq!(projection.energy_amount, "10");
    assert_eq!(projection.price, "500");

    assert!(!state.pending_requests.contains_key(&token));

    // The event stream tells the whole story, in order
    assert_eq!(
        state.events,
        vec![
            LedgerEvent::RecordSubmitted {
                record_id,
                timestamp: 1_700_000_000,
            },
            LedgerEvent::DecryptionRequested { record_id },
            LedgerEvent::TransactionDecrypted { record_id },
        ]
    );

    println!("Record settled: alice -> bob, 10 units at 500");

    // ========================================
    // Phase 6: Seller accumulator reflects the settlement
    // ========================================

    let total = state.seller_total("alice");
    assert!(total.is_initialized());

    let count = service
        .reveal_counter(&total, state.params.counter_recovery_bound)
        .expect("Failed to reveal counter");
    assert_eq!(count, 1);

    println!("\nSettlement complete. alice has {} settled trade(s)", count);
}

/// Record IDs are dense and sequential from 1.
#[test]
fn test_dense_sequential_record_ids() {
    let (mut state, service) = setup();
    let key = service.public_key();

    for expected in 1..=5u64 {
        let id = submit(&mut state, &key, &trade("s", "b", "1", "2"));
        assert_eq!(id, expected);
    }

    assert_eq!(state.record_count(), 5);
}

/// Two outstanding tokens for one record: the first verified callback wins,
/// the second fails without touching state.
#[test]
fn test_repeated_requests_settle_exactly_once() {
    let (mut state, mut service) = setup();
    let key = service.public_key();
    let record_id = submit(&mut state, &key, &trade("alice", "bob", "10", "500"));

    let first =
        handlers::handle_request_settlement(&mut state, &test_context(1), &mut service, record_id)
            .expect("first request");
    let second =
        handlers::handle_request_settlement(&mut state, &test_context(2), &mut service, record_id)
            .expect("second request");

    assert_ne!(first, second);
    assert_eq!(state.pending_count_for(record_id), 2);
    assert_eq!(service.pending_tokens().len(), 2);

    let completed = service.execute(&first).expect("first execution");
    handlers::handle_fulfill_settlement(
        &mut state,
        &test_context(9),
        completed.token,
        completed.cleartext,
        completed.attestation,
    )
    .expect("first callback should settle");

    // The losing callback carries a valid proof but the record is final
    let completed = service.execute(&second).expect("second execution");
    let result = handlers::handle_fulfill_settlement(
        &mut state,
        &test_context(9),
        completed.token,
        completed.cleartext,
        completed.attestation,
    );
    assert!(matches!(result, Err(LedgerError::AlreadySettled)));

    // Exactly one settlement landed; the losing token was not consumed
    let total = state.seller_total("alice");
    assert_eq!(service.reveal_counter(&total, 100).unwrap(), 1);
    assert!(state.pending_requests.contains_key(&second));
}

/// A token the capability never issued resolves nowhere.
#[test]
fn test_never_issued_token_rejected() {
    let (mut state, mut service) = setup();
    let key = service.public_key();
    let record_id = submit(&mut state, &key, &trade("alice", "bob", "10", "500"));

    let token =
        handlers::handle_request_settlement(&mut state, &test_context(1), &mut service, record_id)
            .expect("request");
    let completed = service.execute(&token).expect("execution");

    let forged = RequestToken([0xAB; 32]);
    assert_ne!(forged, token);
    assert!(matches!(
        service.execute(&forged),
        Err(OracleError::UnknownToken)
    ));

    let result = handlers::handle_fulfill_settlement(
        &mut state,
        &test_context(9),
        forged,
        completed.cleartext,
        completed.attestation,
    );
    assert!(matches!(result, Err(LedgerError::InvalidRequest)));
    assert!(!state.is_settled(record_id));
}

/// A tampered cleartext fails verification and leaves the token usable; the
/// honest callback afterwards still settles.
#[test]
fn test_tampered_cleartext_rejected() {
    let (mut state, mut service) = setup();
    let key = service.public_key();
    let record_id = submit(&mut state, &key, &trade("alice", "bob", "10", "500"));

    let token =
        handlers::handle_request_settlement(&mut state, &test_context(1), &mut service, record_id)
            .expect("request");
    let completed = service.execute(&token).expect("execution");

    let mut tampered = completed.cleartext.clone();
    tampered.price = "5000".to_string();

    let result = handlers::handle_fulfill_settlement(
        &mut state,
        &test_context(9),
        token,
        tampered,
        completed.attestation.clone(),
    );
    assert!(matches!(result, Err(LedgerError::ProofInvalid)));

    // Nothing changed: no projection write, token still outstanding,
    // accumulator untouched
    assert!(!state.is_settled(record_id));
    assert!(state.pending_requests.contains_key(&token));
    assert!(!state.seller_total("alice").is_initialized());

    // The honest callback still lands
    handlers::handle_fulfill_settlement(
        &mut state,
        &test_context(9),
        token,
        completed.cleartext,
        completed.attestation,
    )
    .expect("honest callback should settle");
    assert!(state.is_settled(record_id));
}

/// Accumulators count settled trades per seller; buyers get nothing.
#[test]
fn test_accumulator_counts_per_seller() {
    let (mut state, mut service) = setup();
    let key = service.public_key();

    for (seller, buyer) in [("alice", "bob"), ("alice", "dana"), ("carol", "bob")] {
        let record_id = submit(&mut state, &key, &trade(seller, buyer, "10", "500"));
        settle(&mut state, &mut service, record_id);
    }

    let bound = state.params.counter_recovery_bound;
    let alice = state.seller_total("alice");
    let carol = state.seller_total("carol");
    assert_eq!(service.reveal_counter(&alice, bound).unwrap(), 2);
    assert_eq!(service.reveal_counter(&carol, bound).unwrap(), 1);

    // Buyers never accumulate
    assert!(!state.seller_total("bob").is_initialized());
    assert!(!state.seller_total("dana").is_initialized());

    assert_eq!(
        state.seller_order,
        vec!["alice".to_string(), "carol".to_string()]
    );
}

/// Call messages survive borsh transport and dispatch to the handlers.
#[test]
fn test_call_messages_roundtrip_dispatch() {
    let mut rng = OsRng;
    let (mut state, mut service) = setup();
    let key = service.public_key();

    let prepared =
        prepare_trade(&key, &trade("alice", "bob", "10", "500"), &mut rng).expect("prepare");
    let call = LedgerCall::SubmitRecord {
        seller_id: prepared.seller_id,
        buyer_id: prepared.buyer_id,
        energy_amount: prepared.energy_amount,
        price: prepared.price,
    };

    let bytes = borsh::to_vec(&call).expect("encode");
    let decoded = LedgerCall::try_from_slice(&bytes).expect("decode");
    let record_id = apply_call(&mut state, &mut service, decoded).expect("submit");
    assert_eq!(record_id, Some(1));

    let bytes = borsh::to_vec(&LedgerCall::RequestSettlement { record_id: 1 }).expect("encode");
    let decoded = LedgerCall::try_from_slice(&bytes).expect("decode");
    apply_call(&mut state, &mut service, decoded).expect("request");

    let token = service.pending_tokens()[0];
    let completed = service.execute(&token).expect("execution");

    let call = LedgerCall::FulfillSettlement {
        token: completed.token,
        cleartext: completed.cleartext,
        attestation: completed.attestation,
    };
    let bytes = borsh::to_vec(&call).expect("encode");
    let decoded = LedgerCall::try_from_slice(&bytes).expect("decode");
    apply_call(&mut state, &mut service, decoded).expect("fulfill");

    assert!(state.is_settled(1));
}

/// The query surface tracks the record lifecycle.
#[test]
fn test_queries_reflect_lifecycle() {
    let (mut state, mut service) = setup();
    let key = service.public_key();

    let first = submit(&mut state, &key, &trade("alice", "bob", "10", "500"));
    let second = submit(&mut state, &key, &trade("carol", "bob", "3", "120"));

    match handle_query(&state, LedgerQuery::RecordCount) {
        LedgerQueryResponse::Count(count) => assert_eq!(count, 2),
        other => panic!("unexpected response: {:?}", other),
    }

    match handle_query(&state, LedgerQuery::GetProjection { record_id: first }) {
        LedgerQueryResponse::Projection(Some(p)) => assert!(!p.settled),
        other => panic!("unexpected response: {:?}", other),
    }

    settle(&mut state, &mut service, first);

    match handle_query(&state, LedgerQuery::GetProjection { record_id: first }) {
        LedgerQueryResponse::Projection(Some(p)) => {
            assert!(p.settled);
            assert_eq!(p.seller_id, "alice");
        }
        other => panic!("unexpected response: {:?}", other),
    }

    // The second record stays sealed until its own settlement
    match handle_query(&state, LedgerQuery::GetRecord { record_id: second }) {
        LedgerQueryResponse::Record(Some(record)) => {
            assert_eq!(record.record_id, second);
            assert!(record.seller_id.is_initialized());
        }
        other => panic!("unexpected response: {:?}", other),
    }

    assert_eq!(get_unsettled_records(&state), vec![second]);

    match handle_query(&state, LedgerQuery::ListSellers) {
        LedgerQueryResponse::Sellers(sellers) => {
            assert_eq!(sellers, vec!["alice".to_string()])
        }
        other => panic!("unexpected response: {:?}", other),
    }

    match handle_query(&state, LedgerQuery::GetOracleKey) {
        LedgerQueryResponse::OracleKey(Some(published)) => assert_eq!(published, key),
        other => panic!("unexpected response: {:?}", other),
    }
}

/// Field recovery is exact for edge-case strings: empty, multibyte UTF-8,
/// and the 31-byte maximum.
#[test]
fn test_field_recovery_edge_cases() {
    let (mut state, mut service) = setup();
    let key = service.public_key();

    let longest = "s".repeat(31);
    let cases = [
        trade("", "bob", "0", ""),
        trade("grid-北区-7", "bob", "10", "500"),
        trade(&longest, "b", "1", "2"),
    ];

    for cleartext in &cases {
        let record_id = submit(&mut state, &key, cleartext);
        settle(&mut state, &mut service, record_id);

        let projection = state.get_projection(record_id).expect("projection");
        assert_eq!(projection.seller_id, cleartext.seller_id);
        assert_eq!(projection.buyer_id, cleartext.buyer_id);
        assert_eq!(projection.energy_amount, cleartext.energy_amount);
        assert_eq!(projection.price, cleartext.price);
    }
}

/// Fulfillment verifies against the current oracle key: rotating the key
/// orphans attestations produced under the old one.
#[test]
fn test_key_rotation_orphans_old_attestations() {
    let mut rng = OsRng;
    let (mut state, mut service) = setup();
    let key = service.public_key();

    let record_id = submit(&mut state, &key, &trade("alice", "bob", "10", "500"));
    let token =
        handlers::handle_request_settlement(&mut state, &test_context(1), &mut service, record_id)
            .expect("request");
    let completed = service.execute(&token).expect("execution");

    // Rotate to a fresh key before the callback lands
    let (_, replacement) = keygen(&mut rng);
    handlers::handle_set_oracle_key(&mut state, &test_context(0), compress_g1(&replacement))
        .expect("rotation");

    let result = handlers::handle_fulfill_settlement(
        &mut state,
        &test_context(9),
        token,
        completed.cleartext.clone(),
        completed.attestation.clone(),
    );
    assert!(matches!(result, Err(LedgerError::ProofInvalid)));

    // Restoring the original key lets the same callback through
    handlers::handle_set_oracle_key(&mut state, &test_context(0), service.public_key())
        .expect("restore");
    handlers::handle_fulfill_settlement(
        &mut state,
        &test_context(9),
        token,
        completed.cleartext,
        completed.attestation,
    )
    .expect("callback should verify under the original key");
    assert!(state.is_settled(record_id));
}

// Helper functions

fn test_context(sender: u8) -> CallContext {
    CallContext {
        sender: [sender; 32],
        block_height: 1,
        timestamp: 1_700_000_000,
    }
}

fn trade(seller: &str, buyer: &str, amount: &str, price: &str) -> ClearTrade {
    ClearTrade {
        seller_id: seller.to_string(),
        buyer_id: buyer.to_string(),
        energy_amount: amount.to_string(),
        price: price.to_string(),
    }
}

fn setup() -> (LedgerState, DecryptionService) {
    let service = DecryptionService::generate();
    let genesis = LedgerGenesisConfig::with_oracle_key(service.public_key());
    genesis.validate().expect("genesis config should validate");
    (genesis.build_state(), service)
}

fn submit(state: &mut LedgerState, oracle_key: &G1Point, cleartext: &ClearTrade) -> u64 {
    let prepared =
        prepare_trade(oracle_key, cleartext, &mut OsRng).expect("trade encryption");
    handlers::handle_submit_record(
        state,
        &test_context(1),
        prepared.seller_id,
        prepared.buyer_id,
        prepared.energy_amount,
        prepared.price,
    )
    .expect("record submission")
}

fn settle(state: &mut LedgerState, service: &mut DecryptionService, record_id: u64) -> u64 {
    let token =
        handlers::handle_request_settlement(state, &test_context(1), service, record_id)
            .expect("settlement request");
    let completed = service.execute(&token).expect("request execution");
    handlers::handle_fulfill_settlement(
        state,
        &test_context(9),
        completed.token,
        completed.cleartext,
        completed.attestation,
    )
    .expect("settlement callback")
}

/// Minimal runtime dispatch: decode a call and route it to its handler.
fn apply_call(
    state: &mut LedgerState,
    oracle: &mut DecryptionService,
    call: LedgerCall,
) -> Result<Option<u64>, LedgerError> {
    let ctx = test_context(1);
    match call {
        LedgerCall::SubmitRecord {
            seller_id,
            buyer_id,
            energy_amount,
            price,
        } => handlers::handle_submit_record(state, &ctx, seller_id, buyer_id, energy_amount, price)
            .map(Some),
        LedgerCall::RequestSettlement { record_id } => {
            handlers::handle_request_settlement(state, &ctx, oracle, record_id).map(|_| None)
        }
        LedgerCall::FulfillSettlement {
            token,
            cleartext,
            attestation,
        } => handlers::handle_fulfill_settlement(state, &ctx, token, cleartext, attestation)
            .map(Some),
        LedgerCall::SetOracleKey { public_key } => {
            handlers::handle_set_oracle_key(state, &ctx, public_key).map(|_| None)
        }
    }
}
