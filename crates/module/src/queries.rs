//! Query handlers for the trade ledger module.
//!
//! These functions provide read-only access to ledger state.

use crate::state::LedgerState;
use grid_types::{CounterCiphertext, EncryptedRecord, G1Point, SettlementProjection};
use serde::{Deserialize, Serialize};

/// Query request types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LedgerQuery {
    /// Get an encrypted record by ID.
    GetRecord { record_id: u64 },

    /// Get a record's cleartext projection (empty until settled).
    GetProjection { record_id: u64 },

    /// Get all records in ID order (paginated).
    ListRecords { offset: u64, limit: u64 },

    /// Get the total number of records ever submitted.
    RecordCount,

    /// Get a seller's encrypted settlement counter.
    GetSellerTotal { seller_id: String },

    /// Get all sellers seen so far, in first-settlement order.
    ListSellers,

    /// Get the oracle public key.
    GetOracleKey,
}

/// Query response types.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum LedgerQueryResponse {
    /// Encrypted record.
    Record(Option<EncryptedRecord>),

    /// Cleartext projection.
    Projection(Option<SettlementProjection>),

    /// Page of records.
    RecordList(Vec<EncryptedRecord>),

    /// Record count.
    Count(u64),

    /// Encrypted per-seller counter (uninitialized handle for unknown sellers).
    SellerTotal(CounterCiphertext),

    /// Known sellers.
    Sellers(Vec<String>),

    /// Oracle public key.
    OracleKey(Option<G1Point>),
}

/// Handle a query.
pub fn handle_query(state: &LedgerState, query: LedgerQuery) -> LedgerQueryResponse {
    match query {
        LedgerQuery::GetRecord { record_id } => {
            LedgerQueryResponse::Record(state.get_record(record_id).cloned())
        }

        LedgerQuery::GetProjection { record_id } => {
            LedgerQueryResponse::Projection(state.get_projection(record_id).cloned())
        }

        LedgerQuery::ListRecords { offset, limit } => {
            let limit = limit.min(state.params.max_list_page);
            let records: Vec<EncryptedRecord> = (1..=state.record_count())
                .skip(offset as usize)
                .take(limit as usize)
                .filter_map(|id| state.get_record(id).cloned())
                .collect();
            LedgerQueryResponse::RecordList(records)
        }

        LedgerQuery::RecordCount => LedgerQueryResponse::Count(state.record_count()),

        LedgerQuery::GetSellerTotal { seller_id } => {
            LedgerQueryResponse::SellerTotal(state.seller_total(&seller_id))
        }

        LedgerQuery::ListSellers => LedgerQueryResponse::Sellers(state.seller_order.clone()),

        LedgerQuery::GetOracleKey => {
            LedgerQueryResponse::OracleKey(state.oracle_public_key.clone())
        }
    }
}

/// Summary of a record for listing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordSummary {
    pub record_id: u64,
    pub submitted_at: u64,
    pub settled: bool,
    pub pending_requests: usize,
}

impl RecordSummary {
    /// Create a summary from ledger state.
    pub fn from_state(state: &LedgerState, record: &EncryptedRecord) -> Self {
        Self {
            record_id: record.record_id,
            submitted_at: record.submitted_at,
            settled: state.is_settled(record.record_id),
            pending_requests: state.pending_count_for(record.record_id),
        }
    }
}

/// Get record summaries for listing.
pub fn get_record_summaries(state: &LedgerState, offset: usize, limit: usize) -> Vec<RecordSummary> {
    (1..=state.record_count())
        .skip(offset)
        .take(limit)
        .filter_map(|id| state.get_record(id))
        .map(|record| RecordSummary::from_state(state, record))
        .collect()
}

/// Get records whose projection has not been settled yet.
pub fn get_unsettled_records(state: &LedgerState) -> Vec<u64> {
    (1..=state.record_count())
        .filter(|id| !state.is_settled(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_types::{FieldCiphertext, G1Point};

    fn state_with_records(count: u64) -> LedgerState {
        let mut state = LedgerState::new();
        for _ in 0..count {
            let id = state.allocate_record_id();
            state.records.insert(
                id,
                EncryptedRecord {
                    record_id: id,
                    seller_id: FieldCiphertext {
                        ephemeral: G1Point([1u8; 48]),
                        masked: [0u8; 32],
                    },
                    buyer_id: FieldCiphertext::default(),
                    energy_amount: FieldCiphertext::default(),
                    price: FieldCiphertext::default(),
                    submitted_at: 1000 + id,
                },
            );
            state
                .projections
                .insert(id, SettlementProjection::default());
        }
        state
    }

    #[test]
    fn test_record_count_query() {
        let state = state_with_records(3);
        let response = handle_query(&state, LedgerQuery::RecordCount);
        assert!(matches!(response, LedgerQueryResponse::Count(3)));
    }

    #[test]
    fn test_get_record_missing() {
        let state = state_with_records(1);
        let response = handle_query(&state, LedgerQuery::GetRecord { record_id: 9 });
        assert!(matches!(response, LedgerQueryResponse::Record(None)));
    }

    #[test]
    fn test_list_records_pagination() {
        let state = state_with_records(5);

        let response = handle_query(&state, LedgerQuery::ListRecords { offset: 1, limit: 2 });
        match response {
            LedgerQueryResponse::RecordList(records) => {
                let ids: Vec<u64> = records.iter().map(|r| r.record_id).collect();
                assert_eq!(ids, vec![2, 3]);
            }
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_list_records_clamps_page_size() {
        let mut state = state_with_records(5);
        state.params.max_list_page = 2;

        let response = handle_query(&state, LedgerQuery::ListRecords { offset: 0, limit: 50 });
        match response {
            LedgerQueryResponse::RecordList(records) => assert_eq!(records.len(), 2),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_seller_total_uninitialized() {
        let state = LedgerState::new();
        let response = handle_query(
            &state,
            LedgerQuery::GetSellerTotal {
                seller_id: "alice".to_string(),
            },
        );
        match response {
            LedgerQueryResponse::SellerTotal(total) => assert!(!total.is_initialized()),
            other => panic!("unexpected response: {:?}", other),
        }
    }

    #[test]
    fn test_unsettled_records_helper() {
        let mut state = state_with_records(3);
        if let Some(projection) = state.projections.get_mut(&2) {
            projection.settled = true;
        }

        assert_eq!(get_unsettled_records(&state), vec![1, 3]);
    }

    #[test]
    fn test_record_summaries() {
        let mut state = state_with_records(2);
        state
            .pending_requests
            .insert(grid_types::RequestToken([7u8; 32]), 1);

        let summaries = get_record_summaries(&state, 0, 10);
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].record_id, 1);
        assert_eq!(summaries[0].pending_requests, 1);
        assert!(!summaries[0].settled);
        assert_eq!(summaries[1].pending_requests, 0);
    }
}
