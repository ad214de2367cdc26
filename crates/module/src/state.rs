//! On-ledger state structures for the trade ledger module.

use crate::genesis::LedgerParams;
use grid_types::{
    CounterCiphertext, EncryptedRecord, G1Point, LedgerEvent, RequestToken, SettlementProjection,
};
use std::collections::HashMap;

/// Trade ledger module state.
///
/// In a real ledger runtime these would be StateMap/StateValue types.
/// This is a simplified in-memory representation for development.
#[derive(Debug, Default)]
pub struct LedgerState {
    /// Next record ID to assign
    pub next_record_id: u64,

    /// All encrypted records by ID (append-only)
    pub records: HashMap<u64, EncryptedRecord>,

    /// Cleartext projections, parallel to `records`
    pub projections: HashMap<u64, SettlementProjection>,

    /// Outstanding decryption requests: token -> record ID
    pub pending_requests: HashMap<RequestToken, u64>,

    /// Encrypted settlement counters per seller
    pub seller_totals: HashMap<String, CounterCiphertext>,

    /// Sellers in first-settlement order, for enumeration
    pub seller_order: Vec<String>,

    /// Oracle public key used to verify fulfillment proofs
    pub oracle_public_key: Option<G1Point>,

    /// Operational parameters fixed at genesis
    pub params: LedgerParams,

    /// Events emitted by handlers, in order
    pub events: Vec<LedgerEvent>,
}

impl LedgerState {
    /// Create a new ledger state.
    pub fn new() -> Self {
        Self {
            next_record_id: 1,
            ..Default::default()
        }
    }

    /// Get the next record ID and increment.
    pub fn allocate_record_id(&mut self) -> u64 {
        let id = self.next_record_id;
        self.next_record_id += 1;
        id
    }

    /// Get record by ID.
    pub fn get_record(&self, record_id: u64) -> Option<&EncryptedRecord> {
        self.records.get(&record_id)
    }

    /// Get projection by record ID.
    pub fn get_projection(&self, record_id: u64) -> Option<&SettlementProjection> {
        self.projections.get(&record_id)
    }

    /// Whether a record's projection has been settled.
    pub fn is_settled(&self, record_id: u64) -> bool {
        self.projections
            .get(&record_id)
            .map(|projection| projection.settled)
            .unwrap_or(false)
    }

    /// Total number of records ever submitted.
    pub fn record_count(&self) -> u64 {
        self.next_record_id.saturating_sub(1)
    }

    /// The seller's encrypted settlement counter, or an uninitialized
    /// handle if no settlement has named this seller yet.
    pub fn seller_total(&self, seller_id: &str) -> CounterCiphertext {
        self.seller_totals
            .get(seller_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Count outstanding decryption requests for a record.
    pub fn pending_count_for(&self, record_id: u64) -> usize {
        self.pending_requests
            .values()
            .filter(|id| **id == record_id)
            .count()
    }

    /// Append an event to the emitted log.
    pub fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_record_id() {
        let mut state = LedgerState::new();
        assert_eq!(state.allocate_record_id(), 1);
        assert_eq!(state.allocate_record_id(), 2);
        assert_eq!(state.allocate_record_id(), 3);
        assert_eq!(state.record_count(), 3);
    }

    #[test]
    fn test_fresh_state_is_empty() {
        let state = LedgerState::new();
        assert_eq!(state.record_count(), 0);
        assert!(state.get_record(1).is_none());
        assert!(!state.is_settled(1));
        assert!(state.events.is_empty());
    }

    #[test]
    fn test_unknown_seller_total_is_uninitialized() {
        let state = LedgerState::new();
        assert!(!state.seller_total("nobody").is_initialized());
    }

    #[test]
    fn test_pending_count_for() {
        let mut state = LedgerState::new();
        state.pending_requests.insert(RequestToken([1u8; 32]), 7);
        state.pending_requests.insert(RequestToken([2u8; 32]), 7);
        state.pending_requests.insert(RequestToken([3u8; 32]), 9);

        assert_eq!(state.pending_count_for(7), 2);
        assert_eq!(state.pending_count_for(9), 1);
        assert_eq!(state.pending_count_for(1), 0);
    }
}
