//! Ledger module for confidential energy trades.
//!
//! This module implements the on-ledger logic for encrypted trade records:
//!
//! - Append-only submission of encrypted records with dense identifiers
//! - Settlement requests delegated to an external decryption capability
//! - Proof-checked fulfillment callbacks that settle cleartext projections
//! - Per-seller encrypted settlement counters maintained homomorphically
//!
//! # Architecture
//!
//! The module follows the usual state-machine layout:
//! - `call`: Message types for state-changing operations
//! - `handlers`: Business logic for processing calls
//! - `queries`: Read-only state access
//! - `state`: On-ledger state structures
//! - `genesis`: Initial configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```ignore
//! use grid_module::{handlers, state::LedgerState};
//!
//! let mut state = LedgerState::new();
//! let ctx = handlers::CallContext { ... };
//!
//! // Submit an encrypted record
//! let record_id = handlers::handle_submit_record(&mut state, &ctx, ...)?;
//!
//! // Ask the oracle to open it
//! let token = handlers::handle_request_settlement(&mut state, &ctx, &mut oracle, record_id)?;
//! ```

pub mod call;
pub mod error;
pub mod genesis;
pub mod handlers;
pub mod queries;
pub mod state;

pub use call::LedgerCall;
pub use error::LedgerError;
pub use genesis::{LedgerGenesisConfig, LedgerParams};
pub use handlers::{CallContext, HandlerResult};
pub use queries::{LedgerQuery, LedgerQueryResponse};
pub use state::LedgerState;

use grid_types::CallbackId;

/// Callback identifier the ledger registers with every decryption request.
pub const SETTLEMENT_CALLBACK: CallbackId = CallbackId(1);
