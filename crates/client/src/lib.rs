//! Client SDK for the confidential energy trade ledger.
//!
//! This crate provides a high-level API for:
//! - Encrypting trade records against the oracle public key
//! - Submitting records to the ledger module
//! - Querying records, projections and seller accumulators

pub mod trade;

pub use trade::{prepare_trade, PreparedTrade, TradeBuilder, TradeError};
