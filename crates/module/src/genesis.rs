//! Genesis configuration for the trade ledger module.
//!
//! This module defines the initial state and configuration for the ledger
//! when the chain starts.

use crate::state::LedgerState;
use grid_types::G1Point;
use serde::{Deserialize, Serialize};

/// Genesis configuration for the trade ledger module.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerGenesisConfig {
    /// Optional oracle public key (can be rotated after genesis)
    pub oracle_public_key: Option<G1Point>,

    /// Operational parameters
    pub params: LedgerParams,
}

/// Operational parameters for the ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerParams {
    /// Upper bound when recovering a counter's discrete log
    pub counter_recovery_bound: u64,

    /// Maximum page size served by record listing queries
    pub max_list_page: u64,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            counter_recovery_bound: 10_000,
            max_list_page: 100,
        }
    }
}

impl Default for LedgerGenesisConfig {
    fn default() -> Self {
        Self {
            oracle_public_key: None,
            params: LedgerParams::default(),
        }
    }
}

impl LedgerGenesisConfig {
    /// Create a genesis config with a preset oracle public key.
    pub fn with_oracle_key(public_key: G1Point) -> Self {
        Self {
            oracle_public_key: Some(public_key),
            ..Default::default()
        }
    }

    /// Validate the genesis configuration.
    pub fn validate(&self) -> Result<(), GenesisValidationError> {
        if self.params.counter_recovery_bound == 0 {
            return Err(GenesisValidationError::InvalidParams(
                "Counter recovery bound cannot be zero".into(),
            ));
        }
        if self.params.max_list_page == 0 {
            return Err(GenesisValidationError::InvalidParams(
                "List page size cannot be zero".into(),
            ));
        }

        // All-zero bytes are not a point encoding
        if let Some(key) = &self.oracle_public_key {
            if key == &G1Point::default() {
                return Err(GenesisValidationError::InvalidOracleKey);
            }
        }

        Ok(())
    }

    /// Build the initial ledger state from this configuration.
    pub fn build_state(&self) -> LedgerState {
        let mut state = LedgerState::new();
        state.oracle_public_key = self.oracle_public_key.clone();
        state.params = self.params.clone();
        state
    }
}

/// Errors that can occur during genesis validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GenesisValidationError {
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid oracle public key")]
    InvalidOracleKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerGenesisConfig::default();
        assert!(config.validate().is_ok());

        let state = config.build_state();
        assert_eq!(state.next_record_id, 1);
        assert!(state.oracle_public_key.is_none());
    }

    #[test]
    fn test_zero_recovery_bound_rejected() {
        let mut config = LedgerGenesisConfig::default();
        config.params.counter_recovery_bound = 0;
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut config = LedgerGenesisConfig::default();
        config.params.max_list_page = 0;
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_all_zero_oracle_key_rejected() {
        let config = LedgerGenesisConfig::with_oracle_key(G1Point::default());
        assert!(matches!(
            config.validate(),
            Err(GenesisValidationError::InvalidOracleKey)
        ));
    }

    #[test]
    fn test_build_state_applies_key() {
        let key = G1Point([9u8; 48]);
        let config = LedgerGenesisConfig::with_oracle_key(key.clone());
        let state = config.build_state();
        assert_eq!(state.oracle_public_key, Some(key));
    }
}
