//! Mock chain server for local testing of the trade ledger system.
//!
//! This provides a JSON-RPC server that simulates on-chain state management
//! for the ledger module without requiring a real blockchain. The decryption
//! oracle runs in-process, so settlement requests can be executed and their
//! callbacks delivered over RPC.

use anyhow::Result;
use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::Server;
use jsonrpsee::types::ErrorObjectOwned;
use parking_lot::RwLock;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

use grid_module::queries::{self, RecordSummary};
use grid_module::{
    handlers, CallContext, LedgerGenesisConfig, LedgerParams, LedgerState, SETTLEMENT_CALLBACK,
};
use grid_oracle::DecryptionService;
use grid_types::{FieldCiphertext, G1Point, LedgerEvent, RequestToken};

mod types;
use types::*;

/// Shared chain state.
struct ChainState {
    /// Module state
    module: LedgerState,
    /// In-process decryption oracle
    oracle: DecryptionService,
    /// Current block height (simulated)
    block_height: u64,
    /// Current timestamp (simulated, can be advanced)
    timestamp: u64,
}

impl ChainState {
    fn new() -> Self {
        Self {
            module: LedgerState::new(),
            // Placeholder keypair; admin_generateOracleKey replaces it and
            // publishes the public half to the ledger
            oracle: DecryptionService::generate(),
            block_height: 0,
            timestamp: 0,
        }
    }

    fn advance_block(&mut self) {
        self.block_height += 1;
        self.timestamp += 12; // ~12 second blocks
    }

    fn set_timestamp(&mut self, ts: u64) {
        self.timestamp = ts;
    }
}

/// RPC API definition for the mock chain.
#[rpc(server)]
pub trait MockChainApi {
    // ============ Admin Methods ============

    /// Initialize the chain with genesis config.
    #[method(name = "admin_init")]
    async fn admin_init(&self, config: GenesisConfigRpc) -> Result<bool, ErrorObjectOwned>;

    /// Advance the chain by one block.
    #[method(name = "admin_advanceBlock")]
    async fn admin_advance_block(&self) -> Result<BlockInfo, ErrorObjectOwned>;

    /// Set the current timestamp (for testing time-dependent logic).
    #[method(name = "admin_setTimestamp")]
    async fn admin_set_timestamp(&self, timestamp: u64) -> Result<bool, ErrorObjectOwned>;

    /// Generate a fresh oracle keypair and publish the public key.
    #[method(name = "admin_generateOracleKey")]
    async fn admin_generate_oracle_key(&self) -> Result<String, ErrorObjectOwned>;

    // ============ Ledger Methods ============

    /// Submit an encrypted trade record.
    #[method(name = "ledger_submitRecord")]
    async fn ledger_submit_record(
        &self,
        params: SubmitRecordParams,
    ) -> Result<u64, ErrorObjectOwned>;

    /// Request settlement of a record, returning the issued token.
    #[method(name = "ledger_requestSettlement")]
    async fn ledger_request_settlement(
        &self,
        params: RequestSettlementParams,
    ) -> Result<String, ErrorObjectOwned>;

    // ============ Oracle Methods ============

    /// List tokens of outstanding decryption requests.
    #[method(name = "oracle_pendingRequests")]
    async fn oracle_pending_requests(&self) -> Result<Vec<String>, ErrorObjectOwned>;

    /// Execute an outstanding request and deliver its callback.
    #[method(name = "oracle_executeRequest")]
    async fn oracle_execute_request(
        &self,
        token: String,
    ) -> Result<SettlementReceiptRpc, ErrorObjectOwned>;

    /// Reveal a seller's settlement count via the oracle secret.
    #[method(name = "oracle_revealSellerTotal")]
    async fn oracle_reveal_seller_total(&self, seller_id: String)
        -> Result<u64, ErrorObjectOwned>;

    // ============ Query Methods ============

    /// Get current block info.
    #[method(name = "chain_getBlockInfo")]
    async fn chain_get_block_info(&self) -> Result<BlockInfo, ErrorObjectOwned>;

    /// Get the ledger event log, oldest first.
    #[method(name = "chain_getEvents")]
    async fn chain_get_events(&self) -> Result<Vec<LedgerEvent>, ErrorObjectOwned>;

    /// Get an encrypted record by ID.
    #[method(name = "query_getRecord")]
    async fn query_get_record(
        &self,
        record_id: u64,
    ) -> Result<Option<EncryptedRecordRpc>, ErrorObjectOwned>;

    /// Get a record's cleartext projection.
    #[method(name = "query_getProjection")]
    async fn query_get_projection(
        &self,
        record_id: u64,
    ) -> Result<Option<SettlementProjectionRpc>, ErrorObjectOwned>;

    /// List record summaries in ID order.
    #[method(name = "query_listRecords")]
    async fn query_list_records(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RecordSummary>, ErrorObjectOwned>;

    /// Get the total number of records.
    #[method(name = "query_recordCount")]
    async fn query_record_count(&self) -> Result<u64, ErrorObjectOwned>;

    /// Get a seller's encrypted settlement counter.
    #[method(name = "query_getSellerTotal")]
    async fn query_get_seller_total(
        &self,
        seller_id: String,
    ) -> Result<SellerTotalRpc, ErrorObjectOwned>;

    /// List all sellers with settled trades.
    #[method(name = "query_listSellers")]
    async fn query_list_sellers(&self) -> Result<Vec<String>, ErrorObjectOwned>;

    /// Get the oracle public key.
    #[method(name = "query_getOracleKey")]
    async fn query_get_oracle_key(&self) -> Result<Option<String>, ErrorObjectOwned>;

    /// Get records whose projection has not been settled.
    #[method(name = "query_getUnsettledRecords")]
    async fn query_get_unsettled_records(&self) -> Result<Vec<u64>, ErrorObjectOwned>;
}

/// Implementation of the mock chain RPC server.
struct MockChainServer {
    state: Arc<RwLock<ChainState>>,
}

impl MockChainServer {
    fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ChainState::new())),
        }
    }

    fn rpc_error(msg: &str) -> ErrorObjectOwned {
        ErrorObjectOwned::owned(-32000, msg.to_string(), None::<()>)
    }
}

#[async_trait]
impl MockChainApiServer for MockChainServer {
    async fn admin_init(&self, config: GenesisConfigRpc) -> Result<bool, ErrorObjectOwned> {
        let mut state = self.state.write();

        let oracle_public_key = match &config.oracle_public_key {
            Some(key_hex) => {
                let bytes: [u8; 48] = hex::decode(key_hex)
                    .map_err(|e| Self::rpc_error(&format!("Invalid oracle key hex: {}", e)))?
                    .try_into()
                    .map_err(|_| Self::rpc_error("Oracle key must be 48 bytes"))?;
                Some(G1Point(bytes))
            }
            None => None,
        };

        let mut params = LedgerParams::default();
        if let Some(bound) = config.counter_recovery_bound {
            params.counter_recovery_bound = bound;
        }
        if let Some(page) = config.max_list_page {
            params.max_list_page = page;
        }

        let genesis = LedgerGenesisConfig {
            oracle_public_key,
            params,
        };
        genesis
            .validate()
            .map_err(|e| Self::rpc_error(&format!("Invalid genesis config: {}", e)))?;

        state.module = genesis.build_state();

        if let Some(ts) = config.initial_timestamp {
            state.timestamp = ts;
        }

        info!("Chain initialized");
        Ok(true)
    }

    async fn admin_advance_block(&self) -> Result<BlockInfo, ErrorObjectOwned> {
        let mut state = self.state.write();
        state.advance_block();
        Ok(BlockInfo {
            height: state.block_height,
            timestamp: state.timestamp,
        })
    }

    async fn admin_set_timestamp(&self, timestamp: u64) -> Result<bool, ErrorObjectOwned> {
        let mut state = self.state.write();
        state.set_timestamp(timestamp);
        info!("Timestamp set to {}", timestamp);
        Ok(true)
    }

    async fn admin_generate_oracle_key(&self) -> Result<String, ErrorObjectOwned> {
        let mut state = self.state.write();
        let ctx = CallContext {
            sender: [0u8; 32],
            block_height: state.block_height,
            timestamp: state.timestamp,
        };

        let state = &mut *state;
        state.oracle = DecryptionService::generate();
        let public_key = state.oracle.public_key();
        let key_hex = hex::encode(public_key.0);

        handlers::handle_set_oracle_key(&mut state.module, &ctx, public_key)
            .map_err(|e| Self::rpc_error(&format!("Failed to set oracle key: {}", e)))?;

        info!("Oracle keypair generated, public key published");
        Ok(key_hex)
    }

    async fn ledger_submit_record(
        &self,
        params: SubmitRecordParams,
    ) -> Result<u64, ErrorObjectOwned> {
        let mut state = self.state.write();
        let ctx = CallContext {
            sender: parse_address(&params.sender),
            block_height: state.block_height,
            timestamp: state.timestamp,
        };

        let seller_id =
            parse_field_ciphertext(&params.seller_id).map_err(|e| Self::rpc_error(&e))?;
        let buyer_id =
            parse_field_ciphertext(&params.buyer_id).map_err(|e| Self::rpc_error(&e))?;
        let energy_amount =
            parse_field_ciphertext(&params.energy_amount).map_err(|e| Self::rpc_error(&e))?;
        let price = parse_field_ciphertext(&params.price).map_err(|e| Self::rpc_error(&e))?;

        let record_id = handlers::handle_submit_record(
            &mut state.module,
            &ctx,
            seller_id,
            buyer_id,
            energy_amount,
            price,
        )
        .map_err(|e| Self::rpc_error(&format!("Failed to submit record: {}", e)))?;

        info!("Record {} submitted by {}", record_id, params.sender);
        Ok(record_id)
    }

    async fn ledger_request_settlement(
        &self,
        params: RequestSettlementParams,
    ) -> Result<String, ErrorObjectOwned> {
        let mut state = self.state.write();
        let ctx = CallContext {
            sender: parse_address(&params.sender),
            block_height: state.block_height,
            timestamp: state.timestamp,
        };

        let state = &mut *state;
        let token = handlers::handle_request_settlement(
            &mut state.module,
            &ctx,
            &mut state.oracle,
            params.record_id,
        )
        .map_err(|e| Self::rpc_error(&format!("Failed to request settlement: {}", e)))?;

        info!("Settlement requested for record {}", params.record_id);
        Ok(hex::encode(token.0))
    }

    async fn oracle_pending_requests(&self) -> Result<Vec<String>, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(state
            .oracle
            .pending_tokens()
            .into_iter()
            .map(|token| hex::encode(token.0))
            .collect())
    }

    async fn oracle_execute_request(
        &self,
        token: String,
    ) -> Result<SettlementReceiptRpc, ErrorObjectOwned> {
        let token = parse_token(&token).map_err(|e| Self::rpc_error(&e))?;

        let mut state = self.state.write();
        let ctx = CallContext {
            sender: [0u8; 32],
            block_height: state.block_height,
            timestamp: state.timestamp,
        };

        let state = &mut *state;
        let completed = state
            .oracle
            .execute(&token)
            .map_err(|e| Self::rpc_error(&format!("Failed to execute request: {}", e)))?;

        if completed.callback != SETTLEMENT_CALLBACK {
            return Err(Self::rpc_error("Request designates an unknown callback"));
        }

        let cleartext = completed.cleartext.clone();
        let record_id = handlers::handle_fulfill_settlement(
            &mut state.module,
            &ctx,
            completed.token,
            completed.cleartext,
            completed.attestation,
        )
        .map_err(|e| Self::rpc_error(&format!("Failed to fulfill settlement: {}", e)))?;

        info!("Record {} settled via oracle callback", record_id);
        Ok(SettlementReceiptRpc {
            record_id,
            seller_id: cleartext.seller_id,
            buyer_id: cleartext.buyer_id,
            energy_amount: cleartext.energy_amount,
            price: cleartext.price,
        })
    }

    async fn oracle_reveal_seller_total(
        &self,
        seller_id: String,
    ) -> Result<u64, ErrorObjectOwned> {
        let state = self.state.read();
        let total = state.module.seller_total(&seller_id);

        // Unknown sellers read as an uninitialized handle, meaning zero
        if !total.is_initialized() {
            return Ok(0);
        }

        let count = state
            .oracle
            .reveal_counter(&total, state.module.params.counter_recovery_bound)
            .map_err(|e| Self::rpc_error(&format!("Failed to reveal counter: {}", e)))?;
        Ok(count)
    }

    async fn chain_get_block_info(&self) -> Result<BlockInfo, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(BlockInfo {
            height: state.block_height,
            timestamp: state.timestamp,
        })
    }

    async fn chain_get_events(&self) -> Result<Vec<LedgerEvent>, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(state.module.events.clone())
    }

    async fn query_get_record(
        &self,
        record_id: u64,
    ) -> Result<Option<EncryptedRecordRpc>, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(state.module.get_record(record_id).map(EncryptedRecordRpc::from))
    }

    async fn query_get_projection(
        &self,
        record_id: u64,
    ) -> Result<Option<SettlementProjectionRpc>, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(state
            .module
            .get_projection(record_id)
            .map(SettlementProjectionRpc::from))
    }

    async fn query_list_records(
        &self,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<RecordSummary>, ErrorObjectOwned> {
        let state = self.state.read();
        let limit = limit.min(state.module.params.max_list_page);
        Ok(queries::get_record_summaries(
            &state.module,
            offset as usize,
            limit as usize,
        ))
    }

    async fn query_record_count(&self) -> Result<u64, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(state.module.record_count())
    }

    async fn query_get_seller_total(
        &self,
        seller_id: String,
    ) -> Result<SellerTotalRpc, ErrorObjectOwned> {
        let state = self.state.read();
        let total = state.module.seller_total(&seller_id);
        Ok(SellerTotalRpc::new(seller_id, &total))
    }

    async fn query_list_sellers(&self) -> Result<Vec<String>, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(state.module.seller_order.clone())
    }

    async fn query_get_oracle_key(&self) -> Result<Option<String>, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(state
            .module
            .oracle_public_key
            .as_ref()
            .map(|key| hex::encode(key.0)))
    }

    async fn query_get_unsettled_records(&self) -> Result<Vec<u64>, ErrorObjectOwned> {
        let state = self.state.read();
        Ok(queries::get_unsettled_records(&state.module))
    }
}

fn parse_address(s: &str) -> [u8; 32] {
    let mut addr = [0u8; 32];
    if let Ok(bytes) = hex::decode(s.trim_start_matches("0x")) {
        let len = bytes.len().min(32);
        addr[..len].copy_from_slice(&bytes[..len]);
    }
    addr
}

fn parse_field_ciphertext(rpc: &FieldCiphertextRpc) -> Result<FieldCiphertext, String> {
    let ephemeral: [u8; 48] = hex::decode(&rpc.ephemeral)
        .map_err(|e| format!("Invalid ephemeral hex: {}", e))?
        .try_into()
        .map_err(|_| "Ephemeral point must be 48 bytes".to_string())?;
    let masked: [u8; 32] = hex::decode(&rpc.masked)
        .map_err(|e| format!("Invalid masked hex: {}", e))?
        .try_into()
        .map_err(|_| "Masked block must be 32 bytes".to_string())?;
    Ok(FieldCiphertext {
        ephemeral: G1Point(ephemeral),
        masked,
    })
}

fn parse_token(s: &str) -> Result<RequestToken, String> {
    let bytes: [u8; 32] = hex::decode(s)
        .map_err(|e| format!("Invalid token hex: {}", e))?
        .try_into()
        .map_err(|_| "Token must be 32 bytes".to_string())?;
    Ok(RequestToken(bytes))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("grid_mock_chain=info".parse().unwrap())
                .add_directive("grid_oracle=info".parse().unwrap())
                .add_directive("jsonrpsee=warn".parse().unwrap()),
        )
        .init();

    let addr: SocketAddr = "127.0.0.1:9944".parse()?;

    info!("Starting mock chain server on {}", addr);

    let server = Server::builder().build(addr).await?;
    let handle = server.start(MockChainServer::new().into_rpc());

    info!("Mock chain server running. Press Ctrl+C to stop.");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutting down...");
    handle.stop()?;
    handle.stopped().await;

    Ok(())
}
