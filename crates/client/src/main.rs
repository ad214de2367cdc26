//! CLI for interacting with the confidential energy trade ledger.
//!
//! This binary provides commands for:
//! - Submitting encrypted trade records
//! - Requesting and executing settlements
//! - Querying records, projections and seller accumulators

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::info;

use grid_client::prepare_trade;
use grid_types::{ClearTrade, G1Point};

#[derive(Parser)]
#[command(name = "grid-cli")]
#[command(about = "CLI for the confidential energy trade ledger")]
struct Cli {
    /// Mock chain RPC endpoint
    #[arg(long, default_value = "http://127.0.0.1:9944")]
    rpc: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the oracle keypair and publish its public key
    InitOracle,

    /// Submit an encrypted trade record
    Submit {
        /// Sender address (hex)
        #[arg(long)]
        sender: String,

        /// Seller identifier (will be encrypted)
        #[arg(long)]
        seller: String,

        /// Buyer identifier (will be encrypted)
        #[arg(long)]
        buyer: String,

        /// Energy amount (will be encrypted)
        #[arg(long)]
        amount: String,

        /// Unit price (will be encrypted)
        #[arg(long)]
        price: String,
    },

    /// Request settlement of a record
    RequestSettlement {
        /// Sender address (hex)
        #[arg(long)]
        sender: String,

        /// Record ID
        #[arg(long)]
        record_id: u64,
    },

    /// Execute an outstanding decryption request by token
    ExecuteRequest {
        /// Request token (hex)
        #[arg(long)]
        token: String,
    },

    /// List outstanding decryption request tokens
    PendingRequests,

    /// Get an encrypted record
    GetRecord {
        /// Record ID
        #[arg(long)]
        record_id: u64,
    },

    /// Get a record's cleartext projection
    GetProjection {
        /// Record ID
        #[arg(long)]
        record_id: u64,
    },

    /// List record summaries
    ListRecords {
        /// Number of records to skip
        #[arg(long, default_value = "0")]
        offset: u64,

        /// Maximum number of records to return
        #[arg(long, default_value = "20")]
        limit: u64,
    },

    /// Get the total number of records
    RecordCount,

    /// Get a seller's encrypted settlement counter
    SellerTotal {
        /// Seller identifier
        #[arg(long)]
        seller: String,
    },

    /// Ask the oracle to reveal a seller's settlement count
    RevealTotal {
        /// Seller identifier
        #[arg(long)]
        seller: String,
    },

    /// List all sellers with settled trades
    ListSellers,

    /// List records that have not been settled
    Unsettled,

    /// Get the oracle public key
    GetOracleKey,

    /// Show the ledger event log
    Events,

    /// Advance chain time (for testing)
    AdvanceBlock,

    /// Set chain timestamp (for testing)
    SetTimestamp {
        /// Unix timestamp to set
        #[arg(long)]
        timestamp: u64,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct BlockInfo {
    height: u64,
    timestamp: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct FieldCiphertextRpc {
    ephemeral: String,
    masked: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct EncryptedRecordRpc {
    record_id: u64,
    seller_id: FieldCiphertextRpc,
    buyer_id: FieldCiphertextRpc,
    energy_amount: FieldCiphertextRpc,
    price: FieldCiphertextRpc,
    submitted_at: u64,
}

#[derive(Debug, Serialize, Deserialize)]
struct SettlementProjectionRpc {
    seller_id: String,
    buyer_id: String,
    energy_amount: String,
    price: String,
    settled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordSummaryRpc {
    record_id: u64,
    submitted_at: u64,
    settled: bool,
    pending_requests: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct SellerTotalRpc {
    seller_id: String,
    c1: String,
    c2: String,
    initialized: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct SettlementReceiptRpc {
    record_id: u64,
    seller_id: String,
    buyer_id: String,
    energy_amount: String,
    price: String,
}

#[derive(Debug, Serialize, Deserialize)]
enum LedgerEventRpc {
    RecordSubmitted { record_id: u64, timestamp: u64 },
    DecryptionRequested { record_id: u64 },
    TransactionDecrypted { record_id: u64 },
}

async fn submit_record_cmd(
    client: &HttpClient,
    sender: &str,
    seller: &str,
    buyer: &str,
    amount: &str,
    price: &str,
) -> Result<()> {
    // Get the oracle public key
    let key_opt: Option<String> = client
        .request("query_getOracleKey", Vec::<()>::new())
        .await?;

    let key_hex = key_opt.ok_or_else(|| anyhow!("Oracle public key not set on chain"))?;

    let key_bytes: [u8; 48] = hex::decode(&key_hex)?
        .try_into()
        .map_err(|_| anyhow!("Invalid oracle key length"))?;

    let oracle_key = G1Point(key_bytes);

    // Encrypt the trade locally
    let trade = ClearTrade {
        seller_id: seller.to_string(),
        buyer_id: buyer.to_string(),
        energy_amount: amount.to_string(),
        price: price.to_string(),
    };

    let mut rng = OsRng;
    let prepared = prepare_trade(&oracle_key, &trade, &mut rng)?;

    let field = |ct: &grid_types::FieldCiphertext| {
        serde_json::json!({
            "ephemeral": hex::encode(ct.ephemeral.0),
            "masked": hex::encode(ct.masked),
        })
    };

    let params = serde_json::json!({
        "sender": sender,
        "seller_id": field(&prepared.seller_id),
        "buyer_id": field(&prepared.buyer_id),
        "energy_amount": field(&prepared.energy_amount),
        "price": field(&prepared.price),
    });

    let record_id: u64 = client.request("ledger_submitRecord", vec![params]).await?;

    info!("Record submitted with ID {}", record_id);
    println!("Record submitted successfully");
    println!("  Record ID: {}", record_id);
    println!("  Seller: {} (encrypted)", seller);
    println!("  Buyer: {} (encrypted)", buyer);

    Ok(())
}

async fn request_settlement_cmd(client: &HttpClient, sender: &str, record_id: u64) -> Result<()> {
    let params = serde_json::json!({
        "sender": sender,
        "record_id": record_id,
    });

    let token: String = client
        .request("ledger_requestSettlement", vec![params])
        .await?;

    info!("Settlement requested for record {}", record_id);
    println!("Settlement requested for record {}", record_id);
    println!("  Token: {}", token);

    Ok(())
}

async fn execute_request_cmd(client: &HttpClient, token: &str) -> Result<()> {
    let receipt: SettlementReceiptRpc = client
        .request("oracle_executeRequest", vec![token.to_string()])
        .await?;

    println!("Record {} settled:", receipt.record_id);
    println!("  Seller: {}", receipt.seller_id);
    println!("  Buyer: {}", receipt.buyer_id);
    println!("  Energy: {}", receipt.energy_amount);
    println!("  Price: {}", receipt.price);

    Ok(())
}

async fn get_record_cmd(client: &HttpClient, record_id: u64) -> Result<()> {
    let record: Option<EncryptedRecordRpc> =
        client.request("query_getRecord", vec![record_id]).await?;

    match record {
        Some(r) => {
            println!("Record {}:", r.record_id);
            println!("  Submitted at: {}", r.submitted_at);
            println!("  Seller: {}...", &r.seller_id.ephemeral[..16]);
            println!("  Buyer: {}...", &r.buyer_id.ephemeral[..16]);
            println!("  Energy: {}...", &r.energy_amount.ephemeral[..16]);
            println!("  Price: {}...", &r.price.ephemeral[..16]);
        }
        None => {
            println!("Record {} not found", record_id);
        }
    }

    Ok(())
}

async fn get_projection_cmd(client: &HttpClient, record_id: u64) -> Result<()> {
    let projection: Option<SettlementProjectionRpc> = client
        .request("query_getProjection", vec![record_id])
        .await?;

    match projection {
        Some(p) if p.settled => {
            println!("Record {} settled:", record_id);
            println!("  Seller: {}", p.seller_id);
            println!("  Buyer: {}", p.buyer_id);
            println!("  Energy: {}", p.energy_amount);
            println!("  Price: {}", p.price);
        }
        Some(_) => {
            println!("Record {} not settled yet", record_id);
        }
        None => {
            println!("Record {} not found", record_id);
        }
    }

    Ok(())
}

async fn list_records_cmd(client: &HttpClient, offset: u64, limit: u64) -> Result<()> {
    let records: Vec<RecordSummaryRpc> = client
        .request("query_listRecords", (offset, limit))
        .await?;

    if records.is_empty() {
        println!("No records found");
    } else {
        println!("Records:");
        for r in records {
            let status = if r.settled {
                "settled".to_string()
            } else if r.pending_requests > 0 {
                format!("pending ({} outstanding)", r.pending_requests)
            } else {
                "submitted".to_string()
            };
            println!("  [{}] {} (submitted at {})", r.record_id, status, r.submitted_at);
        }
    }

    Ok(())
}

async fn seller_total_cmd(client: &HttpClient, seller: &str) -> Result<()> {
    let total: SellerTotalRpc = client
        .request("query_getSellerTotal", vec![seller.to_string()])
        .await?;

    if total.initialized {
        println!("Encrypted counter for {}:", total.seller_id);
        println!("  c1: {}...", &total.c1[..16]);
        println!("  c2: {}...", &total.c2[..16]);
    } else {
        println!("No settlements recorded for {}", total.seller_id);
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("grid_cli=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let client = HttpClientBuilder::default().build(&cli.rpc)?;

    match cli.command {
        Commands::InitOracle => {
            let key: String = client
                .request("admin_generateOracleKey", Vec::<()>::new())
                .await?;
            println!("Oracle key generated and published");
            println!("  Public key: {}", key);
        }

        Commands::Submit {
            sender,
            seller,
            buyer,
            amount,
            price,
        } => {
            submit_record_cmd(&client, &sender, &seller, &buyer, &amount, &price).await?;
        }

        Commands::RequestSettlement { sender, record_id } => {
            request_settlement_cmd(&client, &sender, record_id).await?;
        }

        Commands::ExecuteRequest { token } => {
            execute_request_cmd(&client, &token).await?;
        }

        Commands::PendingRequests => {
            let tokens: Vec<String> = client
                .request("oracle_pendingRequests", Vec::<()>::new())
                .await?;
            if tokens.is_empty() {
                println!("No outstanding requests");
            } else {
                println!("Outstanding requests:");
                for token in tokens {
                    println!("  {}", token);
                }
            }
        }

        Commands::GetRecord { record_id } => {
            get_record_cmd(&client, record_id).await?;
        }

        Commands::GetProjection { record_id } => {
            get_projection_cmd(&client, record_id).await?;
        }

        Commands::ListRecords { offset, limit } => {
            list_records_cmd(&client, offset, limit).await?;
        }

        Commands::RecordCount => {
            let count: u64 = client.request("query_recordCount", Vec::<()>::new()).await?;
            println!("Total records: {}", count);
        }

        Commands::SellerTotal { seller } => {
            seller_total_cmd(&client, &seller).await?;
        }

        Commands::RevealTotal { seller } => {
            let count: u64 = client
                .request("oracle_revealSellerTotal", vec![seller.clone()])
                .await?;
            println!("Settled trades for {}: {}", seller, count);
        }

        Commands::ListSellers => {
            let sellers: Vec<String> = client
                .request("query_listSellers", Vec::<()>::new())
                .await?;
            if sellers.is_empty() {
                println!("No sellers recorded");
            } else {
                println!("Sellers:");
                for seller in sellers {
                    println!("  {}", seller);
                }
            }
        }

        Commands::Unsettled => {
            let ids: Vec<u64> = client
                .request("query_getUnsettledRecords", Vec::<()>::new())
                .await?;
            if ids.is_empty() {
                println!("All records settled");
            } else {
                println!("Unsettled records: {:?}", ids);
            }
        }

        Commands::GetOracleKey => {
            let key: Option<String> = client
                .request("query_getOracleKey", Vec::<()>::new())
                .await?;
            match key {
                Some(k) => println!("Oracle public key: {}", k),
                None => println!("Oracle public key not set"),
            }
        }

        Commands::Events => {
            let events: Vec<LedgerEventRpc> = client
                .request("chain_getEvents", Vec::<()>::new())
                .await?;
            if events.is_empty() {
                println!("No events emitted");
            } else {
                println!("Events:");
                for event in events {
                    match event {
                        LedgerEventRpc::RecordSubmitted {
                            record_id,
                            timestamp,
                        } => {
                            println!("  RecordSubmitted: record {} at {}", record_id, timestamp);
                        }
                        LedgerEventRpc::DecryptionRequested { record_id } => {
                            println!("  DecryptionRequested: record {}", record_id);
                        }
                        LedgerEventRpc::TransactionDecrypted { record_id } => {
                            println!("  TransactionDecrypted: record {}", record_id);
                        }
                    }
                }
            }
        }

        Commands::AdvanceBlock => {
            let info: BlockInfo = client.request("admin_advanceBlock", Vec::<()>::new()).await?;
            println!(
                "Block advanced: height={}, timestamp={}",
                info.height, info.timestamp
            );
        }

        Commands::SetTimestamp { timestamp } => {
            let _: bool = client.request("admin_setTimestamp", vec![timestamp]).await?;
            println!("Timestamp set to {}", timestamp);
        }
    }

    Ok(())
}
