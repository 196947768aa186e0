//! Configuration for Agora
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Agora - mission marketplace engine
///
/// Organizations publish volunteer missions, applicants apply, and
/// settlement distributes impact points, citizen levels, badge tokens,
/// and XRP payouts to accepted participants.
#[derive(Parser, Debug, Clone)]
#[command(name = "agora")]
#[command(about = "Mission marketplace and reward settlement engine")]
pub struct Args {
    /// Unique node identifier for this engine instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (in-memory store fallback, relaxed config)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "agora")]
    pub mongodb_db: String,

    /// Reward ledger JSON-RPC endpoint (rippled-compatible)
    #[arg(long, env = "LEDGER_URL", default_value = "https://s.altnet.rippletest.net:51234")]
    pub ledger_url: String,

    /// Optional faucet endpoint for funding newly created accounts (testnet)
    #[arg(long, env = "LEDGER_FAUCET_URL")]
    pub ledger_faucet_url: Option<String>,

    /// Platform wallet secret used for badge/NFT mints (never logged)
    #[arg(long, env = "PLATFORM_WALLET_SECRET", hide_env_values = true)]
    pub platform_wallet_secret: Option<String>,

    /// Ledger request timeout in milliseconds
    #[arg(long, env = "LEDGER_TIMEOUT_MS", default_value = "10000")]
    pub ledger_timeout_ms: u64,

    /// Bounded retry count for ledger transport failures
    #[arg(long, env = "LEDGER_RETRIES", default_value = "2")]
    pub ledger_retries: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.platform_wallet_secret.is_none() {
            return Err("PLATFORM_WALLET_SECRET is required in production mode".to_string());
        }

        if self.ledger_timeout_ms == 0 {
            return Err("LEDGER_TIMEOUT_MS must be greater than zero".to_string());
        }

        Ok(())
    }
}
