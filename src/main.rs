//! Agora - mission marketplace and reward settlement engine

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agora::{
    config::Args,
    db::{MarketplaceStore, MemoryStore, MongoClient, MongoStore},
    ledger::{RewardLedger, XrplClient},
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("agora={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Agora - Mission Marketplace Engine");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Mode: {}",
        if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" }
    );
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Ledger: {}", args.ledger_url);
    info!(
        "Platform wallet: {}",
        if args.platform_wallet_secret.is_some() { "configured" } else { "not configured" }
    );
    info!("======================================");

    // Connect to MongoDB; dev mode falls back to the in-memory store
    let (store, persistent): (Arc<dyn MarketplaceStore>, bool) =
        match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
            Ok(client) => {
                info!("MongoDB connected successfully");
                (Arc::new(MongoStore::new(client)), true)
            }
            Err(e) => {
                if args.dev_mode {
                    warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
                    (Arc::new(MemoryStore::new()), false)
                } else {
                    error!("MongoDB connection failed: {}", e);
                    std::process::exit(1);
                }
            }
        };

    // Ledger client
    let ledger: Arc<dyn RewardLedger> = match XrplClient::new(
        args.ledger_url.clone(),
        args.ledger_faucet_url.clone(),
        args.ledger_timeout_ms,
        args.ledger_retries,
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create ledger client: {}", e);
            std::process::exit(1);
        }
    };

    // Create application state
    let state = Arc::new(server::AppState::new(args, store, ledger, persistent));

    // Run the server
    if let Err(e) = server::run(state).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
