//! HTTP server and shared application state

pub mod http;

pub use http::run;

use std::sync::Arc;
use std::time::Instant;

use crate::config::Args;
use crate::db::MarketplaceStore;
use crate::ledger::{RewardLedger, Secret};
use crate::services::{ApplicationService, SettlementOrchestrator};

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Persistence behind the store seam (MongoDB or in-memory)
    pub store: Arc<dyn MarketplaceStore>,
    /// Reward ledger client
    pub ledger: Arc<dyn RewardLedger>,
    /// Application lifecycle service
    pub applications: ApplicationService,
    /// Settlement orchestrator for mission completion
    pub settlement: SettlementOrchestrator,
    /// Whether the store backend survives a restart
    pub persistent: bool,
    /// Process start, for uptime reporting
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        args: Args,
        store: Arc<dyn MarketplaceStore>,
        ledger: Arc<dyn RewardLedger>,
        persistent: bool,
    ) -> Self {
        let platform_secret = args
            .platform_wallet_secret
            .as_ref()
            .map(|s| Secret::new(s.clone()));

        let applications = ApplicationService::new(Arc::clone(&store));
        let settlement = SettlementOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&ledger),
            platform_secret,
        );

        Self {
            args,
            store,
            ledger,
            applications,
            settlement,
            persistent,
            started_at: Instant::now(),
        }
    }
}
