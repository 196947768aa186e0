//! Agora - mission marketplace and reward settlement engine
//!
//! Organizations publish time-boxed volunteer missions with fixed capacity
//! and reward parameters; applicants apply and are reviewed under a hard
//! capacity ceiling; completing a mission settles every accepted
//! participant: impact points, derived citizen levels, badge token mints,
//! and XRP payouts, all audited in an append-only transaction log.
//!
//! ## Services
//!
//! - **Marketplace**: mission publication and application review over HTTP
//! - **Admission**: atomic capacity admission for accept transitions
//! - **Settlement**: per-participant reward pipeline at mission completion
//! - **Ledger**: JSON-RPC client for a rippled-compatible reward ledger

pub mod config;
pub mod db;
pub mod ledger;
pub mod routes;
pub mod server;
pub mod services;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{EngineError, Result};
