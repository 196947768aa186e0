//! Reward ledger integration
//!
//! The engine treats the ledger as a black-box collaborator behind the
//! `RewardLedger` trait: account creation, balance queries, XRP transfers,
//! and badge-token mints. The production implementation speaks JSON-RPC to
//! a rippled-compatible endpoint; tests use `MockLedger`.

pub mod client;
pub mod memo;

pub use client::{
    LedgerAccount, MintResult, RewardLedger, Secret, TransferResult, XrplClient, MAX_MINT_PAYLOAD_BYTES,
};

#[cfg(test)]
pub use client::MockLedger;
