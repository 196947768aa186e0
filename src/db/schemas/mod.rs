//! Database schemas for Agora
//!
//! Defines MongoDB document structures for users, missions, applications,
//! and the append-only transaction audit log.

mod application;
mod metadata;
mod mission;
mod transaction;
mod user;

pub use application::{ApplicationDoc, ApplicationStatus, APPLICATION_COLLECTION};
pub use metadata::Metadata;
pub use mission::{MissionDoc, MissionStatus, MISSION_COLLECTION};
pub use transaction::{TransactionDoc, TransactionStatus, TransactionType, TRANSACTION_COLLECTION};
pub use user::{UserDoc, WalletInfo, USER_COLLECTION};
