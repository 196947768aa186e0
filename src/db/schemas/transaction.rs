//! Transaction audit schema
//!
//! Append-only record of every external-ledger attempt the settlement
//! orchestrator decides to keep. Rows are created exactly once and never
//! updated; failed legs stay visible for manual reconciliation.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for transactions
pub const TRANSACTION_COLLECTION: &str = "transactions";

/// Kind of ledger side effect the row audits
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TransactionType {
    /// XRP payout from an organization to a participant
    #[default]
    #[serde(rename = "reward-payment")]
    RewardPayment,
    /// Tier badge minted on level-up
    #[serde(rename = "badge-mint")]
    BadgeMint,
    /// Mission completion badge token
    #[serde(rename = "mission-nft-mint")]
    MissionNftMint,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::RewardPayment => "reward-payment",
            TransactionType::BadgeMint => "badge-mint",
            TransactionType::MissionNftMint => "mission-nft-mint",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of the audited ledger attempt
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Completed,
    Failed,
}

/// Transaction audit document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct TransactionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Domain identifier (UUID)
    pub tx_id: String,

    /// Side effect kind
    pub tx_type: TransactionType,

    /// Source user (None for system-originated mints)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_user_id: Option<String>,

    /// Destination user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_user_id: Option<String>,

    /// Amount (XRP for payments, 0 for mints)
    #[serde(default)]
    pub amount: f64,

    /// Currency code
    pub currency: String,

    /// Associated mission, when applicable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission_id: Option<String>,

    /// External ledger reference (tx hash or token id)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_ref: Option<String>,

    /// Outcome of the attempt
    pub status: TransactionStatus,

    /// Human-readable description
    pub description: String,
}

impl TransactionDoc {
    pub fn new(tx_type: TransactionType, description: String) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            tx_id: uuid::Uuid::new_v4().to_string(),
            tx_type,
            from_user_id: None,
            to_user_id: None,
            amount: 0.0,
            currency: "XRP".to_string(),
            mission_id: None,
            ledger_ref: None,
            status: TransactionStatus::Completed,
            description,
        }
    }
}

impl IntoIndexes for TransactionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "tx_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("tx_id_unique".to_string())
                        .build(),
                ),
            ),
            // Per-mission audit trail
            (
                doc! { "mission_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("mission_id_index".to_string())
                        .build(),
                ),
            ),
            // Per-user history
            (
                doc! { "to_user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("to_user_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for TransactionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
