//! User document schema
//!
//! Stores participants and organizations, accumulated impact points, and
//! the optional ledger wallet. The wallet secret is an opaque credential:
//! it is stored for custodial payouts but must never appear in logs or
//! API responses. The user's current citizen level is always derived from
//! points via the level table, never persisted.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Custodial ledger wallet for a user
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct WalletInfo {
    /// Ledger account address (classic address)
    pub address: String,

    /// Opaque signing credential. Never logged.
    pub secret: String,
}

// Manual Debug keeps the secret out of log output
impl std::fmt::Debug for WalletInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletInfo")
            .field("address", &self.address)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Domain identifier (UUID)
    pub user_id: String,

    /// Display name
    pub display_name: String,

    /// Accumulated impact points. Monotonically non-decreasing;
    /// mutated only by the settlement orchestrator.
    #[serde(default)]
    pub points: i64,

    /// Whether this user is an organization account
    #[serde(default)]
    pub is_org: bool,

    /// Optional custodial ledger wallet
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet: Option<WalletInfo>,
}

impl UserDoc {
    /// Create a new user with zero points and no wallet
    pub fn new(display_name: String, is_org: bool) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id: uuid::Uuid::new_v4().to_string(),
            display_name,
            points: 0,
            is_org,
            wallet: None,
        }
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on the domain identifier
            (
                doc! { "user_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_id_unique".to_string())
                        .build(),
                ),
            ),
            // Index on wallet address for ledger reconciliation lookups
            (
                doc! { "wallet.address": 1 },
                Some(
                    IndexOptions::builder()
                        .sparse(true)
                        .name("wallet_address_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wallet_debug_redacts_secret() {
        let wallet = WalletInfo {
            address: "rEXAMPLE123".into(),
            secret: "sSECRETSEED".into(),
        };
        let rendered = format!("{:?}", wallet);
        assert!(rendered.contains("rEXAMPLE123"));
        assert!(!rendered.contains("sSECRETSEED"));
    }
}
