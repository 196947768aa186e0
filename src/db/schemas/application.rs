//! Application document schema
//!
//! A single applicant's request to join a mission. At most one application
//! exists per (mission, applicant) pair, enforced by a unique compound index.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for applications
pub const APPLICATION_COLLECTION: &str = "applications";

/// Application lifecycle status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    /// Submitted, awaiting organization review
    #[default]
    Pending,
    /// Admitted; holds one capacity slot
    Accepted,
    /// Declined; may be re-admitted while the mission is open
    Rejected,
    /// Settled as part of mission completion (terminal)
    Completed,
}

impl ApplicationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationStatus::Pending => "pending",
            ApplicationStatus::Accepted => "accepted",
            ApplicationStatus::Rejected => "rejected",
            ApplicationStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Application document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ApplicationDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Domain identifier (UUID)
    pub application_id: String,

    /// Mission this application targets
    pub mission_id: String,

    /// Applicant's user identifier
    pub applicant_id: String,

    /// Lifecycle status
    #[serde(default)]
    pub status: ApplicationStatus,

    /// Optional free-text message from the applicant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// When the application was submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub applied_at: Option<DateTime>,

    /// When the organization last accepted/rejected it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime>,

    /// When settlement marked it completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

impl ApplicationDoc {
    /// Create a new pending application
    pub fn new(mission_id: String, applicant_id: String, message: Option<String>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            application_id: uuid::Uuid::new_v4().to_string(),
            mission_id,
            applicant_id,
            status: ApplicationStatus::Pending,
            message,
            applied_at: Some(DateTime::now()),
            reviewed_at: None,
            completed_at: None,
        }
    }
}

impl IntoIndexes for ApplicationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on the domain identifier
            (
                doc! { "application_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("application_id_unique".to_string())
                        .build(),
                ),
            ),
            // One application per applicant per mission
            (
                doc! { "mission_id": 1, "applicant_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("mission_applicant_unique".to_string())
                        .build(),
                ),
            ),
            // Index for per-mission listing
            (
                doc! { "mission_id": 1, "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("mission_status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ApplicationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
