//! Mission document schema
//!
//! A mission is a time-boxed volunteering opportunity with fixed capacity
//! and reward parameters. Once a mission has accepted applications it is
//! never physically deleted, only soft-deleted.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for missions
pub const MISSION_COLLECTION: &str = "missions";

/// Mission lifecycle status
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissionStatus {
    /// Open for applications
    #[default]
    Published,
    /// Settled; no further transitions permitted
    Completed,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionStatus::Published => "published",
            MissionStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for MissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mission document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct MissionDoc {
    /// MongoDB document ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    /// Common metadata (created_at, updated_at, is_deleted)
    #[serde(default)]
    pub metadata: Metadata,

    /// Domain identifier (UUID)
    pub mission_id: String,

    /// Owning organization's user identifier
    pub org_id: String,

    /// Mission title
    pub title: String,

    /// Mission description
    #[serde(default)]
    pub description: String,

    /// Participant capacity ceiling (>= 1)
    pub max_participants: i64,

    /// Number of currently accepted applications.
    /// Invariant: 0 <= accepted_count <= max_participants.
    #[serde(default)]
    pub accepted_count: i64,

    /// XRP reward per completed participant (0-100, zero for volunteer missions)
    #[serde(default)]
    pub reward_xrp: f64,

    /// Mission duration in minutes
    pub duration_minutes: i64,

    /// Impact points per completion, derived as ceil(duration_minutes / 60)
    pub points: i64,

    /// Volunteer flag: doubles earned points, forces reward_xrp to zero
    #[serde(default)]
    pub is_volunteer: bool,

    /// Lifecycle status
    #[serde(default)]
    pub status: MissionStatus,

    /// When settlement flipped the mission to completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime>,
}

impl MissionDoc {
    /// Create a new published mission, deriving points from duration
    pub fn new(
        org_id: String,
        title: String,
        description: String,
        duration_minutes: i64,
        max_participants: i64,
        reward_xrp: f64,
        is_volunteer: bool,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            mission_id: uuid::Uuid::new_v4().to_string(),
            org_id,
            title,
            description,
            max_participants,
            accepted_count: 0,
            // Volunteer missions never carry a currency reward
            reward_xrp: if is_volunteer { 0.0 } else { reward_xrp },
            duration_minutes,
            points: points_for_duration(duration_minutes),
            is_volunteer,
            status: MissionStatus::Published,
            completed_at: None,
        }
    }
}

/// Impact points for a mission duration: one point per started hour.
/// Saturating so an absurd duration cannot wrap into negative points.
pub fn points_for_duration(duration_minutes: i64) -> i64 {
    duration_minutes.saturating_add(59) / 60
}

impl IntoIndexes for MissionDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Unique index on the domain identifier
            (
                doc! { "mission_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("mission_id_unique".to_string())
                        .build(),
                ),
            ),
            // Index on owning org for listing
            (
                doc! { "org_id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("org_id_index".to_string())
                        .build(),
                ),
            ),
            // Index on status for open-mission queries
            (
                doc! { "status": 1 },
                Some(
                    IndexOptions::builder()
                        .name("status_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for MissionDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn points_round_up_to_started_hour() {
        assert_eq!(points_for_duration(60), 1);
        assert_eq!(points_for_duration(61), 2);
        assert_eq!(points_for_duration(120), 2);
        assert_eq!(points_for_duration(1), 1);
        assert_eq!(points_for_duration(0), 0);
    }

    #[test]
    fn extreme_durations_do_not_wrap() {
        assert_eq!(points_for_duration(i64::MAX), i64::MAX / 60);
        assert!(points_for_duration(i64::MAX - 59) > 0);

        let mission = MissionDoc::new(
            "org-1".into(),
            "Marathon".into(),
            String::new(),
            i64::MAX,
            1,
            0.0,
            false,
        );
        assert!(mission.points > 0);
    }

    #[test]
    fn volunteer_missions_have_no_currency_reward() {
        let mission = MissionDoc::new(
            "org-1".into(),
            "Park cleanup".into(),
            String::new(),
            120,
            5,
            25.0,
            true,
        );
        assert_eq!(mission.reward_xrp, 0.0);
        assert_eq!(mission.points, 2);
        assert_eq!(mission.status, MissionStatus::Published);
    }
}
