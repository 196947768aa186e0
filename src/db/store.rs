//! Marketplace store trait and implementations
//!
//! The engine talks to persistence through `MarketplaceStore` so the
//! settlement and admission logic can be exercised against an in-memory
//! store in tests and in dev mode, and against MongoDB in production.
//!
//! Capacity enforcement note: the store is the single place where the
//! accepted-count ceiling is enforced. `try_accept_slot` is an atomic
//! conditional increment (one document, one operation), so
//! `accepted_count <= max_participants` holds even under concurrent
//! accept requests.

use async_trait::async_trait;
use bson::{doc, DateTime};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use crate::db::mongo::MongoClient;
use crate::db::schemas::{
    ApplicationDoc, ApplicationStatus, MissionDoc, MissionStatus, TransactionDoc, UserDoc,
    APPLICATION_COLLECTION, MISSION_COLLECTION, TRANSACTION_COLLECTION, USER_COLLECTION,
};
use crate::types::{EngineError, Result};

/// Result of an atomic points accumulation
#[derive(Debug, Clone, Copy)]
pub struct PointsUpdate {
    /// Points before the increment
    pub previous: i64,
    /// Points after the increment
    pub new: i64,
}

/// Row-level persistence operations the engine needs.
///
/// No multi-document transaction is assumed; each method is a single
/// logical row operation.
#[async_trait]
pub trait MarketplaceStore: Send + Sync {
    // --- missions ---

    async fn insert_mission(&self, mission: MissionDoc) -> Result<MissionDoc>;
    async fn get_mission(&self, mission_id: &str) -> Result<Option<MissionDoc>>;

    /// Atomically grant one capacity slot on a published mission.
    /// Returns the updated mission on grant, `None` when capacity is
    /// exhausted or the mission is not published.
    async fn try_accept_slot(&self, mission_id: &str) -> Result<Option<MissionDoc>>;

    /// Release one capacity slot, flooring at zero.
    async fn release_slot(&self, mission_id: &str) -> Result<()>;

    /// Flip a mission to completed and stamp completed_at.
    async fn complete_mission(&self, mission_id: &str) -> Result<()>;

    // --- applications ---

    async fn insert_application(&self, application: ApplicationDoc) -> Result<ApplicationDoc>;
    async fn get_application(&self, application_id: &str) -> Result<Option<ApplicationDoc>>;
    async fn find_application(
        &self,
        mission_id: &str,
        applicant_id: &str,
    ) -> Result<Option<ApplicationDoc>>;
    async fn list_applications(&self, mission_id: &str) -> Result<Vec<ApplicationDoc>>;

    /// Transition an application's status, stamping reviewed_at for
    /// accepted/rejected and completed_at for completed. The write only
    /// lands while the application still holds `from`; returns false when
    /// the guard did not match (a concurrent reviewer got there first).
    async fn set_application_status(
        &self,
        application_id: &str,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<bool>;

    // --- users ---

    async fn insert_user(&self, user: UserDoc) -> Result<UserDoc>;
    async fn get_user(&self, user_id: &str) -> Result<Option<UserDoc>>;

    /// Atomically add earned points to a user, returning the totals
    /// before and after the increment.
    async fn add_points(&self, user_id: &str, earned: i64) -> Result<PointsUpdate>;

    /// Attach a ledger wallet to a user.
    async fn set_wallet(&self, user_id: &str, address: &str, secret: &str) -> Result<()>;

    // --- audit ---

    /// Append a transaction audit row. Rows are never updated.
    async fn record_transaction(&self, tx: TransactionDoc) -> Result<()>;
}

// =============================================================================
// MongoDB implementation
// =============================================================================

/// MongoDB-backed marketplace store
#[derive(Clone)]
pub struct MongoStore {
    mongo: MongoClient,
}

impl MongoStore {
    pub fn new(mongo: MongoClient) -> Self {
        Self { mongo }
    }
}

#[async_trait]
impl MarketplaceStore for MongoStore {
    async fn insert_mission(&self, mission: MissionDoc) -> Result<MissionDoc> {
        let collection = self.mongo.collection::<MissionDoc>(MISSION_COLLECTION).await?;
        let mut mission = mission;
        let oid = collection.insert_one(mission.clone()).await?;
        mission._id = Some(oid);
        Ok(mission)
    }

    async fn get_mission(&self, mission_id: &str) -> Result<Option<MissionDoc>> {
        let collection = self.mongo.collection::<MissionDoc>(MISSION_COLLECTION).await?;
        collection.find_one(doc! { "mission_id": mission_id }).await
    }

    async fn try_accept_slot(&self, mission_id: &str) -> Result<Option<MissionDoc>> {
        let collection = self.mongo.collection::<MissionDoc>(MISSION_COLLECTION).await?;

        // Single-document conditional increment: the filter only matches
        // while capacity remains, so two racing accepts cannot both pass
        // the ceiling.
        let filter = doc! {
            "mission_id": mission_id,
            "status": MissionStatus::Published.as_str(),
            "$expr": { "$lt": ["$accepted_count", "$max_participants"] },
        };
        let update = doc! {
            "$inc": { "accepted_count": 1 },
            "$set": { "metadata.updated_at": DateTime::now() },
        };

        collection.find_one_and_update(filter, update, false).await
    }

    async fn release_slot(&self, mission_id: &str) -> Result<()> {
        let collection = self.mongo.collection::<MissionDoc>(MISSION_COLLECTION).await?;

        // Guarded decrement floors at zero
        let filter = doc! {
            "mission_id": mission_id,
            "accepted_count": { "$gt": 0 },
        };
        let update = doc! {
            "$inc": { "accepted_count": -1 },
            "$set": { "metadata.updated_at": DateTime::now() },
        };

        collection.update_one(filter, update).await?;
        Ok(())
    }

    async fn complete_mission(&self, mission_id: &str) -> Result<()> {
        let collection = self.mongo.collection::<MissionDoc>(MISSION_COLLECTION).await?;
        let update = doc! {
            "$set": {
                "status": MissionStatus::Completed.as_str(),
                "completed_at": DateTime::now(),
                "metadata.updated_at": DateTime::now(),
            }
        };
        collection
            .update_one(doc! { "mission_id": mission_id }, update)
            .await?;
        Ok(())
    }

    async fn insert_application(&self, application: ApplicationDoc) -> Result<ApplicationDoc> {
        let collection = self
            .mongo
            .collection::<ApplicationDoc>(APPLICATION_COLLECTION)
            .await?;
        let mut application = application;
        // The unique (mission_id, applicant_id) index backstops the
        // duplicate check in the application service.
        let oid = collection.insert_one(application.clone()).await.map_err(|e| {
            let msg = e.to_string();
            if msg.contains("E11000") || msg.contains("duplicate key") {
                EngineError::Conflict("An application already exists for this mission".into())
            } else {
                e
            }
        })?;
        application._id = Some(oid);
        Ok(application)
    }

    async fn get_application(&self, application_id: &str) -> Result<Option<ApplicationDoc>> {
        let collection = self
            .mongo
            .collection::<ApplicationDoc>(APPLICATION_COLLECTION)
            .await?;
        collection
            .find_one(doc! { "application_id": application_id })
            .await
    }

    async fn find_application(
        &self,
        mission_id: &str,
        applicant_id: &str,
    ) -> Result<Option<ApplicationDoc>> {
        let collection = self
            .mongo
            .collection::<ApplicationDoc>(APPLICATION_COLLECTION)
            .await?;
        collection
            .find_one(doc! { "mission_id": mission_id, "applicant_id": applicant_id })
            .await
    }

    async fn list_applications(&self, mission_id: &str) -> Result<Vec<ApplicationDoc>> {
        let collection = self
            .mongo
            .collection::<ApplicationDoc>(APPLICATION_COLLECTION)
            .await?;
        collection.find_many(doc! { "mission_id": mission_id }).await
    }

    async fn set_application_status(
        &self,
        application_id: &str,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<bool> {
        let collection = self
            .mongo
            .collection::<ApplicationDoc>(APPLICATION_COLLECTION)
            .await?;

        let mut set = doc! {
            "status": to.as_str(),
            "metadata.updated_at": DateTime::now(),
        };
        match to {
            ApplicationStatus::Accepted | ApplicationStatus::Rejected => {
                set.insert("reviewed_at", DateTime::now());
            }
            ApplicationStatus::Completed => {
                set.insert("completed_at", DateTime::now());
            }
            ApplicationStatus::Pending => {}
        }

        // Conditional on the expected current status: a racing reviewer
        // who read the same snapshot cannot both win
        let result = collection
            .update_one(
                doc! { "application_id": application_id, "status": from.as_str() },
                doc! { "$set": set },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn insert_user(&self, user: UserDoc) -> Result<UserDoc> {
        let collection = self.mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        let mut user = user;
        let oid = collection.insert_one(user.clone()).await?;
        user._id = Some(oid);
        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserDoc>> {
        let collection = self.mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        collection.find_one(doc! { "user_id": user_id }).await
    }

    async fn add_points(&self, user_id: &str, earned: i64) -> Result<PointsUpdate> {
        let collection = self.mongo.collection::<UserDoc>(USER_COLLECTION).await?;

        // Atomic $inc with the pre-image back, so (previous, new) stays
        // consistent even when settlements race on the same user.
        let before = collection
            .find_one_and_update(
                doc! { "user_id": user_id },
                doc! {
                    "$inc": { "points": earned },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
                true,
            )
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("User not found: {}", user_id)))?;

        debug!(user_id, earned, previous = before.points, "points accumulated");

        Ok(PointsUpdate {
            previous: before.points,
            new: before.points + earned,
        })
    }

    async fn set_wallet(&self, user_id: &str, address: &str, secret: &str) -> Result<()> {
        let collection = self.mongo.collection::<UserDoc>(USER_COLLECTION).await?;
        collection
            .update_one(
                doc! { "user_id": user_id },
                doc! {
                    "$set": {
                        "wallet": { "address": address, "secret": secret },
                        "metadata.updated_at": DateTime::now(),
                    }
                },
            )
            .await?;
        Ok(())
    }

    async fn record_transaction(&self, tx: TransactionDoc) -> Result<()> {
        let collection = self
            .mongo
            .collection::<TransactionDoc>(TRANSACTION_COLLECTION)
            .await?;
        collection.insert_one(tx).await?;
        Ok(())
    }
}

// =============================================================================
// In-memory implementation (dev mode and tests)
// =============================================================================

#[derive(Default)]
struct MemoryInner {
    missions: HashMap<String, MissionDoc>,
    applications: HashMap<String, ApplicationDoc>,
    users: HashMap<String, UserDoc>,
    transactions: Vec<TransactionDoc>,
}

/// In-memory marketplace store. Backs dev mode when MongoDB is
/// unavailable, and all service-level tests. Capacity and points
/// operations run under one lock, giving the same atomicity the Mongo
/// implementation gets from single-document updates.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded transactions (test inspection)
    pub fn transactions(&self) -> Vec<TransactionDoc> {
        self.inner.lock().expect("store lock").transactions.clone()
    }
}

#[async_trait]
impl MarketplaceStore for MemoryStore {
    async fn insert_mission(&self, mission: MissionDoc) -> Result<MissionDoc> {
        let mut inner = self.inner.lock().expect("store lock");
        inner
            .missions
            .insert(mission.mission_id.clone(), mission.clone());
        Ok(mission)
    }

    async fn get_mission(&self, mission_id: &str) -> Result<Option<MissionDoc>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.missions.get(mission_id).cloned())
    }

    async fn try_accept_slot(&self, mission_id: &str) -> Result<Option<MissionDoc>> {
        let mut inner = self.inner.lock().expect("store lock");
        match inner.missions.get_mut(mission_id) {
            Some(mission)
                if mission.status == MissionStatus::Published
                    && mission.accepted_count < mission.max_participants =>
            {
                mission.accepted_count += 1;
                Ok(Some(mission.clone()))
            }
            Some(_) => Ok(None),
            None => Ok(None),
        }
    }

    async fn release_slot(&self, mission_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        if let Some(mission) = inner.missions.get_mut(mission_id) {
            if mission.accepted_count > 0 {
                mission.accepted_count -= 1;
            }
        }
        Ok(())
    }

    async fn complete_mission(&self, mission_id: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        let mission = inner
            .missions
            .get_mut(mission_id)
            .ok_or_else(|| EngineError::NotFound(format!("Mission not found: {}", mission_id)))?;
        mission.status = MissionStatus::Completed;
        mission.completed_at = Some(DateTime::now());
        Ok(())
    }

    async fn insert_application(&self, application: ApplicationDoc) -> Result<ApplicationDoc> {
        let mut inner = self.inner.lock().expect("store lock");
        let duplicate = inner.applications.values().any(|a| {
            a.mission_id == application.mission_id && a.applicant_id == application.applicant_id
        });
        if duplicate {
            return Err(EngineError::Conflict(
                "An application already exists for this mission".into(),
            ));
        }
        inner
            .applications
            .insert(application.application_id.clone(), application.clone());
        Ok(application)
    }

    async fn get_application(&self, application_id: &str) -> Result<Option<ApplicationDoc>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.applications.get(application_id).cloned())
    }

    async fn find_application(
        &self,
        mission_id: &str,
        applicant_id: &str,
    ) -> Result<Option<ApplicationDoc>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .applications
            .values()
            .find(|a| a.mission_id == mission_id && a.applicant_id == applicant_id)
            .cloned())
    }

    async fn list_applications(&self, mission_id: &str) -> Result<Vec<ApplicationDoc>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner
            .applications
            .values()
            .filter(|a| a.mission_id == mission_id)
            .cloned()
            .collect())
    }

    async fn set_application_status(
        &self,
        application_id: &str,
        from: ApplicationStatus,
        to: ApplicationStatus,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().expect("store lock");
        let application = inner.applications.get_mut(application_id).ok_or_else(|| {
            EngineError::NotFound(format!("Application not found: {}", application_id))
        })?;
        if application.status != from {
            return Ok(false);
        }
        application.status = to;
        match to {
            ApplicationStatus::Accepted | ApplicationStatus::Rejected => {
                application.reviewed_at = Some(DateTime::now());
            }
            ApplicationStatus::Completed => {
                application.completed_at = Some(DateTime::now());
            }
            ApplicationStatus::Pending => {}
        }
        Ok(true)
    }

    async fn insert_user(&self, user: UserDoc) -> Result<UserDoc> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.users.insert(user.user_id.clone(), user.clone());
        Ok(user)
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<UserDoc>> {
        let inner = self.inner.lock().expect("store lock");
        Ok(inner.users.get(user_id).cloned())
    }

    async fn add_points(&self, user_id: &str, earned: i64) -> Result<PointsUpdate> {
        let mut inner = self.inner.lock().expect("store lock");
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| EngineError::NotFound(format!("User not found: {}", user_id)))?;
        let previous = user.points;
        user.points += earned;
        Ok(PointsUpdate {
            previous,
            new: user.points,
        })
    }

    async fn set_wallet(&self, user_id: &str, address: &str, secret: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        let user = inner
            .users
            .get_mut(user_id)
            .ok_or_else(|| EngineError::NotFound(format!("User not found: {}", user_id)))?;
        user.wallet = Some(crate::db::schemas::WalletInfo {
            address: address.to_string(),
            secret: secret.to_string(),
        });
        Ok(())
    }

    async fn record_transaction(&self, tx: TransactionDoc) -> Result<()> {
        let mut inner = self.inner.lock().expect("store lock");
        inner.transactions.push(tx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mission(max: i64) -> MissionDoc {
        MissionDoc::new("org-1".into(), "Cleanup".into(), String::new(), 60, max, 0.0, false)
    }

    #[tokio::test]
    async fn accept_slot_stops_at_capacity() {
        let store = MemoryStore::new();
        let m = store.insert_mission(mission(2)).await.unwrap();

        assert!(store.try_accept_slot(&m.mission_id).await.unwrap().is_some());
        assert!(store.try_accept_slot(&m.mission_id).await.unwrap().is_some());
        assert!(store.try_accept_slot(&m.mission_id).await.unwrap().is_none());

        let stored = store.get_mission(&m.mission_id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_count, 2);
    }

    #[tokio::test]
    async fn release_slot_floors_at_zero() {
        let store = MemoryStore::new();
        let m = store.insert_mission(mission(3)).await.unwrap();

        store.release_slot(&m.mission_id).await.unwrap();
        let stored = store.get_mission(&m.mission_id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_count, 0);
    }

    #[tokio::test]
    async fn duplicate_application_conflicts() {
        let store = MemoryStore::new();
        let m = store.insert_mission(mission(3)).await.unwrap();

        let first = ApplicationDoc::new(m.mission_id.clone(), "user-1".into(), None);
        store.insert_application(first).await.unwrap();

        let second = ApplicationDoc::new(m.mission_id.clone(), "user-1".into(), None);
        let err = store.insert_application(second).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn status_guard_rejects_stale_transition() {
        let store = MemoryStore::new();
        let m = store.insert_mission(mission(3)).await.unwrap();
        let app = ApplicationDoc::new(m.mission_id.clone(), "user-1".into(), None);
        let app = store.insert_application(app).await.unwrap();

        let moved = store
            .set_application_status(
                &app.application_id,
                ApplicationStatus::Pending,
                ApplicationStatus::Accepted,
            )
            .await
            .unwrap();
        assert!(moved);

        // A second writer holding the stale pending snapshot loses
        let moved = store
            .set_application_status(
                &app.application_id,
                ApplicationStatus::Pending,
                ApplicationStatus::Rejected,
            )
            .await
            .unwrap();
        assert!(!moved);

        let stored = store.get_application(&app.application_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ApplicationStatus::Accepted);
    }

    #[tokio::test]
    async fn add_points_returns_before_and_after() {
        let store = MemoryStore::new();
        let user = store.insert_user(UserDoc::new("Ada".into(), false)).await.unwrap();

        let update = store.add_points(&user.user_id, 4).await.unwrap();
        assert_eq!(update.previous, 0);
        assert_eq!(update.new, 4);

        let update = store.add_points(&user.user_id, 6).await.unwrap();
        assert_eq!(update.previous, 4);
        assert_eq!(update.new, 10);
    }
}
