//! Admission control for mission capacity
//!
//! Mediates the pending→accepted transition so that a mission's
//! accepted_count never exceeds max_participants. The actual ceiling is
//! enforced by the store's atomic conditional increment; this controller
//! owns the grant/release protocol around it.

use std::sync::Arc;
use tracing::debug;

use crate::db::schemas::MissionDoc;
use crate::db::MarketplaceStore;
use crate::types::{EngineError, Result};

/// Grants and releases capacity slots on missions
pub struct AdmissionController {
    store: Arc<dyn MarketplaceStore>,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn MarketplaceStore>) -> Self {
        Self { store }
    }

    /// Try to claim one slot on a published mission.
    ///
    /// Returns the updated mission on grant. Fails with `CapacityFull`
    /// when the ceiling is reached; the conditional increment also
    /// refuses missions that are no longer published, which surfaces as
    /// capacity denial to the caller (the application service has already
    /// rejected completed missions with a clearer error by then).
    pub async fn try_accept(&self, mission_id: &str) -> Result<MissionDoc> {
        match self.store.try_accept_slot(mission_id).await? {
            Some(mission) => {
                debug!(
                    mission_id,
                    accepted = mission.accepted_count,
                    max = mission.max_participants,
                    "capacity slot granted"
                );
                Ok(mission)
            }
            None => Err(EngineError::CapacityFull),
        }
    }

    /// Release one slot after an accepted application is rejected.
    /// The decrement floors at zero in the store.
    pub async fn release(&self, mission_id: &str) -> Result<()> {
        self.store.release_slot(mission_id).await?;
        debug!(mission_id, "capacity slot released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::db::schemas::MissionStatus;

    fn mission(max: i64) -> MissionDoc {
        MissionDoc::new("org-1".into(), "Cleanup".into(), String::new(), 60, max, 0.0, false)
    }

    #[tokio::test]
    async fn grants_until_full_then_denies() {
        let store = Arc::new(MemoryStore::new());
        let m = store.insert_mission(mission(1)).await.unwrap();
        let admission = AdmissionController::new(store.clone());

        let granted = admission.try_accept(&m.mission_id).await.unwrap();
        assert_eq!(granted.accepted_count, 1);

        let err = admission.try_accept(&m.mission_id).await.unwrap_err();
        assert!(matches!(err, EngineError::CapacityFull));

        // The count did not move past the ceiling
        let stored = store.get_mission(&m.mission_id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_count, 1);
    }

    #[tokio::test]
    async fn release_reopens_a_slot() {
        let store = Arc::new(MemoryStore::new());
        let m = store.insert_mission(mission(1)).await.unwrap();
        let admission = AdmissionController::new(store.clone());

        admission.try_accept(&m.mission_id).await.unwrap();
        admission.release(&m.mission_id).await.unwrap();
        let granted = admission.try_accept(&m.mission_id).await.unwrap();
        assert_eq!(granted.accepted_count, 1);
    }

    #[tokio::test]
    async fn completed_missions_are_not_granted() {
        let store = Arc::new(MemoryStore::new());
        let mut m = mission(5);
        m.status = MissionStatus::Completed;
        let m = store.insert_mission(m).await.unwrap();
        let admission = AdmissionController::new(store);

        let err = admission.try_accept(&m.mission_id).await.unwrap_err();
        assert!(matches!(err, EngineError::CapacityFull));
    }

    #[tokio::test]
    async fn concurrent_accepts_respect_the_ceiling() {
        let store = Arc::new(MemoryStore::new());
        let m = store.insert_mission(mission(3)).await.unwrap();
        let admission = Arc::new(AdmissionController::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let admission = Arc::clone(&admission);
            let mission_id = m.mission_id.clone();
            handles.push(tokio::spawn(async move {
                admission.try_accept(&mission_id).await.is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        assert_eq!(granted, 3);
        let stored = store.get_mission(&m.mission_id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_count, 3);
    }
}
