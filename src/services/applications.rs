//! Application lifecycle state machine
//!
//! States: pending (initial) → accepted | rejected → completed (terminal).
//! Accepted and rejected may toggle while the mission is open; completion
//! only ever happens through mission-wide settlement. Nothing moves once
//! the mission itself is completed.

use std::sync::Arc;
use tracing::info;

use crate::db::schemas::{ApplicationDoc, ApplicationStatus, MissionDoc, MissionStatus};
use crate::db::MarketplaceStore;
use crate::services::admission::AdmissionController;
use crate::types::{EngineError, Result};

/// Outcome of an accept/reject review
#[derive(Debug)]
pub struct ReviewOutcome {
    pub application: ApplicationDoc,
    /// Mission accepted_count after the transition
    pub accepted_count: i64,
}

/// Validate a review transition requested by the organization.
/// Settlement's accepted→completed transition does not pass through here.
pub fn validate_transition(current: ApplicationStatus, target: ApplicationStatus) -> Result<()> {
    use ApplicationStatus::*;

    match (current, target) {
        (Pending, Accepted) | (Pending, Rejected) => Ok(()),
        (Accepted, Rejected) => Ok(()),
        (Rejected, Accepted) => Ok(()),
        (Completed, _) => Err(EngineError::Conflict(
            "Application is already completed".into(),
        )),
        (_, Completed) => Err(EngineError::Conflict(
            "Applications are completed through mission settlement only".into(),
        )),
        (current, target) if current == target => Err(EngineError::Conflict(format!(
            "Application is already {}",
            current
        ))),
        (current, target) => Err(EngineError::Conflict(format!(
            "Cannot move an application from {} to {}",
            current, target
        ))),
    }
}

/// Application submission and review operations
pub struct ApplicationService {
    store: Arc<dyn MarketplaceStore>,
    admission: AdmissionController,
}

impl ApplicationService {
    pub fn new(store: Arc<dyn MarketplaceStore>) -> Self {
        let admission = AdmissionController::new(Arc::clone(&store));
        Self { store, admission }
    }

    async fn load_mission(&self, mission_id: &str) -> Result<MissionDoc> {
        self.store
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Mission not found: {}", mission_id)))
    }

    /// Submit a new application to a published mission
    pub async fn submit(
        &self,
        mission_id: &str,
        applicant_id: &str,
        message: Option<String>,
    ) -> Result<ApplicationDoc> {
        if applicant_id.is_empty() {
            return Err(EngineError::Validation("applicantId is required".into()));
        }

        let mission = self.load_mission(mission_id).await?;
        if mission.status != MissionStatus::Published {
            return Err(EngineError::Conflict(format!(
                "Mission is not open for applications (status: {})",
                mission.status
            )));
        }

        if self
            .store
            .find_application(mission_id, applicant_id)
            .await?
            .is_some()
        {
            return Err(EngineError::Conflict(
                "An application already exists for this mission".into(),
            ));
        }

        let application = self
            .store
            .insert_application(ApplicationDoc::new(
                mission_id.to_string(),
                applicant_id.to_string(),
                message,
            ))
            .await?;

        info!(
            mission_id,
            applicant_id,
            application_id = %application.application_id,
            "application submitted"
        );

        Ok(application)
    }

    /// Accept or reject an application on behalf of the organization
    pub async fn review(
        &self,
        mission_id: &str,
        application_id: &str,
        target: ApplicationStatus,
    ) -> Result<ReviewOutcome> {
        if target != ApplicationStatus::Accepted && target != ApplicationStatus::Rejected {
            return Err(EngineError::Validation(
                "Review status must be 'accepted' or 'rejected'".into(),
            ));
        }

        let mission = self.load_mission(mission_id).await?;
        if mission.status == MissionStatus::Completed {
            return Err(EngineError::Conflict(
                "Mission is already completed".into(),
            ));
        }

        let application = self
            .store
            .get_application(application_id)
            .await?
            .filter(|a| a.mission_id == mission_id)
            .ok_or_else(|| {
                EngineError::NotFound(format!("Application not found: {}", application_id))
            })?;

        validate_transition(application.status, target)?;

        let accepted_count = match target {
            ApplicationStatus::Accepted => {
                // Claim the slot first; the grant and the status flip are
                // one logical step, so a failed or lost write hands the
                // slot back. The status write is guarded on the status we
                // validated against, so two reviewers racing on the same
                // application cannot both claim a slot.
                let granted = self.admission.try_accept(mission_id).await?;
                match self
                    .store
                    .set_application_status(application_id, application.status, target)
                    .await
                {
                    Ok(true) => {}
                    Ok(false) => {
                        self.admission.release(mission_id).await.ok();
                        return Err(EngineError::Conflict(
                            "Application was reviewed concurrently".into(),
                        ));
                    }
                    Err(e) => {
                        self.admission.release(mission_id).await.ok();
                        return Err(e);
                    }
                }
                granted.accepted_count
            }
            ApplicationStatus::Rejected => {
                if !self
                    .store
                    .set_application_status(application_id, application.status, target)
                    .await?
                {
                    return Err(EngineError::Conflict(
                        "Application was reviewed concurrently".into(),
                    ));
                }
                if application.status == ApplicationStatus::Accepted {
                    self.admission.release(mission_id).await?;
                }
                self.load_mission(mission_id).await?.accepted_count
            }
            _ => unreachable!("validated above"),
        };

        info!(
            mission_id,
            application_id,
            from = %application.status,
            to = %target,
            accepted_count,
            "application reviewed"
        );

        let application = self
            .store
            .get_application(application_id)
            .await?
            .ok_or_else(|| EngineError::Internal("Application vanished mid-review".into()))?;

        Ok(ReviewOutcome {
            application,
            accepted_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::UserDoc;
    use crate::db::MemoryStore;

    fn mission(max: i64) -> MissionDoc {
        MissionDoc::new("org-1".into(), "Cleanup".into(), String::new(), 60, max, 0.0, false)
    }

    async fn setup(max: i64) -> (Arc<MemoryStore>, ApplicationService, MissionDoc) {
        let store = Arc::new(MemoryStore::new());
        let m = store.insert_mission(mission(max)).await.unwrap();
        store
            .insert_user(UserDoc::new("Ada".into(), false))
            .await
            .unwrap();
        let service = ApplicationService::new(store.clone() as Arc<dyn MarketplaceStore>);
        (store, service, m)
    }

    #[test]
    fn transition_table() {
        use ApplicationStatus::*;
        assert!(validate_transition(Pending, Accepted).is_ok());
        assert!(validate_transition(Pending, Rejected).is_ok());
        assert!(validate_transition(Accepted, Rejected).is_ok());
        assert!(validate_transition(Rejected, Accepted).is_ok());

        assert!(validate_transition(Completed, Accepted).is_err());
        assert!(validate_transition(Completed, Rejected).is_err());
        assert!(validate_transition(Pending, Completed).is_err());
        assert!(validate_transition(Accepted, Completed).is_err());
        assert!(validate_transition(Accepted, Accepted).is_err());
        assert!(validate_transition(Rejected, Rejected).is_err());
    }

    #[tokio::test]
    async fn submit_creates_pending_application() {
        let (_store, service, m) = setup(3).await;
        let app = service
            .submit(&m.mission_id, "user-1", Some("count me in".into()))
            .await
            .unwrap();
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert!(app.applied_at.is_some());
    }

    #[tokio::test]
    async fn duplicate_submission_conflicts() {
        let (_store, service, m) = setup(3).await;
        service.submit(&m.mission_id, "user-1", None).await.unwrap();
        let err = service.submit(&m.mission_id, "user-1", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn submit_to_completed_mission_conflicts() {
        let (store, service, m) = setup(3).await;
        store.complete_mission(&m.mission_id).await.unwrap();
        let err = service.submit(&m.mission_id, "user-1", None).await.unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn accept_at_capacity_is_denied_and_count_unchanged() {
        let (store, service, m) = setup(1).await;
        let a1 = service.submit(&m.mission_id, "user-1", None).await.unwrap();
        let a2 = service.submit(&m.mission_id, "user-2", None).await.unwrap();

        let outcome = service
            .review(&m.mission_id, &a1.application_id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(outcome.accepted_count, 1);

        let err = service
            .review(&m.mission_id, &a2.application_id, ApplicationStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CapacityFull));

        let stored = store.get_mission(&m.mission_id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_count, 1);
    }

    #[tokio::test]
    async fn reject_of_accepted_releases_the_slot() {
        let (_store, service, m) = setup(1).await;
        let a1 = service.submit(&m.mission_id, "user-1", None).await.unwrap();
        let a2 = service.submit(&m.mission_id, "user-2", None).await.unwrap();

        service
            .review(&m.mission_id, &a1.application_id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        let outcome = service
            .review(&m.mission_id, &a1.application_id, ApplicationStatus::Rejected)
            .await
            .unwrap();
        assert_eq!(outcome.accepted_count, 0);

        // The freed slot can be claimed by another applicant
        let outcome = service
            .review(&m.mission_id, &a2.application_id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(outcome.accepted_count, 1);
    }

    #[tokio::test]
    async fn rejected_applicant_can_be_readmitted() {
        let (_store, service, m) = setup(1).await;
        let a1 = service.submit(&m.mission_id, "user-1", None).await.unwrap();

        service
            .review(&m.mission_id, &a1.application_id, ApplicationStatus::Rejected)
            .await
            .unwrap();
        let outcome = service
            .review(&m.mission_id, &a1.application_id, ApplicationStatus::Accepted)
            .await
            .unwrap();
        assert_eq!(outcome.application.status, ApplicationStatus::Accepted);
        assert_eq!(outcome.accepted_count, 1);
    }

    #[tokio::test]
    async fn concurrent_reviews_of_one_application_claim_one_slot() {
        let (store, service, m) = setup(2).await;
        let service = Arc::new(service);
        let a = service.submit(&m.mission_id, "user-1", None).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let service = Arc::clone(&service);
            let mission_id = m.mission_id.clone();
            let application_id = a.application_id.clone();
            handles.push(tokio::spawn(async move {
                service
                    .review(&mission_id, &application_id, ApplicationStatus::Accepted)
                    .await
                    .is_ok()
            }));
        }

        let mut granted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                granted += 1;
            }
        }

        // Exactly one reviewer wins; the loser's slot claim is released
        assert_eq!(granted, 1);
        let stored = store.get_mission(&m.mission_id).await.unwrap().unwrap();
        assert_eq!(stored.accepted_count, 1);
    }

    #[tokio::test]
    async fn review_on_completed_mission_conflicts() {
        let (store, service, m) = setup(1).await;
        let a1 = service.submit(&m.mission_id, "user-1", None).await.unwrap();
        store.complete_mission(&m.mission_id).await.unwrap();

        let err = service
            .review(&m.mission_id, &a1.application_id, ApplicationStatus::Accepted)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }
}
