//! Reward settlement orchestration
//!
//! At mission completion the orchestrator runs a per-participant pipeline:
//! re-validate the application, flip it to completed, grant impact points,
//! evaluate the citizen level, mint a mission badge, mint a tier badge on
//! level-up, and pay out XRP when the mission carries a reward. Each leg
//! talks to an independently failing external system, so the pipeline is a
//! small saga: points are persisted before any externally irreversible
//! monetary action, ledger legs are best-effort, and every kept attempt
//! lands in the append-only transaction log for reconciliation. There is
//! no rollback of points when a later leg fails.
//!
//! The mission itself flips to completed after every participant has been
//! processed, regardless of individual failures: the organization-facing
//! action is "this mission happened," not "every payout succeeded."

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::schemas::{
    ApplicationStatus, MissionDoc, TransactionDoc, TransactionStatus, TransactionType, UserDoc,
};
use crate::db::MarketplaceStore;
use crate::ledger::{memo, MintResult, RewardLedger, Secret};
use crate::services::levels;
use crate::types::{EngineError, Result};

/// Outcome of one mint attempt, embedded in the participant result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MintOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of the XRP payout leg
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub success: bool,
    pub amount_xrp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-participant settlement result
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantResult {
    pub participant_id: String,
    /// False only when the points/status persistence failed and the
    /// reward legs were never attempted
    pub success: bool,
    pub earned_points: i64,
    pub new_points: i64,
    pub previous_level: String,
    pub new_level: String,
    pub leveled_up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mission_badge: Option<MintOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level_badge: Option<MintOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Settlement outcome for the whole mission
#[derive(Debug)]
pub struct SettlementOutcome {
    pub mission: MissionDoc,
    pub results: Vec<ParticipantResult>,
}

/// Coordinates the reward pipeline at mission completion
pub struct SettlementOrchestrator {
    store: Arc<dyn MarketplaceStore>,
    ledger: Arc<dyn RewardLedger>,
    /// Platform wallet used for system-originated badge mints
    platform_secret: Option<Secret>,
}

impl SettlementOrchestrator {
    pub fn new(
        store: Arc<dyn MarketplaceStore>,
        ledger: Arc<dyn RewardLedger>,
        platform_secret: Option<Secret>,
    ) -> Self {
        Self {
            store,
            ledger,
            platform_secret,
        }
    }

    /// Complete a mission: settle every accepted participant in the order
    /// supplied, then flip the mission to completed unconditionally.
    ///
    /// Participant ids whose application is not in `accepted` state are
    /// skipped without producing a result entry. Ledger failures are
    /// recorded in the per-participant result and never abort the batch.
    pub async fn complete_mission(
        &self,
        mission_id: &str,
        participant_ids: &[String],
    ) -> Result<SettlementOutcome> {
        let mission = self
            .store
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("Mission not found: {}", mission_id)))?;

        if mission.status == crate::db::schemas::MissionStatus::Completed {
            return Err(EngineError::Conflict("Mission is already completed".into()));
        }

        let org = self.store.get_user(&mission.org_id).await?;

        let mut results = Vec::new();
        // Sequential on purpose: each participant's legs have externally
        // visible side effects that must not interleave with their own
        // points/tier computation
        for participant_id in participant_ids {
            match self.settle_participant(&mission, org.as_ref(), participant_id).await {
                Some(result) => results.push(result),
                None => {
                    info!(mission_id, participant_id, "skipping participant without accepted application");
                }
            }
        }

        // The flip happens even when individual reward legs failed
        self.store.complete_mission(mission_id).await?;

        let mission = self
            .store
            .get_mission(mission_id)
            .await?
            .ok_or_else(|| EngineError::Internal("Mission vanished during settlement".into()))?;

        info!(
            mission_id,
            participants = results.len(),
            failures = results.iter().filter(|r| !r.success).count(),
            "mission settled"
        );

        Ok(SettlementOutcome { mission, results })
    }

    /// Run the pipeline for one participant. Returns `None` when the
    /// participant has no accepted application for this mission.
    async fn settle_participant(
        &self,
        mission: &MissionDoc,
        org: Option<&UserDoc>,
        participant_id: &str,
    ) -> Option<ParticipantResult> {
        let application = match self
            .store
            .find_application(&mission.mission_id, participant_id)
            .await
        {
            Ok(Some(app)) if app.status == ApplicationStatus::Accepted => app,
            Ok(_) => return None,
            Err(e) => {
                warn!(participant_id, "application lookup failed: {}", e);
                return Some(failed_result(participant_id, e.to_string()));
            }
        };

        // Volunteer missions double the earned points
        let earned_points = mission
            .points
            .saturating_mul(if mission.is_volunteer { 2 } else { 1 });

        // Persist the recoverable state first: application status and
        // points. A failure here is fatal for this participant and no
        // ledger leg is attempted. The guarded write skips a participant
        // whose application was reviewed away between lookup and here.
        match self
            .store
            .set_application_status(
                &application.application_id,
                ApplicationStatus::Accepted,
                ApplicationStatus::Completed,
            )
            .await
        {
            Ok(true) => {}
            Ok(false) => return None,
            Err(e) => {
                warn!(participant_id, "failed to mark application completed: {}", e);
                return Some(failed_result(participant_id, e.to_string()));
            }
        }

        let points = match self.store.add_points(participant_id, earned_points).await {
            Ok(update) => update,
            Err(e) => {
                warn!(participant_id, "failed to persist points: {}", e);
                return Some(failed_result(participant_id, e.to_string()));
            }
        };

        let change = levels::evaluate(points.previous, points.new);
        let today = Utc::now().format("%Y-%m-%d").to_string();

        // Best-effort ledger legs from here on
        let mission_badge = self
            .mint_mission_badge(mission, participant_id, earned_points, &change, &today)
            .await;

        let level_badge = if change.leveled_up {
            Some(self.mint_level_badge(mission, participant_id, &change, points.new, &today).await)
        } else {
            None
        };

        let payment = self.pay_reward(mission, org, participant_id).await;

        Some(ParticipantResult {
            participant_id: participant_id.to_string(),
            success: true,
            earned_points,
            new_points: points.new,
            previous_level: change.previous.name.to_string(),
            new_level: change.new.name.to_string(),
            leveled_up: change.leveled_up,
            mission_badge: Some(mission_badge),
            level_badge,
            payment,
            error: None,
        })
    }

    /// Mint the mission-completion badge and audit the attempt
    async fn mint_mission_badge(
        &self,
        mission: &MissionDoc,
        participant_id: &str,
        earned_points: i64,
        change: &levels::LevelChange,
        date: &str,
    ) -> MintOutcome {
        let payload = memo::mission_badge(
            &mission.mission_id,
            &mission.title,
            &mission.description,
            earned_points,
            change.new.name,
            date,
        );

        let outcome = self
            .mint(
                &payload,
                TransactionType::MissionNftMint,
                mission,
                participant_id,
                format!("Mission badge for '{}'", mission.title),
            )
            .await;

        if !outcome.success {
            warn!(
                participant_id,
                mission_id = %mission.mission_id,
                "mission badge mint failed: {:?}",
                outcome.error
            );
        }

        outcome
    }

    /// Mint the tier badge on level-up and audit the attempt
    async fn mint_level_badge(
        &self,
        mission: &MissionDoc,
        participant_id: &str,
        change: &levels::LevelChange,
        new_points: i64,
        date: &str,
    ) -> MintOutcome {
        let payload = memo::level_badge(change.new.name, change.new.icon, new_points, date);

        let outcome = self
            .mint(
                &payload,
                TransactionType::BadgeMint,
                mission,
                participant_id,
                format!("Citizen level badge: {}", change.new.name),
            )
            .await;

        if !outcome.success {
            warn!(
                participant_id,
                level = change.new.name,
                "level badge mint failed: {:?}",
                outcome.error
            );
        }

        outcome
    }

    async fn mint(
        &self,
        payload: &[u8],
        tx_type: TransactionType,
        mission: &MissionDoc,
        participant_id: &str,
        description: String,
    ) -> MintOutcome {
        let secret = match self.platform_secret.as_ref() {
            Some(s) => s,
            None => {
                return MintOutcome {
                    success: false,
                    token_ref: None,
                    tx_ref: None,
                    error: Some("Platform wallet is not configured".into()),
                };
            }
        };

        let outcome = match self.ledger.mint_token(secret, payload).await {
            Ok(MintResult {
                success,
                tx_ref,
                token_ref,
                error,
            }) => MintOutcome {
                success,
                token_ref,
                tx_ref,
                error,
            },
            Err(e) => MintOutcome {
                success: false,
                token_ref: None,
                tx_ref: None,
                error: Some(e.to_string()),
            },
        };

        let mut tx = TransactionDoc::new(tx_type, description);
        tx.to_user_id = Some(participant_id.to_string());
        tx.mission_id = Some(mission.mission_id.clone());
        tx.ledger_ref = outcome.token_ref.clone().or_else(|| outcome.tx_ref.clone());
        tx.status = if outcome.success {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        if let Err(e) = self.store.record_transaction(tx).await {
            warn!(participant_id, "failed to record mint transaction: {}", e);
        }

        outcome
    }

    /// Transfer the mission reward from the organization's wallet, when
    /// the mission carries one and both sides hold ledger accounts
    async fn pay_reward(
        &self,
        mission: &MissionDoc,
        org: Option<&UserDoc>,
        participant_id: &str,
    ) -> Option<PaymentOutcome> {
        if mission.reward_xrp <= 0.0 {
            return None;
        }

        let org_wallet = org.and_then(|o| o.wallet.as_ref())?;

        let participant = match self.store.get_user(participant_id).await {
            Ok(Some(user)) => user,
            _ => return None,
        };
        let participant_wallet = participant.wallet.as_ref()?;

        let secret = Secret::new(org_wallet.secret.clone());
        let outcome = match self
            .ledger
            .transfer(&secret, &participant_wallet.address, mission.reward_xrp)
            .await
        {
            Ok(result) => PaymentOutcome {
                success: result.success,
                amount_xrp: mission.reward_xrp,
                tx_ref: result.tx_ref,
                error: result.error,
            },
            Err(e) => PaymentOutcome {
                success: false,
                amount_xrp: mission.reward_xrp,
                tx_ref: None,
                error: Some(e.to_string()),
            },
        };

        if !outcome.success {
            warn!(
                participant_id,
                mission_id = %mission.mission_id,
                "reward payment failed: {:?}",
                outcome.error
            );
        }

        let mut tx = TransactionDoc::new(
            TransactionType::RewardPayment,
            format!("Reward payout for '{}'", mission.title),
        );
        tx.from_user_id = Some(mission.org_id.clone());
        tx.to_user_id = Some(participant_id.to_string());
        tx.amount = mission.reward_xrp;
        tx.mission_id = Some(mission.mission_id.clone());
        tx.ledger_ref = outcome.tx_ref.clone();
        tx.status = if outcome.success {
            TransactionStatus::Completed
        } else {
            TransactionStatus::Failed
        };
        if let Err(e) = self.store.record_transaction(tx).await {
            warn!(participant_id, "failed to record payment transaction: {}", e);
        }

        Some(outcome)
    }
}

fn failed_result(participant_id: &str, error: String) -> ParticipantResult {
    ParticipantResult {
        participant_id: participant_id.to_string(),
        success: false,
        earned_points: 0,
        new_points: 0,
        previous_level: String::new(),
        new_level: String::new(),
        leveled_up: false,
        mission_badge: None,
        level_badge: None,
        payment: None,
        error: Some(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{ApplicationDoc, MissionStatus, WalletInfo};
    use crate::db::MemoryStore;
    use crate::ledger::MockLedger;
    use std::sync::atomic::Ordering;

    struct Harness {
        store: Arc<MemoryStore>,
        ledger: Arc<MockLedger>,
        orchestrator: SettlementOrchestrator,
    }

    fn harness(ledger: MockLedger) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(ledger);
        let orchestrator = SettlementOrchestrator::new(
            store.clone() as Arc<dyn MarketplaceStore>,
            ledger.clone() as Arc<dyn RewardLedger>,
            Some(Secret::new("sPLATFORM")),
        );
        Harness {
            store,
            ledger,
            orchestrator,
        }
    }

    async fn add_user(h: &Harness, name: &str, points: i64, wallet: bool) -> UserDoc {
        let mut user = UserDoc::new(name.into(), false);
        user.points = points;
        if wallet {
            user.wallet = Some(WalletInfo {
                address: format!("r{}", name),
                secret: format!("s{}", name),
            });
        }
        h.store.insert_user(user).await.unwrap()
    }

    async fn add_org(h: &Harness, wallet: bool) -> UserDoc {
        let mut org = UserDoc::new("Org".into(), true);
        if wallet {
            org.wallet = Some(WalletInfo {
                address: "rORG".into(),
                secret: "sORG".into(),
            });
        }
        h.store.insert_user(org).await.unwrap()
    }

    async fn add_mission(
        h: &Harness,
        org: &UserDoc,
        duration: i64,
        reward_xrp: f64,
        is_volunteer: bool,
    ) -> MissionDoc {
        let mission = MissionDoc::new(
            org.user_id.clone(),
            "Park cleanup".into(),
            "Pick up litter in the park".into(),
            duration,
            10,
            reward_xrp,
            is_volunteer,
        );
        h.store.insert_mission(mission).await.unwrap()
    }

    async fn accept(h: &Harness, mission: &MissionDoc, user: &UserDoc) {
        let app = ApplicationDoc::new(mission.mission_id.clone(), user.user_id.clone(), None);
        let app = h.store.insert_application(app).await.unwrap();
        h.store.try_accept_slot(&mission.mission_id).await.unwrap();
        h.store
            .set_application_status(
                &app.application_id,
                ApplicationStatus::Pending,
                ApplicationStatus::Accepted,
            )
            .await
            .unwrap();
    }

    // Scenario A: 60-minute mission, no reward, not volunteer: one point,
    // no payment, one mission badge mint attempt
    #[tokio::test]
    async fn basic_settlement_grants_points_and_mints_badge() {
        let h = harness(MockLedger::new());
        let org = add_org(&h, false).await;
        let mission = add_mission(&h, &org, 60, 0.0, false).await;
        let user = add_user(&h, "ada", 0, false).await;
        accept(&h, &mission, &user).await;

        let outcome = h
            .orchestrator
            .complete_mission(&mission.mission_id, &[user.user_id.clone()])
            .await
            .unwrap();

        assert_eq!(outcome.mission.status, MissionStatus::Completed);
        assert_eq!(outcome.results.len(), 1);
        let result = &outcome.results[0];
        assert!(result.success);
        assert_eq!(result.earned_points, 1);
        assert_eq!(result.new_points, 1);
        assert!(!result.leveled_up);
        assert!(result.payment.is_none());
        assert!(result.mission_badge.as_ref().unwrap().success);

        let txs = h.store.transactions();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].tx_type, TransactionType::MissionNftMint);
        assert_eq!(txs[0].status, TransactionStatus::Completed);

        let stored = h.store.get_user(&user.user_id).await.unwrap().unwrap();
        assert_eq!(stored.points, 1);
    }

    // Scenario B: volunteer mission, 120 minutes: base 2, earned 4
    #[tokio::test]
    async fn volunteer_missions_double_points_and_pay_nothing() {
        let h = harness(MockLedger::new());
        let org = add_org(&h, true).await;
        let mission = add_mission(&h, &org, 120, 50.0, true).await;
        assert_eq!(mission.reward_xrp, 0.0);

        let user = add_user(&h, "ada", 0, true).await;
        accept(&h, &mission, &user).await;

        let outcome = h
            .orchestrator
            .complete_mission(&mission.mission_id, &[user.user_id.clone()])
            .await
            .unwrap();

        let result = &outcome.results[0];
        assert_eq!(result.earned_points, 4);
        assert!(result.payment.is_none());
        assert_eq!(h.ledger.transfer_count(), 0);
    }

    // Scenario D: crossing a tier boundary mints a second badge
    #[tokio::test]
    async fn level_up_mints_a_second_badge() {
        let h = harness(MockLedger::new());
        let org = add_org(&h, false).await;
        let mission = add_mission(&h, &org, 60, 0.0, false).await;
        let user = add_user(&h, "ada", 9, false).await;
        accept(&h, &mission, &user).await;

        let outcome = h
            .orchestrator
            .complete_mission(&mission.mission_id, &[user.user_id.clone()])
            .await
            .unwrap();

        let result = &outcome.results[0];
        assert!(result.leveled_up);
        assert_eq!(result.previous_level, "Seedling");
        assert_eq!(result.new_level, "Helper");
        assert!(result.level_badge.as_ref().unwrap().success);
        assert_eq!(h.ledger.mint_count(), 2);

        let txs = h.store.transactions();
        assert_eq!(txs.len(), 2);
        assert!(txs.iter().any(|t| t.tx_type == TransactionType::BadgeMint));
    }

    // Scenario E: failed transfer is recorded, everything else unaffected
    #[tokio::test]
    async fn failed_payment_does_not_block_settlement() {
        let ledger = MockLedger::new();
        ledger.fail_transfers.store(true, Ordering::SeqCst);
        let h = harness(ledger);

        let org = add_org(&h, true).await;
        let mission = add_mission(&h, &org, 60, 10.0, false).await;
        let user = add_user(&h, "ada", 0, true).await;
        accept(&h, &mission, &user).await;

        let outcome = h
            .orchestrator
            .complete_mission(&mission.mission_id, &[user.user_id.clone()])
            .await
            .unwrap();

        let result = &outcome.results[0];
        assert!(result.success);
        let payment = result.payment.as_ref().unwrap();
        assert!(!payment.success);
        assert!(result.mission_badge.as_ref().unwrap().success);
        assert_eq!(outcome.mission.status, MissionStatus::Completed);

        let txs = h.store.transactions();
        let payment_tx = txs
            .iter()
            .find(|t| t.tx_type == TransactionType::RewardPayment)
            .unwrap();
        assert_eq!(payment_tx.status, TransactionStatus::Failed);
    }

    // Resilience: mints always fail, points and completion still land
    #[tokio::test]
    async fn failing_mints_never_abort_the_batch() {
        let h = harness(MockLedger::failing_mints());
        let org = add_org(&h, false).await;
        let mission = add_mission(&h, &org, 60, 0.0, false).await;

        let users = [
            add_user(&h, "ada", 0, false).await,
            add_user(&h, "ben", 5, false).await,
            add_user(&h, "eve", 9, false).await,
        ];
        for user in &users {
            accept(&h, &mission, user).await;
        }

        let ids: Vec<String> = users.iter().map(|u| u.user_id.clone()).collect();
        let outcome = h
            .orchestrator
            .complete_mission(&mission.mission_id, &ids)
            .await
            .unwrap();

        assert_eq!(outcome.mission.status, MissionStatus::Completed);
        assert_eq!(outcome.results.len(), 3);
        for (user, result) in users.iter().zip(&outcome.results) {
            assert!(result.success);
            assert!(!result.mission_badge.as_ref().unwrap().success);
            let stored = h.store.get_user(&user.user_id).await.unwrap().unwrap();
            assert_eq!(stored.points, user.points + 1);
        }

        // Every failed mint attempt is still audited
        let txs = h.store.transactions();
        assert!(txs.iter().all(|t| t.status == TransactionStatus::Failed));
    }

    // Exhaustiveness: only accepted applications produce result entries
    #[tokio::test]
    async fn non_accepted_participants_are_skipped() {
        let h = harness(MockLedger::new());
        let org = add_org(&h, false).await;
        let mission = add_mission(&h, &org, 60, 0.0, false).await;

        let accepted = add_user(&h, "ada", 0, false).await;
        accept(&h, &mission, &accepted).await;

        let pending = add_user(&h, "ben", 0, false).await;
        let app = ApplicationDoc::new(mission.mission_id.clone(), pending.user_id.clone(), None);
        h.store.insert_application(app).await.unwrap();

        let stranger = add_user(&h, "eve", 0, false).await;

        let ids = vec![
            accepted.user_id.clone(),
            pending.user_id.clone(),
            stranger.user_id.clone(),
        ];
        let outcome = h
            .orchestrator
            .complete_mission(&mission.mission_id, &ids)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].participant_id, accepted.user_id);

        // Skipped users earned nothing
        let stored = h.store.get_user(&pending.user_id).await.unwrap().unwrap();
        assert_eq!(stored.points, 0);
    }

    #[tokio::test]
    async fn completing_twice_conflicts() {
        let h = harness(MockLedger::new());
        let org = add_org(&h, false).await;
        let mission = add_mission(&h, &org, 60, 0.0, false).await;

        h.orchestrator
            .complete_mission(&mission.mission_id, &[])
            .await
            .unwrap();
        let err = h
            .orchestrator
            .complete_mission(&mission.mission_id, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn missing_wallets_skip_the_payment_leg() {
        let h = harness(MockLedger::new());
        let org = add_org(&h, true).await;
        let mission = add_mission(&h, &org, 60, 10.0, false).await;
        // Participant has no wallet
        let user = add_user(&h, "ada", 0, false).await;
        accept(&h, &mission, &user).await;

        let outcome = h
            .orchestrator
            .complete_mission(&mission.mission_id, &[user.user_id.clone()])
            .await
            .unwrap();

        assert!(outcome.results[0].payment.is_none());
        assert_eq!(h.ledger.transfer_count(), 0);
    }

    #[tokio::test]
    async fn successful_payment_is_audited_with_ledger_ref() {
        let h = harness(MockLedger::new());
        let org = add_org(&h, true).await;
        let mission = add_mission(&h, &org, 60, 25.0, false).await;
        let user = add_user(&h, "ada", 0, true).await;
        accept(&h, &mission, &user).await;

        let outcome = h
            .orchestrator
            .complete_mission(&mission.mission_id, &[user.user_id.clone()])
            .await
            .unwrap();

        let payment = outcome.results[0].payment.as_ref().unwrap();
        assert!(payment.success);
        assert_eq!(payment.amount_xrp, 25.0);

        let txs = h.store.transactions();
        let payment_tx = txs
            .iter()
            .find(|t| t.tx_type == TransactionType::RewardPayment)
            .unwrap();
        assert_eq!(payment_tx.status, TransactionStatus::Completed);
        assert_eq!(payment_tx.amount, 25.0);
        assert!(payment_tx.ledger_ref.is_some());
        assert_eq!(payment_tx.from_user_id.as_deref(), Some(org.user_id.as_str()));
    }
}
