use std::collections::HashSet;
use std::time::Duration;

use crate::store::{Campaign, CampaignStore, StoreError};
use crate::x_api::InteractionSource;

/// Unconditional pause between campaigns within one pass, to stay under the
/// external service's rate ceiling.
pub const CAMPAIGN_PACING: Duration = Duration::from_secs(60);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub external_calls: usize,
    pub newly_completed: usize,
}

/// Runs one verification pass over every campaign, newest first. A failure on
/// a single campaign is logged and skipped; it never aborts the pass.
pub async fn run_verification_pass(
    store: &CampaignStore,
    source: &dyn InteractionSource,
    pacing: Duration,
) -> Result<PassReport, StoreError> {
    let campaigns = store.all_campaigns().await?;
    if campaigns.is_empty() {
        log::info!("No active raids to verify");
        return Ok(PassReport::default());
    }

    let mut report = PassReport::default();
    for (i, campaign) in campaigns.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(pacing).await;
        }
        if campaign.handle.is_empty() {
            log::warn!("Skipping raid {} with no target account", campaign.id);
            continue;
        }
        let result = source.interacting_handles(campaign).await;
        report.external_calls += 1;
        let interacting = match result {
            Ok(interacting) => interacting,
            Err(err) => {
                log::warn!("Skipping raid {} this pass: {err}", campaign.id);
                continue;
            }
        };
        match verify_campaign(store, campaign, &interacting).await {
            Ok(completed) => report.newly_completed += completed,
            Err(err) => log::error!("Error verifying raid {}: {err}", campaign.id),
        }
    }
    log::info!(
        "Proof verification completed, {} external calls made, {} participants completed",
        report.external_calls,
        report.newly_completed
    );
    Ok(report)
}

async fn verify_campaign(
    store: &CampaignStore,
    campaign: &Campaign,
    interacting: &HashSet<String>,
) -> Result<usize, StoreError> {
    let mut completed = 0;
    for participant in store.pending_participants(campaign.id).await? {
        if !interacting.contains(&participant.handle.to_lowercase()) {
            continue;
        }
        // The status flip must be durable before the proof row exists.
        if store.mark_completed(participant.id).await? {
            store
                .record_proof(
                    campaign.id,
                    participant.user_id,
                    &participant.handle,
                    &format!("Completed {}", campaign.action),
                )
                .await?;
            completed += 1;
            log::info!(
                "@{} completed the action for raid {}",
                participant.handle,
                campaign.id
            );
        }
    }
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use guardbot_common::utils::store::Database;

    use super::*;
    use crate::store::{ActionKind, NewCampaign, ParticipantStatus, StoreError};
    use crate::x_api::VerificationSourceError;

    struct StubSource {
        handles: HashSet<String>,
    }

    impl StubSource {
        fn with(handles: &[&str]) -> Self {
            Self {
                handles: handles.iter().map(|h| h.to_lowercase()).collect(),
            }
        }
    }

    #[async_trait]
    impl InteractionSource for StubSource {
        async fn interacting_handles(
            &self,
            _campaign: &Campaign,
        ) -> Result<HashSet<String>, VerificationSourceError> {
            Ok(self.handles.clone())
        }
    }

    /// Fails for one campaign id, answers for all others.
    struct PartiallyFailingSource {
        failing_campaign: i64,
        handles: HashSet<String>,
    }

    #[async_trait]
    impl InteractionSource for PartiallyFailingSource {
        async fn interacting_handles(
            &self,
            campaign: &Campaign,
        ) -> Result<HashSet<String>, VerificationSourceError> {
            if campaign.id == self.failing_campaign {
                Err(VerificationSourceError::NoData)
            } else {
                Ok(self.handles.clone())
            }
        }
    }

    async fn store_with_follow_campaign() -> (CampaignStore, i64) {
        let store = CampaignStore::new(Database::in_memory().unwrap())
            .await
            .unwrap();
        let id = store
            .create_campaign(NewCampaign {
                name: "R1".to_string(),
                description: "desc".to_string(),
                handle: "acct".to_string(),
                tweet_id: None,
                action: ActionKind::Follow,
                created_by: 1,
            })
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn completes_participants_found_in_the_response() {
        let (store, id) = store_with_follow_campaign().await;
        assert_eq!(id, 1);
        store.join(id, 42, "alice").await.unwrap();
        assert!(matches!(
            store.join(id, 42, "alice").await,
            Err(StoreError::AlreadyJoined)
        ));
        store.join(id, 43, "bob").await.unwrap();

        let source = StubSource::with(&["Alice", "carol"]);
        let report = run_verification_pass(&store, &source, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(report.external_calls, 1);
        assert_eq!(report.newly_completed, 1);

        let (_, participants) = store.campaign_status(id).await.unwrap();
        let alice = participants.iter().find(|p| p.user_id == 42).unwrap();
        let bob = participants.iter().find(|p| p.user_id == 43).unwrap();
        assert_eq!(alice.status, ParticipantStatus::Completed);
        assert_eq!(bob.status, ParticipantStatus::Pending);

        let (_, proofs) = store.proofs(id).await.unwrap();
        assert_eq!(proofs.len(), 1);
        assert_eq!(proofs[0].proof, "Completed follow");
        assert_eq!(proofs[0].user_id, 42);
    }

    #[tokio::test]
    async fn rerunning_a_pass_writes_no_additional_proofs() {
        let (store, id) = store_with_follow_campaign().await;
        store.join(id, 42, "alice").await.unwrap();

        let source = StubSource::with(&["alice"]);
        run_verification_pass(&store, &source, Duration::ZERO)
            .await
            .unwrap();
        let report = run_verification_pass(&store, &source, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(report.newly_completed, 0);
        assert_eq!(store.proof_count(id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn one_failing_campaign_does_not_abort_the_pass() {
        let (store, first) = store_with_follow_campaign().await;
        store.join(first, 42, "alice").await.unwrap();
        let second = store
            .create_campaign(NewCampaign {
                name: "R2".to_string(),
                description: "desc".to_string(),
                handle: "other".to_string(),
                tweet_id: None,
                action: ActionKind::Follow,
                created_by: 1,
            })
            .await
            .unwrap();
        store.join(second, 43, "bob").await.unwrap();

        // Campaigns are processed newest first, so the failing one comes
        // before the one that must still be verified.
        let source = PartiallyFailingSource {
            failing_campaign: second,
            handles: ["alice".to_string(), "bob".to_string()].into(),
        };
        let report = run_verification_pass(&store, &source, Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(report.newly_completed, 1);
        assert_eq!(store.proof_count(first).await.unwrap(), 1);
        assert_eq!(store.proof_count(second).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn matching_is_case_insensitive() {
        let (store, id) = store_with_follow_campaign().await;
        store.join(id, 42, "AliceInChains").await.unwrap();

        let source = StubSource::with(&["ALICEINCHAINS"]);
        let report = run_verification_pass(&store, &source, Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(report.newly_completed, 1);
    }
}
