// src/review/mod.rs
// Review session controller: thin orchestration that walks a human
// reviewer through queued candidate pairs in priority order and drives
// the merge engine on approval. Approvals are applied in presentation
// order; a pair whose records changed underneath it is re-scored, never
// blindly executed.

use log::{info, warn};
use std::sync::Arc;
use thiserror::Error;

use crate::classify::classify;
use crate::config::DedupeConfig;
use crate::matching::{score_pair, MatchingError};
use crate::merge::{MergeEngine, MergeError};
use crate::models::{
    Actor, CandidatePair, DecisionTier, EntityId, MergeDecision, MergeProposal, PairKey,
    PairStatus,
};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum ReviewError {
    #[error("no pending pair {0}")]
    UnknownPair(PairKey),
    #[error("pair {0} is not in a reviewable state")]
    NotPending(PairKey),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Matching(#[from] MatchingError),
}

/// One queued pair plus the reviewer-controlled primary designation.
/// Primary defaults to the lexically-first id; `swap_primary` flips it.
#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub pair: CandidatePair,
    pub primary_id: EntityId,
}

impl ReviewItem {
    fn new(pair: CandidatePair) -> Self {
        let primary_id = pair.key.id_1.clone();
        Self { pair, primary_id }
    }

    pub fn secondary_id(&self) -> EntityId {
        self.pair
            .key
            .other(&self.primary_id)
            .cloned()
            .unwrap_or_else(|| self.pair.key.id_2.clone())
    }
}

/// What an approval actually did.
#[derive(Debug)]
pub enum ApproveOutcome {
    Merged(MergeDecision),
    /// The records changed since classification (an earlier merge
    /// consumed one side); the pair was re-scored and no longer
    /// qualifies for review.
    RescoredBelowThreshold { new_tier: DecisionTier },
}

pub struct ReviewSession {
    store: Arc<dyn RecordStore>,
    engine: Arc<MergeEngine>,
    config: DedupeConfig,
    queue: Vec<ReviewItem>,
    resolved: Vec<CandidatePair>,
}

impl ReviewSession {
    pub fn new(store: Arc<dyn RecordStore>, engine: Arc<MergeEngine>, config: DedupeConfig) -> Self {
        Self {
            store,
            engine,
            config,
            queue: Vec::new(),
            resolved: Vec::new(),
        }
    }

    /// Queue a pair for review. Higher combined confidence sorts first;
    /// ties break on the pair key for a stable presentation order.
    pub fn push(&mut self, pair: CandidatePair) {
        self.queue.push(ReviewItem::new(pair));
        self.queue.sort_by(|a, b| {
            let ca = a.pair.combined_confidence.unwrap_or(0.0);
            let cb = b.pair.combined_confidence.unwrap_or(0.0);
            cb.partial_cmp(&ca)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.pair.key.cmp(&b.pair.key))
        });
    }

    pub fn pending(&self) -> &[ReviewItem] {
        &self.queue
    }

    pub fn resolved(&self) -> &[CandidatePair] {
        &self.resolved
    }

    fn position_of(&self, key: &PairKey) -> Result<usize, ReviewError> {
        self.queue
            .iter()
            .position(|item| &item.pair.key == key)
            .ok_or_else(|| ReviewError::UnknownPair(key.clone()))
    }

    /// Swap which side of a pair is treated as the primary record.
    pub fn swap_primary(&mut self, key: &PairKey) -> Result<&ReviewItem, ReviewError> {
        let position = self.position_of(key)?;
        let item = &mut self.queue[position];
        let other = item
            .pair
            .key
            .other(&item.primary_id)
            .cloned()
            .ok_or_else(|| ReviewError::UnknownPair(key.clone()))?;
        item.primary_id = other;
        Ok(&self.queue[position])
    }

    /// Preview the merge result for a pending pair without committing.
    pub async fn preview(&self, key: &PairKey) -> Result<MergeProposal, ReviewError> {
        let position = self.position_of(key)?;
        let item = &self.queue[position];
        Ok(self
            .engine
            .propose(&item.primary_id, &item.secondary_id())
            .await?)
    }

    /// Approve a pending pair and execute the merge. When either record
    /// was consumed by an earlier merge in this session, the pair is
    /// re-scored against the current store state first; if it no longer
    /// reaches the review band the merge is not executed.
    pub async fn approve(
        &mut self,
        key: &PairKey,
        actor: Actor,
        force: bool,
    ) -> Result<ApproveOutcome, ReviewError> {
        let position = self.position_of(key)?;
        let mut item = self.queue.remove(position);

        // Re-score when the pair's content may be stale: a record merged
        // away, or a primary that absorbed an earlier secondary.
        let primary_live = self.store.merged_into(&item.primary_id).await?.is_none();
        let secondary_live = self.store.merged_into(&item.secondary_id()).await?.is_none();
        if !primary_live || !secondary_live {
            warn!(
                "Review: pair {} touches a merged-away record, rejecting approval",
                key
            );
            item.pair.status = PairStatus::Rejected;
            self.resolved.push(item.pair.clone());
            return Ok(ApproveOutcome::RescoredBelowThreshold {
                new_tier: DecisionTier::Reject,
            });
        }

        let primary = self.store.get_entity(&item.primary_id).await?;
        let secondary = self.store.get_entity(&item.secondary_id()).await?;
        let report = score_pair(&primary, &secondary, &self.config)?;
        if report.raw_score != item.pair.similarity.raw_score {
            info!(
                "Review: pair {} re-scored {:.1} -> {:.1} against current records",
                key, item.pair.similarity.raw_score, report.raw_score
            );
            item.pair.similarity = report;
            let tier = classify(&mut item.pair, &self.config);
            if tier < DecisionTier::HumanReview {
                item.pair.status = PairStatus::Rejected;
                self.resolved.push(item.pair.clone());
                return Ok(ApproveOutcome::RescoredBelowThreshold { new_tier: tier });
            }
        }

        let proposal = self
            .engine
            .propose(&item.primary_id, &item.secondary_id())
            .await?;
        let decision = self
            .engine
            .execute(
                &proposal,
                item.pair.tier.unwrap_or(DecisionTier::HumanReview),
                item.pair.combined_confidence.unwrap_or(0.0),
                actor,
                force,
            )
            .await?;

        item.pair.status = PairStatus::MergedAfterReview;
        self.resolved.push(item.pair);
        Ok(ApproveOutcome::Merged(decision))
    }

    /// Reject a pending pair: the two records are distinct entities.
    pub fn reject(&mut self, key: &PairKey) -> Result<(), ReviewError> {
        let position = self.position_of(key)?;
        let mut item = self.queue.remove(position);
        item.pair.status = PairStatus::Rejected;
        self.resolved.push(item.pair);
        Ok(())
    }

    /// Defer a pending pair to the back of the queue for a later pass.
    pub fn defer(&mut self, key: &PairKey) -> Result<(), ReviewError> {
        let position = self.position_of(key)?;
        let mut item = self.queue.remove(position);
        item.pair.status = PairStatus::Deferred;
        self.resolved.push(item.pair);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLedger;
    use crate::models::{EntityRecord, EntityType, EntityTypeSchema};
    use crate::store::MemoryStore;

    async fn session_with(
        records: Vec<EntityRecord>,
    ) -> (Arc<MemoryStore>, Arc<AuditLedger>, ReviewSession) {
        let store = Arc::new(MemoryStore::new());
        store.seed(records).await;
        let ledger = Arc::new(AuditLedger::new());
        let config = DedupeConfig::default();
        let engine = Arc::new(MergeEngine::new(
            store.clone(),
            ledger.clone(),
            vec![
                EntityTypeSchema::default_person(),
                EntityTypeSchema::default_organization(),
            ],
            &config,
        ));
        let session = ReviewSession::new(store.clone(), engine, config);
        (store, ledger, session)
    }

    fn scored_pair(a: &EntityRecord, b: &EntityRecord, config: &DedupeConfig) -> CandidatePair {
        let report = score_pair(a, b, config).unwrap();
        let mut pair = CandidatePair::new(
            PairKey::new(a.id.clone(), b.id.clone()),
            a.entity_type,
            report,
        );
        classify(&mut pair, config);
        pair
    }

    #[tokio::test]
    async fn test_priority_order_is_confidence_descending() {
        let config = DedupeConfig::default();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "Tony Powell");
        let b = EntityRecord::new("b", EntityType::Person).with_text("name", "Anthony Powell");
        let c = EntityRecord::new("c", EntityType::Person).with_text("name", "Tony Pawel");
        let (_store, _ledger, mut session) =
            session_with(vec![a.clone(), b.clone(), c.clone()]).await;

        let weak = scored_pair(&a, &c, &config);
        let strong = scored_pair(&a, &b, &config);
        session.push(weak.clone());
        session.push(strong.clone());

        assert_eq!(session.pending()[0].pair.key, strong.key);
        assert_eq!(session.pending()[1].pair.key, weak.key);
    }

    #[tokio::test]
    async fn test_approve_merges_and_resolves() {
        let config = DedupeConfig::default();
        let a = EntityRecord::new("a", EntityType::Person)
            .with_text("name", "Tony Powell")
            .with_text("role", "Clerk");
        let b = EntityRecord::new("b", EntityType::Person).with_text("name", "Anthony Powell");
        let (store, ledger, mut session) = session_with(vec![a.clone(), b.clone()]).await;

        let pair = scored_pair(&a, &b, &config);
        let key = pair.key.clone();
        session.push(pair);

        let outcome = session
            .approve(&key, Actor::Reviewer("ops".to_string()), false)
            .await
            .unwrap();
        assert!(matches!(outcome, ApproveOutcome::Merged(_)));
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            store.merged_into(&b.id).await.unwrap(),
            Some(a.id.clone())
        );
        assert!(session.pending().is_empty());
        assert_eq!(session.resolved()[0].status, PairStatus::MergedAfterReview);
    }

    #[tokio::test]
    async fn test_swap_primary_changes_merge_direction() {
        let config = DedupeConfig::default();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "Tony Powell");
        let b = EntityRecord::new("b", EntityType::Person)
            .with_text("name", "Anthony Powell")
            .with_text("role", "Clerk");
        let (store, _ledger, mut session) = session_with(vec![a.clone(), b.clone()]).await;

        let pair = scored_pair(&a, &b, &config);
        let key = pair.key.clone();
        session.push(pair);
        session.swap_primary(&key).unwrap();

        session
            .approve(&key, Actor::Reviewer("ops".to_string()), false)
            .await
            .unwrap();
        // b became the primary; a was merged away.
        assert_eq!(store.merged_into(&a.id).await.unwrap(), Some(b.id.clone()));
    }

    #[tokio::test]
    async fn test_stale_secondary_is_not_blindly_merged() {
        let config = DedupeConfig::default();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "Tony Powell");
        let b = EntityRecord::new("b", EntityType::Person).with_text("name", "Anthony Powell");
        let c = EntityRecord::new("c", EntityType::Person).with_text("name", "Tony Powel");
        let (_store, ledger, mut session) =
            session_with(vec![a.clone(), b.clone(), c.clone()]).await;

        let first = scored_pair(&a, &b, &config);
        let second = scored_pair(&c, &b, &config);
        let first_key = first.key.clone();
        let second_key = second.key.clone();
        session.push(first);
        session.push(second);

        session
            .approve(&first_key, Actor::Reviewer("ops".to_string()), false)
            .await
            .unwrap();
        // b is now merged away; approving the second pair must not merge.
        let outcome = session
            .approve(&second_key, Actor::Reviewer("ops".to_string()), false)
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            ApproveOutcome::RescoredBelowThreshold { .. }
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_reject_and_defer_resolve_without_merging() {
        let config = DedupeConfig::default();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "Tony Powell");
        let b = EntityRecord::new("b", EntityType::Person).with_text("name", "Anthony Powell");
        let (_store, ledger, mut session) = session_with(vec![a.clone(), b.clone()]).await;

        let pair = scored_pair(&a, &b, &config);
        let key = pair.key.clone();
        session.push(pair.clone());
        session.reject(&key).unwrap();
        assert_eq!(session.resolved()[0].status, PairStatus::Rejected);

        session.push(pair);
        session.defer(&key).unwrap();
        assert_eq!(session.resolved()[1].status, PairStatus::Deferred);
        assert_eq!(ledger.len(), 0);
    }

    #[tokio::test]
    async fn test_preview_does_not_mutate() {
        let config = DedupeConfig::default();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "Tony Powell");
        let b = EntityRecord::new("b", EntityType::Person)
            .with_text("name", "Anthony Powell")
            .with_text("role", "Clerk");
        let (store, ledger, mut session) = session_with(vec![a.clone(), b.clone()]).await;

        let pair = scored_pair(&a, &b, &config);
        let key = pair.key.clone();
        session.push(pair);

        let proposal = session.preview(&key).await.unwrap();
        assert_eq!(proposal.merged.text("role"), Some("Clerk"));
        assert_eq!(ledger.len(), 0);
        assert_eq!(store.merged_into(&b.id).await.unwrap(), None);
        assert_eq!(session.pending().len(), 1);
    }
}
