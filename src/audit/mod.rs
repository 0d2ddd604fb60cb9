// src/audit/mod.rs
// Append-only ledger of merge decisions. Every decision carries full
// pre-merge snapshots of both records, so rollback restores state
// directly instead of replaying a chain of diffs. This module is the only
// place pre-merge state is ever reconstructed.

use chrono::Utc;
use log::{info, warn};
use std::sync::Mutex;
use thiserror::Error;

use crate::models::{
    Actor, AuditExportRow, DecisionId, DecisionKind, EntityId, MergeDecision,
};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("decision {0} not found in the ledger")]
    NotFound(DecisionId),
    #[error("decision {0} was already rolled back")]
    AlreadyRolledBack(DecisionId),
    #[error("decision {decision_id} is not reversible: {dependents:?} depend on its result")]
    NotReversible {
        decision_id: DecisionId,
        dependents: Vec<DecisionId>,
    },
    #[error("rollback of {0} is only valid for merge decisions")]
    NotAMerge(DecisionId),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Both records' property mappings as restored by a rollback.
#[derive(Debug, Clone)]
pub struct RestoredState {
    pub rollback_decision: MergeDecision,
    pub primary_id: EntityId,
    pub secondary_id: EntityId,
}

pub struct AuditLedger {
    decisions: Mutex<Vec<MergeDecision>>,
}

impl AuditLedger {
    pub fn new() -> Self {
        Self {
            decisions: Mutex::new(Vec::new()),
        }
    }

    /// Append a decision. Decisions are immutable once recorded;
    /// corrections enter as new decisions.
    pub fn record(&self, decision: MergeDecision) {
        info!(
            "Audit: recording {:?} decision {} for pair {} (actor {})",
            decision.kind, decision.decision_id, decision.pair, decision.actor
        );
        self.decisions.lock().expect("ledger lock").push(decision);
    }

    pub fn get(&self, decision_id: &DecisionId) -> Option<MergeDecision> {
        self.decisions
            .lock()
            .expect("ledger lock")
            .iter()
            .find(|d| &d.decision_id == decision_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.decisions.lock().expect("ledger lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pre-merge snapshots retained for a decision.
    pub fn snapshot_before(
        &self,
        decision_id: &DecisionId,
    ) -> Option<(
        std::collections::BTreeMap<String, crate::models::PropertyValue>,
        std::collections::BTreeMap<String, crate::models::PropertyValue>,
    )> {
        self.get(decision_id)
            .map(|d| (d.primary_snapshot, d.secondary_snapshot))
    }

    fn rolled_back_ids(decisions: &[MergeDecision]) -> Vec<DecisionId> {
        decisions
            .iter()
            .filter_map(|d| match &d.kind {
                DecisionKind::Rollback { of } => Some(of.clone()),
                DecisionKind::Merge => None,
            })
            .collect()
    }

    /// Later, still-standing merge decisions whose inputs included either
    /// record touched by the given decision.
    pub fn dependents_of(&self, decision_id: &DecisionId) -> Result<Vec<DecisionId>, AuditError> {
        let decisions = self.decisions.lock().expect("ledger lock");
        let position = decisions
            .iter()
            .position(|d| &d.decision_id == decision_id)
            .ok_or_else(|| AuditError::NotFound(decision_id.clone()))?;
        let target = &decisions[position];
        let rolled_back = Self::rolled_back_ids(&decisions);

        let dependents = decisions[position + 1..]
            .iter()
            .filter(|d| matches!(d.kind, DecisionKind::Merge))
            .filter(|d| !rolled_back.contains(&d.decision_id))
            .filter(|d| {
                d.pair.contains(&target.primary_id) || d.pair.contains(&target.secondary_id)
            })
            .map(|d| d.decision_id.clone())
            .collect();
        Ok(dependents)
    }

    /// Reverse one merge decision: restore both records to their
    /// snapshotted property mappings and lift the secondary's tombstone.
    /// Fails with `NotReversible` when a later decision already consumed
    /// the merged record, listing the dependents so the operator can
    /// decide whether to cascade.
    pub async fn rollback(
        &self,
        store: &dyn RecordStore,
        decision_id: &DecisionId,
        actor: Actor,
    ) -> Result<RestoredState, AuditError> {
        let target = {
            let decisions = self.decisions.lock().expect("ledger lock");
            let target = decisions
                .iter()
                .find(|d| &d.decision_id == decision_id)
                .cloned()
                .ok_or_else(|| AuditError::NotFound(decision_id.clone()))?;
            if Self::rolled_back_ids(&decisions).contains(decision_id) {
                return Err(AuditError::AlreadyRolledBack(decision_id.clone()));
            }
            target
        };
        if !matches!(target.kind, DecisionKind::Merge) {
            return Err(AuditError::NotAMerge(decision_id.clone()));
        }

        let dependents = self.dependents_of(decision_id)?;
        if !dependents.is_empty() {
            warn!(
                "Audit: rollback of {} blocked by {} dependent decision(s)",
                decision_id,
                dependents.len()
            );
            return Err(AuditError::NotReversible {
                decision_id: decision_id.clone(),
                dependents,
            });
        }

        // Snapshot the merged state into the rollback decision before
        // touching the store, keeping the ledger self-contained.
        let merged_primary = store.get_entity(&target.primary_id).await?;
        let merged_secondary = store.get_entity(&target.secondary_id).await?;

        store.unmark_merged(&target.secondary_id).await?;
        store
            .update_entity(&target.primary_id, target.primary_snapshot.clone())
            .await?;
        store
            .update_entity(&target.secondary_id, target.secondary_snapshot.clone())
            .await?;

        let rollback_decision = MergeDecision {
            decision_id: DecisionId::generate(),
            kind: DecisionKind::Rollback {
                of: decision_id.clone(),
            },
            pair: target.pair.clone(),
            primary_id: target.primary_id.clone(),
            secondary_id: target.secondary_id.clone(),
            tier: target.tier,
            confidence_score: target.confidence_score,
            conflicts: Vec::new(),
            forced: false,
            actor,
            timestamp: Utc::now(),
            primary_snapshot: merged_primary.properties,
            secondary_snapshot: merged_secondary.properties,
        };
        self.record(rollback_decision.clone());

        info!(
            "Audit: rolled back decision {} restoring {} and {}",
            decision_id, target.primary_id, target.secondary_id
        );
        Ok(RestoredState {
            rollback_decision,
            primary_id: target.primary_id,
            secondary_id: target.secondary_id,
        })
    }

    /// Full decision history in chronological order, flattened for
    /// offline review.
    pub fn export(&self) -> Vec<AuditExportRow> {
        self.decisions
            .lock()
            .expect("ledger lock")
            .iter()
            .map(AuditExportRow::from)
            .collect()
    }

    /// One JSON object per line, chronological.
    pub fn export_jsonl(&self) -> anyhow::Result<String> {
        let rows = self.export();
        let mut out = String::new();
        for row in rows {
            out.push_str(&serde_json::to_string(&row)?);
            out.push('\n');
        }
        Ok(out)
    }
}

impl Default for AuditLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DecisionTier, EntityRecord, EntityType, PairKey};
    use crate::store::MemoryStore;

    fn decision_for(primary: &EntityRecord, secondary: &EntityRecord) -> MergeDecision {
        MergeDecision {
            decision_id: DecisionId::generate(),
            kind: DecisionKind::Merge,
            pair: PairKey::new(primary.id.clone(), secondary.id.clone()),
            primary_id: primary.id.clone(),
            secondary_id: secondary.id.clone(),
            tier: DecisionTier::AutoMerge,
            confidence_score: 95.0,
            conflicts: Vec::new(),
            forced: false,
            actor: Actor::System,
            timestamp: Utc::now(),
            primary_snapshot: primary.properties.clone(),
            secondary_snapshot: secondary.properties.clone(),
        }
    }

    #[tokio::test]
    async fn test_rollback_round_trip() {
        let store = MemoryStore::new();
        let primary = EntityRecord::new("p", EntityType::Person)
            .with_text("name", "Tony Powell")
            .with_text("phone", "555-1234");
        let secondary = EntityRecord::new("s", EntityType::Person)
            .with_text("name", "Anthony Powell")
            .with_text("role", "Clerk");
        store.seed(vec![primary.clone(), secondary.clone()]).await;

        let ledger = AuditLedger::new();
        let decision = decision_for(&primary, &secondary);
        let decision_id = decision.decision_id.clone();
        ledger.record(decision);

        // Simulate the merge's effect on the store.
        let mut merged_props = primary.properties.clone();
        merged_props.insert(
            "role".to_string(),
            crate::models::PropertyValue::Text("Clerk".to_string()),
        );
        store
            .update_entity(&primary.id, merged_props)
            .await
            .unwrap();
        store.mark_merged(&secondary.id, &primary.id).await.unwrap();

        let restored = ledger
            .rollback(&store, &decision_id, Actor::Reviewer("ops".to_string()))
            .await
            .unwrap();
        assert_eq!(restored.primary_id, primary.id);

        let primary_after = store.get_entity(&primary.id).await.unwrap();
        let secondary_after = store.get_entity(&secondary.id).await.unwrap();
        assert_eq!(primary_after.properties, primary.properties);
        assert_eq!(secondary_after.properties, secondary.properties);
        assert_eq!(store.merged_into(&secondary.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_rollback_blocked_by_dependent_decision() {
        let store = MemoryStore::new();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "A");
        let b = EntityRecord::new("b", EntityType::Person).with_text("name", "B");
        let c = EntityRecord::new("c", EntityType::Person).with_text("name", "C");
        store.seed(vec![a.clone(), b.clone(), c.clone()]).await;

        let ledger = AuditLedger::new();
        let first = decision_for(&a, &b);
        let first_id = first.decision_id.clone();
        ledger.record(first);

        // The merged record "a" is later used as primary again.
        let second = decision_for(&a, &c);
        let second_id = second.decision_id.clone();
        ledger.record(second);

        let err = ledger
            .rollback(&store, &first_id, Actor::System)
            .await
            .unwrap_err();
        match err {
            AuditError::NotReversible { dependents, .. } => {
                assert_eq!(dependents, vec![second_id]);
            }
            other => panic!("expected NotReversible, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rollback_allowed_after_dependent_rolled_back() {
        let store = MemoryStore::new();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "A");
        let b = EntityRecord::new("b", EntityType::Person).with_text("name", "B");
        let c = EntityRecord::new("c", EntityType::Person).with_text("name", "C");
        store.seed(vec![a.clone(), b.clone(), c.clone()]).await;

        let ledger = AuditLedger::new();
        let first = decision_for(&a, &b);
        let first_id = first.decision_id.clone();
        ledger.record(first);
        let second = decision_for(&a, &c);
        let second_id = second.decision_id.clone();
        ledger.record(second);

        store.mark_merged(&c.id, &a.id).await.unwrap();
        ledger
            .rollback(&store, &second_id, Actor::System)
            .await
            .unwrap();

        store.mark_merged(&b.id, &a.id).await.unwrap();
        assert!(ledger.rollback(&store, &first_id, Actor::System).await.is_ok());
    }

    #[tokio::test]
    async fn test_double_rollback_fails() {
        let store = MemoryStore::new();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "A");
        let b = EntityRecord::new("b", EntityType::Person).with_text("name", "B");
        store.seed(vec![a.clone(), b.clone()]).await;

        let ledger = AuditLedger::new();
        let decision = decision_for(&a, &b);
        let decision_id = decision.decision_id.clone();
        ledger.record(decision);
        store.mark_merged(&b.id, &a.id).await.unwrap();

        ledger.rollback(&store, &decision_id, Actor::System).await.unwrap();
        let err = ledger
            .rollback(&store, &decision_id, Actor::System)
            .await
            .unwrap_err();
        assert!(matches!(err, AuditError::AlreadyRolledBack(_)));
    }

    #[test]
    fn test_export_preserves_order_and_fields() {
        let ledger = AuditLedger::new();
        let a = EntityRecord::new("a", EntityType::Person).with_text("name", "A");
        let b = EntityRecord::new("b", EntityType::Person).with_text("name", "B");
        let decision = decision_for(&a, &b);
        let decision_id = decision.decision_id.clone();
        ledger.record(decision);

        let rows = ledger.export();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decision_id, decision_id);
        assert_eq!(rows[0].primary_id, a.id);
        assert_eq!(rows[0].tier, DecisionTier::AutoMerge);

        let jsonl = ledger.export_jsonl().unwrap();
        assert_eq!(jsonl.lines().count(), 1);
    }
}
