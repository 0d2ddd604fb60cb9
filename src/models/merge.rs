// src/models/merge.rs
// Merge proposals, field conflicts, and the immutable decision record the
// audit ledger owns.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use super::core::{EntityId, EntityRecord, PropertyValue};
use super::matching::{DecisionTier, PairKey};

/// How a conflicting scalar pair was judged.
///
/// Compatible means the two values normalize to the same thing (a phone
/// formatted two ways); divergent means they are plainly different data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    Compatible,
    Divergent,
}

/// A field present with differing values on both sides of a merge. The
/// primary value is kept; the secondary value is preserved here, never
/// silently discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConflict {
    pub field: String,
    pub primary_value: PropertyValue,
    pub secondary_value: PropertyValue,
    pub kind: ConflictKind,
}

/// Computed merge result awaiting approval. `is_safe` is false when any
/// conflict is divergent; execution then requires an explicit force by a
/// human actor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeProposal {
    pub primary_id: EntityId,
    pub secondary_id: EntityId,
    pub merged: EntityRecord,
    pub conflicts: Vec<FieldConflict>,
    pub is_safe: bool,
}

impl MergeProposal {
    pub fn divergent_conflicts(&self) -> impl Iterator<Item = &FieldConflict> {
        self.conflicts
            .iter()
            .filter(|c| c.kind == ConflictKind::Divergent)
    }
}

/// Acting principal behind a decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    System,
    Reviewer(String),
}

impl Actor {
    pub fn is_human(&self) -> bool {
        matches!(self, Actor::Reviewer(_))
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Actor::System => write!(f, "system"),
            Actor::Reviewer(id) => write!(f, "reviewer:{}", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionKind {
    Merge,
    Rollback { of: DecisionId },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DecisionId(pub String);

impl DecisionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for DecisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable record of one executed merge (or rollback). Corrections are
/// new decisions, never edits. Snapshots are full pre-merge property
/// mappings of both records, not diffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeDecision {
    pub decision_id: DecisionId,
    pub kind: DecisionKind,
    pub pair: PairKey,
    pub primary_id: EntityId,
    pub secondary_id: EntityId,
    pub tier: DecisionTier,
    pub confidence_score: f64,
    pub conflicts: Vec<FieldConflict>,
    /// True when a human actor force-approved an unsafe proposal.
    pub forced: bool,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
    pub primary_snapshot: BTreeMap<String, PropertyValue>,
    pub secondary_snapshot: BTreeMap<String, PropertyValue>,
}

/// One row of the audit export, flattened for offline review.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditExportRow {
    pub decision_id: DecisionId,
    pub kind: DecisionKind,
    pub pair_id_1: EntityId,
    pub pair_id_2: EntityId,
    pub primary_id: EntityId,
    pub tier: DecisionTier,
    pub confidence_score: f64,
    pub conflict_count: usize,
    pub conflicts: Vec<FieldConflict>,
    pub forced: bool,
    pub actor: Actor,
    pub timestamp: DateTime<Utc>,
}

impl From<&MergeDecision> for AuditExportRow {
    fn from(decision: &MergeDecision) -> Self {
        Self {
            decision_id: decision.decision_id.clone(),
            kind: decision.kind.clone(),
            pair_id_1: decision.pair.id_1.clone(),
            pair_id_2: decision.pair.id_2.clone(),
            primary_id: decision.primary_id.clone(),
            tier: decision.tier,
            confidence_score: decision.confidence_score,
            conflict_count: decision.conflicts.len(),
            conflicts: decision.conflicts.clone(),
            forced: decision.forced,
            actor: decision.actor.clone(),
            timestamp: decision.timestamp,
        }
    }
}
