// src/models/matching.rs
// Candidate pair lifecycle: created by the scan pass, annotated by each
// scoring stage, terminal once a decision is recorded.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::core::{EntityId, EntityType};

/// Which field comparison produced a score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethodType {
    Name,
    Email,
    Phone,
    Organization,
}

impl MatchMethodType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethodType::Name => "name",
            MatchMethodType::Email => "email",
            MatchMethodType::Phone => "phone",
            MatchMethodType::Organization => "organization",
        }
    }
}

impl fmt::Display for MatchMethodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order-independent identity for a pair: ids are stored sorted, so
/// (A, B) and (B, A) produce the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    pub id_1: EntityId,
    pub id_2: EntityId,
}

impl PairKey {
    pub fn new(a: EntityId, b: EntityId) -> Self {
        if a.0 <= b.0 {
            Self { id_1: a, id_2: b }
        } else {
            Self { id_1: b, id_2: a }
        }
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        &self.id_1 == id || &self.id_2 == id
    }

    pub fn other(&self, id: &EntityId) -> Option<&EntityId> {
        if &self.id_1 == id {
            Some(&self.id_2)
        } else if &self.id_2 == id {
            Some(&self.id_1)
        } else {
            None
        }
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.id_1, self.id_2)
    }
}

/// Per-field scoring detail attached to a similarity report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedField {
    pub field: String,
    pub score: f64,
    pub method: MatchMethodType,
}

/// Output of the similarity scorer for one pair. Raw score is 0-100.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityReport {
    pub raw_score: f64,
    pub matched_fields: Vec<MatchedField>,
    /// Set when fewer comparable fields than the minimum existed on both
    /// sides. Such pairs pin to the Reject tier downstream.
    pub insufficient_data: bool,
}

impl SimilarityReport {
    pub fn insufficient() -> Self {
        Self {
            raw_score: 0.0,
            matched_fields: Vec::new(),
            insufficient_data: true,
        }
    }
}

/// Structured judgment returned by a scoring oracle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiJudgment {
    pub confidence_score: f64,
    pub is_match: bool,
    pub reasoning: String,
    pub evidence: Vec<String>,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
}

/// Confidence tier assigned by the classifier. Ordering is meaningful:
/// Reject < HumanReview < AiReview < AutoMerge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTier {
    Reject,
    HumanReview,
    AiReview,
    AutoMerge,
}

impl DecisionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionTier::Reject => "reject",
            DecisionTier::HumanReview => "human_review",
            DecisionTier::AiReview => "ai_review",
            DecisionTier::AutoMerge => "auto_merge",
        }
    }
}

impl fmt::Display for DecisionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a candidate pair. Terminal states record the
/// decision taken; a terminal pair is never re-processed in a later run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStatus {
    Scored,
    AutoMerged,
    MergedAfterReview,
    Rejected,
    Deferred,
}

impl PairStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PairStatus::Scored)
    }
}

/// A candidate duplicate pair moving through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatePair {
    pub key: PairKey,
    pub entity_type: EntityType,
    pub similarity: SimilarityReport,
    pub graph_delta: Option<f64>,
    pub ai_judgment: Option<AiJudgment>,
    /// Set when the oracle was wanted but unavailable; tiering treats the
    /// pair more conservatively.
    pub ai_unreviewed: bool,
    pub combined_confidence: Option<f64>,
    pub tier: Option<DecisionTier>,
    pub status: PairStatus,
}

impl CandidatePair {
    pub fn new(key: PairKey, entity_type: EntityType, similarity: SimilarityReport) -> Self {
        Self {
            key,
            entity_type,
            similarity,
            graph_delta: None,
            ai_judgment: None,
            ai_unreviewed: false,
            combined_confidence: None,
            tier: None,
            status: PairStatus::Scored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pair_key_is_order_independent() {
        let ab = PairKey::new(EntityId::new("a"), EntityId::new("b"));
        let ba = PairKey::new(EntityId::new("b"), EntityId::new("a"));
        assert_eq!(ab, ba);
        assert_eq!(ab.id_1.as_str(), "a");
    }

    #[test]
    fn test_pair_key_other_side() {
        let key = PairKey::new(EntityId::new("x"), EntityId::new("y"));
        assert_eq!(key.other(&EntityId::new("x")), Some(&EntityId::new("y")));
        assert_eq!(key.other(&EntityId::new("z")), None);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(DecisionTier::AutoMerge > DecisionTier::AiReview);
        assert!(DecisionTier::AiReview > DecisionTier::HumanReview);
        assert!(DecisionTier::HumanReview > DecisionTier::Reject);
    }
}
