// src/merge/mod.rs
// Merge engine: computes field-by-field merge proposals and executes
// approved ones. This is the only component that mutates entity records,
// and only under an approved decision.

use chrono::Utc;
use log::{info, warn};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex as AsyncMutex;

use crate::audit::AuditLedger;
use crate::config::DedupeConfig;
use crate::matching::email::normalize_email;
use crate::matching::name::{score_name_strings, PHONETIC_SCORE};
use crate::matching::organization::{score_org_strings, INITIALISM_SCORE};
use crate::matching::phone::normalize_phone;
use crate::models::{
    Actor, ConflictKind, DecisionId, DecisionKind, DecisionTier, EntityId, EntityRecord,
    EntityType, EntityTypeSchema, FieldConflict, MergeDecision, MergeProposal, PairKey,
    PropertyKind, PropertyValue,
};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot merge a record into itself: {0}")]
    IdenticalRecords(EntityId),
    #[error("cannot merge records of different types: {primary} vs {secondary}")]
    TypeMismatch {
        primary: EntityType,
        secondary: EntityType,
    },
    #[error("record {id} was already merged into {merged_into}")]
    AlreadyMerged { id: EntityId, merged_into: EntityId },
    #[error("field '{field}' ({kind:?}) is not part of the {entity_type} schema")]
    SchemaViolation {
        field: String,
        kind: PropertyKind,
        entity_type: EntityType,
    },
    #[error("merge is unsafe: {0} divergent conflict(s); requires force approval by a human reviewer")]
    UnsafeMerge(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Normalized equality for scalar text values, field-aware: phones and
/// emails compare through their normalizers; names compare through the
/// same matchers the scorer uses, so a nickname or an initialism of the
/// kept name counts as compatible rather than divergent. Everything else
/// falls back to case- and whitespace-insensitive equality.
fn text_values_equivalent(field: &str, a: &str, b: &str, entity_type: EntityType) -> bool {
    match field {
        "phone" => {
            let (na, nb) = (normalize_phone(a), normalize_phone(b));
            !na.is_empty() && na == nb
        }
        "email" => {
            let (na, nb) = (normalize_email(a), normalize_email(b));
            !na.is_empty() && na == nb
        }
        "name" => match entity_type {
            EntityType::Person => score_name_strings(a, b) >= PHONETIC_SCORE,
            _ => score_org_strings(a, b) >= INITIALISM_SCORE,
        },
        "organization" => score_org_strings(a, b) >= INITIALISM_SCORE,
        _ => {
            let collapse =
                |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
            collapse(a) == collapse(b)
        }
    }
}

fn normalized_list_key(field: &str, value: &str) -> String {
    match field {
        "email" => {
            let normalized = normalize_email(value);
            if normalized.is_empty() {
                value.trim().to_lowercase()
            } else {
                normalized
            }
        }
        "phone" => {
            let normalized = normalize_phone(value);
            if normalized.is_empty() {
                value.trim().to_lowercase()
            } else {
                normalized
            }
        }
        _ => value.trim().to_lowercase(),
    }
}

/// Union of two text lists, deduplicated by normalized value equality.
/// Primary's existing order first, then secondary-only entries.
fn union_text_lists(field: &str, primary: &[String], secondary: &[String]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for value in primary.iter().chain(secondary.iter()) {
        let key = normalized_list_key(field, value);
        if seen.insert(key) {
            out.push(value.clone());
        }
    }
    out
}

fn union_relations(primary: &[EntityId], secondary: &[EntityId]) -> Vec<EntityId> {
    let mut seen: HashSet<&EntityId> = HashSet::new();
    let mut out = Vec::new();
    for id in primary.iter().chain(secondary.iter()) {
        if seen.insert(id) {
            out.push(id.clone());
        }
    }
    out
}

fn as_list(value: &PropertyValue) -> Option<Vec<String>> {
    match value {
        PropertyValue::Text(s) => Some(vec![s.clone()]),
        PropertyValue::TextList(items) => Some(items.clone()),
        _ => None,
    }
}

fn resolve_conflicting_scalars(
    field: &str,
    primary_value: &PropertyValue,
    secondary_value: &PropertyValue,
    entity_type: EntityType,
) -> ConflictKind {
    let compatible = match (primary_value, secondary_value) {
        (PropertyValue::Text(a), PropertyValue::Text(b)) => {
            text_values_equivalent(field, a, b, entity_type)
        }
        (PropertyValue::Number(a), PropertyValue::Number(b)) => (a - b).abs() < 1e-9,
        (PropertyValue::Date(a), PropertyValue::Date(b)) => a == b,
        _ => false,
    };
    if compatible {
        ConflictKind::Compatible
    } else {
        ConflictKind::Divergent
    }
}

/// Compute the merged record for an approved pair. Pure: no I/O, no
/// mutation of the inputs.
///
/// Resolution rules per field:
/// - present only on one side: that value is kept
/// - scalar on both, equal: kept as-is
/// - scalar on both, differing: primary's value kept, secondary's
///   preserved in a FieldConflict (compatible when normalized-equal,
///   divergent otherwise)
/// - list-valued: union deduplicated by normalized equality
/// - relation-valued: union by identifier
pub fn propose_merge(
    primary: &EntityRecord,
    secondary: &EntityRecord,
) -> Result<MergeProposal, MergeError> {
    if primary.id == secondary.id {
        return Err(MergeError::IdenticalRecords(primary.id.clone()));
    }
    if primary.entity_type != secondary.entity_type {
        return Err(MergeError::TypeMismatch {
            primary: primary.entity_type,
            secondary: secondary.entity_type,
        });
    }

    let mut merged = EntityRecord {
        id: primary.id.clone(),
        entity_type: primary.entity_type,
        properties: BTreeMap::new(),
    };
    let mut conflicts = Vec::new();

    let field_names: Vec<&String> = {
        let mut names: Vec<&String> = primary
            .properties
            .keys()
            .chain(secondary.properties.keys())
            .collect();
        names.sort();
        names.dedup();
        names
    };

    for field in field_names {
        let resolved = match (primary.properties.get(field), secondary.properties.get(field)) {
            (Some(p), None) => p.clone(),
            (None, Some(s)) => s.clone(),
            (Some(p), Some(s)) => match (p, s) {
                (PropertyValue::Relations(pr), PropertyValue::Relations(sr)) => {
                    PropertyValue::Relations(union_relations(pr, sr))
                }
                (PropertyValue::TextList(_), _) | (_, PropertyValue::TextList(_)) => {
                    match (as_list(p), as_list(s)) {
                        (Some(pl), Some(sl)) => {
                            PropertyValue::TextList(union_text_lists(field, &pl, &sl))
                        }
                        _ => {
                            conflicts.push(FieldConflict {
                                field: field.clone(),
                                primary_value: p.clone(),
                                secondary_value: s.clone(),
                                kind: ConflictKind::Divergent,
                            });
                            p.clone()
                        }
                    }
                }
                _ if p == s => p.clone(),
                _ => {
                    let kind = resolve_conflicting_scalars(field, p, s, primary.entity_type);
                    conflicts.push(FieldConflict {
                        field: field.clone(),
                        primary_value: p.clone(),
                        secondary_value: s.clone(),
                        kind,
                    });
                    p.clone()
                }
            },
            (None, None) => continue,
        };
        merged.properties.insert(field.clone(), resolved);
    }

    let is_safe = !conflicts.iter().any(|c| c.kind == ConflictKind::Divergent);
    Ok(MergeProposal {
        primary_id: primary.id.clone(),
        secondary_id: secondary.id.clone(),
        merged,
        conflicts,
        is_safe,
    })
}

/// Serializes writes per record id and drives proposals through the
/// store and the audit ledger.
pub struct MergeEngine {
    store: Arc<dyn RecordStore>,
    ledger: Arc<AuditLedger>,
    schemas: HashMap<EntityType, EntityTypeSchema>,
    record_locks: std::sync::Mutex<HashMap<EntityId, Arc<AsyncMutex<()>>>>,
    store_timeout: Duration,
}

impl MergeEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        ledger: Arc<AuditLedger>,
        schemas: Vec<EntityTypeSchema>,
        config: &DedupeConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            schemas: schemas.into_iter().map(|s| (s.entity_type, s)).collect(),
            record_locks: std::sync::Mutex::new(HashMap::new()),
            store_timeout: Duration::from_secs(config.store_timeout_secs),
        }
    }

    fn lock_for(&self, id: &EntityId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.record_locks.lock().expect("record lock registry");
        locks
            .entry(id.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.store_timeout, fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    async fn ensure_not_merged(&self, id: &EntityId) -> Result<(), MergeError> {
        if let Some(merged_into) = self.with_timeout(self.store.merged_into(id)).await? {
            return Err(MergeError::AlreadyMerged {
                id: id.clone(),
                merged_into,
            });
        }
        Ok(())
    }

    fn validate_schema(&self, record: &EntityRecord) -> Result<(), MergeError> {
        let Some(schema) = self.schemas.get(&record.entity_type) else {
            return Ok(());
        };
        for (field, value) in &record.properties {
            if !schema.allows(field, value.kind()) {
                return Err(MergeError::SchemaViolation {
                    field: field.clone(),
                    kind: value.kind(),
                    entity_type: record.entity_type,
                });
            }
        }
        Ok(())
    }

    /// Fetch both records and compute a proposal. Refuses records that
    /// were already merged away; that is the re-merge guard.
    pub async fn propose(
        &self,
        primary_id: &EntityId,
        secondary_id: &EntityId,
    ) -> Result<MergeProposal, MergeError> {
        self.ensure_not_merged(primary_id).await?;
        self.ensure_not_merged(secondary_id).await?;
        let primary = self.with_timeout(self.store.get_entity(primary_id)).await?;
        let secondary = self.with_timeout(self.store.get_entity(secondary_id)).await?;
        propose_merge(&primary, &secondary)
    }

    /// Execute an approved proposal. Atomic from the caller's
    /// perspective: either the merged record is written and the secondary
    /// tombstoned, or the primary is restored and an error surfaces.
    ///
    /// Unsafe proposals execute only when `force` is set by a human
    /// actor; the decision records the force.
    pub async fn execute(
        &self,
        proposal: &MergeProposal,
        tier: DecisionTier,
        confidence_score: f64,
        actor: Actor,
        force: bool,
    ) -> Result<MergeDecision, MergeError> {
        let forced = !proposal.is_safe;
        if forced && !(force && actor.is_human()) {
            warn!(
                "Merge: refusing unsafe merge of {} into {} ({} divergent conflicts)",
                proposal.secondary_id,
                proposal.primary_id,
                proposal.divergent_conflicts().count()
            );
            return Err(MergeError::UnsafeMerge(
                proposal.divergent_conflicts().count(),
            ));
        }
        self.validate_schema(&proposal.merged)?;

        // Single-writer discipline: take both record locks in id order.
        let (first_id, second_id) = if proposal.primary_id <= proposal.secondary_id {
            (&proposal.primary_id, &proposal.secondary_id)
        } else {
            (&proposal.secondary_id, &proposal.primary_id)
        };
        let first_lock = self.lock_for(first_id);
        let second_lock = self.lock_for(second_id);
        let _first_guard = first_lock.lock().await;
        let _second_guard = second_lock.lock().await;

        // Re-check under the locks: a concurrent merge may have consumed
        // either side since the proposal was computed.
        self.ensure_not_merged(&proposal.primary_id).await?;
        self.ensure_not_merged(&proposal.secondary_id).await?;

        let primary_before = self
            .with_timeout(self.store.get_entity(&proposal.primary_id))
            .await?;
        let secondary_before = self
            .with_timeout(self.store.get_entity(&proposal.secondary_id))
            .await?;

        self.with_timeout(
            self.store
                .update_entity(&proposal.primary_id, proposal.merged.properties.clone()),
        )
        .await?;

        if let Err(e) = self
            .with_timeout(
                self.store
                    .mark_merged(&proposal.secondary_id, &proposal.primary_id),
            )
            .await
        {
            // Roll the primary back so no partial write stays visible.
            if let Err(restore_err) = self
                .with_timeout(
                    self.store
                        .update_entity(&proposal.primary_id, primary_before.properties.clone()),
                )
                .await
            {
                warn!(
                    "Merge: failed to restore primary {} after aborted merge: {}",
                    proposal.primary_id, restore_err
                );
            }
            return Err(e.into());
        }

        let decision = MergeDecision {
            decision_id: DecisionId::generate(),
            kind: DecisionKind::Merge,
            pair: PairKey::new(proposal.primary_id.clone(), proposal.secondary_id.clone()),
            primary_id: proposal.primary_id.clone(),
            secondary_id: proposal.secondary_id.clone(),
            tier,
            confidence_score,
            conflicts: proposal.conflicts.clone(),
            forced,
            actor,
            timestamp: Utc::now(),
            primary_snapshot: primary_before.properties,
            secondary_snapshot: secondary_before.properties,
        };
        self.ledger.record(decision.clone());
        info!(
            "Merge: executed {} into {} (tier {}, confidence {:.1}{})",
            decision.secondary_id,
            decision.primary_id,
            decision.tier,
            decision.confidence_score,
            if decision.forced { ", forced" } else { "" }
        );
        Ok(decision)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: &str) -> EntityRecord {
        EntityRecord::new(id, EntityType::Person)
    }

    #[test]
    fn test_fill_gaps_from_secondary() {
        let primary = person("p").with_text("name", "Tony Powell");
        let secondary = person("s")
            .with_text("name", "Tony Powell")
            .with_text("role", "Clerk");
        let proposal = propose_merge(&primary, &secondary).unwrap();
        assert!(proposal.is_safe);
        assert!(proposal.conflicts.is_empty());
        assert_eq!(proposal.merged.text("role"), Some("Clerk"));
        assert_eq!(proposal.merged.text("name"), Some("Tony Powell"));
    }

    #[test]
    fn test_email_list_union_with_overlap() {
        // Overlapping email lists merge without conflict.
        let primary = person("p").with_text_list("email", &["a@x.com"]);
        let secondary = person("s").with_text_list("email", &["a@x.com", "b@x.com"]);
        let proposal = propose_merge(&primary, &secondary).unwrap();
        assert!(proposal.conflicts.is_empty());
        assert_eq!(
            proposal.merged.text_list("email").unwrap(),
            &["a@x.com".to_string(), "b@x.com".to_string()]
        );
    }

    #[test]
    fn test_normalized_equal_phones_are_compatible() {
        // Differently formatted but numerically identical numbers.
        let primary = person("p").with_text("phone", "555-1234");
        let secondary = person("s").with_text("phone", "5551234");
        let proposal = propose_merge(&primary, &secondary).unwrap();
        assert!(proposal.is_safe);
        assert_eq!(proposal.conflicts.len(), 1);
        assert_eq!(proposal.conflicts[0].kind, ConflictKind::Compatible);
        assert_eq!(proposal.merged.text("phone"), Some("555-1234"));
    }

    #[test]
    fn test_nickname_name_conflict_is_compatible() {
        let primary = person("p").with_text("name", "Tony Powell");
        let secondary = person("s").with_text("name", "Anthony Powell");
        let proposal = propose_merge(&primary, &secondary).unwrap();
        assert!(proposal.is_safe);
        assert_eq!(proposal.conflicts.len(), 1);
        assert_eq!(proposal.conflicts[0].kind, ConflictKind::Compatible);
        assert_eq!(proposal.merged.text("name"), Some("Tony Powell"));
    }

    #[test]
    fn test_unrelated_names_conflict_is_divergent() {
        let record_a = EntityRecord::new("p", EntityType::Organization)
            .with_text("name", "Nassau Council");
        let record_b = EntityRecord::new("s", EntityType::Organization)
            .with_text("name", "Pemberton Bakery");
        let proposal = propose_merge(&record_a, &record_b).unwrap();
        assert!(!proposal.is_safe);
        assert_eq!(proposal.conflicts[0].kind, ConflictKind::Divergent);
    }

    #[test]
    fn test_divergent_emails_block_safety() {
        // Two different addresses with nothing else overlapping.
        let primary = person("p").with_text("email", "a@x.com");
        let secondary = person("s").with_text("email", "b@y.com");
        let proposal = propose_merge(&primary, &secondary).unwrap();
        assert!(!proposal.is_safe);
        assert_eq!(proposal.conflicts.len(), 1);
        assert_eq!(proposal.conflicts[0].kind, ConflictKind::Divergent);
        // Primary's value is kept, secondary's preserved in the conflict.
        assert_eq!(proposal.merged.text("email"), Some("a@x.com"));
        assert_eq!(
            proposal.conflicts[0].secondary_value,
            PropertyValue::Text("b@y.com".to_string())
        );
    }

    #[test]
    fn test_scalar_and_list_email_union() {
        let primary = person("p").with_text("email", "a@x.com");
        let secondary = person("s").with_text_list("email", &["A+old@x.com", "b@x.com"]);
        let proposal = propose_merge(&primary, &secondary).unwrap();
        assert!(proposal.conflicts.is_empty());
        // a@x.com and A+old@x.com normalize identically; one entry kept.
        assert_eq!(
            proposal.merged.text_list("email").unwrap(),
            &["a@x.com".to_string(), "b@x.com".to_string()]
        );
    }

    #[test]
    fn test_relation_union_keeps_both_references() {
        let primary = person("p").with_relations("organizations", &["o1", "o2"]);
        let secondary = person("s").with_relations("organizations", &["o2", "o3"]);
        let proposal = propose_merge(&primary, &secondary).unwrap();
        let relations = proposal.merged.relations("organizations").unwrap();
        let ids: Vec<&str> = relations.iter().map(|r| r.as_str()).collect();
        assert_eq!(ids, vec!["o1", "o2", "o3"]);
    }

    #[test]
    fn test_no_silent_data_loss() {
        let primary = person("p")
            .with_text("name", "Tony Powell")
            .with_text("phone", "555-0000")
            .with_text_list("email", &["t@x.com"]);
        let secondary = person("s")
            .with_text("name", "Anthony Powell")
            .with_text("phone", "555-9999")
            .with_text("role", "Clerk")
            .with_relations("events", &["e1"]);
        let proposal = propose_merge(&primary, &secondary).unwrap();

        for field in primary.properties.keys().chain(secondary.properties.keys()) {
            let in_merged = proposal.merged.properties.contains_key(field);
            let in_conflicts = proposal.conflicts.iter().any(|c| &c.field == field);
            assert!(
                in_merged || in_conflicts,
                "field '{}' lost by the merge",
                field
            );
        }
    }

    #[test]
    fn test_empty_string_is_a_real_value_not_a_gap() {
        let primary = person("p").with_text("notes", "");
        let secondary = person("s").with_text("notes", "met at conference");
        let proposal = propose_merge(&primary, &secondary).unwrap();
        // Primary's empty string is an actual value: conflict, not fill.
        assert_eq!(proposal.merged.text("notes"), Some(""));
        assert_eq!(proposal.conflicts.len(), 1);
    }

    #[test]
    fn test_self_merge_rejected() {
        let record = person("p").with_text("name", "Tony");
        assert!(matches!(
            propose_merge(&record, &record),
            Err(MergeError::IdenticalRecords(_))
        ));
    }

    mod engine {
        use super::*;
        use crate::store::MemoryStore;

        async fn engine_with(
            records: Vec<EntityRecord>,
        ) -> (Arc<MemoryStore>, Arc<AuditLedger>, MergeEngine) {
            let store = Arc::new(MemoryStore::new());
            store.seed(records).await;
            let ledger = Arc::new(AuditLedger::new());
            let engine = MergeEngine::new(
                store.clone(),
                ledger.clone(),
                vec![
                    EntityTypeSchema::default_person(),
                    EntityTypeSchema::default_organization(),
                ],
                &DedupeConfig::default(),
            );
            (store, ledger, engine)
        }

        #[tokio::test]
        async fn test_execute_writes_and_tombstones() {
            let primary = person("p").with_text("name", "Tony Powell");
            let secondary = person("s")
                .with_text("name", "Anthony Powell")
                .with_text("role", "Clerk");
            let (store, ledger, engine) = engine_with(vec![primary.clone(), secondary.clone()]).await;

            let proposal = engine.propose(&primary.id, &secondary.id).await.unwrap();
            let decision = engine
                .execute(&proposal, DecisionTier::AutoMerge, 95.0, Actor::System, false)
                .await
                .unwrap();

            let merged = store.get_entity(&primary.id).await.unwrap();
            assert_eq!(merged.text("role"), Some("Clerk"));
            assert_eq!(
                store.merged_into(&secondary.id).await.unwrap(),
                Some(primary.id.clone())
            );
            assert_eq!(ledger.len(), 1);
            assert_eq!(decision.primary_snapshot, primary.properties);
            assert_eq!(decision.secondary_snapshot, secondary.properties);
        }

        #[tokio::test]
        async fn test_unsafe_merge_blocked_without_force() {
            let primary = person("p").with_text("email", "a@x.com");
            let secondary = person("s").with_text("email", "b@y.com");
            let (_store, _ledger, engine) = engine_with(vec![primary.clone(), secondary.clone()]).await;

            let proposal = engine.propose(&primary.id, &secondary.id).await.unwrap();
            assert!(!proposal.is_safe);

            let err = engine
                .execute(&proposal, DecisionTier::HumanReview, 60.0, Actor::System, false)
                .await
                .unwrap_err();
            assert!(matches!(err, MergeError::UnsafeMerge(_)));

            // System actors cannot force either.
            let err = engine
                .execute(&proposal, DecisionTier::HumanReview, 60.0, Actor::System, true)
                .await
                .unwrap_err();
            assert!(matches!(err, MergeError::UnsafeMerge(_)));
        }

        #[tokio::test]
        async fn test_human_force_records_forced_flag() {
            let primary = person("p").with_text("email", "a@x.com");
            let secondary = person("s").with_text("email", "b@y.com");
            let (_store, ledger, engine) = engine_with(vec![primary.clone(), secondary.clone()]).await;

            let proposal = engine.propose(&primary.id, &secondary.id).await.unwrap();
            let decision = engine
                .execute(
                    &proposal,
                    DecisionTier::HumanReview,
                    60.0,
                    Actor::Reviewer("ops".to_string()),
                    true,
                )
                .await
                .unwrap();
            assert!(decision.forced);
            assert_eq!(ledger.len(), 1);
        }

        #[tokio::test]
        async fn test_schema_violation_surfaces_before_write() {
            let mut primary = person("p").with_text("name", "Tony");
            primary.properties.insert(
                "favorite_color".to_string(),
                PropertyValue::Text("teal".to_string()),
            );
            let secondary = person("s").with_text("name", "Tony");
            let (store, _ledger, engine) = engine_with(vec![primary.clone(), secondary.clone()]).await;

            let proposal = engine.propose(&primary.id, &secondary.id).await.unwrap();
            let err = engine
                .execute(&proposal, DecisionTier::AutoMerge, 95.0, Actor::System, false)
                .await
                .unwrap_err();
            assert!(matches!(err, MergeError::SchemaViolation { .. }));
            // Nothing was written: the secondary is still live.
            assert_eq!(store.merged_into(&secondary.id).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_merged_away_secondary_cannot_merge_again() {
            let a = person("a").with_text("name", "Tony");
            let b = person("b").with_text("name", "Tony");
            let c = person("c").with_text("name", "Tony");
            let (_store, _ledger, engine) = engine_with(vec![a.clone(), b.clone(), c.clone()]).await;

            let proposal = engine.propose(&a.id, &b.id).await.unwrap();
            engine
                .execute(&proposal, DecisionTier::AutoMerge, 95.0, Actor::System, false)
                .await
                .unwrap();

            // b is tombstoned: proposing with it on either side fails.
            let err = engine.propose(&b.id, &c.id).await.unwrap_err();
            assert!(matches!(err, MergeError::AlreadyMerged { .. }));
            let err = engine.propose(&c.id, &b.id).await.unwrap_err();
            assert!(matches!(err, MergeError::AlreadyMerged { .. }));
        }
    }
}
