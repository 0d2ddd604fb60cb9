// src/pipeline.rs
// Batch scan: candidate generation, similarity scoring, graph annotation,
// oracle refinement for the ambiguous band, classification, then
// auto-merge execution and review queueing. Scoring-stage errors degrade
// the affected pair only; the scan continues.

use futures::stream::{self, StreamExt};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::ai::AiScorer;
use crate::classify::{classify, in_ai_band};
use crate::config::DedupeConfig;
use crate::graph::RelationshipGraph;
use crate::matching::email::emails_of;
use crate::matching::name::{name_tokens, normalize_person_name};
use crate::matching::organization::normalize_org_name;
use crate::matching::phone::normalize_phone;
use crate::matching::score_pair;
use crate::merge::{MergeEngine, MergeError};
use crate::models::{
    Actor, CandidatePair, DecisionTier, EntityId, EntityRecord, EntityType, PairKey, PairStatus,
};
use crate::signature::checkpoint_key;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Default, Clone)]
pub struct PipelineRunStats {
    pub entities_loaded: usize,
    pub pairs_generated: usize,
    pub pairs_skipped_checkpoint: usize,
    pub pairs_insufficient: usize,
    pub pairs_stale: usize,
    pub oracle_calls: usize,
    pub oracle_cache_hits: usize,
    pub ai_unreviewed: usize,
    pub auto_merged: usize,
    pub queued_for_review: usize,
    pub rejected: usize,
    pub merge_errors: usize,
    pub elapsed: Duration,
}

/// Outcome of one scan over one entity type. Review-tier pairs are handed
/// to the review session; everything else was decided in-run.
pub struct PipelineOutcome {
    pub stats: PipelineRunStats,
    pub review_queue: Vec<CandidatePair>,
}

enum AutoMergeResult {
    Merged,
    /// Re-scored below the auto-merge floor or unsafe; review decides.
    Requeued,
    /// One side was consumed by an earlier merge in this run.
    Stale,
}

pub struct DedupePipeline {
    store: Arc<dyn RecordStore>,
    engine: Arc<MergeEngine>,
    scorer: AiScorer,
    config: DedupeConfig,
    cancel: Arc<AtomicBool>,
    /// Terminal pairs from this and earlier runs, keyed by pair identity
    /// plus content signature. Restarting a cancelled scan skips exactly
    /// the pairs whose decisions were already recorded.
    checkpoints: std::sync::Mutex<HashSet<String>>,
}

impl DedupePipeline {
    pub fn new(
        store: Arc<dyn RecordStore>,
        engine: Arc<MergeEngine>,
        scorer: AiScorer,
        config: DedupeConfig,
    ) -> Self {
        Self {
            store,
            engine,
            scorer,
            config,
            cancel: Arc::new(AtomicBool::new(false)),
            checkpoints: std::sync::Mutex::new(HashSet::new()),
        }
    }

    /// Handle for cancelling an in-progress scan from another task.
    /// Already-recorded decisions stay intact; the run stops at the next
    /// stage boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn checkpoint_seen(&self, key: &str) -> bool {
        self.checkpoints.lock().expect("checkpoint lock").contains(key)
    }

    fn checkpoint_mark(&self, key: String) {
        self.checkpoints.lock().expect("checkpoint lock").insert(key);
    }

    /// Blocking keys for a record: normalized emails, phone, name tokens,
    /// and an acronym key so an initialism can meet its expansion. Two
    /// records share a block when any key collides, which keeps candidate
    /// generation far below the full pairwise square.
    fn blocking_keys(record: &EntityRecord) -> Vec<String> {
        let mut keys = Vec::new();
        for email in emails_of(record) {
            keys.push(format!("email:{}", email));
        }
        if let Some(phone) = record.text("phone") {
            let normalized = normalize_phone(phone);
            if !normalized.is_empty() {
                keys.push(format!("phone:{}", normalized));
            }
        }
        if let Some(name) = record.text("name") {
            let normalized = match record.entity_type {
                EntityType::Person => normalize_person_name(name),
                _ => normalize_org_name(name),
            };
            for token in name_tokens(&normalized) {
                if token.len() > 2 {
                    keys.push(format!("name:{}", token));
                }
            }
            if !normalized.contains(' ') && (2..=6).contains(&normalized.len()) {
                keys.push(format!("acronym:{}", normalized));
            } else if normalized.contains(' ') {
                let initials: String = normalized
                    .split(' ')
                    .filter_map(|t| t.chars().next())
                    .collect();
                if (2..=6).contains(&initials.len()) {
                    keys.push(format!("acronym:{}", initials));
                }
            }
        }
        keys
    }

    fn generate_candidate_keys(entities: &[EntityRecord]) -> Vec<PairKey> {
        let mut blocks: HashMap<String, Vec<&EntityRecord>> = HashMap::new();
        for record in entities {
            for key in Self::blocking_keys(record) {
                blocks.entry(key).or_default().push(record);
            }
        }

        let mut seen: HashSet<PairKey> = HashSet::new();
        let mut out = Vec::new();
        for members in blocks.values() {
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    let key = PairKey::new(members[i].id.clone(), members[j].id.clone());
                    if seen.insert(key.clone()) {
                        out.push(key);
                    }
                }
            }
        }
        out.sort();
        out
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(Duration::from_secs(self.config.store_timeout_secs), fut)
            .await
            .map_err(|_| StoreError::Timeout)?
    }

    /// Run one full scan over one entity type.
    pub async fn run(
        &self,
        entity_type: EntityType,
        multi_progress: Option<MultiProgress>,
    ) -> anyhow::Result<PipelineOutcome> {
        let start_time = Instant::now();
        let mut stats = PipelineRunStats::default();
        let oracle_calls_before = self.scorer.calls_made();
        let oracle_hits_before = self.scorer.cache_hits();

        info!("Pipeline: starting {} scan", entity_type);
        let entities = self
            .with_timeout(self.store.list_entities(entity_type))
            .await?;
        stats.entities_loaded = entities.len();
        info!("Pipeline: loaded {} {} records", entities.len(), entity_type);

        let by_id: HashMap<EntityId, &EntityRecord> =
            entities.iter().map(|e| (e.id.clone(), e)).collect();

        let candidate_keys = Self::generate_candidate_keys(&entities);
        debug!(
            "Pipeline: {} candidate pairs from blocking",
            candidate_keys.len()
        );

        let progress = multi_progress.as_ref().map(|mp| {
            let pb = mp.add(ProgressBar::new(candidate_keys.len() as u64));
            pb.set_style(
                ProgressStyle::default_bar()
                    .template(
                        "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}",
                    )
                    .unwrap()
                    .progress_chars("█▉▊▋▌▍▎▏  "),
            );
            pb.set_message(format!("Scoring {} pairs", entity_type));
            pb
        });

        // Similarity scoring: pure and read-only, no locking needed.
        let graph = RelationshipGraph::build(&entities);
        let mut scored: Vec<CandidatePair> = Vec::new();
        for key in candidate_keys {
            if self.is_cancelled() {
                info!("Pipeline: cancelled during scoring");
                break;
            }
            if let Some(pb) = &progress {
                pb.inc(1);
            }
            let (Some(a), Some(b)) = (by_id.get(&key.id_1), by_id.get(&key.id_2)) else {
                continue;
            };

            let checkpoint = checkpoint_key(&key, a, b);
            if self.checkpoint_seen(&checkpoint) {
                stats.pairs_skipped_checkpoint += 1;
                continue;
            }

            let report = match score_pair(a, b, &self.config) {
                Ok(report) => report,
                Err(e) => {
                    warn!("Pipeline: scoring failed for pair {}: {}", key, e);
                    continue;
                }
            };

            if report.insufficient_data {
                stats.pairs_insufficient += 1;
                stats.pairs_generated += 1;
                stats.rejected += 1;
                self.checkpoint_mark(checkpoint);
                continue;
            }
            if report.raw_score < self.config.candidate_floor {
                continue;
            }
            stats.pairs_generated += 1;

            let mut pair = CandidatePair::new(key.clone(), entity_type, report);
            pair.graph_delta = Some(graph.adjust(&key, pair.similarity.raw_score, &self.config));
            scored.push(pair);
        }
        if let Some(pb) = &progress {
            pb.finish_with_message("Scoring complete");
        }

        // Oracle refinement for the ambiguous band, bounded by the
        // configured concurrency (sized for provider rate limits). A
        // quota or auth failure stops further oracle calls for the whole
        // batch; affected pairs degrade to similarity+graph scoring.
        let batch_dead = AtomicBool::new(false);
        let scored: Vec<CandidatePair> = stream::iter(scored.into_iter())
            .map(|mut pair| {
                let by_id = &by_id;
                let batch_dead = &batch_dead;
                async move {
                    if !in_ai_band(pair.similarity.raw_score, &self.config) || self.is_cancelled() {
                        return pair;
                    }
                    if batch_dead.load(Ordering::Relaxed) {
                        pair.ai_unreviewed = true;
                        return pair;
                    }
                    let (Some(a), Some(b)) =
                        (by_id.get(&pair.key.id_1), by_id.get(&pair.key.id_2))
                    else {
                        return pair;
                    };
                    match self
                        .scorer
                        .analyze_pair(a, b, &format!("{} deduplication scan", pair.entity_type))
                        .await
                    {
                        Ok(judgment) => {
                            pair.ai_judgment = Some(judgment);
                        }
                        Err(e) => {
                            if e.is_batch_fatal() {
                                warn!(
                                    "Pipeline: oracle unavailable for the batch ({}), degrading remaining pairs",
                                    e
                                );
                                batch_dead.store(true, Ordering::Relaxed);
                            } else {
                                warn!("Pipeline: oracle failed for pair {} ({})", pair.key, e);
                            }
                            pair.ai_unreviewed = true;
                        }
                    }
                    pair
                }
            })
            .buffer_unordered(self.config.max_concurrent_scoring)
            .collect()
            .await;

        let mut classified: Vec<CandidatePair> = scored;
        for pair in classified.iter_mut() {
            classify(pair, &self.config);
        }

        // A graph boost can lift a pair into the oracle-review tier from
        // below the raw band; those pairs still get their oracle pass.
        for pair in classified.iter_mut() {
            if pair.tier != Some(DecisionTier::AiReview)
                || pair.ai_judgment.is_some()
                || pair.ai_unreviewed
                || self.is_cancelled()
            {
                continue;
            }
            if batch_dead.load(Ordering::Relaxed) {
                pair.ai_unreviewed = true;
                classify(pair, &self.config);
                continue;
            }
            let (Some(a), Some(b)) = (by_id.get(&pair.key.id_1), by_id.get(&pair.key.id_2))
            else {
                continue;
            };
            match self
                .scorer
                .analyze_pair(a, b, &format!("{} deduplication scan", pair.entity_type))
                .await
            {
                Ok(judgment) => {
                    pair.ai_judgment = Some(judgment);
                }
                Err(e) => {
                    if e.is_batch_fatal() {
                        batch_dead.store(true, Ordering::Relaxed);
                    }
                    pair.ai_unreviewed = true;
                }
            }
            classify(pair, &self.config);
        }

        stats.oracle_calls = self.scorer.calls_made() - oracle_calls_before;
        stats.oracle_cache_hits = self.scorer.cache_hits() - oracle_hits_before;
        for pair in classified.iter() {
            if pair.ai_unreviewed {
                stats.ai_unreviewed += 1;
            }
        }

        // Auto-merges run highest confidence first so the strongest
        // evidence wins contended records; review pairs queue for the
        // session controller.
        classified.sort_by(|a, b| {
            let ca = a.combined_confidence.unwrap_or(0.0);
            let cb = b.combined_confidence.unwrap_or(0.0);
            cb.partial_cmp(&ca)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.key.cmp(&b.key))
        });

        let mut review_queue = Vec::new();
        for mut pair in classified {
            if self.is_cancelled() {
                info!("Pipeline: cancelled before deciding pair {}", pair.key);
                break;
            }
            let tier = pair.tier.unwrap_or(DecisionTier::Reject);
            match tier {
                DecisionTier::AutoMerge => match self.auto_merge(&mut pair).await {
                    Ok(AutoMergeResult::Merged) => {
                        stats.auto_merged += 1;
                        self.mark_terminal(&pair).await;
                    }
                    Ok(AutoMergeResult::Requeued) => {
                        stats.queued_for_review += 1;
                        review_queue.push(pair);
                    }
                    Ok(AutoMergeResult::Stale) => {
                        stats.pairs_stale += 1;
                    }
                    Err(e) => {
                        stats.merge_errors += 1;
                        warn!("Pipeline: auto-merge failed for pair {}: {}", pair.key, e);
                    }
                },
                DecisionTier::AiReview | DecisionTier::HumanReview => {
                    stats.queued_for_review += 1;
                    review_queue.push(pair);
                }
                DecisionTier::Reject => {
                    pair.status = PairStatus::Rejected;
                    stats.rejected += 1;
                    self.mark_terminal(&pair).await;
                }
            }
        }

        stats.elapsed = start_time.elapsed();
        info!(
            "Pipeline: {} scan complete in {:.1}s: {} pairs, {} auto-merged, {} queued, {} rejected ({} oracle calls, {} cache hits)",
            entity_type,
            stats.elapsed.as_secs_f64(),
            stats.pairs_generated,
            stats.auto_merged,
            stats.queued_for_review,
            stats.rejected,
            stats.oracle_calls,
            stats.oracle_cache_hits,
        );
        Ok(PipelineOutcome {
            stats,
            review_queue,
        })
    }

    async fn mark_terminal(&self, pair: &CandidatePair) {
        let (Ok(a), Ok(b)) = (
            self.store.get_entity(&pair.key.id_1).await,
            self.store.get_entity(&pair.key.id_2).await,
        ) else {
            return;
        };
        self.checkpoint_mark(checkpoint_key(&pair.key, &a, &b));
    }

    /// Execute an auto-merge. The richer record becomes the primary.
    async fn auto_merge(&self, pair: &mut CandidatePair) -> Result<AutoMergeResult, MergeError> {
        let a_live = self
            .with_timeout(self.store.merged_into(&pair.key.id_1))
            .await?
            .is_none();
        let b_live = self
            .with_timeout(self.store.merged_into(&pair.key.id_2))
            .await?
            .is_none();
        if !a_live || !b_live {
            debug!(
                "Pipeline: pair {} touches a record consumed earlier in this run",
                pair.key
            );
            return Ok(AutoMergeResult::Stale);
        }

        let a = self.with_timeout(self.store.get_entity(&pair.key.id_1)).await?;
        let b = self.with_timeout(self.store.get_entity(&pair.key.id_2)).await?;

        // A primary mutated by an earlier merge in this run invalidates
        // the original classification: re-score before executing.
        let report = score_pair(&a, &b, &self.config).map_err(|_| MergeError::TypeMismatch {
            primary: a.entity_type,
            secondary: b.entity_type,
        })?;
        if report.raw_score != pair.similarity.raw_score {
            debug!(
                "Pipeline: pair {} re-scored {:.1} -> {:.1}",
                pair.key, pair.similarity.raw_score, report.raw_score
            );
            pair.similarity = report;
            let tier = classify(pair, &self.config);
            if tier != DecisionTier::AutoMerge {
                return Ok(AutoMergeResult::Requeued);
            }
        }

        let (primary, secondary) = if b.properties.len() > a.properties.len() {
            (&b, &a)
        } else {
            (&a, &b)
        };
        let proposal = self.engine.propose(&primary.id, &secondary.id).await?;
        if !proposal.is_safe {
            // Divergent conflicts block automatic execution; a human
            // reviewer decides.
            debug!(
                "Pipeline: auto-merge of pair {} is unsafe, queueing for review",
                pair.key
            );
            return Ok(AutoMergeResult::Requeued);
        }
        let decision = self
            .engine
            .execute(
                &proposal,
                DecisionTier::AutoMerge,
                pair.combined_confidence.unwrap_or(0.0),
                Actor::System,
                false,
            )
            .await?;
        debug!(
            "Pipeline: auto-merged pair {} as {}",
            pair.key, decision.decision_id
        );
        pair.status = PairStatus::AutoMerged;
        Ok(AutoMergeResult::Merged)
    }
}
