// src/main.rs
// Batch pipeline runner: loads a record snapshot, scans each entity type,
// auto-merges the high-confidence tier, and leaves the rest queued for
// the review CLI.

use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;

use dedupe_lib::ai::{oracle_from_env, AiScorer};
use dedupe_lib::audit::AuditLedger;
use dedupe_lib::config::DedupeConfig;
use dedupe_lib::merge::MergeEngine;
use dedupe_lib::models::{EntityRecord, EntityType, EntityTypeSchema};
use dedupe_lib::pipeline::DedupePipeline;
use dedupe_lib::store::MemoryStore;
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::progress::ProgressConfig;

async fn load_snapshot(store: &MemoryStore) -> Result<usize> {
    let path = std::env::var("DEDUPE_INPUT")
        .context("DEDUPE_INPUT must point at a JSON array of entity records")?;
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read record snapshot from {}", path))?;
    let records: Vec<EntityRecord> =
        serde_json::from_str(&raw).context("Failed to parse record snapshot")?;
    let count = records.len();
    store.seed(records).await;
    Ok(count)
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting entity deduplication pipeline");
    load_env();

    let config = DedupeConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;
    config.log_config();

    let progress_config = ProgressConfig::from_env();
    let multi_progress = progress_config.create_multi_progress();

    let store = Arc::new(MemoryStore::new());
    let loaded = load_snapshot(&store).await?;
    info!("Loaded {} records into the working store", loaded);

    let oracle = oracle_from_env(&config)?;
    let ledger = Arc::new(AuditLedger::new());
    let engine = Arc::new(MergeEngine::new(
        store.clone(),
        ledger.clone(),
        vec![
            EntityTypeSchema::default_person(),
            EntityTypeSchema::default_organization(),
            EntityTypeSchema::default_event(),
        ],
        &config,
    ));
    let scorer = AiScorer::new(oracle, &config);
    let pipeline = DedupePipeline::new(store.clone(), engine, scorer, config);

    let mut total_queued = 0;
    for entity_type in [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Event,
    ] {
        let outcome = pipeline
            .run(entity_type, multi_progress.clone())
            .await
            .with_context(|| format!("{} scan failed", entity_type))?;
        total_queued += outcome.review_queue.len();
        info!(
            "{}: {} entities, {} pairs, {} auto-merged, {} queued for review, {} rejected",
            entity_type,
            outcome.stats.entities_loaded,
            outcome.stats.pairs_generated,
            outcome.stats.auto_merged,
            outcome.stats.queued_for_review,
            outcome.stats.rejected,
        );
        if outcome.stats.merge_errors > 0 {
            warn!(
                "{}: {} merge(s) failed; see log for pair identifiers",
                entity_type, outcome.stats.merge_errors
            );
        }
    }

    if let Ok(export_path) = std::env::var("DEDUPE_AUDIT_EXPORT") {
        let jsonl = ledger.export_jsonl()?;
        tokio::fs::write(&export_path, jsonl)
            .await
            .with_context(|| format!("Failed to write audit export to {}", export_path))?;
        info!(
            "Wrote {} audit record(s) to {}",
            ledger.len(),
            export_path
        );
    }

    info!(
        "Pipeline complete: {} decision(s) recorded, {} pair(s) awaiting review",
        ledger.len(),
        total_queued
    );
    Ok(())
}
