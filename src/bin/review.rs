// src/bin/review.rs
// Review session CLI: list pending pairs by priority, preview a merge,
// approve/reject/defer, or swap which side is primary. Thin surface over
// the review session controller.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use dedupe_lib::ai::{oracle_from_env, AiScorer};
use dedupe_lib::audit::AuditLedger;
use dedupe_lib::config::DedupeConfig;
use dedupe_lib::merge::MergeEngine;
use dedupe_lib::models::{
    Actor, EntityId, EntityRecord, EntityType, EntityTypeSchema, PairKey,
};
use dedupe_lib::pipeline::DedupePipeline;
use dedupe_lib::review::{ApproveOutcome, ReviewSession};
use dedupe_lib::store::MemoryStore;
use dedupe_lib::utils::env::load_env;

#[derive(Parser)]
#[command(name = "review", about = "Review queued duplicate candidates")]
struct Cli {
    /// Path to the JSON record snapshot. Falls back to DEDUPE_INPUT.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Path to write the audit export after a mutating command. Falls
    /// back to DEDUPE_AUDIT_EXPORT.
    #[arg(long)]
    audit_export: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List pending pairs in priority order.
    List,
    /// Show the merge result for a pair without committing it.
    Preview {
        /// Pair as "id1,id2".
        pair: String,
    },
    /// Approve a pair and execute the merge.
    Approve {
        pair: String,
        #[arg(long)]
        reviewer: String,
        /// Force-execute even when the proposal carries divergent
        /// conflicts. Recorded on the decision.
        #[arg(long)]
        force: bool,
    },
    /// Mark a pair as distinct entities.
    Reject { pair: String },
    /// Push a pair back for a later session.
    Defer { pair: String },
    /// Swap which side of a pair is the primary record.
    Swap { pair: String },
}

fn parse_pair(raw: &str) -> Result<PairKey> {
    let parts: Vec<&str> = raw.split(',').map(|s| s.trim()).collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
        anyhow::bail!("pair must be given as 'id1,id2', got '{}'", raw);
    }
    Ok(PairKey::new(
        EntityId::new(parts[0]),
        EntityId::new(parts[1]),
    ))
}

async fn build_session(
    input: &PathBuf,
    config: &DedupeConfig,
) -> Result<(ReviewSession, Arc<AuditLedger>)> {
    let raw = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read record snapshot from {}", input.display()))?;
    let records: Vec<EntityRecord> =
        serde_json::from_str(&raw).context("Failed to parse record snapshot")?;

    let store = Arc::new(MemoryStore::new());
    store.seed(records).await;

    let oracle = oracle_from_env(config)?;
    let ledger = Arc::new(AuditLedger::new());
    let engine = Arc::new(MergeEngine::new(
        store.clone(),
        ledger.clone(),
        vec![
            EntityTypeSchema::default_person(),
            EntityTypeSchema::default_organization(),
            EntityTypeSchema::default_event(),
        ],
        config,
    ));
    let scorer = AiScorer::new(oracle, config);
    let pipeline = DedupePipeline::new(store.clone(), engine.clone(), scorer, config.clone());

    let mut session = ReviewSession::new(store, engine, config.clone());
    for entity_type in [
        EntityType::Person,
        EntityType::Organization,
        EntityType::Event,
    ] {
        let outcome = pipeline.run(entity_type, None).await?;
        for pair in outcome.review_queue {
            session.push(pair);
        }
    }
    Ok((session, ledger))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let cli = Cli::parse();

    let config = DedupeConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    let input = cli
        .input
        .or_else(|| std::env::var("DEDUPE_INPUT").ok().map(PathBuf::from))
        .context("record snapshot path required: pass --input or set DEDUPE_INPUT")?;
    let audit_export = cli
        .audit_export
        .or_else(|| std::env::var("DEDUPE_AUDIT_EXPORT").ok().map(PathBuf::from));

    let (mut session, ledger) = build_session(&input, &config).await?;

    match cli.command {
        Command::List => {
            if session.pending().is_empty() {
                println!("No pairs pending review.");
            }
            for (index, item) in session.pending().iter().enumerate() {
                println!(
                    "{:>3}. {} tier={} confidence={:.1}{} primary={}",
                    index + 1,
                    item.pair.key,
                    item.pair
                        .tier
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "unclassified".to_string()),
                    item.pair.combined_confidence.unwrap_or(0.0),
                    if item.pair.ai_unreviewed {
                        " [ai-unreviewed]"
                    } else {
                        ""
                    },
                    item.primary_id,
                );
            }
        }
        Command::Preview { pair } => {
            let key = parse_pair(&pair)?;
            let proposal = session.preview(&key).await?;
            println!(
                "Merge {} <- {} (safe: {})",
                proposal.primary_id, proposal.secondary_id, proposal.is_safe
            );
            println!("{}", serde_json::to_string_pretty(&proposal.merged)?);
            for conflict in &proposal.conflicts {
                println!(
                    "conflict on '{}' ({:?}): keeping {:?}, secondary had {:?}",
                    conflict.field, conflict.kind, conflict.primary_value, conflict.secondary_value
                );
            }
        }
        Command::Approve {
            pair,
            reviewer,
            force,
        } => {
            let key = parse_pair(&pair)?;
            match session
                .approve(&key, Actor::Reviewer(reviewer), force)
                .await?
            {
                ApproveOutcome::Merged(decision) => {
                    println!(
                        "Merged {} into {} (decision {})",
                        decision.secondary_id, decision.primary_id, decision.decision_id
                    );
                }
                ApproveOutcome::RescoredBelowThreshold { new_tier } => {
                    println!(
                        "Pair {} no longer qualifies after re-scoring (tier {}); not merged.",
                        key, new_tier
                    );
                }
            }
        }
        Command::Reject { pair } => {
            let key = parse_pair(&pair)?;
            session.reject(&key)?;
            println!("Rejected {}.", key);
        }
        Command::Defer { pair } => {
            let key = parse_pair(&pair)?;
            session.defer(&key)?;
            println!("Deferred {}.", key);
        }
        Command::Swap { pair } => {
            let key = parse_pair(&pair)?;
            let item = session.swap_primary(&key)?;
            println!("Primary for {} is now {}.", key, item.primary_id);
        }
    }

    if let Some(export_path) = &audit_export {
        if !ledger.is_empty() {
            tokio::fs::write(export_path, ledger.export_jsonl()?)
                .await
                .with_context(|| {
                    format!("Failed to write audit export to {}", export_path.display())
                })?;
        }
    }
    Ok(())
}
