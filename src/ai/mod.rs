// src/ai/mod.rs
// Scoring oracle seam. The pipeline depends only on the request/response
// shape here, never on a specific vendor's API. Results are cached by the
// pair content signature so repeated runs over unchanged data skip the
// external call entirely.

pub mod http;
pub mod stub;

use async_trait::async_trait;
use log::{debug, info, warn};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::DedupeConfig;
use crate::models::{AiJudgment, EntityRecord, EntityType};
use crate::signature::pair_signature;

/// Wire shape of a scoring request. Provider adapters serialize this as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    pub entity_a: EntityRecord,
    pub entity_b: EntityRecord,
    pub entity_type: EntityType,
    pub context: String,
}

/// Failures surfaced by an oracle. There is deliberately no variant that
/// carries a default score: an unavailable oracle degrades the pair, it
/// never fabricates a judgment.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("scoring request timed out after {0:?}")]
    Timeout(Duration),
    #[error("provider error ({status}): {message}")]
    Provider {
        status: u16,
        message: String,
        retryable: bool,
    },
    #[error("provider quota exhausted")]
    QuotaExhausted,
    #[error("provider authentication failed")]
    Auth,
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
    #[error("transport failure: {0}")]
    Transport(String),
}

impl ScoringError {
    /// Worth another attempt with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            ScoringError::Timeout(_) | ScoringError::Transport(_) => true,
            ScoringError::Provider { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Persistent quota/auth failure: fail fast for the whole batch
    /// rather than retrying pair by pair.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(self, ScoringError::QuotaExhausted | ScoringError::Auth)
    }
}

#[async_trait]
pub trait ScoringOracle: Send + Sync {
    async fn analyze(&self, request: &OracleRequest) -> Result<AiJudgment, ScoringError>;

    fn name(&self) -> &'static str;
}

fn validate_judgment(judgment: AiJudgment) -> Result<AiJudgment, ScoringError> {
    if !judgment.confidence_score.is_finite() {
        return Err(ScoringError::MalformedResponse(
            "confidence score is not a finite number".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&judgment.confidence_score) {
        return Err(ScoringError::MalformedResponse(format!(
            "confidence score {} outside 0-100",
            judgment.confidence_score
        )));
    }
    Ok(judgment)
}

/// Rate-limited, retrying, caching front for a scoring oracle.
pub struct AiScorer {
    oracle: Arc<dyn ScoringOracle>,
    cache: Mutex<LruCache<String, AiJudgment>>,
    cache_hits: AtomicUsize,
    calls_made: AtomicUsize,
    max_attempts: u32,
    backoff: Duration,
    call_timeout: Duration,
}

impl AiScorer {
    pub fn new(oracle: Arc<dyn ScoringOracle>, config: &DedupeConfig) -> Self {
        let capacity = NonZeroUsize::new(config.ai_cache_size.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            oracle,
            cache: Mutex::new(LruCache::new(capacity)),
            cache_hits: AtomicUsize::new(0),
            calls_made: AtomicUsize::new(0),
            max_attempts: config.oracle_max_attempts.max(1),
            backoff: Duration::from_millis(config.oracle_backoff_ms),
            call_timeout: Duration::from_secs(config.oracle_timeout_secs),
        }
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn calls_made(&self) -> usize {
        self.calls_made.load(Ordering::Relaxed)
    }

    /// Analyze one pair, cache-first. Transient failures are retried with
    /// exponential backoff up to the configured attempt count; quota and
    /// auth failures surface immediately.
    pub async fn analyze_pair(
        &self,
        a: &EntityRecord,
        b: &EntityRecord,
        context: &str,
    ) -> Result<AiJudgment, ScoringError> {
        let cache_key = pair_signature(a, b);
        {
            let mut cache = self.cache.lock().await;
            if let Some(judgment) = cache.get(&cache_key) {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                debug!("AI: cache hit for pair ({}, {})", a.id, b.id);
                return Ok(judgment.clone());
            }
        }

        let request = OracleRequest {
            entity_a: a.clone(),
            entity_b: b.clone(),
            entity_type: a.entity_type,
            context: context.to_string(),
        };

        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            self.calls_made.fetch_add(1, Ordering::Relaxed);
            let outcome = tokio::time::timeout(self.call_timeout, self.oracle.analyze(&request))
                .await
                .unwrap_or(Err(ScoringError::Timeout(self.call_timeout)));

            match outcome {
                Ok(judgment) => {
                    let judgment = validate_judgment(judgment)?;
                    let mut cache = self.cache.lock().await;
                    cache.put(cache_key, judgment.clone());
                    return Ok(judgment);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff * 2u32.pow(attempt - 1);
                    warn!(
                        "AI: attempt {}/{} for pair ({}, {}) failed ({}), retrying in {:?}",
                        attempt, self.max_attempts, a.id, b.id, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| ScoringError::Transport("retries exhausted".to_string())))
    }
}

/// Select the oracle implementation from configuration. `DEDUPE_ORACLE`
/// chooses `http` (default when an endpoint is configured) or `stub`.
pub fn oracle_from_env(config: &DedupeConfig) -> anyhow::Result<Arc<dyn ScoringOracle>> {
    let choice = std::env::var("DEDUPE_ORACLE").unwrap_or_else(|_| {
        if std::env::var("DEDUPE_ORACLE_URL").is_ok() {
            "http".to_string()
        } else {
            "stub".to_string()
        }
    });
    let oracle: Arc<dyn ScoringOracle> = match choice.as_str() {
        "http" => Arc::new(http::HttpScoringOracle::from_env(config)?),
        "stub" => Arc::new(stub::StubOracle::new()),
        other => anyhow::bail!("unknown oracle implementation '{}'", other),
    };
    info!("Scoring oracle selected: {}", oracle.name());
    Ok(oracle)
}
