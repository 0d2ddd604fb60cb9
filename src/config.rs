// src/config.rs
// One versioned configuration structure for the whole pipeline. Every
// threshold the classifier consumes lives here; changing a band is a
// config change, never a code change.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::env;

/// Tier boundaries over the combined 0-100 confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierBands {
    pub auto_merge_floor: f64,
    pub ai_review_floor: f64,
    pub human_review_floor: f64,
}

impl Default for TierBands {
    fn default() -> Self {
        Self {
            auto_merge_floor: 90.0,
            ai_review_floor: 70.0,
            human_review_floor: 50.0,
        }
    }
}

impl TierBands {
    pub fn validate(&self) -> Result<(), String> {
        if self.human_review_floor >= self.ai_review_floor
            || self.ai_review_floor >= self.auto_merge_floor
        {
            return Err(format!(
                "tier bands must be strictly increasing: human={}, ai={}, auto={}",
                self.human_review_floor, self.ai_review_floor, self.auto_merge_floor
            ));
        }
        if self.auto_merge_floor > 100.0 || self.human_review_floor < 0.0 {
            return Err("tier bands must lie within 0-100".to_string());
        }
        Ok(())
    }
}

/// Field weights for the similarity scorer's weighted average.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldWeights {
    pub name: f64,
    pub email: f64,
    pub phone: f64,
    pub organization: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            name: 0.40,
            email: 0.25,
            phone: 0.15,
            organization: 0.20,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    /// Bumped whenever a default below changes meaning.
    pub version: u32,
    pub bands: TierBands,
    pub weights: FieldWeights,

    /// Raw scores below this floor never become candidate pairs.
    pub candidate_floor: f64,
    /// A single exact email/phone match floors the raw score here,
    /// regardless of how the name compared.
    pub strong_signal_floor: f64,

    /// Raw-score band in which the oracle is consulted.
    pub ai_band_low: f64,
    pub ai_band_high: f64,
    /// When the oracle's confidence lands within this distance of the raw
    /// score, the oracle dominates the blend.
    pub ai_agreement_tolerance: f64,
    /// AI-unreviewed pairs are capped just below auto-merge.
    pub ai_unreviewed_cap: f64,

    /// Cap on the graph analyzer's positive adjustment.
    pub graph_boost_cap: f64,
    /// Cap on the downward adjustment for disjoint-cluster pairs.
    pub graph_penalty_cap: f64,
    /// Per shared direct neighbor.
    pub graph_boost_per_neighbor: f64,
    /// Same connected component, no shared neighbor.
    pub graph_community_boost: f64,

    /// Worker-pool width for the scoring stages. Sized for the oracle's
    /// rate limits, not CPU.
    pub max_concurrent_scoring: usize,
    pub oracle_timeout_secs: u64,
    pub oracle_max_attempts: u32,
    pub oracle_backoff_ms: u64,
    pub store_timeout_secs: u64,
    pub ai_cache_size: usize,
}

impl Default for DedupeConfig {
    fn default() -> Self {
        Self {
            version: 1,
            bands: TierBands::default(),
            weights: FieldWeights::default(),
            candidate_floor: 40.0,
            strong_signal_floor: 88.0,
            ai_band_low: 55.0,
            ai_band_high: 89.0,
            ai_agreement_tolerance: 25.0,
            ai_unreviewed_cap: 85.0,
            graph_boost_cap: 15.0,
            graph_penalty_cap: 10.0,
            graph_boost_per_neighbor: 5.0,
            graph_community_boost: 3.0,
            max_concurrent_scoring: 8,
            oracle_timeout_secs: 30,
            oracle_max_attempts: 3,
            oracle_backoff_ms: 500,
            store_timeout_secs: 20,
            ai_cache_size: 10_000,
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{}: could not parse '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_usize(key: &str, default: usize) -> usize {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{}: could not parse '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    match env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{}: could not parse '{}', using {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

impl DedupeConfig {
    /// Create configuration from environment variables, falling back to the
    /// documented defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let config = Self {
            version: defaults.version,
            bands: TierBands {
                auto_merge_floor: env_f64("DEDUPE_AUTO_MERGE_FLOOR", defaults.bands.auto_merge_floor),
                ai_review_floor: env_f64("DEDUPE_AI_REVIEW_FLOOR", defaults.bands.ai_review_floor),
                human_review_floor: env_f64(
                    "DEDUPE_HUMAN_REVIEW_FLOOR",
                    defaults.bands.human_review_floor,
                ),
            },
            weights: FieldWeights {
                name: env_f64("DEDUPE_WEIGHT_NAME", defaults.weights.name),
                email: env_f64("DEDUPE_WEIGHT_EMAIL", defaults.weights.email),
                phone: env_f64("DEDUPE_WEIGHT_PHONE", defaults.weights.phone),
                organization: env_f64("DEDUPE_WEIGHT_ORG", defaults.weights.organization),
            },
            candidate_floor: env_f64("DEDUPE_CANDIDATE_FLOOR", defaults.candidate_floor),
            strong_signal_floor: env_f64("DEDUPE_STRONG_SIGNAL_FLOOR", defaults.strong_signal_floor),
            ai_band_low: env_f64("DEDUPE_AI_BAND_LOW", defaults.ai_band_low),
            ai_band_high: env_f64("DEDUPE_AI_BAND_HIGH", defaults.ai_band_high),
            ai_agreement_tolerance: env_f64(
                "DEDUPE_AI_AGREEMENT_TOLERANCE",
                defaults.ai_agreement_tolerance,
            ),
            ai_unreviewed_cap: env_f64("DEDUPE_AI_UNREVIEWED_CAP", defaults.ai_unreviewed_cap),
            graph_boost_cap: env_f64("DEDUPE_GRAPH_BOOST_CAP", defaults.graph_boost_cap),
            graph_penalty_cap: env_f64("DEDUPE_GRAPH_PENALTY_CAP", defaults.graph_penalty_cap),
            graph_boost_per_neighbor: env_f64(
                "DEDUPE_GRAPH_BOOST_PER_NEIGHBOR",
                defaults.graph_boost_per_neighbor,
            ),
            graph_community_boost: env_f64(
                "DEDUPE_GRAPH_COMMUNITY_BOOST",
                defaults.graph_community_boost,
            ),
            max_concurrent_scoring: env_usize(
                "DEDUPE_MAX_CONCURRENT_SCORING",
                defaults.max_concurrent_scoring,
            ),
            oracle_timeout_secs: env_u64("DEDUPE_ORACLE_TIMEOUT_SECS", defaults.oracle_timeout_secs),
            oracle_max_attempts: env_u64("DEDUPE_ORACLE_MAX_ATTEMPTS", defaults.oracle_max_attempts as u64)
                as u32,
            oracle_backoff_ms: env_u64("DEDUPE_ORACLE_BACKOFF_MS", defaults.oracle_backoff_ms),
            store_timeout_secs: env_u64("DEDUPE_STORE_TIMEOUT_SECS", defaults.store_timeout_secs),
            ai_cache_size: env_usize("DEDUPE_AI_CACHE_SIZE", defaults.ai_cache_size),
        };
        debug!("Loaded dedupe config v{}: {:?}", config.version, config);
        config
    }

    pub fn validate(&self) -> Result<(), String> {
        self.bands.validate()?;
        if self.ai_band_high >= self.bands.auto_merge_floor + 1.0 {
            return Err(format!(
                "AI band high ({}) should not exceed the auto-merge floor ({})",
                self.ai_band_high, self.bands.auto_merge_floor
            ));
        }
        if self.max_concurrent_scoring == 0 {
            return Err("max_concurrent_scoring must be at least 1".to_string());
        }
        if self.ai_cache_size == 0 {
            return Err("ai_cache_size must be at least 1".to_string());
        }
        Ok(())
    }

    pub fn log_config(&self) {
        info!(
            "Dedupe config v{}: auto-merge >= {}, AI review >= {}, human review >= {}, reject below",
            self.version,
            self.bands.auto_merge_floor,
            self.bands.ai_review_floor,
            self.bands.human_review_floor
        );
        info!(
            "   AI band {}-{}, concurrency {}, oracle timeout {}s",
            self.ai_band_low, self.ai_band_high, self.max_concurrent_scoring, self.oracle_timeout_secs
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(DedupeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_bands_rejected() {
        let mut config = DedupeConfig::default();
        config.bands.ai_review_floor = 95.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = DedupeConfig::default();
        config.max_concurrent_scoring = 0;
        assert!(config.validate().is_err());
    }
}
