// src/classify.rs
// Match classifier: one documented combination of raw similarity, graph
// delta, and oracle confidence, then deterministic thresholding over the
// configured bands. The auto-merge floor is a hard safety invariant.

use log::debug;

use crate::config::DedupeConfig;
use crate::models::{CandidatePair, DecisionTier};

/// Weight the oracle carries when its confidence lands within the
/// agreement tolerance of the raw score.
const AI_DOMINANT_WEIGHT: f64 = 0.9;
/// Weight when the oracle and the raw score disagree beyond tolerance:
/// the two views split the difference.
const AI_DISPUTED_WEIGHT: f64 = 0.5;

/// Combine the available signals into one 0-100 confidence score.
///
/// Raw similarity plus the graph delta forms the base. When an oracle
/// judgment is present it dominates the blend if it agrees with the raw
/// score within tolerance, and splits the difference otherwise. Pairs the
/// oracle should have seen but could not (`ai_unreviewed`) are capped
/// below the auto-merge floor so they land in review instead.
pub fn combined_confidence(pair: &CandidatePair, config: &DedupeConfig) -> f64 {
    if pair.similarity.insufficient_data {
        return 0.0;
    }
    let raw = pair.similarity.raw_score;
    let base = (raw + pair.graph_delta.unwrap_or(0.0)).clamp(0.0, 100.0);

    let mut combined = match &pair.ai_judgment {
        Some(judgment) => {
            let ai = judgment.confidence_score;
            let weight = if (ai - raw).abs() <= config.ai_agreement_tolerance {
                AI_DOMINANT_WEIGHT
            } else {
                AI_DISPUTED_WEIGHT
            };
            weight * ai + (1.0 - weight) * base
        }
        None => base,
    };

    if pair.ai_unreviewed {
        combined = combined.min(config.ai_unreviewed_cap);
    }
    combined.clamp(0.0, 100.0)
}

/// Assign the decision tier for a pair and record the combined score on
/// it. Insufficient-data pairs pin to Reject regardless of configuration.
pub fn classify(pair: &mut CandidatePair, config: &DedupeConfig) -> DecisionTier {
    let tier = if pair.similarity.insufficient_data {
        pair.combined_confidence = Some(0.0);
        DecisionTier::Reject
    } else {
        let score = combined_confidence(pair, config);
        pair.combined_confidence = Some(score);
        if score >= config.bands.auto_merge_floor {
            DecisionTier::AutoMerge
        } else if score >= config.bands.ai_review_floor {
            DecisionTier::AiReview
        } else if score >= config.bands.human_review_floor {
            DecisionTier::HumanReview
        } else {
            DecisionTier::Reject
        }
    };
    pair.tier = Some(tier);
    debug!(
        "Classified pair {} as {} (confidence {:.1})",
        pair.key,
        tier,
        pair.combined_confidence.unwrap_or(0.0)
    );
    tier
}

/// Whether a pair's raw score falls in the band where the oracle is
/// consulted: not auto-merge-worthy on its own, not obviously unrelated.
pub fn in_ai_band(raw_score: f64, config: &DedupeConfig) -> bool {
    raw_score >= config.ai_band_low && raw_score <= config.ai_band_high
}
