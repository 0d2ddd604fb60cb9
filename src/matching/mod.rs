// src/matching/mod.rs
// Similarity scorer: a pure function of two records' properties. No I/O.

pub mod email;
pub mod name;
pub mod organization;
pub mod phone;

use log::debug;
use strsim::jaro_winkler;
use thiserror::Error;

use crate::config::DedupeConfig;
use crate::models::{
    EntityRecord, EntityType, MatchMethodType, MatchedField, SimilarityReport,
};

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("cannot score records of different types: {a} vs {b}")]
    TypeMismatch { a: EntityType, b: EntityType },
}

fn field_weight(field: &MatchedField, config: &DedupeConfig) -> f64 {
    match field.method {
        MatchMethodType::Name => config.weights.name,
        MatchMethodType::Email => config.weights.email,
        MatchMethodType::Phone => config.weights.phone,
        MatchMethodType::Organization => config.weights.organization,
    }
}

fn location_field(a: &EntityRecord, b: &EntityRecord) -> Option<MatchedField> {
    let loc_a = a.text("location")?;
    let loc_b = b.text("location")?;
    if loc_a.trim().is_empty() || loc_b.trim().is_empty() {
        return None;
    }
    let score = jaro_winkler(&loc_a.to_lowercase(), &loc_b.to_lowercase()) * 85.0;
    Some(MatchedField {
        field: "location".to_string(),
        score,
        method: MatchMethodType::Organization,
    })
}

fn comparable_fields(a: &EntityRecord, b: &EntityRecord) -> Vec<MatchedField> {
    let mut fields = Vec::new();
    match a.entity_type {
        EntityType::Person => {
            if let Some(f) = name::score_names(a, b) {
                fields.push(f);
            }
            if let Some(f) = email::score_emails(a, b) {
                fields.push(f);
            }
            if let Some(f) = phone::score_phones(a, b) {
                fields.push(f);
            }
            if let Some(f) = organization::score_affiliations(a, b) {
                fields.push(f);
            }
        }
        EntityType::Organization => {
            if let Some(f) = organization::score_org_names(a, b) {
                fields.push(f);
            }
            if let Some(f) = email::score_emails(a, b) {
                fields.push(f);
            }
            if let Some(f) = phone::score_phones(a, b) {
                fields.push(f);
            }
        }
        EntityType::Event => {
            if let Some(f) = organization::score_org_names(a, b) {
                fields.push(f);
            }
            if let Some(f) = location_field(a, b) {
                fields.push(f);
            }
        }
    }
    fields
}

/// Score a same-type pair of records. Fields absent on either side are
/// excluded from the weighted average, never scored as zero; a pair with
/// no comparable field at all comes back flagged insufficient rather than
/// defaulting to some score.
pub fn score_pair(
    a: &EntityRecord,
    b: &EntityRecord,
    config: &DedupeConfig,
) -> Result<SimilarityReport, MatchingError> {
    if a.entity_type != b.entity_type {
        return Err(MatchingError::TypeMismatch {
            a: a.entity_type,
            b: b.entity_type,
        });
    }

    let matched_fields = comparable_fields(a, b);
    if matched_fields.is_empty() {
        debug!(
            "Similarity: pair ({}, {}) has no comparable fields, flagging insufficient data",
            a.id, b.id
        );
        return Ok(SimilarityReport::insufficient());
    }

    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for field in &matched_fields {
        let weight = field_weight(field, config);
        weighted_sum += field.score * weight;
        weight_total += weight;
    }
    let mut raw_score = if weight_total > 0.0 {
        weighted_sum / weight_total
    } else {
        0.0
    };

    // A single exact contact-field match is a strong independent signal:
    // it floors the raw score no matter how the names compared.
    let strong_contact_match = matched_fields.iter().any(|f| {
        matches!(f.method, MatchMethodType::Email | MatchMethodType::Phone) && f.score >= 100.0
    });
    if strong_contact_match {
        raw_score = raw_score.max(config.strong_signal_floor);
    }

    Ok(SimilarityReport {
        raw_score: raw_score.clamp(0.0, 100.0),
        matched_fields,
        insufficient_data: false,
    })
}
