// src/matching/organization.rs
// Organization-name scoring: legal suffixes and civic abbreviations are
// stripped or expanded before any distance comparison.

use once_cell::sync::Lazy;
use regex::Regex;
use strsim::jaro_winkler;

use crate::models::{EntityRecord, MatchMethodType, MatchedField};

pub const EXACT_ORG_SCORE: f64 = 100.0;
/// Initialism-to-expansion matches are plausible but ambiguous; this lands
/// them in the oracle band rather than auto-merge territory.
pub const INITIALISM_SCORE: f64 = 75.0;
pub const ORG_EDIT_DISTANCE_CEILING: f64 = 85.0;

const LEGAL_SUFFIXES: [&str; 18] = [
    " incorporated",
    " inc",
    " corporation",
    " corp",
    " limited liability company",
    " llc",
    " limited partnership",
    " llp",
    " lp",
    " limited",
    " ltd",
    " company",
    " co",
    " plc",
    " gmbh",
    " pty",
    " foundation",
    " trust",
];

/// Civic and organizational abbreviations folded to their expansions.
const ABBREVIATIONS: [(&str, &str); 10] = [
    (r"\bcttee\b", "committee"),
    (r"\bcmte\b", "committee"),
    (r"\bassn\b", "association"),
    (r"\bassoc\b", "association"),
    (r"\bdept\b", "department"),
    (r"\b(ctr|cntr)\b", "center"),
    (r"\b(intl|int'l)\b", "international"),
    (r"\b(natl|nat'l)\b", "national"),
    (r"\bsoc\b", "society"),
    (r"\bfedn\b", "federation"),
];

static ABBREVIATION_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    ABBREVIATIONS
        .iter()
        .map(|(pattern, replacement)| {
            (
                Regex::new(pattern).expect("invalid abbreviation regex"),
                *replacement,
            )
        })
        .collect()
});

static ORG_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9\s]").expect("invalid org punctuation regex"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

pub fn normalize_org_name(name: &str) -> String {
    let mut normalized = name.trim().to_lowercase();
    normalized = normalized.replace('&', " and ");
    normalized = ORG_PUNCTUATION.replace_all(&normalized, " ").to_string();
    normalized = WHITESPACE.replace_all(normalized.trim(), " ").to_string();

    for prefix in ["the ", "a ", "an "] {
        if let Some(stripped) = normalized.strip_prefix(prefix) {
            normalized = stripped.to_string();
        }
    }
    for suffix in LEGAL_SUFFIXES {
        if let Some(stripped) = normalized.strip_suffix(suffix) {
            normalized = stripped.trim_end().to_string();
        }
    }
    for (pattern, replacement) in ABBREVIATION_PATTERNS.iter() {
        normalized = pattern.replace_all(&normalized, *replacement).to_string();
    }
    normalized
}

fn initials_of(normalized: &str) -> String {
    normalized
        .split(' ')
        .filter_map(|token| token.chars().next())
        .collect()
}

/// True when one side is a single-token initialism of the other's words,
/// e.g. "stc" against "swanage town council".
fn is_initialism_pair(norm_a: &str, norm_b: &str) -> bool {
    let (short, long) = if norm_a.len() <= norm_b.len() {
        (norm_a, norm_b)
    } else {
        (norm_b, norm_a)
    };
    if short.contains(' ') || short.len() < 2 || !long.contains(' ') {
        return false;
    }
    short == initials_of(long)
}

pub fn score_org_strings(name_a: &str, name_b: &str) -> f64 {
    let norm_a = normalize_org_name(name_a);
    let norm_b = normalize_org_name(name_b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }
    if norm_a == norm_b {
        return EXACT_ORG_SCORE;
    }
    if is_initialism_pair(&norm_a, &norm_b) {
        return INITIALISM_SCORE;
    }
    jaro_winkler(&norm_a, &norm_b) * ORG_EDIT_DISTANCE_CEILING
}

/// Score the organization affiliation carried on person records.
pub fn score_affiliations(a: &EntityRecord, b: &EntityRecord) -> Option<MatchedField> {
    let org_a = a.text("organization")?;
    let org_b = b.text("organization")?;
    if org_a.trim().is_empty() || org_b.trim().is_empty() {
        return None;
    }
    Some(MatchedField {
        field: "organization".to_string(),
        score: score_org_strings(org_a, org_b),
        method: MatchMethodType::Organization,
    })
}

/// Score the `name` property of two organization records.
pub fn score_org_names(a: &EntityRecord, b: &EntityRecord) -> Option<MatchedField> {
    let name_a = a.text("name")?;
    let name_b = b.text("name")?;
    if name_a.trim().is_empty() || name_b.trim().is_empty() {
        return None;
    }
    Some(MatchedField {
        field: "name".to_string(),
        score: score_org_strings(name_a, name_b),
        method: MatchMethodType::Organization,
    })
}
