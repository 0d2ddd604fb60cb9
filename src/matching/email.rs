// src/matching/email.rs

use crate::models::{EntityRecord, MatchMethodType, MatchedField};

/// Normalize an email address for comparison: trim and lowercase, drop any
/// `+tag` suffix on the local part, collapse gmail dots, and fold known
/// provider domain aliases. Returns an empty string when the input is not
/// a plausible address.
pub fn normalize_email(email: &str) -> String {
    let email_trimmed = email.trim().to_lowercase();
    if !email_trimmed.contains('@') {
        return String::new();
    }
    let parts: Vec<&str> = email_trimmed.splitn(2, '@').collect();
    if parts.len() != 2 {
        return String::new();
    }
    let (local_part_full, domain_part) = (parts[0], parts[1]);
    if domain_part.is_empty() || !domain_part.contains('.') {
        return String::new();
    }
    let local_part_no_plus = local_part_full.split('+').next().unwrap_or("").to_string();
    let final_local_part = if domain_part == "gmail.com" || domain_part == "googlemail.com" {
        local_part_no_plus.replace('.', "")
    } else {
        local_part_no_plus
    };
    let final_domain_part = match domain_part {
        "googlemail.com" => "gmail.com",
        "hotmail.com" | "live.com" => "outlook.com",
        other => other,
    };
    if final_local_part.is_empty() {
        String::new()
    } else {
        format!("{}@{}", final_local_part, final_domain_part)
    }
}

/// Every email carried by a record, normalized. The `email` property may be
/// a single text value or a list.
pub fn emails_of(record: &EntityRecord) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(single) = record.text("email") {
        let normalized = normalize_email(single);
        if !normalized.is_empty() {
            out.push(normalized);
        }
    }
    if let Some(list) = record.text_list("email") {
        for raw in list {
            let normalized = normalize_email(raw);
            if !normalized.is_empty() && !out.contains(&normalized) {
                out.push(normalized);
            }
        }
    }
    out
}

/// Exact normalized overlap on any address scores 100; no overlap scores 0.
/// Returns None when either side carries no usable address, so the field
/// drops out of the weighted average instead of counting as zero.
pub fn score_emails(a: &EntityRecord, b: &EntityRecord) -> Option<MatchedField> {
    let emails_a = emails_of(a);
    let emails_b = emails_of(b);
    if emails_a.is_empty() || emails_b.is_empty() {
        return None;
    }
    let overlap = emails_a.iter().any(|e| emails_b.contains(e));
    Some(MatchedField {
        field: "email".to_string(),
        score: if overlap { 100.0 } else { 0.0 },
        method: MatchMethodType::Email,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("user@example.com"), "user@example.com");
        assert_eq!(normalize_email("USER@EXAMPLE.COM"), "user@example.com");
        assert_eq!(normalize_email("user+tag@example.com"), "user@example.com");
        assert_eq!(normalize_email("user.name@gmail.com"), "username@gmail.com");
        assert_eq!(normalize_email("user@googlemail.com"), "user@gmail.com");
        assert_eq!(normalize_email("user@hotmail.com"), "user@outlook.com");
        assert_eq!(normalize_email("  user@example.com  "), "user@example.com");
        assert_eq!(normalize_email("invalid-email"), "");
        assert_eq!(normalize_email("@example.com"), "");
        assert_eq!(normalize_email("user@"), "");
    }

    #[test]
    fn test_score_absent_on_one_side_is_none() {
        let a = EntityRecord::new("a", EntityType::Person).with_text("email", "x@y.com");
        let b = EntityRecord::new("b", EntityType::Person);
        assert!(score_emails(&a, &b).is_none());
    }

    #[test]
    fn test_list_overlap_matches() {
        let a = EntityRecord::new("a", EntityType::Person).with_text_list("email", &["a@x.com"]);
        let b = EntityRecord::new("b", EntityType::Person)
            .with_text_list("email", &["b@x.com", "A+work@x.com"]);
        let field = score_emails(&a, &b).unwrap();
        assert_eq!(field.score, 100.0);
    }

    #[test]
    fn test_disjoint_addresses_score_zero() {
        let a = EntityRecord::new("a", EntityType::Person).with_text("email", "a@x.com");
        let b = EntityRecord::new("b", EntityType::Person).with_text("email", "b@y.com");
        let field = score_emails(&a, &b).unwrap();
        assert_eq!(field.score, 0.0);
    }
}
