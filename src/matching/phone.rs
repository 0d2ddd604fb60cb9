// src/matching/phone.rs

use log::debug;

use crate::models::{EntityRecord, MatchMethodType, MatchedField};

/// Normalize a phone number by:
/// - Removing all non-numeric characters
/// - Stripping a leading US country code ('1' on an 11-digit number)
/// - Returning an empty string when the digit count falls outside typical
///   lengths, so implausible values never participate in matching.
pub fn normalize_phone(phone: &str) -> String {
    let digits_only: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits_only.len() == 11 && digits_only.starts_with('1') {
        return digits_only[1..].to_string();
    }

    if digits_only.len() >= 7 && digits_only.len() <= 15 {
        return digits_only;
    }

    debug!(
        "Phone number '{}' normalized to '{}', which is considered invalid for matching.",
        phone, digits_only
    );
    String::new()
}

fn phone_of(record: &EntityRecord) -> Option<String> {
    let normalized = normalize_phone(record.text("phone")?);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Exact normalized equality scores 100, anything else 0. None when either
/// side carries no usable number.
pub fn score_phones(a: &EntityRecord, b: &EntityRecord) -> Option<MatchedField> {
    let phone_a = phone_of(a)?;
    let phone_b = phone_of(b)?;
    Some(MatchedField {
        field: "phone".to_string(),
        score: if phone_a == phone_b { 100.0 } else { 0.0 },
        method: MatchMethodType::Phone,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EntityType;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("555-123-4567"), "5551234567");
        assert_eq!(normalize_phone("(555) 123 4567"), "5551234567");
        assert_eq!(normalize_phone("1-555-123-4567"), "5551234567");
        assert_eq!(normalize_phone("5551234"), "5551234");
        assert_eq!(normalize_phone("123"), "");
        assert_eq!(normalize_phone("not a phone"), "");
    }

    #[test]
    fn test_formatting_variants_match() {
        let a = EntityRecord::new("a", EntityType::Person).with_text("phone", "555-1234");
        let b = EntityRecord::new("b", EntityType::Person).with_text("phone", "5551234");
        let field = score_phones(&a, &b).unwrap();
        assert_eq!(field.score, 100.0);
    }

    #[test]
    fn test_missing_phone_excluded() {
        let a = EntityRecord::new("a", EntityType::Person).with_text("phone", "555-1234");
        let b = EntityRecord::new("b", EntityType::Person);
        assert!(score_phones(&a, &b).is_none());
    }
}
