// src/matching/name.rs
// Person-name scoring: exact, nickname, phonetic, then edit-distance.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use strsim::jaro_winkler;

use crate::models::{EntityRecord, MatchMethodType, MatchedField};

pub const EXACT_NAME_SCORE: f64 = 100.0;
pub const NICKNAME_SCORE: f64 = 90.0;
pub const PHONETIC_SCORE: f64 = 85.0;
pub const EDIT_DISTANCE_CEILING: f64 = 80.0;

const HONORIFICS: [&str; 8] = ["mr", "mrs", "ms", "miss", "dr", "prof", "rev", "cllr"];
const GENERATIONAL_SUFFIXES: [&str; 6] = ["jr", "sr", "ii", "iii", "iv", "esq"];

/// Groups of given names treated as equivalent. A token may appear in more
/// than one group; every containing group is a plausible expansion and the
/// best-scoring interpretation wins.
const NICKNAME_GROUPS: [&[&str]; 24] = [
    &["anthony", "tony", "ant"],
    &["elizabeth", "liz", "beth", "betty", "eliza", "lizzie"],
    &["william", "will", "bill", "billy", "liam"],
    &["robert", "rob", "bob", "bobby", "bert"],
    &["richard", "rick", "dick", "rich", "richie"],
    &["margaret", "maggie", "meg", "peggy", "marge"],
    &["katherine", "catherine", "kate", "katie", "kathy", "cathy", "kat"],
    &["michael", "mike", "mick", "mickey"],
    &["james", "jim", "jimmy", "jamie"],
    &["john", "jack", "johnny", "jon"],
    &["jonathan", "jon", "jonny"],
    &["joseph", "joe", "joey"],
    &["thomas", "tom", "tommy"],
    &["charles", "charlie", "chuck", "chas"],
    &["christopher", "chris", "kit"],
    &["daniel", "dan", "danny"],
    &["david", "dave", "davy"],
    &["edward", "ed", "eddie", "ted", "ned"],
    &["alexander", "alex", "al", "sandy", "xander"],
    &["albert", "al", "bert", "bertie"],
    &["patricia", "pat", "patty", "trish", "tricia"],
    &["patrick", "pat", "paddy"],
    &["susan", "sue", "susie", "suzanne"],
    &["victoria", "vicky", "tori"],
];

static NAME_PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z\s]").expect("invalid name punctuation regex"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("invalid whitespace regex"));

/// Lowercase, strip punctuation, honorifics, and generational suffixes,
/// and collapse whitespace.
pub fn normalize_person_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let no_punct = NAME_PUNCTUATION.replace_all(&lowered, " ");
    let collapsed = WHITESPACE.replace_all(no_punct.trim(), " ");
    collapsed
        .split(' ')
        .filter(|token| {
            !HONORIFICS.contains(token) && !GENERATIONAL_SUFFIXES.contains(token)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn name_tokens(normalized: &str) -> Vec<&str> {
    normalized.split(' ').filter(|t| !t.is_empty()).collect()
}

/// Indices of every nickname group containing the token.
fn nickname_groups_of(token: &str) -> Vec<usize> {
    NICKNAME_GROUPS
        .iter()
        .enumerate()
        .filter(|(_, group)| group.contains(&token))
        .map(|(idx, _)| idx)
        .collect()
}

fn tokens_nickname_equivalent(a: &str, b: &str) -> bool {
    if a == b {
        return true;
    }
    let groups_a: HashSet<usize> = nickname_groups_of(a).into_iter().collect();
    if groups_a.is_empty() {
        return false;
    }
    nickname_groups_of(b).iter().any(|g| groups_a.contains(g))
}

/// Four-character Soundex code. Empty input yields an empty code.
pub fn soundex(token: &str) -> String {
    let mut chars = token
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase());
    let first = match chars.next() {
        Some(c) => c,
        None => return String::new(),
    };

    fn digit(c: char) -> Option<char> {
        match c {
            'b' | 'f' | 'p' | 'v' => Some('1'),
            'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
            'd' | 't' => Some('3'),
            'l' => Some('4'),
            'm' | 'n' => Some('5'),
            'r' => Some('6'),
            _ => None,
        }
    }

    let mut code = String::new();
    code.push(first.to_ascii_uppercase());
    let mut last_digit = digit(first);
    for c in chars {
        let d = digit(c);
        match d {
            Some(d_char) => {
                if Some(d_char) != last_digit {
                    code.push(d_char);
                    if code.len() == 4 {
                        break;
                    }
                }
            }
            None => {
                // 'h' and 'w' do not reset the previous code; vowels do.
                if c != 'h' && c != 'w' {
                    last_digit = None;
                    continue;
                }
            }
        }
        last_digit = d.or(last_digit);
    }
    while code.len() < 4 {
        code.push('0');
    }
    code
}

fn tokens_phonetically_equal(a: &str, b: &str) -> bool {
    let code_a = soundex(a);
    !code_a.is_empty() && code_a == soundex(b)
}

/// Every token of the shorter name must find a counterpart in the longer
/// one under the given equivalence. Handles middle names present on only
/// one side without penalizing the pair.
fn all_tokens_match(tokens_a: &[&str], tokens_b: &[&str], eq: impl Fn(&str, &str) -> bool) -> bool {
    let (shorter, longer) = if tokens_a.len() <= tokens_b.len() {
        (tokens_a, tokens_b)
    } else {
        (tokens_b, tokens_a)
    };
    if shorter.is_empty() {
        return false;
    }
    let mut used = vec![false; longer.len()];
    for &token in shorter {
        let mut found = false;
        for (idx, &candidate) in longer.iter().enumerate() {
            if !used[idx] && eq(token, candidate) {
                used[idx] = true;
                found = true;
                break;
            }
        }
        if !found {
            return false;
        }
    }
    true
}

/// Score two person names on the 0-100 scale described in the tier table
/// at the top of this file.
pub fn score_name_strings(name_a: &str, name_b: &str) -> f64 {
    let norm_a = normalize_person_name(name_a);
    let norm_b = normalize_person_name(name_b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return 0.0;
    }
    if norm_a == norm_b {
        return EXACT_NAME_SCORE;
    }

    let tokens_a = name_tokens(&norm_a);
    let tokens_b = name_tokens(&norm_b);

    if all_tokens_match(&tokens_a, &tokens_b, tokens_nickname_equivalent) {
        return NICKNAME_SCORE;
    }
    if all_tokens_match(&tokens_a, &tokens_b, tokens_phonetically_equal) {
        return PHONETIC_SCORE;
    }
    jaro_winkler(&norm_a, &norm_b) * EDIT_DISTANCE_CEILING
}

pub fn score_names(a: &EntityRecord, b: &EntityRecord) -> Option<MatchedField> {
    let name_a = a.text("name")?;
    let name_b = b.text("name")?;
    if name_a.trim().is_empty() || name_b.trim().is_empty() {
        return None;
    }
    Some(MatchedField {
        field: "name".to_string(),
        score: score_name_strings(name_a, name_b),
        method: MatchMethodType::Name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_honorifics_and_suffixes() {
        assert_eq!(normalize_person_name("Dr. Anthony Powell Jr."), "anthony powell");
        assert_eq!(normalize_person_name("  MRS   Jane   Doe "), "jane doe");
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(score_name_strings("Tony Powell", "tony  powell"), 100.0);
    }

    #[test]
    fn test_nickname_match() {
        assert_eq!(score_name_strings("Tony Powell", "Anthony Powell"), 90.0);
        assert_eq!(score_name_strings("Liz Smith", "Elizabeth Smith"), 90.0);
    }

    #[test]
    fn test_ambiguous_nickname_takes_best_interpretation() {
        // "al" belongs to both the alexander and albert groups; either
        // expansion should connect.
        assert_eq!(score_name_strings("Al Jones", "Alexander Jones"), 90.0);
        assert_eq!(score_name_strings("Al Jones", "Albert Jones"), 90.0);
    }

    #[test]
    fn test_soundex() {
        assert_eq!(soundex("robert"), "R163");
        assert_eq!(soundex("rupert"), "R163");
        assert_eq!(soundex("smith"), "S530");
        assert_eq!(soundex("smyth"), "S530");
    }

    #[test]
    fn test_phonetic_match() {
        assert_eq!(score_name_strings("Jon Smith", "John Smyth"), 85.0);
    }

    #[test]
    fn test_doubled_letter_typo_still_matches_phonetically() {
        assert_eq!(
            score_name_strings("Jonathan Pemberton", "Jonathan Pembertonn"),
            85.0
        );
    }

    #[test]
    fn test_typo_falls_back_to_edit_distance() {
        // "Pembleton" codes differently under Soundex, so this lands in
        // the edit-distance tier.
        let score = score_name_strings("Jonathan Pemberton", "Jonathan Pembleton");
        assert!(score > 70.0 && score <= 80.0, "got {}", score);
    }

    #[test]
    fn test_unrelated_names_score_low() {
        let score = score_name_strings("Jane Doe", "Zachary Quill");
        assert!(score < 50.0, "got {}", score);
    }

    #[test]
    fn test_symmetry() {
        let ab = score_name_strings("Tony Powell", "Anthony J. Powell");
        let ba = score_name_strings("Anthony J. Powell", "Tony Powell");
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_middle_name_on_one_side_only() {
        assert_eq!(score_name_strings("Anthony Powell", "Anthony J Powell"), 90.0);
    }
}
