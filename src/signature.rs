// src/signature.rs
// Stable content signatures over entity records. The AI judgment cache and
// the pipeline's comparison checkpoint are both keyed by the pair
// signature, so repeated runs over unchanged data skip re-work.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::models::{EntityRecord, PairKey, PropertyValue};

/// Hashes a long text field instead of embedding it, keeping signatures
/// short and stable for fields like notes and transcripts.
fn fold_long_text(text: &str) -> String {
    if text.len() > 100 {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    } else {
        text.to_string()
    }
}

fn component_of(value: &PropertyValue) -> String {
    match value {
        PropertyValue::Text(s) => fold_long_text(s),
        PropertyValue::Date(d) => d.to_string(),
        PropertyValue::Number(n) => format!("{:.6}", n),
        PropertyValue::TextList(items) => {
            let mut sorted: Vec<String> = items.iter().map(|s| fold_long_text(s)).collect();
            sorted.sort();
            sorted.join("|")
        }
        PropertyValue::Relations(ids) => {
            let mut sorted: Vec<&str> = ids.iter().map(|id| id.as_str()).collect();
            sorted.sort();
            sorted.join("|")
        }
    }
}

/// Signature of a single record's property content. Insensitive to map
/// iteration order (BTreeMap) and to list ordering within a property.
pub fn record_signature(record: &EntityRecord) -> String {
    let mut components = BTreeMap::new();
    components.insert("__type".to_string(), record.entity_type.as_str().to_string());
    for (name, value) in &record.properties {
        components.insert(name.clone(), component_of(value));
    }

    let mut hasher = Sha256::new();
    for (key, value) in components {
        hasher.update(format!("{}:{}", key, value).as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Signature of a pair's combined content, order-independent: the two
/// record signatures are sorted before hashing so (A, B) and (B, A)
/// produce the same key.
pub fn pair_signature(a: &EntityRecord, b: &EntityRecord) -> String {
    let mut sigs = [record_signature(a), record_signature(b)];
    sigs.sort();

    let mut hasher = Sha256::new();
    hasher.update(sigs[0].as_bytes());
    hasher.update(sigs[1].as_bytes());
    hex::encode(hasher.finalize())
}

/// Checkpoint key: the pair identity plus its content signature. A pair
/// re-enters the pipeline only when either record's content changed.
pub fn checkpoint_key(key: &PairKey, a: &EntityRecord, b: &EntityRecord) -> String {
    format!("{}|{}|{}", key.id_1, key.id_2, pair_signature(a, b))
}
