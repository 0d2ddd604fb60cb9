// src/models/core.rs
// Core entity record model: typed property bags validated against a
// per-entity-type schema loaded once at startup.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

/// Opaque identifier assigned by the record store. Immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Person,
    Organization,
    Event,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Event => "event",
        }
    }
}

impl FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(EntityType::Person),
            "organization" => Ok(EntityType::Organization),
            "event" => Ok(EntityType::Event),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tagged union of the value kinds the remote schema supports.
///
/// A property that is absent from the map is distinct from one holding an
/// empty string, and the distinction survives merging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Date(NaiveDate),
    Number(f64),
    TextList(Vec<String>),
    Relations(Vec<EntityId>),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Text(_) => PropertyKind::Text,
            PropertyValue::Date(_) => PropertyKind::Date,
            PropertyValue::Number(_) => PropertyKind::Number,
            PropertyValue::TextList(_) => PropertyKind::TextList,
            PropertyValue::Relations(_) => PropertyKind::Relations,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::TextList(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_relations(&self) -> Option<&[EntityId]> {
        match self {
            PropertyValue::Relations(ids) => Some(ids.as_slice()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Text,
    Date,
    Number,
    TextList,
    Relations,
}

/// One person/organization/event row in one of the typed collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub entity_type: EntityType,
    pub properties: BTreeMap<String, PropertyValue>,
}

impl EntityRecord {
    pub fn new(id: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            id: EntityId::new(id),
            entity_type,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_text(mut self, field: &str, value: impl Into<String>) -> Self {
        self.properties
            .insert(field.to_string(), PropertyValue::Text(value.into()));
        self
    }

    pub fn with_text_list(mut self, field: &str, values: &[&str]) -> Self {
        self.properties.insert(
            field.to_string(),
            PropertyValue::TextList(values.iter().map(|s| s.to_string()).collect()),
        );
        self
    }

    pub fn with_relations(mut self, field: &str, ids: &[&str]) -> Self {
        self.properties.insert(
            field.to_string(),
            PropertyValue::Relations(ids.iter().map(|s| EntityId::new(*s)).collect()),
        );
        self
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.properties.get(field).and_then(PropertyValue::as_text)
    }

    pub fn text_list(&self, field: &str) -> Option<&[String]> {
        self.properties
            .get(field)
            .and_then(PropertyValue::as_text_list)
    }

    pub fn relations(&self, field: &str) -> Option<&[EntityId]> {
        self.properties
            .get(field)
            .and_then(PropertyValue::as_relations)
    }

    /// Fields that carry relation references, with their targets.
    pub fn relation_fields(&self) -> impl Iterator<Item = (&str, &[EntityId])> {
        self.properties.iter().filter_map(|(name, value)| {
            value.as_relations().map(|ids| (name.as_str(), ids))
        })
    }
}

/// Property catalog for one entity type, mirroring the remote schema.
/// The merge engine validates every outgoing field against this before
/// attempting a store write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityTypeSchema {
    pub entity_type: EntityType,
    pub properties: BTreeMap<String, PropertyKind>,
}

impl EntityTypeSchema {
    pub fn new(entity_type: EntityType) -> Self {
        Self {
            entity_type,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: &str, kind: PropertyKind) -> Self {
        self.properties.insert(name.to_string(), kind);
        self
    }

    pub fn allows(&self, name: &str, kind: PropertyKind) -> bool {
        match self.properties.get(name) {
            Some(declared) if *declared == kind => true,
            // Multi-value properties accept a scalar; the remote store
            // wraps it into a one-element list.
            Some(PropertyKind::TextList) => kind == PropertyKind::Text,
            _ => false,
        }
    }

    /// Default person schema used by the pipeline binary and tests.
    pub fn default_person() -> Self {
        Self::new(EntityType::Person)
            .with_property("name", PropertyKind::Text)
            .with_property("email", PropertyKind::TextList)
            .with_property("phone", PropertyKind::Text)
            .with_property("organization", PropertyKind::Text)
            .with_property("role", PropertyKind::Text)
            .with_property("notes", PropertyKind::Text)
            .with_property("organizations", PropertyKind::Relations)
            .with_property("events", PropertyKind::Relations)
    }

    /// Default organization schema.
    pub fn default_organization() -> Self {
        Self::new(EntityType::Organization)
            .with_property("name", PropertyKind::Text)
            .with_property("email", PropertyKind::TextList)
            .with_property("phone", PropertyKind::Text)
            .with_property("website", PropertyKind::Text)
            .with_property("members", PropertyKind::Relations)
    }

    /// Default event schema.
    pub fn default_event() -> Self {
        Self::new(EntityType::Event)
            .with_property("name", PropertyKind::Text)
            .with_property("date", PropertyKind::Date)
            .with_property("location", PropertyKind::Text)
            .with_property("participants", PropertyKind::Relations)
    }

    pub fn defaults_for(entity_type: EntityType) -> Self {
        match entity_type {
            EntityType::Person => Self::default_person(),
            EntityType::Organization => Self::default_organization(),
            EntityType::Event => Self::default_event(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_vs_empty_are_distinct() {
        let with_empty = EntityRecord::new("e1", EntityType::Person).with_text("name", "");
        let without = EntityRecord::new("e2", EntityType::Person);

        assert_eq!(with_empty.text("name"), Some(""));
        assert_eq!(without.text("name"), None);
    }

    #[test]
    fn test_schema_allows_checks_kind() {
        let schema = EntityTypeSchema::default_person();
        assert!(schema.allows("name", PropertyKind::Text));
        assert!(!schema.allows("name", PropertyKind::TextList));
        assert!(!schema.allows("favorite_color", PropertyKind::Text));
        // A multi-value property accepts a scalar value.
        assert!(schema.allows("email", PropertyKind::Text));
        assert!(schema.allows("email", PropertyKind::TextList));
    }

    #[test]
    fn test_relation_fields_iteration() {
        let record = EntityRecord::new("p1", EntityType::Person)
            .with_text("name", "Ada")
            .with_relations("organizations", &["org1", "org2"]);

        let fields: Vec<_> = record.relation_fields().collect();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].0, "organizations");
        assert_eq!(fields[0].1.len(), 2);
    }
}
