// src/store/memory.rs

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{RecordStore, StoreError};
use crate::models::{EntityId, EntityRecord, EntityType, EntityTypeSchema, PropertyValue};

/// In-process record store. Enforces the same schema discipline the
/// hosted product does, so tests exercise the rejection path too.
pub struct MemoryStore {
    records: RwLock<HashMap<EntityId, EntityRecord>>,
    merged: RwLock<HashMap<EntityId, EntityId>>,
    schemas: HashMap<EntityType, EntityTypeSchema>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let schemas = [
            EntityTypeSchema::default_person(),
            EntityTypeSchema::default_organization(),
            EntityTypeSchema::default_event(),
        ]
        .into_iter()
        .map(|s| (s.entity_type, s))
        .collect();
        Self {
            records: RwLock::new(HashMap::new()),
            merged: RwLock::new(HashMap::new()),
            schemas,
        }
    }

    pub fn with_schemas(schemas: Vec<EntityTypeSchema>) -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            merged: RwLock::new(HashMap::new()),
            schemas: schemas.into_iter().map(|s| (s.entity_type, s)).collect(),
        }
    }

    pub async fn insert(&self, record: EntityRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    pub async fn seed(&self, records: Vec<EntityRecord>) {
        let mut map = self.records.write().await;
        for record in records {
            map.insert(record.id.clone(), record);
        }
    }

    fn validate_against_schema(
        &self,
        entity_type: EntityType,
        properties: &BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError> {
        let Some(schema) = self.schemas.get(&entity_type) else {
            return Ok(());
        };
        for (name, value) in properties {
            if !schema.allows(name, value.kind()) {
                return Err(StoreError::RemoteRejected(format!(
                    "property '{}' ({:?}) is not part of the {} schema",
                    name,
                    value.kind(),
                    entity_type
                )));
            }
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_entity(&self, id: &EntityId) -> Result<EntityRecord, StoreError> {
        self.records
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list_entities(&self, entity_type: EntityType) -> Result<Vec<EntityRecord>, StoreError> {
        let merged = self.merged.read().await;
        let mut out: Vec<EntityRecord> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.entity_type == entity_type && !merged.contains_key(&r.id))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(out)
    }

    async fn update_entity(
        &self,
        id: &EntityId,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        self.validate_against_schema(record.entity_type, &properties)?;
        record.properties = properties;
        Ok(())
    }

    async fn mark_merged(
        &self,
        secondary: &EntityId,
        merged_into: &EntityId,
    ) -> Result<(), StoreError> {
        if !self.records.read().await.contains_key(secondary) {
            return Err(StoreError::NotFound(secondary.clone()));
        }
        let mut merged = self.merged.write().await;
        if let Some(existing) = merged.get(secondary) {
            return Err(StoreError::AlreadyMerged {
                id: secondary.clone(),
                merged_into: existing.clone(),
            });
        }
        merged.insert(secondary.clone(), merged_into.clone());
        Ok(())
    }

    async fn unmark_merged(&self, id: &EntityId) -> Result<(), StoreError> {
        let mut merged = self.merged.write().await;
        if merged.remove(id).is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }

    async fn merged_into(&self, id: &EntityId) -> Result<Option<EntityId>, StoreError> {
        Ok(self.merged.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_excludes_merged_away_records() {
        let store = MemoryStore::new();
        store
            .seed(vec![
                EntityRecord::new("a", EntityType::Person).with_text("name", "A"),
                EntityRecord::new("b", EntityType::Person).with_text("name", "B"),
            ])
            .await;

        store
            .mark_merged(&EntityId::new("b"), &EntityId::new("a"))
            .await
            .unwrap();

        let live = store.list_entities(EntityType::Person).await.unwrap();
        assert_eq!(live.len(), 1);
        assert_eq!(live[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_double_mark_merged_fails() {
        let store = MemoryStore::new();
        store
            .insert(EntityRecord::new("b", EntityType::Person).with_text("name", "B"))
            .await;
        store
            .mark_merged(&EntityId::new("b"), &EntityId::new("a"))
            .await
            .unwrap();

        let err = store
            .mark_merged(&EntityId::new("b"), &EntityId::new("c"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyMerged { .. }));
    }

    #[tokio::test]
    async fn test_unknown_property_rejected() {
        let store = MemoryStore::new();
        store
            .insert(EntityRecord::new("a", EntityType::Person).with_text("name", "A"))
            .await;

        let mut properties = BTreeMap::new();
        properties.insert(
            "favorite_color".to_string(),
            PropertyValue::Text("teal".to_string()),
        );
        let err = store
            .update_entity(&EntityId::new("a"), properties)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RemoteRejected(_)));
    }

    #[tokio::test]
    async fn test_unmark_restores_visibility() {
        let store = MemoryStore::new();
        store
            .insert(EntityRecord::new("b", EntityType::Person).with_text("name", "B"))
            .await;
        store
            .mark_merged(&EntityId::new("b"), &EntityId::new("a"))
            .await
            .unwrap();
        store.unmark_merged(&EntityId::new("b")).await.unwrap();

        assert_eq!(
            store.merged_into(&EntityId::new("b")).await.unwrap(),
            None
        );
        assert_eq!(store.list_entities(EntityType::Person).await.unwrap().len(), 1);
    }
}
