// src/store/mod.rs
// The record store is an external collaborator: this crate only depends
// on the narrow contract below. The in-memory implementation carries the
// reference semantics remote adapters must match.

pub mod memory;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::models::{EntityId, EntityRecord, EntityType, PropertyValue};

pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity {0} not found")]
    NotFound(EntityId),
    #[error("entity {id} was already merged into {merged_into}")]
    AlreadyMerged { id: EntityId, merged_into: EntityId },
    #[error("remote store rejected the write: {0}")]
    RemoteRejected(String),
    #[error("store call timed out")]
    Timeout,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_entity(&self, id: &EntityId) -> Result<EntityRecord, StoreError>;

    /// Live records of one type, merged-away records excluded. Ordering
    /// is stable across calls for a fixed store state.
    async fn list_entities(&self, entity_type: EntityType) -> Result<Vec<EntityRecord>, StoreError>;

    /// Replace the full property mapping of a record. The remote schema
    /// rejects unknown properties; callers are expected to pre-validate.
    async fn update_entity(
        &self,
        id: &EntityId,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError>;

    /// Tombstone the secondary as merged into the primary. Fails when the
    /// secondary is already merged away.
    async fn mark_merged(&self, secondary: &EntityId, merged_into: &EntityId)
        -> Result<(), StoreError>;

    /// Reverse a tombstone during rollback.
    async fn unmark_merged(&self, id: &EntityId) -> Result<(), StoreError>;

    /// Where a record was merged to, if anywhere.
    async fn merged_into(&self, id: &EntityId) -> Result<Option<EntityId>, StoreError>;
}
