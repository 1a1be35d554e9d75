//! # Snapshot Index
//!
//! Per-kind view of the CMDB keyed by natural key, with a reverse map from
//! CMDB id. A slot is never overwritten by an entity with a different id:
//! the first object to claim a key keeps it.

use crate::model::{Entity, EntityId, EntityKind, NaturalKey};
use std::collections::HashMap;
use thiserror::Error;

/// Two different CMDB objects claim the same natural key.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} {key} is held by id {existing}, refusing id {rejected}")]
pub struct IndexCollision {
    pub kind: EntityKind,
    pub key: NaturalKey,
    pub existing: EntityId,
    pub rejected: EntityId,
}

#[derive(Debug)]
pub struct SnapshotIndex {
    kind: EntityKind,
    by_key: HashMap<NaturalKey, Entity>,
    key_by_id: HashMap<EntityId, NaturalKey>,
}

impl SnapshotIndex {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            by_key: HashMap::new(),
            key_by_id: HashMap::new(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    #[must_use]
    pub fn get(&self, key: &NaturalKey) -> Option<&Entity> {
        self.by_key.get(key)
    }

    #[must_use]
    pub fn get_by_id(&self, id: EntityId) -> Option<&Entity> {
        self.key_by_id.get(&id).and_then(|key| self.by_key.get(key))
    }

    #[must_use]
    pub fn contains_id(&self, id: EntityId) -> bool {
        self.key_by_id.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity> {
        self.by_key.values()
    }

    /// Insert or replace an entity that has a CMDB id.
    ///
    /// Re-inserting the same id under a new key moves it. Entities without an
    /// id are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`IndexCollision`] if the key belongs to a different id; the
    /// index is left unchanged.
    pub fn insert(&mut self, entity: Entity) -> Result<(), IndexCollision> {
        let Some(id) = entity.id else {
            return Ok(());
        };
        let key = entity.natural_key();

        if let Some(existing) = self.by_key.get(&key).and_then(|held| held.id) {
            if existing != id {
                return Err(IndexCollision {
                    kind: self.kind,
                    key,
                    existing,
                    rejected: id,
                });
            }
        }

        if let Some(old_key) = self.key_by_id.insert(id, key.clone()) {
            if old_key != key {
                self.by_key.remove(&old_key);
            }
        }
        self.by_key.insert(key, entity);
        Ok(())
    }

    pub fn remove_id(&mut self, id: EntityId) -> Option<Entity> {
        let key = self.key_by_id.remove(&id)?;
        self.by_key.remove(&key)
    }
}
