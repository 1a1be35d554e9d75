//! # Upsert Engine
//!
//! Create-or-patch of one candidate entity against the snapshot index.
//! Only fields the candidate supplies are compared, only changed fields are
//! sent, and unchanged entities cost no API call. Either way the entity is
//! confirmed present and drops out of the orphan set.

use super::{Inventory, KindState};
use crate::error::{CmdbError, SyncError};
use crate::model::diff::apply_patch;
use crate::model::entity::tag_list;
use crate::model::{diff_fields, Entity, EntityId, EntityKind, FieldConflict, NaturalKey};
use crate::observability::metrics::{self, EntityOperation};
use serde_json::Value;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    /// Names of the fields sent in the PATCH
    Updated { fields: Vec<String> },
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Upserted {
    /// The entity as now indexed
    pub entity: Entity,
    pub outcome: UpsertOutcome,
    /// Differences left in place on an object the tool does not own
    pub conflicts: Vec<FieldConflict>,
}

impl Inventory {
    /// Create or update `candidate` and return the committed entity.
    ///
    /// # Errors
    ///
    /// See [`Inventory::upsert`].
    pub async fn add_or_update(&self, candidate: Entity) -> Result<Entity, SyncError> {
        self.upsert(candidate).await.map(|upserted| upserted.entity)
    }

    /// Create `candidate` if its natural key is unknown, otherwise patch the
    /// fields that differ.
    ///
    /// The indexed entity with the candidate's key is confirmed present even
    /// when this fails, so a failed write never turns it into an orphan.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidRecord`] if a key field is missing or a relation is not an id
    /// - [`SyncError::DanglingReference`] if a relation id is not indexed
    /// - [`SyncError::CreateConflict`] if the CMDB reports the object already exists
    /// - [`SyncError::TransientIo`] / [`SyncError::Cmdb`] if the write fails
    pub async fn upsert(&self, mut candidate: Entity) -> Result<Upserted, SyncError> {
        let kind = candidate.kind;
        if kind == EntityKind::Vlan && candidate.relation("group").is_none() {
            if let Some(group) = self.default_vlan_group {
                candidate.fields.insert("group".to_string(), group.into());
            }
        }
        let key = candidate.natural_key();
        let result = self.write(candidate, &key).await;
        if result.is_err() {
            self.confirm_seen(kind, &key).await;
        }
        result
    }

    async fn write(&self, candidate: Entity, key: &NaturalKey) -> Result<Upserted, SyncError> {
        let kind = candidate.kind;
        validate_key(&candidate)?;

        // Other kinds are locked one at a time and released before the own
        // kind is locked, so concurrent sources cannot deadlock.
        for relation in kind.descriptor().relations {
            if relation.target == kind {
                continue;
            }
            if let Some(id) = relation_id(&candidate, relation.field)? {
                let exists = self.state(relation.target)?.lock().await.index.contains_id(id);
                if !exists {
                    return Err(dangling(kind, relation.field, relation.target, id));
                }
            }
        }

        let mut state = self.state(kind)?.lock().await;
        for relation in kind.descriptor().relations {
            if relation.target != kind {
                continue;
            }
            if let Some(id) = relation_id(&candidate, relation.field)? {
                if !state.index.contains_id(id) {
                    return Err(dangling(kind, relation.field, kind, id));
                }
            }
        }

        let upserted = match state.index.get(key).cloned() {
            None => self.create(&mut state, candidate, key).await?,
            Some(stored) => self.update(&mut state, stored, &candidate).await?,
        };
        if let Some(id) = upserted.entity.id {
            state.orphans.mark_seen(id);
        }

        let operation = match upserted.outcome {
            UpsertOutcome::Created => EntityOperation::Created,
            UpsertOutcome::Updated { .. } => EntityOperation::Updated,
            UpsertOutcome::Unchanged => EntityOperation::Unchanged,
        };
        metrics::record_entity_operation(kind, operation);
        for _ in &upserted.conflicts {
            metrics::record_entity_operation(kind, EntityOperation::Conflict);
        }
        Ok(upserted)
    }

    async fn create(
        &self,
        state: &mut KindState,
        mut candidate: Entity,
        key: &NaturalKey,
    ) -> Result<Upserted, SyncError> {
        let kind = candidate.kind;
        candidate.owned = kind.is_taggable();
        let payload = candidate.to_payload(self.marker.as_ref());

        // Never retried: a lost response may still have created the object
        let response = self
            .api
            .create(kind, &payload)
            .await
            .map_err(|source| match source {
                CmdbError::Conflict { .. } => SyncError::CreateConflict {
                    kind,
                    key: key.clone(),
                    source,
                },
                other => SyncError::from_write(kind, other),
            })?;

        let mut created = Entity::from_api(kind, response, self.marker.as_ref()).map_err(
            |message| SyncError::Cmdb {
                kind,
                source: CmdbError::Decode {
                    operation: format!("POST {}", kind.api_path()),
                    message,
                },
            },
        )?;
        created.owned |= candidate.owned;

        if let Err(collision) = state.index.insert(created.clone()) {
            warn!(%kind, error = %collision, "Created entity collides with an indexed one");
        }
        info!(
            %kind,
            id = %created.id.map_or(0, |id| id.0),
            key = %key,
            "Created"
        );
        Ok(Upserted {
            entity: created,
            outcome: UpsertOutcome::Created,
            conflicts: Vec::new(),
        })
    }

    async fn update(
        &self,
        state: &mut KindState,
        stored: Entity,
        candidate: &Entity,
    ) -> Result<Upserted, SyncError> {
        let kind = stored.kind;
        let id = stored.id.ok_or_else(|| SyncError::InvalidRecord {
            kind,
            message: "indexed entity has no id".to_string(),
        })?;
        let adopt = !stored.owned && self.settings.adopt_unowned && kind.is_taggable();
        let diff = diff_fields(&stored, candidate, stored.owned || adopt);

        for conflict in &diff.conflicts {
            warn!(
                %kind,
                %id,
                field = %conflict.field,
                stored = %conflict.stored,
                candidate = %conflict.candidate,
                "Field differs on an unowned object, leaving it unchanged"
            );
        }
        if diff.is_empty() && !adopt {
            debug!(%kind, %id, "Unchanged");
            return Ok(Upserted {
                entity: stored,
                outcome: UpsertOutcome::Unchanged,
                conflicts: diff.conflicts,
            });
        }

        let owned = stored.owned || adopt;
        let mut payload = diff.patch.clone();
        let mut tags = stored.tags.clone();
        if adopt || !diff.missing_tags.is_empty() {
            tags.extend(diff.missing_tags.iter().copied());
            payload.insert(
                "tags".to_string(),
                tag_list(&tags, owned, self.marker.as_ref()),
            );
        }

        let operation = format!("PATCH {}/{id}", kind.api_path());
        self.settings
            .retry
            .run(&operation, || self.api.patch(kind, id, &payload))
            .await
            .map_err(|source| SyncError::from_write(kind, source))?;

        let mut updated = stored;
        apply_patch(&mut updated, &diff.patch);
        updated.tags = tags;
        updated.owned = owned;
        if let Err(collision) = state.index.insert(updated.clone()) {
            warn!(%kind, error = %collision, "Updated entity collides with an indexed one");
        }

        let fields: Vec<String> = payload.keys().cloned().collect();
        info!(%kind, %id, ?fields, adopted = adopt, "Updated");
        Ok(Upserted {
            entity: updated,
            outcome: UpsertOutcome::Updated { fields },
            conflicts: diff.conflicts,
        })
    }
}

fn validate_key(candidate: &Entity) -> Result<(), SyncError> {
    for field in candidate.kind.descriptor().key_fields {
        if candidate.field(field).is_none_or(Value::is_null) {
            return Err(SyncError::InvalidRecord {
                kind: candidate.kind,
                message: format!("natural key field `{field}` is not set"),
            });
        }
    }
    Ok(())
}

fn relation_id(candidate: &Entity, field: &str) -> Result<Option<EntityId>, SyncError> {
    match candidate.field(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(|id| Some(EntityId(id)))
            .ok_or_else(|| SyncError::InvalidRecord {
                kind: candidate.kind,
                message: format!("relation `{field}` must be a CMDB id, got {value}"),
            }),
    }
}

fn dangling(kind: EntityKind, field: &str, target: EntityKind, id: EntityId) -> SyncError {
    SyncError::DanglingReference {
        kind,
        field: field.to_string(),
        target,
        reference: format!("id {id}"),
    }
}
