//! Turning source records into candidate entities: natural-key references
//! are looked up in the index and relation rules are applied by name.

use super::Inventory;
use crate::error::SyncError;
use crate::model::{
    CanonicalRecord, Entity, EntityId, EntityKind, KeyPart, NaturalKey, Reference,
};
use crate::relations::SourceRelations;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::{Map, Value};
use tracing::debug;

impl Inventory {
    /// Build a candidate entity from a source record.
    ///
    /// # Errors
    ///
    /// - [`SyncError::InvalidRecord`] for malformed references or relation
    ///   fields given as plain attributes
    /// - [`SyncError::DanglingReference`] when a referenced key is not indexed
    pub async fn candidate(
        &self,
        kind: EntityKind,
        record: &CanonicalRecord,
    ) -> Result<Entity, SyncError> {
        let CanonicalRecord { fields, relations } = record;
        if let Some(field) = fields.keys().find(|field| kind.relation_target(field).is_some()) {
            return Err(SyncError::InvalidRecord {
                kind,
                message: format!("relation `{field}` must be given under `relations`"),
            });
        }

        let mut entity = Entity::new(kind);
        entity.fields = fields.clone();
        for (field, reference) in relations {
            let target = kind.relation_target(field).ok_or_else(|| SyncError::InvalidRecord {
                kind,
                message: format!("`{field}` is not a relation of {kind}"),
            })?;
            let value = match reference {
                None => Value::Null,
                Some(reference) => self
                    .resolve_reference(kind, field, target, reference)
                    .await?
                    .into(),
            };
            entity.fields.insert(field.clone(), value);
        }
        Ok(entity)
    }

    /// Confirm the indexed counterpart of a record that could not be turned
    /// into a candidate. Only the key fields are resolved; if one of them
    /// cannot be, there is no counterpart to confirm.
    pub async fn confirm_record(&self, kind: EntityKind, record: &CanonicalRecord) {
        let mut key_fields = Map::new();
        for field in kind.descriptor().key_fields {
            let value = match kind.relation_target(field) {
                None => record.fields.get(*field).cloned().unwrap_or(Value::Null),
                Some(target) => match record.relations.get(*field) {
                    Some(Some(reference)) => {
                        match self.resolve_reference(kind, field, target, reference).await {
                            Ok(id) => id.into(),
                            Err(_) => return,
                        }
                    }
                    _ if kind == EntityKind::Vlan => {
                        self.default_vlan_group.map_or(Value::Null, Value::from)
                    }
                    _ => Value::Null,
                },
            };
            key_fields.insert((*field).to_string(), value);
        }
        self.confirm_seen(kind, &NaturalKey::extract(kind, &key_fields)).await;
    }

    /// Apply the source's relation rules to `entity` by its name.
    ///
    /// # Errors
    ///
    /// [`SyncError::UnresolvedRelation`] when a rule matches but its label
    /// names an object that does not exist.
    pub async fn apply_relation_rules(
        &self,
        entity: &mut Entity,
        relations: &SourceRelations,
    ) -> Result<(), SyncError> {
        let Some(name) = entity.name().map(str::to_string) else {
            return Ok(());
        };
        for binding in relations.for_kind(entity.kind) {
            let Some(label) = binding.rules.resolve(&name) else {
                continue;
            };
            let id = self
                .lookup_key(binding.target, &NaturalKey::name(label))
                .await?
                .ok_or_else(|| SyncError::UnresolvedRelation {
                    subject: entity.kind,
                    name: name.clone(),
                    target: binding.target,
                    label: label.to_string(),
                })?;
            debug!(kind = %entity.kind, %name, field = binding.field, %label, "Relation rule matched");
            entity.fields.insert(binding.field.to_string(), id.into());
        }
        Ok(())
    }

    async fn lookup_key(
        &self,
        kind: EntityKind,
        key: &NaturalKey,
    ) -> Result<Option<EntityId>, SyncError> {
        let state = self.state(kind)?.lock().await;
        Ok(state.index.get(key).and_then(|entity| entity.id))
    }

    /// Resolve a reference held by `owner.field` to an id of `target`.
    ///
    /// Plain ids are passed through unchecked; the upsert validates them.
    fn resolve_reference<'a>(
        &'a self,
        owner: EntityKind,
        field: &'a str,
        target: EntityKind,
        reference: &'a Reference,
    ) -> BoxFuture<'a, Result<EntityId, SyncError>> {
        async move {
            let parts = match reference {
                Reference::Int(id) => {
                    return u64::try_from(*id).ok().map(EntityId).ok_or_else(|| {
                        SyncError::InvalidRecord {
                            kind: owner,
                            message: format!("relation `{field}` has negative id {id}"),
                        }
                    });
                }
                Reference::Text(name) => vec![Some(Reference::Text(name.clone()))],
                Reference::Composite(parts) => parts.clone(),
            };

            let key = self.resolve_key(owner, field, target, &parts).await?;
            self.lookup_key(target, &key)
                .await?
                .ok_or_else(|| SyncError::DanglingReference {
                    kind: owner,
                    field: field.to_string(),
                    target,
                    reference: format!("key {key}"),
                })
        }
        .boxed()
    }

    /// Build the natural key of `target` from reference components, resolving
    /// relation components recursively.
    async fn resolve_key(
        &self,
        owner: EntityKind,
        field: &str,
        target: EntityKind,
        parts: &[Option<Reference>],
    ) -> Result<NaturalKey, SyncError> {
        let key_fields = target.descriptor().key_fields;
        if parts.len() != key_fields.len() {
            return Err(SyncError::InvalidRecord {
                kind: owner,
                message: format!(
                    "relation `{field}` gives {} key parts, {target} keys have {}",
                    parts.len(),
                    key_fields.len()
                ),
            });
        }

        let mut key = Vec::with_capacity(parts.len());
        for (key_field, part) in key_fields.iter().zip(parts) {
            let component = match (target.relation_target(key_field), part) {
                (Some(EntityKind::VlanGroup), None) if target == EntityKind::Vlan => self
                    .default_vlan_group
                    .map_or(KeyPart::Null, KeyPart::Id),
                (_, None) => KeyPart::Null,
                (Some(nested), Some(reference)) => {
                    KeyPart::Id(self.resolve_reference(target, key_field, nested, reference).await?)
                }
                (None, Some(Reference::Int(n))) => KeyPart::Int(*n),
                (None, Some(Reference::Text(text))) => KeyPart::Text(text.clone()),
                (None, Some(Reference::Composite(_))) => {
                    return Err(SyncError::InvalidRecord {
                        kind: owner,
                        message: format!(
                            "relation `{field}`: key part `{key_field}` of {target} is not a relation"
                        ),
                    });
                }
            };
            key.push(component);
        }
        Ok(NaturalKey::new(key))
    }
}
