//! Partial field diff between a stored entity and a candidate.
//!
//! Only fields the candidate supplies are compared. Object-valued fields such
//! as `custom_fields` are compared key by key so a candidate setting one
//! custom field never clobbers the others.

use super::entity::Entity;
use super::key::EntityId;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A field whose stored value differs from the candidate on an object the
/// tool is not allowed to overwrite.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldConflict {
    /// Dotted path, e.g. `custom_fields.host_memory`
    pub field: String,
    pub stored: Value,
    pub candidate: Value,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldDiff {
    /// Changed fields with their new values, ready to send as a PATCH body
    pub patch: Map<String, Value>,
    /// Candidate tags missing from the stored object
    pub missing_tags: BTreeSet<EntityId>,
    pub conflicts: Vec<FieldConflict>,
}

impl FieldDiff {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patch.is_empty() && self.missing_tags.is_empty()
    }
}

/// Diff `candidate` against `stored`.
///
/// With `authoritative` set every differing field is patched. Without it,
/// only fields that are empty on the stored side are filled and the rest are
/// reported as conflicts; tags are left alone.
#[must_use]
pub fn diff_fields(stored: &Entity, candidate: &Entity, authoritative: bool) -> FieldDiff {
    let mut diff = FieldDiff::default();

    for (field, wanted) in &candidate.fields {
        let current = stored.fields.get(field);
        match (current, wanted) {
            (Some(Value::Object(current)), Value::Object(wanted)) => {
                let nested = diff_object(field, current, wanted, authoritative, &mut diff.conflicts);
                if !nested.is_empty() {
                    diff.patch.insert(field.clone(), Value::Object(nested));
                }
            }
            _ => {
                let current = current.unwrap_or(&Value::Null);
                if values_equal(current, wanted) {
                    continue;
                }
                if authoritative || is_empty(current) {
                    diff.patch.insert(field.clone(), wanted.clone());
                } else {
                    diff.conflicts.push(FieldConflict {
                        field: field.clone(),
                        stored: current.clone(),
                        candidate: wanted.clone(),
                    });
                }
            }
        }
    }

    if authoritative {
        diff.missing_tags = candidate.tags.difference(&stored.tags).copied().collect();
    }
    diff
}

fn diff_object(
    path: &str,
    current: &Map<String, Value>,
    wanted: &Map<String, Value>,
    authoritative: bool,
    conflicts: &mut Vec<FieldConflict>,
) -> Map<String, Value> {
    let mut changed = Map::new();
    for (key, value) in wanted {
        let existing = current.get(key).unwrap_or(&Value::Null);
        if values_equal(existing, value) {
            continue;
        }
        if authoritative || is_empty(existing) {
            changed.insert(key.clone(), value.clone());
        } else {
            conflicts.push(FieldConflict {
                field: format!("{path}.{key}"),
                stored: existing.clone(),
                candidate: value.clone(),
            });
        }
    }
    changed
}

/// Structural equality where numbers compare by value (`8 == 8.0`).
#[must_use]
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(x, y)| values_equal(x, y))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter()
                    .all(|(key, value)| y.get(key).is_some_and(|other| values_equal(value, other)))
        }
        _ => a == b,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Apply a PATCH body to the local copy of an entity, merging object fields key by key.
pub fn apply_patch(entity: &mut Entity, patch: &Map<String, Value>) {
    for (field, value) in patch {
        match (entity.fields.get_mut(field), value) {
            (Some(Value::Object(current)), Value::Object(changes)) => {
                for (key, change) in changes {
                    current.insert(key.clone(), change.clone());
                }
            }
            _ => {
                entity.fields.insert(field.clone(), value.clone());
            }
        }
    }
}
