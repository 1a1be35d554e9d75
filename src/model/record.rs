//! Canonical records produced by sources.
//!
//! A source does not know CMDB ids for objects it did not create, so
//! relations may point at another entity's natural key instead:
//!
//! ```yaml
//! relations:
//!   site: dc1                # single-field key (name)
//!   cluster: 42              # CMDB id
//!   device: [h1, dc1]        # composite key; nested relations use their own keys
//!   untagged_vlan: [null, 100]  # VLAN in the default group
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use super::key::EntityId;

/// Reference to another entity, by id or by natural key.
///
/// In a relation position an integer is a CMDB id and a string is the
/// single-field key of the target. Inside a composite key every component
/// follows the target's key fields: relation components are references
/// themselves, plain components are literal values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reference {
    Int(i64),
    Text(String),
    Composite(Vec<Option<Reference>>),
}

impl Reference {
    #[must_use]
    pub fn id(id: EntityId) -> Self {
        Reference::Int(i64::try_from(id.0).unwrap_or(i64::MAX))
    }

    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Reference::Text(name.into())
    }

    #[must_use]
    pub fn key(parts: Vec<Option<Reference>>) -> Self {
        Reference::Composite(parts)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Plain attributes, already in NetBox field names and value formats
    #[serde(default)]
    pub fields: Map<String, Value>,
    /// Relation fields; `null` clears the relation
    #[serde(default)]
    pub relations: BTreeMap<String, Option<Reference>>,
}

impl CanonicalRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn relation(mut self, field: &str, reference: Reference) -> Self {
        self.relations.insert(field.to_string(), Some(reference));
        self
    }
}
