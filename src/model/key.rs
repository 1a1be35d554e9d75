//! Natural keys and CMDB ids.

use super::kind::EntityKind;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Primary key assigned by the CMDB.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::from(id.0)
    }
}

/// One component of a natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
    Null,
    Text(String),
    Int(i64),
    /// A relation component, compared by the referenced object's id
    Id(EntityId),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => f.write_str("null"),
            KeyPart::Text(text) => f.write_str(text),
            KeyPart::Int(n) => write!(f, "{n}"),
            KeyPart::Id(id) => write!(f, "#{id}"),
        }
    }
}

/// The identity of an entity within its kind, built from the kind's key fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NaturalKey(Vec<KeyPart>);

impl NaturalKey {
    #[must_use]
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// Key of a kind whose natural key is a single text field (most kinds).
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self(vec![KeyPart::Text(name.into())])
    }

    /// Extract the key of `kind` from a normalized field map.
    ///
    /// Relation components become [`KeyPart::Id`]; integers stay integers so
    /// that `vid: 100` and `vid: 100.0` land on the same slot.
    #[must_use]
    pub fn extract(kind: EntityKind, fields: &Map<String, Value>) -> Self {
        let parts = kind
            .descriptor()
            .key_fields
            .iter()
            .map(|field| {
                let value = fields.get(*field).unwrap_or(&Value::Null);
                if kind.relation_target(field).is_some() {
                    relation_part(value)
                } else {
                    plain_part(value)
                }
            })
            .collect();
        Self(parts)
    }

    #[must_use]
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }
}

fn relation_part(value: &Value) -> KeyPart {
    value
        .as_u64()
        .map_or(KeyPart::Null, |id| KeyPart::Id(EntityId(id)))
}

fn plain_part(value: &Value) -> KeyPart {
    match value {
        Value::Null => KeyPart::Null,
        Value::String(text) => KeyPart::Text(text.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(int) => KeyPart::Int(int),
            None => n
                .as_f64()
                .and_then(whole_float)
                .map_or_else(|| KeyPart::Text(n.to_string()), KeyPart::Int),
        },
        other => KeyPart::Text(other.to_string()),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "only whole values inside the i64 range are converted"
)]
fn whole_float(float: f64) -> Option<i64> {
    let in_range = float >= i64::MIN as f64 && float <= i64::MAX as f64;
    (float.fract() == 0.0 && in_range).then(|| float as i64)
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [single] = self.0.as_slice() {
            return write!(f, "{single}");
        }
        f.write_str("(")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{part}")?;
        }
        f.write_str(")")
    }
}
