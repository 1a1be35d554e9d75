//! # Entities
//!
//! The in-memory form of a CMDB object. Records coming from the API are
//! normalized on the way in ([`Entity::from_api`]) and serialized back to a
//! request body on the way out ([`Entity::to_payload`]); everything in
//! between works on plain ids, plain values and an `owned` flag.

use super::key::{EntityId, NaturalKey};
use super::kind::EntityKind;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Bookkeeping fields the CMDB adds to every record; they never take part in diffs.
const BOOKKEEPING_FIELDS: [&str; 4] = ["url", "display", "created", "last_updated"];

/// The reserved tag identifying objects this tool manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipMarker {
    pub id: EntityId,
    pub slug: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub kind: EntityKind,
    /// `None` until the CMDB has assigned one
    pub id: Option<EntityId>,
    pub fields: Map<String, Value>,
    /// Tag ids, excluding the ownership marker
    pub tags: BTreeSet<EntityId>,
    /// Whether the object carries the ownership marker
    pub owned: bool,
}

impl Entity {
    #[must_use]
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            id: None,
            fields: Map::new(),
            tags: BTreeSet::new(),
            owned: false,
        }
    }

    #[must_use]
    pub fn with_field(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_relation(self, field: &str, id: EntityId) -> Self {
        self.with_field(field, id)
    }

    #[must_use]
    pub fn with_tag(mut self, tag: EntityId) -> Self {
        self.tags.insert(tag);
        self
    }

    #[must_use]
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::extract(self.kind, &self.fields)
    }

    #[must_use]
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Id held by a relation field; `None` for null, absent or malformed values.
    #[must_use]
    pub fn relation(&self, field: &str) -> Option<EntityId> {
        self.fields.get(field).and_then(Value::as_u64).map(EntityId)
    }

    /// The `name` attribute, which relation rules match against.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get("name").and_then(Value::as_str)
    }

    /// Build an entity from a CMDB API record.
    ///
    /// Nested relation objects collapse to their id, `{value, label}` choices
    /// collapse to their value, tags become a set of ids and the marker tag
    /// (matched by id or slug) becomes `owned`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the record is not an object
    /// or has no numeric `id`.
    pub fn from_api(
        kind: EntityKind,
        record: Value,
        marker: Option<&OwnershipMarker>,
    ) -> Result<Self, String> {
        let Value::Object(mut object) = record else {
            return Err(format!("{kind} record is not a JSON object"));
        };
        let id = object
            .remove("id")
            .and_then(|id| id.as_u64())
            .map(EntityId)
            .ok_or_else(|| format!("{kind} record has no numeric id"))?;
        for field in BOOKKEEPING_FIELDS {
            object.remove(field);
        }

        let mut tags = BTreeSet::new();
        let mut owned = false;
        if let Some(Value::Array(raw_tags)) = object.remove("tags") {
            for tag in raw_tags {
                let (tag_id, slug) = match &tag {
                    Value::Number(n) => (n.as_u64().map(EntityId), None),
                    Value::Object(nested) => (
                        nested.get("id").and_then(Value::as_u64).map(EntityId),
                        nested.get("slug").and_then(Value::as_str),
                    ),
                    _ => (None, None),
                };
                let is_marker = marker.is_some_and(|marker| {
                    tag_id == Some(marker.id) || slug == Some(marker.slug.as_str())
                });
                if is_marker {
                    owned = true;
                } else if let Some(tag_id) = tag_id {
                    tags.insert(tag_id);
                }
            }
        }

        let fields = object
            .into_iter()
            .map(|(field, value)| {
                let value = if kind.relation_target(&field).is_some() {
                    normalize_relation(value)
                } else {
                    normalize_value(value)
                };
                (field, value)
            })
            .collect();

        Ok(Self {
            kind,
            id: Some(id),
            fields,
            tags,
            owned,
        })
    }

    /// Request body for a create: every field plus the tag list, with the
    /// marker included when the entity is owned.
    #[must_use]
    pub fn to_payload(&self, marker: Option<&OwnershipMarker>) -> Map<String, Value> {
        let mut payload = self.fields.clone();
        if self.kind.is_taggable() {
            payload.insert("tags".to_string(), tag_list(&self.tags, self.owned, marker));
        }
        payload
    }
}

/// Serialized form of a tag set, sorted, marker included when `owned`.
#[must_use]
pub fn tag_list(
    tags: &BTreeSet<EntityId>,
    owned: bool,
    marker: Option<&OwnershipMarker>,
) -> Value {
    let mut ids = tags.clone();
    if owned {
        if let Some(marker) = marker {
            ids.insert(marker.id);
        }
    }
    Value::Array(ids.into_iter().map(Value::from).collect())
}

fn normalize_relation(value: Value) -> Value {
    match value {
        Value::Object(nested) => nested.get("id").cloned().unwrap_or(Value::Null),
        other => other,
    }
}

fn normalize_value(value: Value) -> Value {
    match value {
        Value::Object(object) if is_choice(&object) => {
            object.get("value").cloned().unwrap_or(Value::Null)
        }
        Value::Object(object) => Value::Object(
            object
                .into_iter()
                .map(|(key, value)| (key, normalize_value(value)))
                .collect(),
        ),
        other => other,
    }
}

fn is_choice(object: &Map<String, Value>) -> bool {
    object.contains_key("value")
        && object.contains_key("label")
        && object.keys().all(|key| matches!(key.as_str(), "value" | "label" | "id"))
}

/// Convert a name into a NetBox slug: lowercase ASCII letters, digits,
/// underscores and single dashes.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() || c == '_' {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn marker() -> OwnershipMarker {
        OwnershipMarker {
            id: EntityId(1),
            slug: "netbox-ssot".to_string(),
        }
    }

    #[test]
    fn test_from_api_flattens_nested_relations_and_choices() {
        let record = json!({
            "id": 10,
            "url": "https://netbox/api/dcim/devices/10/",
            "display": "h1",
            "name": "h1",
            "site": {"id": 3, "name": "dc1", "url": "https://netbox/api/dcim/sites/3/"},
            "tenant": null,
            "status": {"value": "active", "label": "Active"},
            "custom_fields": {"host_cpu_cores": "8"},
            "tags": [{"id": 1, "slug": "netbox-ssot"}, {"id": 5, "slug": "source-ovirt"}],
            "last_updated": "2024-01-01T00:00:00Z"
        });

        let entity = Entity::from_api(EntityKind::Device, record, Some(&marker())).unwrap();

        assert_eq!(entity.id, Some(EntityId(10)));
        assert_eq!(entity.relation("site"), Some(EntityId(3)));
        assert_eq!(entity.field("tenant"), Some(&Value::Null));
        assert_eq!(entity.field("status"), Some(&json!("active")));
        assert_eq!(entity.field("custom_fields"), Some(&json!({"host_cpu_cores": "8"})));
        assert!(entity.owned);
        assert_eq!(entity.tags, BTreeSet::from([EntityId(5)]));
        assert!(entity.field("url").is_none());
        assert!(entity.field("display").is_none());
        assert!(entity.field("last_updated").is_none());
    }

    #[test]
    fn test_from_api_detects_marker_by_bare_id() {
        let record = json!({"id": 4, "name": "t", "tags": [1, 9]});
        let entity = Entity::from_api(EntityKind::Tenant, record, Some(&marker())).unwrap();
        assert!(entity.owned);
        assert_eq!(entity.tags, BTreeSet::from([EntityId(9)]));
    }

    #[test]
    fn test_from_api_without_marker_is_unowned() {
        let record = json!({"id": 4, "name": "t", "tags": [{"id": 1, "slug": "netbox-ssot"}]});
        let entity = Entity::from_api(EntityKind::Tenant, record, None).unwrap();
        assert!(!entity.owned);
        assert_eq!(entity.tags, BTreeSet::from([EntityId(1)]));
    }

    #[test]
    fn test_from_api_rejects_records_without_id() {
        let err = Entity::from_api(EntityKind::Site, json!({"name": "dc1"}), None).unwrap_err();
        assert!(err.contains("no numeric id"));
    }

    #[test]
    fn test_payload_adds_marker_for_owned_entities() {
        let mut entity = Entity::new(EntityKind::Site)
            .with_field("name", "dc1")
            .with_tag(EntityId(5));
        entity.owned = true;

        let payload = entity.to_payload(Some(&marker()));

        assert_eq!(payload.get("name"), Some(&json!("dc1")));
        assert_eq!(payload.get("tags"), Some(&json!([1, 5])));
    }

    #[test]
    fn test_payload_of_untaggable_kind_has_no_tags() {
        let entity = Entity::new(EntityKind::Tag).with_field("name", "x");
        assert!(!entity.to_payload(Some(&marker())).contains_key("tags"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("netbox-ssot"), "netbox-ssot");
        assert_eq!(slugify("Source: oVirt Prod"), "source-ovirt-prod");
        assert_eq!(slugify("  Generic  Manufacturer  "), "generic-manufacturer");
        assert_eq!(slugify("host_cpu_cores"), "host_cpu_cores");
    }
}
