//! Entity model: kinds, keys, normalized entities and canonical records.

pub mod diff;
pub mod entity;
pub mod key;
pub mod kind;
pub mod record;

pub use diff::{diff_fields, values_equal, FieldConflict, FieldDiff};
pub use entity::{slugify, Entity, OwnershipMarker};
pub use key::{EntityId, KeyPart, NaturalKey};
pub use kind::{EntityKind, KindDescriptor, Relation};
pub use record::{CanonicalRecord, Reference};
