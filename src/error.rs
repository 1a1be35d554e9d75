//! # Errors
//!
//! Two layers: [`CmdbError`] describes what went wrong talking to the CMDB,
//! [`SyncError`] describes what that means for the reconciliation and decides
//! how far a failure propagates (entity, source, or run).

use crate::model::{EntityId, EntityKind, NaturalKey};
use thiserror::Error;

/// Failure of a single CMDB API call.
#[derive(Debug, Error)]
pub enum CmdbError {
    /// Timeouts, connection failures, 429 and 5xx responses
    #[error("transient CMDB failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    /// The CMDB refused a create because the object already exists
    #[error("CMDB reported a duplicate during {operation}: {message}")]
    Conflict { operation: String, message: String },

    #[error("object not found during {operation}")]
    NotFound { operation: String },

    #[error("CMDB rejected {operation} with status {status}: {message}")]
    Rejected {
        operation: String,
        status: u16,
        message: String,
    },

    #[error("invalid CMDB response to {operation}: {message}")]
    Decode { operation: String, message: String },
}

impl CmdbError {
    /// Whether repeating the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, CmdbError::Transient { .. })
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    /// A write kept failing with transient errors after all retries
    #[error("transient failure writing {kind}: {source}")]
    TransientIo {
        kind: EntityKind,
        #[source]
        source: CmdbError,
    },

    #[error("CMDB rejected creation of {kind} {key} as a duplicate")]
    CreateConflict {
        kind: EntityKind,
        key: NaturalKey,
        #[source]
        source: CmdbError,
    },

    #[error("{kind} field `{field}` references {target} {reference}, which is not in the CMDB")]
    DanglingReference {
        kind: EntityKind,
        field: String,
        target: EntityKind,
        reference: String,
    },

    #[error("{subject} `{name}` matched {target} `{label}`, which does not exist in the CMDB")]
    UnresolvedRelation {
        subject: EntityKind,
        name: String,
        target: EntityKind,
        label: String,
    },

    #[error("all {} orphaned {kind} deletions failed", .failed.len())]
    PartialDeleteFailure {
        kind: EntityKind,
        failed: Vec<(EntityId, String)>,
    },

    #[error("CMDB rejected {kind} write: {source}")]
    Cmdb {
        kind: EntityKind,
        #[source]
        source: CmdbError,
    },

    #[error("failed to load {kind} from the CMDB: {source}")]
    IndexLoad {
        kind: EntityKind,
        #[source]
        source: CmdbError,
    },

    #[error("invalid {kind} record: {message}")]
    InvalidRecord { kind: EntityKind, message: String },

    #[error("source `{source_name}` failed to list {kind}: {message}")]
    Source {
        source_name: String,
        kind: EntityKind,
        message: String,
    },

    #[error("{kind} index is not loaded")]
    NotLoaded { kind: EntityKind },
}

impl SyncError {
    /// Classify a failed write.
    #[must_use]
    pub fn from_write(kind: EntityKind, source: CmdbError) -> Self {
        if source.is_transient() {
            SyncError::TransientIo { kind, source }
        } else {
            SyncError::Cmdb { kind, source }
        }
    }

    /// Errors that only affect the entity being processed. Everything else
    /// aborts the current source (or the run, for index loads).
    #[must_use]
    pub fn is_entity_level(&self) -> bool {
        matches!(
            self,
            SyncError::TransientIo { .. }
                | SyncError::CreateConflict { .. }
                | SyncError::DanglingReference { .. }
                | SyncError::Cmdb { .. }
                | SyncError::InvalidRecord { .. }
        )
    }
}
