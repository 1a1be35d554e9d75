//! # Orphan Tracker
//!
//! Every owned object found at load time starts out as a suspected orphan.
//! Upserts clear the suspicion; whatever is still suspected once every source
//! has finished the kind is deleted by the sweep.

use super::Inventory;
use crate::error::{CmdbError, SyncError};
use crate::model::{EntityId, EntityKind, NaturalKey};
use crate::observability::metrics::{self, EntityOperation};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct OrphanSet {
    ids: BTreeSet<EntityId>,
}

impl OrphanSet {
    pub fn track(&mut self, id: EntityId) {
        self.ids.insert(id);
    }

    /// The entity is present in a source; returns whether it was tracked.
    pub fn mark_seen(&mut self, id: EntityId) -> bool {
        self.ids.remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: EntityId) -> bool {
        self.ids.contains(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn take(&mut self) -> BTreeSet<EntityId> {
        std::mem::take(&mut self.ids)
    }
}

/// Result of sweeping one kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepOutcome {
    pub deleted: Vec<EntityId>,
    pub failed: Vec<(EntityId, String)>,
}

impl Inventory {
    /// Mark the indexed `kind` entity with `key` as present in a source,
    /// whether or not it could be updated.
    pub(crate) async fn confirm_seen(&self, kind: EntityKind, key: &NaturalKey) {
        let Ok(state) = self.state(kind) else { return };
        let mut state = state.lock().await;
        let Some(id) = state.index.get(key).and_then(|entity| entity.id) else {
            return;
        };
        if state.orphans.mark_seen(id) {
            debug!(%kind, %id, "Reported by a source but not updated, keeping it");
        }
    }

    /// Delete every owned `kind` object no source confirmed in this run.
    ///
    /// Deleted objects leave the index; objects whose deletion failed stay.
    /// A 404 counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::PartialDeleteFailure`] when every attempted
    /// deletion failed.
    pub async fn sweep(&self, kind: EntityKind) -> Result<SweepOutcome, SyncError> {
        let mut state = self.state(kind)?.lock().await;
        let orphans = state.orphans.take();
        let mut outcome = SweepOutcome::default();
        if orphans.is_empty() {
            return Ok(outcome);
        }
        info!(%kind, count = orphans.len(), "Deleting orphaned entities");

        for id in orphans {
            let operation = format!("DELETE {}/{id}", kind.api_path());
            let result = self
                .settings
                .retry
                .run(&operation, || self.api.delete(kind, id))
                .await;
            match result {
                Ok(()) | Err(CmdbError::NotFound { .. }) => {
                    let name = state
                        .index
                        .remove_id(id)
                        .and_then(|entity| entity.name().map(str::to_string));
                    info!(%kind, %id, name = name.as_deref().unwrap_or(""), "Deleted orphan");
                    metrics::record_entity_operation(kind, EntityOperation::Deleted);
                    outcome.deleted.push(id);
                }
                Err(err) => {
                    error!(%kind, %id, error = %err, "Failed to delete orphan");
                    metrics::record_entity_operation(kind, EntityOperation::Error);
                    outcome.failed.push((id, err.to_string()));
                }
            }
        }

        if outcome.deleted.is_empty() {
            return Err(SyncError::PartialDeleteFailure {
                kind,
                failed: outcome.failed,
            });
        }
        if !outcome.failed.is_empty() {
            warn!(
                %kind,
                deleted = outcome.deleted.len(),
                failed = outcome.failed.len(),
                "Some orphan deletions failed"
            );
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_seen_removes_tracked_ids() {
        let mut set = OrphanSet::default();
        set.track(EntityId(1));
        set.track(EntityId(2));

        assert!(set.mark_seen(EntityId(1)));
        assert!(!set.mark_seen(EntityId(1)));
        assert!(!set.mark_seen(EntityId(99)));
        assert_eq!(set.len(), 1);
        assert!(set.contains(EntityId(2)));
    }
}
