//! Run summary.

use crate::inventory::{SweepOutcome, UpsertOutcome, Upserted};
use crate::model::EntityKind;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceReport {
    pub name: String,
    /// Kinds whose records were all processed
    pub completed: BTreeSet<EntityKind>,
    /// Error that aborted the source
    pub failure: Option<String>,
    pub stats: BTreeMap<EntityKind, KindStats>,
}

impl SourceReport {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn record(&mut self, kind: EntityKind, upserted: &Upserted) {
        let stats = self.stats.entry(kind).or_default();
        match upserted.outcome {
            UpsertOutcome::Created => stats.created += 1,
            UpsertOutcome::Updated { .. } => stats.updated += 1,
            UpsertOutcome::Unchanged => stats.unchanged += 1,
        }
        stats.conflicts += upserted.conflicts.len();
    }

    pub fn record_error(&mut self, kind: EntityKind) {
        self.stats.entry(kind).or_default().errors += 1;
    }

    #[must_use]
    pub fn totals(&self) -> KindStats {
        self.stats.values().fold(KindStats::default(), |mut acc, stats| {
            acc.created += stats.created;
            acc.updated += stats.updated;
            acc.unchanged += stats.unchanged;
            acc.conflicts += stats.conflicts;
            acc.errors += stats.errors;
            acc
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub sources: Vec<SourceReport>,
    pub sweeps: BTreeMap<EntityKind, SweepOutcome>,
    /// Kinds not swept because some source did not complete them
    pub skipped_sweeps: Vec<EntityKind>,
    pub sweep_errors: Vec<String>,
}

impl Default for SyncReport {
    fn default() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            sources: Vec::new(),
            sweeps: BTreeMap::new(),
            skipped_sweeps: Vec::new(),
            sweep_errors: Vec::new(),
        }
    }
}

impl SyncReport {
    /// No source aborted and no sweep failed outright.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.sources.iter().all(|source| source.failure.is_none()) && self.sweep_errors.is_empty()
    }

    #[must_use]
    pub fn deleted(&self) -> usize {
        self.sweeps.values().map(|sweep| sweep.deleted.len()).sum()
    }

    pub fn log_summary(&self) {
        for source in &self.sources {
            let totals = source.totals();
            info!(
                run_id = %self.run_id,
                source = %source.name,
                created = totals.created,
                updated = totals.updated,
                unchanged = totals.unchanged,
                conflicts = totals.conflicts,
                errors = totals.errors,
                "Source summary"
            );
            if let Some(failure) = &source.failure {
                warn!(run_id = %self.run_id, source = %source.name, %failure, "Source aborted");
            }
        }
        let failed_deletes: usize = self.sweeps.values().map(|sweep| sweep.failed.len()).sum();
        info!(
            run_id = %self.run_id,
            deleted = self.deleted(),
            failed_deletes,
            skipped_sweeps = self.skipped_sweeps.len(),
            success = self.is_success(),
            "Sync finished"
        );
    }
}
