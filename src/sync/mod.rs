//! # Sync Orchestrator
//!
//! Drives one reconciliation run: every source is asked for every kind in
//! dependency order and each record goes through the upsert engine. Once all
//! sources are done, orphans are swept in reverse dependency order, but only
//! for kinds every source completed. A source that aborted before reaching
//! a kind never confirmed its objects, so sweeping that kind would delete
//! live data.
//!
//! Failure scopes:
//! - entity-level errors are logged, counted and skipped
//! - relation-resolution and source-listing errors abort the current source
//! - index-load and bootstrap errors abort the run

mod report;

pub use report::{KindStats, SourceReport, SyncReport};

use crate::config::Config;
use crate::error::SyncError;
use crate::inventory::{Inventory, InventorySettings};
use crate::model::{CanonicalRecord, Entity, EntityId, EntityKind};
use crate::netbox::{CmdbApi, NetboxClient};
use crate::observability::metrics::{self, EntityOperation};
use crate::relations::SourceRelations;
use crate::source::{self, Source};
use anyhow::{Context, Result};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};

/// A source together with its per-run settings.
pub struct SourceJob {
    pub source: Box<dyn Source>,
    pub relations: SourceRelations,
    /// Per-source tag, set by bootstrap
    pub tag: Option<EntityId>,
}

impl std::fmt::Debug for SourceJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceJob")
            .field("source", &self.source.name())
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl SourceJob {
    #[must_use]
    pub fn new(source: Box<dyn Source>, relations: SourceRelations) -> Self {
        Self {
            source,
            relations,
            tag: None,
        }
    }
}

#[derive(Debug)]
pub struct Orchestrator<'a> {
    inventory: &'a Inventory,
    concurrent: bool,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(inventory: &'a Inventory, concurrent: bool) -> Self {
        Self {
            inventory,
            concurrent,
        }
    }

    /// Sync every job, then sweep.
    pub async fn run(&self, jobs: &[SourceJob]) -> SyncReport {
        let mut report = SyncReport::default();

        report.sources = if self.concurrent {
            join_all(jobs.iter().map(|job| self.sync_source(job))).await
        } else {
            let mut reports = Vec::with_capacity(jobs.len());
            for job in jobs {
                reports.push(self.sync_source(job).await);
            }
            reports
        };

        for kind in EntityKind::SYNC_ORDER.into_iter().rev() {
            let complete = report
                .sources
                .iter()
                .all(|source| source.completed.contains(&kind));
            if !complete {
                warn!(%kind, "Skipping orphan sweep, not every source completed this kind");
                report.skipped_sweeps.push(kind);
                continue;
            }
            match self.inventory.sweep(kind).await {
                Ok(outcome) => {
                    if !outcome.deleted.is_empty() || !outcome.failed.is_empty() {
                        report.sweeps.insert(kind, outcome);
                    }
                }
                Err(SyncError::PartialDeleteFailure { kind, failed }) => {
                    error!(%kind, failed = failed.len(), "Every orphan deletion failed");
                    report
                        .sweep_errors
                        .push(format!("all {} orphaned {kind} deletions failed", failed.len()));
                    report.sweeps.insert(
                        kind,
                        crate::inventory::SweepOutcome {
                            deleted: Vec::new(),
                            failed,
                        },
                    );
                }
                Err(err) => {
                    error!(%kind, error = %err, "Orphan sweep failed");
                    report.sweep_errors.push(err.to_string());
                }
            }
        }

        report.finished_at = Some(Utc::now());
        report
    }

    async fn sync_source(&self, job: &SourceJob) -> SourceReport {
        let name = job.source.name().to_string();
        let span = info_span!("sync.source", source = %name);
        async move {
            let mut report = SourceReport::new(&name);
            for kind in EntityKind::SYNC_ORDER {
                let result = self
                    .sync_kind(job, kind, &mut report)
                    .instrument(info_span!("sync.kind", %kind))
                    .await;
                match result {
                    Ok(()) => {
                        report.completed.insert(kind);
                    }
                    Err(err) => {
                        error!(%kind, error = %err, "Source aborted");
                        metrics::increment_source_failures(&name);
                        report.failure = Some(err.to_string());
                        break;
                    }
                }
            }
            report
        }
        .instrument(span)
        .await
    }

    async fn sync_kind(
        &self,
        job: &SourceJob,
        kind: EntityKind,
        report: &mut SourceReport,
    ) -> Result<(), SyncError> {
        let records = job
            .source
            .entities(kind)
            .await
            .map_err(|err| SyncError::Source {
                source_name: job.source.name().to_string(),
                kind,
                message: format!("{err:#}"),
            })?;
        if records.is_empty() {
            return Ok(());
        }
        info!(%kind, count = records.len(), "Syncing");

        for record in records {
            // A record that fails still counts as reported, so its stored
            // counterpart is not swept.
            let result = match self.prepare(job, kind, &record).await {
                Ok(candidate) => self.inventory.upsert(candidate).await,
                Err(err) => {
                    self.inventory.confirm_record(kind, &record).await;
                    Err(err)
                }
            };
            match result {
                Ok(upserted) => report.record(kind, &upserted),
                Err(err) if err.is_entity_level() => {
                    warn!(%kind, error = %err, "Skipping entity");
                    metrics::record_entity_operation(kind, EntityOperation::Error);
                    report.record_error(kind);
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Resolve references, apply relation rules and attach the source tag.
    async fn prepare(
        &self,
        job: &SourceJob,
        kind: EntityKind,
        record: &CanonicalRecord,
    ) -> Result<Entity, SyncError> {
        let mut candidate = self.inventory.candidate(kind, record).await?;
        self.inventory
            .apply_relation_rules(&mut candidate, &job.relations)
            .await?;
        if let Some(tag) = job.tag {
            if kind.is_taggable() {
                candidate.tags.insert(tag);
            }
        }
        Ok(candidate)
    }
}

/// Load, bootstrap, sync and sweep against `api`.
///
/// # Errors
///
/// Returns an error if the index cannot be loaded or bootstrap fails;
/// source-level failures are reported in the [`SyncReport`].
pub async fn reconcile(
    api: Arc<dyn CmdbApi>,
    settings: InventorySettings,
    mut jobs: Vec<SourceJob>,
    concurrent: bool,
) -> Result<SyncReport, SyncError> {
    let mut inventory = Inventory::load(api, settings).await?;

    let names: Vec<String> = jobs.iter().map(|job| job.source.name().to_string()).collect();
    let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let bootstrap = inventory.bootstrap(&name_refs).await?;
    for job in &mut jobs {
        job.tag = bootstrap.source_tags.get(job.source.name()).copied();
    }

    let report = Orchestrator::new(&inventory, concurrent).run(&jobs).await;
    Ok(report)
}

/// Full run from configuration: NetBox client, sources, reconcile.
///
/// # Errors
///
/// Returns an error if a source cannot be opened, the client cannot be
/// built, or [`reconcile`] fails.
pub async fn run_sync(config: &Config) -> Result<SyncReport> {
    let start = Instant::now();

    let mut jobs = Vec::with_capacity(config.sources.len());
    for source_config in &config.sources {
        let relations = SourceRelations::from_config(source_config)
            .with_context(|| format!("Invalid relation rules in source `{}`", source_config.name))?;
        let source = source::from_config(source_config)
            .await
            .with_context(|| format!("Failed to open source `{}`", source_config.name))?;
        jobs.push(SourceJob::new(source, relations));
    }

    let client = NetboxClient::from_config(&config.netbox)?;
    info!(netbox = %config.netbox.base_url(), sources = jobs.len(), "Starting sync");

    let report = reconcile(
        Arc::new(client),
        config.inventory_settings(),
        jobs,
        config.sync.concurrent_sources,
    )
    .await
    .context("Reconciliation aborted")?;

    metrics::observe_sync_duration(start.elapsed().as_secs_f64());
    report.log_summary();
    Ok(report)
}
