//! # Metrics
//!
//! Prometheus metrics for a reconciliation run.
//!
//! ## Metrics Exposed
//!
//! - `netbox_ssot_entity_operations_total{kind, operation}` - Upsert and sweep outcomes
//! - `netbox_ssot_cmdb_requests_total{method, outcome}` - NetBox API requests
//! - `netbox_ssot_cmdb_request_duration_seconds{method}` - NetBox API request latency
//! - `netbox_ssot_indexed_entities{kind}` - Entities in the snapshot index after load
//! - `netbox_ssot_sync_duration_seconds` - Duration of a full run
//! - `netbox_ssot_source_failures_total{source}` - Sources aborted by an error
//!
//! The tool runs as a batch job, so metrics are written in text exposition
//! format to a file for the node exporter textfile collector instead of
//! being served over HTTP.

use crate::model::EntityKind;
use anyhow::{Context, Result};
use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGaugeVec, Opts, Registry,
    TextEncoder,
};
use std::path::Path;
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static ENTITY_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "netbox_ssot_entity_operations_total",
            "Entity operations by kind and outcome",
        ),
        &["kind", "operation"],
    )
    .expect("Failed to create ENTITY_OPERATIONS_TOTAL metric - this should never happen")
});

static CMDB_REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "netbox_ssot_cmdb_requests_total",
            "NetBox API requests by method and outcome",
        ),
        &["method", "outcome"],
    )
    .expect("Failed to create CMDB_REQUESTS_TOTAL metric - this should never happen")
});

static CMDB_REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "netbox_ssot_cmdb_request_duration_seconds",
            "Duration of NetBox API requests in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method"],
    )
    .expect("Failed to create CMDB_REQUEST_DURATION metric - this should never happen")
});

static INDEXED_ENTITIES: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        Opts::new(
            "netbox_ssot_indexed_entities",
            "Entities in the snapshot index after load",
        ),
        &["kind"],
    )
    .expect("Failed to create INDEXED_ENTITIES metric - this should never happen")
});

static SYNC_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "netbox_ssot_sync_duration_seconds",
            "Duration of a full reconciliation run in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0]),
    )
    .expect("Failed to create SYNC_DURATION metric - this should never happen")
});

static SOURCE_FAILURES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "netbox_ssot_source_failures_total",
            "Sources aborted by an unrecoverable error",
        ),
        &["source"],
    )
    .expect("Failed to create SOURCE_FAILURES_TOTAL metric - this should never happen")
});

/// Outcome label of `netbox_ssot_entity_operations_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOperation {
    Created,
    Updated,
    Unchanged,
    Deleted,
    Conflict,
    Error,
}

impl EntityOperation {
    fn as_str(self) -> &'static str {
        match self {
            EntityOperation::Created => "created",
            EntityOperation::Updated => "updated",
            EntityOperation::Unchanged => "unchanged",
            EntityOperation::Deleted => "deleted",
            EntityOperation::Conflict => "conflict",
            EntityOperation::Error => "error",
        }
    }
}

/// # Errors
///
/// Returns an error if a metric is registered twice.
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(ENTITY_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CMDB_REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CMDB_REQUEST_DURATION.clone()))?;
    REGISTRY.register(Box::new(INDEXED_ENTITIES.clone()))?;
    REGISTRY.register(Box::new(SYNC_DURATION.clone()))?;
    REGISTRY.register(Box::new(SOURCE_FAILURES_TOTAL.clone()))?;

    Ok(())
}

pub fn record_entity_operation(kind: EntityKind, operation: EntityOperation) {
    ENTITY_OPERATIONS_TOTAL
        .with_label_values(&[kind.as_str(), operation.as_str()])
        .inc();
}

pub fn observe_cmdb_request(method: &str, duration: f64, success: bool) {
    let outcome = if success { "success" } else { "error" };
    CMDB_REQUESTS_TOTAL
        .with_label_values(&[method, outcome])
        .inc();
    CMDB_REQUEST_DURATION
        .with_label_values(&[method])
        .observe(duration);
}

pub fn set_indexed_entities(kind: EntityKind, count: usize) {
    INDEXED_ENTITIES
        .with_label_values(&[kind.as_str()])
        .set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn observe_sync_duration(duration: f64) {
    SYNC_DURATION.observe(duration);
}

pub fn increment_source_failures(source: &str) {
    SOURCE_FAILURES_TOTAL.with_label_values(&[source]).inc();
}

/// Render every registered metric in text exposition format.
///
/// # Errors
///
/// Returns an error if encoding fails.
pub fn render() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not valid UTF-8")
}

/// Write the metrics textfile atomically (temp file + rename) so the
/// collector never reads a half-written file.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_textfile(path: &Path) -> Result<()> {
    let rendered = render()?;
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, rendered)
        .with_context(|| format!("Failed to write metrics file {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move metrics file to {}", path.display()))?;
    Ok(())
}
