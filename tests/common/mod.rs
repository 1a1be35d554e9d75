//! Common test utilities
//!
//! An in-memory NetBox that records every write, plus fixtures shared by the
//! inventory, upsert and sync tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use netbox_ssot::error::CmdbError;
use netbox_ssot::inventory::{Inventory, InventorySettings};
use netbox_ssot::model::{EntityId, EntityKind};
use netbox_ssot::netbox::{CmdbApi, Page, RetryPolicy};
use netbox_ssot::relations::SourceRelations;
use netbox_ssot::source::FileSource;
use netbox_ssot::sync::{Orchestrator, SourceJob, SyncReport};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::RwLock;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests that build HTTP clients
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        // Another crate (e.g. the pact mock server) may already have
        // installed a process-wide provider; that one serves just as well.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// A write the engine sent to the CMDB.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Create(EntityKind, Value),
    Patch(EntityKind, EntityId, Value),
    Delete(EntityKind, EntityId),
}

impl Call {
    pub fn kind(&self) -> EntityKind {
        match self {
            Call::Create(kind, _) | Call::Patch(kind, _, _) | Call::Delete(kind, _) => *kind,
        }
    }
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u64,
    records: HashMap<EntityKind, BTreeMap<u64, Value>>,
    calls: Vec<Call>,
    failing_deletes: HashSet<(EntityKind, EntityId)>,
    transient_patch_failures: u32,
    conflicting_creates: HashSet<EntityKind>,
    overlapping_pages: bool,
}

/// In-memory CMDB shared between test and engine.
#[derive(Debug, Clone, Default)]
pub struct FakeCmdb {
    state: Arc<RwLock<FakeState>>,
}

impl FakeCmdb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api(&self) -> Arc<dyn CmdbApi> {
        Arc::new(self.clone())
    }

    /// Store a record as if created by hand; returns its id.
    pub async fn seed(&self, kind: EntityKind, record: Value) -> EntityId {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let id = state.next_id;
        let mut record = record;
        record["id"] = json!(id);
        state.records.entry(kind).or_default().insert(id, record);
        EntityId(id)
    }

    /// Seed the ownership tag so later seeds can be marked owned.
    pub async fn seed_marker(&self) -> EntityId {
        self.seed(
            EntityKind::Tag,
            json!({
                "name": "netbox-ssot",
                "slug": "netbox-ssot",
                "color": "00add8",
                "description": "Objects managed by netbox-ssot"
            }),
        )
        .await
    }

    pub async fn record(&self, kind: EntityKind, id: EntityId) -> Option<Value> {
        let state = self.state.read().await;
        state.records.get(&kind).and_then(|records| records.get(&id.0)).cloned()
    }

    pub async fn records(&self, kind: EntityKind) -> Vec<Value> {
        let state = self.state.read().await;
        state
            .records
            .get(&kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Id of the record of `kind` whose `name` is `name`.
    pub async fn find(&self, kind: EntityKind, name: &str) -> Option<EntityId> {
        self.records(kind)
            .await
            .into_iter()
            .find(|record| record["name"] == json!(name))
            .and_then(|record| record["id"].as_u64())
            .map(EntityId)
    }

    pub async fn calls(&self) -> Vec<Call> {
        self.state.read().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    pub async fn fail_delete(&self, kind: EntityKind, id: EntityId) {
        self.state.write().await.failing_deletes.insert((kind, id));
    }

    pub async fn fail_next_patches(&self, count: u32) {
        self.state.write().await.transient_patch_failures = count;
    }

    pub async fn reject_creates(&self, kind: EntityKind) {
        self.state.write().await.conflicting_creates.insert(kind);
    }

    /// Every page after the first repeats the last record of the previous one.
    pub async fn overlap_pages(&self) {
        self.state.write().await.overlapping_pages = true;
    }
}

#[async_trait]
impl CmdbApi for FakeCmdb {
    async fn list_page(
        &self,
        kind: EntityKind,
        offset: usize,
        limit: usize,
    ) -> Result<Page, CmdbError> {
        let state = self.state.read().await;
        let records: Vec<Value> = state
            .records
            .get(&kind)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default();
        let start = if state.overlapping_pages && offset > 0 {
            offset - 1
        } else {
            offset
        };
        let end = (start + limit).min(records.len());
        let results = records.get(start..end).map(<[Value]>::to_vec).unwrap_or_default();
        Ok(Page {
            results,
            has_next: end < records.len(),
        })
    }

    async fn create(&self, kind: EntityKind, payload: &Map<String, Value>) -> Result<Value, CmdbError> {
        let mut state = self.state.write().await;
        state
            .calls
            .push(Call::Create(kind, Value::Object(payload.clone())));
        if state.conflicting_creates.contains(&kind) {
            return Err(CmdbError::Conflict {
                operation: format!("POST {}", kind.api_path()),
                message: "object with this name already exists".to_string(),
            });
        }
        state.next_id += 1;
        let id = state.next_id;
        let mut record = payload.clone();
        record.insert("id".to_string(), json!(id));
        let record = Value::Object(record);
        state.records.entry(kind).or_default().insert(id, record.clone());
        Ok(record)
    }

    async fn patch(
        &self,
        kind: EntityKind,
        id: EntityId,
        payload: &Map<String, Value>,
    ) -> Result<Value, CmdbError> {
        let mut state = self.state.write().await;
        state
            .calls
            .push(Call::Patch(kind, id, Value::Object(payload.clone())));
        if state.transient_patch_failures > 0 {
            state.transient_patch_failures -= 1;
            return Err(CmdbError::Transient {
                operation: format!("PATCH {}/{id}", kind.api_path()),
                message: "503 Service Unavailable".to_string(),
            });
        }
        let record = state
            .records
            .get_mut(&kind)
            .and_then(|records| records.get_mut(&id.0))
            .ok_or_else(|| CmdbError::NotFound {
                operation: format!("PATCH {}/{id}", kind.api_path()),
            })?;
        for (field, value) in payload {
            match (record.get_mut(field), value) {
                (Some(Value::Object(current)), Value::Object(changes)) => {
                    for (key, change) in changes {
                        current.insert(key.clone(), change.clone());
                    }
                }
                _ => record[field] = value.clone(),
            }
        }
        Ok(record.clone())
    }

    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<(), CmdbError> {
        let mut state = self.state.write().await;
        state.calls.push(Call::Delete(kind, id));
        if state.failing_deletes.contains(&(kind, id)) {
            return Err(CmdbError::Rejected {
                operation: format!("DELETE {}/{id}", kind.api_path()),
                status: 409,
                message: "protected by dependent objects".to_string(),
            });
        }
        state
            .records
            .get_mut(&kind)
            .and_then(|records| records.remove(&id.0))
            .map(|_| ())
            .ok_or_else(|| CmdbError::NotFound {
                operation: format!("DELETE {}/{id}", kind.api_path()),
            })
    }
}

/// Small pages and near-instant retries.
pub fn test_settings() -> InventorySettings {
    InventorySettings {
        page_limit: 2,
        retry: RetryPolicy {
            max_attempts: 3,
            backoff_start: Duration::from_millis(1),
            backoff_max: Duration::from_millis(2),
        },
        ..InventorySettings::default()
    }
}

/// Tag list as NetBox returns it, with the ownership tag.
pub fn owned_tags(marker: EntityId) -> Value {
    json!([{"id": marker.0, "name": "netbox-ssot", "slug": "netbox-ssot"}])
}

pub fn file_job(name: &str, yaml: &str) -> SourceJob {
    SourceJob::new(
        Box::new(FileSource::from_yaml(name, yaml).expect("valid source document")),
        SourceRelations::default(),
    )
}

/// Load, bootstrap and run every job once, keeping the inventory for inspection.
pub async fn sync_once(
    cmdb: &FakeCmdb,
    settings: InventorySettings,
    mut jobs: Vec<SourceJob>,
    concurrent: bool,
) -> (Inventory, SyncReport) {
    let mut inventory = Inventory::load(cmdb.api(), settings)
        .await
        .expect("index load");
    let names: Vec<String> = jobs.iter().map(|job| job.source.name().to_string()).collect();
    let names: Vec<&str> = names.iter().map(String::as_str).collect();
    let bootstrap = inventory.bootstrap(&names).await.expect("bootstrap");
    for job in &mut jobs {
        job.tag = bootstrap.source_tags.get(job.source.name()).copied();
    }
    let report = Orchestrator::new(&inventory, concurrent).run(&jobs).await;
    (inventory, report)
}

/// Writes of `kind` other than deletes.
pub fn upserts_of(calls: &[Call], kind: EntityKind) -> Vec<Call> {
    calls
        .iter()
        .filter(|call| call.kind() == kind && !matches!(call, Call::Delete(..)))
        .cloned()
        .collect()
}
