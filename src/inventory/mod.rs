//! # Inventory
//!
//! The in-memory picture of the CMDB for one run: per kind, a
//! [`SnapshotIndex`] and an [`OrphanSet`], each kind behind its own async
//! mutex so concurrent sources serialize per kind rather than globally.
//!
//! ## Lifecycle
//!
//! 1. [`Inventory::load`] fetches every kind in dependency order. The
//!    ownership tag is resolved (or created) right after tags are loaded so
//!    every later kind can recognise owned objects.
//! 2. [`Inventory::bootstrap`] ensures the default objects exist.
//! 3. Sources feed candidates to [`Inventory::upsert`].
//! 4. [`Inventory::sweep`] deletes owned objects nobody confirmed.

mod bootstrap;
mod index;
mod orphans;
mod resolve;
mod upsert;

pub use bootstrap::BootstrapReport;
pub use index::{IndexCollision, SnapshotIndex};
pub use orphans::{OrphanSet, SweepOutcome};
pub use upsert::{UpsertOutcome, Upserted};

use crate::constants::{
    DEFAULT_OWNERSHIP_TAG, DEFAULT_PAGE_LIMIT, DEFAULT_TAG_COLOR,
};
use crate::error::{CmdbError, SyncError};
use crate::model::{slugify, Entity, EntityId, EntityKind, NaturalKey, OwnershipMarker};
use crate::netbox::{CmdbApi, RetryPolicy};
use crate::observability::metrics;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, info_span, warn, Instrument};

/// Knobs of the inventory that come from configuration.
#[derive(Debug, Clone)]
pub struct InventorySettings {
    pub page_limit: usize,
    /// Applied to list, PATCH and DELETE requests
    pub retry: RetryPolicy,
    /// Treat matching objects without the ownership tag as owned
    pub adopt_unowned: bool,
    pub ownership_tag: String,
    pub ownership_tag_color: String,
}

impl Default for InventorySettings {
    fn default() -> Self {
        Self {
            page_limit: DEFAULT_PAGE_LIMIT,
            retry: RetryPolicy::default(),
            adopt_unowned: false,
            ownership_tag: DEFAULT_OWNERSHIP_TAG.to_string(),
            ownership_tag_color: DEFAULT_TAG_COLOR.to_string(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct KindState {
    pub(crate) index: SnapshotIndex,
    pub(crate) orphans: OrphanSet,
}

pub struct Inventory {
    api: Arc<dyn CmdbApi>,
    settings: InventorySettings,
    marker: Option<OwnershipMarker>,
    default_vlan_group: Option<EntityId>,
    kinds: BTreeMap<EntityKind, Mutex<KindState>>,
}

impl std::fmt::Debug for Inventory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Inventory")
            .field("settings", &self.settings)
            .field("marker", &self.marker)
            .field("default_vlan_group", &self.default_vlan_group)
            .field("kinds", &self.kinds.len())
            .finish_non_exhaustive()
    }
}

impl Inventory {
    /// Load the complete CMDB state, kind by kind in dependency order.
    ///
    /// # Errors
    ///
    /// Any failure is fatal: a partially loaded index would make the engine
    /// create duplicates and miss orphans.
    pub async fn load(
        api: Arc<dyn CmdbApi>,
        settings: InventorySettings,
    ) -> Result<Self, SyncError> {
        let mut inventory = Self {
            api,
            settings,
            marker: None,
            default_vlan_group: None,
            kinds: BTreeMap::new(),
        };

        for kind in EntityKind::SYNC_ORDER {
            let span = info_span!("inventory.load", %kind);
            let state = inventory.load_kind(kind).instrument(span).await?;
            metrics::set_indexed_entities(kind, state.index.len());
            inventory.kinds.insert(kind, Mutex::new(state));

            if kind == EntityKind::Tag {
                let marker = inventory.ensure_marker().await?;
                info!(id = %marker.id, slug = %marker.slug, "Ownership tag ready");
                inventory.marker = Some(marker);
            }
        }
        Ok(inventory)
    }

    /// Fetch all pages of `kind`.
    ///
    /// Duplicate ids across pages (offset pagination over a changing table)
    /// are skipped. A second id claiming an existing natural key is skipped
    /// too, and is not orphan-tracked, so it is never deleted.
    async fn load_kind(&self, kind: EntityKind) -> Result<KindState, SyncError> {
        let mut state = KindState {
            index: SnapshotIndex::new(kind),
            orphans: OrphanSet::default(),
        };
        let mut seen = HashSet::new();
        let mut offset = 0;
        let limit = self.settings.page_limit.max(1);

        loop {
            let operation = format!("GET {} offset={offset}", kind.api_path());
            let page = self
                .settings
                .retry
                .run(&operation, || self.api.list_page(kind, offset, limit))
                .await
                .map_err(|source| SyncError::IndexLoad { kind, source })?;
            let fetched = page.results.len();

            for record in page.results {
                let entity = Entity::from_api(kind, record, self.marker.as_ref()).map_err(
                    |message| SyncError::IndexLoad {
                        kind,
                        source: CmdbError::Decode {
                            operation: operation.clone(),
                            message,
                        },
                    },
                )?;
                let Some(id) = entity.id else { continue };
                if !seen.insert(id) {
                    warn!(%kind, %id, "Duplicate record across pages, skipping");
                    continue;
                }
                let owned = entity.owned;
                match state.index.insert(entity) {
                    Ok(()) if owned => state.orphans.track(id),
                    Ok(()) => {}
                    Err(collision) => {
                        warn!(%kind, error = %collision, "Duplicate natural key in CMDB, keeping the first record");
                    }
                }
            }

            if !page.has_next || fetched == 0 {
                break;
            }
            offset += fetched;
        }

        debug!(%kind, indexed = state.index.len(), owned = state.orphans.len(), "Loaded");
        Ok(state)
    }

    /// Find or create the ownership tag. Tags are untaggable, so the marker
    /// itself needs no marker.
    async fn ensure_marker(&self) -> Result<OwnershipMarker, SyncError> {
        let name = self.settings.ownership_tag.clone();
        let slug = slugify(&name);
        let tag = Entity::new(EntityKind::Tag)
            .with_field("name", name.as_str())
            .with_field("slug", slug.as_str())
            .with_field("color", self.settings.ownership_tag_color.as_str())
            .with_field("description", "Objects managed by netbox-ssot");
        let stored = self.upsert(tag).await?.entity;
        let id = stored.id.ok_or(SyncError::InvalidRecord {
            kind: EntityKind::Tag,
            message: "ownership tag has no id".to_string(),
        })?;
        let slug = stored
            .field("slug")
            .and_then(|slug| slug.as_str())
            .map_or(slug, str::to_string);
        Ok(OwnershipMarker { id, slug })
    }

    pub(crate) fn state(&self, kind: EntityKind) -> Result<&Mutex<KindState>, SyncError> {
        self.kinds.get(&kind).ok_or(SyncError::NotLoaded { kind })
    }

    #[must_use]
    pub fn settings(&self) -> &InventorySettings {
        &self.settings
    }

    #[must_use]
    pub fn marker(&self) -> Option<&OwnershipMarker> {
        self.marker.as_ref()
    }

    /// Id of the default VLAN group, once bootstrapped.
    #[must_use]
    pub fn default_vlan_group(&self) -> Option<EntityId> {
        self.default_vlan_group
    }

    /// Copy of the indexed entity with `key`.
    pub async fn lookup(&self, kind: EntityKind, key: &NaturalKey) -> Option<Entity> {
        let state = self.state(kind).ok()?.lock().await;
        state.index.get(key).cloned()
    }

    /// Copy of the indexed entity with `id`.
    pub async fn lookup_id(&self, kind: EntityKind, id: EntityId) -> Option<Entity> {
        let state = self.state(kind).ok()?.lock().await;
        state.index.get_by_id(id).cloned()
    }

    pub async fn indexed_count(&self, kind: EntityKind) -> usize {
        match self.state(kind) {
            Ok(state) => state.lock().await.index.len(),
            Err(_) => 0,
        }
    }

    /// Owned entities of `kind` not yet confirmed in this run.
    pub async fn pending_orphans(&self, kind: EntityKind) -> usize {
        match self.state(kind) {
            Ok(state) => state.lock().await.orphans.len(),
            Err(_) => 0,
        }
    }
}
