//! # Bootstrap
//!
//! Objects every run relies on, ensured through the regular upsert path so
//! re-running is a no-op:
//!
//! - one tag per source
//! - the default VLAN group, plus moving pre-existing ungrouped VLANs into it
//! - the `Server` device role
//! - the `Admin` contact role for VM administrators
//! - the custom fields sources fill in

use super::Inventory;
use crate::constants::{
    ADMIN_CONTACT_ROLE_NAME, CUSTOM_FIELD_HOST_CPU_CORES, CUSTOM_FIELD_HOST_MEMORY,
    CUSTOM_FIELD_SOURCE_ID, DEFAULT_TAG_COLOR, DEFAULT_VLAN_GROUP_NAME, DEFAULT_VLAN_MAX_VID,
    DEFAULT_VLAN_MIN_VID, SERVER_DEVICE_ROLE_NAME, SOURCE_TAG_COLOR, SOURCE_TAG_PREFIX,
};
use crate::error::SyncError;
use crate::model::{slugify, Entity, EntityId, EntityKind};
use serde::Serialize;
use serde_json::Map;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    /// Tag id per source name
    pub source_tags: BTreeMap<String, EntityId>,
    pub default_vlan_group: Option<EntityId>,
    pub server_role: Option<EntityId>,
    pub admin_contact_role: Option<EntityId>,
    /// VLANs moved into the default group
    pub regrouped_vlans: usize,
}

impl Inventory {
    /// Ensure the default objects exist.
    ///
    /// # Errors
    ///
    /// Any failure is fatal to the run.
    pub async fn bootstrap(&mut self, source_names: &[&str]) -> Result<BootstrapReport, SyncError> {
        let mut report = BootstrapReport::default();

        for name in source_names {
            let tag_name = format!("{SOURCE_TAG_PREFIX}{name}");
            let tag = Entity::new(EntityKind::Tag)
                .with_field("slug", slugify(&tag_name))
                .with_field("name", tag_name)
                .with_field("color", SOURCE_TAG_COLOR)
                .with_field("description", format!("Objects synced from source {name}"));
            let id = committed_id(self.add_or_update(tag).await?)?;
            report.source_tags.insert((*name).to_string(), id);
        }

        let group = Entity::new(EntityKind::VlanGroup)
            .with_field("name", DEFAULT_VLAN_GROUP_NAME)
            .with_field("slug", slugify(DEFAULT_VLAN_GROUP_NAME))
            .with_field("min_vid", DEFAULT_VLAN_MIN_VID)
            .with_field("max_vid", DEFAULT_VLAN_MAX_VID)
            .with_field("description", "Default group for VLANs without one");
        let group_id = committed_id(self.add_or_update(group).await?)?;
        self.default_vlan_group = Some(group_id);
        report.default_vlan_group = Some(group_id);
        report.regrouped_vlans = self.regroup_vlans(group_id).await?;

        let role = Entity::new(EntityKind::DeviceRole)
            .with_field("name", SERVER_DEVICE_ROLE_NAME)
            .with_field("slug", slugify(SERVER_DEVICE_ROLE_NAME))
            .with_field("color", DEFAULT_TAG_COLOR)
            .with_field("vm_role", true);
        report.server_role = Some(committed_id(self.add_or_update(role).await?)?);

        let admin = Entity::new(EntityKind::ContactRole)
            .with_field("name", ADMIN_CONTACT_ROLE_NAME)
            .with_field("slug", slugify(ADMIN_CONTACT_ROLE_NAME))
            .with_field("description", "Administrators of virtual machines");
        report.admin_contact_role = Some(committed_id(self.add_or_update(admin).await?)?);

        for field in custom_fields() {
            self.add_or_update(field).await?;
        }

        info!(
            sources = report.source_tags.len(),
            default_vlan_group = %group_id,
            regrouped_vlans = report.regrouped_vlans,
            "Bootstrap complete"
        );
        Ok(report)
    }

    /// Move every indexed VLAN without a group into `group`, re-keying it.
    /// A VLAN whose VID is already taken in `group` stays where it is.
    async fn regroup_vlans(&self, group: EntityId) -> Result<usize, SyncError> {
        let mut state = self.state(EntityKind::Vlan)?.lock().await;
        let ungrouped: Vec<Entity> = state
            .index
            .iter()
            .filter(|vlan| vlan.relation("group").is_none())
            .cloned()
            .collect();

        let mut payload = Map::new();
        payload.insert("group".to_string(), group.into());

        let mut moved = 0;
        for mut vlan in ungrouped {
            let Some(id) = vlan.id else { continue };
            vlan.fields.insert("group".to_string(), group.into());
            let key = vlan.natural_key();
            if let Some(holder) = state.index.get(&key).and_then(|other| other.id) {
                warn!(
                    %id,
                    held_by = %holder,
                    %key,
                    "Default group already has this VID, leaving VLAN ungrouped"
                );
                continue;
            }

            let operation = format!("PATCH {}/{id}", EntityKind::Vlan.api_path());
            let result = self
                .settings
                .retry
                .run(&operation, || self.api.patch(EntityKind::Vlan, id, &payload))
                .await;
            if let Err(err) = result {
                warn!(%id, error = %err, "Failed to move VLAN into the default group");
                continue;
            }

            match state.index.insert(vlan) {
                Ok(()) => moved += 1,
                Err(collision) => {
                    warn!(error = %collision, "Regrouped VLAN collides with an indexed one");
                }
            }
        }
        if moved > 0 {
            info!(count = moved, %group, "Moved ungrouped VLANs into the default group");
        }
        Ok(moved)
    }
}

fn committed_id(entity: Entity) -> Result<EntityId, SyncError> {
    entity.id.ok_or_else(|| SyncError::InvalidRecord {
        kind: entity.kind,
        message: "committed entity has no id".to_string(),
    })
}

fn custom_fields() -> Vec<Entity> {
    [
        (
            CUSTOM_FIELD_HOST_CPU_CORES,
            "Host CPU cores",
            "Number of CPU cores on the host",
            vec!["dcim.device"],
        ),
        (
            CUSTOM_FIELD_HOST_MEMORY,
            "Host memory",
            "Amount of memory on the host",
            vec!["dcim.device"],
        ),
        (
            CUSTOM_FIELD_SOURCE_ID,
            "Source ID",
            "Identifier of the object in its source",
            vec!["dcim.interface", "virtualization.vminterface"],
        ),
    ]
    .into_iter()
    .map(|(name, label, description, object_types)| {
        Entity::new(EntityKind::CustomField)
            .with_field("name", name)
            .with_field("label", label)
            .with_field("type", "text")
            .with_field("object_types", object_types)
            .with_field("description", description)
            .with_field("filter_logic", "loose")
            .with_field("search_weight", 1000)
            .with_field("weight", 100)
    })
    .collect()
}
