//! Upsert engine behaviour: partial patches, ownership, relations and retries.

mod common;

use common::{owned_tags, test_settings, upserts_of, Call, FakeCmdb};
use netbox_ssot::error::SyncError;
use netbox_ssot::inventory::{Inventory, UpsertOutcome};
use netbox_ssot::model::{CanonicalRecord, Entity, EntityId, EntityKind, Reference};
use serde_json::json;

/// A CMDB holding the marker, site `dc1` and device `h1` in it.
async fn seeded(owned: bool) -> (FakeCmdb, EntityId, EntityId) {
    let cmdb = FakeCmdb::new();
    let marker = cmdb.seed_marker().await;
    let site = cmdb
        .seed(
            EntityKind::Site,
            json!({"name": "dc1", "slug": "dc1", "tags": owned_tags(marker)}),
        )
        .await;
    let tags = if owned { owned_tags(marker) } else { json!([]) };
    let device = cmdb
        .seed(
            EntityKind::Device,
            json!({
                "name": "h1",
                "site": {"id": site.0, "name": "dc1", "url": "http://netbox/api/dcim/sites/1/"},
                "serial": "SN-OLD",
                "description": "",
                "status": {"value": "active", "label": "Active"},
                "custom_fields": {"host_cpu_cores": "8", "source_id": null},
                "tags": tags,
                "url": "http://netbox/api/dcim/devices/2/",
                "display": "h1",
                "last_updated": "2026-01-01T00:00:00Z"
            }),
        )
        .await;
    (cmdb, site, device)
}

fn device(site: EntityId) -> Entity {
    Entity::new(EntityKind::Device)
        .with_field("name", "h1")
        .with_relation("site", site)
        .with_field("status", "active")
}

#[tokio::test]
async fn test_patch_sends_only_changed_fields() {
    let (cmdb, site, id) = seeded(true).await;
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    cmdb.clear_calls().await;

    let upserted = inventory
        .upsert(device(site).with_field("serial", "SN-NEW"))
        .await
        .unwrap();

    assert_eq!(
        upserted.outcome,
        UpsertOutcome::Updated {
            fields: vec!["serial".to_string()]
        }
    );
    assert_eq!(
        cmdb.calls().await,
        vec![Call::Patch(EntityKind::Device, id, json!({"serial": "SN-NEW"}))]
    );
    assert_eq!(inventory.pending_orphans(EntityKind::Device).await, 0);
}

#[tokio::test]
async fn test_nested_custom_fields_are_diffed_per_key() {
    let (cmdb, site, id) = seeded(true).await;
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    cmdb.clear_calls().await;

    inventory
        .upsert(
            device(site).with_field("custom_fields", json!({"host_cpu_cores": "8", "source_id": "vc-42"})),
        )
        .await
        .unwrap();

    assert_eq!(
        cmdb.calls().await,
        vec![Call::Patch(
            EntityKind::Device,
            id,
            json!({"custom_fields": {"source_id": "vc-42"}})
        )]
    );
    let record = cmdb.record(EntityKind::Device, id).await.unwrap();
    assert_eq!(record["custom_fields"]["host_cpu_cores"], json!("8"));
}

#[tokio::test]
async fn test_unchanged_entity_costs_no_call() {
    let (cmdb, site, _) = seeded(true).await;
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    cmdb.clear_calls().await;
    assert_eq!(inventory.pending_orphans(EntityKind::Device).await, 1);

    let upserted = inventory
        .upsert(device(site).with_field("serial", "SN-OLD"))
        .await
        .unwrap();

    assert_eq!(upserted.outcome, UpsertOutcome::Unchanged);
    assert!(cmdb.calls().await.is_empty());
    assert_eq!(inventory.pending_orphans(EntityKind::Device).await, 0);
}

#[tokio::test]
async fn test_created_entity_carries_marker() {
    let cmdb = FakeCmdb::new();
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    let marker = inventory.marker().unwrap().id;

    let created = inventory
        .add_or_update(
            Entity::new(EntityKind::Tenant)
                .with_field("name", "acme")
                .with_field("slug", "acme"),
        )
        .await
        .unwrap();

    assert!(created.owned);
    let record = cmdb
        .record(EntityKind::Tenant, created.id.unwrap())
        .await
        .unwrap();
    assert_eq!(record["tags"], json!([marker.0]));
}

#[tokio::test]
async fn test_dangling_relation_id_is_rejected() {
    let cmdb = FakeCmdb::new();
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    cmdb.clear_calls().await;

    let err = inventory
        .upsert(
            Entity::new(EntityKind::VirtualMachine)
                .with_field("name", "vm1")
                .with_relation("cluster", EntityId(999)),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::DanglingReference {
            target: EntityKind::Cluster,
            ref field,
            ..
        } if field == "cluster"
    ));
    assert!(err.is_entity_level());
    assert!(cmdb.calls().await.is_empty());
}

#[tokio::test]
async fn test_dangling_self_relation_is_rejected() {
    let (cmdb, _, device) = seeded(true).await;
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();

    let err = inventory
        .upsert(
            Entity::new(EntityKind::Interface)
                .with_relation("device", device)
                .with_field("name", "eth0")
                .with_relation("lag", EntityId(555)),
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SyncError::DanglingReference {
            kind: EntityKind::Interface,
            target: EntityKind::Interface,
            ..
        }
    ));
}

#[tokio::test]
async fn test_relation_given_by_name_is_invalid() {
    let cmdb = FakeCmdb::new();
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();

    let err = inventory
        .upsert(
            Entity::new(EntityKind::Device)
                .with_field("name", "h1")
                .with_field("site", "dc1"),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidRecord { kind: EntityKind::Device, .. }));
}

#[tokio::test]
async fn test_missing_key_field_is_invalid() {
    let cmdb = FakeCmdb::new();
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();

    let err = inventory
        .upsert(Entity::new(EntityKind::Device).with_field("name", "h1"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidRecord { .. }));
    assert!(upserts_of(&cmdb.calls().await, EntityKind::Device).is_empty());
}

#[tokio::test]
async fn test_create_conflict_is_not_retried() {
    let cmdb = FakeCmdb::new();
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    cmdb.reject_creates(EntityKind::Tenant).await;

    let err = inventory
        .upsert(Entity::new(EntityKind::Tenant).with_field("name", "acme"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::CreateConflict { kind: EntityKind::Tenant, .. }));
    assert_eq!(upserts_of(&cmdb.calls().await, EntityKind::Tenant).len(), 1);
    assert_eq!(inventory.indexed_count(EntityKind::Tenant).await, 0);
}

#[tokio::test]
async fn test_transient_patch_is_retried() {
    let (cmdb, site, id) = seeded(true).await;
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    cmdb.clear_calls().await;
    cmdb.fail_next_patches(2).await;

    let upserted = inventory
        .upsert(device(site).with_field("serial", "SN-NEW"))
        .await
        .unwrap();

    assert!(matches!(upserted.outcome, UpsertOutcome::Updated { .. }));
    assert_eq!(cmdb.calls().await.len(), 3);
    assert_eq!(
        cmdb.record(EntityKind::Device, id).await.unwrap()["serial"],
        json!("SN-NEW")
    );
}

#[tokio::test]
async fn test_transient_patch_gives_up_after_max_attempts() {
    let (cmdb, site, _) = seeded(true).await;
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    cmdb.clear_calls().await;
    cmdb.fail_next_patches(10).await;

    let err = inventory
        .upsert(device(site).with_field("serial", "SN-NEW"))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::TransientIo { .. }));
    assert_eq!(cmdb.calls().await.len(), 3);
}

#[tokio::test]
async fn test_unowned_entity_only_gets_empty_fields_filled() {
    let (cmdb, site, id) = seeded(false).await;
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();
    cmdb.clear_calls().await;

    let upserted = inventory
        .upsert(
            device(site)
                .with_field("serial", "SN-NEW")
                .with_field("description", "hypervisor"),
        )
        .await
        .unwrap();

    assert_eq!(upserted.conflicts.len(), 1);
    assert_eq!(upserted.conflicts[0].field, "serial");
    assert!(!upserted.entity.owned);
    assert_eq!(
        cmdb.calls().await,
        vec![Call::Patch(
            EntityKind::Device,
            id,
            json!({"description": "hypervisor"})
        )]
    );
    let record = cmdb.record(EntityKind::Device, id).await.unwrap();
    assert_eq!(record["serial"], json!("SN-OLD"));
    assert_eq!(inventory.pending_orphans(EntityKind::Device).await, 0);
}

#[tokio::test]
async fn test_adopt_unowned_takes_ownership() {
    let (cmdb, site, id) = seeded(false).await;
    let mut settings = test_settings();
    settings.adopt_unowned = true;
    let inventory = Inventory::load(cmdb.api(), settings).await.unwrap();
    let marker = inventory.marker().unwrap().id;
    cmdb.clear_calls().await;

    let upserted = inventory
        .upsert(device(site).with_field("serial", "SN-NEW"))
        .await
        .unwrap();

    assert!(upserted.entity.owned);
    assert!(upserted.conflicts.is_empty());
    assert_eq!(
        cmdb.calls().await,
        vec![Call::Patch(
            EntityKind::Device,
            id,
            json!({"serial": "SN-NEW", "tags": [marker.0]})
        )]
    );
}

#[tokio::test]
async fn test_candidate_resolves_composite_keys() {
    let (cmdb, _, device) = seeded(true).await;
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();

    let record = CanonicalRecord::new().field("name", "eth0").relation(
        "device",
        Reference::key(vec![Some(Reference::name("h1")), Some(Reference::name("dc1"))]),
    );
    let candidate = inventory
        .candidate(EntityKind::Interface, &record)
        .await
        .unwrap();
    assert_eq!(candidate.relation("device"), Some(device));

    let ghost = CanonicalRecord::new().field("name", "eth0").relation(
        "device",
        Reference::key(vec![Some(Reference::name("ghost")), Some(Reference::name("dc1"))]),
    );
    let err = inventory
        .candidate(EntityKind::Interface, &ghost)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::DanglingReference { target: EntityKind::Device, .. }));
}

#[tokio::test]
async fn test_candidate_rejects_relation_in_fields() {
    let cmdb = FakeCmdb::new();
    let inventory = Inventory::load(cmdb.api(), test_settings()).await.unwrap();

    let record = CanonicalRecord::new().field("name", "h1").field("site", 3);
    let err = inventory
        .candidate(EntityKind::Device, &record)
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::InvalidRecord { .. }));
}
