//! Pact contract tests for the NetBox REST API
//!
//! These tests define the contract between netbox-ssot and the NetBox API
//! endpoints it relies on:
//! - GET /api/{path}/?limit=&offset=&ordering=id - List objects, paginated by id
//! - POST /api/{path}/ - Create an object
//! - PATCH /api/{path}/{id}/ - Partially update an object
//! - DELETE /api/{path}/{id}/ - Delete an object

mod common;

use common::init_rustls;
use netbox_ssot::model::{EntityId, EntityKind};
use netbox_ssot::netbox::{CmdbApi, NetboxClient};
use pact_consumer::prelude::*;
use serde_json::json;
use std::time::Duration;
use zeroize::Zeroizing;

const TOKEN: &str = "test-token";

fn client_for(url: &str) -> NetboxClient {
    init_rustls();
    NetboxClient::new(
        url,
        Zeroizing::new(TOKEN.to_string()),
        Duration::from_secs(5),
        true,
    )
    .expect("Failed to create NetBox client")
}

#[tokio::test]
async fn test_netbox_list_tags_contract() {
    let mut pact_builder = PactBuilder::new("netbox-ssot", "NetBox");

    pact_builder.interaction("list the first page of tags", "", |mut i| {
        i.given("two tags exist");
        i.request
            .method("GET")
            .path("/api/extras/tags/")
            .query_param("limit", "1")
            .query_param("offset", "0")
            .query_param("ordering", "id")
            .header("authorization", "Token test-token");
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({
                "count": 2,
                "next": "http://netbox/api/extras/tags/?limit=1&offset=1",
                "previous": null,
                "results": [
                    {"id": 1, "name": "netbox-ssot", "slug": "netbox-ssot", "color": "00add8"}
                ]
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(mock_server.url().as_str());

    let page = client
        .list_page(EntityKind::Tag, 0, 1)
        .await
        .expect("Failed to list tags");

    assert!(page.has_next);
    assert_eq!(page.results.len(), 1);
    assert_eq!(page.results[0]["slug"], "netbox-ssot");
}

#[tokio::test]
async fn test_netbox_create_tenant_contract() {
    let mut pact_builder = PactBuilder::new("netbox-ssot", "NetBox");

    pact_builder.interaction("create a tenant owned by netbox-ssot", "", |mut i| {
        i.given("the ownership tag exists with id 1");
        i.request
            .method("POST")
            .path("/api/tenancy/tenants/")
            .header("authorization", "Token test-token")
            .header("content-type", "application/json")
            .json_body(json!({
                "name": "acme",
                "slug": "acme",
                "tags": [1]
            }));
        i.response
            .status(201)
            .header("content-type", "application/json")
            .json_body(json!({
                "id": 7,
                "name": "acme",
                "slug": "acme",
                "tags": [{"id": 1, "name": "netbox-ssot", "slug": "netbox-ssot"}],
                "url": "http://netbox/api/tenancy/tenants/7/"
            }));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(mock_server.url().as_str());

    let payload = json!({"name": "acme", "slug": "acme", "tags": [1]});
    let created = client
        .create(EntityKind::Tenant, payload.as_object().expect("object payload"))
        .await
        .expect("Failed to create tenant");

    assert_eq!(created["id"], 7);
}

#[tokio::test]
async fn test_netbox_patch_device_contract() {
    let mut pact_builder = PactBuilder::new("netbox-ssot", "NetBox");

    pact_builder.interaction("patch the serial of a device", "", |mut i| {
        i.given("device 42 exists");
        i.request
            .method("PATCH")
            .path("/api/dcim/devices/42/")
            .header("authorization", "Token test-token")
            .json_body(json!({"serial": "SN-NEW"}));
        i.response
            .status(200)
            .header("content-type", "application/json")
            .json_body(json!({"id": 42, "name": "h1", "serial": "SN-NEW"}));
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(mock_server.url().as_str());

    let payload = json!({"serial": "SN-NEW"});
    let updated = client
        .patch(
            EntityKind::Device,
            EntityId(42),
            payload.as_object().expect("object payload"),
        )
        .await
        .expect("Failed to patch device");

    assert_eq!(updated["serial"], "SN-NEW");
}

#[tokio::test]
async fn test_netbox_delete_vlan_contract() {
    let mut pact_builder = PactBuilder::new("netbox-ssot", "NetBox");

    pact_builder.interaction("delete an orphaned VLAN", "", |mut i| {
        i.given("VLAN 5 exists");
        i.request
            .method("DELETE")
            .path("/api/ipam/vlans/5/")
            .header("authorization", "Token test-token");
        i.response.status(204);
        i
    });

    let mock_server = pact_builder.start_mock_server(None, None);
    let client = client_for(mock_server.url().as_str());

    client
        .delete(EntityKind::Vlan, EntityId(5))
        .await
        .expect("Failed to delete VLAN");
}
