//! # Entity Kinds
//!
//! Static descriptors for every NetBox object type the engine manages: the
//! API collection path, the natural key fields, and the relation fields with
//! the kind each one points at.
//!
//! The variant order of [`EntityKind`] is the dependency order. A kind only
//! references kinds declared before it (or itself), so loading and syncing
//! walk [`EntityKind::SYNC_ORDER`] front to back and the orphan sweep walks
//! it back to front.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Tag,
    CustomField,
    Tenant,
    ContactGroup,
    ContactRole,
    Contact,
    Site,
    Manufacturer,
    Platform,
    DeviceRole,
    DeviceType,
    ClusterGroup,
    ClusterType,
    Cluster,
    Device,
    VlanGroup,
    Vlan,
    VirtualMachine,
    Interface,
    VmInterface,
    IpAddress,
    Prefix,
    ContactAssignment,
}

/// A field holding the id of another CMDB object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relation {
    pub field: &'static str,
    pub target: EntityKind,
}

/// Everything the generic index and upsert code needs to know about a kind.
#[derive(Debug)]
pub struct KindDescriptor {
    /// Collection path below `/api/`, without slashes at either end
    pub api_path: &'static str,
    /// Fields forming the natural key, in key order
    pub key_fields: &'static [&'static str],
    pub relations: &'static [Relation],
    /// Whether objects of this kind carry a `tags` list
    pub taggable: bool,
}

const fn rel(field: &'static str, target: EntityKind) -> Relation {
    Relation { field, target }
}

static TAG: KindDescriptor = KindDescriptor {
    api_path: "extras/tags",
    key_fields: &["name"],
    relations: &[],
    taggable: false,
};

static CUSTOM_FIELD: KindDescriptor = KindDescriptor {
    api_path: "extras/custom-fields",
    key_fields: &["name"],
    relations: &[],
    taggable: false,
};

static TENANT: KindDescriptor = KindDescriptor {
    api_path: "tenancy/tenants",
    key_fields: &["name"],
    relations: &[],
    taggable: true,
};

static CONTACT_GROUP: KindDescriptor = KindDescriptor {
    api_path: "tenancy/contact-groups",
    key_fields: &["name"],
    relations: &[],
    taggable: true,
};

static CONTACT_ROLE: KindDescriptor = KindDescriptor {
    api_path: "tenancy/contact-roles",
    key_fields: &["name"],
    relations: &[],
    taggable: true,
};

static CONTACT: KindDescriptor = KindDescriptor {
    api_path: "tenancy/contacts",
    key_fields: &["name"],
    relations: &[rel("group", EntityKind::ContactGroup)],
    taggable: true,
};

static SITE: KindDescriptor = KindDescriptor {
    api_path: "dcim/sites",
    key_fields: &["name"],
    relations: &[rel("tenant", EntityKind::Tenant)],
    taggable: true,
};

static MANUFACTURER: KindDescriptor = KindDescriptor {
    api_path: "dcim/manufacturers",
    key_fields: &["name"],
    relations: &[],
    taggable: true,
};

static PLATFORM: KindDescriptor = KindDescriptor {
    api_path: "dcim/platforms",
    key_fields: &["name"],
    relations: &[rel("manufacturer", EntityKind::Manufacturer)],
    taggable: true,
};

static DEVICE_ROLE: KindDescriptor = KindDescriptor {
    api_path: "dcim/device-roles",
    key_fields: &["name"],
    relations: &[],
    taggable: true,
};

static DEVICE_TYPE: KindDescriptor = KindDescriptor {
    api_path: "dcim/device-types",
    key_fields: &["model"],
    relations: &[rel("manufacturer", EntityKind::Manufacturer)],
    taggable: true,
};

static CLUSTER_GROUP: KindDescriptor = KindDescriptor {
    api_path: "virtualization/cluster-groups",
    key_fields: &["name"],
    relations: &[],
    taggable: true,
};

static CLUSTER_TYPE: KindDescriptor = KindDescriptor {
    api_path: "virtualization/cluster-types",
    key_fields: &["name"],
    relations: &[],
    taggable: true,
};

static CLUSTER: KindDescriptor = KindDescriptor {
    api_path: "virtualization/clusters",
    key_fields: &["name"],
    relations: &[
        rel("type", EntityKind::ClusterType),
        rel("group", EntityKind::ClusterGroup),
        rel("site", EntityKind::Site),
        rel("tenant", EntityKind::Tenant),
    ],
    taggable: true,
};

static DEVICE: KindDescriptor = KindDescriptor {
    api_path: "dcim/devices",
    key_fields: &["name", "site"],
    relations: &[
        rel("site", EntityKind::Site),
        rel("tenant", EntityKind::Tenant),
        rel("role", EntityKind::DeviceRole),
        rel("device_type", EntityKind::DeviceType),
        rel("platform", EntityKind::Platform),
        rel("cluster", EntityKind::Cluster),
    ],
    taggable: true,
};

static VLAN_GROUP: KindDescriptor = KindDescriptor {
    api_path: "ipam/vlan-groups",
    key_fields: &["name"],
    relations: &[],
    taggable: true,
};

static VLAN: KindDescriptor = KindDescriptor {
    api_path: "ipam/vlans",
    key_fields: &["group", "vid"],
    relations: &[
        rel("group", EntityKind::VlanGroup),
        rel("site", EntityKind::Site),
        rel("tenant", EntityKind::Tenant),
    ],
    taggable: true,
};

static VIRTUAL_MACHINE: KindDescriptor = KindDescriptor {
    api_path: "virtualization/virtual-machines",
    key_fields: &["name"],
    relations: &[
        rel("cluster", EntityKind::Cluster),
        rel("site", EntityKind::Site),
        rel("tenant", EntityKind::Tenant),
        rel("platform", EntityKind::Platform),
        rel("role", EntityKind::DeviceRole),
        rel("device", EntityKind::Device),
    ],
    taggable: true,
};

static INTERFACE: KindDescriptor = KindDescriptor {
    api_path: "dcim/interfaces",
    key_fields: &["device", "name"],
    relations: &[
        rel("device", EntityKind::Device),
        rel("parent", EntityKind::Interface),
        rel("lag", EntityKind::Interface),
        rel("untagged_vlan", EntityKind::Vlan),
    ],
    taggable: true,
};

static VM_INTERFACE: KindDescriptor = KindDescriptor {
    api_path: "virtualization/interfaces",
    key_fields: &["virtual_machine", "name"],
    relations: &[
        rel("virtual_machine", EntityKind::VirtualMachine),
        rel("parent", EntityKind::VmInterface),
        rel("untagged_vlan", EntityKind::Vlan),
    ],
    taggable: true,
};

static IP_ADDRESS: KindDescriptor = KindDescriptor {
    api_path: "ipam/ip-addresses",
    key_fields: &["address"],
    relations: &[rel("tenant", EntityKind::Tenant)],
    taggable: true,
};

static PREFIX: KindDescriptor = KindDescriptor {
    api_path: "ipam/prefixes",
    key_fields: &["prefix"],
    relations: &[
        rel("tenant", EntityKind::Tenant),
        rel("vlan", EntityKind::Vlan),
    ],
    taggable: true,
};

static CONTACT_ASSIGNMENT: KindDescriptor = KindDescriptor {
    api_path: "tenancy/contact-assignments",
    key_fields: &["object_type", "object_id", "contact", "role"],
    relations: &[
        rel("contact", EntityKind::Contact),
        rel("role", EntityKind::ContactRole),
    ],
    taggable: true,
};

impl EntityKind {
    /// Every kind, dependencies first.
    pub const SYNC_ORDER: [EntityKind; 23] = [
        EntityKind::Tag,
        EntityKind::CustomField,
        EntityKind::Tenant,
        EntityKind::ContactGroup,
        EntityKind::ContactRole,
        EntityKind::Contact,
        EntityKind::Site,
        EntityKind::Manufacturer,
        EntityKind::Platform,
        EntityKind::DeviceRole,
        EntityKind::DeviceType,
        EntityKind::ClusterGroup,
        EntityKind::ClusterType,
        EntityKind::Cluster,
        EntityKind::Device,
        EntityKind::VlanGroup,
        EntityKind::Vlan,
        EntityKind::VirtualMachine,
        EntityKind::Interface,
        EntityKind::VmInterface,
        EntityKind::IpAddress,
        EntityKind::Prefix,
        EntityKind::ContactAssignment,
    ];

    #[must_use]
    pub fn descriptor(self) -> &'static KindDescriptor {
        match self {
            EntityKind::Tag => &TAG,
            EntityKind::CustomField => &CUSTOM_FIELD,
            EntityKind::Tenant => &TENANT,
            EntityKind::ContactGroup => &CONTACT_GROUP,
            EntityKind::ContactRole => &CONTACT_ROLE,
            EntityKind::Contact => &CONTACT,
            EntityKind::Site => &SITE,
            EntityKind::Manufacturer => &MANUFACTURER,
            EntityKind::Platform => &PLATFORM,
            EntityKind::DeviceRole => &DEVICE_ROLE,
            EntityKind::DeviceType => &DEVICE_TYPE,
            EntityKind::ClusterGroup => &CLUSTER_GROUP,
            EntityKind::ClusterType => &CLUSTER_TYPE,
            EntityKind::Cluster => &CLUSTER,
            EntityKind::Device => &DEVICE,
            EntityKind::VlanGroup => &VLAN_GROUP,
            EntityKind::Vlan => &VLAN,
            EntityKind::VirtualMachine => &VIRTUAL_MACHINE,
            EntityKind::Interface => &INTERFACE,
            EntityKind::VmInterface => &VM_INTERFACE,
            EntityKind::IpAddress => &IP_ADDRESS,
            EntityKind::Prefix => &PREFIX,
            EntityKind::ContactAssignment => &CONTACT_ASSIGNMENT,
        }
    }

    #[must_use]
    pub fn api_path(self) -> &'static str {
        self.descriptor().api_path
    }

    #[must_use]
    pub fn is_taggable(self) -> bool {
        self.descriptor().taggable
    }

    /// Kind referenced by `field`, or `None` when `field` is a plain attribute.
    #[must_use]
    pub fn relation_target(self, field: &str) -> Option<EntityKind> {
        self.descriptor()
            .relations
            .iter()
            .find(|relation| relation.field == field)
            .map(|relation| relation.target)
    }

    /// Label used in logs, metrics and configuration files.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Tag => "tag",
            EntityKind::CustomField => "custom_field",
            EntityKind::Tenant => "tenant",
            EntityKind::ContactGroup => "contact_group",
            EntityKind::ContactRole => "contact_role",
            EntityKind::Contact => "contact",
            EntityKind::Site => "site",
            EntityKind::Manufacturer => "manufacturer",
            EntityKind::Platform => "platform",
            EntityKind::DeviceRole => "device_role",
            EntityKind::DeviceType => "device_type",
            EntityKind::ClusterGroup => "cluster_group",
            EntityKind::ClusterType => "cluster_type",
            EntityKind::Cluster => "cluster",
            EntityKind::Device => "device",
            EntityKind::VlanGroup => "vlan_group",
            EntityKind::Vlan => "vlan",
            EntityKind::VirtualMachine => "virtual_machine",
            EntityKind::Interface => "interface",
            EntityKind::VmInterface => "vm_interface",
            EntityKind::IpAddress => "ip_address",
            EntityKind::Prefix => "prefix",
            EntityKind::ContactAssignment => "contact_assignment",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
