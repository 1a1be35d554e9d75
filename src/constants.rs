//! # Constants
//!
//! Shared constants used throughout netbox-ssot.
//!
//! These values represent reasonable defaults and can be overridden via
//! the configuration file or environment variables where applicable.

/// Name of the tag that marks CMDB objects as created and managed by this tool
pub const DEFAULT_OWNERSHIP_TAG: &str = "netbox-ssot";

/// Color of the ownership tag and of the bootstrap device role
pub const DEFAULT_TAG_COLOR: &str = "00add8";

/// Color used for per-source tags
pub const SOURCE_TAG_COLOR: &str = "07426b";

/// Prefix of per-source tag names (`Source: <name>`)
pub const SOURCE_TAG_PREFIX: &str = "Source: ";

/// VLAN group receiving every VLAN that does not name one
pub const DEFAULT_VLAN_GROUP_NAME: &str = "netbox-ssot default vlan group";

/// Lowest VID of the default VLAN group
pub const DEFAULT_VLAN_MIN_VID: u16 = 1;

/// Highest VID of the default VLAN group
pub const DEFAULT_VLAN_MAX_VID: u16 = 4094;

/// Device role assigned to hypervisor hosts
pub const SERVER_DEVICE_ROLE_NAME: &str = "Server";

/// Contact role for administrators of virtual machines
pub const ADMIN_CONTACT_ROLE_NAME: &str = "Admin";

/// Custom field holding the CPU core count of a host
pub const CUSTOM_FIELD_HOST_CPU_CORES: &str = "host_cpu_cores";

/// Custom field holding the memory size of a host
pub const CUSTOM_FIELD_HOST_MEMORY: &str = "host_memory";

/// Custom field holding the identifier an interface has in its source
pub const CUSTOM_FIELD_SOURCE_ID: &str = "source_id";

/// Default configuration file path
pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Default NetBox API port
pub const DEFAULT_NETBOX_PORT: u16 = 443;

/// Default page size for NetBox list requests
pub const DEFAULT_PAGE_LIMIT: usize = 250;

/// Default per-request timeout against the NetBox API (seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default number of attempts for retryable CMDB requests
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 4;

/// Default Fibonacci backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 500;

/// Default Fibonacci backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 10_000;

/// Default log level when neither `RUST_LOG` nor the config sets one
pub const DEFAULT_LOG_LEVEL: &str = "info";
