//! # Configuration
//!
//! YAML configuration file with environment overrides.
//!
//! ```yaml
//! logger:
//!   level: info          # LOG_LEVEL
//!   format: text         # LOG_FORMAT (text | json)
//! netbox:
//!   hostname: netbox.example.com
//!   api_token: "..."     # NETBOX_API_TOKEN
//!   port: 443
//!   http_scheme: https
//!   validate_cert: true
//!   timeout_secs: 30
//!   tag: netbox-ssot
//!   tag_color: 00add8
//! sync:
//!   concurrent_sources: false   # SSOT_CONCURRENT_SOURCES
//!   adopt_unowned: false        # SSOT_ADOPT_UNOWNED
//!   page_limit: 250
//!   retry_attempts: 4
//!   backoff_start_ms: 500
//!   backoff_max_ms: 10000
//! metrics:
//!   textfile: /var/lib/node_exporter/netbox_ssot.prom
//! sources:
//!   - name: lab
//!     type: file
//!     path: inventory.yaml
//!     host_site_relations: ["^lab-.* = Lab"]
//! ```

mod env;

use crate::constants::{
    DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_LOG_LEVEL, DEFAULT_NETBOX_PORT,
    DEFAULT_OWNERSHIP_TAG, DEFAULT_PAGE_LIMIT, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_TAG_COLOR,
};
use crate::inventory::InventorySettings;
use crate::netbox::RetryPolicy;
use crate::relations::SourceRelations;
use anyhow::{bail, Context, Result};
use env::{env_var_or_default, env_var_or_default_bool, env_var_or_default_str};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logger: LoggerConfig,
    pub netbox: NetboxConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggerConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}`")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpScheme {
    Http,
    #[default]
    Https,
}

#[derive(Clone, Deserialize)]
pub struct NetboxConfig {
    pub hostname: String,
    #[serde(default, deserialize_with = "deserialize_token")]
    pub api_token: Zeroizing<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub http_scheme: HttpScheme,
    #[serde(default = "default_true")]
    pub validate_cert: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the ownership tag
    #[serde(default = "default_tag")]
    pub tag: String,
    #[serde(default = "default_tag_color")]
    pub tag_color: String,
}

impl std::fmt::Debug for NetboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetboxConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("http_scheme", &self.http_scheme)
            .field("validate_cert", &self.validate_cert)
            .field("timeout_secs", &self.timeout_secs)
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl NetboxConfig {
    #[must_use]
    pub fn base_url(&self) -> String {
        let scheme = match self.http_scheme {
            HttpScheme::Http => "http",
            HttpScheme::Https => "https",
        };
        format!("{scheme}://{}:{}", self.hostname, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Run sources in parallel instead of one after another
    #[serde(default)]
    pub concurrent_sources: bool,
    /// Take over matching objects that lack the ownership tag
    #[serde(default)]
    pub adopt_unowned: bool,
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_backoff_start_ms")]
    pub backoff_start_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrent_sources: false,
            adopt_unowned: false,
            page_limit: default_page_limit(),
            retry_attempts: default_retry_attempts(),
            backoff_start_ms: default_backoff_start_ms(),
            backoff_max_ms: default_backoff_max_ms(),
        }
    }
}

impl SyncConfig {
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry_attempts.max(1),
            backoff_start: Duration::from_millis(self.backoff_start_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricsConfig {
    /// Prometheus textfile written at the end of a run
    #[serde(default)]
    pub textfile: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    File,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// `"<regex> = <site>"` rules applied to clusters
    #[serde(default)]
    pub cluster_site_relations: Vec<String>,
    /// `"<regex> = <site>"` rules applied to hosts
    #[serde(default)]
    pub host_site_relations: Vec<String>,
    #[serde(default)]
    pub cluster_tenant_relations: Vec<String>,
    #[serde(default)]
    pub host_tenant_relations: Vec<String>,
    #[serde(default)]
    pub vm_tenant_relations: Vec<String>,
}

impl Config {
    /// Read the configuration file, apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if validation fails.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse without environment overrides or validation.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML does not match the configuration schema.
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Invalid configuration")
    }

    pub fn apply_env_overrides(&mut self) {
        let token = env_var_or_default_str("NETBOX_API_TOKEN", &self.netbox.api_token);
        self.netbox.api_token = Zeroizing::new(token);
        self.logger.level = env_var_or_default_str("LOG_LEVEL", &self.logger.level);
        self.logger.format = env_var_or_default("LOG_FORMAT", self.logger.format);
        self.sync.concurrent_sources =
            env_var_or_default_bool("SSOT_CONCURRENT_SOURCES", self.sync.concurrent_sources);
        self.sync.adopt_unowned =
            env_var_or_default_bool("SSOT_ADOPT_UNOWNED", self.sync.adopt_unowned);
    }

    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.netbox.hostname.trim().is_empty() {
            bail!("netbox.hostname must not be empty");
        }
        if self.netbox.api_token.trim().is_empty() {
            bail!("netbox.api_token must not be empty (set it in the config or NETBOX_API_TOKEN)");
        }
        if self.netbox.tag.trim().is_empty() {
            bail!("netbox.tag must not be empty");
        }
        if self.sync.page_limit == 0 {
            bail!("sync.page_limit must be greater than zero");
        }
        if self.sources.is_empty() {
            bail!("at least one source must be configured");
        }

        let mut names = HashSet::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                bail!("source name must not be empty");
            }
            if !names.insert(source.name.as_str()) {
                bail!("duplicate source name `{}`", source.name);
            }
            match source.source_type {
                SourceType::File if source.path.is_none() => {
                    bail!("source `{}` of type file needs a path", source.name);
                }
                SourceType::File => {}
            }
            SourceRelations::from_config(source)
                .with_context(|| format!("Invalid relation rules in source `{}`", source.name))?;
        }
        Ok(())
    }

    #[must_use]
    pub fn inventory_settings(&self) -> InventorySettings {
        InventorySettings {
            page_limit: self.sync.page_limit,
            retry: self.sync.retry_policy(),
            adopt_unowned: self.sync.adopt_unowned,
            ownership_tag: self.netbox.tag.clone(),
            ownership_tag_color: self.netbox.tag_color.clone(),
        }
    }
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<Zeroizing<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Zeroizing::new)
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_port() -> u16 {
    DEFAULT_NETBOX_PORT
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_tag() -> String {
    DEFAULT_OWNERSHIP_TAG.to_string()
}

fn default_tag_color() -> String {
    DEFAULT_TAG_COLOR.to_string()
}

fn default_page_limit() -> usize {
    DEFAULT_PAGE_LIMIT
}

fn default_retry_attempts() -> u32 {
    DEFAULT_RETRY_ATTEMPTS
}

fn default_backoff_start_ms() -> u64 {
    DEFAULT_BACKOFF_START_MS
}

fn default_backoff_max_ms() -> u64 {
    DEFAULT_BACKOFF_MAX_MS
}
