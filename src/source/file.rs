//! File source: canonical records read from a YAML document keyed by kind.
//!
//! ```yaml
//! site:
//!   - fields: {name: dc1, slug: dc1, status: active}
//! device:
//!   - fields: {name: h1, serial: SN1}
//!     relations: {site: dc1, role: Server, device_type: R640}
//! ```

use super::Source;
use crate::model::{CanonicalRecord, EntityKind};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone)]
pub struct FileSource {
    name: String,
    records: BTreeMap<EntityKind, Vec<CanonicalRecord>>,
}

impl FileSource {
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub async fn open(name: &str, path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read source file {}", path.display()))?;
        let source = Self::from_yaml(name, &content)
            .with_context(|| format!("Failed to parse source file {}", path.display()))?;
        info!(
            source = name,
            path = %path.display(),
            records = source.records.values().map(Vec::len).sum::<usize>(),
            "Loaded file source"
        );
        Ok(source)
    }

    /// # Errors
    ///
    /// Returns an error if `content` is not a map of kind to record list.
    pub fn from_yaml(name: &str, content: &str) -> Result<Self> {
        let records: BTreeMap<EntityKind, Vec<CanonicalRecord>> =
            serde_yaml::from_str(content).context("Invalid source document")?;
        Ok(Self::from_records(name, records))
    }

    #[must_use]
    pub fn from_records(name: &str, records: BTreeMap<EntityKind, Vec<CanonicalRecord>>) -> Self {
        Self {
            name: name.to_string(),
            records,
        }
    }
}

#[async_trait]
impl Source for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn entities(&self, kind: EntityKind) -> Result<Vec<CanonicalRecord>> {
        Ok(self.records.get(&kind).cloned().unwrap_or_default())
    }
}
