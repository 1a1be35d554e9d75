//! # Sources
//!
//! A source is an external inventory that produces canonical records per
//! entity kind. The orchestrator asks every source for every kind in
//! dependency order.

use crate::config::{SourceConfig, SourceType};
use crate::constants::SOURCE_TAG_PREFIX;
use crate::model::{CanonicalRecord, EntityKind};
use anyhow::{Context, Result};
use async_trait::async_trait;

pub mod file;

pub use file::FileSource;

#[async_trait]
pub trait Source: Send + Sync {
    /// Unique name from the configuration
    fn name(&self) -> &str;

    /// Name of the tag attached to every object this source produces
    fn tag(&self) -> String {
        format!("{SOURCE_TAG_PREFIX}{}", self.name())
    }

    /// All records of `kind`; an empty list is a valid answer
    async fn entities(&self, kind: EntityKind) -> Result<Vec<CanonicalRecord>>;
}

/// Open the source described by `config`.
///
/// # Errors
///
/// Returns an error if the source cannot be initialized.
pub async fn from_config(config: &SourceConfig) -> Result<Box<dyn Source>> {
    match config.source_type {
        SourceType::File => {
            let path = config
                .path
                .as_deref()
                .with_context(|| format!("Source `{}` has no path", config.name))?;
            let source = FileSource::open(&config.name, path).await?;
            Ok(Box::new(source))
        }
    }
}
