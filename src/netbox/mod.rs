//! # CMDB API
//!
//! The engine talks to the CMDB only through [`CmdbApi`], so every component
//! above this module can run against an in-memory implementation in tests.
//!
//! [`NetboxClient`] is the production implementation over the NetBox REST API.

use crate::error::CmdbError;
use crate::model::{EntityId, EntityKind};
use async_trait::async_trait;
use serde_json::{Map, Value};

pub mod backoff;
pub mod client;
pub mod retry;

pub use backoff::FibonacciBackoff;
pub use client::NetboxClient;
pub use retry::RetryPolicy;

/// One page of a list request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// Raw records as returned by the API
    pub results: Vec<Value>,
    /// Whether another page follows
    pub has_next: bool,
}

/// CRUD access to one CMDB instance.
#[async_trait]
pub trait CmdbApi: Send + Sync {
    /// Fetch `limit` records of `kind` starting at `offset`, ordered by id
    async fn list_page(
        &self,
        kind: EntityKind,
        offset: usize,
        limit: usize,
    ) -> Result<Page, CmdbError>;

    /// Create an object and return the stored record
    async fn create(&self, kind: EntityKind, payload: &Map<String, Value>)
        -> Result<Value, CmdbError>;

    /// Partially update an object and return the stored record
    async fn patch(
        &self,
        kind: EntityKind,
        id: EntityId,
        payload: &Map<String, Value>,
    ) -> Result<Value, CmdbError>;

    async fn delete(&self, kind: EntityKind, id: EntityId) -> Result<(), CmdbError>;
}
