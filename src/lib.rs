//! netbox-ssot
//!
//! Reconciles external infrastructure inventories into a NetBox CMDB. The
//! engine keeps an in-memory index of NetBox, creates or patches objects
//! reported by sources, and deletes objects it previously created once no
//! source reports them any more.
//!
//! - `model`: entity kinds, natural keys, normalization and diffs
//! - `netbox`: the CMDB API trait and its REST client
//! - `inventory`: snapshot index, orphan tracking, upsert engine, bootstrap
//! - `relations`: regex relation rules
//! - `source`: source adapters
//! - `sync`: the orchestrator

pub mod config;
pub mod constants;
pub mod error;
pub mod inventory;
pub mod model;
pub mod netbox;
pub mod observability;
pub mod relations;
pub mod source;
pub mod sync;

pub use error::{CmdbError, SyncError};
