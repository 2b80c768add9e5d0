//! SQLite storage for ingest: the fused project auth lookup and the per-issue
//! search vector read-modify-write.

pub mod config;
pub mod metrics_defs;
mod schema;
mod store;

pub use config::{Config, StoreConfig};
pub use store::{IssueAppend, IssueId, NewOrganization, NewProject, Store, StoreError};
