//! kubefs-core - pure data types and tuning config for kubefs
//!
//! This crate has no Kubernetes-client or async dependencies. It provides:
//! - `ResourceDescriptor` / `DiscoveryTables`: the frozen discovery output
//! - `Stat`: the partial stat overlay nodes contribute
//! - `Config`: tuning flags
//! - `ResolveError`: the two path-resolution failure modes

pub mod config;
pub mod error;
pub mod model;

pub use config::Config;
pub use error::{ResolveError, Result as ResolveResult};
pub use model::{DiscoveryTables, ResourceDescriptor, Stat};
