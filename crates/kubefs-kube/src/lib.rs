//! kubefs-kube - Kubernetes API client, discovery, caching/watch layer and
//! the tree model that resolves paths against a live cluster.

pub mod cache;
pub mod client;
pub mod discovery;
pub mod error;
pub mod node;
pub mod resolver;
pub mod watch;

pub use client::ApiClient;
pub use discovery::DiscoveryEngine;
pub use error::{KubeError, Result};
pub use node::{Node, NodeCaches, NodeContext};
pub use resolver::{resolve, LookupError};
pub use watch::{NamespaceInfo, NamespaceWatcher};
