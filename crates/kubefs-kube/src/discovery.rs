//! The discovery engine (component B): turns the cluster's advertised API
//! surface into the frozen `DiscoveryTables` the node tree resolves
//! against. Grounded in the `Discovery`-once-and-cache pattern used to
//! build a resource manager in this workspace's original Kubernetes
//! integration crate.

use kube::discovery::Discovery;
use kube::Client;
use kubefs_core::{DiscoveryTables, ResourceDescriptor};

use crate::error::Result;

pub struct DiscoveryEngine;

impl DiscoveryEngine {
    /// Runs discovery once against the live cluster and partitions the
    /// result into namespaced/global tables keyed by group then kind.
    pub async fn run(client: Client) -> Result<DiscoveryTables> {
        let discovery = Discovery::new(client).run().await?;
        let mut tables = DiscoveryTables::default();

        for group in discovery.groups() {
            let Some(version) = group.preferred_version() else {
                tracing::warn!(group = group.name(), "no versions advertised for API group");
                continue;
            };
            let resources = group.versioned_resources(version);

            let mut kept = 0usize;
            for (api_resource, capabilities) in &resources {
                if !keep_resource(api_resource, capabilities) {
                    continue;
                }
                let descriptor = ResourceDescriptor {
                    group: api_resource.group.clone(),
                    api_version: api_resource.version.clone(),
                    kind: api_resource.kind.clone(),
                    plural_name: api_resource.plural.clone(),
                    namespaced: capabilities.scope == kube::discovery::Scope::Namespaced,
                    verbs: capabilities.operations.clone(),
                };
                let table = if descriptor.namespaced {
                    &mut tables.namespaced
                } else {
                    &mut tables.global
                };
                table
                    .entry(descriptor.group.clone())
                    .or_default()
                    .entry(descriptor.kind.clone())
                    .or_insert(descriptor);
                kept += 1;
            }

            if kept == 0 {
                tracing::warn!(group = group.name(), "empty resource list for API group");
            }
        }

        Ok(tables)
    }
}

/// Keeps a resource iff it supports both `get` and `list`, and is not a
/// `*List` meta-kind. `kube-rs` exposes no direct "is a list type" flag, so
/// this treats the kind-name suffix as the signal — the same shape of
/// kinds (`PodList`, `NamespaceList`, ...) the distilled source's
/// `base_kind` check was excluding.
fn keep_resource(
    api_resource: &kube::discovery::ApiResource,
    capabilities: &kube::discovery::ApiCapabilities,
) -> bool {
    if api_resource.kind.ends_with("List") {
        return false;
    }
    capabilities.supports_operation("get") && capabilities.supports_operation("list")
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::discovery::{ApiCapabilities, ApiResource, Scope};

    fn resource(kind: &str) -> ApiResource {
        ApiResource {
            group: "apps".to_string(),
            version: "v1".to_string(),
            api_version: "apps/v1".to_string(),
            kind: kind.to_string(),
            plural: kind.to_lowercase(),
        }
    }

    fn capabilities(ops: &[&str]) -> ApiCapabilities {
        ApiCapabilities {
            scope: Scope::Namespaced,
            subresources: vec![],
            operations: ops.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn rejects_list_meta_kind() {
        let r = resource("DeploymentList");
        let c = capabilities(&["get", "list"]);
        assert!(!keep_resource(&r, &c));
    }

    #[test]
    fn rejects_missing_list_verb() {
        let r = resource("Deployment");
        let c = capabilities(&["get"]);
        assert!(!keep_resource(&r, &c));
    }

    #[test]
    fn rejects_missing_get_verb() {
        let r = resource("Deployment");
        let c = capabilities(&["list"]);
        assert!(!keep_resource(&r, &c));
    }

    #[test]
    fn keeps_resource_supporting_get_and_list() {
        let r = resource("Deployment");
        let c = capabilities(&["get", "list", "watch"]);
        assert!(keep_resource(&r, &c));
    }

    // Requires a live cluster; exercised in integration environments only.
    #[tokio::test]
    #[ignore]
    async fn run_against_a_real_cluster() {
        let client = Client::try_default().await.unwrap();
        DiscoveryEngine::run(client).await.unwrap();
    }
}
