//! The namespace watcher half of component D: a long-lived task that keeps
//! Root's child list current by translating the cluster's namespace watch
//! stream into ADDED/DELETED events.

use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::runtime::watcher;

use crate::client::ApiClient;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// A live namespace as tracked by the watcher: enough to name a directory
/// and answer `get_stat` without a refetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceInfo {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Holds the live set of namespaces, updated by a background task and read
/// by the tree without ever locking against the writer.
pub struct NamespaceWatcher {
    namespaces: Arc<ArcSwap<Vec<NamespaceInfo>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl NamespaceWatcher {
    /// Seeds the initial namespace list with `initial` and spawns the
    /// background watch loop on `handle`.
    pub fn spawn(
        client: ApiClient,
        initial: Vec<NamespaceInfo>,
        runtime: &tokio::runtime::Handle,
    ) -> Self {
        let namespaces = Arc::new(ArcSwap::from_pointee(initial));
        let task_namespaces = namespaces.clone();
        let handle = runtime.spawn(async move {
            Self::run(client, task_namespaces).await;
        });
        Self { namespaces, handle }
    }

    pub fn namespaces(&self) -> Arc<Vec<NamespaceInfo>> {
        self.namespaces.load_full()
    }

    async fn run(client: ApiClient, namespaces: Arc<ArcSwap<Vec<NamespaceInfo>>>) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            let mut stream = Box::pin(client.watch_namespaces());
            let mut seen: std::collections::HashSet<String> = namespaces
                .load()
                .iter()
                .map(|n| n.name.clone())
                .collect();
            let mut staging: Option<std::collections::HashMap<String, NamespaceInfo>> = None;

            loop {
                match stream.next().await {
                    Some(Ok(event)) => {
                        backoff = INITIAL_BACKOFF;
                        apply_event(&namespaces, &mut seen, &mut staging, event);
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "namespace watch stream error, restarting");
                        break;
                    }
                    None => {
                        tracing::warn!("namespace watch stream ended, restarting");
                        break;
                    }
                }
            }

            tokio::time::sleep(backoff).await;
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }
}

impl Drop for NamespaceWatcher {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// `staging` accumulates the relist triggered by a reconnect: `Init` opens
/// it, `InitApply` fills it, `InitDone` reconciles it against the live list
/// in one swap (adding namespaces that appeared while disconnected, removing
/// any that vanished) — this is the "fresh list+watch cycle" spec.md §4.4
/// requires on stream restart. Without it, a namespace deleted during a
/// disconnect would never be removed, since a relist never emits `Delete`.
fn apply_event(
    namespaces: &Arc<ArcSwap<Vec<NamespaceInfo>>>,
    seen: &mut std::collections::HashSet<String>,
    staging: &mut Option<std::collections::HashMap<String, NamespaceInfo>>,
    event: watcher::Event<Namespace>,
) {
    match event {
        watcher::Event::Apply(ns) => {
            let Some(name) = ns.metadata.name.clone() else { return };
            if seen.insert(name.clone()) {
                let created_at = ns.metadata.creation_timestamp.map(|t| t.0);
                let mut current = (**namespaces.load()).clone();
                current.push(NamespaceInfo { name, created_at });
                namespaces.store(Arc::new(current));
            }
            // already seen: a MODIFIED-shaped event, name is the identity, ignored.
        }
        watcher::Event::Delete(ns) => {
            let Some(name) = ns.metadata.name else { return };
            if seen.remove(&name) {
                let current = (**namespaces.load()).clone();
                let filtered: Vec<NamespaceInfo> =
                    current.into_iter().filter(|n| n.name != name).collect();
                namespaces.store(Arc::new(filtered));
            }
        }
        watcher::Event::Init => {
            *staging = Some(std::collections::HashMap::new());
        }
        watcher::Event::InitApply(ns) => {
            let Some(name) = ns.metadata.name.clone() else { return };
            let created_at = ns.metadata.creation_timestamp.map(|t| t.0);
            staging
                .get_or_insert_with(std::collections::HashMap::new)
                .insert(name.clone(), NamespaceInfo { name, created_at });
        }
        watcher::Event::InitDone => {
            let fresh = staging.take().unwrap_or_default();
            *seen = fresh.keys().cloned().collect();
            let mut reconciled: Vec<NamespaceInfo> = fresh.into_values().collect();
            reconciled.sort_by(|a, b| a.name.cmp(&b.name));
            namespaces.store(Arc::new(reconciled));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn namespace(name: &str) -> Namespace {
        let mut ns = Namespace::default();
        ns.metadata.name = Some(name.to_string());
        ns
    }

    #[test]
    fn apply_adds_new_namespace_once() {
        let namespaces = Arc::new(ArcSwap::from_pointee(vec![NamespaceInfo {
            name: "default".to_string(),
            created_at: None,
        }]));
        let mut seen: std::collections::HashSet<String> =
            namespaces.load().iter().map(|n| n.name.clone()).collect();
        let mut staging = None;

        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::Apply(namespace("demo")));
        assert_eq!(namespaces.load().len(), 2);
        assert_eq!(namespaces.load()[1].name, "demo");

        // Re-applying (MODIFIED-shaped) does not duplicate the entry.
        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::Apply(namespace("demo")));
        assert_eq!(namespaces.load().len(), 2);
    }

    #[test]
    fn delete_removes_namespace_by_name() {
        let namespaces = Arc::new(ArcSwap::from_pointee(vec![
            NamespaceInfo { name: "default".to_string(), created_at: None },
            NamespaceInfo { name: "demo".to_string(), created_at: None },
        ]));
        let mut seen: std::collections::HashSet<String> =
            namespaces.load().iter().map(|n| n.name.clone()).collect();
        let mut staging = None;

        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::Delete(namespace("demo")));
        assert_eq!(namespaces.load().len(), 1);
        assert_eq!(namespaces.load()[0].name, "default");
    }

    #[test]
    fn reconnect_relist_removes_namespace_deleted_while_disconnected() {
        // "demo" existed before the stream dropped; the relist after
        // reconnect never mentions it, so InitDone must drop it even though
        // no Delete event was ever seen.
        let namespaces = Arc::new(ArcSwap::from_pointee(vec![
            NamespaceInfo { name: "default".to_string(), created_at: None },
            NamespaceInfo { name: "demo".to_string(), created_at: None },
        ]));
        let mut seen: std::collections::HashSet<String> =
            namespaces.load().iter().map(|n| n.name.clone()).collect();
        let mut staging = None;

        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::Init);
        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::InitApply(namespace("default")));
        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::InitDone);

        let current = namespaces.load();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].name, "default");
        assert!(seen.contains("default"));
        assert!(!seen.contains("demo"));
    }

    #[test]
    fn reconnect_relist_adds_namespace_created_while_disconnected() {
        let namespaces = Arc::new(ArcSwap::from_pointee(vec![NamespaceInfo {
            name: "default".to_string(),
            created_at: None,
        }]));
        let mut seen: std::collections::HashSet<String> =
            namespaces.load().iter().map(|n| n.name.clone()).collect();
        let mut staging = None;

        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::Init);
        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::InitApply(namespace("default")));
        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::InitApply(namespace("demo")));
        apply_event(&namespaces, &mut seen, &mut staging, watcher::Event::InitDone);

        let mut names: Vec<String> = namespaces.load().iter().map(|n| n.name.clone()).collect();
        names.sort();
        assert_eq!(names, vec!["default".to_string(), "demo".to_string()]);
        assert!(seen.contains("demo"));
    }
}
