//! The API client facade (component A): authenticated REST calls, URL/GVK
//! construction from a `ResourceDescriptor`, content-type negotiation
//! between the server's JSON wire format and the filesystem's YAML bodies.

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ApiResource, DynamicObject, ListParams, PostParams};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Client, Config as KubeConfig};
use kubefs_core::ResourceDescriptor;

use crate::error::{KubeError, Result};

/// Owns a `kube::Client` built from whichever of the three standard sources
/// (proxy, in-cluster, kubeconfig) the environment selects, and exposes the
/// small set of high-level calls the node tree needs.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    /// Builds a client following the precedence in the mount CLI's
    /// environment-variable contract: `KUBE_API_PROXY` first, then
    /// `KUBE_IN_CLUSTER`, falling back to the user's kubeconfig.
    pub async fn from_env() -> Result<Self> {
        if let Ok(proxy) = std::env::var("KUBE_API_PROXY") {
            return Self::from_proxy(&proxy).await;
        }
        if std::env::var("KUBE_IN_CLUSTER").is_ok() {
            let config = KubeConfig::incluster()
                .map_err(|e| KubeError::ClientConfig(e.to_string()))?;
            let client = Client::try_from(config).map_err(KubeError::Api)?;
            return Ok(Self { client });
        }
        let config = KubeConfig::infer()
            .await
            .map_err(|e| KubeError::ClientConfig(e.to_string()))?;
        let client = Client::try_from(config).map_err(KubeError::Api)?;
        Ok(Self { client })
    }

    async fn from_proxy(base_url: &str) -> Result<Self> {
        let mut config = KubeConfig::new(
            base_url
                .parse()
                .map_err(|e| KubeError::ClientConfig(format!("invalid KUBE_API_PROXY url: {e}")))?,
        );
        config.auth_info = kube::config::AuthInfo::default();
        config.accept_invalid_certs = true;
        let client = Client::try_from(config).map_err(KubeError::Api)?;
        Ok(Self { client })
    }

    pub fn raw_client(&self) -> Client {
        self.client.clone()
    }

    fn api_resource(descriptor: &ResourceDescriptor) -> ApiResource {
        ApiResource {
            group: descriptor.group.clone(),
            version: descriptor.api_version.clone(),
            api_version: if descriptor.group.is_empty() {
                descriptor.api_version.clone()
            } else {
                format!("{}/{}", descriptor.group, descriptor.api_version)
            },
            kind: descriptor.kind.clone(),
            plural: descriptor.plural_name.clone(),
        }
    }

    fn dynamic_api(&self, descriptor: &ResourceDescriptor, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = Self::api_resource(descriptor);
        match (descriptor.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &ar),
            _ => Api::all_with(self.client.clone(), &ar),
        }
    }

    /// The server's raw list response for a kind, used by `KindNode` to
    /// enumerate objects.
    pub async fn list_raw(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: Option<&str>,
    ) -> Result<serde_json::Value> {
        let api = self.dynamic_api(descriptor, namespace);
        let list = api.list(&ListParams::default()).await?;
        Ok(serde_json::to_value(list)?)
    }

    async fn get_object(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        let api = self.dynamic_api(descriptor, namespace);
        Ok(api.get(name).await?)
    }

    /// Fetches an object and re-serializes it as YAML for the filesystem
    /// body. The wire format from `kube` is always JSON; YAML only exists
    /// at this boundary.
    pub async fn get_object_yaml(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<String> {
        let obj = self.get_object(descriptor, namespace, name).await?;
        Ok(serde_yaml::to_string(&obj)?)
    }

    /// Fetches an object as a generic JSON value, for internal callers (the
    /// stat overlay) that only need `metadata.creationTimestamp` and would
    /// rather not pay for a YAML round-trip.
    pub async fn get_object_value(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<serde_json::Value> {
        let obj = self.get_object(descriptor, namespace, name).await?;
        Ok(serde_json::to_value(obj)?)
    }

    /// Replaces an object's body with `yaml_body` via a full PUT
    /// (`Api::replace`), not server-side apply: a field the editor deleted
    /// from the manifest must actually disappear server-side, which only a
    /// whole-body replace guarantees — apply only removes fields owned by
    /// the applying field manager. The body carries whatever
    /// `resourceVersion` `get_object_yaml` last handed the caller, so the
    /// server's optimistic-concurrency check applies normally; a conflict
    /// surfaces to the caller as an ordinary `KubeError`, to be mapped to an
    /// errno, not retried.
    pub async fn put_object_yaml(
        &self,
        descriptor: &ResourceDescriptor,
        namespace: Option<&str>,
        name: &str,
        yaml_body: &str,
    ) -> Result<()> {
        let value: serde_json::Value = serde_yaml::from_str(yaml_body)?;
        let object: DynamicObject = serde_json::from_value(value)?;
        let api = self.dynamic_api(descriptor, namespace);
        api.replace(name, &PostParams::default(), &object).await?;
        Ok(())
    }

    pub async fn list_namespaces(&self) -> Result<Vec<Namespace>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let list = api.list(&ListParams::default()).await?;
        Ok(list.items)
    }

    /// A restartable watch stream of namespace events, used by the
    /// namespace watcher to keep Root's child list current.
    pub fn watch_namespaces(
        &self,
    ) -> impl futures::Stream<Item = std::result::Result<watcher::Event<Namespace>, watcher::Error>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        watcher(api, watcher::Config::default()).default_backoff()
    }
}
