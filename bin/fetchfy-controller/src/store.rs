//! Cluster access used by the Gateway controller and the Service watcher

use crate::error::Result;
use async_trait::async_trait;
use fetchfy_api::{Gateway, GatewayStatus, LabelSelector};
use fetchfy_core::ObjectKey;
use k8s_openapi::api::core::v1::Service;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client};
use serde_json::json;
use tracing::debug;

/// Reads and writes of cluster objects
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Current Gateway, `None` when it no longer exists
    async fn get_gateway(&self, key: &ObjectKey) -> Result<Option<Gateway>>;

    /// Replace the Gateway's finalizer list
    async fn set_gateway_finalizers(&self, key: &ObjectKey, finalizers: Vec<String>) -> Result<()>;

    /// Persist the Gateway's status subresource
    async fn update_gateway_status(&self, key: &ObjectKey, status: &GatewayStatus) -> Result<()>;

    /// Current Service, `None` when it no longer exists
    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>>;

    /// Services matching a label selector
    async fn list_services(&self, selector: &LabelSelector) -> Result<Vec<Service>>;
}

/// Store backed by the Kubernetes API
pub struct KubeStore {
    client: Client,
    watch_namespace: Option<String>,
}

impl KubeStore {
    pub fn new(client: Client, watch_namespace: Option<String>) -> Self {
        Self {
            client,
            watch_namespace,
        }
    }

    fn gateways(&self, key: &ObjectKey) -> Api<Gateway> {
        Api::namespaced(self.client.clone(), &key.namespace)
    }

    fn services(&self) -> Api<Service> {
        match &self.watch_namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get_gateway(&self, key: &ObjectKey) -> Result<Option<Gateway>> {
        Ok(self.gateways(key).get_opt(&key.name).await?)
    }

    async fn set_gateway_finalizers(&self, key: &ObjectKey, finalizers: Vec<String>) -> Result<()> {
        let patch = json!({ "metadata": { "finalizers": finalizers } });
        self.gateways(key)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Updated finalizers of gateway {}", key);
        Ok(())
    }

    async fn update_gateway_status(&self, key: &ObjectKey, status: &GatewayStatus) -> Result<()> {
        let patch = json!({ "status": status });
        self.gateways(key)
            .patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        debug!("Updated status of gateway {}", key);
        Ok(())
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>> {
        if self
            .watch_namespace
            .as_ref()
            .is_some_and(|ns| *ns != key.namespace)
        {
            return Ok(None);
        }
        let api: Api<Service> = Api::namespaced(self.client.clone(), &key.namespace);
        Ok(api.get_opt(&key.name).await?)
    }

    async fn list_services(&self, selector: &LabelSelector) -> Result<Vec<Service>> {
        let query = selector.to_query()?;
        let params = if query.is_empty() {
            ListParams::default()
        } else {
            ListParams::default().labels(&query)
        };
        let list = self.services().list(&params).await?;
        Ok(list.items)
    }
}
