//! Service watcher keeping the registry in sync with MCP-enabled services

use crate::error::{Result, ERROR_RETRY};
use crate::store::ClusterStore;
use fetchfy_api::GatewaySpec;
use fetchfy_core::classify::{is_mcp_enabled, service_role};
use fetchfy_core::{ObjectKey, OperatorMetrics, ServiceRegistry};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client, ResourceExt};
use kube_runtime::watcher::{self, Event};
use kube_runtime::WatchStreamExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// Watches backend Services and pushes registry changes to tracked Gateways
pub struct ServiceWatcher {
    store: Arc<dyn ClusterStore>,
    registry: Arc<ServiceRegistry>,
    metrics: OperatorMetrics,
    // Gateways to refresh on change, with their last seen spec
    gateways: RwLock<HashMap<ObjectKey, GatewaySpec>>,
    // Services whose last reconciliation failed
    pending: Mutex<HashSet<ObjectKey>>,
    // Services seen since the watch last (re)started its initial list
    relist: Mutex<Option<HashSet<ObjectKey>>>,
}

impl ServiceWatcher {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        registry: Arc<ServiceRegistry>,
        metrics: OperatorMetrics,
    ) -> Self {
        Self {
            store,
            registry,
            metrics,
            gateways: RwLock::new(HashMap::new()),
            pending: Mutex::new(HashSet::new()),
            relist: Mutex::new(None),
        }
    }

    /// Track a Gateway, replacing its cached spec
    pub async fn add_gateway(&self, key: ObjectKey, spec: GatewaySpec) {
        let mut gateways = self.gateways.write().await;
        if gateways.insert(key.clone(), spec).is_none() {
            info!("Tracking gateway {}", key);
        }
    }

    /// Stop tracking a Gateway, returns whether it was tracked
    pub async fn remove_gateway(&self, key: &ObjectKey) -> bool {
        let mut gateways = self.gateways.write().await;
        let removed = gateways.remove(key).is_some();
        if removed {
            info!("Stopped tracking gateway {}", key);
        }
        removed
    }

    pub async fn tracked_gateways(&self) -> Vec<ObjectKey> {
        let gateways = self.gateways.read().await;
        gateways.keys().cloned().collect()
    }

    /// Services selected by a Gateway
    pub async fn matching_services(&self, spec: &GatewaySpec) -> Result<Vec<Service>> {
        spec.service_selector.validate()?;
        self.store.list_services(&spec.service_selector).await
    }

    /// Register the MCP-enabled services among `services`.
    ///
    /// Services without the enablement label are skipped. Failures are logged
    /// and do not stop the sweep. Returns the number registered.
    pub async fn register_enabled(&self, services: &[Service]) -> usize {
        let mut registered = 0;
        for svc in services {
            let key = ObjectKey::from_resource(svc);
            if !is_mcp_enabled(svc.labels()) {
                debug!("Skipping service {} without the MCP label", key);
                continue;
            }

            let role = service_role(svc.annotations());
            match self.registry.register_service(svc, role).await {
                Ok(_) => registered += 1,
                Err(e) => {
                    warn!("Failed to register service {}: {}", key, e);
                    self.metrics.record_error("registration");
                }
            }
        }

        self.metrics
            .observe_services(&self.registry.count_by_role().await);
        registered
    }

    /// Bring the registry in line with the current state of one Service.
    ///
    /// Returns whether the registry changed. Tracked Gateways get a status
    /// refresh when it did.
    pub async fn reconcile_service(&self, key: &ObjectKey) -> Result<bool> {
        let before = self.registry.get_service(key).await;

        let changed = match self.store.get_service(key).await? {
            Some(svc) if is_mcp_enabled(svc.labels()) => {
                self.register_enabled(std::slice::from_ref(&svc)).await;
                self.registry.get_service(key).await != before
            }
            Some(_) => {
                debug!("Service {} is no longer MCP-enabled", key);
                self.deregister(key).await
            }
            None => {
                debug!("Service {} no longer exists", key);
                self.deregister(key).await
            }
        };

        if changed {
            self.refresh_gateway_statuses().await;
        }
        Ok(changed)
    }

    async fn deregister(&self, key: &ObjectKey) -> bool {
        let removed = self.registry.deregister_service(key).await;
        if removed {
            self.metrics
                .observe_services(&self.registry.count_by_role().await);
        }
        removed
    }

    /// Project the registry onto every tracked Gateway and persist it.
    ///
    /// A failure for one Gateway is logged and the others are still refreshed.
    pub async fn refresh_gateway_statuses(&self) {
        for key in self.tracked_gateways().await {
            if let Err(e) = self.refresh_gateway_status(&key).await {
                warn!("Failed to refresh status of gateway {}: {}", key, e);
                self.metrics.record_error("status_update");
            }
        }
    }

    async fn refresh_gateway_status(&self, key: &ObjectKey) -> Result<()> {
        let Some(gateway) = self.store.get_gateway(key).await? else {
            debug!("Tracked gateway {} no longer exists", key);
            return Ok(());
        };
        if gateway.metadata.deletion_timestamp.is_some() {
            return Ok(());
        }

        let mut status = gateway.status.clone().unwrap_or_default();
        self.registry.project_onto_status(&mut status).await;
        if gateway.status.as_ref() == Some(&status) {
            return Ok(());
        }

        self.store.update_gateway_status(key, &status).await?;
        debug!(
            "Refreshed gateway {} with {} services",
            key,
            status.mcp_services.len()
        );
        Ok(())
    }

    /// Handle one watch event.
    ///
    /// Applies are processed when the object is enabled now or was registered
    /// before, deletions when the deleted object was enabled. A failed
    /// reconciliation leaves the service queued for `retry_pending`.
    pub async fn handle_event(&self, event: Event<Service>) {
        let (svc, deleted) = match event {
            Event::Apply(svc) => (svc, false),
            Event::InitApply(svc) => {
                if let Some(seen) = self.relist.lock().await.as_mut() {
                    seen.insert(ObjectKey::from_resource(&svc));
                }
                (svc, false)
            }
            Event::Delete(svc) => (svc, true),
            Event::Init => {
                debug!("Service watch (re)started");
                *self.relist.lock().await = Some(HashSet::new());
                return;
            }
            Event::InitDone => {
                debug!("Initial Service list processed");
                let seen = self.relist.lock().await.take();
                if let Some(seen) = seen {
                    self.prune_unseen(&seen).await;
                }
                return;
            }
        };

        let key = ObjectKey::from_resource(&svc);
        let enabled = is_mcp_enabled(svc.labels());
        let relevant = if deleted {
            enabled
        } else {
            enabled || self.registry.contains(&key).await
        };
        if !relevant {
            return;
        }

        self.reconcile_or_queue(&key).await;
    }

    async fn reconcile_or_queue(&self, key: &ObjectKey) {
        match self.reconcile_service(key).await {
            Ok(changed) => {
                self.pending.lock().await.remove(key);
                if changed {
                    debug!("Registry updated for service {}", key);
                }
            }
            Err(e) => {
                warn!(
                    "Failed to reconcile service {}, retrying in {:?}: {}",
                    key, ERROR_RETRY, e
                );
                self.metrics.record_error("service_reconcile");
                self.pending.lock().await.insert(key.clone());
            }
        }
    }

    /// Services waiting for another reconciliation attempt
    pub async fn pending_services(&self) -> Vec<ObjectKey> {
        let pending = self.pending.lock().await;
        pending.iter().cloned().collect()
    }

    /// Reconcile again every service whose last attempt failed
    pub async fn retry_pending(&self) {
        let keys = self.pending_services().await;
        for key in keys {
            debug!("Retrying service {}", key);
            self.reconcile_or_queue(&key).await;
        }
    }

    /// Deregister services a completed relist no longer reports.
    ///
    /// Deletions that happened while the watch was disconnected produce no
    /// delete event, the relist is the only record of them.
    async fn prune_unseen(&self, seen: &HashSet<ObjectKey>) {
        let mut removed = 0;
        for svc in self.registry.list_services().await {
            let key = svc.key();
            if !seen.contains(&key) && self.deregister(&key).await {
                info!("Service {} disappeared while the watch was down", key);
                self.pending.lock().await.remove(&key);
                removed += 1;
            }
        }
        if removed > 0 {
            self.refresh_gateway_statuses().await;
        }
    }

    /// Watch Services until the stream ends
    pub async fn run(self: Arc<Self>, client: Client, namespace: Option<String>) {
        let api: Api<Service> = match &namespace {
            Some(ns) => Api::namespaced(client, ns),
            None => Api::all(client),
        };
        info!(
            "Starting Service watcher ({})",
            namespace.as_deref().unwrap_or("all namespaces")
        );

        let mut stream = watcher::watcher(api, watcher::Config::default())
            .default_backoff()
            .boxed();

        let mut retry = tokio::time::interval(ERROR_RETRY);
        retry.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = stream.next() => {
                    match event {
                        Some(Ok(event)) => self.handle_event(event).await,
                        Some(Err(e)) => {
                            warn!("Service watch error: {}", e);
                            self.metrics.record_error("watch");
                        }
                        None => break,
                    }
                }
                _ = retry.tick() => self.retry_pending().await,
            }
        }

        warn!("Service watcher stream ended");
    }
}
