//! In-memory cluster and listener doubles for controller tests

use crate::error::{Error, Result};
use crate::store::ClusterStore;
use async_trait::async_trait;
use chrono::Utc;
use fetchfy_api::{Condition, Gateway, GatewaySpec, GatewayStatus, LabelSelector};
use fetchfy_core::classify::{MCP_ENABLED_LABEL, MCP_TYPE_ANNOTATION};
use fetchfy_core::ObjectKey;
use fetchfy_listener::{GatewayListener, ListenerError, ListenerFactory, ListenerSettings};
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::ObjectMeta;
use kube::core::ErrorResponse;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn api_error(code: u16, reason: &str, message: String) -> Error {
    Error::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_string(),
        message,
        reason: reason.to_string(),
        code,
    }))
}

/// Cluster store mimicking API server semantics for Gateways and Services.
///
/// Deleting a Gateway that carries finalizers only marks it; the object goes
/// away once its finalizer list is emptied.
#[derive(Default)]
pub struct MemoryStore {
    gateways: Mutex<HashMap<ObjectKey, Gateway>>,
    services: Mutex<HashMap<ObjectKey, Service>>,
    failing_status: Mutex<HashSet<ObjectKey>>,
    failing_service_gets: AtomicUsize,
    status_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_gateway(&self, gateway: Gateway) {
        let key = ObjectKey::from_resource(&gateway);
        self.gateways.lock().unwrap().insert(key, gateway);
    }

    pub fn gateway(&self, key: &ObjectKey) -> Option<Gateway> {
        self.gateways.lock().unwrap().get(key).cloned()
    }

    /// Change a Gateway's spec, bumping its generation
    pub fn update_gateway_spec(&self, key: &ObjectKey, update: impl FnOnce(&mut GatewaySpec)) {
        let mut gateways = self.gateways.lock().unwrap();
        let gateway = gateways.get_mut(key).unwrap();
        update(&mut gateway.spec);
        gateway.metadata.generation = Some(gateway.metadata.generation.unwrap_or(0) + 1);
    }

    /// Delete as the API server would
    pub fn delete_gateway(&self, key: &ObjectKey) {
        let mut gateways = self.gateways.lock().unwrap();
        let Some(gateway) = gateways.get_mut(key) else {
            return;
        };
        if gateway.finalizers().is_empty() {
            gateways.remove(key);
        } else {
            gateway.metadata.deletion_timestamp = Some(Time(Utc::now()));
        }
    }

    /// Remove a Gateway ignoring finalizers
    pub fn purge_gateway(&self, key: &ObjectKey) {
        self.gateways.lock().unwrap().remove(key);
    }

    pub fn insert_service(&self, service: Service) {
        let key = ObjectKey::from_resource(&service);
        self.services.lock().unwrap().insert(key, service);
    }

    pub fn remove_service(&self, key: &ObjectKey) {
        self.services.lock().unwrap().remove(key);
    }

    /// Make status updates of one Gateway fail
    pub fn fail_status_for(&self, key: &ObjectKey) {
        self.failing_status.lock().unwrap().insert(key.clone());
    }

    /// Make the next `count` Service reads fail
    pub fn fail_service_gets(&self, count: usize) {
        self.failing_service_gets.store(count, Ordering::SeqCst);
    }

    pub fn clear_status_failures(&self) {
        self.failing_status.lock().unwrap().clear();
    }

    /// Number of successful status updates
    pub fn status_writes(&self) -> usize {
        self.status_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_gateway(&self, key: &ObjectKey) -> Result<Option<Gateway>> {
        Ok(self.gateway(key))
    }

    async fn set_gateway_finalizers(&self, key: &ObjectKey, finalizers: Vec<String>) -> Result<()> {
        let mut gateways = self.gateways.lock().unwrap();
        let gateway = gateways
            .get_mut(key)
            .ok_or_else(|| api_error(404, "NotFound", format!("gateway {key} not found")))?;

        let release = finalizers.is_empty() && gateway.metadata.deletion_timestamp.is_some();
        gateway.metadata.finalizers = (!finalizers.is_empty()).then_some(finalizers);
        if release {
            gateways.remove(key);
        }
        Ok(())
    }

    async fn update_gateway_status(&self, key: &ObjectKey, status: &GatewayStatus) -> Result<()> {
        if self.failing_status.lock().unwrap().contains(key) {
            return Err(api_error(409, "Conflict", format!("gateway {key} was modified")));
        }
        let mut gateways = self.gateways.lock().unwrap();
        let gateway = gateways
            .get_mut(key)
            .ok_or_else(|| api_error(404, "NotFound", format!("gateway {key} not found")))?;
        gateway.status = Some(status.clone());
        self.status_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_service(&self, key: &ObjectKey) -> Result<Option<Service>> {
        let failing = self
            .failing_service_gets
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(api_error(500, "InternalError", "etcdserver: request timed out".to_string()));
        }
        Ok(self.services.lock().unwrap().get(key).cloned())
    }

    async fn list_services(&self, selector: &LabelSelector) -> Result<Vec<Service>> {
        let services: Vec<Service> = self.services.lock().unwrap().values().cloned().collect();
        let mut matched = Vec::new();
        for svc in services {
            if selector.matches(svc.labels())? {
                matched.push(svc);
            }
        }
        Ok(matched)
    }
}

/// Listener double recording lifecycle calls
#[derive(Default)]
pub struct FakeListener {
    settings: Mutex<Option<ListenerSettings>>,
    running: Mutex<Option<ListenerSettings>>,
    fail_start: AtomicBool,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
}

impl FakeListener {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Factory handing out this listener for every gateway
    pub fn factory(self: &Arc<Self>) -> ListenerFactory {
        let listener = self.clone();
        Arc::new(move |_: &ObjectKey| listener.clone() as Arc<dyn GatewayListener>)
    }

    pub fn fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    pub fn is_running_now(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }

    pub fn running_port(&self) -> Option<u16> {
        self.running.lock().unwrap().as_ref().map(|s| s.port)
    }
}

#[async_trait]
impl GatewayListener for FakeListener {
    async fn configure(&self, settings: ListenerSettings) -> bool {
        let restart = self
            .running
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|running| *running != settings);
        *self.settings.lock().unwrap() = Some(settings);
        restart
    }

    async fn start(&self) -> fetchfy_listener::Result<()> {
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(ListenerError::Shutdown("address already in use".to_string()));
        }
        let mut running = self.running.lock().unwrap();
        if running.is_some() {
            return Err(ListenerError::AlreadyStarted("fake".to_string()));
        }
        *running = self.settings.lock().unwrap().clone();
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> fetchfy_listener::Result<()> {
        if self.running.lock().unwrap().take().is_some() {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn is_running(&self) -> bool {
        self.running.lock().unwrap().is_some()
    }
}

/// Gateway selecting MCP-enabled services, without finalizers
pub fn gateway(namespace: &str, name: &str, port: i32) -> Gateway {
    let mut gateway = Gateway::new(
        name,
        GatewaySpec {
            mcp_port: port,
            service_selector: LabelSelector::from_label(MCP_ENABLED_LABEL, "true"),
            ..Default::default()
        },
    );
    gateway.metadata.namespace = Some(namespace.to_string());
    gateway.metadata.generation = Some(1);
    gateway
}

/// MCP-enabled ClusterIP service with one port
pub fn enabled_service(namespace: &str, name: &str, role: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(BTreeMap::from([(
                MCP_ENABLED_LABEL.to_string(),
                "true".to_string(),
            )])),
            annotations: Some(BTreeMap::from([(
                MCP_TYPE_ANNOTATION.to_string(),
                role.to_string(),
            )])),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("ClusterIP".to_string()),
            cluster_ip: Some("10.96.0.20".to_string()),
            ports: Some(vec![ServicePort {
                port: 8080,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn find_condition<'a>(status: &'a GatewayStatus, condition_type: &str) -> Option<&'a Condition> {
    status
        .conditions
        .iter()
        .find(|c| c.condition_type == condition_type)
}
