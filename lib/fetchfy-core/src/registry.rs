//! Service registry for MCP-enabled backend services

use crate::{classify, CoreError, ObjectKey, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use fetchfy_api::{GatewayStatus, McpServiceInfo, ServiceAvailability, ServiceRole};
use k8s_openapi::api::core::v1::{Service, ServiceSpec};
use kube::ResourceExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// ServiceRegistry maintains the MCP services known to the operator
pub struct ServiceRegistry {
    // Map of namespace/name to registration
    services: Arc<RwLock<HashMap<ObjectKey, McpService>>>,
}

/// A registered MCP service
#[derive(Clone, Debug, PartialEq)]
pub struct McpService {
    pub name: String,
    pub namespace: String,
    pub role: ServiceRole,
    pub endpoint: String,
    pub status: ServiceAvailability,
    /// Copy of the backend service spec at registration time
    pub spec: Option<ServiceSpec>,
    pub updated_at: DateTime<Utc>,
}

impl McpService {
    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Summary form published on Gateway status
    pub fn to_status_info(&self) -> McpServiceInfo {
        McpServiceInfo {
            name: self.name.clone(),
            namespace: self.namespace.clone(),
            service_type: self.role,
            endpoint: self.endpoint.clone(),
            status: self.status,
            last_updated: self.updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    fn same_registration(&self, other: &McpService) -> bool {
        self.role == other.role
            && self.endpoint == other.endpoint
            && self.status == other.status
            && self.spec == other.spec
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register or update a service.
    ///
    /// The service must carry annotations. An existing record is replaced;
    /// its timestamp is kept when nothing but the timestamp would change.
    pub async fn register_service(&self, service: &Service, role: ServiceRole) -> Result<McpService> {
        let name = service
            .metadata
            .name
            .clone()
            .ok_or_else(|| CoreError::InvalidService("missing metadata.name".to_string()))?;
        let key = ObjectKey::from_resource(service);

        let annotations = service.annotations();
        if annotations.is_empty() {
            return Err(CoreError::MissingMetadata(key.to_string()));
        }

        let mut record = McpService {
            name,
            namespace: key.namespace.clone(),
            role,
            endpoint: classify::service_endpoint(&key, annotations),
            status: classify::service_availability(service.spec.as_ref()),
            spec: service.spec.clone(),
            updated_at: Utc::now(),
        };

        let mut services = self.services.write().await;
        if let Some(existing) = services.get(&key) {
            if existing.same_registration(&record) {
                record.updated_at = existing.updated_at;
            }
        }
        services.insert(key.clone(), record.clone());

        info!(
            "Registered MCP service {} (type={}, endpoint={}, status={})",
            key, record.role, record.endpoint, record.status
        );
        Ok(record)
    }

    /// Deregister a service, returns whether it was registered
    pub async fn deregister_service(&self, key: &ObjectKey) -> bool {
        let mut services = self.services.write().await;
        if services.remove(key).is_some() {
            info!("Deregistered MCP service {}", key);
            true
        } else {
            debug!("Service {} was not registered", key);
            false
        }
    }

    /// Get a registered service
    pub async fn get_service(&self, key: &ObjectKey) -> Option<McpService> {
        let services = self.services.read().await;
        services.get(key).cloned()
    }

    /// Whether a service is registered
    pub async fn contains(&self, key: &ObjectKey) -> bool {
        let services = self.services.read().await;
        services.contains_key(key)
    }

    /// List all services, in no particular order
    pub async fn list_services(&self) -> Vec<McpService> {
        let services = self.services.read().await;
        services.values().cloned().collect()
    }

    /// Get count of registered services
    pub async fn service_count(&self) -> usize {
        let services = self.services.read().await;
        services.len()
    }

    /// Count of registered services per role
    pub async fn count_by_role(&self) -> HashMap<ServiceRole, usize> {
        let services = self.services.read().await;
        let mut counts = HashMap::new();
        for svc in services.values() {
            *counts.entry(svc.role).or_insert(0) += 1;
        }
        counts
    }

    /// Replace the Gateway's service list with the full registry snapshot.
    ///
    /// Entries are sorted by namespace/name.
    pub async fn project_onto_status(&self, status: &mut GatewayStatus) {
        let mut entries: Vec<(ObjectKey, McpServiceInfo)> = {
            let services = self.services.read().await;
            services
                .iter()
                .map(|(key, svc)| (key.clone(), svc.to_status_info()))
                .collect()
        };
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        status.mcp_services = entries.into_iter().map(|(_, info)| info).collect();
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{MCP_ENABLED_LABEL, MCP_ENDPOINT_ANNOTATION, MCP_TYPE_ANNOTATION};
    use k8s_openapi::api::core::v1::ServicePort;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    fn service(namespace: &str, name: &str, annotations: &[(&str, &str)]) -> Service {
        let annotations: BTreeMap<String, String> = annotations
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Service {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([(
                    MCP_ENABLED_LABEL.to_string(),
                    "true".to_string(),
                )])),
                annotations: (!annotations.is_empty()).then_some(annotations),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                cluster_ip: Some("10.96.0.10".to_string()),
                ports: Some(vec![ServicePort {
                    port: 8080,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_default_endpoint() {
        let registry = ServiceRegistry::new();
        let svc = service("ns", "S1", &[(MCP_TYPE_ANNOTATION, "agent")]);

        let record = registry.register_service(&svc, ServiceRole::Agent).await.unwrap();

        assert_eq!(record.name, "S1");
        assert_eq!(record.namespace, "ns");
        assert_eq!(record.role, ServiceRole::Agent);
        assert_eq!(record.endpoint, "/mcp/ns/S1");
        assert_eq!(record.status, ServiceAvailability::Available);
        assert_eq!(
            registry.get_service(&ObjectKey::new("ns", "S1")).await,
            Some(record)
        );
    }

    #[tokio::test]
    async fn test_register_endpoint_annotation_override() {
        let registry = ServiceRegistry::new();
        let svc = service("ns", "weather", &[(MCP_ENDPOINT_ANNOTATION, "/tools/weather")]);

        let record = registry.register_service(&svc, ServiceRole::Tool).await.unwrap();
        assert_eq!(record.endpoint, "/tools/weather");
    }

    #[tokio::test]
    async fn test_register_without_annotations_fails() {
        let registry = ServiceRegistry::new();
        let svc = service("ns", "bare", &[]);

        let err = registry.register_service(&svc, ServiceRole::Tool).await.unwrap_err();
        assert!(matches!(err, CoreError::MissingMetadata(ref key) if key == "ns/bare"));
        assert_eq!(registry.service_count().await, 0);
    }

    #[tokio::test]
    async fn test_register_overwrites_previous_record() {
        let registry = ServiceRegistry::new();
        let key = ObjectKey::new("ns", "svc");

        let svc = service("ns", "svc", &[(MCP_TYPE_ANNOTATION, "tool")]);
        registry.register_service(&svc, ServiceRole::Tool).await.unwrap();

        let svc = service("ns", "svc", &[(MCP_ENDPOINT_ANNOTATION, "/v2")]);
        registry.register_service(&svc, ServiceRole::Agent).await.unwrap();

        let record = registry.get_service(&key).await.unwrap();
        assert_eq!(record.role, ServiceRole::Agent);
        assert_eq!(record.endpoint, "/v2");
        assert_eq!(registry.service_count().await, 1);
    }

    #[tokio::test]
    async fn test_reregistration_keeps_timestamp_when_unchanged() {
        let registry = ServiceRegistry::new();
        let svc = service("ns", "svc", &[(MCP_TYPE_ANNOTATION, "tool")]);

        let first = registry.register_service(&svc, ServiceRole::Tool).await.unwrap();
        let second = registry.register_service(&svc, ServiceRole::Tool).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_deregister_absent_returns_false() {
        let registry = ServiceRegistry::new();
        assert!(!registry.deregister_service(&ObjectKey::new("ns", "missing")).await);
    }

    #[tokio::test]
    async fn test_deregister_present_returns_true_once() {
        let registry = ServiceRegistry::new();
        let svc = service("ns", "svc", &[(MCP_TYPE_ANNOTATION, "tool")]);
        registry.register_service(&svc, ServiceRole::Tool).await.unwrap();

        let key = ObjectKey::new("ns", "svc");
        assert!(registry.deregister_service(&key).await);
        assert!(!registry.deregister_service(&key).await);
        assert!(!registry.contains(&key).await);
    }

    #[tokio::test]
    async fn test_projection_tracks_registry() {
        let registry = ServiceRegistry::new();
        for name in ["c", "a", "b"] {
            let svc = service("ns", name, &[(MCP_TYPE_ANNOTATION, "tool")]);
            registry.register_service(&svc, ServiceRole::Tool).await.unwrap();
        }

        let mut status = GatewayStatus::default();
        registry.project_onto_status(&mut status).await;
        let names: Vec<_> = status.mcp_services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(status.mcp_services[0].endpoint, "/mcp/ns/a");

        registry.deregister_service(&ObjectKey::new("ns", "b")).await;
        registry.project_onto_status(&mut status).await;
        assert_eq!(status.mcp_services.len(), 2);
        assert!(status.mcp_services.iter().all(|s| s.name != "b"));
    }

    #[tokio::test]
    async fn test_count_by_role() {
        let registry = ServiceRegistry::new();
        let tool = service("ns", "t", &[(MCP_TYPE_ANNOTATION, "tool")]);
        let agent = service("ns", "a", &[(MCP_TYPE_ANNOTATION, "agent")]);
        registry.register_service(&tool, ServiceRole::Tool).await.unwrap();
        registry.register_service(&agent, ServiceRole::Agent).await.unwrap();

        let counts = registry.count_by_role().await;
        assert_eq!(counts.get(&ServiceRole::Tool), Some(&1));
        assert_eq!(counts.get(&ServiceRole::Agent), Some(&1));
    }
}
