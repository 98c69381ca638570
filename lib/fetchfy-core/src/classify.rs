//! Classification of MCP-enabled services from their labels, annotations and spec

use crate::ObjectKey;
use fetchfy_api::{ServiceAvailability, ServiceRole};
use k8s_openapi::api::core::v1::ServiceSpec;
use std::collections::BTreeMap;

/// Label marking a service as MCP-enabled when set to `"true"`
pub const MCP_ENABLED_LABEL: &str = "mcp-enabled";

/// Annotation selecting the service role, `tool` or `agent`
pub const MCP_TYPE_ANNOTATION: &str = "mcp.fetchfy.ai/type";

/// Annotation overriding the default endpoint path
pub const MCP_ENDPOINT_ANNOTATION: &str = "mcp.fetchfy.ai/endpoint";

/// Whether a label set opts the service into the MCP gateway
pub fn is_mcp_enabled(labels: &BTreeMap<String, String>) -> bool {
    labels.get(MCP_ENABLED_LABEL).is_some_and(|v| v == "true")
}

/// Role from the type annotation; anything but `agent` is a tool
pub fn service_role(annotations: &BTreeMap<String, String>) -> ServiceRole {
    match annotations.get(MCP_TYPE_ANNOTATION).map(String::as_str) {
        Some("agent") => ServiceRole::Agent,
        _ => ServiceRole::Tool,
    }
}

/// Endpoint path, explicit annotation first, then `/mcp/{namespace}/{name}`
pub fn service_endpoint(key: &ObjectKey, annotations: &BTreeMap<String, String>) -> String {
    annotations
        .get(MCP_ENDPOINT_ANNOTATION)
        .cloned()
        .unwrap_or_else(|| format!("/mcp/{}/{}", key.namespace, key.name))
}

/// Availability from network exposure.
///
/// A service has a cluster-internal address unless it is an `ExternalName`
/// service or headless (`clusterIP: None`). With an address and at least one
/// port it is available, with an address and no port it is pending.
pub fn service_availability(spec: Option<&ServiceSpec>) -> ServiceAvailability {
    let Some(spec) = spec else {
        return ServiceAvailability::Unavailable;
    };

    let external_name = spec.type_.as_deref() == Some("ExternalName");
    let headless = spec.cluster_ip.as_deref() == Some("None");
    if external_name || headless {
        return ServiceAvailability::Unavailable;
    }

    if spec.ports.as_ref().is_some_and(|ports| !ports.is_empty()) {
        ServiceAvailability::Available
    } else {
        ServiceAvailability::Pending
    }
}
