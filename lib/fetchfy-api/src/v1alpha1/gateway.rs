use crate::v1alpha1::selector::LabelSelector;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Gateway exposes an MCP listener and publishes the MCP-enabled services
/// selected by its `serviceSelector`
#[derive(CustomResource, Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "fetchfy.fetchfy.ai",
    version = "v1alpha1",
    kind = "Gateway",
    plural = "gateways",
    shortname = "mcpgw",
    namespaced,
    derive = "Default",
    derive = "PartialEq",
    status = "GatewayStatus",
    printcolumn = r#"{"name":"Port","type":"integer","jsonPath":".spec.mcpPort","description":"MCP Gateway port"}"#,
    printcolumn = r#"{"name":"Address","type":"string","jsonPath":".status.address","description":"Gateway address"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#,
)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySpec {
    /// Port where the MCP gateway listens
    #[schemars(range(min = 1, max = 65535))]
    pub mcp_port: i32,

    /// Label selector identifying the MCP-enabled services of this gateway
    pub service_selector: LabelSelector,

    /// Whether the listener should terminate TLS
    #[serde(default)]
    pub enable_tls: bool,

    /// Secret holding the TLS certificate and key, required when `enableTls` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_secret_ref: Option<String>,
}

/// Observed state of a Gateway
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    /// Latest observations of the gateway's state
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Registered MCP services.
    ///
    /// Always serialized, an empty list must overwrite a previously published one.
    #[serde(default)]
    pub mcp_services: Vec<McpServiceInfo>,

    /// Address where the MCP gateway is available, e.g. `:8080`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Summary of a registered MCP service as published on the Gateway status
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct McpServiceInfo {
    /// Name of the backend service
    pub name: String,

    /// Namespace of the backend service
    pub namespace: String,

    /// Whether the service is a tool or an agent
    #[serde(rename = "type")]
    pub service_type: ServiceRole,

    /// MCP endpoint path routed to this service
    pub endpoint: String,

    /// Availability of the service
    pub status: ServiceAvailability,

    /// RFC3339 timestamp of the last change to the registration
    pub last_updated: String,
}

/// Role a backend service plays behind the gateway
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ServiceRole {
    #[default]
    Tool,
    Agent,
}

impl ServiceRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceRole::Tool => "tool",
            ServiceRole::Agent => "agent",
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Availability of a registered service, derived from its network exposure
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ServiceAvailability {
    /// Reachable through a cluster address on at least one port
    Available,
    /// Has a cluster address but exposes no port yet
    Pending,
    /// Cannot be reached through a cluster address
    Unavailable,
}

impl ServiceAvailability {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAvailability::Available => "Available",
            ServiceAvailability::Pending => "Pending",
            ServiceAvailability::Unavailable => "Unavailable",
        }
    }
}

impl fmt::Display for ServiceAvailability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition for Gateway status
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition: Ready or Available
    #[serde(rename = "type")]
    pub condition_type: String,

    /// Status: "True", "False", "Unknown"
    pub status: String,

    /// Programmatic reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// RFC3339 time of the last change to this condition
    pub last_transition_time: String,

    /// Generation of the Gateway this condition was computed from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}
