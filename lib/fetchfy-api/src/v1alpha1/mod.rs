/// API version v1alpha1 for fetchfy CRDs

pub mod gateway;
pub mod selector;

pub use gateway::{
    Condition, Gateway, GatewaySpec, GatewayStatus, McpServiceInfo, ServiceAvailability,
    ServiceRole,
};
pub use selector::{LabelSelector, LabelSelectorRequirement, SelectorError};

/// API group for fetchfy resources
pub const API_GROUP: &str = "fetchfy.fetchfy.ai";
/// API version for fetchfy resources
pub const API_VERSION: &str = "v1alpha1";
