//! Fetchfy API types and CRDs for Kubernetes integration
//!
//! This library defines the custom resources for the fetchfy operator:
//! - Gateway: an MCP gateway listener and the services it exposes
//! - LabelSelector: the selector model used to pick backend services

pub mod v1alpha1;

pub use v1alpha1::{
    Condition, Gateway, GatewaySpec, GatewayStatus, LabelSelector, LabelSelectorRequirement,
    McpServiceInfo, SelectorError, ServiceAvailability, ServiceRole,
};
