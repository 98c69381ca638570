//! Core registry functionality for the fetchfy operator
//!
//! This library provides:
//! - Object identity keys shared by the registry, listeners and controllers
//! - Classification of MCP-enabled services from labels and annotations
//! - The in-memory MCP service registry
//! - Operator metrics

pub mod classify;
pub mod error;
pub mod key;
pub mod metrics;
pub mod registry;

pub use error::{CoreError, Result};
pub use key::ObjectKey;
pub use metrics::OperatorMetrics;
pub use registry::{McpService, ServiceRegistry};
