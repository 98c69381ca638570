//! MCP gateway listeners
//!
//! One listener per Gateway serves the management surface (liveness, service
//! count, metrics) and acknowledges MCP requests. Routing MCP traffic to
//! backends is handled elsewhere.

pub mod error;
pub mod listener;
pub mod pool;
pub mod routes;

pub use error::{ListenerError, Result};
pub use listener::{GatewayListener, ListenerPhase, ListenerSettings, McpListener};
pub use pool::{ListenerFactory, ListenerPool};
pub use routes::ManagementRoutes;
