//! Prometheus metrics for the operator

use crate::{CoreError, Result};
use fetchfy_api::ServiceRole;
use prometheus::{Encoder, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};
use std::collections::HashMap;
use std::sync::Arc;

/// Operator metrics backed by a private Prometheus registry.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct OperatorMetrics {
    /// Number of gateways with a managed listener
    pub gateway_count: IntGauge,
    /// Registered MCP services by type
    pub service_count: IntGaugeVec,
    /// Requests served by gateway listeners
    pub request_count: IntCounterVec,
    /// Errors by kind
    pub error_count: IntCounterVec,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl OperatorMetrics {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let gateway_count = IntGauge::new(
            "fetchfy_gateway_count",
            "Number of MCP gateways managed by the operator",
        )?;
        let service_count = IntGaugeVec::new(
            Opts::new("fetchfy_mcp_service_count", "Number of MCP services by type"),
            &["type"],
        )?;
        let request_count = IntCounterVec::new(
            Opts::new("fetchfy_mcp_request_count", "Number of MCP requests by path"),
            &["path", "method"],
        )?;
        let error_count = IntCounterVec::new(
            Opts::new("fetchfy_error_count", "Number of errors by type"),
            &["type"],
        )?;

        registry.register(Box::new(gateway_count.clone()))?;
        registry.register(Box::new(service_count.clone()))?;
        registry.register(Box::new(request_count.clone()))?;
        registry.register(Box::new(error_count.clone()))?;

        Ok(Self {
            gateway_count,
            service_count,
            request_count,
            error_count,
            registry,
        })
    }

    /// Publish per-role service counts, roles without services report zero
    pub fn observe_services(&self, counts: &HashMap<ServiceRole, usize>) {
        for role in [ServiceRole::Tool, ServiceRole::Agent] {
            let count = counts.get(&role).copied().unwrap_or(0);
            self.service_count
                .with_label_values(&[role.as_str()])
                .set(count as i64);
        }
    }

    pub fn record_request(&self, path: &str, method: &str) {
        self.request_count.with_label_values(&[path, method]).inc();
    }

    pub fn record_error(&self, kind: &str) {
        self.error_count.with_label_values(&[kind]).inc();
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| CoreError::Internal(e.to_string()))
    }
}
