//! Management surface served by every gateway listener

use fetchfy_core::{ObjectKey, OperatorMetrics, ServiceRegistry};
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, Response, StatusCode};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

/// Request handler for a single gateway's listener
pub struct ManagementRoutes {
    gateway: ObjectKey,
    registry: Arc<ServiceRegistry>,
    metrics: OperatorMetrics,
}

impl ManagementRoutes {
    pub fn new(gateway: ObjectKey, registry: Arc<ServiceRegistry>, metrics: OperatorMetrics) -> Self {
        Self {
            gateway,
            registry,
            metrics,
        }
    }

    /// hyper service entry point
    pub async fn handle(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        Ok(self.route(req.method(), req.uri().path()).await)
    }

    /// Route a request by method and path
    pub async fn route(&self, method: &Method, path: &str) -> Response<Full<Bytes>> {
        debug!("{} {} on gateway {}", method, path, self.gateway);
        self.metrics.record_request(metric_path(path), method.as_str());

        match path {
            "/" => {
                if method != Method::GET {
                    return method_not_allowed();
                }
                text_response(StatusCode::OK, "Fetchfy MCP Gateway: OK")
            }
            "/api/services" => {
                if method != Method::GET {
                    return method_not_allowed();
                }
                let count = self.registry.service_count().await;
                json_response(StatusCode::OK, json!({ "services": count }))
            }
            "/metrics" => {
                if method != Method::GET {
                    return method_not_allowed();
                }
                match self.metrics.gather() {
                    Ok(text) => {
                        let mut response = text_response(StatusCode::OK, text);
                        response.headers_mut().insert(
                            CONTENT_TYPE,
                            HeaderValue::from_static("text/plain; version=0.0.4"),
                        );
                        response
                    }
                    Err(e) => {
                        warn!("Failed to gather metrics: {}", e);
                        text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to gather metrics\n")
                    }
                }
            }
            p if p == "/mcp" || p.starts_with("/mcp/") => {
                // Routing to the backend service is not done here
                debug!("Received MCP request {} {} on gateway {}", method, path, self.gateway);
                json_response(
                    StatusCode::OK,
                    json!({ "status": "ok", "message": "MCP request received" }),
                )
            }
            _ => text_response(StatusCode::NOT_FOUND, "Not Found\n"),
        }
    }
}

/// Bounded label for request metrics
fn metric_path(path: &str) -> &'static str {
    match path {
        "/" => "/",
        "/api/services" => "/api/services",
        "/metrics" => "/metrics",
        p if p == "/mcp" || p.starts_with("/mcp/") => "/mcp",
        _ => "other",
    }
}

fn text_response(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

fn json_response(status: StatusCode, body: serde_json::Value) -> Response<Full<Bytes>> {
    let mut response = text_response(status, body.to_string());
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn method_not_allowed() -> Response<Full<Bytes>> {
    text_response(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed\n")
}
