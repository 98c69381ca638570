//! Per-gateway listener lifecycle
//!
//! State machine: Unconfigured -> Configured -> Running -> Stopped, with
//! repeated `configure` calls allowed in any state and `start` required to go
//! from Stopped back to Running.
//!
//! Settings are applied on (re)start. `configure` on a running listener only
//! records the new settings and reports whether a restart is needed; open
//! connections are never touched by it.

use crate::routes::ManagementRoutes;
use crate::{ListenerError, Result};
use fetchfy_core::{ObjectKey, OperatorMetrics, ServiceRegistry};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// How long `stop` waits for open connections to finish
const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept, e.g. when out of file descriptors
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Desired listener configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerSettings {
    pub host: IpAddr,
    pub port: u16,
    /// Secret holding the TLS material, `None` for plaintext
    pub tls_secret_ref: Option<String>,
}

impl ListenerSettings {
    pub fn new(port: u16) -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            tls_secret_ref: None,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Lifecycle contract of a gateway listener.
///
/// Implementations serialise all calls internally.
#[async_trait::async_trait]
pub trait GatewayListener: Send + Sync {
    /// Record new settings. Returns true when the listener is running with
    /// different settings and must be restarted for them to apply.
    async fn configure(&self, settings: ListenerSettings) -> bool;

    /// Start accepting on the configured address
    async fn start(&self) -> Result<()>;

    /// Stop accepting and drain open connections; no-op when not running
    async fn stop(&self) -> Result<()>;

    async fn is_running(&self) -> bool;
}

/// Lifecycle phase of a listener
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerPhase {
    Unconfigured,
    Configured,
    Running,
    Stopped,
}

struct RunningListener {
    settings: ListenerSettings,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct ListenerState {
    settings: Option<ListenerSettings>,
    running: Option<RunningListener>,
    stopped: bool,
}

/// HTTP/1.1 listener serving the management surface of one gateway
pub struct McpListener {
    gateway: ObjectKey,
    registry: Arc<ServiceRegistry>,
    metrics: OperatorMetrics,
    // Held for the whole of start and stop, including the drain
    lifecycle: Mutex<()>,
    state: Mutex<ListenerState>,
}

impl McpListener {
    pub fn new(gateway: ObjectKey, registry: Arc<ServiceRegistry>, metrics: OperatorMetrics) -> Self {
        Self {
            gateway,
            registry,
            metrics,
            lifecycle: Mutex::new(()),
            state: Mutex::new(ListenerState::default()),
        }
    }

    pub async fn phase(&self) -> ListenerPhase {
        let state = self.state.lock().await;
        match (&state.settings, &state.running) {
            (_, Some(_)) => ListenerPhase::Running,
            (None, None) => ListenerPhase::Unconfigured,
            (Some(_), None) if state.stopped => ListenerPhase::Stopped,
            (Some(_), None) => ListenerPhase::Configured,
        }
    }

    /// Address actually bound while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let state = self.state.lock().await;
        state.running.as_ref().map(|r| r.local_addr)
    }
}

#[async_trait::async_trait]
impl GatewayListener for McpListener {
    async fn configure(&self, settings: ListenerSettings) -> bool {
        let mut state = self.state.lock().await;

        if state.settings.as_ref() != Some(&settings) {
            info!(
                "Configured MCP listener for gateway {} (port={}, tls={})",
                self.gateway,
                settings.port,
                settings.tls_secret_ref.is_some()
            );
        }

        let restart = state
            .running
            .as_ref()
            .is_some_and(|running| running.settings != settings);
        if restart {
            info!(
                "Listener for gateway {} will apply new settings on restart",
                self.gateway
            );
        }

        state.settings = Some(settings);
        restart
    }

    async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;
        let mut state = self.state.lock().await;

        if state.running.is_some() {
            return Err(ListenerError::AlreadyStarted(self.gateway.to_string()));
        }
        let settings = state
            .settings
            .clone()
            .ok_or_else(|| ListenerError::NotConfigured(self.gateway.to_string()))?;
        if let Some(secret) = &settings.tls_secret_ref {
            return Err(ListenerError::TlsUnsupported(secret.clone()));
        }

        let addr = settings.bind_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        let routes = Arc::new(ManagementRoutes::new(
            self.gateway.clone(),
            self.registry.clone(),
            self.metrics.clone(),
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, local_addr, routes, shutdown_rx));

        info!("MCP listener for gateway {} listening on {}", self.gateway, local_addr);
        state.running = Some(RunningListener {
            settings,
            local_addr,
            shutdown_tx,
            task,
        });
        state.stopped = false;
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        // Readers of the state are not blocked by the drain below
        let running = {
            let mut state = self.state.lock().await;
            let Some(running) = state.running.take() else {
                debug!("Listener for gateway {} is not running", self.gateway);
                return Ok(());
            };
            state.stopped = true;
            running
        };

        info!("Stopping MCP listener for gateway {} on {}", self.gateway, running.local_addr);
        // The accept loop also exits if the receiver sees the sender dropped
        let _ = running.shutdown_tx.send(true);
        running
            .task
            .await
            .map_err(|e| ListenerError::Shutdown(e.to_string()))?;

        info!("MCP listener for gateway {} stopped", self.gateway);
        Ok(())
    }

    async fn is_running(&self) -> bool {
        let state = self.state.lock().await;
        state.running.is_some()
    }
}

async fn accept_loop(
    listener: TcpListener,
    local_addr: SocketAddr,
    routes: Arc<ManagementRoutes>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("Accepted connection from {} on {}", peer_addr, local_addr);
                        connections.spawn(serve_connection(stream, peer_addr, routes.clone(), shutdown.clone()));
                    }
                    Err(e) => accept_failed(local_addr, e).await,
                }
            }
            _ = shutdown.changed() => {
                break;
            }
        }

        while connections.try_join_next().is_some() {}
    }

    drop(listener);

    let open = connections.len();
    if open > 0 {
        debug!("Draining {} connection(s) on {}", open, local_addr);
    }
    let drained = tokio::time::timeout(DRAIN_TIMEOUT, async {
        while connections.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        warn!(
            "Connections on {} did not finish within {:?}, aborting them",
            local_addr, DRAIN_TIMEOUT
        );
        connections.abort_all();
    }
}

async fn accept_failed(local_addr: SocketAddr, err: std::io::Error) {
    error!("Accept error on {}: {}", local_addr, err);
    tokio::time::sleep(ACCEPT_BACKOFF).await;
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer_addr: SocketAddr,
    routes: Arc<ManagementRoutes>,
    mut shutdown: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req| {
        let routes = routes.clone();
        async move { routes.handle(req).await }
    });

    let conn = http1::Builder::new().serve_connection(io, service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                debug!("Error serving connection from {}: {}", peer_addr, e);
            }
        }
        _ = shutdown.changed() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.as_mut().await {
                debug!("Error draining connection from {}: {}", peer_addr, e);
            }
        }
    }
}
