use anyhow::Result;
use fetchfy_core::{OperatorMetrics, ServiceRegistry};
use fetchfy_listener::ListenerPool;
use kube::Client;
use std::sync::Arc;
use tracing::{error, info};

mod config;
mod error;
mod gateway_controller;
mod service_watcher;
mod status;
mod store;
#[cfg(test)]
mod testing;

use config::{ControllerConfig, LogFormat};
use gateway_controller::Context;
use service_watcher::ServiceWatcher;
use store::{ClusterStore, KubeStore};

fn init_tracing(format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .json()
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = ControllerConfig::from_env()?;
    init_tracing(config.log_format);

    info!("Starting fetchfy-controller...");

    let client = Client::try_default().await?;

    let registry = Arc::new(ServiceRegistry::new());
    let metrics = OperatorMetrics::new()?;
    info!("Service registry and metrics initialized");

    let store: Arc<dyn ClusterStore> = Arc::new(KubeStore::new(
        client.clone(),
        config.watch_namespace.clone(),
    ));
    let watcher = Arc::new(ServiceWatcher::new(
        store.clone(),
        registry.clone(),
        metrics.clone(),
    ));
    let listeners = Arc::new(ListenerPool::mcp(registry.clone(), metrics.clone()));

    let ctx = Arc::new(Context {
        store,
        registry,
        watcher: watcher.clone(),
        listeners,
        metrics,
        listen_host: config.listen_host,
    });

    // Start the Service watcher
    let watcher_client = client.clone();
    let namespace = config.watch_namespace.clone();
    let watcher_task = tokio::spawn(async move {
        watcher.run(watcher_client, namespace).await;
    });

    // Start Gateway reconciliation
    let controller_task = tokio::spawn(gateway_controller::run(client, ctx));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("Shutdown signal received, exiting...");
        }
        _ = watcher_task => {
            error!("Service watcher exited unexpectedly");
            anyhow::bail!("Service watcher exited unexpectedly");
        }
        _ = controller_task => {
            error!("Gateway controller exited unexpectedly");
            anyhow::bail!("Gateway controller exited unexpectedly");
        }
    }

    Ok(())
}
