//! Listener pool keyed by Gateway

use crate::listener::{GatewayListener, ListenerSettings, McpListener};
use crate::Result;
use fetchfy_core::{ObjectKey, OperatorMetrics, ServiceRegistry};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Builds the listener for a newly seen gateway
pub type ListenerFactory = Arc<dyn Fn(&ObjectKey) -> Arc<dyn GatewayListener> + Send + Sync>;

/// Owns at most one listener per Gateway
pub struct ListenerPool {
    listeners: Mutex<HashMap<ObjectKey, Arc<dyn GatewayListener>>>,
    factory: ListenerFactory,
    metrics: OperatorMetrics,
}

impl ListenerPool {
    pub fn new(factory: ListenerFactory, metrics: OperatorMetrics) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            factory,
            metrics,
        }
    }

    /// Pool of HTTP listeners serving from the shared registry
    pub fn mcp(registry: Arc<ServiceRegistry>, metrics: OperatorMetrics) -> Self {
        let listener_metrics = metrics.clone();
        let factory: ListenerFactory = Arc::new(move |key: &ObjectKey| {
            Arc::new(McpListener::new(
                key.clone(),
                registry.clone(),
                listener_metrics.clone(),
            )) as Arc<dyn GatewayListener>
        });
        Self::new(factory, metrics)
    }

    /// Make sure the gateway's listener runs with `settings`.
    ///
    /// Creates the listener on first use, restarts it when the settings
    /// changed while running, and starts it when it is not running.
    pub async fn ensure(&self, key: &ObjectKey, settings: ListenerSettings) -> Result<()> {
        let listener = {
            let mut listeners = self.listeners.lock().await;
            let listener = listeners
                .entry(key.clone())
                .or_insert_with(|| {
                    debug!("Creating listener for gateway {}", key);
                    (self.factory)(key)
                })
                .clone();
            self.metrics.gateway_count.set(listeners.len() as i64);
            listener
        };

        if listener.configure(settings).await {
            info!("Restarting listener for gateway {}", key);
            listener.stop().await?;
        }
        if !listener.is_running().await {
            listener.start().await?;
        }
        Ok(())
    }

    /// Stop and forget the gateway's listener, returns whether one existed
    pub async fn release(&self, key: &ObjectKey) -> Result<bool> {
        let listener = {
            let mut listeners = self.listeners.lock().await;
            let removed = listeners.remove(key);
            self.metrics.gateway_count.set(listeners.len() as i64);
            removed
        };

        match listener {
            Some(listener) => {
                listener.stop().await?;
                info!("Released listener for gateway {}", key);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn get(&self, key: &ObjectKey) -> Option<Arc<dyn GatewayListener>> {
        let listeners = self.listeners.lock().await;
        listeners.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        let listeners = self.listeners.lock().await;
        listeners.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
