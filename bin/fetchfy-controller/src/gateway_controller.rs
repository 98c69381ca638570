//! Gateway controller for reconciling Gateway resources

use crate::error::{Error, Result};
use crate::service_watcher::ServiceWatcher;
use crate::status::{
    set_condition, CONDITION_AVAILABLE, CONDITION_READY, REASON_CONFIGURATION_ERROR,
    REASON_GATEWAY_CONFIGURED, REASON_GATEWAY_READY, REASON_SERVER_ERROR, STATUS_FALSE,
    STATUS_TRUE,
};
use crate::store::ClusterStore;
use fetchfy_api::{Gateway, GatewaySpec};
use fetchfy_core::{ObjectKey, OperatorMetrics, ServiceRegistry};
use fetchfy_listener::{ListenerPool, ListenerSettings};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::{controller::Action, watcher, Controller};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Finalizer guarding listener cleanup
pub const FINALIZER: &str = "fetchfy.ai/finalizer";

/// Periodic resync of a healthy Gateway
pub const RESYNC_INTERVAL: Duration = Duration::from_secs(300);

/// Shared state of the Gateway controller
pub struct Context {
    pub store: Arc<dyn ClusterStore>,
    pub registry: Arc<ServiceRegistry>,
    pub watcher: Arc<ServiceWatcher>,
    pub listeners: Arc<ListenerPool>,
    pub metrics: OperatorMetrics,
    /// Address gateway listeners bind to
    pub listen_host: IpAddr,
}

/// Controller entry point
pub async fn reconcile(gateway: Arc<Gateway>, ctx: Arc<Context>) -> Result<Action> {
    let key = ObjectKey::from_resource(gateway.as_ref());
    reconcile_gateway(&key, &ctx).await
}

/// Converge one Gateway, always starting from its current stored state
pub async fn reconcile_gateway(key: &ObjectKey, ctx: &Context) -> Result<Action> {
    let Some(gateway) = ctx.store.get_gateway(key).await? else {
        info!("Gateway {} not found, cleaning up", key);
        cleanup(key, ctx).await;
        return Ok(Action::await_change());
    };

    if gateway.metadata.deletion_timestamp.is_some() {
        return handle_deletion(key, &gateway, ctx).await;
    }

    if !gateway.finalizers().iter().any(|f| f == FINALIZER) {
        let mut finalizers = gateway.finalizers().to_vec();
        finalizers.push(FINALIZER.to_string());
        ctx.store.set_gateway_finalizers(key, finalizers).await?;
        debug!("Added finalizer to gateway {}", key);
        return Ok(Action::requeue(Duration::ZERO));
    }

    info!("Reconciling gateway {}", key);

    let settings = match listener_settings(&gateway.spec, ctx.listen_host) {
        Ok(settings) => settings,
        Err(message) => {
            return fail(
                ctx,
                key,
                &gateway,
                REASON_CONFIGURATION_ERROR,
                &message,
                Error::Configuration(message.clone()),
            )
            .await
        }
    };

    if let Err(e) = ctx.listeners.ensure(key, settings).await {
        let message = e.to_string();
        return fail(ctx, key, &gateway, REASON_SERVER_ERROR, &message, e.into()).await;
    }

    ctx.watcher.add_gateway(key.clone(), gateway.spec.clone()).await;

    let services = match ctx.watcher.matching_services(&gateway.spec).await {
        Ok(services) => services,
        Err(e) => {
            let message = format!("Failed to list matching services: {e}");
            return fail(ctx, key, &gateway, REASON_CONFIGURATION_ERROR, &message, e).await;
        }
    };
    let registered = ctx.watcher.register_enabled(&services).await;
    debug!(
        "Gateway {} selects {} services, {} registered",
        key,
        services.len(),
        registered
    );

    let generation = gateway.metadata.generation;
    let mut status = gateway.status.clone().unwrap_or_default();
    ctx.registry.project_onto_status(&mut status).await;
    status.address = Some(format!(":{}", gateway.spec.mcp_port));

    let ready_message = format!("Gateway is ready with {} services", status.mcp_services.len());
    set_condition(
        &mut status.conditions,
        CONDITION_READY,
        STATUS_TRUE,
        REASON_GATEWAY_READY,
        &ready_message,
        generation,
    );
    set_condition(
        &mut status.conditions,
        CONDITION_AVAILABLE,
        STATUS_TRUE,
        REASON_GATEWAY_CONFIGURED,
        "Gateway is available",
        generation,
    );

    if gateway.status.as_ref() != Some(&status) {
        if let Err(e) = ctx.store.update_gateway_status(key, &status).await {
            error!("Failed to update status of gateway {}: {}", key, e);
            return Err(Error::StatusUpdate(e.to_string()));
        }
    }

    info!("Gateway {} is ready with {} services", key, status.mcp_services.len());
    Ok(Action::requeue(RESYNC_INTERVAL))
}

async fn handle_deletion(key: &ObjectKey, gateway: &Gateway, ctx: &Context) -> Result<Action> {
    info!("Handling deletion of gateway {}", key);
    cleanup(key, ctx).await;

    if gateway.finalizers().iter().any(|f| f == FINALIZER) {
        let finalizers: Vec<String> = gateway
            .finalizers()
            .iter()
            .filter(|f| *f != FINALIZER)
            .cloned()
            .collect();
        ctx.store.set_gateway_finalizers(key, finalizers).await?;
        debug!("Removed finalizer from gateway {}", key);
    }

    Ok(Action::await_change())
}

/// Stop the Gateway's listener and stop refreshing its status
async fn cleanup(key: &ObjectKey, ctx: &Context) {
    match ctx.listeners.release(key).await {
        Ok(true) => debug!("Stopped listener of gateway {}", key),
        Ok(false) => {}
        Err(e) => warn!("Failed to stop listener of gateway {}: {}", key, e),
    }
    ctx.watcher.remove_gateway(key).await;
}

/// Listener settings for a Gateway, or the configuration problem
fn listener_settings(spec: &GatewaySpec, host: IpAddr) -> std::result::Result<ListenerSettings, String> {
    let port = u16::try_from(spec.mcp_port)
        .ok()
        .filter(|port| *port != 0)
        .ok_or_else(|| format!("mcpPort must be between 1 and 65535, got {}", spec.mcp_port))?;

    if spec.enable_tls {
        return Err(match spec.tls_secret_ref {
            None => "tlsSecretRef is required when enableTls is true".to_string(),
            Some(_) => "TLS termination is not supported".to_string(),
        });
    }

    Ok(ListenerSettings {
        host,
        port,
        tls_secret_ref: None,
    })
}

/// Publish `Ready=False` and hand the error back to the controller
async fn fail(
    ctx: &Context,
    key: &ObjectKey,
    gateway: &Gateway,
    reason: &str,
    message: &str,
    err: Error,
) -> Result<Action> {
    error!("Gateway {} failed: {}", key, err);

    let mut status = gateway.status.clone().unwrap_or_default();
    set_condition(
        &mut status.conditions,
        CONDITION_READY,
        STATUS_FALSE,
        reason,
        message,
        gateway.metadata.generation,
    );
    if gateway.status.as_ref() != Some(&status) {
        if let Err(e) = ctx.store.update_gateway_status(key, &status).await {
            warn!("Failed to record failure on gateway {}: {}", key, e);
        }
    }

    Err(err)
}

fn error_policy(gateway: Arc<Gateway>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!(
        "Reconciliation of gateway {} failed, retrying in {:?}: {}",
        ObjectKey::from_resource(gateway.as_ref()),
        error.requeue_after(),
        error
    );
    ctx.metrics.record_error(error.metric_label());
    Action::requeue(error.requeue_after())
}

/// Run the Gateway controller until the stream ends
pub async fn run(client: Client, ctx: Arc<Context>) {
    info!("Starting Gateway controller");

    let gateways: Api<Gateway> = Api::all(client);
    Controller::new(gateways, watcher::Config::default())
        .run(reconcile, error_policy, ctx)
        .for_each(|result| async move {
            match result {
                Ok((gateway, _)) => debug!("Reconciled gateway {}", gateway),
                Err(e) => debug!("Gateway reconciliation error: {}", e),
            }
        })
        .await;

    warn!("Gateway controller stream ended");
}
