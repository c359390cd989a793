//! # Watch Loop
//!
//! Runs the controller over `StreamingCluster` resources. Changes to the owned
//! entity operator Deployment also trigger a reconciliation of its cluster.

use crate::controller::reconciler::{reconcile, Reconciler};
use crate::crd::StreamingCluster;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::server::ServerState;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::Api;
use kube_runtime::controller::Config as ControllerRuntimeConfig;
use kube_runtime::{watcher, Controller};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Run the controller until a shutdown signal arrives
pub async fn run_watch_loop(
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> anyhow::Result<()> {
    let client = reconciler.client.clone();
    let (clusters, deployments): (Api<StreamingCluster>, Api<Deployment>) =
        match reconciler.config.watch_namespace.as_deref() {
            Some(namespace) => (
                Api::namespaced(client.clone(), namespace),
                Api::namespaced(client, namespace),
            ),
            None => (Api::all(client.clone()), Api::all(client)),
        };

    info!(
        namespace = reconciler.config.watch_namespace.as_deref().unwrap_or("*"),
        "Starting controller watch loop..."
    );
    let runtime_config = ControllerRuntimeConfig::default()
        .concurrency(reconciler.config.max_concurrent_reconciliations);

    server_state.is_ready.store(true, Ordering::Relaxed);

    Controller::new(clusters, watcher::Config::default().any_semantic())
        .owns(deployments, watcher::Config::default())
        .with_config(runtime_config)
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, reconciler)
        .for_each(|result| async move {
            match result {
                Ok((obj, _action)) => debug!(
                    "Reconciled {}/{}",
                    obj.namespace.as_deref().unwrap_or_default(),
                    obj.name
                ),
                Err(e) => warn!("Controller stream error: {e}"),
            }
        })
        .await;

    server_state.is_ready.store(false, Ordering::Relaxed);
    info!("Controller watch loop stopped");
    Ok(())
}
