//! # Rollout
//!
//! Restart decision and readiness wait of the entity operator Deployment.
//!
//! A created or patched Deployment rolls on its own. An unchanged one keeps running
//! pods that mounted the old certificates, so when certificates changed (or old CA
//! certificates were removed) the pods are restarted explicitly.

use crate::controller::reconciler::operators::{DeploymentOperator, ReconcileResult};
use crate::controller::reconciler::{PipelineState, Reconciliation};
use crate::error::Result;
use crate::observability::metrics;
use k8s_openapi::api::apps::v1::Deployment;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

/// Whether the Deployment must be restarted explicitly
///
/// Only an unchanged, existing Deployment is restarted. The deletion path never is.
pub fn restart_required(
    result: &ReconcileResult<Deployment>,
    state: &PipelineState,
    certs_removed: bool,
) -> bool {
    matches!(result, ReconcileResult::Noop(Some(_))) && (state.certs_changed() || certs_removed)
}

/// Restart the Deployment when `restart_required` holds
///
/// Returns whether a restart happened.
#[allow(clippy::too_many_arguments, reason = "mirrors the operator call it wraps")]
pub async fn restart_if_required(
    deployments: &dyn DeploymentOperator,
    reconciliation: &Reconciliation,
    namespace: &str,
    name: &str,
    result: &ReconcileResult<Deployment>,
    state: &PipelineState,
    certs_removed: bool,
    timeout: Duration,
) -> Result<bool> {
    if !restart_required(result, state, certs_removed) {
        return Ok(false);
    }

    info!(
        reconciliation = %reconciliation,
        topic_certs_changed = state.topic_certs_changed,
        user_certs_changed = state.user_certs_changed,
        certs_removed,
        "Certificates changed, rolling Deployment {namespace}/{name}"
    );
    deployments
        .rolling_update(reconciliation, namespace, name, timeout)
        .await?;
    metrics::increment_rolling_restarts();
    Ok(true)
}

/// Wait for the observed generation, then for ready replicas
///
/// Both phases share one `timeout` budget.
pub async fn wait_for_readiness(
    deployments: &dyn DeploymentOperator,
    reconciliation: &Reconciliation,
    namespace: &str,
    name: &str,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    deployments
        .wait_for_observed(reconciliation, namespace, name, poll_interval, timeout)
        .await?;
    deployments
        .readiness(
            reconciliation,
            namespace,
            name,
            poll_interval,
            deadline.saturating_duration_since(Instant::now()),
        )
        .await
}
