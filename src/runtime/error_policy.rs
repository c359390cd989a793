//! # Error Policy
//!
//! Requeue decisions for failed reconciliations.
//!
//! Timeouts (a rolling restart or readiness wait that ran out of budget) usually
//! resolve on their own and are requeued after a short fixed delay. Every other
//! failure backs off along a per-cluster Fibonacci sequence.

use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::crd::StreamingCluster;
use crate::observability::metrics;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle a failed reconciliation
pub fn handle_reconciliation_error(
    obj: Arc<StreamingCluster>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.name_any();
    let namespace = obj.namespace().unwrap_or_default();
    error!(
        resource.name = %name,
        resource.namespace = %namespace,
        class = error.class(),
        "Reconciliation error: {error}"
    );
    metrics::increment_reconciliation_errors(error.class());

    if error.is_timeout() {
        let delay = ctx.config.timeout_requeue_duration();
        info!("Retrying {namespace}/{name} in {}s after timeout", delay.as_secs());
        metrics::increment_requeues_total("timeout");
        return Action::requeue(delay);
    }

    let resource_key = format!("{namespace}/{name}");
    let (backoff_seconds, error_count) = next_backoff(&ctx, &resource_key);
    info!(
        "Retrying {resource_key} with Fibonacci backoff: {backoff_seconds}s (error count: {error_count})"
    );
    metrics::increment_requeues_total("error-backoff");
    Action::requeue(Duration::from_secs(backoff_seconds))
}

/// Advance the backoff of one resource, returning the delay and the error count
fn next_backoff(ctx: &Reconciler, resource_key: &str) -> (u64, u32) {
    match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(resource_key.to_string())
                .or_insert_with(BackoffState::default);
            state.increment_error();
            (state.backoff.next_backoff_seconds(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {e}, using default backoff");
            (60, 0)
        }
    }
}
