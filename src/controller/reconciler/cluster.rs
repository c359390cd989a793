//! # Cluster Reconciliation
//!
//! Entry point of the controller for one `StreamingCluster`: loads the cluster CA,
//! runs the entity operator reconciliation and reports the outcome in the status.
//! Errors are handled by `error_policy()` in the runtime.

use crate::controller::reconciler::entity_operator::EntityOperatorReconciler;
use crate::controller::reconciler::status::{update_status, ReadyCondition};
use crate::controller::reconciler::types::{Reconciler, ReconcilerError};
use crate::controller::reconciler::{Clock, Reconciliation, SystemClock};
use crate::crd::StreamingCluster;
use crate::error::{EntityOperatorError, Result};
use crate::model::{names, prune_expired_ca_certs, ClusterCa};
use crate::observability::metrics;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Instrument};

pub const KIND: &str = "StreamingCluster";

/// Reconcile the entity operator of one cluster
pub async fn reconcile(
    cluster: Arc<StreamingCluster>,
    ctx: Arc<Reconciler>,
) -> std::result::Result<Action, ReconcilerError> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_default();
    let reconciliation = Reconciliation::new("watch", KIND, &namespace, &name);

    let span = tracing::info_span!(
        "entity_operator",
        resource.name = %name,
        resource.namespace = %namespace,
        resource.kind = KIND
    );
    reconcile_cluster(cluster, ctx, reconciliation)
        .instrument(span)
        .await
}

async fn reconcile_cluster(
    cluster: Arc<StreamingCluster>,
    ctx: Arc<Reconciler>,
    reconciliation: Reconciliation,
) -> std::result::Result<Action, ReconcilerError> {
    let start = Instant::now();
    metrics::increment_reconciliations();
    info!(reconciliation = %reconciliation, "Reconciling");

    if cluster.namespace().is_none() {
        return Err(EntityOperatorError::InvalidConfig(format!(
            "{KIND} {} has no namespace",
            cluster.name_any()
        ))
        .into());
    }

    if cluster.metadata.deletion_timestamp.is_some() {
        // Owned objects are garbage collected with the cluster
        debug!(reconciliation = %reconciliation, "Cluster is being deleted");
        ctx.forget_backoff(&resource_key(&reconciliation));
        return Ok(Action::await_change());
    }

    let result = run(&cluster, &ctx, &reconciliation, &SystemClock).await;
    metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    let condition = match &result {
        Ok(true) => ReadyCondition::ready(),
        Ok(false) => ReadyCondition::not_deployed(),
        Err(e) if e.is_timeout() => ReadyCondition::failed("Timeout", e.to_string()),
        Err(e) => ReadyCondition::failed("ReconciliationFailed", e.to_string()),
    };
    if let Err(e) = update_status(&ctx, &cluster, &condition).await {
        warn!(reconciliation = %reconciliation, error = %e, "Failed to update status");
    }

    result?;
    info!(
        reconciliation = %reconciliation,
        elapsed = ?start.elapsed(),
        "Reconciliation finished"
    );
    ctx.forget_backoff(&resource_key(&reconciliation));
    Ok(Action::requeue(ctx.config.success_requeue_duration()))
}

fn resource_key(reconciliation: &Reconciliation) -> String {
    format!("{}/{}", reconciliation.namespace(), reconciliation.name())
}

/// Returns whether the entity operator is deployed
async fn run(
    cluster: &StreamingCluster,
    ctx: &Reconciler,
    reconciliation: &Reconciliation,
    clock: &dyn Clock,
) -> Result<bool> {
    let cluster_ca = load_cluster_ca(ctx, reconciliation, clock).await?;
    let reconciler = EntityOperatorReconciler::new(
        reconciliation.clone(),
        cluster,
        &ctx.config,
        ctx.operators.clone(),
        cluster_ca,
        &ctx.shared_environment,
    )?;
    let enabled = reconciler.is_enabled();

    reconciler
        .reconcile(
            &ctx.config.platform_features(),
            ctx.config.image_pull_policy,
            &ctx.config.image_pull_secret_refs(),
            clock,
        )
        .await?;
    Ok(enabled)
}

/// Load the cluster CA, pruning expired historical CA certificates on the way
///
/// None while either CA Secret is missing.
async fn load_cluster_ca(
    ctx: &Reconciler,
    reconciliation: &Reconciliation,
    clock: &dyn Clock,
) -> Result<Option<ClusterCa>> {
    let namespace = reconciliation.namespace();
    let cert_name = names::cluster_ca_cert_secret_name(reconciliation.name());
    let key_name = names::cluster_ca_key_secret_name(reconciliation.name());

    let (cert_secret, key_secret) = futures::try_join!(
        ctx.operators.secrets.get(namespace, &cert_name),
        ctx.operators.secrets.get(namespace, &key_name),
    )?;
    let (Some(cert_secret), Some(key_secret)) = (cert_secret, key_secret) else {
        info!(reconciliation = %reconciliation, "Cluster CA does not exist yet");
        return Ok(None);
    };

    let Some(pruned) = prune_expired_ca_certs(&cert_secret, clock.now()) else {
        return Ok(Some(ClusterCa::from_secrets(&cert_secret, &key_secret)?));
    };

    let removed = removed_keys(&cert_secret, &pruned);
    info!(
        reconciliation = %reconciliation,
        removed = ?removed,
        "Removing expired CA certificates from {namespace}/{cert_name}"
    );
    remove_secret_keys(ctx, namespace, &cert_name, &removed).await?;
    Ok(Some(
        ClusterCa::from_secrets(&pruned, &key_secret)?.with_certs_removed(true),
    ))
}

fn removed_keys(original: &Secret, pruned: &Secret) -> Vec<String> {
    let kept = pruned.data.as_ref();
    original
        .data
        .iter()
        .flat_map(|data| data.keys())
        .filter(|key| !kept.is_some_and(|k| k.contains_key(*key)))
        .cloned()
        .collect()
}

/// Merge patch nulling `keys`, which removes them whoever owns them
async fn remove_secret_keys(
    ctx: &Reconciler,
    namespace: &str,
    name: &str,
    keys: &[String],
) -> Result<()> {
    let data: Map<String, Value> = keys.iter().map(|k| (k.clone(), Value::Null)).collect();
    let api: Api<Secret> = Api::namespaced(ctx.client.clone(), namespace);
    api.patch(
        name,
        &PatchParams::default(),
        &Patch::Merge(json!({ "data": data })),
    )
    .await
    .map_err(|e| EntityOperatorError::rejected("Secret", namespace, name, e))?;
    Ok(())
}
