//! # Kubernetes Resource Operators
//!
//! `ResourceOperator` implementations backed by the Kubernetes API.
//!
//! Desired objects are created and updated with server-side apply under one field
//! manager. Whether an apply changed anything is decided from the content of the
//! object before and after, never from `resourceVersion`: status writes by other
//! controllers bump it without changing anything this operator owns.

use crate::constants::{ANNO_RESTARTED_AT, FIELD_MANAGER};
use crate::controller::reconciler::operators::{
    ClusterResourceOperator, DeploymentOperator, ReconcileResult, ResourceOperator,
};
use crate::controller::reconciler::Reconciliation;
use crate::error::{EntityOperatorError, Result};
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use kube::core::{ClusterResourceScope, NamespaceResourceScope};
use kube::{Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Decides whether an apply changed `previous` into something else
type ChangeDetector<K> = fn(&K, &K) -> bool;

/// Metadata the API server maintains on its own
const SERVER_MANAGED_METADATA: [&str; 6] = [
    "resourceVersion",
    "managedFields",
    "generation",
    "creationTimestamp",
    "uid",
    "selfLink",
];

/// Operator for namespaced objects
#[derive(Clone)]
pub struct KubeResourceOperator<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Resource<DynamicType = ()>> fmt::Debug for KubeResourceOperator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeResourceOperator")
            .field("kind", &K::kind(&()))
            .finish_non_exhaustive()
    }
}

impl<K> KubeResourceOperator<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K> ResourceOperator<K> for KubeResourceOperator<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn reconcile(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        desired: Option<K>,
    ) -> Result<ReconcileResult<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        converge(&api, reconciliation, namespace, name, desired, content_changed).await
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .map_err(|e| EntityOperatorError::rejected(K::kind(&()), namespace, name, e))
    }
}

/// Operator for cluster-scoped objects
#[derive(Clone)]
pub struct KubeClusterResourceOperator<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K: Resource<DynamicType = ()>> fmt::Debug for KubeClusterResourceOperator<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClusterResourceOperator")
            .field("kind", &K::kind(&()))
            .finish_non_exhaustive()
    }
}

impl<K> KubeClusterResourceOperator<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K> ClusterResourceOperator<K> for KubeClusterResourceOperator<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Serialize
        + Debug
        + Send
        + Sync
        + 'static,
{
    async fn reconcile(
        &self,
        reconciliation: &Reconciliation,
        name: &str,
        desired: Option<K>,
    ) -> Result<ReconcileResult<K>> {
        let api: Api<K> = Api::all(self.client.clone());
        converge(&api, reconciliation, "", name, desired, content_changed).await
    }
}

/// Converge one object: delete when undesired, create when absent, apply otherwise
async fn converge<K>(
    api: &Api<K>,
    reconciliation: &Reconciliation,
    namespace: &str,
    name: &str,
    desired: Option<K>,
    changed: ChangeDetector<K>,
) -> Result<ReconcileResult<K>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug + Send + Sync,
{
    let kind = K::kind(&()).to_string();
    let rejected = |e| EntityOperatorError::rejected(kind.clone(), namespace, name, e);

    let current = api.get_opt(name).await.map_err(rejected)?;

    match (desired, current) {
        (None, None) => {
            debug!(reconciliation = %reconciliation, "{kind} {namespace}/{name} already absent");
            Ok(ReconcileResult::Noop(None))
        }
        (None, Some(_)) => match api.delete(name, &DeleteParams::background()).await {
            Ok(_) => {
                info!(reconciliation = %reconciliation, "Deleted {kind} {namespace}/{name}");
                Ok(ReconcileResult::Deleted)
            }
            // Deleted by someone else in between
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => {
                Ok(ReconcileResult::Noop(None))
            }
            Err(e) => Err(rejected(e)),
        },
        (Some(desired), None) => {
            // Applied rather than posted so later applies find their own field manager
            let created = api
                .patch(
                    name,
                    &PatchParams::apply(FIELD_MANAGER).force(),
                    &Patch::Apply(&desired),
                )
                .await
                .map_err(rejected)?;
            info!(reconciliation = %reconciliation, "Created {kind} {namespace}/{name}");
            Ok(ReconcileResult::Created(created))
        }
        (Some(desired), Some(previous)) => {
            let current = api
                .patch(
                    name,
                    &PatchParams::apply(FIELD_MANAGER).force(),
                    &Patch::Apply(&desired),
                )
                .await
                .map_err(rejected)?;
            if changed(&previous, &current) {
                info!(reconciliation = %reconciliation, "Patched {kind} {namespace}/{name}");
                Ok(ReconcileResult::Patched { previous, current })
            } else {
                debug!(reconciliation = %reconciliation, "{kind} {namespace}/{name} unchanged");
                Ok(ReconcileResult::Noop(Some(current)))
            }
        }
    }
}

/// Compares everything but `status` and server-maintained metadata
pub(crate) fn content_changed<K: Serialize>(previous: &K, current: &K) -> bool {
    match (applied_content(previous), applied_content(current)) {
        (Some(previous), Some(current)) => previous != current,
        _ => true,
    }
}

fn applied_content<K: Serialize>(object: &K) -> Option<Value> {
    let mut value = serde_json::to_value(object).ok()?;
    let fields = value.as_object_mut()?;
    fields.remove("status");
    if let Some(metadata) = fields.get_mut("metadata").and_then(Value::as_object_mut) {
        for key in SERVER_MANAGED_METADATA {
            metadata.remove(key);
        }
    }
    Some(value)
}

/// Only spec changes bump `metadata.generation`, status and annotation writes of the
/// deployment controller do not
pub(crate) fn generation_changed(previous: &Deployment, current: &Deployment) -> bool {
    previous.metadata.generation != current.metadata.generation
}

/// Deployment operator with rollout control
#[derive(Clone)]
pub struct KubeDeploymentOperator {
    client: Client,
    inner: KubeResourceOperator<Deployment>,
    restart_poll_interval: Duration,
}

impl fmt::Debug for KubeDeploymentOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeDeploymentOperator")
            .field("restart_poll_interval", &self.restart_poll_interval)
            .finish_non_exhaustive()
    }
}

impl KubeDeploymentOperator {
    pub fn new(client: Client) -> Self {
        Self {
            inner: KubeResourceOperator::new(client.clone()),
            client,
            restart_poll_interval: Duration::from_millis(
                crate::constants::DEFAULT_READINESS_POLL_INTERVAL_MS,
            ),
        }
    }

    /// Poll the deployment until `done` holds, failing with a timeout after `timeout`
    async fn wait_for(
        &self,
        operation: &'static str,
        namespace: &str,
        name: &str,
        poll_interval: Duration,
        timeout: Duration,
        done: fn(&Deployment) -> bool,
    ) -> Result<()> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let poll = async {
            loop {
                let current = match api.get_opt(name).await {
                    Ok(current) => current,
                    Err(e) => {
                        return Err(EntityOperatorError::rejected("Deployment", namespace, name, e))
                    }
                };
                if current.as_ref().is_some_and(done) {
                    return Ok(());
                }
                tokio::time::sleep(poll_interval).await;
            }
        };

        match tokio::time::timeout(timeout, poll).await {
            Ok(result) => result,
            Err(_) => Err(EntityOperatorError::Timeout {
                operation,
                namespace: namespace.to_string(),
                name: name.to_string(),
                timeout,
            }),
        }
    }
}

#[async_trait]
impl ResourceOperator<Deployment> for KubeDeploymentOperator {
    async fn reconcile(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        desired: Option<Deployment>,
    ) -> Result<ReconcileResult<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        converge(&api, reconciliation, namespace, name, desired, generation_changed).await
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        self.inner.get(namespace, name).await
    }
}

#[async_trait]
impl DeploymentOperator for KubeDeploymentOperator {
    async fn rolling_update(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        let patch = json!({
            "spec": { "template": { "metadata": { "annotations": {
                ANNO_RESTARTED_AT: chrono::Utc::now().to_rfc3339()
            }}}}
        });
        api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| EntityOperatorError::rejected("Deployment", namespace, name, e))?;
        info!(reconciliation = %reconciliation, "Rolling restart of Deployment {namespace}/{name} triggered");

        self.wait_for(
            "rolling restart",
            namespace,
            name,
            self.restart_poll_interval,
            deadline.saturating_duration_since(Instant::now()),
            is_rolled_out,
        )
        .await
    }

    async fn wait_for_observed(
        &self,
        _reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        self.wait_for(
            "observed generation",
            namespace,
            name,
            poll_interval,
            timeout,
            is_observed,
        )
        .await
    }

    async fn readiness(
        &self,
        _reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<()> {
        self.wait_for("readiness", namespace, name, poll_interval, timeout, is_ready)
            .await
    }
}

fn desired_replicas(deployment: &Deployment) -> i32 {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1)
}

/// The deployment controller has seen the latest spec
pub(crate) fn is_observed(deployment: &Deployment) -> bool {
    let observed = deployment
        .status
        .as_ref()
        .and_then(|s| s.observed_generation);
    matches!((deployment.metadata.generation, observed), (Some(g), Some(o)) if o >= g)
}

/// At least the desired number of replicas report ready
pub(crate) fn is_ready(deployment: &Deployment) -> bool {
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready >= desired_replicas(deployment)
}

/// Every replica runs the latest template and no old replica is left
pub(crate) fn is_rolled_out(deployment: &Deployment) -> bool {
    let desired = desired_replicas(deployment);
    let Some(status) = deployment.status.as_ref() else {
        return false;
    };
    is_observed(deployment)
        && status.updated_replicas.unwrap_or(0) >= desired
        && status.replicas.unwrap_or(0) <= desired
        && is_ready(deployment)
}
