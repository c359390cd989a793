//! # Resource Operators
//!
//! The primitives the entity operator pipeline reconciles through. One operator per
//! resource kind, each converging a single named object towards a desired value.
//!
//! The pipeline only sees these traits. `ResourceOperatorSupplier::kube` wires the
//! Kubernetes implementations, tests substitute in-memory ones.

use crate::controller::reconciler::kube_operators::{
    KubeClusterResourceOperator, KubeDeploymentOperator, KubeResourceOperator,
};
use crate::controller::reconciler::Reconciliation;
use crate::error::Result;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, Role, RoleBinding};
use kube::Client;
use std::sync::Arc;
use std::time::Duration;

/// Outcome of reconciling one object
///
/// Only `Patched` carries both the previous and the current object, which is what
/// change detection compares.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileResult<K> {
    /// The object did not exist and was created
    Created(K),
    /// The object existed and changed
    Patched { previous: K, current: K },
    /// The object existed and was deleted
    Deleted,
    /// Nothing changed. Carries the object if it exists
    Noop(Option<K>),
}

impl<K> ReconcileResult<K> {
    /// The object after reconciliation, None if it does not exist
    pub fn resource(&self) -> Option<&K> {
        match self {
            Self::Created(current) | Self::Patched { current, .. } => Some(current),
            Self::Noop(current) => current.as_ref(),
            Self::Deleted => None,
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, Self::Noop(_))
    }

    /// Short label for logs
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Patched { .. } => "patched",
            Self::Deleted => "deleted",
            Self::Noop(_) => "noop",
        }
    }
}

/// Reconciles namespaced objects of kind `K`
#[async_trait]
pub trait ResourceOperator<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Converge `namespace/name` towards `desired`
    ///
    /// `None` ensures the object is absent. Reconciling an unchanged desired object
    /// again yields `Noop`.
    async fn reconcile(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        desired: Option<K>,
    ) -> Result<ReconcileResult<K>>;

    /// Current object, None if absent
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>>;
}

/// Reconciles cluster-scoped objects of kind `K`
#[async_trait]
pub trait ClusterResourceOperator<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    async fn reconcile(
        &self,
        reconciliation: &Reconciliation,
        name: &str,
        desired: Option<K>,
    ) -> Result<ReconcileResult<K>>;
}

/// Deployment operator with rollout control
#[async_trait]
pub trait DeploymentOperator: ResourceOperator<Deployment> {
    /// Restart the pods of the deployment and wait until the rollout completes
    ///
    /// Fails with a timeout when the rollout does not complete within `timeout`.
    async fn rolling_update(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        timeout: Duration,
    ) -> Result<()>;

    /// Wait until the deployment controller observed the current generation
    async fn wait_for_observed(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<()>;

    /// Wait until the desired replicas are ready
    async fn readiness(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<()>;
}

/// One operator per resource kind the entity operator manages
#[derive(Clone)]
pub struct ResourceOperatorSupplier {
    pub service_accounts: Arc<dyn ResourceOperator<ServiceAccount>>,
    pub roles: Arc<dyn ResourceOperator<Role>>,
    pub role_bindings: Arc<dyn ResourceOperator<RoleBinding>>,
    pub cluster_role_bindings: Arc<dyn ClusterResourceOperator<ClusterRoleBinding>>,
    pub network_policies: Arc<dyn ResourceOperator<NetworkPolicy>>,
    pub config_maps: Arc<dyn ResourceOperator<ConfigMap>>,
    pub secrets: Arc<dyn ResourceOperator<Secret>>,
    pub deployments: Arc<dyn DeploymentOperator>,
}

impl std::fmt::Debug for ResourceOperatorSupplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceOperatorSupplier").finish_non_exhaustive()
    }
}

impl ResourceOperatorSupplier {
    /// Operators backed by the Kubernetes API
    pub fn kube(client: Client) -> Self {
        Self {
            service_accounts: Arc::new(KubeResourceOperator::new(client.clone())),
            roles: Arc::new(KubeResourceOperator::new(client.clone())),
            role_bindings: Arc::new(KubeResourceOperator::new(client.clone())),
            cluster_role_bindings: Arc::new(KubeClusterResourceOperator::new(client.clone())),
            network_policies: Arc::new(KubeResourceOperator::new(client.clone())),
            config_maps: Arc::new(KubeResourceOperator::new(client.clone())),
            secrets: Arc::new(KubeResourceOperator::new(client.clone())),
            deployments: Arc::new(KubeDeploymentOperator::new(client)),
        }
    }
}
