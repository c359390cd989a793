//! Common test utilities for the entity operator integration tests
//!
//! In-memory resource operators recording every call, plus builders for clusters
//! and a cluster CA.

#![allow(dead_code, reason = "not every test binary uses every helper")]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use entity_operator_controller::config::ControllerConfig;
use entity_operator_controller::controller::reconciler::{
    ClusterResourceOperator, DeploymentOperator, EntityOperatorReconciler, FixedClock,
    ReconcileResult, Reconciliation, ResourceOperator, ResourceOperatorSupplier,
};
use entity_operator_controller::crd::{
    EntityManagerSpec, EntityOperatorSpec, StreamingCluster, StreamingClusterSpec,
};
use entity_operator_controller::error::{EntityOperatorError, Result};
use entity_operator_controller::model::{ClusterCa, PlatformFeatures, SharedEnvironment};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret, ServiceAccount};
use k8s_openapi::api::networking::v1::NetworkPolicy;
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, Role, RoleBinding};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const NAMESPACE: &str = "streaming";
pub const CLUSTER: &str = "my-cluster";

/// One reconcile call and its outcome
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub kind: &'static str,
    pub namespace: String,
    pub name: String,
    /// Whether an object was desired, false for ensure-absent calls
    pub desired: bool,
    pub outcome: &'static str,
}

impl Call {
    pub fn is(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.kind == kind && self.namespace == namespace && self.name == name
    }
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

/// Object store of one kind
///
/// Reconciling an object equal to the stored one is a no-op, anything else patches.
/// Calls into a namespace marked with `reject_namespace` fail with a 403.
pub struct FakeOperator<K> {
    kind: &'static str,
    objects: Mutex<BTreeMap<(String, String), K>>,
    rejected_namespaces: Mutex<BTreeSet<String>>,
    log: CallLog,
}

impl<K: Clone> FakeOperator<K> {
    pub fn new(kind: &'static str, log: CallLog) -> Self {
        Self {
            kind,
            objects: Mutex::new(BTreeMap::new()),
            rejected_namespaces: Mutex::new(BTreeSet::new()),
            log,
        }
    }

    pub fn insert(&self, namespace: &str, name: &str, object: K) {
        self.objects
            .lock()
            .unwrap()
            .insert((namespace.to_string(), name.to_string()), object);
    }

    pub fn stored(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Make every later call into `namespace` fail as forbidden
    pub fn reject_namespace(&self, namespace: &str) {
        self.rejected_namespaces
            .lock()
            .unwrap()
            .insert(namespace.to_string());
    }

    fn rejection(&self, namespace: &str, name: &str) -> Option<EntityOperatorError> {
        if !self.rejected_namespaces.lock().unwrap().contains(namespace) {
            return None;
        }
        let source = kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} {name} is forbidden", self.kind),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        Some(EntityOperatorError::rejected(self.kind, namespace, name, source))
    }
}

impl<K: Clone + PartialEq> FakeOperator<K> {
    fn converge(
        &self,
        namespace: &str,
        name: &str,
        desired: Option<K>,
    ) -> Result<ReconcileResult<K>> {
        let call = Call {
            kind: self.kind,
            namespace: namespace.to_string(),
            name: name.to_string(),
            desired: desired.is_some(),
            outcome: "",
        };
        if let Some(err) = self.rejection(namespace, name) {
            self.log.lock().unwrap().push(Call {
                outcome: "Rejected",
                ..call
            });
            return Err(err);
        }
        let result = self.apply(namespace, name, desired);
        self.log.lock().unwrap().push(Call {
            outcome: result.outcome(),
            ..call
        });
        Ok(result)
    }

    fn apply(&self, namespace: &str, name: &str, desired: Option<K>) -> ReconcileResult<K> {
        let key = (namespace.to_string(), name.to_string());
        let mut objects = self.objects.lock().unwrap();
        match (desired, objects.get(&key).cloned()) {
            (None, None) => ReconcileResult::Noop(None),
            (None, Some(_)) => {
                objects.remove(&key);
                ReconcileResult::Deleted
            }
            (Some(desired), None) => {
                objects.insert(key, desired.clone());
                ReconcileResult::Created(desired)
            }
            (Some(desired), Some(previous)) if previous == desired => {
                ReconcileResult::Noop(Some(desired))
            }
            (Some(desired), Some(previous)) => {
                objects.insert(key, desired.clone());
                ReconcileResult::Patched {
                    previous,
                    current: desired,
                }
            }
        }
    }
}

#[async_trait]
impl<K> ResourceOperator<K> for FakeOperator<K>
where
    K: Clone + PartialEq + Send + Sync + 'static,
{
    async fn reconcile(
        &self,
        _reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        desired: Option<K>,
    ) -> Result<ReconcileResult<K>> {
        self.converge(namespace, name, desired)
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>> {
        Ok(self.stored(namespace, name))
    }
}

#[async_trait]
impl<K> ClusterResourceOperator<K> for FakeOperator<K>
where
    K: Clone + PartialEq + Send + Sync + 'static,
{
    async fn reconcile(
        &self,
        _reconciliation: &Reconciliation,
        name: &str,
        desired: Option<K>,
    ) -> Result<ReconcileResult<K>> {
        self.converge("", name, desired)
    }
}

/// Deployment store counting explicit restarts
pub struct FakeDeployments {
    pub store: FakeOperator<Deployment>,
    pub restarts: AtomicUsize,
    pub readiness_times_out: AtomicBool,
}

#[async_trait]
impl ResourceOperator<Deployment> for FakeDeployments {
    async fn reconcile(
        &self,
        reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        desired: Option<Deployment>,
    ) -> Result<ReconcileResult<Deployment>> {
        ResourceOperator::reconcile(&self.store, reconciliation, namespace, name, desired).await
    }

    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Deployment>> {
        Ok(self.store.stored(namespace, name))
    }
}

#[async_trait]
impl DeploymentOperator for FakeDeployments {
    async fn rolling_update(
        &self,
        _reconciliation: &Reconciliation,
        _namespace: &str,
        _name: &str,
        _timeout: std::time::Duration,
    ) -> Result<()> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn wait_for_observed(
        &self,
        _reconciliation: &Reconciliation,
        _namespace: &str,
        _name: &str,
        _poll_interval: std::time::Duration,
        _timeout: std::time::Duration,
    ) -> Result<()> {
        Ok(())
    }

    async fn readiness(
        &self,
        _reconciliation: &Reconciliation,
        namespace: &str,
        name: &str,
        _poll_interval: std::time::Duration,
        timeout: std::time::Duration,
    ) -> Result<()> {
        if self.readiness_times_out.load(Ordering::SeqCst) {
            return Err(EntityOperatorError::Timeout {
                operation: "readiness",
                namespace: namespace.to_string(),
                name: name.to_string(),
                timeout,
            });
        }
        Ok(())
    }
}

/// In-memory cluster: one fake operator per kind sharing a call log
pub struct FakeCluster {
    pub log: CallLog,
    pub service_accounts: Arc<FakeOperator<ServiceAccount>>,
    pub roles: Arc<FakeOperator<Role>>,
    pub role_bindings: Arc<FakeOperator<RoleBinding>>,
    pub cluster_role_bindings: Arc<FakeOperator<ClusterRoleBinding>>,
    pub network_policies: Arc<FakeOperator<NetworkPolicy>>,
    pub config_maps: Arc<FakeOperator<ConfigMap>>,
    pub secrets: Arc<FakeOperator<Secret>>,
    pub deployments: Arc<FakeDeployments>,
}

impl FakeCluster {
    pub fn new() -> Self {
        let log: CallLog = Arc::default();
        Self {
            service_accounts: Arc::new(FakeOperator::new("ServiceAccount", log.clone())),
            roles: Arc::new(FakeOperator::new("Role", log.clone())),
            role_bindings: Arc::new(FakeOperator::new("RoleBinding", log.clone())),
            cluster_role_bindings: Arc::new(FakeOperator::new("ClusterRoleBinding", log.clone())),
            network_policies: Arc::new(FakeOperator::new("NetworkPolicy", log.clone())),
            config_maps: Arc::new(FakeOperator::new("ConfigMap", log.clone())),
            secrets: Arc::new(FakeOperator::new("Secret", log.clone())),
            deployments: Arc::new(FakeDeployments {
                store: FakeOperator::new("Deployment", log.clone()),
                restarts: AtomicUsize::new(0),
                readiness_times_out: AtomicBool::new(false),
            }),
            log,
        }
    }

    pub fn supplier(&self) -> ResourceOperatorSupplier {
        ResourceOperatorSupplier {
            service_accounts: self.service_accounts.clone(),
            roles: self.roles.clone(),
            role_bindings: self.role_bindings.clone(),
            cluster_role_bindings: self.cluster_role_bindings.clone(),
            network_policies: self.network_policies.clone(),
            config_maps: self.config_maps.clone(),
            secrets: self.secrets.clone(),
            deployments: self.deployments.clone(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.log.lock().unwrap().clear();
    }

    /// Calls matching kind, namespace and name
    pub fn calls_to(&self, kind: &str, namespace: &str, name: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.is(kind, namespace, name))
            .collect()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.kind).collect()
    }

    pub fn restarts(&self) -> usize {
        self.deployments.restarts.load(Ordering::SeqCst)
    }

    /// Run one reconciliation of `cluster` at `now`
    pub async fn reconcile(
        &self,
        cluster: &StreamingCluster,
        ca: Option<ClusterCa>,
        config: &ControllerConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let reconciliation = Reconciliation::new("test", "StreamingCluster", NAMESPACE, CLUSTER);
        let reconciler = EntityOperatorReconciler::new(
            reconciliation,
            cluster,
            config,
            self.supplier(),
            ca,
            &SharedEnvironment::default(),
        )?;
        reconciler
            .reconcile(
                &PlatformFeatures::default(),
                None,
                &[],
                &FixedClock(now),
            )
            .await
    }
}

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-03T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn cluster_ca(generation: i64) -> ClusterCa {
    ClusterCa::self_signed(
        "cluster-ca",
        now() - Duration::days(1),
        Duration::days(5 * 365),
        generation,
        generation,
    )
    .unwrap()
}

pub fn manager(watched_namespace: Option<&str>) -> EntityManagerSpec {
    EntityManagerSpec {
        watched_namespace: watched_namespace.map(ToString::to_string),
        ..Default::default()
    }
}

pub fn cluster(
    topic: Option<EntityManagerSpec>,
    user: Option<EntityManagerSpec>,
    maintenance_time_windows: Vec<String>,
) -> StreamingCluster {
    let entity_operator = (topic.is_some() || user.is_some()).then(|| EntityOperatorSpec {
        topic_operator: topic,
        user_operator: user,
        template: None,
    });
    let mut cluster = StreamingCluster::new(
        CLUSTER,
        StreamingClusterSpec {
            version: None,
            entity_operator,
            maintenance_time_windows,
        },
    );
    cluster.metadata.namespace = Some(NAMESPACE.to_string());
    cluster.metadata.uid = Some("4f1c2a8e-0000-4000-8000-000000000001".to_string());
    cluster.metadata.generation = Some(1);
    cluster
}
