//! # Entity Operator Reconciliation
//!
//! Converges every resource of the entity operator of one cluster, in a fixed order:
//!
//! 1. ServiceAccount
//! 2. Role in the cluster namespace
//! 3. Topic operator Role in its watched namespace (only when foreign)
//! 4. User operator Role in its watched namespace (only when foreign)
//! 5. NetworkPolicy (skipped when policy generation is disabled)
//! 6. Topic operator RoleBindings
//! 7. User operator RoleBindings
//! 8. Topic operator logging ConfigMap
//! 9. User operator logging ConfigMap
//! 10. Deprecated shared certificate Secret (always removed)
//! 11. Topic operator certificate Secret
//! 12. User operator certificate Secret
//! 13. Deployment, restarted explicitly when certificates changed underneath it
//! 14. Readiness
//!
//! Without a model every step converges its resource to absent. The first failing
//! step aborts the reconciliation; whatever earlier steps did stands.

use crate::config::ControllerConfig;
use crate::constants::{ANNO_CLUSTER_CA_CERT_GENERATION, ANNO_CLUSTER_CA_KEY_GENERATION};
use crate::controller::maintenance;
use crate::controller::reconciler::certificates::certificates_changed;
use crate::controller::reconciler::operators::ResourceOperatorSupplier;
use crate::controller::reconciler::rollout;
use crate::controller::reconciler::scope::NamespaceScope;
use crate::controller::reconciler::{Clock, Reconciliation};
use crate::crd::{ConfigMapKeyRef, StreamingCluster};
use crate::error::{EntityOperatorError, Result};
use crate::model::{
    names, ClusterCa, EntityOperator, ImagePullPolicy, ManagerKind, PlatformFeatures,
    SharedEnvironment,
};
use crate::observability::metrics;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::LocalObjectReference;
use std::time::Duration;
use tracing::{debug, info};

/// Certificate changes seen by the secret steps of one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub topic_certs_changed: bool,
    pub user_certs_changed: bool,
}

impl PipelineState {
    pub fn certs_changed(&self) -> bool {
        self.topic_certs_changed || self.user_certs_changed
    }
}

/// Reconciler of the entity operator of one cluster
///
/// Built fresh for every reconciliation and consumed by `reconcile`.
pub struct EntityOperatorReconciler {
    reconciliation: Reconciliation,
    operators: ResourceOperatorSupplier,
    model: Option<EntityOperator>,
    cluster_ca: Option<ClusterCa>,
    maintenance_windows: Vec<String>,
    network_policy_generation: bool,
    operation_timeout: Duration,
    readiness_poll_interval: Duration,
    state: PipelineState,
}

impl EntityOperatorReconciler {
    /// Derive the entity operator model of `cluster`
    ///
    /// `cluster_ca` may be None while the cluster CA does not exist yet; reconciling
    /// an enabled manager then fails on its certificate step.
    pub fn new(
        reconciliation: Reconciliation,
        cluster: &StreamingCluster,
        config: &ControllerConfig,
        operators: ResourceOperatorSupplier,
        cluster_ca: Option<ClusterCa>,
        shared_environment: &SharedEnvironment,
    ) -> Result<Self> {
        let model = EntityOperator::from_crd(
            &reconciliation,
            cluster,
            &config.version_lookup(),
            shared_environment,
        )?;

        Ok(Self {
            reconciliation,
            operators,
            model,
            cluster_ca,
            maintenance_windows: cluster.spec.maintenance_time_windows.clone(),
            network_policy_generation: config.network_policy_generation,
            operation_timeout: config.operation_timeout(),
            readiness_poll_interval: config.readiness_poll_interval(),
            state: PipelineState::default(),
        })
    }

    /// Whether the cluster declares an entity operator
    pub fn is_enabled(&self) -> bool {
        self.model.is_some()
    }

    fn namespace(&self) -> &str {
        self.reconciliation.namespace()
    }

    fn cluster(&self) -> &str {
        self.reconciliation.name()
    }

    fn resource_name(&self) -> String {
        names::entity_operator_name(self.cluster())
    }

    /// Run every step in order
    pub async fn reconcile(
        mut self,
        platform: &PlatformFeatures,
        image_pull_policy: Option<ImagePullPolicy>,
        image_pull_secrets: &[LocalObjectReference],
        clock: &dyn Clock,
    ) -> Result<()> {
        debug!(
            reconciliation = %self.reconciliation,
            enabled = self.is_enabled(),
            "Reconciling entity operator"
        );

        self.service_account().await?;
        self.entity_operator_role().await?;
        self.watched_namespace_role(ManagerKind::Topic).await?;
        self.watched_namespace_role(ManagerKind::User).await?;
        self.network_policy().await?;
        self.role_bindings(ManagerKind::Topic).await?;
        self.role_bindings(ManagerKind::User).await?;
        self.logging_config_map(ManagerKind::Topic).await?;
        self.logging_config_map(ManagerKind::User).await?;
        self.delete_deprecated_secret().await?;
        self.state.topic_certs_changed = self.certificate_secret(ManagerKind::Topic, clock).await?;
        self.state.user_certs_changed = self.certificate_secret(ManagerKind::User, clock).await?;
        self.deployment(platform, image_pull_policy, image_pull_secrets)
            .await?;
        self.readiness().await
    }

    async fn service_account(&self) -> Result<()> {
        self.operators
            .service_accounts
            .reconcile(
                &self.reconciliation,
                self.namespace(),
                &self.resource_name(),
                self.model.as_ref().map(EntityOperator::generate_service_account),
            )
            .await?;
        Ok(())
    }

    async fn entity_operator_role(&self) -> Result<()> {
        let namespace = self.namespace();
        self.operators
            .roles
            .reconcile(
                &self.reconciliation,
                namespace,
                &self.resource_name(),
                self.model
                    .as_ref()
                    .map(|m| m.generate_role(namespace, namespace)),
            )
            .await?;
        Ok(())
    }

    /// Replica of the Role in a foreign watched namespace
    ///
    /// Nothing to do for a disabled manager: the namespace it used to watch is unknown.
    async fn watched_namespace_role(&self, kind: ManagerKind) -> Result<()> {
        let Some(model) = self.model.as_ref() else {
            return Ok(());
        };
        let Some(manager) = model.manager(kind) else {
            return Ok(());
        };
        let scope = NamespaceScope::resolve(self.namespace(), manager.watched_namespace());
        let Some(target) = scope.foreign_namespace() else {
            return Ok(());
        };

        self.operators
            .roles
            .reconcile(
                &self.reconciliation,
                target,
                &self.resource_name(),
                Some(model.generate_role(self.namespace(), target)),
            )
            .await?;
        Ok(())
    }

    async fn network_policy(&self) -> Result<()> {
        if !self.network_policy_generation {
            return Ok(());
        }
        let desired = self
            .model
            .as_ref()
            .map(EntityOperator::generate_network_policy)
            .transpose()?;
        self.operators
            .network_policies
            .reconcile(
                &self.reconciliation,
                self.namespace(),
                &self.resource_name(),
                desired,
            )
            .await?;
        Ok(())
    }

    /// RoleBindings of one manager
    ///
    /// The binding in the cluster namespace and the scope binding are reconciled
    /// concurrently. A disabled manager has both its RoleBinding and its
    /// ClusterRoleBinding removed.
    async fn role_bindings(&self, kind: ManagerKind) -> Result<()> {
        let namespace = self.namespace();
        let cluster = self.cluster();
        let binding_name = kind.role_binding_name(cluster);
        let cluster_binding_name = kind.cluster_role_binding_name(namespace, cluster);
        let role_bindings = &self.operators.role_bindings;
        let cluster_role_bindings = &self.operators.cluster_role_bindings;

        let Some(manager) = self.model.as_ref().and_then(|m| m.manager(kind)) else {
            futures::try_join!(
                role_bindings.reconcile(&self.reconciliation, namespace, &binding_name, None),
                cluster_role_bindings.reconcile(&self.reconciliation, &cluster_binding_name, None),
            )?;
            return Ok(());
        };

        let own = role_bindings.reconcile(
            &self.reconciliation,
            namespace,
            &binding_name,
            Some(manager.generate_role_binding_for_role(namespace)),
        );
        let scoped = async {
            match NamespaceScope::resolve(namespace, manager.watched_namespace()) {
                NamespaceScope::Same => Ok(()),
                NamespaceScope::Other(target) => role_bindings
                    .reconcile(
                        &self.reconciliation,
                        &target,
                        &binding_name,
                        Some(manager.generate_role_binding_for_role(&target)),
                    )
                    .await
                    .map(|_| ()),
                NamespaceScope::All => cluster_role_bindings
                    .reconcile(
                        &self.reconciliation,
                        &cluster_binding_name,
                        Some(manager.generate_cluster_role_binding()),
                    )
                    .await
                    .map(|_| ()),
            }
        };
        futures::try_join!(own, scoped)?;
        Ok(())
    }

    async fn logging_config_map(&self, kind: ManagerKind) -> Result<()> {
        let name = kind.logging_config_map_name(self.cluster());
        let desired = match self.model.as_ref().and_then(|m| m.manager(kind)) {
            None => None,
            Some(manager) => {
                let content = match manager.external_logging() {
                    Some(key_ref) => self.external_logging(key_ref).await?,
                    None => manager.inline_logging().unwrap_or_default(),
                };
                Some(manager.generate_logging_config_map(content))
            }
        };
        self.operators
            .config_maps
            .reconcile(&self.reconciliation, self.namespace(), &name, desired)
            .await?;
        Ok(())
    }

    /// Logging configuration held in a user supplied ConfigMap
    async fn external_logging(&self, key_ref: &ConfigMapKeyRef) -> Result<String> {
        let config_map = self
            .operators
            .config_maps
            .get(self.namespace(), &key_ref.name)
            .await?;
        config_map
            .and_then(|cm| cm.data)
            .and_then(|mut data| data.remove(&key_ref.key))
            .ok_or_else(|| {
                EntityOperatorError::InvalidConfig(format!(
                    "external logging configuration {}/{} key {} not found",
                    self.namespace(),
                    key_ref.name,
                    key_ref.key
                ))
            })
    }

    async fn delete_deprecated_secret(&self) -> Result<()> {
        self.operators
            .secrets
            .reconcile(
                &self.reconciliation,
                self.namespace(),
                &names::deprecated_entity_operator_secret_name(self.cluster()),
                None,
            )
            .await?;
        Ok(())
    }

    /// Certificate Secret of one manager
    ///
    /// Returns whether the certificates stored in the Secret changed.
    async fn certificate_secret(&self, kind: ManagerKind, clock: &dyn Clock) -> Result<bool> {
        let namespace = self.namespace();
        let name = kind.secret_name(self.cluster());

        let Some(manager) = self.model.as_ref().and_then(|m| m.manager(kind)) else {
            self.operators
                .secrets
                .reconcile(&self.reconciliation, namespace, &name, None)
                .await?;
            return Ok(false);
        };
        let ca = self.cluster_ca.as_ref().ok_or_else(|| {
            EntityOperatorError::Certificate(format!(
                "cluster CA of {namespace}/{} is not available",
                self.cluster()
            ))
        })?;

        let now = clock.now();
        let stored = self.operators.secrets.get(namespace, &name).await?;
        let window_satisfied =
            maintenance::is_satisfied(&self.reconciliation, &self.maintenance_windows, now);
        let desired = manager.generate_secret(ca, stored.as_ref(), window_satisfied, now)?;

        let result = self
            .operators
            .secrets
            .reconcile(&self.reconciliation, namespace, &name, Some(desired))
            .await?;
        let changed = certificates_changed(stored.as_ref(), &result);
        if changed {
            info!(
                reconciliation = %self.reconciliation,
                manager = kind.as_str(),
                "Certificates of {namespace}/{name} changed"
            );
            metrics::increment_certificate_renewals(kind.as_str());
        }
        Ok(changed)
    }

    async fn deployment(
        &self,
        platform: &PlatformFeatures,
        image_pull_policy: Option<ImagePullPolicy>,
        image_pull_secrets: &[LocalObjectReference],
    ) -> Result<()> {
        let namespace = self.namespace();
        let name = self.resource_name();
        let desired = self.model.as_ref().map(|m| {
            let mut deployment =
                m.generate_deployment(platform, image_pull_policy, image_pull_secrets);
            if let Some(ca) = &self.cluster_ca {
                stamp_ca_generations(&mut deployment, ca);
            }
            deployment
        });

        let result = self
            .operators
            .deployments
            .reconcile(&self.reconciliation, namespace, &name, desired)
            .await?;
        debug!(
            reconciliation = %self.reconciliation,
            outcome = result.outcome(),
            "Deployment {namespace}/{name} reconciled"
        );

        let certs_removed = self
            .cluster_ca
            .as_ref()
            .is_some_and(ClusterCa::certs_removed);
        rollout::restart_if_required(
            self.operators.deployments.as_ref(),
            &self.reconciliation,
            namespace,
            &name,
            &result,
            &self.state,
            certs_removed,
            self.operation_timeout,
        )
        .await?;
        Ok(())
    }

    async fn readiness(&self) -> Result<()> {
        if self.model.is_none() {
            return Ok(());
        }
        rollout::wait_for_readiness(
            self.operators.deployments.as_ref(),
            &self.reconciliation,
            self.namespace(),
            &self.resource_name(),
            self.readiness_poll_interval,
            self.operation_timeout,
        )
        .await
    }
}

/// Record the CA generations the pods were started with on the pod template
fn stamp_ca_generations(deployment: &mut Deployment, ca: &ClusterCa) {
    let Some(spec) = deployment.spec.as_mut() else {
        return;
    };
    let annotations = spec
        .template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(Default::default);
    annotations.insert(
        ANNO_CLUSTER_CA_CERT_GENERATION.to_string(),
        ca.cert_generation().to_string(),
    );
    annotations.insert(
        ANNO_CLUSTER_CA_KEY_GENERATION.to_string(),
        ca.key_generation().to_string(),
    );
}
