//! # Entity Operator Model
//!
//! The composite desired state: one Deployment running up to two managers, plus the
//! ServiceAccount, Role and NetworkPolicy they share.

use super::manager::{ManagerKind, ManagerModel};
use super::{
    cluster_labels, names, owner_reference, ImagePullPolicy, PlatformFeatures, SharedEnvironment,
    VersionLookup,
};
use crate::constants::{API_GROUP, LABEL_CLUSTER, LABEL_NAME};
use crate::controller::reconciler::Reconciliation;
use crate::crd::{EntityOperatorTemplate, StreamingCluster};
use crate::error::{EntityOperatorError, Result};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, EmptyDirVolumeSource, LocalObjectReference, PodSecurityContext,
    PodSpec, PodTemplateSpec, SeccompProfile, SecretVolumeSource, ServiceAccount, Volume,
};
use k8s_openapi::api::networking::v1::{NetworkPolicy, NetworkPolicySpec};
use k8s_openapi::api::rbac::v1::{PolicyRule, Role};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference};
use kube::ResourceExt;
use serde_json::json;
use std::collections::BTreeMap;

/// Desired state of the entity operator of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct EntityOperator {
    cluster: String,
    namespace: String,
    labels: BTreeMap<String, String>,
    owner_reference: Option<OwnerReference>,
    template: EntityOperatorTemplate,
    topic_operator: Option<ManagerModel>,
    user_operator: Option<ManagerModel>,
    shared_environment: SharedEnvironment,
}

impl EntityOperator {
    /// Derive the entity operator from a `StreamingCluster`
    ///
    /// Returns None when the cluster declares no entity operator, or declares one
    /// without any manager. Either way every entity operator resource is removed.
    pub fn from_crd(
        reconciliation: &Reconciliation,
        cluster: &StreamingCluster,
        versions: &VersionLookup,
        shared_environment: &SharedEnvironment,
    ) -> Result<Option<Self>> {
        let Some(spec) = cluster.spec.entity_operator.as_ref() else {
            return Ok(None);
        };
        if spec.topic_operator.is_none() && spec.user_operator.is_none() {
            tracing::warn!(
                reconciliation = %reconciliation,
                "Entity operator declared without topic or user operator, it will not be deployed"
            );
            return Ok(None);
        }

        let name = cluster.name_any();
        let namespace = cluster.namespace().ok_or_else(|| {
            EntityOperatorError::InvalidConfig(format!("StreamingCluster {name} has no namespace"))
        })?;
        let owner = owner_reference(cluster);

        let topic_operator = spec
            .topic_operator
            .as_ref()
            .map(|s| {
                ManagerModel::from_crd(
                    ManagerKind::Topic,
                    &name,
                    &namespace,
                    owner.clone(),
                    s,
                    &versions.topic_operator_image,
                )
            })
            .transpose()?;
        let user_operator = spec
            .user_operator
            .as_ref()
            .map(|s| {
                ManagerModel::from_crd(
                    ManagerKind::User,
                    &name,
                    &namespace,
                    owner.clone(),
                    s,
                    &versions.user_operator_image,
                )
            })
            .transpose()?;

        Ok(Some(Self {
            labels: cluster_labels(&name, &names::entity_operator_name(&name)),
            cluster: name,
            namespace,
            owner_reference: owner,
            template: spec.template.clone().unwrap_or_default(),
            topic_operator,
            user_operator,
            shared_environment: shared_environment.clone(),
        }))
    }

    pub fn topic_operator(&self) -> Option<&ManagerModel> {
        self.topic_operator.as_ref()
    }

    pub fn user_operator(&self) -> Option<&ManagerModel> {
        self.user_operator.as_ref()
    }

    pub fn manager(&self, kind: ManagerKind) -> Option<&ManagerModel> {
        match kind {
            ManagerKind::Topic => self.topic_operator(),
            ManagerKind::User => self.user_operator(),
        }
    }

    fn metadata(&self, namespace: &str) -> ObjectMeta {
        ObjectMeta {
            name: Some(names::entity_operator_name(&self.cluster)),
            namespace: Some(namespace.to_string()),
            labels: Some(self.labels.clone()),
            owner_references: self
                .owner_reference
                .clone()
                .filter(|_| namespace == self.namespace)
                .map(|r| vec![r]),
            ..Default::default()
        }
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_CLUSTER.to_string(), self.cluster.clone()),
            (
                LABEL_NAME.to_string(),
                names::entity_operator_name(&self.cluster),
            ),
        ])
    }

    pub fn generate_service_account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: self.metadata(&self.namespace),
            ..Default::default()
        }
    }

    /// Role of the managers, placed in `target_namespace`
    ///
    /// Owned by the cluster only when `target_namespace` is `own_namespace`.
    pub fn generate_role(&self, own_namespace: &str, target_namespace: &str) -> Role {
        let mut metadata = self.metadata(target_namespace);
        if own_namespace != target_namespace {
            metadata.owner_references = None;
        }
        let rule = |api_group: &str, resources: &[&str], verbs: &[&str]| PolicyRule {
            api_groups: Some(vec![api_group.to_string()]),
            resources: Some(resources.iter().map(ToString::to_string).collect()),
            verbs: verbs.iter().map(ToString::to_string).collect(),
            ..Default::default()
        };
        let all_verbs = [
            "get", "list", "watch", "create", "patch", "update", "delete",
        ];

        Role {
            metadata,
            rules: Some(vec![
                rule(
                    API_GROUP,
                    &[
                        "streamingtopics",
                        "streamingtopics/status",
                        "streamingusers",
                        "streamingusers/status",
                    ],
                    &all_verbs,
                ),
                rule("", &["events"], &["create"]),
                rule("", &["secrets"], &all_verbs),
            ]),
        }
    }

    /// NetworkPolicy admitting traffic to the health endpoints only
    pub fn generate_network_policy(&self) -> Result<NetworkPolicy> {
        let ports: Vec<serde_json::Value> = self
            .managers()
            .map(|m| json!({ "port": m.kind().health_port(), "protocol": "TCP" }))
            .collect();

        let spec: NetworkPolicySpec = serde_json::from_value(json!({
            "podSelector": { "matchLabels": self.selector_labels() },
            "ingress": [{ "ports": ports }],
            "policyTypes": ["Ingress"],
        }))
        .map_err(|e| EntityOperatorError::InvalidConfig(format!("NetworkPolicy: {e}")))?;

        Ok(NetworkPolicy {
            metadata: self.metadata(&self.namespace),
            spec: Some(spec),
            ..Default::default()
        })
    }

    /// Deployment running one container per enabled manager
    ///
    /// The CA generation annotations are stamped onto the pod template by the
    /// reconciler, not here.
    pub fn generate_deployment(
        &self,
        platform: &PlatformFeatures,
        image_pull_policy: Option<ImagePullPolicy>,
        image_pull_secrets: &[LocalObjectReference],
    ) -> Deployment {
        let mut pod_labels = self.labels.clone();
        pod_labels.extend(self.template.pod_labels.clone());

        let containers = self
            .managers()
            .map(|m| m.generate_container(image_pull_policy, &self.shared_environment))
            .collect();

        // OpenShift assigns user and seccomp settings through its SCCs
        let security_context = (!platform.is_openshift).then(|| PodSecurityContext {
            run_as_non_root: Some(true),
            seccomp_profile: Some(SeccompProfile {
                type_: "RuntimeDefault".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        });

        Deployment {
            metadata: self.metadata(&self.namespace),
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..Default::default()
                },
                strategy: Some(DeploymentStrategy {
                    type_: Some("Recreate".to_string()),
                    ..Default::default()
                }),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(pod_labels),
                        annotations: Some(self.template.pod_annotations.clone()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(names::entity_operator_name(&self.cluster)),
                        containers,
                        volumes: Some(self.volumes()),
                        security_context,
                        image_pull_secrets: (!image_pull_secrets.is_empty())
                            .then(|| image_pull_secrets.to_vec()),
                        termination_grace_period_seconds: Some(30),
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn managers(&self) -> impl Iterator<Item = &ManagerModel> {
        self.topic_operator.iter().chain(self.user_operator.iter())
    }

    fn volumes(&self) -> Vec<Volume> {
        let mut volumes = vec![
            Volume {
                name: "tmp".to_string(),
                empty_dir: Some(EmptyDirVolumeSource {
                    medium: Some("Memory".to_string()),
                    size_limit: Some(Quantity("5Mi".to_string())),
                }),
                ..Default::default()
            },
            Volume {
                name: "cluster-ca-certs".to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(names::cluster_ca_cert_secret_name(&self.cluster)),
                    default_mode: Some(0o444),
                    ..Default::default()
                }),
                ..Default::default()
            },
        ];

        for manager in self.managers() {
            let kind = manager.kind();
            volumes.push(Volume {
                name: kind.logging_volume().to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name: kind.logging_config_map_name(&self.cluster),
                    ..Default::default()
                }),
                ..Default::default()
            });
            volumes.push(Volume {
                name: kind.certs_volume().to_string(),
                secret: Some(SecretVolumeSource {
                    secret_name: Some(kind.secret_name(&self.cluster)),
                    default_mode: Some(0o444),
                    ..Default::default()
                }),
                ..Default::default()
            });
        }
        volumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{EntityManagerSpec, EntityOperatorSpec, StreamingClusterSpec};

    fn cluster(entity_operator: Option<EntityOperatorSpec>) -> StreamingCluster {
        let mut cluster = StreamingCluster::new(
            "my-cluster",
            StreamingClusterSpec {
                version: None,
                entity_operator,
                maintenance_time_windows: Vec::new(),
            },
        );
        cluster.metadata.namespace = Some("streaming".to_string());
        cluster.metadata.uid = Some("5a1f".to_string());
        cluster
    }

    fn versions() -> VersionLookup {
        VersionLookup {
            topic_operator_image: "to:1".to_string(),
            user_operator_image: "uo:1".to_string(),
        }
    }

    fn reconciliation() -> Reconciliation {
        Reconciliation::new("test", "StreamingCluster", "streaming", "my-cluster")
    }

    fn derive(spec: Option<EntityOperatorSpec>) -> Option<EntityOperator> {
        EntityOperator::from_crd(
            &reconciliation(),
            &cluster(spec),
            &versions(),
            &SharedEnvironment::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_absent_model() {
        assert!(derive(None).is_none());
        assert!(derive(Some(EntityOperatorSpec::default())).is_none());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let spec = EntityOperatorSpec {
            topic_operator: Some(EntityManagerSpec::default()),
            user_operator: Some(EntityManagerSpec::default()),
            template: None,
        };
        let a = derive(Some(spec.clone())).unwrap();
        let b = derive(Some(spec)).unwrap();
        assert_eq!(a, b);
        let platform = PlatformFeatures::default();
        assert_eq!(
            a.generate_deployment(&platform, None, &[]),
            b.generate_deployment(&platform, None, &[])
        );
    }

    #[test]
    fn test_deployment_runs_enabled_managers() {
        let model = derive(Some(EntityOperatorSpec {
            topic_operator: None,
            user_operator: Some(EntityManagerSpec::default()),
            template: None,
        }))
        .unwrap();
        let deployment = model.generate_deployment(&PlatformFeatures::default(), None, &[]);
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(pod.containers.len(), 1);
        assert_eq!(pod.containers[0].name, "user-operator");
        assert_eq!(pod.containers[0].image.as_deref(), Some("uo:1"));
        assert!(pod.security_context.is_some());
        assert_eq!(
            pod.service_account_name.as_deref(),
            Some("my-cluster-entity-operator")
        );
    }

    #[test]
    fn test_openshift_leaves_security_context_unset() {
        let model = derive(Some(EntityOperatorSpec {
            topic_operator: Some(EntityManagerSpec::default()),
            user_operator: None,
            template: None,
        }))
        .unwrap();
        let deployment = model.generate_deployment(
            &PlatformFeatures { is_openshift: true },
            None,
            &[LocalObjectReference {
                name: "registry".to_string(),
            }],
        );
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert!(pod.security_context.is_none());
        assert_eq!(pod.image_pull_secrets.unwrap()[0].name, "registry");
    }

    #[test]
    fn test_foreign_role_is_not_owned() {
        let model = derive(Some(EntityOperatorSpec {
            topic_operator: Some(EntityManagerSpec::default()),
            user_operator: None,
            template: None,
        }))
        .unwrap();
        let own = model.generate_role("streaming", "streaming");
        let foreign = model.generate_role("streaming", "topics");
        assert!(own.metadata.owner_references.is_some());
        assert!(foreign.metadata.owner_references.is_none());
        assert_eq!(foreign.metadata.namespace.as_deref(), Some("topics"));
        assert_eq!(own.metadata.name, foreign.metadata.name);
    }

    #[test]
    fn test_network_policy_opens_health_ports() {
        let model = derive(Some(EntityOperatorSpec {
            topic_operator: Some(EntityManagerSpec::default()),
            user_operator: Some(EntityManagerSpec::default()),
            template: None,
        }))
        .unwrap();
        let policy = model.generate_network_policy().unwrap();
        let value = serde_json::to_value(&policy).unwrap();
        let ports = &value["spec"]["ingress"][0]["ports"];
        assert_eq!(ports[0]["port"], 8080);
        assert_eq!(ports[1]["port"], 8081);
    }
}
