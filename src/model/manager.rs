//! # Manager Model
//!
//! Resources owned by one manager (topic operator or user operator): RBAC bindings,
//! the logging ConfigMap, the client certificate Secret and the container running in
//! the entity operator Deployment.

use super::ca::{byte_string, certificate_expires_within, ClusterCa};
use super::{cluster_labels, names, render_log4j2, ImagePullPolicy, SharedEnvironment};
use crate::constants::{
    ALL_NAMESPACES, ANNO_CLUSTER_CA_CERT_GENERATION, ANNO_CLUSTER_CA_KEY_GENERATION,
    CERT_RENEWAL_DAYS, CERT_VALIDITY_DAYS, ENTITY_OPERATOR_CLUSTER_ROLE, LABEL_CLUSTER,
    TOPIC_OPERATOR_HEALTH_PORT, USER_OPERATOR_HEALTH_PORT,
};
use crate::crd::{ConfigMapKeyRef, EntityManagerSpec, JvmOptions, Logging, ResourceRequirements};
use crate::error::{EntityOperatorError, Result};
use chrono::{DateTime, Duration, Utc};
use k8s_openapi::api::core::v1::{
    ConfigMap, Container, ContainerPort, EnvVar, HTTPGetAction, Probe, Secret,
    ResourceRequirements as PodResourceRequirements, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, RoleBinding, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;

/// Key of the log4j2 document in the logging ConfigMap
pub const LOGGING_CONFIG_KEY: &str = "log4j2.properties";

const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";

/// Which of the two managers a model describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerKind {
    Topic,
    User,
}

impl ManagerKind {
    /// Short name used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Topic => "topic-operator",
            Self::User => "user-operator",
        }
    }

    /// Component name, also the certificate CN and the container name
    pub fn component_name(&self, cluster: &str) -> String {
        match self {
            Self::Topic => names::topic_operator_name(cluster),
            Self::User => names::user_operator_name(cluster),
        }
    }

    pub fn role_binding_name(&self, cluster: &str) -> String {
        match self {
            Self::Topic => names::topic_operator_role_binding_name(cluster),
            Self::User => names::user_operator_role_binding_name(cluster),
        }
    }

    pub fn cluster_role_binding_name(&self, namespace: &str, cluster: &str) -> String {
        match self {
            Self::Topic => names::topic_operator_cluster_role_binding_name(namespace, cluster),
            Self::User => names::user_operator_cluster_role_binding_name(namespace, cluster),
        }
    }

    pub fn logging_config_map_name(&self, cluster: &str) -> String {
        match self {
            Self::Topic => names::topic_operator_logging_config_map_name(cluster),
            Self::User => names::user_operator_logging_config_map_name(cluster),
        }
    }

    pub fn secret_name(&self, cluster: &str) -> String {
        match self {
            Self::Topic => names::topic_operator_secret_name(cluster),
            Self::User => names::user_operator_secret_name(cluster),
        }
    }

    pub fn health_port(&self) -> i32 {
        match self {
            Self::Topic => TOPIC_OPERATOR_HEALTH_PORT,
            Self::User => USER_OPERATOR_HEALTH_PORT,
        }
    }

    /// Name of the log4j2 configuration
    fn log4j_config_name(&self) -> &'static str {
        match self {
            Self::Topic => "TOConfig",
            Self::User => "UOConfig",
        }
    }

    /// Volume names of the logging ConfigMap and certificate Secret
    pub(crate) fn logging_volume(&self) -> &'static str {
        match self {
            Self::Topic => "entity-topic-operator-logging",
            Self::User => "entity-user-operator-logging",
        }
    }

    pub(crate) fn certs_volume(&self) -> &'static str {
        match self {
            Self::Topic => "eto-certs",
            Self::User => "euo-certs",
        }
    }

    fn run_script(&self) -> &'static str {
        match self {
            Self::Topic => "/opt/streamhub/bin/topic_operator_run.sh",
            Self::User => "/opt/streamhub/bin/user_operator_run.sh",
        }
    }
}

/// Desired state of one manager
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerModel {
    kind: ManagerKind,
    cluster: String,
    namespace: String,
    watched_namespace: String,
    image: String,
    reconciliation_interval_ms: Option<u64>,
    resources: Option<PodResourceRequirements>,
    logging: Option<Logging>,
    jvm_options: Option<JvmOptions>,
    labels: BTreeMap<String, String>,
    owner_reference: Option<OwnerReference>,
}

impl ManagerModel {
    /// Derive the manager model from its section of the cluster spec
    ///
    /// An unset watched namespace defaults to the cluster namespace.
    pub(crate) fn from_crd(
        kind: ManagerKind,
        cluster: &str,
        namespace: &str,
        owner_reference: Option<OwnerReference>,
        spec: &EntityManagerSpec,
        default_image: &str,
    ) -> Result<Self> {
        if let Some(jvm) = &spec.jvm_options {
            jvm.validate().map_err(|e| {
                EntityOperatorError::InvalidConfig(format!("{}: {e}", kind.as_str()))
            })?;
        }
        let resources = spec
            .resources
            .as_ref()
            .map(|r| resource_requirements(kind, r))
            .transpose()?;
        let watched_namespace = match spec.watched_namespace.as_deref().map(str::trim) {
            None | Some("") => namespace.to_string(),
            Some(ns) => ns.to_string(),
        };

        Ok(Self {
            kind,
            cluster: cluster.to_string(),
            namespace: namespace.to_string(),
            watched_namespace,
            image: spec
                .image
                .clone()
                .unwrap_or_else(|| default_image.to_string()),
            reconciliation_interval_ms: spec.reconciliation_interval_ms,
            resources,
            logging: spec.logging.clone(),
            jvm_options: spec.jvm_options.clone(),
            labels: cluster_labels(cluster, &names::entity_operator_name(cluster)),
            owner_reference,
        })
    }

    pub fn kind(&self) -> ManagerKind {
        self.kind
    }

    /// Namespace the manager watches (`*` for all namespaces)
    pub fn watched_namespace(&self) -> &str {
        &self.watched_namespace
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// Reference to the external logging ConfigMap key, if logging is external
    pub fn external_logging(&self) -> Option<&ConfigMapKeyRef> {
        match &self.logging {
            Some(Logging::External { value_from }) => Some(&value_from.config_map_key_ref),
            _ => None,
        }
    }

    /// log4j2 document for inline (or default) logging, None if logging is external
    pub fn inline_logging(&self) -> Option<String> {
        match &self.logging {
            Some(Logging::External { .. }) => None,
            Some(Logging::Inline { loggers }) => {
                Some(render_log4j2(self.kind.log4j_config_name(), loggers))
            }
            None => Some(render_log4j2(
                self.kind.log4j_config_name(),
                &BTreeMap::new(),
            )),
        }
    }

    fn metadata(&self, name: String, namespace: Option<&str>) -> ObjectMeta {
        // Owner references only work within the cluster namespace
        let owned = namespace == Some(self.namespace.as_str());
        ObjectMeta {
            name: Some(name),
            namespace: namespace.map(ToString::to_string),
            labels: Some(self.labels.clone()),
            owner_references: self
                .owner_reference
                .clone()
                .filter(|_| owned)
                .map(|r| vec![r]),
            ..Default::default()
        }
    }

    fn service_account_subject(&self) -> Subject {
        Subject {
            kind: "ServiceAccount".to_string(),
            name: names::entity_operator_name(&self.cluster),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }

    /// RoleBinding of the manager to the entity operator Role in `binding_namespace`
    ///
    /// Used both in the cluster namespace (access to the CA Secrets) and in a foreign
    /// watched namespace. The Role bound is the replica in the same namespace.
    pub fn generate_role_binding_for_role(&self, binding_namespace: &str) -> RoleBinding {
        RoleBinding {
            metadata: self.metadata(
                self.kind.role_binding_name(&self.cluster),
                Some(binding_namespace),
            ),
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "Role".to_string(),
                name: names::entity_operator_name(&self.cluster),
            },
            subjects: Some(vec![self.service_account_subject()]),
        }
    }

    /// ClusterRoleBinding granting the cluster-wide entity operator role
    pub fn generate_cluster_role_binding(&self) -> ClusterRoleBinding {
        ClusterRoleBinding {
            metadata: self.metadata(
                self.kind
                    .cluster_role_binding_name(&self.namespace, &self.cluster),
                None,
            ),
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: "ClusterRole".to_string(),
                name: ENTITY_OPERATOR_CLUSTER_ROLE.to_string(),
            },
            subjects: Some(vec![self.service_account_subject()]),
        }
    }

    /// Logging ConfigMap holding `content` as the log4j2 document
    pub fn generate_logging_config_map(&self, content: String) -> ConfigMap {
        ConfigMap {
            metadata: self.metadata(
                self.kind.logging_config_map_name(&self.cluster),
                Some(&self.namespace),
            ),
            data: Some(BTreeMap::from([(LOGGING_CONFIG_KEY.to_string(), content)])),
            ..Default::default()
        }
    }

    /// Certificate Secret of the manager
    ///
    /// A new certificate is issued when none is stored, when the stored one cannot be
    /// parsed, or when the stored pair is missing a half. A stored certificate issued by
    /// an older CA generation, or expiring within the renewal window, is renewed only
    /// when `maintenance_window_satisfied`; otherwise the stored material and its
    /// generation annotations are kept as they are.
    pub fn generate_secret(
        &self,
        ca: &ClusterCa,
        existing: Option<&Secret>,
        maintenance_window_satisfied: bool,
        now: DateTime<Utc>,
    ) -> Result<Secret> {
        let component = self.kind.component_name(&self.cluster);
        let cert_key = format!("{component}.crt");
        let key_key = format!("{component}.key");

        let stored = existing.and_then(|secret| {
            let data = secret.data.as_ref()?;
            Some((data.get(&cert_key)?, data.get(&key_key)?, secret))
        });

        let keep = match stored {
            None => None,
            Some((cert, key, secret)) => {
                let annotations = secret.metadata.annotations.clone().unwrap_or_default();
                let stale_ca = annotations.get(ANNO_CLUSTER_CA_CERT_GENERATION)
                    != Some(&ca.cert_generation().to_string())
                    || annotations.get(ANNO_CLUSTER_CA_KEY_GENERATION)
                        != Some(&ca.key_generation().to_string());
                match certificate_expires_within(
                    &cert.0,
                    now,
                    Duration::days(CERT_RENEWAL_DAYS),
                ) {
                    Err(e) => {
                        tracing::warn!(secret = %component, error = %e, "Stored certificate is unreadable, reissuing");
                        None
                    }
                    Ok(expiring) if (stale_ca || expiring) && maintenance_window_satisfied => None,
                    Ok(expiring) => {
                        if stale_ca || expiring {
                            tracing::info!(
                                secret = %component,
                                "Certificate renewal deferred until the next maintenance window"
                            );
                        }
                        Some((cert.clone(), key.clone(), generation_annotations(&annotations)))
                    }
                }
            }
        };

        let (cert, key, annotations) = match keep {
            Some(kept) => kept,
            None => {
                let issued = ca.issue(&component, now, Duration::days(CERT_VALIDITY_DAYS))?;
                (
                    byte_string(&issued.cert_pem),
                    byte_string(&issued.key_pem),
                    BTreeMap::from([
                        (
                            ANNO_CLUSTER_CA_CERT_GENERATION.to_string(),
                            ca.cert_generation().to_string(),
                        ),
                        (
                            ANNO_CLUSTER_CA_KEY_GENERATION.to_string(),
                            ca.key_generation().to_string(),
                        ),
                    ]),
                )
            }
        };

        let mut metadata = self.metadata(self.kind.secret_name(&self.cluster), Some(&self.namespace));
        metadata.annotations = (!annotations.is_empty()).then_some(annotations);

        Ok(Secret {
            metadata,
            type_: Some("Opaque".to_string()),
            data: Some(BTreeMap::from([(cert_key, cert), (key_key, key)])),
            ..Default::default()
        })
    }

    /// Container of this manager in the entity operator Deployment
    pub fn generate_container(
        &self,
        image_pull_policy: Option<ImagePullPolicy>,
        shared_environment: &SharedEnvironment,
    ) -> Container {
        let port = self.kind.health_port();
        let probe = |path: &str, initial_delay: i32| Probe {
            http_get: Some(HTTPGetAction {
                path: Some(path.to_string()),
                port: IntOrString::String("healthcheck".to_string()),
                ..Default::default()
            }),
            initial_delay_seconds: Some(initial_delay),
            timeout_seconds: Some(5),
            ..Default::default()
        };

        Container {
            name: self.kind.as_str().to_string(),
            image: Some(self.image.clone()),
            image_pull_policy: image_pull_policy.map(|p| p.as_str().to_string()),
            args: Some(vec![self.kind.run_script().to_string()]),
            env: Some(self.env_vars(shared_environment)),
            ports: Some(vec![ContainerPort {
                name: Some("healthcheck".to_string()),
                container_port: port,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            liveness_probe: Some(probe("/healthy", 10)),
            readiness_probe: Some(probe("/ready", 10)),
            resources: self.resources.clone(),
            volume_mounts: Some(vec![
                VolumeMount {
                    name: self.kind.logging_volume().to_string(),
                    mount_path: "/opt/streamhub/custom-config/".to_string(),
                    ..Default::default()
                },
                VolumeMount {
                    name: self.kind.certs_volume().to_string(),
                    mount_path: format!("/etc/{}/", self.kind.certs_volume()),
                    ..Default::default()
                },
                VolumeMount {
                    name: "cluster-ca-certs".to_string(),
                    mount_path: "/etc/tls-sidecar/cluster-ca-certs/".to_string(),
                    ..Default::default()
                },
                VolumeMount {
                    name: "tmp".to_string(),
                    mount_path: "/tmp".to_string(),
                    ..Default::default()
                },
            ]),
            ..Default::default()
        }
    }

    fn env_vars(&self, shared_environment: &SharedEnvironment) -> Vec<EnvVar> {
        let env = |name: &str, value: String| EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        };

        let mut vars = vec![
            env(
                "STREAMHUB_RESOURCE_LABELS",
                format!("{LABEL_CLUSTER}={}", self.cluster),
            ),
            env(
                "STREAMHUB_BOOTSTRAP_SERVERS",
                names::bootstrap_address(&self.cluster, &self.namespace),
            ),
            env("STREAMHUB_WATCHED_NAMESPACE", self.watched_namespace.clone()),
            env(
                "STREAMHUB_WATCH_ALL_NAMESPACES",
                (self.watched_namespace == ALL_NAMESPACES).to_string(),
            ),
            env("STREAMHUB_CA_NAMESPACE", self.namespace.clone()),
            env("STREAMHUB_TLS_ENABLED", "true".to_string()),
        ];
        if let Some(interval) = self.reconciliation_interval_ms {
            vars.push(env(
                "STREAMHUB_FULL_RECONCILIATION_INTERVAL_MS",
                interval.to_string(),
            ));
        }

        let jvm = self.jvm_options.clone().unwrap_or_default();
        if let Some(opts) = jvm.java_opts() {
            vars.push(env("JAVA_OPTS", opts));
        }
        vars.push(env("GC_LOG_ENABLED", jvm.gc_logging_enabled.to_string()));
        if let Some(props) = jvm.java_system_properties() {
            vars.push(env("JAVA_SYSTEM_PROPERTIES", props));
        }

        vars.extend(
            shared_environment
                .vars
                .iter()
                .map(|(name, value)| env(name, value.clone())),
        );
        vars
    }
}

/// Generation annotations of a stored Secret, other annotations dropped
fn generation_annotations(annotations: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    annotations
        .iter()
        .filter(|(k, _)| {
            *k == ANNO_CLUSTER_CA_CERT_GENERATION || *k == ANNO_CLUSTER_CA_KEY_GENERATION
        })
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn resource_requirements(
    kind: ManagerKind,
    resources: &ResourceRequirements,
) -> Result<PodResourceRequirements> {
    let quantities = |map: &BTreeMap<String, String>| -> Result<Option<BTreeMap<String, Quantity>>> {
        if map.is_empty() {
            return Ok(None);
        }
        map.iter()
            .map(|(resource, value)| {
                if is_quantity(value) {
                    Ok((resource.clone(), Quantity(value.clone())))
                } else {
                    Err(EntityOperatorError::InvalidConfig(format!(
                        "{}: {resource} quantity '{value}' is malformed",
                        kind.as_str()
                    )))
                }
            })
            .collect::<Result<BTreeMap<_, _>>>()
            .map(Some)
    };

    Ok(PodResourceRequirements {
        requests: quantities(&resources.requests)?,
        limits: quantities(&resources.limits)?,
        ..Default::default()
    })
}

/// Kubernetes quantity: a decimal number with an optional binary/decimal suffix
fn is_quantity(value: &str) -> bool {
    const SUFFIXES: [&str; 14] = [
        "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "n", "u", "m", "k", "M", "G", "T", "P",
    ];
    let number = SUFFIXES
        .iter()
        .find_map(|s| value.strip_suffix(s))
        .or_else(|| value.strip_suffix('E'))
        .unwrap_or(value);
    !number.is_empty()
        && number.parse::<f64>().is_ok_and(|n| n >= 0.0)
        && number.chars().all(|c| c.is_ascii_digit() || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::LogLevel;

    fn model(watched: Option<&str>) -> ManagerModel {
        let spec = EntityManagerSpec {
            watched_namespace: watched.map(ToString::to_string),
            ..Default::default()
        };
        ManagerModel::from_crd(
            ManagerKind::Topic,
            "my-cluster",
            "streaming",
            None,
            &spec,
            "quay.io/streamhub/operator:test",
        )
        .unwrap()
    }

    #[test]
    fn test_watched_namespace_defaults_to_own() {
        assert_eq!(model(None).watched_namespace(), "streaming");
        assert_eq!(model(Some("")).watched_namespace(), "streaming");
        assert_eq!(model(Some("topics")).watched_namespace(), "topics");
        assert_eq!(model(Some("*")).watched_namespace(), "*");
    }

    #[test]
    fn test_role_binding_subject_is_own_service_account() {
        let binding = model(Some("topics")).generate_role_binding_for_role("topics");
        assert_eq!(binding.metadata.namespace.as_deref(), Some("topics"));
        assert_eq!(
            binding.metadata.name.as_deref(),
            Some("my-cluster-entity-topic-operator-role")
        );
        assert_eq!(binding.role_ref.kind, "Role");
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.name, "my-cluster-entity-operator");
        assert_eq!(subject.namespace.as_deref(), Some("streaming"));
    }

    #[test]
    fn test_cluster_role_binding() {
        let binding = model(Some("*")).generate_cluster_role_binding();
        assert!(binding.metadata.namespace.is_none());
        assert_eq!(binding.role_ref.kind, "ClusterRole");
        assert_eq!(binding.role_ref.name, ENTITY_OPERATOR_CLUSTER_ROLE);
    }

    #[test]
    fn test_malformed_quantity_is_invalid_config() {
        let spec = EntityManagerSpec {
            resources: Some(ResourceRequirements {
                requests: BTreeMap::from([("memory".to_string(), "lots".to_string())]),
                limits: BTreeMap::new(),
            }),
            ..Default::default()
        };
        let err = ManagerModel::from_crd(ManagerKind::User, "c", "ns", None, &spec, "img")
            .unwrap_err();
        assert!(matches!(err, EntityOperatorError::InvalidConfig(_)));
    }

    #[test]
    fn test_quantities() {
        assert!(is_quantity("512Mi"));
        assert!(is_quantity("500m"));
        assert!(is_quantity("1"));
        assert!(is_quantity("0.5"));
        assert!(is_quantity("1E"));
        assert!(!is_quantity("Mi"));
        assert!(!is_quantity("-1"));
        assert!(!is_quantity("1 Gi"));
    }

    #[test]
    fn test_inline_logging_rendered() {
        let spec = EntityManagerSpec {
            logging: Some(Logging::Inline {
                loggers: BTreeMap::from([("rootLogger.level".to_string(), LogLevel::Debug)]),
            }),
            ..Default::default()
        };
        let model =
            ManagerModel::from_crd(ManagerKind::User, "c", "ns", None, &spec, "img").unwrap();
        let doc = model.inline_logging().unwrap();
        assert!(doc.starts_with("name = UOConfig"));
        assert!(doc.contains("rootLogger.level = DEBUG"));
        assert!(model.external_logging().is_none());
    }

    #[test]
    fn test_container_env_carries_jvm_options() {
        let spec = EntityManagerSpec {
            jvm_options: Some(JvmOptions {
                xmx: Some("512m".to_string()),
                gc_logging_enabled: true,
                ..Default::default()
            }),
            ..Default::default()
        };
        let model =
            ManagerModel::from_crd(ManagerKind::Topic, "c", "ns", None, &spec, "img").unwrap();
        let container = model.generate_container(Some(ImagePullPolicy::Always), &SharedEnvironment::default());
        let env = container.env.unwrap();
        let value = |name: &str| {
            env.iter()
                .find(|e| e.name == name)
                .and_then(|e| e.value.clone())
        };
        assert_eq!(value("JAVA_OPTS").as_deref(), Some("-Xmx512m"));
        assert_eq!(value("GC_LOG_ENABLED").as_deref(), Some("true"));
        assert_eq!(value("STREAMHUB_WATCHED_NAMESPACE").as_deref(), Some("ns"));
        assert_eq!(container.image_pull_policy.as_deref(), Some("Always"));
    }

    #[test]
    fn test_secret_renewal_honours_maintenance_window() {
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ca1 = ClusterCa::self_signed("ca", now, Duration::days(730), 0, 0).unwrap();
        let ca2 = ClusterCa::self_signed("ca", now, Duration::days(730), 1, 0).unwrap();
        let model = model(None);

        let first = model.generate_secret(&ca1, None, false, now).unwrap();
        let annotations = first.metadata.annotations.clone().unwrap();
        assert_eq!(annotations.get(ANNO_CLUSTER_CA_CERT_GENERATION).map(String::as_str), Some("0"));

        let same = model.generate_secret(&ca1, Some(&first), true, now).unwrap();
        assert_eq!(same.data, first.data);

        let deferred = model.generate_secret(&ca2, Some(&first), false, now).unwrap();
        assert_eq!(deferred.data, first.data);
        assert_eq!(deferred.metadata.annotations, first.metadata.annotations);

        let renewed = model.generate_secret(&ca2, Some(&first), true, now).unwrap();
        assert_ne!(renewed.data, first.data);
        assert_eq!(
            renewed
                .metadata
                .annotations
                .unwrap()
                .get(ANNO_CLUSTER_CA_CERT_GENERATION)
                .map(String::as_str),
            Some("1")
        );
    }
}
