//! # Desired State Model
//!
//! Pure derivation of the entity operator resource set from a `StreamingCluster`.
//!
//! Nothing in here performs I/O. Given the same cluster, version lookup and
//! environment the model always generates structurally identical objects, which is
//! what makes a second reconciliation with no external change a no-op.
//!
//! ## Module Structure
//!
//! - `names.rs` - Deterministic resource names
//! - `entity_operator.rs` - The composite model (ServiceAccount, Role, NetworkPolicy, Deployment)
//! - `manager.rs` - Per-manager resources (bindings, logging ConfigMap, certificate Secret)
//! - `logging.rs` - log4j2 rendering of inline logging
//! - `ca.rs` - Cluster CA snapshot and leaf certificate issuing

mod ca;
mod entity_operator;
mod logging;
mod manager;
pub mod names;

pub use ca::{
    certificate_expires_within, prune_expired_ca_certs, ClusterCa, IssuedCertificate, CA_CERT_KEY,
    CA_KEY_KEY,
};
pub use entity_operator::EntityOperator;
pub use logging::render_log4j2;
pub use manager::{ManagerKind, ManagerModel};

use crate::constants::{LABEL_CLUSTER, LABEL_KIND, LABEL_NAME, MANAGED_BY};
use crate::crd::StreamingCluster;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::Resource;
use std::collections::BTreeMap;

/// Image pull policy of the manager containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePullPolicy {
    Always,
    IfNotPresent,
    Never,
}

impl ImagePullPolicy {
    /// Parse a pull policy, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "always" => Some(Self::Always),
            "ifnotpresent" => Some(Self::IfNotPresent),
            "never" => Some(Self::Never),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "Always",
            Self::IfNotPresent => "IfNotPresent",
            Self::Never => "Never",
        }
    }
}

/// Features of the Kubernetes platform the controller runs on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformFeatures {
    /// OpenShift assigns pod security contexts itself
    pub is_openshift: bool,
}

/// Default images of the managers when the cluster spec does not set one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionLookup {
    pub topic_operator_image: String,
    pub user_operator_image: String,
}

/// Environment variables injected into every manager container
///
/// Proxy settings of the controller process are passed through so the managers
/// reach the brokers the same way the controller does.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SharedEnvironment {
    pub vars: BTreeMap<String, String>,
}

impl SharedEnvironment {
    const PASSED_THROUGH: [&'static str; 3] = ["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"];

    /// Collect the passed-through variables from the controller process
    pub fn from_process_env() -> Self {
        let vars = Self::PASSED_THROUGH
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|v| (key.to_string(), v)))
            .collect();
        Self { vars }
    }
}

/// Labels shared by every resource managed for a cluster
pub(crate) fn cluster_labels(cluster: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_CLUSTER.to_string(), cluster.to_string()),
        (LABEL_NAME.to_string(), component.to_string()),
        (LABEL_KIND.to_string(), StreamingCluster::kind(&()).to_string()),
        (
            "app.kubernetes.io/managed-by".to_string(),
            MANAGED_BY.to_string(),
        ),
        (
            "app.kubernetes.io/part-of".to_string(),
            format!("streamhub-{cluster}"),
        ),
    ])
}

/// Owner reference pointing at the `StreamingCluster`
///
/// Only attached to objects in the cluster namespace. Owner references cannot cross
/// namespaces and cluster-scoped objects cannot be owned by namespaced ones.
pub(crate) fn owner_reference(cluster: &StreamingCluster) -> Option<OwnerReference> {
    cluster.controller_owner_ref(&())
}
