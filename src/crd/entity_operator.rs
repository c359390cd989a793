//! # Entity Operator Configuration
//!
//! The entity operator is one Deployment running up to two managers: the topic
//! operator and the user operator. Each manager is configured independently.

use crate::crd::{JvmOptions, Logging};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity operator section of the cluster spec
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityOperatorSpec {
    /// Topic operator configuration. Absent disables the topic operator
    #[serde(default)]
    pub topic_operator: Option<EntityManagerSpec>,
    /// User operator configuration. Absent disables the user operator
    #[serde(default)]
    pub user_operator: Option<EntityManagerSpec>,
    /// Pod template customisation
    #[serde(default)]
    pub template: Option<EntityOperatorTemplate>,
}

/// Configuration of one manager (topic operator or user operator)
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityManagerSpec {
    /// Namespace the manager watches. Defaults to the cluster namespace.
    /// `*` watches every namespace.
    #[serde(default)]
    pub watched_namespace: Option<String>,
    /// Container image. Defaults to the controller-wide default image
    #[serde(default)]
    pub image: Option<String>,
    /// Periodic reconciliation interval of the manager (milliseconds)
    #[serde(default)]
    pub reconciliation_interval_ms: Option<u64>,
    /// CPU and memory requirements
    #[serde(default)]
    pub resources: Option<ResourceRequirements>,
    /// Logging configuration
    #[serde(default)]
    pub logging: Option<Logging>,
    /// JVM tuning
    #[serde(default)]
    pub jvm_options: Option<JvmOptions>,
}

/// Resource requests and limits as Kubernetes quantity strings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirements {
    #[serde(default)]
    pub requests: BTreeMap<String, String>,
    #[serde(default)]
    pub limits: BTreeMap<String, String>,
}

/// Pod template customisation of the entity operator Deployment
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EntityOperatorTemplate {
    #[serde(default)]
    pub pod_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub pod_annotations: BTreeMap<String, String>,
}
