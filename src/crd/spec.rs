//! # StreamingCluster Specification
//!
//! Main CRD specification. Only the parts relevant to the entity operator are modelled:
//! the optional `entityOperator` section and the maintenance time windows.

use crate::crd::{EntityOperatorSpec, StreamingClusterStatus};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// StreamingCluster Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: streamhub.io/v1beta1
/// kind: StreamingCluster
/// metadata:
///   name: my-cluster
///   namespace: streaming
/// spec:
///   maintenanceTimeWindows:
///     - "* * 0-1 ? * SUN,MON"
///   entityOperator:
///     topicOperator:
///       watchedNamespace: topics
///     userOperator: {}
/// ```
#[derive(CustomResource, Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "StreamingCluster",
    group = "streamhub.io",
    version = "v1beta1",
    namespaced,
    shortname = "sc",
    status = "StreamingClusterStatus",
    printcolumn = r#"{"name":"EntityOperatorReady", "type":"string", "jsonPath":".status.conditions[?(@.type==\"EntityOperatorReady\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct StreamingClusterSpec {
    /// Broker version, informational for the entity operator
    #[serde(default)]
    pub version: Option<String>,
    /// Entity operator (topic and user managers)
    /// When absent, every entity operator resource is removed
    #[serde(default)]
    pub entity_operator: Option<EntityOperatorSpec>,
    /// Cron expressions (UTC) during which certificate renewal may disrupt clients
    /// An empty list means renewal may happen at any time
    #[serde(default)]
    pub maintenance_time_windows: Vec<String>,
}
