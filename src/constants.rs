//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the `StreamingCluster` custom resource and prefix of every
/// annotation/label the controller writes
pub const API_GROUP: &str = "streamhub.io";

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "entity-operator-controller";

/// Wildcard value of a watched namespace meaning "every namespace"
pub const ALL_NAMESPACES: &str = "*";

/// Pod template / secret annotation carrying the cluster CA certificate generation
pub const ANNO_CLUSTER_CA_CERT_GENERATION: &str = "streamhub.io/cluster-ca-cert-generation";

/// Pod template / secret annotation carrying the cluster CA key generation
pub const ANNO_CLUSTER_CA_KEY_GENERATION: &str = "streamhub.io/cluster-ca-key-generation";

/// Pod template annotation bumped to force a rollout of a deployment
pub const ANNO_RESTARTED_AT: &str = "kubectl.kubernetes.io/restartedAt";

/// Label selecting every resource belonging to one streaming cluster
pub const LABEL_CLUSTER: &str = "streamhub.io/cluster";

/// Label naming the component a resource belongs to
pub const LABEL_NAME: &str = "streamhub.io/name";

/// Label naming the kind of the owning custom resource
pub const LABEL_KIND: &str = "streamhub.io/kind";

/// Standard managed-by label value
pub const MANAGED_BY: &str = "entity-operator-controller";

/// Cluster-scoped role granted when a manager watches all namespaces
pub const ENTITY_OPERATOR_CLUSTER_ROLE: &str = "streamhub-entity-operator";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default operation timeout for rolling restarts and readiness (milliseconds)
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 300_000;

/// Default poll interval of the deployment readiness wait (milliseconds)
pub const DEFAULT_READINESS_POLL_INTERVAL_MS: u64 = 1_000;

/// Default requeue interval after a successful reconciliation (seconds)
pub const DEFAULT_SUCCESS_REQUEUE_SECS: u64 = 120;

/// Default requeue interval after a timeout (seconds)
/// Timeouts usually resolve on their own, so they are retried sooner than rejections
pub const DEFAULT_TIMEOUT_REQUEUE_SECS: u64 = 15;

/// Default topic operator image
pub const DEFAULT_TOPIC_OPERATOR_IMAGE: &str = "quay.io/streamhub/operator:0.45.0";

/// Default user operator image
pub const DEFAULT_USER_OPERATOR_IMAGE: &str = "quay.io/streamhub/operator:0.45.0";

/// Validity of issued topic/user operator certificates (days)
pub const CERT_VALIDITY_DAYS: i64 = 365;

/// Certificates expiring within this many days are renewed (inside a maintenance window)
pub const CERT_RENEWAL_DAYS: i64 = 30;

/// Port of the topic operator health endpoint
pub const TOPIC_OPERATOR_HEALTH_PORT: i32 = 8080;

/// Port of the user operator health endpoint
pub const USER_OPERATOR_HEALTH_PORT: i32 = 8081;
