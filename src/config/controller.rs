//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::model::{ImagePullPolicy, PlatformFeatures, VersionLookup};
use k8s_openapi::api::core::v1::LocalObjectReference;
use std::time::Duration;

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Budget for rolling restarts and the readiness wait (milliseconds)
    pub operation_timeout_ms: u64,
    /// Poll interval of the deployment readiness wait (milliseconds)
    pub readiness_poll_interval_ms: u64,
    /// Generate NetworkPolicies for the entity operator
    /// When false the NetworkPolicy step is skipped entirely (nothing is created or deleted)
    pub network_policy_generation: bool,
    /// Running on OpenShift (security contexts are left to the platform)
    pub is_openshift: bool,
    /// Image pull policy applied to the operator containers (None = cluster default)
    pub image_pull_policy: Option<ImagePullPolicy>,
    /// Image pull secrets added to the entity operator pods
    pub image_pull_secrets: Vec<String>,
    /// Topic operator image used when the cluster spec does not set one
    pub default_topic_operator_image: String,
    /// User operator image used when the cluster spec does not set one
    pub default_user_operator_image: String,
    /// Namespace to watch for `StreamingCluster` resources (None = all namespaces)
    pub watch_namespace: Option<String>,
    /// HTTP port for metrics and probes
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
    /// Maximum concurrent reconciliations
    pub max_concurrent_reconciliations: u16,
    /// Requeue interval after a successful reconciliation (seconds)
    pub success_requeue_secs: u64,
    /// Requeue interval after a timeout failure (seconds)
    pub timeout_requeue_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            operation_timeout_ms: DEFAULT_OPERATION_TIMEOUT_MS,
            readiness_poll_interval_ms: DEFAULT_READINESS_POLL_INTERVAL_MS,
            network_policy_generation: true,
            is_openshift: false,
            image_pull_policy: None,
            image_pull_secrets: Vec::new(),
            default_topic_operator_image: DEFAULT_TOPIC_OPERATOR_IMAGE.to_string(),
            default_user_operator_image: DEFAULT_USER_OPERATOR_IMAGE.to_string(),
            watch_namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
            max_concurrent_reconciliations: 10,
            success_requeue_secs: DEFAULT_SUCCESS_REQUEUE_SECS,
            timeout_requeue_secs: DEFAULT_TIMEOUT_REQUEUE_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            operation_timeout_ms: env_var_or_default(
                "OPERATION_TIMEOUT_MS",
                DEFAULT_OPERATION_TIMEOUT_MS,
            ),
            readiness_poll_interval_ms: env_var_or_default(
                "READINESS_POLL_INTERVAL_MS",
                DEFAULT_READINESS_POLL_INTERVAL_MS,
            ),
            network_policy_generation: env_var_or_default_bool("NETWORK_POLICY_GENERATION", true),
            is_openshift: env_var_or_default_bool("PLATFORM_OPENSHIFT", false),
            image_pull_policy: std::env::var("IMAGE_PULL_POLICY")
                .ok()
                .and_then(|v| ImagePullPolicy::parse(&v)),
            image_pull_secrets: parse_list(&env_var_or_default_str("IMAGE_PULL_SECRETS", "")),
            default_topic_operator_image: env_var_or_default_str(
                "DEFAULT_TOPIC_OPERATOR_IMAGE",
                DEFAULT_TOPIC_OPERATOR_IMAGE,
            ),
            default_user_operator_image: env_var_or_default_str(
                "DEFAULT_USER_OPERATOR_IMAGE",
                DEFAULT_USER_OPERATOR_IMAGE,
            ),
            watch_namespace: std::env::var("WATCH_NAMESPACE")
                .ok()
                .filter(|ns| !ns.trim().is_empty() && ns.trim() != ALL_NAMESPACES),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "INFO"),
            log_format: env_var_or_default_str("LOG_FORMAT", "json"),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                10,
            ),
            success_requeue_secs: env_var_or_default(
                "SUCCESS_REQUEUE_SECS",
                DEFAULT_SUCCESS_REQUEUE_SECS,
            ),
            timeout_requeue_secs: env_var_or_default(
                "TIMEOUT_REQUEUE_SECS",
                DEFAULT_TIMEOUT_REQUEUE_SECS,
            ),
        }
    }

    /// Get the operation timeout duration
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Get the readiness poll interval duration
    pub fn readiness_poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_poll_interval_ms)
    }

    /// Get the success requeue duration
    pub fn success_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.success_requeue_secs)
    }

    /// Get the timeout requeue duration
    pub fn timeout_requeue_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_requeue_secs)
    }

    /// Platform features derived from the configuration
    pub fn platform_features(&self) -> PlatformFeatures {
        PlatformFeatures {
            is_openshift: self.is_openshift,
        }
    }

    /// Default images keyed by manager
    pub fn version_lookup(&self) -> VersionLookup {
        VersionLookup {
            topic_operator_image: self.default_topic_operator_image.clone(),
            user_operator_image: self.default_user_operator_image.clone(),
        }
    }

    /// Image pull secrets as pod spec references
    pub fn image_pull_secret_refs(&self) -> Vec<LocalObjectReference> {
        self.image_pull_secrets
            .iter()
            .map(|name| LocalObjectReference { name: name.clone() })
            .collect()
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| parse_bool(&v))
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_bool(value: &str) -> bool {
    let v_lower = value.to_lowercase();
    v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
}

/// Split a comma separated list, dropping empty entries
fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}
