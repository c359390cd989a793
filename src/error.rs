//! # Errors
//!
//! Failure taxonomy of the entity operator reconciliation.
//!
//! - `ApplyRejected` - the Kubernetes API refused a get/create/patch/delete
//! - `Timeout` - a rolling restart or readiness wait exceeded its budget
//! - `InvalidConfig` - the desired state could not be derived from the cluster spec
//! - `Certificate` - issuing or parsing certificate material failed
//!
//! A missing object on fetch is not an error: operators return `Ok(None)`.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityOperatorError {
    #[error("{kind} {namespace}/{name} was rejected by the API server: {source}")]
    ApplyRejected {
        kind: String,
        namespace: String,
        name: String,
        #[source]
        source: kube::Error,
    },

    #[error("{operation} of {namespace}/{name} did not complete within {timeout:?}")]
    Timeout {
        operation: &'static str,
        namespace: String,
        name: String,
        timeout: Duration,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Certificate error: {0}")]
    Certificate(String),
}

/// Result type for entity operator reconciliation
pub type Result<T> = std::result::Result<T, EntityOperatorError>;

impl EntityOperatorError {
    /// Build an `ApplyRejected` error for a kube call against `kind` `namespace/name`
    pub fn rejected(
        kind: impl Into<String>,
        namespace: &str,
        name: &str,
        source: kube::Error,
    ) -> Self {
        Self::ApplyRejected {
            kind: kind.into(),
            namespace: namespace.to_string(),
            name: name.to_string(),
            source,
        }
    }

    /// Whether this failure is a timeout (restart or readiness budget exceeded)
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Short label used for the error class metric
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::ApplyRejected { .. } => "rejected",
            Self::Timeout { .. } => "timeout",
            Self::InvalidConfig(_) => "invalid-config",
            Self::Certificate(_) => "certificate",
        }
    }
}
