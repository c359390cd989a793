//! # Types
//!
//! Core types for the reconciler.

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::operators::ResourceOperatorSupplier;
use crate::error::EntityOperatorError;
use crate::model::SharedEnvironment;
use chrono::{DateTime, Utc};
use kube::Client;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    EntityOperator(#[from] EntityOperatorError),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Timeouts are requeued sooner than other failures
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::EntityOperator(e) if e.is_timeout())
    }

    /// Short label used for the error class metric
    #[must_use]
    pub fn class(&self) -> &'static str {
        match self {
            Self::EntityOperator(e) => e.class(),
            Self::ReconciliationFailed(_) => "failed",
        }
    }
}

static RECONCILIATION_IDS: AtomicU64 = AtomicU64::new(1);

/// Identity of one reconciliation of a cluster
///
/// Every resource name and namespace derives from it. Its `Display` form prefixes
/// the log lines of the reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    id: u64,
    trigger: String,
    kind: String,
    namespace: String,
    name: String,
}

impl Reconciliation {
    pub fn new(trigger: &str, kind: &str, namespace: &str, name: &str) -> Self {
        Self {
            id: RECONCILIATION_IDS.fetch_add(1, Ordering::Relaxed),
            trigger: trigger.to_string(),
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Display for Reconciliation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Reconciliation #{}({}) {}({}/{})",
            self.id, self.trigger, self.kind, self.namespace, self.name
        )
    }
}

/// Source of the current instant
///
/// Certificate expiry and maintenance windows are evaluated against it.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Backoff state for a specific resource
/// Tracks error count and backoff calculator for progressive retries
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self {
            backoff: FibonacciBackoff::new(1, 10), // 1 minute min, 10 minutes max
            error_count: 0,
        }
    }
}

impl BackoffState {
    pub fn increment_error(&mut self) {
        self.error_count += 1;
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.backoff.reset();
    }
}

/// Shared context of the controller
#[derive(Clone)]
pub struct Reconciler {
    pub client: Client,
    pub config: Arc<ControllerConfig>,
    pub operators: ResourceOperatorSupplier,
    pub shared_environment: SharedEnvironment,
    // Backoff state per resource (identified by namespace/name)
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(client: Client, config: ControllerConfig) -> Self {
        Self {
            operators: ResourceOperatorSupplier::kube(client.clone()),
            client,
            config: Arc::new(config),
            shared_environment: SharedEnvironment::from_process_env(),
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Forget the backoff of a resource after a successful reconciliation or deletion
    pub fn forget_backoff(&self, resource_key: &str) {
        forget_backoff_state(&self.backoff_states, resource_key);
    }
}

/// Drop the backoff entry of `resource_key` so the map only holds failing resources
pub(crate) fn forget_backoff_state(
    states: &Mutex<HashMap<String, BackoffState>>,
    resource_key: &str,
) {
    if let Ok(mut states) = states.lock() {
        states.remove(resource_key);
    }
}
