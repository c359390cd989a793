//! # Reconciler
//!
//! Reconciles the entity operator of `StreamingCluster` resources.
//!
//! - `cluster`: controller entry point, cluster CA loading and status reporting
//! - `entity_operator`: the ordered reconciliation steps
//! - `operators`: per-kind resource operator traits, `kube_operators` implements them
//! - `certificates`: certificate change detection
//! - `rollout`: restart decision and readiness wait
//! - `scope`: watched namespace classification
//! - `status`: status condition updates
//! - `types`: shared types

pub mod certificates;
pub mod cluster;
pub mod entity_operator;
pub mod kube_operators;
pub mod operators;
pub mod rollout;
pub mod scope;
pub mod status;
pub mod types;

pub use cluster::reconcile;
pub use entity_operator::{EntityOperatorReconciler, PipelineState};
pub use operators::{
    ClusterResourceOperator, DeploymentOperator, ReconcileResult, ResourceOperator,
    ResourceOperatorSupplier,
};
pub use scope::NamespaceScope;
pub use types::{
    BackoffState, Clock, FixedClock, Reconciler, ReconcilerError, Reconciliation, SystemClock,
};
