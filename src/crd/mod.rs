//! # Custom Resource Definitions
//!
//! CRD types for the entity operator controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - `StreamingCluster` custom resource
//! - `entity_operator.rs` - Entity operator and per-manager configuration
//! - `logging.rs` - Inline and external logging configuration
//! - `jvm.rs` - JVM options of the manager containers
//! - `status.rs` - Status types for tracking reconciliation state

mod entity_operator;
mod jvm;
mod logging;
mod spec;
mod status;

pub use entity_operator::{
    EntityManagerSpec, EntityOperatorSpec, EntityOperatorTemplate, ResourceRequirements,
};
pub use jvm::{JvmOptions, SystemProperty};
pub use logging::{ConfigMapKeyRef, ExternalLoggingSource, LogLevel, Logging};
pub use spec::{StreamingCluster, StreamingClusterSpec};
pub use status::{Condition, StreamingClusterStatus};
