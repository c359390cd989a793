//! # Runtime
//!
//! - `initialization`: process setup (tracing, metrics, server, client)
//! - `error_policy`: requeue decisions for failed reconciliations
//! - `watch_loop`: the kube-runtime controller over `StreamingCluster`

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
