//! # Entity Operator Controller
//!
//! Kubernetes controller that deploys and maintains the entity operator of
//! `StreamingCluster` resources: the topic and user managers, their RBAC, logging
//! configuration, client certificates and the Deployment running them.

use anyhow::Result;
use entity_operator_controller::runtime::initialization::initialize;
use entity_operator_controller::runtime::watch_loop::run_watch_loop;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;
    run_watch_loop(init.reconciler, init.server_state).await
}
