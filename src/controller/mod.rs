//! # Controller
//!
//! - `backoff`: Fibonacci backoff for failed reconciliations
//! - `maintenance`: maintenance time window evaluation
//! - `reconciler`: entity operator reconciliation

pub mod backoff;
pub mod maintenance;
pub mod reconciler;
