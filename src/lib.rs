//! Entity Operator Controller Library
//!
//! Reconciles the entity operator (topic and user managers) of a streaming cluster.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod model;
pub mod observability;
pub mod runtime;
pub mod server;
