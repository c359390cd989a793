//! # Namespace Scope
//!
//! Classifies the namespace a manager watches against the cluster namespace. The
//! scope decides which RBAC objects grant the manager access:
//!
//! - `Same`: the Role and RoleBinding in the cluster namespace
//! - `Other`: the same pair in the cluster namespace (for the CA Secrets) plus a Role
//!   and RoleBinding replicated into the watched namespace
//! - `All`: a ClusterRoleBinding, as no namespaced binding can cover every namespace

use crate::constants::ALL_NAMESPACES;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    Same,
    Other(String),
    All,
}

impl NamespaceScope {
    pub fn resolve(own_namespace: &str, watched_namespace: &str) -> Self {
        if watched_namespace == own_namespace {
            Self::Same
        } else if watched_namespace == ALL_NAMESPACES {
            Self::All
        } else {
            Self::Other(watched_namespace.to_string())
        }
    }

    /// The foreign namespace, if the manager watches one
    pub fn foreign_namespace(&self) -> Option<&str> {
        match self {
            Self::Other(namespace) => Some(namespace),
            Self::Same | Self::All => None,
        }
    }
}
