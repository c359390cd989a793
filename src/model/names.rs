//! Deterministic names of every resource managed for a cluster.
//!
//! All names derive from the cluster name (and, for cluster-scoped objects, the
//! cluster namespace). Deriving a name twice always yields the same string.

/// ServiceAccount, Role, NetworkPolicy and Deployment of the entity operator
pub fn entity_operator_name(cluster: &str) -> String {
    format!("{cluster}-entity-operator")
}

/// Topic operator component name (certificate CN, secret keys, container name)
pub fn topic_operator_name(cluster: &str) -> String {
    format!("{cluster}-entity-topic-operator")
}

/// User operator component name (certificate CN, secret keys, container name)
pub fn user_operator_name(cluster: &str) -> String {
    format!("{cluster}-entity-user-operator")
}

/// RoleBinding of the topic operator to the entity operator Role
pub fn topic_operator_role_binding_name(cluster: &str) -> String {
    format!("{cluster}-entity-topic-operator-role")
}

/// RoleBinding of the user operator to the entity operator Role
pub fn user_operator_role_binding_name(cluster: &str) -> String {
    format!("{cluster}-entity-user-operator-role")
}

/// ClusterRoleBinding of the topic operator when it watches every namespace
///
/// Cluster-scoped, so the namespace is part of the name to keep clusters with the
/// same name in different namespaces apart.
pub fn topic_operator_cluster_role_binding_name(namespace: &str, cluster: &str) -> String {
    format!("{namespace}-{cluster}-entity-topic-operator")
}

/// ClusterRoleBinding of the user operator when it watches every namespace
pub fn user_operator_cluster_role_binding_name(namespace: &str, cluster: &str) -> String {
    format!("{namespace}-{cluster}-entity-user-operator")
}

/// Logging ConfigMap of the topic operator
pub fn topic_operator_logging_config_map_name(cluster: &str) -> String {
    format!("{cluster}-entity-topic-operator-config")
}

/// Logging ConfigMap of the user operator
pub fn user_operator_logging_config_map_name(cluster: &str) -> String {
    format!("{cluster}-entity-user-operator-config")
}

/// Certificate Secret of the topic operator
pub fn topic_operator_secret_name(cluster: &str) -> String {
    format!("{cluster}-entity-topic-operator-certs")
}

/// Certificate Secret of the user operator
pub fn user_operator_secret_name(cluster: &str) -> String {
    format!("{cluster}-entity-user-operator-certs")
}

/// Shared certificate Secret used before the managers got their own
pub fn deprecated_entity_operator_secret_name(cluster: &str) -> String {
    format!("{cluster}-entity-operator-certs")
}

/// Secret holding the public cluster CA certificate(s)
pub fn cluster_ca_cert_secret_name(cluster: &str) -> String {
    format!("{cluster}-cluster-ca-cert")
}

/// Secret holding the cluster CA private key
pub fn cluster_ca_key_secret_name(cluster: &str) -> String {
    format!("{cluster}-cluster-ca")
}

/// Bootstrap address of the brokers the managers connect to
pub fn bootstrap_address(cluster: &str, namespace: &str) -> String {
    format!("{cluster}-kafka-bootstrap.{namespace}.svc:9091")
}
