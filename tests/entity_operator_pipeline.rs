//! # Entity Operator Pipeline Tests
//!
//! Drives the full reconciliation against in-memory operators: step order, the
//! disabled model, idempotence, external logging and failure reporting.

mod common;

use common::{cluster, cluster_ca, manager, now, FakeCluster, CLUSTER, NAMESPACE};
use entity_operator_controller::config::ControllerConfig;
use entity_operator_controller::crd::{ConfigMapKeyRef, ExternalLoggingSource, Logging};
use entity_operator_controller::error::EntityOperatorError;
use entity_operator_controller::model::{names, ManagerKind};
use k8s_openapi::api::core::v1::ConfigMap;
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;

#[tokio::test]
async fn test_steps_run_in_order() {
    let fake = FakeCluster::new();
    let cluster = cluster(Some(manager(None)), Some(manager(None)), vec![]);

    fake.reconcile(&cluster, Some(cluster_ca(0)), &ControllerConfig::default(), now())
        .await
        .unwrap();

    assert_eq!(
        fake.kinds(),
        vec![
            "ServiceAccount",
            "Role",
            "NetworkPolicy",
            "RoleBinding",
            "RoleBinding",
            "ConfigMap",
            "ConfigMap",
            "Secret",
            "Secret",
            "Secret",
            "Deployment",
        ]
    );
    let calls = fake.calls();
    assert!(calls[7].is(
        "Secret",
        NAMESPACE,
        &names::deprecated_entity_operator_secret_name(CLUSTER)
    ));
    assert!(!calls[7].desired);
    assert!(calls[8].is("Secret", NAMESPACE, &ManagerKind::Topic.secret_name(CLUSTER)));
    assert!(calls[9].is("Secret", NAMESPACE, &ManagerKind::User.secret_name(CLUSTER)));
    assert!(calls
        .iter()
        .filter(|c| c.kind != "Secret" || c.desired)
        .all(|c| c.outcome == "created"));
}

#[tokio::test]
async fn test_disabled_model_removes_everything() {
    let fake = FakeCluster::new();
    let enabled = cluster(Some(manager(Some("*"))), Some(manager(None)), vec![]);
    fake.reconcile(&enabled, Some(cluster_ca(0)), &ControllerConfig::default(), now())
        .await
        .unwrap();
    fake.clear_calls();

    let disabled = cluster(None, None, vec![]);
    fake.reconcile(&disabled, None, &ControllerConfig::default(), now())
        .await
        .unwrap();

    let calls = fake.calls();
    assert!(calls.iter().all(|c| !c.desired));
    // Both RoleBindings and ClusterRoleBindings of each manager are removed
    assert_eq!(calls.len(), 13);
    assert_eq!(
        fake.calls_to(
            "ClusterRoleBinding",
            "",
            &ManagerKind::Topic.cluster_role_binding_name(NAMESPACE, CLUSTER)
        )[0]
            .outcome,
        "deleted"
    );
    assert_eq!(fake.service_accounts.len(), 0);
    assert_eq!(fake.cluster_role_bindings.len(), 0);
    assert_eq!(fake.secrets.len(), 0);
    assert_eq!(fake.deployments.store.len(), 0);
    assert_eq!(fake.restarts(), 0);
}

#[tokio::test]
async fn test_disabled_model_with_nothing_present_succeeds() {
    let fake = FakeCluster::new();
    fake.reconcile(&cluster(None, None, vec![]), None, &ControllerConfig::default(), now())
        .await
        .unwrap();

    let calls = fake.calls();
    assert!(calls.iter().all(|c| !c.desired && c.outcome == "noop"));
    assert!(!calls.iter().any(|c| c.kind == "Role" && c.namespace != NAMESPACE));
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let fake = FakeCluster::new();
    let cluster = cluster(Some(manager(Some("topics"))), Some(manager(Some("*"))), vec![]);
    let ca = cluster_ca(0);
    let config = ControllerConfig::default();

    fake.reconcile(&cluster, Some(ca.clone()), &config, now())
        .await
        .unwrap();
    fake.clear_calls();
    fake.reconcile(&cluster, Some(ca), &config, now())
        .await
        .unwrap();

    let calls = fake.calls();
    assert!(!calls.is_empty());
    assert!(calls.iter().all(|c| c.outcome == "noop"), "{calls:?}");
    assert_eq!(fake.restarts(), 0);
}

#[tokio::test]
async fn test_network_policy_generation_disabled() {
    let fake = FakeCluster::new();
    let config = ControllerConfig {
        network_policy_generation: false,
        ..Default::default()
    };

    fake.reconcile(&cluster(Some(manager(None)), None, vec![]), Some(cluster_ca(0)), &config, now())
        .await
        .unwrap();
    assert!(!fake.kinds().contains(&"NetworkPolicy"));

    fake.reconcile(&cluster(None, None, vec![]), None, &config, now())
        .await
        .unwrap();
    assert!(!fake.kinds().contains(&"NetworkPolicy"));
}

#[tokio::test]
async fn test_readiness_timeout_fails_reconciliation() {
    let fake = FakeCluster::new();
    fake.deployments
        .readiness_times_out
        .store(true, Ordering::SeqCst);

    let err = fake
        .reconcile(
            &cluster(Some(manager(None)), None, vec![]),
            Some(cluster_ca(0)),
            &ControllerConfig::default(),
            now(),
        )
        .await
        .unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn test_disabled_model_skips_readiness() {
    let fake = FakeCluster::new();
    fake.deployments
        .readiness_times_out
        .store(true, Ordering::SeqCst);

    fake.reconcile(&cluster(None, None, vec![]), None, &ControllerConfig::default(), now())
        .await
        .unwrap();
}

fn external_logging_manager() -> entity_operator_controller::crd::EntityManagerSpec {
    let mut spec = manager(None);
    spec.logging = Some(Logging::External {
        value_from: ExternalLoggingSource {
            config_map_key_ref: ConfigMapKeyRef {
                name: "custom-logging".to_string(),
                key: "log4j2.properties".to_string(),
            },
        },
    });
    spec
}

#[tokio::test]
async fn test_external_logging_is_copied() {
    let fake = FakeCluster::new();
    fake.config_maps.insert(
        NAMESPACE,
        "custom-logging",
        ConfigMap {
            data: Some(BTreeMap::from([(
                "log4j2.properties".to_string(),
                "rootLogger.level = DEBUG".to_string(),
            )])),
            ..Default::default()
        },
    );

    fake.reconcile(
        &cluster(Some(external_logging_manager()), None, vec![]),
        Some(cluster_ca(0)),
        &ControllerConfig::default(),
        now(),
    )
    .await
    .unwrap();

    let logging = fake
        .config_maps
        .stored(NAMESPACE, &ManagerKind::Topic.logging_config_map_name(CLUSTER))
        .unwrap();
    assert_eq!(
        logging.data.unwrap()["log4j2.properties"],
        "rootLogger.level = DEBUG"
    );
}

#[tokio::test]
async fn test_missing_external_logging_is_invalid_config() {
    let fake = FakeCluster::new();

    let err = fake
        .reconcile(
            &cluster(Some(external_logging_manager()), None, vec![]),
            Some(cluster_ca(0)),
            &ControllerConfig::default(),
            now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EntityOperatorError::InvalidConfig(_)));
    // Steps before the failure stay applied, later ones never ran
    assert!(fake.kinds().contains(&"RoleBinding"));
    assert!(!fake.kinds().contains(&"Deployment"));
}

#[tokio::test]
async fn test_missing_cluster_ca_fails_certificate_step() {
    let fake = FakeCluster::new();

    let err = fake
        .reconcile(
            &cluster(Some(manager(None)), None, vec![]),
            None,
            &ControllerConfig::default(),
            now(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EntityOperatorError::Certificate(_)));
    assert_eq!(fake.service_accounts.len(), 1);
    assert_eq!(fake.deployments.store.len(), 0);
}

fn assert_stopped_before_config_maps(fake: &FakeCluster) {
    let kinds = fake.kinds();
    for later in ["ConfigMap", "Secret", "Deployment"] {
        assert!(!kinds.contains(&later), "{later} reconciled after a rejection: {kinds:?}");
    }
    assert_eq!(fake.restarts(), 0);
}

#[tokio::test]
async fn test_rejected_foreign_binding_fails_the_pipeline() {
    let fake = FakeCluster::new();
    fake.role_bindings.reject_namespace("topics");
    let cluster = cluster(Some(manager(Some("topics"))), Some(manager(None)), vec![]);

    let err = fake
        .reconcile(&cluster, Some(cluster_ca(0)), &ControllerConfig::default(), now())
        .await
        .unwrap_err();

    match &err {
        EntityOperatorError::ApplyRejected {
            kind,
            namespace,
            name,
            ..
        } => {
            assert_eq!(kind, "RoleBinding");
            assert_eq!(namespace, "topics");
            assert_eq!(name, &ManagerKind::Topic.role_binding_name(CLUSTER));
        }
        other => panic!("expected ApplyRejected, got {other:?}"),
    }
    assert!(!err.is_timeout());
    assert_eq!(err.class(), "rejected");

    // The user manager bindings come after the failed topic step
    let user_binding = ManagerKind::User.role_binding_name(CLUSTER);
    assert!(fake.calls_to("RoleBinding", NAMESPACE, &user_binding).is_empty());
    assert_stopped_before_config_maps(&fake);
}

#[tokio::test]
async fn test_rejected_cluster_role_binding_fails_the_pipeline() {
    let fake = FakeCluster::new();
    fake.cluster_role_bindings.reject_namespace("");
    let cluster = cluster(Some(manager(Some("*"))), None, vec![]);

    let err = fake
        .reconcile(&cluster, Some(cluster_ca(0)), &ControllerConfig::default(), now())
        .await
        .unwrap_err();

    assert!(
        matches!(&err, EntityOperatorError::ApplyRejected { kind, .. } if kind == "ClusterRoleBinding"),
        "unexpected error: {err:?}"
    );
    let rejected: Vec<_> = fake
        .calls()
        .into_iter()
        .filter(|c| c.outcome == "Rejected")
        .collect();
    assert_eq!(rejected.len(), 1);
    assert_stopped_before_config_maps(&fake);
}
