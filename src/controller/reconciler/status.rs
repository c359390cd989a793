//! # Status Management
//!
//! Reports the entity operator outcome as the `EntityOperatorReady` condition of the
//! `StreamingCluster` status.

use crate::constants::FIELD_MANAGER;
use crate::controller::reconciler::types::Reconciler;
use crate::crd::{Condition, StreamingCluster, StreamingClusterStatus};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use kube::api::{Patch, PatchParams};
use kube::{Api, ResourceExt};
use tracing::debug;

pub const CONDITION_ENTITY_OPERATOR_READY: &str = "EntityOperatorReady";

/// Outcome of one entity operator reconciliation, as reported in the status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyCondition {
    pub ready: bool,
    pub reason: String,
    pub message: Option<String>,
}

impl ReadyCondition {
    pub fn ready() -> Self {
        Self {
            ready: true,
            reason: "Ready".to_string(),
            message: None,
        }
    }

    pub fn not_deployed() -> Self {
        Self {
            ready: false,
            reason: "NotDeployed".to_string(),
            message: Some("No topic or user operator is declared".to_string()),
        }
    }

    pub fn failed(reason: &str, message: String) -> Self {
        Self {
            ready: false,
            reason: reason.to_string(),
            message: Some(message),
        }
    }
}

/// The status to write, None when the stored status already says the same
///
/// The transition time is kept while the condition status does not flip.
pub fn desired_status(
    cluster: &StreamingCluster,
    condition: &ReadyCondition,
    now: DateTime<Utc>,
) -> Option<StreamingClusterStatus> {
    let existing = cluster.status.clone().unwrap_or_default();
    let status = if condition.ready { "True" } else { "False" };
    let current = existing
        .conditions
        .iter()
        .find(|c| c.r#type == CONDITION_ENTITY_OPERATOR_READY);

    if let Some(current) = current {
        if current.status == status
            && current.reason.as_deref() == Some(condition.reason.as_str())
            && current.message == condition.message
            && existing.observed_generation == cluster.metadata.generation
        {
            return None;
        }
    }

    let last_transition_time = match current {
        Some(c) if c.status == status => c.last_transition_time.clone(),
        _ => Some(now.to_rfc3339()),
    };
    let mut conditions: Vec<Condition> = existing
        .conditions
        .iter()
        .filter(|c| c.r#type != CONDITION_ENTITY_OPERATOR_READY)
        .cloned()
        .collect();
    conditions.push(Condition {
        r#type: CONDITION_ENTITY_OPERATOR_READY.to_string(),
        status: status.to_string(),
        last_transition_time,
        reason: Some(condition.reason.clone()),
        message: condition.message.clone(),
    });

    Some(StreamingClusterStatus {
        conditions,
        observed_generation: cluster.metadata.generation,
    })
}

/// Write the condition to the cluster status
/// Skips the write when nothing changed, so no watch event is triggered for nothing
pub async fn update_status(
    reconciler: &Reconciler,
    cluster: &StreamingCluster,
    condition: &ReadyCondition,
) -> Result<()> {
    let Some(status) = desired_status(cluster, condition, Utc::now()) else {
        debug!(
            "Skipping status update - {} unchanged for {}",
            CONDITION_ENTITY_OPERATOR_READY,
            cluster.name_any()
        );
        return Ok(());
    };

    let namespace = cluster.namespace().unwrap_or_default();
    let api: Api<StreamingCluster> = Api::namespaced(reconciler.client.clone(), &namespace);
    let patch = serde_json::json!({ "status": status });
    api.patch_status(
        &cluster.name_any(),
        &PatchParams::apply(FIELD_MANAGER),
        &Patch::Merge(patch),
    )
    .await
    .with_context(|| format!("Failed to update status of {namespace}/{}", cluster.name_any()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::StreamingClusterSpec;

    fn cluster(status: Option<StreamingClusterStatus>) -> StreamingCluster {
        let mut cluster = StreamingCluster::new(
            "my-cluster",
            StreamingClusterSpec {
                version: None,
                entity_operator: None,
                maintenance_time_windows: vec![],
            },
        );
        cluster.metadata.namespace = Some("streaming".to_string());
        cluster.metadata.generation = Some(4);
        cluster.status = status;
        cluster
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_first_status_sets_condition_and_generation() {
        let status = desired_status(&cluster(None), &ReadyCondition::ready(), now()).unwrap();
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(status.conditions.len(), 1);
        assert_eq!(status.conditions[0].status, "True");
        assert_eq!(status.conditions[0].reason.as_deref(), Some("Ready"));
    }

    #[test]
    fn test_unchanged_status_is_not_written() {
        let written = desired_status(&cluster(None), &ReadyCondition::ready(), now()).unwrap();
        let stored = cluster(Some(written));
        assert!(desired_status(&stored, &ReadyCondition::ready(), now()).is_none());
    }

    #[test]
    fn test_transition_time_kept_until_status_flips() {
        let written = desired_status(&cluster(None), &ReadyCondition::ready(), now()).unwrap();
        let stored = cluster(Some(written));
        let later = now() + chrono::Duration::hours(1);

        let failed = ReadyCondition::failed("Timeout", "readiness timed out".to_string());
        let flipped = desired_status(&stored, &failed, later).unwrap();
        assert_eq!(
            flipped.conditions[0].last_transition_time,
            Some(later.to_rfc3339())
        );

        let stored = cluster(Some(flipped));
        let other = ReadyCondition::failed("ReconciliationFailed", "rejected".to_string());
        let same_status = desired_status(&stored, &other, later + chrono::Duration::hours(1)).unwrap();
        assert_eq!(
            same_status.conditions[0].last_transition_time,
            Some(later.to_rfc3339())
        );
    }

    #[test]
    fn test_other_conditions_are_kept() {
        let stored = cluster(Some(StreamingClusterStatus {
            conditions: vec![Condition {
                r#type: "Ready".to_string(),
                status: "True".to_string(),
                last_transition_time: None,
                reason: None,
                message: None,
            }],
            observed_generation: Some(3),
        }));
        let status = desired_status(&stored, &ReadyCondition::not_deployed(), now()).unwrap();
        assert_eq!(status.conditions.len(), 2);
        assert_eq!(status.conditions[0].r#type, "Ready");
    }
}
