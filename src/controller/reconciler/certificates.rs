//! # Certificate Change Detection
//!
//! A patched certificate Secret does not always mean new certificates: labels,
//! annotations or owner references may be all that changed. Pods only need a restart
//! when the certificate material they mount differs.

use crate::controller::reconciler::operators::ReconcileResult;
use k8s_openapi::api::core::v1::Secret;

/// Whether reconciling a certificate Secret changed its certificate material
///
/// `stored` is the Secret fetched before reconciling. Only a `Patched` outcome can
/// carry a change; created, deleted and unchanged Secrets never count.
pub fn certificates_changed(stored: Option<&Secret>, result: &ReconcileResult<Secret>) -> bool {
    match result {
        ReconcileResult::Patched { previous, current } => {
            do_existing_certificates_differ(stored.unwrap_or(previous), current)
        }
        ReconcileResult::Created(_) | ReconcileResult::Deleted | ReconcileResult::Noop(_) => false,
    }
}

/// Compare the certificate-bearing `data` of two Secrets byte for byte
///
/// Metadata is ignored. A Secret without data differs from one with data.
pub fn do_existing_certificates_differ(previous: &Secret, current: &Secret) -> bool {
    match (&previous.data, &current.data) {
        (None, None) => false,
        (Some(previous), Some(current)) => previous != current,
        _ => true,
    }
}
