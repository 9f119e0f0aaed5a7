//! Single-manifest apply
//!
//! One idempotent server-side apply per call, classified into an outcome.
//! Conflicts and semantic rejections are outcomes, not errors: each
//! manifest in a batch is applied independently and a failing one never
//! blocks the rest. Transport failures outside that classification
//! propagate as errors for the driver to record.

use tracing::{debug, warn};

use crate::client::{ApplyParams, ClusterApi};
use crate::manifest::{ResourceManifest, ResourceRef};
use crate::resolver;
use crate::Result;

/// Result category of applying one manifest
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
pub enum ApplyStatus {
    /// The write was accepted and persisted
    Applied,
    /// Field-ownership conflict; another writer owns conflicting fields and
    /// force was not set
    Conflict,
    /// Server-side semantic rejection (invalid field, missing dependency)
    Rejected,
    /// Dry-run validation passed; nothing persisted
    ValidatedOnly,
}

impl std::fmt::Display for ApplyStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Applied => write!(f, "Applied"),
            Self::Conflict => write!(f, "Conflict"),
            Self::Rejected => write!(f, "Rejected"),
            Self::ValidatedOnly => write!(f, "ValidatedOnly"),
        }
    }
}

/// Result of applying one manifest
#[derive(Clone, Debug)]
pub struct ApplyOutcome {
    /// The resource the outcome describes
    pub resource_ref: ResourceRef,
    /// Outcome category
    pub status: ApplyStatus,
    /// Server-provided message on non-success
    pub detail: Option<String>,
}

/// HTTP status codes the remote API uses for semantic rejection: bad
/// request, missing dependency, unprocessable entity.
const REJECTION_CODES: &[u16] = &[400, 404, 422];

/// Apply one manifest and classify the result.
///
/// Issues exactly one remote write (or validate-only call in dry-run).
/// Returns `Err` only for failures outside the conflict/rejection
/// classification; those are fatal for this manifest but the caller's
/// batch continues.
pub async fn apply<C: ClusterApi + ?Sized>(
    api: &C,
    manifest: &ResourceManifest,
    params: &ApplyParams,
) -> Result<ApplyOutcome> {
    let resource_ref = manifest.resource_ref();
    let target = resolver::target_for(manifest)?;

    match api
        .apply_with_ownership(&target, &manifest.body, params)
        .await
    {
        Ok(()) => {
            let status = if params.dry_run {
                ApplyStatus::ValidatedOnly
            } else {
                ApplyStatus::Applied
            };
            debug!(resource = %resource_ref, status = %status, "apply succeeded");
            Ok(ApplyOutcome {
                resource_ref,
                status,
                detail: None,
            })
        }
        Err(e) => match classify_rejection(&e) {
            Some((status, detail)) => {
                warn!(resource = %resource_ref, status = %status, detail = %detail, "apply refused");
                Ok(ApplyOutcome {
                    resource_ref,
                    status,
                    detail: Some(detail),
                })
            }
            None => Err(e),
        },
    }
}

/// Map a remote API error onto a Conflict/Rejected outcome, if it is one.
fn classify_rejection(error: &crate::Error) -> Option<(ApplyStatus, String)> {
    let crate::Error::Kube {
        source: kube::Error::Api(ae),
    } = error
    else {
        return None;
    };
    if ae.code == 409 {
        return Some((ApplyStatus::Conflict, ae.message.clone()));
    }
    if REJECTION_CODES.contains(&ae.code) {
        return Some((ApplyStatus::Rejected, ae.message.clone()));
    }
    None
}

/// Convenience check used when routing outcomes into the readiness gate.
pub fn is_applied(outcome: &ApplyOutcome) -> bool {
    outcome.status == ApplyStatus::Applied
}
