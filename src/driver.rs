//! Reconciliation driver
//!
//! Orchestrates the two phases over a manifest set and aggregates results.
//! Per-resource failures are collected, not thrown; both phases always run
//! over the full input set so a user sees every failing resource in one
//! run. Nothing is ever rolled back: convergence is retried by re-running
//! the whole process.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use crate::apply::{self, ApplyOutcome, ApplyStatus};
use crate::client::{ApplyParams, ClusterApi};
use crate::gate::{self, GateConfig, GateVerdict, GateableKinds};
use crate::manifest::{ResourceManifest, ResourceRef};
use crate::resolver;
use crate::Result;

/// Phase in which a failure was recorded
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Phase 1: applying manifests
    Apply,
    /// Phase 2: readiness gating
    Gate,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Apply => write!(f, "apply"),
            Self::Gate => write!(f, "gate"),
        }
    }
}

/// One recorded per-resource failure
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    /// The failing resource
    pub resource_ref: ResourceRef,
    /// Phase the failure occurred in
    pub phase: Phase,
    /// Short failure category (Conflict, Rejected, Failed, TimedOut, or an
    /// error description)
    pub reason: String,
    /// Server- or condition-provided detail, when available
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Aggregated result of one reconciliation run
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Number of manifests accepted by the remote API (validated-only in
    /// dry-run mode)
    pub applied_count: usize,
    /// Number of resources that entered readiness gating
    pub gated_count: usize,
    /// Every per-resource failure from both phases
    pub failures: Vec<Failure>,
    /// Wall-clock duration of the run
    #[serde(rename = "elapsedSeconds", serialize_with = "duration_secs")]
    pub elapsed: Duration,
}

fn duration_secs<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

impl Report {
    /// The run is overall-successful iff no failures were recorded
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Explicit configuration for a reconciliation run
///
/// Passed into the driver at construction; no ambient global lookups
/// happen inside the applier or gate.
#[derive(Clone, Debug)]
pub struct ReconcilerConfig {
    /// Field owner identifier for server-side apply
    pub field_manager: String,
    /// Validate server-side without persisting
    pub dry_run: bool,
    /// Resolve field-ownership conflicts in this engine's favor
    pub force: bool,
    /// Run Phase 2 readiness gating after applying
    pub wait: bool,
    /// Interval between readiness poll ticks
    pub poll_interval: Duration,
    /// Per-resource readiness timeout
    pub gate_timeout: Duration,
    /// Optional wall-clock cap on the whole run; still-polling resources
    /// are cancelled and reported TimedOut when it lapses
    pub run_timeout: Option<Duration>,
    /// Kinds that require readiness gating
    pub gateable_kinds: GateableKinds,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            field_manager: crate::DEFAULT_FIELD_MANAGER.to_string(),
            dry_run: false,
            force: false,
            wait: false,
            poll_interval: crate::DEFAULT_POLL_INTERVAL,
            gate_timeout: crate::DEFAULT_GATE_TIMEOUT,
            run_timeout: None,
            gateable_kinds: GateableKinds::default(),
        }
    }
}

/// Two-phase reconciliation driver
pub struct Reconciler<C: ClusterApi> {
    client: Arc<C>,
    config: ReconcilerConfig,
}

impl<C: ClusterApi + 'static> Reconciler<C> {
    /// Create a driver over the given remote API and configuration
    pub fn new(client: Arc<C>, config: ReconcilerConfig) -> Self {
        Self { client, config }
    }

    /// Reconcile a manifest set: apply everything, then gate readiness.
    ///
    /// Fails fast (before any network call) on an invalid manifest; every
    /// other per-resource failure is recorded in the report.
    pub async fn reconcile(&self, manifests: &[ResourceManifest]) -> Result<Report> {
        let started = Instant::now();

        for (index, manifest) in manifests.iter().enumerate() {
            manifest.validate(index)?;
        }

        info!(
            manifests = manifests.len(),
            dry_run = self.config.dry_run,
            wait = self.config.wait,
            "starting reconciliation"
        );

        let mut failures = Vec::new();
        let outcomes = self.apply_all(manifests, &mut failures).await;

        let applied_count = outcomes
            .iter()
            .flatten()
            .filter(|o| matches!(o.status, ApplyStatus::Applied | ApplyStatus::ValidatedOnly))
            .count();

        let gated_count = if self.config.wait {
            self.gate_all(manifests, &outcomes, &mut failures).await?
        } else {
            0
        };

        let report = Report {
            applied_count,
            gated_count,
            failures,
            elapsed: started.elapsed(),
        };
        info!(
            applied = report.applied_count,
            gated = report.gated_count,
            failures = report.failures.len(),
            elapsed_secs = report.elapsed.as_secs(),
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Phase 1: apply every manifest in input order, independently.
    ///
    /// Returns outcomes aligned 1:1 with the input; `None` marks a manifest
    /// whose apply failed outside the conflict/rejection classification
    /// (already recorded as a failure).
    async fn apply_all(
        &self,
        manifests: &[ResourceManifest],
        failures: &mut Vec<Failure>,
    ) -> Vec<Option<ApplyOutcome>> {
        let params = ApplyParams {
            field_manager: self.config.field_manager.clone(),
            dry_run: self.config.dry_run,
            force: self.config.force,
        };

        let mut outcomes = Vec::with_capacity(manifests.len());
        for manifest in manifests {
            match apply::apply(self.client.as_ref(), manifest, &params).await {
                Ok(outcome) => {
                    if matches!(outcome.status, ApplyStatus::Conflict | ApplyStatus::Rejected) {
                        if self.config.dry_run {
                            // No state was changed; report as warning only.
                            warn!(
                                resource = %outcome.resource_ref,
                                status = %outcome.status,
                                detail = outcome.detail.as_deref().unwrap_or(""),
                                "validation refused (dry-run)"
                            );
                        } else {
                            failures.push(Failure {
                                resource_ref: outcome.resource_ref.clone(),
                                phase: Phase::Apply,
                                reason: outcome.status.to_string(),
                                detail: outcome.detail.clone(),
                            });
                        }
                    }
                    outcomes.push(Some(outcome));
                }
                Err(e) => {
                    warn!(resource = %manifest.resource_ref(), error = %e, "apply failed");
                    failures.push(Failure {
                        resource_ref: manifest.resource_ref(),
                        phase: Phase::Apply,
                        reason: e.to_string(),
                        detail: None,
                    });
                    outcomes.push(None);
                }
            }
        }
        outcomes
    }

    /// Phase 2: gate every gateable applied resource concurrently.
    ///
    /// Each resource carries its own timeout clock; the optional run-level
    /// deadline cancels still-polling gates. All verdicts are collected
    /// before aggregation.
    async fn gate_all(
        &self,
        manifests: &[ResourceManifest],
        outcomes: &[Option<ApplyOutcome>],
        failures: &mut Vec<Failure>,
    ) -> Result<usize> {
        let gate_config = GateConfig {
            poll_interval: self.config.poll_interval,
            timeout: self.config.gate_timeout,
        };
        let run_deadline = self
            .config
            .run_timeout
            .map(|t| tokio::time::Instant::now() + t);

        let mut waits = Vec::new();
        for (manifest, outcome) in manifests.iter().zip(outcomes) {
            let Some(outcome) = outcome else { continue };
            if !apply::is_applied(outcome) || !self.config.gateable_kinds.contains(&manifest.kind) {
                continue;
            }

            let target = resolver::target_for(manifest)?;
            let resource_ref = outcome.resource_ref.clone();
            let client = self.client.clone();
            let gate_config = gate_config.clone();
            waits.push(async move {
                let pending = gate::await_ready(client.as_ref(), &target, &resource_ref, &gate_config);
                let verdict = match run_deadline {
                    Some(deadline) => match tokio::time::timeout_at(deadline, pending).await {
                        Ok(verdict) => verdict,
                        Err(_) => GateVerdict::TimedOut {
                            waited: gate_config.timeout,
                        },
                    },
                    None => pending.await,
                };
                (resource_ref, verdict)
            });
        }

        let gated_count = waits.len();
        if gated_count > 0 {
            info!(gated = gated_count, "gating readiness");
        }

        for (resource_ref, verdict) in join_all(waits).await {
            match verdict {
                GateVerdict::Ready { reason, .. } => {
                    info!(resource = %resource_ref, reason = %reason, "resource ready");
                }
                GateVerdict::Failed { reason, message } => {
                    failures.push(Failure {
                        resource_ref,
                        phase: Phase::Gate,
                        reason: "Failed".to_string(),
                        detail: Some(format!("{}: {}", reason, message)),
                    });
                }
                GateVerdict::TimedOut { waited } => {
                    failures.push(Failure {
                        resource_ref,
                        phase: Phase::Gate,
                        reason: "TimedOut".to_string(),
                        detail: Some(format!("no terminal condition after {:?}", waited)),
                    });
                }
            }
        }
        Ok(gated_count)
    }
}
