//! Readiness gate
//!
//! For a configured set of "gateable" kinds (cloud-provisioned or
//! cross-system resources whose completion cannot be inferred from the
//! apply call alone) the gate polls the resource's reported status
//! conditions until a terminal state or timeout.
//!
//! State machine per gated resource: `Pending → Polling → {Ready | Failed |
//! TimedOut}`. Pending and the terminal states are instantaneous; Polling
//! is the only sustained state. A transient fetch error during a poll tick
//! does not transition state; it is swallowed and the next tick attempted.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::client::ClusterApi;
use crate::manifest::ResourceRef;
use crate::resolver::ResourceTarget;

/// Condition types accepted as a readiness signal.
///
/// "Ready" is the Kubernetes convention; "Synced" is the synonym used by
/// external-resource controllers that report convergence with a remote
/// system.
pub const READY_CONDITION_TYPES: &[&str] = &["Ready", "Synced"];

/// Condition reasons that mean "still converging", not "will never
/// succeed". A False condition with one of these reasons keeps the gate
/// polling; any other reason paired with a non-empty message is terminal.
const TRANSIENT_REASONS: &[&str] = &[
    "Creating",
    "Provisioning",
    "Pending",
    "Updating",
    "Deleting",
    "Reconciling",
    "Waiting",
    "Progressing",
    "NotReady",
    "Unavailable",
];

/// Status of a remotely reported condition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl ConditionStatus {
    /// Parse the Kubernetes string form; anything unrecognized is Unknown.
    pub fn parse(s: &str) -> Self {
        match s {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

/// A fragment of a resource's remotely reported status. Read-only; not
/// owned by this engine.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReadinessCondition {
    /// Condition category (e.g. "Ready", "Synced")
    pub type_: String,
    /// Reported status
    pub status: ConditionStatus,
    /// Machine-readable reason
    pub reason: String,
    /// Human-readable message
    pub message: String,
}

impl ReadinessCondition {
    /// Extract a condition from one element of a `status.conditions` array.
    ///
    /// Lenient: missing fields default to empty / Unknown, since remote
    /// controllers vary in which fields they populate.
    pub fn from_value(value: &Value) -> Self {
        let field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        Self {
            type_: field("type"),
            status: ConditionStatus::parse(&field("status")),
            reason: field("reason"),
            message: field("message"),
        }
    }
}

/// Extract all conditions from a resource's `status` subtree.
pub fn conditions_from_status(status: Option<&Value>) -> Vec<ReadinessCondition> {
    status
        .and_then(|s| s.get("conditions"))
        .and_then(Value::as_array)
        .map(|arr| arr.iter().map(ReadinessCondition::from_value).collect())
        .unwrap_or_default()
}

/// The set of kinds whose provisioning is asynchronous relative to the
/// write call. Membership is the sole trigger for readiness gating.
#[derive(Clone, Debug)]
pub struct GateableKinds(HashSet<String>);

/// Kinds gated by default: cloud-provisioned resources that converge
/// asynchronously after the write is accepted.
const DEFAULT_GATEABLE_KINDS: &[&str] = &[
    "DatabaseInstance",
    "SQLInstance",
    "RedisInstance",
    "Bucket",
    "ManagedCertificate",
];

impl Default for GateableKinds {
    fn default() -> Self {
        DEFAULT_GATEABLE_KINDS
            .iter()
            .map(|s| s.to_string())
            .collect()
    }
}

impl FromIterator<String> for GateableKinds {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl GateableKinds {
    /// Check whether a kind requires readiness gating
    pub fn contains(&self, kind: &str) -> bool {
        self.0.contains(kind)
    }
}

/// Gate timing configuration
#[derive(Clone, Debug)]
pub struct GateConfig {
    /// Interval between poll ticks
    pub poll_interval: Duration,
    /// Per-resource timeout, measured from entering Polling
    pub timeout: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval: crate::DEFAULT_POLL_INTERVAL,
            timeout: crate::DEFAULT_GATE_TIMEOUT,
        }
    }
}

/// Terminal outcome of gating one resource
#[derive(Clone, Debug, PartialEq)]
pub enum GateVerdict {
    /// A readiness condition reported True
    Ready {
        /// Reason from the satisfying condition
        reason: String,
        /// Message from the satisfying condition
        message: String,
    },
    /// A condition reported an explicit negative outcome; will not succeed
    /// without intervention
    Failed {
        /// Reason from the failing condition
        reason: String,
        /// Message from the failing condition
        message: String,
    },
    /// No terminal condition within the deadline
    TimedOut {
        /// Time spent polling before giving up
        waited: Duration,
    },
}

/// Find the condition satisfying readiness, if any.
fn ready_condition(conditions: &[ReadinessCondition]) -> Option<&ReadinessCondition> {
    conditions.iter().find(|c| {
        c.status == ConditionStatus::True && READY_CONDITION_TYPES.contains(&c.type_.as_str())
    })
}

/// Find a condition reporting a permanent failure, if any.
///
/// A False condition is terminal only when it carries a non-empty message
/// and its reason is not in the transient list; "still converging" states
/// stay in Polling.
fn terminal_condition(conditions: &[ReadinessCondition]) -> Option<&ReadinessCondition> {
    conditions.iter().find(|c| {
        c.status == ConditionStatus::False
            && !c.message.is_empty()
            && !TRANSIENT_REASONS
                .iter()
                .any(|r| c.reason.eq_ignore_ascii_case(r))
    })
}

/// Poll one resource until Ready, Failed, or the timeout elapses.
///
/// The only operation that legitimately blocks for a non-trivial duration;
/// suspends between ticks, never busy-spins. Transient fetch errors are
/// swallowed and the next tick attempted.
pub async fn await_ready<C: ClusterApi + ?Sized>(
    api: &C,
    target: &ResourceTarget,
    resource: &ResourceRef,
    config: &GateConfig,
) -> GateVerdict {
    let entered_polling = Instant::now();
    debug!(resource = %resource, timeout_secs = config.timeout.as_secs(), "gate entering polling");

    loop {
        match api.read_conditions(target).await {
            Ok(conditions) => {
                if let Some(c) = ready_condition(&conditions) {
                    debug!(resource = %resource, reason = %c.reason, "gate ready");
                    return GateVerdict::Ready {
                        reason: c.reason.clone(),
                        message: c.message.clone(),
                    };
                }
                if let Some(c) = terminal_condition(&conditions) {
                    warn!(
                        resource = %resource,
                        reason = %c.reason,
                        message = %c.message,
                        "gate observed permanent failure"
                    );
                    return GateVerdict::Failed {
                        reason: c.reason.clone(),
                        message: c.message.clone(),
                    };
                }
                trace!(resource = %resource, conditions = conditions.len(), "not ready yet");
            }
            Err(e) => {
                // Transient fetch failure: no state transition, next tick retries.
                trace!(resource = %resource, error = %e, "poll tick failed, will retry");
            }
        }

        if entered_polling.elapsed() >= config.timeout {
            let waited = entered_polling.elapsed();
            warn!(resource = %resource, waited_secs = waited.as_secs(), "gate timed out");
            return GateVerdict::TimedOut { waited };
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClusterApi;
    use crate::resolver;
    use crate::Error;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_target() -> ResourceTarget {
        ResourceTarget {
            api_resource: resolver::api_resource("database.example.io/v1beta1", "DatabaseInstance")
                .unwrap(),
            name: "primary".to_string(),
            namespace: Some("prod".to_string()),
        }
    }

    fn test_ref() -> ResourceRef {
        ResourceRef {
            api_version: "database.example.io/v1beta1".to_string(),
            kind: "DatabaseInstance".to_string(),
            namespace: Some("prod".to_string()),
            name: "primary".to_string(),
        }
    }

    fn fast_config() -> GateConfig {
        GateConfig {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(100),
        }
    }

    fn cond(type_: &str, status: ConditionStatus, reason: &str, message: &str) -> ReadinessCondition {
        ReadinessCondition {
            type_: type_.to_string(),
            status,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }

    mod condition_parsing {
        use super::*;

        #[test]
        fn parses_standard_condition() {
            let value = serde_json::json!({
                "type": "Ready",
                "status": "True",
                "reason": "UpToDate",
                "message": "instance is serving"
            });
            let c = ReadinessCondition::from_value(&value);
            assert_eq!(c.type_, "Ready");
            assert_eq!(c.status, ConditionStatus::True);
            assert_eq!(c.reason, "UpToDate");
            assert_eq!(c.message, "instance is serving");
        }

        #[test]
        fn missing_fields_default_leniently() {
            let c = ReadinessCondition::from_value(&serde_json::json!({"type": "Ready"}));
            assert_eq!(c.status, ConditionStatus::Unknown);
            assert!(c.reason.is_empty());
            assert!(c.message.is_empty());
        }

        #[test]
        fn unrecognized_status_maps_to_unknown() {
            assert_eq!(ConditionStatus::parse("true"), ConditionStatus::Unknown);
            assert_eq!(ConditionStatus::parse(""), ConditionStatus::Unknown);
            assert_eq!(ConditionStatus::parse("False"), ConditionStatus::False);
        }

        #[test]
        fn extracts_conditions_from_status_subtree() {
            let status = serde_json::json!({
                "conditions": [
                    {"type": "Synced", "status": "True", "reason": "Done", "message": ""},
                    {"type": "Ready", "status": "False", "reason": "Creating", "message": "wait"}
                ]
            });
            let conds = conditions_from_status(Some(&status));
            assert_eq!(conds.len(), 2);
            assert_eq!(conds[0].type_, "Synced");
        }

        #[test]
        fn missing_status_yields_no_conditions() {
            assert!(conditions_from_status(None).is_empty());
            assert!(conditions_from_status(Some(&serde_json::json!({}))).is_empty());
        }
    }

    mod classification {
        use super::*;

        #[test]
        fn ready_true_satisfies_gate() {
            let conds = vec![cond("Ready", ConditionStatus::True, "UpToDate", "ok")];
            assert!(ready_condition(&conds).is_some());
        }

        #[test]
        fn synced_synonym_satisfies_gate() {
            let conds = vec![cond("Synced", ConditionStatus::True, "Reconciled", "")];
            assert!(ready_condition(&conds).is_some());
        }

        #[test]
        fn unrelated_true_condition_does_not_satisfy_gate() {
            let conds = vec![cond("Progressing", ConditionStatus::True, "Rolling", "")];
            assert!(ready_condition(&conds).is_none());
        }

        #[test]
        fn false_with_transient_reason_is_not_terminal() {
            let conds = vec![cond(
                "Ready",
                ConditionStatus::False,
                "Creating",
                "instance is being created",
            )];
            assert!(terminal_condition(&conds).is_none());
        }

        #[test]
        fn false_with_empty_message_is_not_terminal() {
            let conds = vec![cond("Ready", ConditionStatus::False, "CreateFailed", "")];
            assert!(terminal_condition(&conds).is_none());
        }

        #[test]
        fn false_with_explicit_failure_is_terminal() {
            let conds = vec![cond(
                "Ready",
                ConditionStatus::False,
                "CreateFailed",
                "quota exceeded in region",
            )];
            let c = terminal_condition(&conds).unwrap();
            assert_eq!(c.reason, "CreateFailed");
        }

        #[test]
        fn transient_reason_match_is_case_insensitive() {
            let conds = vec![cond(
                "Ready",
                ConditionStatus::False,
                "creating",
                "still working",
            )];
            assert!(terminal_condition(&conds).is_none());
        }
    }

    mod gateable_kinds {
        use super::*;

        #[test]
        fn default_set_contains_managed_kinds_only() {
            let kinds = GateableKinds::default();
            assert!(kinds.contains("DatabaseInstance"));
            assert!(kinds.contains("Bucket"));
            assert!(!kinds.contains("ConfigMap"));
            assert!(!kinds.contains("Deployment"));
        }

        #[test]
        fn custom_set_overrides_default() {
            let kinds: GateableKinds = ["Widget".to_string()].into_iter().collect();
            assert!(kinds.contains("Widget"));
            assert!(!kinds.contains("DatabaseInstance"));
        }
    }

    #[tokio::test]
    async fn ready_on_first_tick() {
        let mut mock = MockClusterApi::new();
        mock.expect_read_conditions().times(1).returning(|_| {
            Ok(vec![ReadinessCondition {
                type_: "Ready".to_string(),
                status: ConditionStatus::True,
                reason: "UpToDate".to_string(),
                message: "serving".to_string(),
            }])
        });

        let verdict = await_ready(&mock, &test_target(), &test_ref(), &fast_config()).await;
        assert_eq!(
            verdict,
            GateVerdict::Ready {
                reason: "UpToDate".to_string(),
                message: "serving".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn converging_then_ready() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let mut mock = MockClusterApi::new();
        mock.expect_read_conditions().returning(move |_| {
            if c.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(vec![ReadinessCondition {
                    type_: "Ready".to_string(),
                    status: ConditionStatus::False,
                    reason: "Creating".to_string(),
                    message: "instance is being created".to_string(),
                }])
            } else {
                Ok(vec![ReadinessCondition {
                    type_: "Ready".to_string(),
                    status: ConditionStatus::True,
                    reason: "UpToDate".to_string(),
                    message: String::new(),
                }])
            }
        });

        let verdict = await_ready(&mock, &test_target(), &test_ref(), &fast_config()).await;
        assert!(matches!(verdict, GateVerdict::Ready { .. }));
        assert!(calls.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn permanent_failure_stops_polling() {
        let mut mock = MockClusterApi::new();
        mock.expect_read_conditions().times(1).returning(|_| {
            Ok(vec![ReadinessCondition {
                type_: "Ready".to_string(),
                status: ConditionStatus::False,
                reason: "CreateFailed".to_string(),
                message: "quota exceeded".to_string(),
            }])
        });

        let verdict = await_ready(&mock, &test_target(), &test_ref(), &fast_config()).await;
        assert_eq!(
            verdict,
            GateVerdict::Failed {
                reason: "CreateFailed".to_string(),
                message: "quota exceeded".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn transient_fetch_error_is_swallowed() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();

        let mut mock = MockClusterApi::new();
        mock.expect_read_conditions().returning(move |_| {
            if c.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(Error::client("connection reset"))
            } else {
                Ok(vec![ReadinessCondition {
                    type_: "Synced".to_string(),
                    status: ConditionStatus::True,
                    reason: "Reconciled".to_string(),
                    message: String::new(),
                }])
            }
        });

        let verdict = await_ready(&mock, &test_target(), &test_ref(), &fast_config()).await;
        assert!(matches!(verdict, GateVerdict::Ready { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn times_out_at_or_after_the_deadline_not_before() {
        let mut mock = MockClusterApi::new();
        mock.expect_read_conditions().returning(|_| Ok(vec![]));

        let config = GateConfig {
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        };
        let started = Instant::now();
        let verdict = await_ready(&mock, &test_target(), &test_ref(), &config).await;
        let elapsed = started.elapsed();

        match verdict {
            GateVerdict::TimedOut { waited } => {
                assert!(waited >= config.timeout);
                assert!(elapsed >= config.timeout);
            }
            other => panic!("Expected TimedOut, got {:?}", other),
        }
    }
}
