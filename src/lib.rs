//! Converge - declarative cluster resource reconciliation
//!
//! Converge applies a set of declarative resource manifests to a
//! cluster-management API using server-side apply (an ownership-tagged
//! merge), then optionally gates completion on managed resources reaching
//! an externally reported Ready condition.
//!
//! # Architecture
//!
//! A reconciliation run has two phases:
//! - Apply: every manifest is applied independently with a fixed field
//!   owner; conflicts and rejections are collected, not thrown.
//! - Gate: resources of "gateable" kinds (cloud-provisioned resources whose
//!   completion cannot be inferred from the write alone) are polled until
//!   Ready, permanently Failed, or timed out.
//!
//! # Modules
//!
//! - [`manifest`] - Manifest parsing and pre-network validation
//! - [`resolver`] - Kind-to-path resolution with irregular plural handling
//! - [`client`] - The remote API boundary (server-side apply, status reads)
//! - [`apply`] - Single-manifest apply with outcome classification
//! - [`gate`] - Readiness gate state machine and condition classification
//! - [`driver`] - Two-phase reconciliation driver and report aggregation
//! - [`error`] - Error types for the engine

#![deny(missing_docs)]

pub mod apply;
pub mod client;
pub mod driver;
pub mod error;
pub mod gate;
pub mod manifest;
pub mod resolver;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Default Configuration Constants
// =============================================================================
// Centralized so the CLI defaults, driver defaults, and test fixtures stay
// consistent.

/// Field owner identifier recorded by server-side apply for every write
/// this engine makes.
pub const DEFAULT_FIELD_MANAGER: &str = "converge";

/// Default interval between readiness poll ticks.
pub const DEFAULT_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Default per-resource readiness timeout.
pub const DEFAULT_GATE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);
