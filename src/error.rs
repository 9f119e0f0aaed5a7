//! Error types for the reconciliation engine
//!
//! Per-resource outcomes (conflicts, rejections, readiness failures) are
//! data collected into the run report, not errors; see [`crate::driver`].
//! This type covers the failures that abort an operation outright.

use thiserror::Error;

/// Main error type for reconciliation operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// A manifest failed pre-network validation
    #[error("invalid manifest at index {index}: {reason}")]
    ManifestInvalid {
        /// Position of the manifest in the input set
        index: usize,
        /// Description of what's missing or malformed
        reason: String,
    },

    /// A kind/apiVersion pair could not be resolved to an addressable path
    #[error("resolve error: {message}")]
    Resolve {
        /// Description of what failed
        message: String,
    },

    /// Client construction or credential resolution error
    #[error("client error: {message}")]
    Client {
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a manifest validation error for the manifest at `index`
    pub fn manifest_invalid(index: usize, reason: impl Into<String>) -> Self {
        Self::ManifestInvalid {
            index,
            reason: reason.into(),
        }
    }

    /// Create a resolve error with the given message
    pub fn resolve(msg: impl Into<String>) -> Self {
        Self::Resolve {
            message: msg.into(),
        }
    }

    /// Create a client error with the given message
    pub fn client(msg: impl Into<String>) -> Self {
        Self::Client {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Check if this error is retryable
    ///
    /// Validation and serialization errors are not retryable (require input
    /// fix). Kubernetes errors depend on the status code: 4xx responses
    /// (conflict, rejection, not found) will not succeed on replay without
    /// intervention, while transport-level failures may.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => {
                !matches!(
                    source,
                    kube::Error::Api(ae) if (400..500).contains(&ae.code)
                )
            }
            Error::ManifestInvalid { .. } => false,
            Error::Resolve { .. } => false,
            Error::Client { .. } => true,
            Error::Serialization { .. } => false,
        }
    }
}
