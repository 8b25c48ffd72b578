//! Error types for the network adapter.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the underlying ledger platform.
///
/// Platform bindings return these from every collaborator call. The adapter
/// wraps them in [`NetworkError::Platform`] with context and never
/// reclassifies them, except where a missing record has a dedicated
/// meaning (transaction lookup).
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("endorsement failed: {0}")]
    Endorsement(String),

    #[error("platform unavailable: {0}")]
    Unavailable(String),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("{0}")]
    Other(String),
}

/// Errors returned by the network adapter.
#[derive(Debug, Error)]
pub enum NetworkError {
    // ═══════════════════════════════════════════════════════════════════════════════
    // LOOKUP ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    /// An identity or transaction is absent.
    #[error("not found: {0}")]
    NotFound(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // INPUT ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported identity scheme '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // PROTOCOL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════════

    /// The platform answered with an unexpected shape or type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The scan deadline passed before the key showed up.
    #[error("timeout reached after {timeout:?} scanning for key [{key}]")]
    Timeout { key: String, timeout: Duration },

    #[error("cancelled: {0}")]
    Cancelled(String),

    // ═══════════════════════════════════════════════════════════════════════════════
    // PASSTHROUGH
    // ═══════════════════════════════════════════════════════════════════════════════

    #[error("{context}: {source}")]
    Platform {
        context: String,
        #[source]
        source: PlatformError,
    },
}

impl NetworkError {
    /// Wrap a platform error with context.
    pub fn platform(context: impl Into<String>, source: PlatformError) -> Self {
        NetworkError::Platform {
            context: context.into(),
            source,
        }
    }

    /// `true` when a scan ran out of time. Callers treat this as "not yet
    /// found" and may poll again.
    pub fn is_timeout(&self) -> bool {
        matches!(self, NetworkError::Timeout { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, NetworkError::NotFound(_))
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        NetworkError::Protocol(format!("failed to unmarshal response: {err}"))
    }
}

/// Result alias used throughout the crate.
pub type NetworkResult<T> = Result<T, NetworkError>;
