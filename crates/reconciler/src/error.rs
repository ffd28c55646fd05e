//! Error types for the reconciler crate.

use std::time::Duration;

use thiserror::Error;

/// Boxed cause carried by store failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Error)]
pub enum Error {
    /// The object vanished while being reconciled.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    /// Optimistic concurrency check failed.
    #[error("conflict writing {kind} '{name}': {reason}")]
    Conflict {
        kind: &'static str,
        name: String,
        reason: String,
    },

    /// A store read or write failed.
    #[error("store operation '{operation}' failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    /// The cleanup collaborator failed; the finalizer is kept.
    #[error("cleanup of '{source_name}' failed: {reason}")]
    CleanupFailed { source_name: String, reason: String },

    /// The caller cancelled the reconciliation.
    #[error("operation '{operation}' cancelled")]
    Cancelled { operation: &'static str },

    /// An operation exceeded its time budget.
    #[error("operation '{operation}' timed out after {}ms", .limit.as_millis())]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    /// One or more source status writes failed.
    #[error("{failed} status update(s) failed, first: {first}")]
    StatusUpdate { failed: usize, first: Box<Error> },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(kind: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Wrap a store failure, keeping its cause.
    pub fn store(operation: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Store {
            operation,
            source: source.into(),
        }
    }

    /// Create a cleanup failed error.
    pub fn cleanup_failed(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CleanupFailed {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }

    /// Create a cancellation error.
    pub const fn cancelled(operation: &'static str) -> Self {
        Self::Cancelled { operation }
    }

    /// Create a timeout error.
    pub const fn timeout(operation: &'static str, limit: Duration) -> Self {
        Self::Timeout { operation, limit }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Whether the object this error refers to is gone.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short category used as the reason of a failure condition.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::Store { operation, .. } => match *operation {
                "get_target" => "TargetFetchFailed",
                "update_target" => "TargetUpdateFailed",
                "list_sources" => "SourceListFailed",
                "update_source_status" => "StatusUpdateFailed",
                _ => "StoreError",
            },
            Self::CleanupFailed { .. } => "CleanupFailed",
            Self::Cancelled { .. } => "Cancelled",
            Self::Timeout { .. } => "Timeout",
            Self::StatusUpdate { .. } => "StatusUpdateFailed",
            Self::InvalidConfig { .. } => "InvalidConfig",
        }
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::conflict("Namespace", "team-a", "resourceVersion changed");
        assert!(err.to_string().contains("team-a"));
        assert!(err.to_string().contains("resourceVersion"));
    }

    #[test]
    fn test_store_error_preserves_cause() {
        let err = Error::store("update_target", "connection reset");
        assert_eq!(err.reason(), "TargetUpdateFailed");
        assert_eq!(
            err.source().map(ToString::to_string),
            Some("connection reset".to_string())
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("get_target", Duration::from_millis(250));
        assert!(err.to_string().contains("250ms"));
        assert_eq!(err.reason(), "Timeout");
    }

    #[test]
    fn test_status_update_reason() {
        let err = Error::StatusUpdate {
            failed: 2,
            first: Box::new(Error::store("update_source_status", "boom")),
        };
        assert!(err.to_string().contains("2 status update(s)"));
        assert_eq!(err.reason(), "StatusUpdateFailed");
    }
}
