//! Operator configuration.
//!
//! Values come from an optional TOML file, then CLI flags and environment
//! variables override them field by field.

use std::path::Path;
use std::time::Duration;

use nslabel_core::ProtectedKeySet;
use nslabel_reconciler::ReconcilerConfig;
use serde::{Deserialize, Serialize};

use crate::error::OperatorError;

/// Configuration for the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    /// Comma-separated protected label keys. Unset or blank means the
    /// built-in default set.
    #[serde(default)]
    pub protected_labels: Option<String>,

    /// Maximum concurrent status writes per namespace.
    #[serde(default = "default_status_concurrency")]
    pub status_concurrency: usize,

    /// Time budget for each API call in seconds. 0 disables the limit.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_secs: u64,

    /// Delay before a failed reconciliation is retried.
    #[serde(default = "default_error_requeue")]
    pub error_requeue_secs: u64,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            protected_labels: None,
            status_concurrency: default_status_concurrency(),
            operation_timeout_secs: default_operation_timeout(),
            error_requeue_secs: default_error_requeue(),
        }
    }
}

impl OperatorConfig {
    /// Load a configuration file. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, OperatorError> {
        let raw = std::fs::read_to_string(path).map_err(|source| OperatorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| OperatorError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid.
    pub fn validate(&self) -> Result<(), OperatorError> {
        if self.status_concurrency == 0 {
            return Err(OperatorError::invalid_config(
                "status_concurrency must be greater than 0",
            ));
        }

        if self.error_requeue_secs == 0 {
            return Err(OperatorError::invalid_config(
                "error_requeue_secs must be greater than 0",
            ));
        }

        Ok(())
    }

    /// The effective protected-key set.
    #[must_use]
    pub fn protected_keys(&self) -> ProtectedKeySet {
        ProtectedKeySet::from_setting(self.protected_labels.as_deref())
    }

    #[must_use]
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }

    #[must_use]
    pub const fn error_requeue(&self) -> Duration {
        Duration::from_secs(self.error_requeue_secs)
    }

    /// Settings for the reconciliation engine.
    #[must_use]
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            status_concurrency: self.status_concurrency,
            operation_timeout: self.operation_timeout(),
        }
    }
}

fn default_status_concurrency() -> usize {
    8
}

fn default_operation_timeout() -> u64 {
    30
}

fn default_error_requeue() -> u64 {
    15
}
