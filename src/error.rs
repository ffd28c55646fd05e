//! Errors raised by the operator binary.

use std::path::PathBuf;

use thiserror::Error;

/// Operator-level failures: configuration and controller plumbing.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The reconciliation itself failed.
    #[error(transparent)]
    Reconcile(#[from] nslabel_reconciler::Error),

    /// A watched object carried no namespace.
    #[error("NamespaceLabel {name} has no namespace")]
    MissingNamespace { name: String },

    #[error("failed to read config file {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl OperatorError {
    pub fn missing_namespace(name: impl Into<String>) -> Self {
        Self::MissingNamespace { name: name.into() }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Short category used in logs and metrics labels.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Reconcile(inner) => inner.reason(),
            Self::MissingNamespace { .. } => "MissingNamespace",
            Self::ConfigRead { .. } | Self::ConfigParse { .. } | Self::InvalidConfig { .. } => {
                "InvalidConfig"
            }
        }
    }
}
