//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::OperatorConfig;
use crate::error::OperatorError;

/// nslabel - namespace label operator
#[derive(Parser, Debug)]
#[command(name = "nslabel")]
#[command(version)]
#[command(about = "Projects NamespaceLabel declarations onto namespace labels")]
#[command(
    long_about = "nslabel watches NamespaceLabel objects, merges the labels they declare for their namespace (newest wins), and keeps the namespace's labels converged while never touching protected keys."
)]
pub struct Cli {
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text, env = "NSLABEL_LOG_FORMAT")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller against the current cluster
    Run(SettingsArgs),

    /// Print the NamespaceLabel CustomResourceDefinition as YAML
    Crd,

    /// Print the effective protected label keys
    ProtectedKeys(SettingsArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Settings shared by every command that builds a configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// TOML configuration file
    #[arg(short, long, env = "NSLABEL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Comma-separated label keys that are never written or removed
    #[arg(long, env = "PROTECTED_LABELS")]
    pub protected_labels: Option<String>,

    /// Maximum concurrent status writes per namespace
    #[arg(long, env = "NSLABEL_STATUS_CONCURRENCY")]
    pub status_concurrency: Option<usize>,

    /// Per API call time budget in seconds (0 disables it)
    #[arg(long, env = "NSLABEL_OPERATION_TIMEOUT_SECS")]
    pub operation_timeout_secs: Option<u64>,

    /// Delay before retrying a failed reconciliation, in seconds
    #[arg(long, env = "NSLABEL_ERROR_REQUEUE_SECS")]
    pub error_requeue_secs: Option<u64>,
}

impl SettingsArgs {
    /// Build the effective configuration: file first, then flags.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be loaded or the result is invalid.
    pub fn resolve(&self) -> Result<OperatorConfig, OperatorError> {
        let base = match &self.config {
            Some(path) => OperatorConfig::load(path)?,
            None => OperatorConfig::default(),
        };
        let config = self.overlay(base);
        config.validate()?;
        Ok(config)
    }

    fn overlay(&self, base: OperatorConfig) -> OperatorConfig {
        OperatorConfig {
            protected_labels: self.protected_labels.clone().or(base.protected_labels),
            status_concurrency: self.status_concurrency.unwrap_or(base.status_concurrency),
            operation_timeout_secs: self
                .operation_timeout_secs
                .unwrap_or(base.operation_timeout_secs),
            error_requeue_secs: self.error_requeue_secs.unwrap_or(base.error_requeue_secs),
        }
    }
}
