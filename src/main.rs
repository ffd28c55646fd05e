//! # nslabel - namespace label operator
//!
//! ## Commands
//!
//! - `run` connects to the cluster and runs the controller until SIGTERM or
//!   Ctrl+C
//! - `crd` prints the `NamespaceLabel` CustomResourceDefinition
//! - `protected-keys` prints the effective protected label keys
//!
//! ## Shutdown
//!
//! A shutdown signal cancels every in-flight API call, then stops the
//! controller once running reconciliations have returned.

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use anyhow::{Context, Result};
use clap::Parser;
use futures::FutureExt;
use futures::channel::oneshot;
use kube::{Client, CustomResourceExt};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use nslabel::cli::{Cli, Commands, LogFormat, SettingsArgs};
use nslabel::{NamespaceLabel, controller};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Commands::Run(settings) => run(&settings).await,
        Commands::Crd => print_crd(),
        Commands::ProtectedKeys(settings) => {
            let config = settings.resolve().context("Invalid configuration")?;
            for key in config.protected_keys().iter() {
                println!("{key}");
            }
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

fn print_crd() -> Result<()> {
    let yaml = serde_yaml::to_string(&NamespaceLabel::crd()).context("Failed to render CRD")?;
    print!("{yaml}");
    Ok(())
}

async fn run(settings: &SettingsArgs) -> Result<()> {
    let config = settings.resolve().context("Invalid configuration")?;
    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client. Check KUBECONFIG or the in-cluster service account")?;

    info!("nslabel starting");

    let cancel = CancellationToken::new();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        trigger.cancel();
        let _ = stop_tx.send(());
    });

    controller::run(client, &config, cancel, stop_rx.map(|_| ()))
        .await
        .context("Controller failed")?;

    info!("nslabel stopped gracefully");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, initiating graceful shutdown"),
            Err(err) => {
                error!("Failed to listen for Ctrl+C: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
            }
            Err(err) => {
                error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
