#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

mod args;

use anyhow::Context;
use args::{Args, Command};
use clap::Parser;
use snapcache_config::Config;
use snapcache_server::{AppState, Server};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = Config::load(&args.config)?;

    // Initialize telemetry
    let _telemetry_guard = snapcache_telemetry::init(config.telemetry.as_ref(), "info")?;

    match args.command.unwrap_or(Command::Serve { listen: None }) {
        Command::Serve { listen } => {
            if listen.is_some() {
                config.server.listen_address = listen;
            }
            serve(&config, &args.config.display().to_string()).await
        }
        Command::Sweep => sweep(&config).await,
    }
}

async fn serve(config: &Config, config_path: &str) -> anyhow::Result<()> {
    tracing::info!(config_path, "starting snapcache");

    let server = Server::new(config)?;

    // Set up graceful shutdown
    let shutdown = CancellationToken::new();
    let shutdown_clone = shutdown.clone();

    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_clone.cancel();
    });

    server.serve(shutdown).await?;

    tracing::info!("snapcache stopped");
    Ok(())
}

async fn sweep(config: &Config) -> anyhow::Result<()> {
    let state = AppState::from_config(config)?;
    let reconciler = state
        .reconciler
        .context("sweep requires an [analytics] source to be configured")?;

    let report = reconciler.sweep().await.context("reconciliation sweep failed")?;

    tracing::info!(
        scanned = report.scanned,
        completed = report.completed,
        skipped = report.skipped,
        failed = report.failed,
        "sweep finished"
    );

    if report.failed > 0 {
        anyhow::bail!("{} of {} rows failed to reconcile", report.failed, report.scanned);
    }
    Ok(())
}

/// Wait for a shutdown signal (`SIGINT` or `SIGTERM`)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }

    tracing::info!("shutdown signal received");
}
