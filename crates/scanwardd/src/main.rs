//! scanwardd — the Scanward daemon.
//!
//! Single binary that assembles the scan orchestrator:
//! - Scan model, owned by the gateway's writer task
//! - Stalled-scan monitor
//! - Model metrics reporter
//! - REST API + Prometheus endpoint
//!
//! # Usage
//!
//! ```text
//! scanwardd serve --config /etc/scanward/scanward.toml
//! scanwardd check-config --config /etc/scanward/scanward.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scanward_config::ScanwardConfig;
use scanward_gateway::{Gateway, ModelMetricsReporter, StalledScanMonitor};
use scanward_metrics::ScanMetrics;
use scanward_state::{FailedScanPolicy, Model};

#[derive(Parser)]
#[command(name = "scanwardd", about = "Scanward image scan orchestrator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the orchestrator.
    Serve {
        /// Path to scanward.toml.
        #[arg(long)]
        config: PathBuf,

        /// Override `server.port` from the config file.
        #[arg(long)]
        port: Option<u16>,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,
    },
    /// Validate a config file and print the effective configuration.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            config,
            port,
            log_json,
        } => {
            let mut config = ScanwardConfig::from_file(&config)?;
            if let Some(port) = port {
                config.server.port = port;
            }
            init_tracing(&config.log_level, log_json);
            serve(config).await
        }
        Command::CheckConfig { config } => {
            let config = ScanwardConfig::from_file(&config)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins; otherwise the configured level applies.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config: ScanwardConfig) -> anyhow::Result<()> {
    info!("Scanward daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let metrics = Arc::new(ScanMetrics::new());
    let model = Model::new(config.scans.concurrency_limit).with_failed_scan_policy(
        FailedScanPolicy {
            max_retries: config.scans.max_failed_scan_retries,
        },
    );
    let (gateway, writer_handle) = Gateway::spawn(model, Arc::clone(&metrics));
    info!(
        limit = config.scans.concurrency_limit,
        max_retries = config.scans.max_failed_scan_retries,
        "gateway initialized"
    );

    let monitor = StalledScanMonitor::new(
        gateway.clone(),
        config.stalled_scans.check_interval(),
        config.stalled_scans.client_timeout(),
    );
    let reporter = ModelMetricsReporter::new(
        gateway.clone(),
        config.metrics.model_metrics_interval(),
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let monitor_shutdown = shutdown_rx.clone();
    let reporter_shutdown = shutdown_rx;

    // ── Start background tasks ─────────────────────────────────

    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_shutdown).await;
    });
    let reporter_handle = tokio::spawn(async move {
        reporter.run(reporter_shutdown).await;
    });

    // ── Start API server ───────────────────────────────────────

    let router = scanward_api::build_router(gateway);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Background loops hold the last gateway handles; once they exit the
    // writer drains its queue and stops.
    let _ = monitor_handle.await;
    let _ = reporter_handle.await;
    let _ = writer_handle.await;

    info!("Scanward daemon stopped");
    Ok(())
}
