//! # Relay Server
//!
//! Rule-based chat relay.
//!
//! ## Usage
//!
//! ```bash
//! # Run with relay.yml from a default location
//! relay
//!
//! # Run with a specific config
//! relay --config /path/to/relay.yml
//!
//! # Override the listen address
//! RELAY_PORT=8080 RELAY_HOST=0.0.0.0 relay
//! ```
//!
//! Send `SIGHUP` or `POST /reload` to reload rules without restarting.

mod config;
mod handlers;
mod metrics;
mod relay;

use anyhow::Result;
use clap::Parser;
use relay_adapter::ShutdownMode;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(version, about = "Rule-based chat relay")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=info,relay_core=info,relay_adapter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = config::Config::locate(args.config.as_deref());
    let config = match &config_path {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            config::Config::from_file(path)?
        }
        None => {
            warn!("No configuration file found, running without rules");
            config::Config::default()
        }
    };

    let addr = config.bind_addr()?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        protocols = config.protocols.len(),
        "Starting relay"
    );

    // Initialize metrics
    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let relay = Arc::new(relay::Relay::from_config(&config, config_path)?);
    relay.start();

    #[cfg(unix)]
    spawn_reload_on_hangup(relay.clone())?;

    handlers::run_server(relay.clone(), addr, shutdown_signal()).await?;

    info!("Draining delivery queues");
    relay
        .shutdown(ShutdownMode::Drain(config.drain_timeout()))
        .await;

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Received shutdown signal");
}

/// Reload rules whenever the process receives SIGHUP.
#[cfg(unix)]
fn spawn_reload_on_hangup(relay: Arc<relay::Relay>) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            match relay.reload() {
                Ok(version) => info!(version, "Rules reloaded on SIGHUP"),
                Err(e) => error!(error = %format!("{e:#}"), "Reload on SIGHUP failed"),
            }
        }
    });

    Ok(())
}
