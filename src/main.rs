//! optflow - live option premium flow over daily tick logs.
//!
//! Watches the log directory, streams per-bucket call/put premium summaries to
//! WebSocket subscribers and pushes threshold alerts to registered devices.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use optflow_backend::{Config, ServerArgs, Service};
use std::path::Path;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    load_env();
    init_tracing();

    let config = Config::from_args(ServerArgs::parse()).context("Invalid configuration")?;
    info!(
        log_dir = %config.log_dir.display(),
        period_minutes = config.period_minutes,
        timezone = %config.timezone,
        "optflow starting"
    );

    let addr = config.bind_addr();
    let service = Service::build(config)?;
    let tasks = service.spawn_background();

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    service.serve(listener, shutdown_signal()).await?;

    for task in tasks {
        task.abort();
    }
    info!("optflow stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => error!(error = %e, "failed to listen for ctrl-c"),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "optflow_backend=debug,optflow=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_env() {
    // Standard search from the working directory upwards.
    let _ = dotenv();

    // Also accept a .env beside the manifest when launched from elsewhere.
    let candidate = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
    if candidate.exists() {
        let _ = dotenv::from_path(&candidate);
    }
}
