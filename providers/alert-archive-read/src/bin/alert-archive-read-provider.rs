//! Alert Archive Read Provider binary entry point
//!
//! This binary runs as a wasmCloud capability provider answering object,
//! class, cone and timeline queries over the alert archive.
//!
//! Uses wasmCloud provider runtime for lifecycle management.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use wasmcloud_provider_sdk::{load_host_data, run_provider};

use alert_archive_read_provider::AlertArchiveReadProvider;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("alert_archive_read_provider=info".parse()?)
                .add_directive("alert_archive_common=info".parse()?),
        )
        .init();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  Alert Archive Read Provider - Starting");
    info!("  v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration from wasmCloud HostData (fallback to env vars for local runs)
    let config: HashMap<String, String> = match load_host_data() {
        Ok(host_data) => {
            info!("[MAIN] Received HostData from wasmCloud");
            info!("[MAIN] Host ID: {:?}", host_data.host_id);
            info!("[MAIN] Provider Key: {:?}", host_data.provider_key);
            info!("[MAIN] Config entries: {}", host_data.config.len());
            host_data.config.clone()
        }
        Err(e) => {
            warn!(
                "[MAIN] Failed to load HostData: {}. Falling back to env vars.",
                e
            );
            HashMap::new()
        }
    };

    let provider = AlertArchiveReadProvider::with_config(config)?;
    let runtime_provider = provider.clone();
    let shutdown_provider = provider.clone();
    let provider = Arc::new(provider);

    info!("Provider initialized");
    info!("[MAIN] Provider will run until SIGTERM/SIGINT");

    tokio::spawn(async move {
        if let Err(e) = provider.start().await {
            error!("Provider error: {}", e);
        }
    });

    let handler = run_provider(runtime_provider, "alert-archive-read-provider")
        .await
        .context("Provider runtime error")?;
    handler.await;

    info!("═══════════════════════════════════════════════════════════════");
    info!("  SHUTDOWN SEQUENCE INITIATED");
    info!("═══════════════════════════════════════════════════════════════");
    if let Err(e) = shutdown_provider.close().await {
        warn!("[SHUTDOWN] Failed to close alert store: {}", e);
    }
    info!("[SHUTDOWN] Alert Archive Read Provider shutdown complete");
    Ok(())
}
