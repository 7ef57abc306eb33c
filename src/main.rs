//! Slot monitor - rangefinder array to occupancy bridge
//!
//! Reads paired distance samples from a microcontroller over serial,
//! classifies each parking/storage slot, and serves the latest result over HTTP.
//!
//! Module structure:
//! - `domain/` - Line protocol, classifier, snapshot types
//! - `io/` - External interfaces (serial reader, HTTP endpoint)
//! - `services/` - Shared snapshot store
//! - `infra/` - Infrastructure (Config, Metrics)

use clap::Parser;
use slot_monitor::infra::{Config, Metrics};
use slot_monitor::io::{start_http_server, AppState, SerialReader};
use slot_monitor::services::SnapshotStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Slot monitor - serial rangefinder occupancy service
#[derive(Parser, Debug)]
#[command(name = "slot-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments using clap
    let args = Args::parse();

    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug or trace for per-line visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false);
    if args.json_logs {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!(git_hash = env!("GIT_HASH"), "slot-monitor starting");

    let config_path = Config::resolve_config_path(args.config.as_deref());
    let config = Config::load_from_path(&config_path);

    info!(
        config_file = %config.config_file(),
        serial_device = %config.serial_device(),
        serial_baud = %config.serial_baud(),
        slots = %config.slot_count(),
        near_threshold = %config.near_threshold(),
        pair_tolerance = %config.pair_tolerance(),
        http_addr = %format!("{}:{}", config.http_bind_address(), config.http_port()),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Shared state, handed to both the reader and the HTTP server
    let store = Arc::new(SnapshotStore::new(config.slot_count()));
    let metrics = Arc::new(Metrics::new());

    // Start serial reader loop
    let reader = SerialReader::new(&config, store.clone(), metrics.clone());
    let reader_shutdown = shutdown_rx.clone();
    let reader_handle = tokio::spawn(async move {
        reader.run(reader_shutdown).await;
    });

    // Start periodic metrics reporter (if interval > 0)
    let metrics_interval = config.metrics_interval_secs();
    if metrics_interval > 0 {
        let metrics_clone = metrics.clone();
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
            interval.tick().await;
            loop {
                interval.tick().await;
                metrics_clone.report().log();
            }
        });
    }

    // Handle shutdown on Ctrl+C
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    // Serve HTTP until shutdown
    let state = AppState { store, metrics };
    start_http_server(config.http_bind_address(), config.http_port(), state, shutdown_rx).await?;

    reader_handle.await.ok();
    info!("slot-monitor shutdown complete");
    Ok(())
}
