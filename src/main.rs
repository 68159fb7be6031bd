//! District Supply Daemon
//!
//! Serves the approval queue and decision endpoints over a local SQLite ledger.
//!
//! ## Usage
//!
//! ```bash
//! # Start with defaults
//! district-supply
//!
//! # Start with custom config
//! district-supply --config /path/to/config.toml
//!
//! # Custom port and storage directory
//! district-supply --http-port 9000 --storage-dir /data/supply
//!
//! # Vehicle used when a recommendation names none
//! district-supply --default-vehicle VAN
//! ```

use clap::Parser;
use district_supply::services::events::spawn_logging_listener;
use district_supply::{Config, HttpServer, Services, SupplyDb};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "district-supply")]
#[command(about = "Approval engine for district supply redistribution")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Storage directory for the ledger
    #[arg(long, env = "DISTRICT_SUPPLY_DIR")]
    storage_dir: Option<PathBuf>,

    /// HTTP API port
    #[arg(long)]
    http_port: Option<u16>,

    /// Vehicle type for transfers whose recommendation names none
    #[arg(long)]
    default_vehicle: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("district_supply=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // CLI overrides
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(vehicle) = args.default_vehicle {
        config.default_vehicle = vehicle;
    }

    info!(
        storage_dir = %config.storage_dir.display(),
        http_port = config.http_port,
        default_vehicle = %config.default_vehicle,
        "Starting district-supply"
    );

    tokio::fs::create_dir_all(&config.storage_dir).await?;

    let config_path = config.config_path();
    if !config_path.exists() {
        config.save(&config_path)?;
        info!(path = %config_path.display(), "Created default config");
    }

    let db = Arc::new(SupplyDb::open(
        &config.storage_dir,
        Duration::from_millis(config.busy_timeout_ms),
    )?);
    let services = Services::new(db.clone(), &config);
    let _listener = spawn_logging_listener(services.events.clone());

    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    let http_server = Arc::new(
        HttpServer::new(services.approvals.clone(), http_addr).with_queue_limit(config.queue_limit),
    );

    info!("HTTP API available at http://{}", http_addr);
    info!("Endpoints:");
    info!("  GET  /health                        - Health check");
    info!("  GET  /approvals?priority=...        - Pending cards for caller");
    info!("  GET  /approvals/{{id}}                - Card detail");
    info!("  POST /approvals/{{id}}/decide         - Approve or reject");
    info!("  GET  /transfers/{{id}}                - Transfer record");
    info!("  GET  /inventory/{{facility}}/{{item}}   - Stock row");

    tokio::select! {
        result = http_server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    match db.stats() {
        Ok(stats) => info!(
            pending_cards = stats.pending_cards,
            inventory_rows = stats.inventory_rows,
            transfers = stats.transfers,
            "Ledger state at shutdown"
        ),
        Err(e) => error!(error = %e, "Failed to read ledger stats"),
    }

    Ok(())
}
