//! Inspecting reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────────┐
//!                 │                    INSPECTION PROXY                      │
//!                 │                                                          │
//!  Client ───────▶│ http server ──▶ routing ──▶ filter (decode) ──┐          │
//!                 │                                 │             ▼          │
//!                 │                                 │      load_balancer ────┼──▶ Backend
//!                 │                                 ▼                        │
//!                 │                          verdict engine                  │
//!                 │                                 │                        │
//!  Client ◀───────│ local reply / response ◀── filter (encode) ◀────────────┼─── Backend
//!                 │                                 │                        │
//!                 │                                 └─▶ webhook ─────────────┼──▶ Alerts
//!                 └──────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use inspection_proxy::config::{load_config, ProxyConfig};
use inspection_proxy::observability::{logging, metrics};
use inspection_proxy::{HttpServer, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "inspection-proxy", version, about = "Reverse proxy with request and response inspection")]
struct Cli {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability.log_level);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "inspection-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        routes = config.routes.len(),
        backends = config.backends.len(),
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    // Bind TCP listener
    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    shutdown.trigger_on_ctrl_c();

    HttpServer::new(config).run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
