//! Umami tracking reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!                        ┌──────────────────────────────────────────────┐
//!                        │                 UMAMI PROXY                  │
//!   Client Request       │  ┌─────────┐    ┌─────────────────┐          │
//!   ─────────────────────┼─▶│  http   │───▶│ umami middleware│──────────┼──▶ Origin
//!                        │  │ server  │    │  inject / track │          │
//!                        │  └─────────┘    └───────┬─────────┘          │
//!                        │                         │ /_umami/*          │
//!                        │                         ▼                    │
//!                        │                  ┌──────────────┐            │
//!                        │                  │ forward.rs   │────────────┼──▶ Umami
//!                        │                  └──────────────┘            │
//!                        │  ┌────────────────────────────────────────┐  │
//!                        │  │ beacon worker (server-side tracking)   │──┼──▶ Umami
//!                        │  └────────────────────────────────────────┘  │
//!                        └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use umami_proxy::config::{load_config, validate_config, ProxyConfig};
use umami_proxy::lifecycle::{wait_for_signal, Shutdown};
use umami_proxy::observability::{init_logging, init_metrics};
use umami_proxy::HttpServer;

#[derive(Parser)]
#[command(name = "umami-proxy")]
#[command(about = "Reverse proxy that injects the Umami tracker and forwards its traffic", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let config = ProxyConfig::default();
            if let Err(errors) = validate_config(&config) {
                for error in &errors {
                    eprintln!("config error: {}", error);
                }
                return Err("no configuration file given and defaults are incomplete".into());
            }
            config
        }
    };

    init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "umami-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        origin = %config.origin.address,
        umami_host = %config.umami.umami_host,
        script_injection = config.umami.script_injection,
        server_side_tracking = config.umami.server_side_tracking,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::build(config.clone()).await?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
