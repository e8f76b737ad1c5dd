//! lendgate — security gateway for the loan-application web flow.
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌──────────────────────────────────────────────┐
//!                       │                  LENDGATE                     │
//!                       │                                               │
//!     Client Request    │  ┌──────────┐   ┌───────────┐   ┌──────────┐ │
//!     ──────────────────┼─▶│ listener │──▶│ rate limit│──▶│ CSRF gate│ │
//!                       │  └──────────┘   │ (per IP)  │   │ (HMAC)   │ │
//!                       │                 └───────────┘   └────┬─────┘ │
//!                       │                                      ▼       │
//!     Client Response   │  ┌──────────┐                  ┌──────────┐  │
//!     ◀─────────────────┼──│ response │◀─────────────────│ handlers │  │
//!                       │  └──────────┘                  └──────────┘  │
//!                       │                                               │
//!                       │  Cross-cutting: config, observability,        │
//!                       │  lifecycle (startup/shutdown)                 │
//!                       └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lendgate::config::{load_config, AppConfig};
use lendgate::http::HttpServer;
use lendgate::lifecycle::Shutdown;
use lendgate::security::resolve_secret;

#[derive(Parser, Debug)]
#[command(name = "lendgate", about = "Security gateway API for the loan application flow")]
struct Cli {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lendgate=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("lendgate v{} starting", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        csrf_ttl_secs = config.security.csrf_ttl_secs,
        api_ceiling = config.rate_limit.api_max_requests,
        window_secs = config.rate_limit.window_secs,
        "Configuration loaded"
    );

    // Missing secret in production aborts startup here.
    let secret = resolve_secret()?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(address = %local_addr, "Listening for connections");

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            lendgate::observability::metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let shutdown = Shutdown::new();
    let server = HttpServer::new(config, secret);
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
