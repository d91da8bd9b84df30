//! API gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌──────────────────────────────────────────────────────┐
//!                          │                      API GATEWAY                      │
//!                          │                                                       │
//!     Caller Request       │  ┌────────┐   ┌──────────────┐   ┌────────────────┐   │
//!     ─────────────────────┼─▶│  http  │──▶│ routing      │──▶│ dispatch       │   │
//!                          │  │ server │   │ cache        │   │ filters +      │   │
//!                          │  └───┬────┘   └──────▲───────┘   │ selector       │   │
//!                          │      │               │ version   └───────┬────────┘   │
//!                          │      │ /api/v1       │                   ▼            │
//!                          │      ▼               │           ┌────────────────┐   │     Micro-
//!     Caller Response      │  ┌────────┐   ┌──────┴───────┐   │ forwarder      │───┼───▶ service
//!     ◀────────────────────┼──│registry│──▶│ store        │   └────────────────┘   │
//!                          │  │+health │   │ (endpoints,  │                        │
//!                          │  └────────┘   │ microservices)│                        │
//!                          │               └──────────────┘                        │
//!                          │  ┌─────────────────────────────────────────────────┐  │
//!                          │  │ config · identity · observability · lifecycle   │  │
//!                          │  └─────────────────────────────────────────────────┘  │
//!                          └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use api_gateway::config::{load_config, validation::validate_config, ConfigError};
use api_gateway::lifecycle;
use api_gateway::observability::{logging, metrics};
use api_gateway::GatewayConfig;

#[derive(Parser)]
#[command(name = "api-gateway")]
#[command(about = "Dynamic API gateway for registered microservices", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => {
            let config = GatewayConfig::default();
            validate_config(&config).map_err(ConfigError::Validation)?;
            config
        }
    };

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "api-gateway starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        production = config.dispatch.is_production(),
        health_checks = config.registry.health_checks_enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    lifecycle::run(config).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
