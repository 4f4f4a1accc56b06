//! weather-mcp: serves the weather tools over stdio.

use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use mcp::Provider;
use weather::NwsClient;

/// Environment variable overriding the NWS API base URL.
const BASE_URL_ENV: &str = "WEATHER_API_BASE";

/// Logs go to stderr; stdout carries the protocol.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let client = match std::env::var(BASE_URL_ENV) {
        Ok(base) => NwsClient::with_base_url(base),
        Err(_) => NwsClient::new(),
    };
    let client = match client {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            return ExitCode::FAILURE;
        }
    };

    let router = match weather::router(client) {
        Ok(router) => router,
        Err(e) => {
            error!(error = %e, "failed to register tools");
            return ExitCode::FAILURE;
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "starting weather provider");
    match Provider::new("weather", env!("CARGO_PKG_VERSION"), router)
        .serve_stdio()
        .await
    {
        Ok(()) => {
            info!("input closed, shutting down");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "provider stopped");
            ExitCode::FAILURE
        }
    }
}
