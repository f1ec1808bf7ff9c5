//! # Clawgate Gateway Binary
//!
//! Entry point for the agent-gateway HTTP server. Configuration is pure
//! environment variables (optionally loaded from a `.env` file) — there is
//! no config file and no command-line flags, matching the reference
//! implementation's `uvicorn`-style deployment.
//!
//! ## Environment Variables
//!
//! See [`clawgate_gateway::config::Settings`] for the full list.

use std::net::SocketAddr;

use clawgate_gateway::config::Settings;
use clawgate_gateway::create_server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::load()?;
    let addr = SocketAddr::new(settings.api_host.parse()?, settings.api_port);

    tracing::info!(%addr, "starting clawgate gateway");

    let app = create_server(settings).await?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
