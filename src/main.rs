//! # Presence Gateway
//!
//! Redis-backed real-time presence and message-routing gateway.
//!
//! This is the application entry point that initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Shared store connection and expiration bridge
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use presence_gateway::config::Settings;
use presence_gateway::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    presence_gateway::telemetry::init_tracing();

    info!("Starting Presence Gateway...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Server ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
