//! Gesture Intent Server - HTTP and WebSocket API for gesture intent
//! resolution with authentication and rate limiting.

use server::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment overrides from .env if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = ServerConfig::load()?;

    // Start server
    server::start_server(config).await?;

    Ok(())
}
