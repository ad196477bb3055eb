/// Flowcore: execution core for node-based automation graphs
///
/// Main entry point. Loads configuration from the environment and starts the
/// HTTP server.

use flowcore::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Graph editing API at /api/graph, /api/nodes/*, /api/edges
/// - Execution control at /api/execute, /api/stop, /api/status
/// - Relay endpoints at /api/webhooks/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Defaults to 0.0.0.0:3005 and a relay at 127.0.0.1:3006
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
