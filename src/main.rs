//! echod: a bidirectional message echo service.
//!
//! Peers connect over a Unix domain socket and send structured messages.
//! Every message with the expected dictionary shape is echoed back
//! verbatim on the same connection; anything else is dropped with a
//! diagnostic. Configuration comes from CLI arguments or a TOML file.

use echod::config::Config;
use echod::server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        socket = %config.socket_path.display(),
        max_connections = config.max_connections,
        "Starting echod server"
    );

    let server = Server::new(config);
    server.run().await
}
