//! echo-seq: a message-framed echo server
//!
//! Every client message is answered with the original payload stamped with
//! a process-wide sequence number:
//!
//! - One handler task per connection; responses follow request order
//! - A single shared counter numbers every message across all connections
//! - Configuration via CLI arguments or TOML file

mod config;
mod counter;
mod handler;
mod server;
mod session;

use config::Config;
use server::Server;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
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
        listen = %config.listen,
        workers = ?config.workers,
        max_message_bytes = config.max_message_bytes,
        "Starting echo-seq server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.build()?;

    let server = Server::new(config);
    runtime.block_on(server.run())
}
