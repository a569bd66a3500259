//! Courier server -- direct-message delivery core over WebSockets.
//!
//! An axum WebSocket server that persists direct messages, tracks which
//! principal is connected where, and fans change events out to the live
//! sessions of a conversation's participants.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin courier-server
//!
//! # Run on custom address
//! cargo run --bin courier-server -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! COURIER_ADDR=127.0.0.1:8080 cargo run --bin courier-server
//! ```

use std::sync::Arc;

use clap::Parser;
use courier_server::config::{ServerCliArgs, ServerConfig};
use courier_server::external::{InMemoryObjectStore, OpenVerifier};
use courier_server::server::{self, ChatState};

#[tokio::main]
async fn main() {
    let cli = ServerCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match ServerConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing with the resolved log level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting courier server");

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(ChatState::with_config(
        config,
        Arc::new(OpenVerifier),
        InMemoryObjectStore::new(),
    ));

    match server::start_server(&bind_addr, state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "courier server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "server task failed");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start server");
            std::process::exit(1);
        }
    }
}
