//! `PairPlan` document store server.
//!
//! Serves an in-memory document store over WebSocket at `/ws`.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin pairplan-docstore
//!
//! # Run on custom address
//! cargo run --bin pairplan-docstore -- --bind 127.0.0.1:8080
//! ```

use std::sync::Arc;

use clap::Parser;
use pairplan_docstore::config::{DocstoreCliArgs, DocstoreConfig};
use pairplan_docstore::engine::MemoryStore;
use pairplan_docstore::server::{self, ServerState};

#[tokio::main]
async fn main() {
    let cli = DocstoreCliArgs::parse();

    let config = match DocstoreConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::info!(addr = %config.bind_addr, "starting pairplan document store");

    let store = Arc::new(MemoryStore::with_max_batch_writes(config.max_batch_writes));
    let state = Arc::new(ServerState::with_config(store, config.max_frame_size));

    match server::start_server_with_state(&config.bind_addr, Arc::clone(&state)).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "document store listening");
            tokio::select! {
                result = handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutting down");
                    state.close_all_connections().await;
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start document store");
            std::process::exit(1);
        }
    }
}
