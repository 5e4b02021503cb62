//! Ridewire Server
//!
//! Real-time dispatch between riders and drivers over websockets.

use clap::Parser;
use ridewire_core::config::ConfigStore;
use ridewire_core::framework::Dispatcher;
use ridewire_core::processors::SearchTicker;
use ridewire_server::config::ConfigLoader;
use ridewire_server::server::{build_router, run_server};
use ridewire_server::shutdown::{shutdown_signal, spawn_config_reload_handler};
use ridewire_server::state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Ridewire - real-time ride dispatch server
#[derive(Parser, Debug)]
#[command(name = "ridewire-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./ridewire.toml", env = "RIDEWIRE_CONFIG")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long, env = "RIDEWIRE_LISTEN")]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, env = "RIDEWIRE_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_json);

    tracing::info!("Starting ridewire-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let dispatcher = Arc::new(Dispatcher::new(ConfigStore::new(loaded_config.dispatch)));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(dispatcher.clone(), loaded_config.server, shutdown_rx.clone());

    // Spawn the search ticker
    let ticker = tokio::spawn(SearchTicker::new(dispatcher).run(shutdown_rx));

    // Spawn config reload handler (listens for SIGHUP)
    let reload_handler = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr, async move {
        shutdown_signal().await;
        // Wake websocket tasks and the ticker before axum drains connections.
        let _ = shutdown_tx.send(true);
    })
    .await;

    if let Err(e) = ticker.await {
        tracing::warn!(error = %e, "SearchTicker task failed");
    }
    if let Err(e) = reload_handler.await {
        tracing::warn!(error = %e, "Config reload handler failed");
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
