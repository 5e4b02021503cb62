//! Signal handling for graceful shutdown and config reload.

use crate::config::ConfigLoader;
use crate::config::runtime::LoadedConfig;
use crate::state::AppState;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::task::JoinHandle;

/// Completes on the first SIGTERM or SIGINT (Ctrl+C).
pub async fn shutdown_signal() {
    let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    tracing::info!(signal = name, "Initiating graceful shutdown");
}

/// Reload the config file on every SIGHUP until the server shuts down.
///
/// A failed reload keeps the running configuration.
pub fn spawn_config_reload_handler(
    state: AppState,
    config_loader: Arc<ConfigLoader>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut sighup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        let mut shutdown_rx = state.shutdown_rx.clone();

        loop {
            tokio::select! {
                _ = sighup.recv() => {
                    tracing::info!("Received SIGHUP, reloading configuration");
                    match config_loader.reload() {
                        Ok(loaded) => apply_reload(&state, loaded).await,
                        Err(e) => tracing::error!(error = %e, "Failed to reload configuration"),
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Config reload handler stopped");
    })
}

/// Swap a freshly loaded configuration into the running server.
///
/// The dispatch section takes effect immediately. The listener keeps the
/// address it was bound with; a new one is only reported.
pub async fn apply_reload(state: &AppState, loaded: LoadedConfig) {
    if state.server.listen != loaded.server.listen {
        tracing::warn!(
            current = %state.server.listen,
            configured = %loaded.server.listen,
            "Listen address changes require a restart"
        );
    }

    let previous = state.dispatcher.config_store().replace(loaded.dispatch);
    let current = state.dispatcher.config();
    if previous == current {
        tracing::info!("Configuration reloaded, dispatch settings unchanged");
    } else {
        tracing::info!(
            search_radius_m = current.search_radius_m,
            max_search_attempts = current.max_search_attempts,
            "Configuration reloaded, dispatch settings updated"
        );
    }
}
