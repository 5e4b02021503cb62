//! Application state shared across all request handlers.

use crate::config::runtime::ServerConfig;
use ridewire_core::framework::Dispatcher;
use ridewire_core::processors::MessageRouter;
use std::sync::Arc;
use tokio::sync::watch;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Dispatch core shared with the search ticker.
    pub dispatcher: Arc<Dispatcher>,
    /// Routes inbound websocket frames into the dispatcher.
    pub router: MessageRouter,
    /// Server section the listener was bound with.
    pub server: ServerConfig,
    /// Flips to `true` when the server starts shutting down.
    pub shutdown_rx: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        server: ServerConfig,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            router: MessageRouter::new(dispatcher.clone()),
            dispatcher,
            server,
            shutdown_rx,
        }
    }
}
