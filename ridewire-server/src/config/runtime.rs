//! Runtime configuration built from the file configuration.

use ridewire_core::config::DispatchConfig;
use std::net::SocketAddr;

/// Runtime server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

/// Everything a (re)load produces.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub server: ServerConfig,
    pub dispatch: DispatchConfig,
}
