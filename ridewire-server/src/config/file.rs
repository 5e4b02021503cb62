//! TOML file configuration structures.
//!
//! These structs directly map to the `ridewire.toml` file format. Every
//! field has a default, so an empty file (or no file at all) is valid.

use ridewire_core::config::DispatchConfig as RuntimeDispatchConfig;
use serde::{Deserialize, Serialize};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 8080))
}

/// Matching, retry and delivery tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Default proximity search radius in meters.
    pub search_radius_m: f64,
    pub retry_interval_secs: u64,
    pub max_search_attempts: u32,
    pub scheduler_tick_ms: u64,
    /// How long finished rides are kept so late messages still resolve.
    pub terminal_retention_secs: u64,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Used for the pickup estimate when a driver sends none.
    pub average_speed_kmh: f64,
    pub prune_driver_subscriptions_on_disconnect: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self::from(&RuntimeDispatchConfig::default())
    }
}

impl From<&RuntimeDispatchConfig> for DispatchConfig {
    fn from(config: &RuntimeDispatchConfig) -> Self {
        Self {
            search_radius_m: config.search_radius_m,
            retry_interval_secs: config.retry_interval.as_secs(),
            max_search_attempts: config.max_search_attempts,
            scheduler_tick_ms: config.scheduler_tick.as_millis() as u64,
            terminal_retention_secs: config.terminal_retention.as_secs(),
            outbound_buffer: config.outbound_buffer,
            average_speed_kmh: config.average_speed_kmh,
            prune_driver_subscriptions_on_disconnect: config
                .prune_driver_subscriptions_on_disconnect,
        }
    }
}

impl DispatchConfig {
    pub fn to_runtime(&self) -> RuntimeDispatchConfig {
        RuntimeDispatchConfig {
            search_radius_m: self.search_radius_m,
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            max_search_attempts: self.max_search_attempts,
            scheduler_tick: Duration::from_millis(self.scheduler_tick_ms),
            terminal_retention: Duration::from_secs(self.terminal_retention_secs),
            outbound_buffer: self.outbound_buffer,
            average_speed_kmh: self.average_speed_kmh,
            prune_driver_subscriptions_on_disconnect: self
                .prune_driver_subscriptions_on_disconnect,
        }
    }
}
