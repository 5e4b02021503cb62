//! Runtime configuration for the dispatch core.
//!
//! The server crate parses the TOML file and builds a [`DispatchConfig`];
//! it is shared through a [`ConfigStore`] so a SIGHUP reload reaches the
//! search ticker and every new request without restarting.

mod config_store;

pub use config_store::{ConfigStore, ConfigWatcher};

use crate::events::DEFAULT_OUTBOUND_BUFFER;
use std::time::Duration;

/// Tunables of matching, retry and delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchConfig {
    /// Default proximity search radius in meters.
    pub search_radius_m: f64,
    /// Delay between two retry attempts of a search with no matches.
    pub retry_interval: Duration,
    /// Retry attempts after the immediate one before giving up.
    pub max_search_attempts: u32,
    /// Resolution of the ticker that advances retry searches.
    pub scheduler_tick: Duration,
    /// How long completed/cancelled rides are kept for late messages.
    pub terminal_retention: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Speed used to estimate pickup time when the driver gives none.
    pub average_speed_kmh: f64,
    /// Drop a driver's subscribers when it disconnects.
    pub prune_driver_subscriptions_on_disconnect: bool,
}

impl DispatchConfig {
    /// Hard backstop after which a search fails regardless of attempts.
    pub fn search_timeout(&self) -> Duration {
        self.retry_interval.saturating_mul(self.max_search_attempts)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            search_radius_m: 5_000.0,
            retry_interval: Duration::from_secs(5),
            max_search_attempts: 10,
            scheduler_tick: Duration::from_millis(250),
            terminal_retention: Duration::from_secs(600),
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            average_speed_kmh: 30.0,
            prune_driver_subscriptions_on_disconnect: false,
        }
    }
}
