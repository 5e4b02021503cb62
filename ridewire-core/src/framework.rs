use ridewire_sdk::objects::{DriverId, ServerMessage, UserId};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::config::{ConfigStore, DispatchConfig};
use crate::entities::{ConnectionRegistry, PresenceStore, RideBook, SearchTable, SubscriptionTable};

/// Owner of all process-wide dispatch state.
///
/// One `Dispatcher` is built at startup and shared behind an `Arc` by the
/// websocket handlers, the message router and the search ticker. Every
/// command is handled by a `kanau` [`Processor`](kanau::processor::Processor)
/// implementation on this type (see [`crate::processors`]).
pub struct Dispatcher {
    pub registry: ConnectionRegistry,
    pub presence: PresenceStore,
    pub subscriptions: SubscriptionTable,
    pub rides: RideBook,
    pub searches: SearchTable,
    config: ConfigStore<DispatchConfig>,
}

/// Point-in-time counters exposed on `/stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStats {
    pub connected_drivers: usize,
    pub connected_riders: usize,
    pub tracked_drivers: usize,
    pub subscriptions: usize,
    pub active_rides: usize,
    pub active_searches: usize,
}

impl Dispatcher {
    pub fn new(config: ConfigStore<DispatchConfig>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            presence: PresenceStore::new(),
            subscriptions: SubscriptionTable::new(),
            rides: RideBook::new(),
            searches: SearchTable::new(),
            config,
        }
    }

    pub fn config_store(&self) -> &ConfigStore<DispatchConfig> {
        &self.config
    }

    /// Current dispatch configuration.
    pub fn config(&self) -> Arc<DispatchConfig> {
        self.config.current()
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            connected_drivers: self.registry.driver_count(),
            connected_riders: self.registry.rider_count(),
            tracked_drivers: self.presence.len(),
            subscriptions: self.subscriptions.len(),
            active_rides: self.rides.active_count(),
            active_searches: self.searches.len(),
        }
    }

    /// Queue a message for a rider if it is connected.
    pub fn notify_rider(&self, user_id: &UserId, message: ServerMessage) -> bool {
        match self.registry.resolve_rider(user_id) {
            Some(channel) => channel.deliver(message),
            None => {
                debug!(user_id = %user_id, kind = message.kind(), "Rider not connected, skipping");
                false
            }
        }
    }

    /// Queue a message for a driver if it is connected.
    pub fn notify_driver(&self, driver_id: &DriverId, message: ServerMessage) -> bool {
        match self.registry.resolve_driver(driver_id) {
            Some(channel) => channel.deliver(message),
            None => {
                debug!(driver_id = %driver_id, kind = message.kind(), "Driver not connected, skipping");
                false
            }
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(ConfigStore::new(DispatchConfig::default()))
    }
}
