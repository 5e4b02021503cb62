//! Connection registry: identity ↔ live channel.
//!
//! One binding per identity; a later connect from the same identity
//! replaces the earlier handle. A channel is bound under at most one
//! identity at a time. Lookups that miss return `None`, never an error.

use dashmap::DashMap;
use ridewire_sdk::objects::{DriverId, Role, UserId};
use tracing::debug;

use crate::events::{ChannelHandle, ConnectionId};

/// Who holds a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Driver(DriverId),
    Rider(UserId),
}

impl Identity {
    pub fn role(&self) -> Role {
        match self {
            Identity::Driver(_) => Role::Driver,
            Identity::Rider(_) => Role::User,
        }
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Identity::Driver(id) => write!(f, "driver:{id}"),
            Identity::Rider(id) => write!(f, "user:{id}"),
        }
    }
}

#[derive(Default)]
pub struct ConnectionRegistry {
    drivers: DashMap<DriverId, ChannelHandle>,
    riders: DashMap<UserId, ChannelHandle>,
    connections: DashMap<ConnectionId, Identity>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `channel` under `identity`.
    ///
    /// Returns the handle of a *different* connection that was bound to the
    /// same identity and has now been replaced.
    pub fn bind(&self, identity: Identity, channel: ChannelHandle) -> Option<ChannelHandle> {
        let connection = channel.id();

        if let Some(previous) = self.connections.insert(connection, identity.clone()) {
            if previous != identity {
                self.remove_binding(&previous, connection);
            }
        }

        let replaced = match &identity {
            Identity::Driver(id) => self.drivers.insert(id.clone(), channel),
            Identity::Rider(id) => self.riders.insert(id.clone(), channel),
        }
        .filter(|old| old.id() != connection);

        if let Some(old) = &replaced {
            // The replaced connection keeps its socket but owns no identity.
            self.connections
                .remove_if(&old.id(), |_, bound| *bound == identity);
            debug!(%identity, old = %old.id(), new = %connection, "Binding replaced");
        }

        replaced
    }

    pub fn resolve_driver(&self, driver_id: &DriverId) -> Option<ChannelHandle> {
        self.drivers.get(driver_id).map(|handle| handle.value().clone())
    }

    pub fn resolve_rider(&self, user_id: &UserId) -> Option<ChannelHandle> {
        self.riders.get(user_id).map(|handle| handle.value().clone())
    }

    pub fn identity_of(&self, connection: ConnectionId) -> Option<Identity> {
        self.connections
            .get(&connection)
            .map(|identity| identity.value().clone())
    }

    /// Remove the binding owned by a closed connection.
    ///
    /// Returns the identity only if this connection still owned it; a
    /// connection whose identity was taken over by a newer one yields `None`.
    pub fn unbind(&self, connection: ConnectionId) -> Option<Identity> {
        let (_, identity) = self.connections.remove(&connection)?;
        self.remove_binding(&identity, connection)
            .then_some(identity)
    }

    pub fn driver_count(&self) -> usize {
        self.drivers.len()
    }

    pub fn rider_count(&self) -> usize {
        self.riders.len()
    }

    fn remove_binding(&self, identity: &Identity, connection: ConnectionId) -> bool {
        match identity {
            Identity::Driver(id) => self
                .drivers
                .remove_if(id, |_, handle| handle.id() == connection)
                .is_some(),
            Identity::Rider(id) => self
                .riders
                .remove_if(id, |_, handle| handle.id() == connection)
                .is_some(),
        }
    }
}
