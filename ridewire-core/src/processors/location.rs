//! Location updates and subscriptions.

use kanau::processor::Processor;
use ridewire_sdk::objects::{Coordinates, ServerMessage};
use tracing::{debug, instrument};

use super::DispatchError;
use crate::events::{SubscribeToDriver, UpdateLocation};
use crate::framework::Dispatcher;

impl Processor<UpdateLocation> for Dispatcher {
    /// Number of subscribers the update was queued for.
    type Output = usize;
    type Error = DispatchError;

    #[instrument(skip_all, fields(driver_id = %event.driver_id))]
    async fn process(&self, event: UpdateLocation) -> Result<usize, DispatchError> {
        let coordinates = Coordinates::new(event.data.latitude, event.data.longitude);
        if !coordinates.is_valid() {
            return Err(DispatchError::InvalidCoordinates);
        }

        let presence = self.presence.upsert(
            &event.driver_id,
            coordinates,
            event.data.heading,
            event.data.status,
        );

        let view = presence.view();
        let delivered = self
            .subscriptions
            .subscribers_of(&event.driver_id)
            .iter()
            .filter_map(|user_id| self.registry.resolve_rider(user_id))
            .filter(|channel| channel.deliver(ServerMessage::DriverLocationUpdate(view.clone())))
            .count();

        debug!(status = %presence.status, delivered, "Location updated");
        Ok(delivered)
    }
}

impl Processor<SubscribeToDriver> for Dispatcher {
    /// Whether a current position was pushed right away.
    type Output = bool;
    type Error = DispatchError;

    async fn process(&self, event: SubscribeToDriver) -> Result<bool, DispatchError> {
        let added = self
            .subscriptions
            .subscribe(event.user_id.clone(), event.driver_id.clone());
        debug!(
            user_id = %event.user_id,
            driver_id = %event.driver_id,
            added,
            "Subscribed to driver location"
        );

        Ok(match self.presence.get(&event.driver_id) {
            Some(presence) => event
                .origin
                .deliver(ServerMessage::DriverLocationUpdate(presence.view())),
            None => false,
        })
    }
}
