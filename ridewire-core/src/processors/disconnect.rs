//! Cleanup when a socket closes.

use kanau::processor::Processor;
use ridewire_sdk::objects::{DriverId, ServerMessage, UserId};
use std::convert::Infallible;
use tokio::time::Instant;
use tracing::{debug, info};

use super::lifecycle::unsubscribe_rider;
use crate::entities::{Identity, RideEvent};
use crate::events::ConnectionClosed;
use crate::framework::Dispatcher;

impl Processor<ConnectionClosed> for Dispatcher {
    /// Identity the closed connection held, if it still owned one.
    type Output = Option<Identity>;
    type Error = Infallible;

    async fn process(&self, event: ConnectionClosed) -> Result<Option<Identity>, Infallible> {
        let Some(identity) = self.registry.unbind(event.connection) else {
            debug!(connection = %event.connection, "Closed connection held no binding");
            return Ok(None);
        };

        let cancelled = match &identity {
            Identity::Rider(user_id) => self.rider_gone(user_id),
            Identity::Driver(driver_id) => {
                let prune = self.config().prune_driver_subscriptions_on_disconnect;
                self.driver_gone(driver_id, prune)
            }
        };

        info!(
            connection = %event.connection,
            %identity,
            cancelled,
            "Connection closed"
        );
        Ok(Some(identity))
    }
}

impl Dispatcher {
    fn rider_gone(&self, user_id: &UserId) -> usize {
        unsubscribe_rider(self, user_id);
        let now = Instant::now();
        let mut cancelled = 0;

        for request_id in self.rides.open_for_rider(user_id) {
            let outcome = self.rides.update(&request_id, |ride| {
                ride.apply(RideEvent::PeerDisconnected, now).ok()?;
                self.searches.cancel(&request_id);
                if let Some(driver_id) = &ride.driver_id {
                    self.presence.release(driver_id, request_id);
                }
                Some(ride.driver_id.clone())
            });
            let Some(Some(driver)) = outcome else {
                continue;
            };
            cancelled += 1;

            if let Some(driver_id) = driver {
                self.notify_driver(
                    &driver_id,
                    ServerMessage::RideCancelled {
                        request_id,
                        message: "rider disconnected".into(),
                    },
                );
            }
        }
        cancelled
    }

    fn driver_gone(&self, driver_id: &DriverId, prune_subscriptions: bool) -> usize {
        self.presence.mark_offline(driver_id);
        if prune_subscriptions {
            let removed = self.subscriptions.remove_driver(driver_id);
            debug!(driver_id = %driver_id, removed, "Dropped driver subscribers");
        }

        let now = Instant::now();
        let mut cancelled = 0;

        for request_id in self.rides.open_for_driver(driver_id) {
            let rider = self
                .rides
                .update(&request_id, |ride| {
                    if !ride.is_assigned_to(driver_id) {
                        return None;
                    }
                    ride.apply(RideEvent::PeerDisconnected, now).ok()?;
                    self.searches.cancel(&request_id);
                    Some(ride.rider_id.clone())
                })
                .flatten();
            let Some(rider_id) = rider else {
                continue;
            };
            cancelled += 1;

            self.notify_rider(
                &rider_id,
                ServerMessage::RideCancelled {
                    request_id,
                    message: "driver disconnected".into(),
                },
            );
        }
        cancelled
    }
}
