//! Ride lifecycle commands.
//!
//! Guards are evaluated inside [`RideBook::update`](crate::entities::RideBook::update)
//! so they hold for the write that follows; messages are queued only after
//! the ride entry is unlocked.

use kanau::processor::Processor;
use ridewire_sdk::objects::{DriverId, DriverStatus, RequestId, RideStatus, ServerMessage, UserId};
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info};

use super::DispatchError;
use super::matcher::{Candidate, search};
use crate::entities::{RetrySearch, RideEvent, RideRequest};
use crate::events::{
    AcceptRide, BookRide, CancelRide, CompleteRide, RejectRide, RequestRide, StartRide,
};
use crate::framework::Dispatcher;
use crate::utils::geo::{eta_minutes, haversine_m};

fn invalid(request_id: RequestId) -> impl FnOnce(crate::entities::InvalidTransition) -> DispatchError {
    move |source| DispatchError::InvalidTransition { request_id, source }
}

impl Processor<RequestRide> for Dispatcher {
    type Output = RequestId;
    type Error = DispatchError;

    async fn process(&self, event: RequestRide) -> Result<RequestId, DispatchError> {
        let origin = event.pickup.coordinates();
        let destination_valid = event
            .destination
            .as_ref()
            .is_none_or(|place| place.coordinates().is_valid());
        if !origin.is_valid() || !destination_valid {
            return Err(DispatchError::InvalidCoordinates);
        }

        let config = self.config();
        let radius_m = event
            .radius_m
            .filter(|radius| radius.is_finite() && *radius > 0.0)
            .unwrap_or(config.search_radius_m);

        let request_id = RequestId::generate();
        self.rides.insert(RideRequest::new(
            request_id,
            event.user_id.clone(),
            event.user_name,
            event.pickup,
            event.destination,
        ));
        info!(
            request_id = %request_id,
            user_id = %event.user_id,
            radius_m,
            "Ride requested"
        );
        event.origin.deliver(ServerMessage::RideStatusUpdate {
            request_id,
            ride_id: None,
            status: RideStatus::Pending,
        });

        let candidates = search(&self.presence, origin, radius_m);
        if candidates.is_empty() {
            self.searches.start(RetrySearch::new(
                request_id,
                event.user_id,
                origin,
                radius_m,
                &config,
                Instant::now(),
            ));
            // The rider may have gone away while the search was being set up.
            let still_open = self
                .rides
                .get(&request_id)
                .is_some_and(|ride| !ride.is_terminal());
            if !still_open {
                self.searches.cancel(&request_id);
            }
            debug!(request_id = %request_id, "No drivers nearby, scheduled retry search");
        } else {
            event.origin.deliver(ServerMessage::NearbyDrivers {
                request_id,
                drivers: candidates.iter().map(Candidate::to_wire).collect(),
            });
        }

        Ok(request_id)
    }
}

impl Processor<BookRide> for Dispatcher {
    type Output = ();
    type Error = DispatchError;

    async fn process(&self, event: BookRide) -> Result<(), DispatchError> {
        let request_id = event.request_id;
        let driver_id = event.driver_id;
        let now = Instant::now();

        let (offer, replaced) = self
            .rides
            .update(&request_id, |ride| {
                if ride.rider_id != event.user_id {
                    return Err(DispatchError::Unauthorized(request_id));
                }
                ride.check(RideEvent::Book).map_err(invalid(request_id))?;
                if ride.declined_by.contains(&driver_id) {
                    return Err(DispatchError::DriverDeclined {
                        request_id,
                        driver_id: driver_id.clone(),
                    });
                }
                if self.presence.status(&driver_id) != Some(DriverStatus::Available) {
                    return Err(DispatchError::DriverNotAvailable {
                        request_id,
                        driver_id: driver_id.clone(),
                    });
                }
                if self.registry.resolve_driver(&driver_id).is_none() {
                    return Err(DispatchError::DriverNotConnected {
                        request_id,
                        driver_id: driver_id.clone(),
                    });
                }

                ride.apply(RideEvent::Book, now).map_err(invalid(request_id))?;
                self.searches.cancel(&request_id);
                ride.fare = Some(event.fare);
                ride.distance = Some(event.distance);
                if event.destination.is_some() {
                    ride.destination = event.destination;
                }
                let replaced = ride
                    .driver_id
                    .replace(driver_id.clone())
                    .filter(|previous| *previous != driver_id);

                let offer = ServerMessage::RideRequest {
                    request_id,
                    user_id: ride.rider_id.clone(),
                    user_name: ride.rider_name.clone(),
                    pickup_location: ride.pickup.clone(),
                    destination: ride.destination.clone(),
                    distance: event.distance,
                    fare: event.fare,
                };
                Ok((offer, replaced))
            })
            .ok_or(DispatchError::RideNotFound(request_id))??;

        info!(request_id = %request_id, driver_id = %driver_id, "Ride booked");

        if let Some(previous) = replaced {
            self.notify_driver(
                &previous,
                ServerMessage::RideCancelled {
                    request_id,
                    message: "ride was booked with another driver".into(),
                },
            );
        }
        self.notify_driver(&driver_id, offer);
        event.origin.deliver(ServerMessage::RequestSent {
            request_id,
            driver_id,
        });
        Ok(())
    }
}

impl Processor<AcceptRide> for Dispatcher {
    type Output = ();
    type Error = DispatchError;

    async fn process(&self, event: AcceptRide) -> Result<(), DispatchError> {
        let request_id = event.request_id;
        let driver_id = event.driver_id;
        let speed_kmh = self.config().average_speed_kmh;
        let now = Instant::now();

        let (rider_id, accepted) = self
            .rides
            .update(&request_id, |ride| {
                if !ride.is_assigned_to(&driver_id) {
                    return Err(DispatchError::Unauthorized(request_id));
                }
                ride.check(RideEvent::Accept).map_err(invalid(request_id))?;
                let presence = self.presence.claim(&driver_id, request_id).ok_or_else(|| {
                    DispatchError::DriverNotAvailable {
                        request_id,
                        driver_id: driver_id.clone(),
                    }
                })?;
                ride.apply(RideEvent::Accept, now).map_err(invalid(request_id))?;

                let estimated_arrival = event.estimated_arrival.or_else(|| {
                    eta_minutes(
                        haversine_m(presence.coordinates, ride.pickup.coordinates()),
                        speed_kmh,
                    )
                });
                let accepted = ServerMessage::RideAccepted {
                    request_id,
                    driver_id: driver_id.clone(),
                    driver_name: event.driver_name,
                    estimated_arrival,
                    driver_location: Some(presence.view()),
                };
                Ok((ride.rider_id.clone(), accepted))
            })
            .ok_or(DispatchError::RideNotFound(request_id))??;

        info!(request_id = %request_id, driver_id = %driver_id, "Ride accepted");
        self.notify_rider(&rider_id, accepted);
        Ok(())
    }
}

impl Processor<RejectRide> for Dispatcher {
    type Output = ();
    type Error = DispatchError;

    async fn process(&self, event: RejectRide) -> Result<(), DispatchError> {
        let request_id = event.request_id;
        let driver_id = event.driver_id;
        let now = Instant::now();

        let rider_id = self
            .rides
            .update(&request_id, |ride| {
                if !ride.is_assigned_to(&driver_id) {
                    return Err(DispatchError::Unauthorized(request_id));
                }
                ride.apply(RideEvent::Reject, now).map_err(invalid(request_id))?;
                ride.declined_by.insert(driver_id.clone());
                ride.driver_id = None;
                Ok(ride.rider_id.clone())
            })
            .ok_or(DispatchError::RideNotFound(request_id))??;

        info!(request_id = %request_id, driver_id = %driver_id, "Ride rejected");
        self.notify_rider(
            &rider_id,
            ServerMessage::RideRejected {
                request_id,
                driver_id,
                message: "driver declined the ride".into(),
            },
        );
        Ok(())
    }
}

impl Processor<StartRide> for Dispatcher {
    type Output = ();
    type Error = DispatchError;

    async fn process(&self, event: StartRide) -> Result<(), DispatchError> {
        let request_id = event.request_id;
        let now = Instant::now();

        let rider_id = self
            .rides
            .update(&request_id, |ride| {
                if !ride.is_assigned_to(&event.driver_id) {
                    return Err(DispatchError::Unauthorized(request_id));
                }
                ride.apply(RideEvent::Start, now).map_err(invalid(request_id))?;
                ride.ride_id = Some(event.ride_id.clone());
                Ok(ride.rider_id.clone())
            })
            .ok_or(DispatchError::RideNotFound(request_id))??;

        info!(request_id = %request_id, ride_id = %event.ride_id, "Ride started");
        self.notify_rider(
            &rider_id,
            ServerMessage::RideStatusUpdate {
                request_id,
                ride_id: Some(event.ride_id),
                status: RideStatus::InProgress,
            },
        );
        Ok(())
    }
}

impl Processor<CompleteRide> for Dispatcher {
    type Output = ();
    type Error = DispatchError;

    async fn process(&self, event: CompleteRide) -> Result<(), DispatchError> {
        let request_id = event.request_id;
        let driver_id = event.driver_id;
        let now = Instant::now();

        let (rider_id, fare, created_at) = self
            .rides
            .update(&request_id, |ride| {
                if !ride.is_assigned_to(&driver_id) {
                    return Err(DispatchError::Unauthorized(request_id));
                }
                ride.apply(RideEvent::Complete, now).map_err(invalid(request_id))?;
                ride.ride_id = Some(event.ride_id.clone());
                if event.fare.is_some() {
                    ride.fare = event.fare;
                }
                self.presence.release(&driver_id, request_id);
                Ok((ride.rider_id.clone(), ride.fare, ride.created_at))
            })
            .ok_or(DispatchError::RideNotFound(request_id))??;

        info!(
            request_id = %request_id,
            driver_id = %driver_id,
            duration_secs = (OffsetDateTime::now_utc() - created_at).whole_seconds(),
            "Ride completed"
        );
        self.notify_rider(
            &rider_id,
            ServerMessage::RideCompleted {
                request_id,
                ride_id: Some(event.ride_id),
                fare,
            },
        );
        Ok(())
    }
}

impl Processor<CancelRide> for Dispatcher {
    type Output = ();
    type Error = DispatchError;

    async fn process(&self, event: CancelRide) -> Result<(), DispatchError> {
        let request_id = event.request_id;
        let now = Instant::now();

        let notified: Option<DriverId> = self
            .rides
            .update(&request_id, |ride| {
                if ride.rider_id != event.user_id {
                    return Err(DispatchError::Unauthorized(request_id));
                }
                ride.apply(RideEvent::Cancel, now).map_err(invalid(request_id))?;
                self.searches.cancel(&request_id);
                if let Some(driver_id) = &ride.driver_id {
                    self.presence.release(driver_id, request_id);
                }
                Ok(ride.driver_id.clone().or(event.driver_id))
            })
            .ok_or(DispatchError::RideNotFound(request_id))??;

        info!(request_id = %request_id, user_id = %event.user_id, "Ride cancelled by rider");

        if let Some(driver_id) = notified {
            self.notify_driver(
                &driver_id,
                ServerMessage::RideCancelled {
                    request_id,
                    message: "ride cancelled by rider".into(),
                },
            );
        }
        unsubscribe_rider(self, &event.user_id);
        event.origin.deliver(ServerMessage::RideStatusUpdate {
            request_id,
            ride_id: None,
            status: RideStatus::Cancelled,
        });
        Ok(())
    }
}

pub(super) fn unsubscribe_rider(dispatcher: &Dispatcher, user_id: &UserId) {
    let removed = dispatcher.subscriptions.remove_rider(user_id);
    if removed > 0 {
        debug!(user_id = %user_id, removed, "Dropped rider subscriptions");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::testing::*;
    use ridewire_sdk::objects::{Coordinates, Place};
    use rust_decimal::Decimal;

    fn request(peer: &Peer, user: &str) -> RequestRide {
        RequestRide {
            origin: peer.handle.clone(),
            user_id: UserId::from(user),
            user_name: format!("{user} name"),
            pickup: Place {
                latitude: 10.0,
                longitude: 10.0001,
                name: Some("Station".into()),
            },
            destination: None,
            radius_m: None,
        }
    }

    fn book(peer: &Peer, user: &str, request_id: RequestId, driver: &str) -> BookRide {
        BookRide {
            origin: peer.handle.clone(),
            user_id: UserId::from(user),
            request_id,
            driver_id: DriverId::from(driver),
            fare: Decimal::new(1250, 2),
            distance: 3_200.0,
            destination: None,
        }
    }

    fn accept(driver: &str, request_id: RequestId) -> AcceptRide {
        AcceptRide {
            driver_id: DriverId::from(driver),
            request_id,
            driver_name: Some("Bob".into()),
            estimated_arrival: None,
        }
    }

    fn status(dispatcher: &Dispatcher, request_id: RequestId) -> RideStatus {
        dispatcher.rides.get(&request_id).unwrap().status
    }

    #[tokio::test]
    async fn test_request_ride_finds_nearby_driver() {
        let dispatcher = dispatcher();
        place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
        let mut rider = connect_rider(&dispatcher, "u1");

        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();

        let messages = rider.drain();
        assert_eq!(messages.len(), 2);
        assert_eq!(
            messages[0],
            ServerMessage::RideStatusUpdate {
                request_id,
                ride_id: None,
                status: RideStatus::Pending,
            }
        );
        let ServerMessage::NearbyDrivers { drivers, .. } = &messages[1] else {
            panic!("unexpected {messages:?}");
        };
        assert_eq!(drivers.len(), 1);
        assert_eq!(drivers[0].driver_id, DriverId::from("d1"));
        assert!((drivers[0].distance - 10.95).abs() < 0.05);
        assert!(!dispatcher.searches.is_active(&request_id));
    }

    #[tokio::test]
    async fn test_request_ride_without_drivers_schedules_search() {
        let dispatcher = dispatcher();
        let mut rider = connect_rider(&dispatcher, "u1");

        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
        assert!(dispatcher.searches.is_active(&request_id));
        assert_eq!(rider.drain().len(), 1);
    }

    #[tokio::test]
    async fn test_request_ride_rejects_invalid_pickup() {
        let dispatcher = dispatcher();
        let rider = connect_rider(&dispatcher, "u1");
        let mut cmd = request(&rider, "u1");
        cmd.pickup.latitude = 123.0;

        let err = dispatcher.process(cmd).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid coordinates");
        assert!(dispatcher.rides.is_empty());
    }

    #[tokio::test]
    async fn test_full_ride_releases_driver() {
        let dispatcher = dispatcher();
        place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
        let mut rider = connect_rider(&dispatcher, "u1");
        let mut driver = connect_driver(&dispatcher, "d1");
        let d1 = DriverId::from("d1");

        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
        dispatcher
            .process(book(&rider, "u1", request_id, "d1"))
            .await
            .unwrap();
        assert!(matches!(
            driver.drain().as_slice(),
            [ServerMessage::RideRequest { .. }]
        ));

        dispatcher.process(accept("d1", request_id)).await.unwrap();
        assert_eq!(dispatcher.presence.status(&d1), Some(DriverStatus::Busy));
        assert_eq!(status(&dispatcher, request_id), RideStatus::Accepted);

        dispatcher
            .process(StartRide {
                driver_id: d1.clone(),
                request_id,
                ride_id: "ride-1".into(),
            })
            .await
            .unwrap();
        dispatcher
            .process(CompleteRide {
                driver_id: d1.clone(),
                request_id,
                ride_id: "ride-1".into(),
                fare: None,
            })
            .await
            .unwrap();

        assert_eq!(status(&dispatcher, request_id), RideStatus::Completed);
        assert_eq!(dispatcher.presence.status(&d1), Some(DriverStatus::Available));

        let messages = rider.drain();
        let kinds: Vec<_> = messages.iter().map(ServerMessage::kind).collect();
        assert_eq!(
            kinds,
            vec![
                "rideStatusUpdate",
                "nearbyDrivers",
                "requestSent",
                "rideAccepted",
                "rideStatusUpdate",
                "rideCompleted",
            ]
        );
        let ServerMessage::RideAccepted {
            estimated_arrival,
            driver_location,
            ..
        } = &messages[3]
        else {
            panic!("unexpected {messages:?}");
        };
        assert_eq!(*estimated_arrival, Some(1));
        assert_eq!(driver_location.as_ref().unwrap().status, DriverStatus::Busy);
        assert_eq!(
            messages[5],
            ServerMessage::RideCompleted {
                request_id,
                ride_id: Some("ride-1".into()),
                fare: Some(Decimal::new(1250, 2)),
            }
        );
    }

    #[tokio::test]
    async fn test_busy_driver_cannot_be_booked_by_second_rider() {
        let dispatcher = dispatcher();
        place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
        let _driver = connect_driver(&dispatcher, "d1");
        let first = connect_rider(&dispatcher, "u1");
        let second = connect_rider(&dispatcher, "u2");

        let ride_one = dispatcher.process(request(&first, "u1")).await.unwrap();
        let ride_two = dispatcher.process(request(&second, "u2")).await.unwrap();
        dispatcher
            .process(book(&first, "u1", ride_one, "d1"))
            .await
            .unwrap();
        dispatcher.process(accept("d1", ride_one)).await.unwrap();

        let err = dispatcher
            .process(book(&second, "u2", ride_two, "d1"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "driver not available");
        assert_eq!(err.request_id(), Some(ride_two));
        // The failed booking leaves the request open for another driver.
        assert_eq!(status(&dispatcher, ride_two), RideStatus::Pending);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accept_and_reject_settle_once() {
        let d1 = DriverId::from("d1");
        for _ in 0..50 {
            let dispatcher = dispatcher();
            place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
            let _driver = connect_driver(&dispatcher, "d1");
            let rider = connect_rider(&dispatcher, "u1");
            let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
            dispatcher
                .process(book(&rider, "u1", request_id, "d1"))
                .await
                .unwrap();

            let accepting = tokio::spawn({
                let dispatcher = dispatcher.clone();
                async move { dispatcher.process(accept("d1", request_id)).await }
            });
            let rejecting = tokio::spawn({
                let dispatcher = dispatcher.clone();
                let driver_id = d1.clone();
                async move {
                    dispatcher
                        .process(RejectRide {
                            driver_id,
                            request_id,
                        })
                        .await
                }
            });
            let accepted = accepting.await.unwrap();
            let rejected = rejecting.await.unwrap();

            match (&accepted, &rejected) {
                (Ok(()), Err(err)) => {
                    assert!(matches!(err, DispatchError::InvalidTransition { .. }), "{err:?}");
                }
                (Err(err), Ok(())) => {
                    assert!(matches!(err, DispatchError::Unauthorized(_)), "{err:?}");
                }
                other => panic!("expected exactly one winner, got {other:?}"),
            }

            let ride = dispatcher.rides.get(&request_id).unwrap();
            let busy = dispatcher.presence.status(&d1) == Some(DriverStatus::Busy);
            assert_eq!(busy, ride.status == RideStatus::Accepted);
            assert_eq!(ride.driver_id.is_some(), accepted.is_ok());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_driver_accepts_only_one_of_two_concurrent_bookings() {
        let d1 = DriverId::from("d1");
        for _ in 0..50 {
            let dispatcher = dispatcher();
            place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
            let _driver = connect_driver(&dispatcher, "d1");
            let first = connect_rider(&dispatcher, "u1");
            let second = connect_rider(&dispatcher, "u2");
            let ride_one = dispatcher.process(request(&first, "u1")).await.unwrap();
            let ride_two = dispatcher.process(request(&second, "u2")).await.unwrap();

            let bookings = [
                tokio::spawn({
                    let dispatcher = dispatcher.clone();
                    let cmd = book(&first, "u1", ride_one, "d1");
                    async move { dispatcher.process(cmd).await }
                }),
                tokio::spawn({
                    let dispatcher = dispatcher.clone();
                    let cmd = book(&second, "u2", ride_two, "d1");
                    async move { dispatcher.process(cmd).await }
                }),
            ];
            for booking in bookings {
                booking.await.unwrap().unwrap();
            }

            let accepts = [ride_one, ride_two].map(|request_id| {
                let dispatcher = dispatcher.clone();
                tokio::spawn(async move { dispatcher.process(accept("d1", request_id)).await })
            });
            let mut outcomes = Vec::new();
            for accepting in accepts {
                outcomes.push(accepting.await.unwrap());
            }

            let winners = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
            assert_eq!(winners, 1, "{outcomes:?}");
            let loser = outcomes.into_iter().find_map(Result::err).unwrap();
            assert!(
                matches!(loser, DispatchError::DriverNotAvailable { .. }),
                "{loser:?}"
            );

            let accepted: Vec<_> = [ride_one, ride_two]
                .into_iter()
                .filter(|id| status(&dispatcher, *id) == RideStatus::Accepted)
                .collect();
            assert_eq!(accepted.len(), 1);
            assert_eq!(dispatcher.presence.status(&d1), Some(DriverStatus::Busy));
            assert_eq!(
                dispatcher.presence.get(&d1).unwrap().engaged_in,
                Some(accepted[0])
            );
        }
    }

    #[tokio::test]
    async fn test_accept_requires_the_offered_driver() {
        let dispatcher = dispatcher();
        place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
        let _driver = connect_driver(&dispatcher, "d1");
        let rider = connect_rider(&dispatcher, "u1");

        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
        let err = dispatcher.process(accept("d1", request_id)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized(_)));

        dispatcher
            .process(book(&rider, "u1", request_id, "d1"))
            .await
            .unwrap();
        let err = dispatcher.process(accept("d2", request_id)).await.unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized(_)));
        assert_eq!(status(&dispatcher, request_id), RideStatus::Pending);
    }

    #[tokio::test]
    async fn test_reject_then_rebook_another_driver() {
        let dispatcher = dispatcher();
        place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
        place_driver(&dispatcher, "d2", Coordinates::new(10.0, 10.0002));
        let _d1 = connect_driver(&dispatcher, "d1");
        let mut d2 = connect_driver(&dispatcher, "d2");
        let mut rider = connect_rider(&dispatcher, "u1");

        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
        dispatcher
            .process(book(&rider, "u1", request_id, "d1"))
            .await
            .unwrap();
        dispatcher
            .process(RejectRide {
                driver_id: DriverId::from("d1"),
                request_id,
            })
            .await
            .unwrap();
        assert_eq!(status(&dispatcher, request_id), RideStatus::Rejected);
        assert!(rider
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::RideRejected { .. })));

        let err = dispatcher
            .process(book(&rider, "u1", request_id, "d1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::DriverDeclined { .. }));

        dispatcher
            .process(book(&rider, "u1", request_id, "d2"))
            .await
            .unwrap();
        assert_eq!(status(&dispatcher, request_id), RideStatus::Pending);
        assert!(matches!(
            d2.drain().as_slice(),
            [ServerMessage::RideRequest { .. }]
        ));
    }

    #[tokio::test]
    async fn test_start_before_accept_is_refused() {
        let dispatcher = dispatcher();
        place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
        let _driver = connect_driver(&dispatcher, "d1");
        let rider = connect_rider(&dispatcher, "u1");

        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
        dispatcher
            .process(book(&rider, "u1", request_id, "d1"))
            .await
            .unwrap();
        let err = dispatcher
            .process(StartRide {
                driver_id: DriverId::from("d1"),
                request_id,
                ride_id: "ride-1".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unauthorized transition: cannot start a ride that is pending"
        );
        assert_eq!(status(&dispatcher, request_id), RideStatus::Pending);
    }

    #[tokio::test]
    async fn test_cancel_booked_ride_notifies_driver() {
        let dispatcher = dispatcher();
        place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
        let mut driver = connect_driver(&dispatcher, "d1");
        let mut rider = connect_rider(&dispatcher, "u1");
        dispatcher
            .subscriptions
            .subscribe(UserId::from("u1"), DriverId::from("d1"));

        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
        dispatcher
            .process(book(&rider, "u1", request_id, "d1"))
            .await
            .unwrap();
        driver.drain();
        rider.drain();

        dispatcher
            .process(CancelRide {
                origin: rider.handle.clone(),
                user_id: UserId::from("u1"),
                request_id,
                driver_id: None,
            })
            .await
            .unwrap();

        assert_eq!(status(&dispatcher, request_id), RideStatus::Cancelled);
        assert_eq!(
            dispatcher.presence.status(&DriverId::from("d1")),
            Some(DriverStatus::Available)
        );
        assert!(matches!(
            driver.drain().as_slice(),
            [ServerMessage::RideCancelled { .. }]
        ));
        assert_eq!(
            rider.drain(),
            vec![ServerMessage::RideStatusUpdate {
                request_id,
                ride_id: None,
                status: RideStatus::Cancelled,
            }]
        );
        assert!(dispatcher.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_accepted_ride_releases_driver() {
        let dispatcher = dispatcher();
        place_driver(&dispatcher, "d1", Coordinates::new(10.0, 10.0));
        let _driver = connect_driver(&dispatcher, "d1");
        let rider = connect_rider(&dispatcher, "u1");

        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
        dispatcher
            .process(book(&rider, "u1", request_id, "d1"))
            .await
            .unwrap();
        dispatcher.process(accept("d1", request_id)).await.unwrap();

        dispatcher
            .process(CancelRide {
                origin: rider.handle.clone(),
                user_id: UserId::from("u1"),
                request_id,
                driver_id: None,
            })
            .await
            .unwrap();
        assert_eq!(
            dispatcher.presence.status(&DriverId::from("d1")),
            Some(DriverStatus::Available)
        );
    }

    #[tokio::test]
    async fn test_cancel_stops_pending_search() {
        let dispatcher = dispatcher();
        let rider = connect_rider(&dispatcher, "u1");
        let request_id = dispatcher.process(request(&rider, "u1")).await.unwrap();
        assert!(dispatcher.searches.is_active(&request_id));

        dispatcher
            .process(CancelRide {
                origin: rider.handle.clone(),
                user_id: UserId::from("u1"),
                request_id,
                driver_id: None,
            })
            .await
            .unwrap();
        assert!(!dispatcher.searches.is_active(&request_id));
    }

    #[tokio::test]
    async fn test_only_the_owner_may_cancel() {
        let dispatcher = dispatcher();
        let owner = connect_rider(&dispatcher, "u1");
        let other = connect_rider(&dispatcher, "u2");
        let request_id = dispatcher.process(request(&owner, "u1")).await.unwrap();

        let err = dispatcher
            .process(CancelRide {
                origin: other.handle.clone(),
                user_id: UserId::from("u2"),
                request_id,
                driver_id: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unauthorized(_)));
        assert_eq!(status(&dispatcher, request_id), RideStatus::Pending);
    }

    #[tokio::test]
    async fn test_unknown_ride() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .process(accept("d1", RequestId::generate()))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "ride not found");
    }
}
