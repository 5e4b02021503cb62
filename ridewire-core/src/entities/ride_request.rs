//! Ride requests and their lifecycle state machine.
//!
//! ```text
//!             book            accept           start
//!   ┌──────┐ ─────► pending ─────────► accepted ─────► in_progress
//!   │      │          │  ▲                 │                │
//!   │      │   reject │  │ book            │ complete       │ complete
//!   │      │          ▼  │                 ▼                ▼
//!   │      └────── rejected            completed ◄──────────┘
//!   │
//!   └─ cancel / disconnect / search exhausted ─► cancelled
//! ```
//!
//! `completed` and `cancelled` are terminal. Every mutation goes through
//! [`RideRequest::apply`], which consults [`transition`] and refuses events
//! the current state does not allow, leaving the ride untouched.

use dashmap::DashMap;
use ridewire_sdk::objects::{DriverId, Place, RequestId, RideStatus, UserId};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::time::Instant;

/// Something that happened to a ride.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RideEvent {
    Book,
    Accept,
    Reject,
    Start,
    Complete,
    Cancel,
    PeerDisconnected,
    SearchExhausted,
}

impl RideEvent {
    pub const ALL: [RideEvent; 8] = [
        RideEvent::Book,
        RideEvent::Accept,
        RideEvent::Reject,
        RideEvent::Start,
        RideEvent::Complete,
        RideEvent::Cancel,
        RideEvent::PeerDisconnected,
        RideEvent::SearchExhausted,
    ];
}

impl std::fmt::Display for RideEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RideEvent::Book => "book",
            RideEvent::Accept => "accept",
            RideEvent::Reject => "reject",
            RideEvent::Start => "start",
            RideEvent::Complete => "complete",
            RideEvent::Cancel => "cancel",
            RideEvent::PeerDisconnected => "disconnect from",
            RideEvent::SearchExhausted => "expire",
        };
        f.write_str(s)
    }
}

/// Target state of `event` applied in state `from`, or `None` if the
/// transition is not allowed.
pub fn transition(from: RideStatus, event: RideEvent) -> Option<RideStatus> {
    use RideEvent as E;
    use RideStatus as S;

    match (from, event) {
        (S::Pending | S::Rejected, E::Book) => Some(S::Pending),
        (S::Pending, E::Accept) => Some(S::Accepted),
        (S::Pending, E::Reject) => Some(S::Rejected),
        (S::Accepted, E::Start) => Some(S::InProgress),
        (S::Accepted | S::InProgress, E::Complete) => Some(S::Completed),
        (S::Pending | S::Rejected | S::Accepted, E::Cancel) => Some(S::Cancelled),
        (S::Pending | S::Rejected | S::Accepted | S::InProgress, E::PeerDisconnected) => {
            Some(S::Cancelled)
        }
        (S::Pending | S::Rejected, E::SearchExhausted) => Some(S::Cancelled),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {event} a ride that is {from}")]
pub struct InvalidTransition {
    pub from: RideStatus,
    pub event: RideEvent,
}

#[derive(Debug, Clone)]
pub struct RideRequest {
    pub id: RequestId,
    pub rider_id: UserId,
    pub rider_name: String,
    pub pickup: Place,
    pub destination: Option<Place>,
    pub status: RideStatus,
    /// Driver the ride is offered to (pending) or assigned to (accepted on).
    pub driver_id: Option<DriverId>,
    pub fare: Option<Decimal>,
    /// Trip distance in meters as quoted at booking.
    pub distance: Option<f64>,
    /// External ride id supplied by the driver's client.
    pub ride_id: Option<String>,
    pub declined_by: HashSet<DriverId>,
    pub created_at: OffsetDateTime,
    pub closed_at: Option<Instant>,
}

impl RideRequest {
    pub fn new(
        id: RequestId,
        rider_id: UserId,
        rider_name: String,
        pickup: Place,
        destination: Option<Place>,
    ) -> Self {
        Self {
            id,
            rider_id,
            rider_name,
            pickup,
            destination,
            status: RideStatus::Pending,
            driver_id: None,
            fare: None,
            distance: None,
            ride_id: None,
            declined_by: HashSet::new(),
            created_at: OffsetDateTime::now_utc(),
            closed_at: None,
        }
    }

    /// Check whether `event` is allowed without applying it.
    pub fn check(&self, event: RideEvent) -> Result<RideStatus, InvalidTransition> {
        transition(self.status, event).ok_or(InvalidTransition {
            from: self.status,
            event,
        })
    }

    /// Apply `event`, returning the previous status.
    pub fn apply(&mut self, event: RideEvent, now: Instant) -> Result<RideStatus, InvalidTransition> {
        let next = self.check(event)?;
        let previous = std::mem::replace(&mut self.status, next);
        if next.is_terminal() {
            self.closed_at = Some(now);
        }
        Ok(previous)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// The driver is the one currently holding the offer or assignment.
    pub fn is_assigned_to(&self, driver_id: &DriverId) -> bool {
        self.driver_id.as_ref() == Some(driver_id)
    }
}

// -- RideBook -----------------------------------------------------------

/// Every ride request known to the process, keyed by id.
#[derive(Default)]
pub struct RideBook {
    rides: DashMap<RequestId, RideRequest>,
}

impl RideBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, ride: RideRequest) {
        self.rides.insert(ride.id, ride);
    }

    pub fn get(&self, request_id: &RequestId) -> Option<RideRequest> {
        self.rides.get(request_id).map(|ride| ride.value().clone())
    }

    /// Run `f` with exclusive access to one ride.
    ///
    /// The entry stays locked for the duration of `f`, so guards checked in
    /// `f` hold for the writes it performs. `f` must not touch the book.
    pub fn update<R>(&self, request_id: &RequestId, f: impl FnOnce(&mut RideRequest) -> R) -> Option<R> {
        let mut ride = self.rides.get_mut(request_id)?;
        Some(f(ride.value_mut()))
    }

    /// Ids of the rider's non-terminal rides.
    pub fn open_for_rider(&self, user_id: &UserId) -> Vec<RequestId> {
        self.rides
            .iter()
            .filter(|ride| !ride.is_terminal() && ride.rider_id == *user_id)
            .map(|ride| ride.id)
            .collect()
    }

    /// Ids of non-terminal rides offered or assigned to the driver.
    pub fn open_for_driver(&self, driver_id: &DriverId) -> Vec<RequestId> {
        self.rides
            .iter()
            .filter(|ride| !ride.is_terminal() && ride.is_assigned_to(driver_id))
            .map(|ride| ride.id)
            .collect()
    }

    /// Forget terminal rides closed at least `retention` before `now`.
    pub fn purge_closed(&self, now: Instant, retention: Duration) -> usize {
        let before = self.rides.len();
        self.rides.retain(|_, ride| {
            ride.closed_at
                .is_none_or(|closed| now.saturating_duration_since(closed) < retention)
        });
        before.saturating_sub(self.rides.len())
    }

    /// Number of non-terminal rides.
    pub fn active_count(&self) -> usize {
        self.rides.iter().filter(|ride| !ride.is_terminal()).count()
    }

    pub fn len(&self) -> usize {
        self.rides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rides.is_empty()
    }
}
