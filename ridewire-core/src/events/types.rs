//! Command types handled by the [`Dispatcher`](crate::framework::Dispatcher).
//!
//! The router turns each decoded [`ClientMessage`] into one of these after
//! resolving *who* sent it, so every command carries the acting identity
//! explicitly instead of a raw socket. Commands that answer the sender
//! directly also carry its [`ChannelHandle`] as `origin`.
//!
//! [`ClientMessage`]: ridewire_sdk::objects::ClientMessage

use ridewire_sdk::objects::{DriverId, LocationData, Place, RequestId, UserId};
use rust_decimal::Decimal;
use tokio::time::Instant;

use super::channels::{ChannelHandle, ConnectionId};

/// A driver reported a new position.
#[derive(Debug, Clone)]
pub struct UpdateLocation {
    pub driver_id: DriverId,
    pub data: LocationData,
}

/// A rider wants live position updates of a driver.
#[derive(Debug, Clone)]
pub struct SubscribeToDriver {
    pub origin: ChannelHandle,
    pub user_id: UserId,
    pub driver_id: DriverId,
}

/// A rider asks for nearby drivers, opening a new ride request.
#[derive(Debug, Clone)]
pub struct RequestRide {
    pub origin: ChannelHandle,
    pub user_id: UserId,
    pub user_name: String,
    pub pickup: Place,
    pub destination: Option<Place>,
    /// Overrides the configured search radius when set.
    pub radius_m: Option<f64>,
}

/// A rider books one specific driver for an open request.
#[derive(Debug, Clone)]
pub struct BookRide {
    pub origin: ChannelHandle,
    pub user_id: UserId,
    pub request_id: RequestId,
    pub driver_id: DriverId,
    pub fare: Decimal,
    pub distance: f64,
    pub destination: Option<Place>,
}

#[derive(Debug, Clone)]
pub struct AcceptRide {
    pub driver_id: DriverId,
    pub request_id: RequestId,
    pub driver_name: Option<String>,
    /// Minutes until pickup as estimated by the driver.
    pub estimated_arrival: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct RejectRide {
    pub driver_id: DriverId,
    pub request_id: RequestId,
}

#[derive(Debug, Clone)]
pub struct StartRide {
    pub driver_id: DriverId,
    pub request_id: RequestId,
    pub ride_id: String,
}

#[derive(Debug, Clone)]
pub struct CompleteRide {
    pub driver_id: DriverId,
    pub request_id: RequestId,
    pub ride_id: String,
    pub fare: Option<Decimal>,
}

/// A rider withdraws a request.
#[derive(Debug, Clone)]
pub struct CancelRide {
    pub origin: ChannelHandle,
    pub user_id: UserId,
    pub request_id: RequestId,
    /// Driver the client believes holds the offer; used when the ride has none.
    pub driver_id: Option<DriverId>,
}

/// A socket closed.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionClosed {
    pub connection: ConnectionId,
}

/// Advance every retry search that is due at `now`.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceSearches {
    pub now: Instant,
}
