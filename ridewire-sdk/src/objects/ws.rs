//! WebSocket message types for the dispatch channel.
//!
//! Every frame is a JSON object with a `"type"` discriminator. Clients send
//! [`ClientMessage`] frames and receive [`ServerMessage`] frames over the
//! same socket.
//!
//! # Protocol
//!
//! 1. A client identifies itself with `driverConnect` or `userConnect`.
//! 2. Drivers stream `locationUpdate` frames; riders may subscribe to a
//!    driver's stream with `subscribeToDriverLocation`.
//! 3. A rider issues `requestRide`, receives `nearbyDrivers` and books one of
//!    them with `bookRide`; the driver answers with `acceptRide` or
//!    `rejectRide` and later drives the ride with `startRide` and
//!    `completeRide`.
//! 4. Failures never close the socket; they arrive as `requestFailed`.
//!
//! ```json
//! {"type":"driverConnect","driverId":"drv-1"}
//! {"type":"requestFailed","requestId":"0190...","message":"ride not found"}
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::geo::Place;
use super::ids::{DriverId, RequestId, UserId};
use super::presence::{LocationData, NearbyDriver, PresenceView};
use super::ride::RideStatus;

/// The two kinds of actor that can hold a dispatch connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    /// A rider; `"user"` on the wire.
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Driver => write!(f, "driver"),
            Role::User => write!(f, "user"),
        }
    }
}

/// Client-to-server WebSocket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    DriverConnect {
        driver_id: DriverId,
    },
    UserConnect {
        user_id: UserId,
    },
    LocationUpdate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        driver_id: DriverId,
        data: LocationData,
    },
    SubscribeToDriverLocation {
        driver_id: DriverId,
        user_id: UserId,
    },
    RequestRide {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        user_id: UserId,
        user_name: String,
        latitude: f64,
        longitude: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<Place>,
        /// Search radius override in meters.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        radius: Option<f64>,
    },
    BookRide {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        request_id: RequestId,
        driver_id: DriverId,
        fare: Decimal,
        distance: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        destination: Option<Place>,
    },
    AcceptRide {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        request_id: RequestId,
        driver_id: DriverId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        driver_name: Option<String>,
        /// Minutes until pickup, as estimated by the driver's client.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        estimated_arrival: Option<u32>,
    },
    RejectRide {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        request_id: RequestId,
    },
    StartRide {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        request_id: RequestId,
        ride_id: String,
    },
    CompleteRide {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        request_id: RequestId,
        ride_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fare: Option<Decimal>,
    },
    CancelRideRequest {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        role: Option<Role>,
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        driver_id: Option<DriverId>,
    },
}

/// Errors produced while decoding an inbound frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not a JSON object.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The object has no string `type` field.
    #[error("missing message type")]
    MissingType,

    /// The `type` is well-formed but not part of the protocol.
    #[error("unsupported message type: {0}")]
    UnknownType(String),

    /// The `type` is known but the payload does not match it.
    #[error("invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        source: serde_json::Error,
    },
}

impl ClientMessage {
    /// Every `type` discriminator the server understands.
    pub const KINDS: [&'static str; 11] = [
        "driverConnect",
        "userConnect",
        "locationUpdate",
        "subscribeToDriverLocation",
        "requestRide",
        "bookRide",
        "acceptRide",
        "rejectRide",
        "startRide",
        "completeRide",
        "cancelRideRequest",
    ];

    /// Decode a text frame, distinguishing unknown message types from
    /// malformed payloads.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingType)?
            .to_owned();
        if !Self::KINDS.contains(&kind.as_str()) {
            return Err(DecodeError::UnknownType(kind));
        }
        serde_json::from_value(value).map_err(|source| DecodeError::InvalidPayload { kind, source })
    }

    /// The wire discriminator of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::DriverConnect { .. } => "driverConnect",
            ClientMessage::UserConnect { .. } => "userConnect",
            ClientMessage::LocationUpdate { .. } => "locationUpdate",
            ClientMessage::SubscribeToDriverLocation { .. } => "subscribeToDriverLocation",
            ClientMessage::RequestRide { .. } => "requestRide",
            ClientMessage::BookRide { .. } => "bookRide",
            ClientMessage::AcceptRide { .. } => "acceptRide",
            ClientMessage::RejectRide { .. } => "rejectRide",
            ClientMessage::StartRide { .. } => "startRide",
            ClientMessage::CompleteRide { .. } => "completeRide",
            ClientMessage::CancelRideRequest { .. } => "cancelRideRequest",
        }
    }
}

/// Server-to-client WebSocket message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// A subscribed driver's new presence.
    DriverLocationUpdate(PresenceView),

    /// Available drivers near the pickup, closest first.
    NearbyDrivers {
        request_id: RequestId,
        drivers: Vec<NearbyDriver>,
    },

    /// The booking was forwarded to the driver.
    RequestSent {
        request_id: RequestId,
        driver_id: DriverId,
    },

    /// A request could not be served. The connection stays open.
    RequestFailed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<RequestId>,
        message: String,
    },

    /// A booking offered to a driver.
    RideRequest {
        request_id: RequestId,
        user_id: UserId,
        user_name: String,
        pickup_location: Place,
        destination: Option<Place>,
        distance: f64,
        fare: Decimal,
    },

    RideAccepted {
        request_id: RequestId,
        driver_id: DriverId,
        driver_name: Option<String>,
        /// Minutes until pickup.
        estimated_arrival: Option<u32>,
        driver_location: Option<PresenceView>,
    },

    RideRejected {
        request_id: RequestId,
        driver_id: DriverId,
        message: String,
    },

    RideStatusUpdate {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ride_id: Option<String>,
        status: RideStatus,
    },

    RideCompleted {
        request_id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ride_id: Option<String>,
        fare: Option<Decimal>,
    },

    RideCancelled {
        request_id: RequestId,
        message: String,
    },
}

impl ServerMessage {
    /// The wire discriminator of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::DriverLocationUpdate(_) => "driverLocationUpdate",
            ServerMessage::NearbyDrivers { .. } => "nearbyDrivers",
            ServerMessage::RequestSent { .. } => "requestSent",
            ServerMessage::RequestFailed { .. } => "requestFailed",
            ServerMessage::RideRequest { .. } => "rideRequest",
            ServerMessage::RideAccepted { .. } => "rideAccepted",
            ServerMessage::RideRejected { .. } => "rideRejected",
            ServerMessage::RideStatusUpdate { .. } => "rideStatusUpdate",
            ServerMessage::RideCompleted { .. } => "rideCompleted",
            ServerMessage::RideCancelled { .. } => "rideCancelled",
        }
    }
}
