//! Command processors of the dispatch core.
//!
//! Each command from [`crate::events`] is handled by a
//! `Processor<Command> for Dispatcher` implementation:
//!
//! - `location`: `UpdateLocation`, `SubscribeToDriver`
//! - `lifecycle`: `RequestRide`, `BookRide`, `AcceptRide`, `RejectRide`,
//!   `StartRide`, `CompleteRide`, `CancelRide`
//! - `disconnect`: `ConnectionClosed`
//! - `matcher`: proximity search and `AdvanceSearches`
//!
//! The [`MessageRouter`] turns socket frames into commands and the
//! [`SearchTicker`] emits `AdvanceSearches` on a fixed tick.

pub mod disconnect;
pub mod lifecycle;
pub mod location;
pub mod matcher;
pub mod router;
pub mod search_ticker;

pub use matcher::{Candidate, SearchSweep, search};
pub use router::{InboundFrame, MessageRouter};
pub use search_ticker::SearchTicker;

use ridewire_sdk::objects::{DriverId, RequestId, Role, ServerMessage};
use thiserror::Error;

use crate::entities::InvalidTransition;

/// A request-level failure, answered to the originating connection as
/// `requestFailed`. The `Display` text is the wire message.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("ride not found")]
    RideNotFound(RequestId),

    #[error("driver not available")]
    DriverNotAvailable {
        request_id: RequestId,
        driver_id: DriverId,
    },

    #[error("driver not connected")]
    DriverNotConnected {
        request_id: RequestId,
        driver_id: DriverId,
    },

    #[error("driver declined this ride")]
    DriverDeclined {
        request_id: RequestId,
        driver_id: DriverId,
    },

    #[error("unauthorized transition: {source}")]
    InvalidTransition {
        request_id: RequestId,
        source: InvalidTransition,
    },

    #[error("not a party to this ride")]
    Unauthorized(RequestId),

    #[error("connection not identified")]
    NotIdentified,

    #[error("identity mismatch")]
    IdentityMismatch,

    #[error("role mismatch: expected {expected}")]
    RoleMismatch { expected: Role },

    #[error("invalid coordinates")]
    InvalidCoordinates,

    #[error("unsupported message type: {0}")]
    UnsupportedMessage(String),
}

impl DispatchError {
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            DispatchError::RideNotFound(id) | DispatchError::Unauthorized(id) => Some(*id),
            DispatchError::DriverNotAvailable { request_id, .. }
            | DispatchError::DriverNotConnected { request_id, .. }
            | DispatchError::DriverDeclined { request_id, .. }
            | DispatchError::InvalidTransition { request_id, .. } => Some(*request_id),
            DispatchError::NotIdentified
            | DispatchError::IdentityMismatch
            | DispatchError::RoleMismatch { .. }
            | DispatchError::InvalidCoordinates
            | DispatchError::UnsupportedMessage(_) => None,
        }
    }

    pub fn into_message(self) -> ServerMessage {
        ServerMessage::RequestFailed {
            request_id: self.request_id(),
            message: self.to_string(),
        }
    }
}
