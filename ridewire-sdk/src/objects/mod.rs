pub mod geo;
pub mod ids;
pub mod presence;
pub mod ride;
pub mod ws;

pub use geo::{Coordinates, Place};
pub use ids::{DriverId, RequestId, UserId};
pub use presence::{DriverStatus, LocationData, NearbyDriver, PresenceView};
pub use ride::RideStatus;
pub use ws::{ClientMessage, DecodeError, Role, ServerMessage};
