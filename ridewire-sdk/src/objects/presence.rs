use serde::{Deserialize, Serialize};

use super::ids::DriverId;

/// Availability of a driver for new rides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverStatus {
    #[default]
    Available,
    Busy,
    Offline,
}

impl std::fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriverStatus::Available => write!(f, "available"),
            DriverStatus::Busy => write!(f, "busy"),
            DriverStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Location payload of a driver's `locationUpdate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationData {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub status: Option<DriverStatus>,
}

/// A driver's last known presence as pushed to riders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    pub driver_id: DriverId,
    pub latitude: f64,
    pub longitude: f64,
    /// Degrees clockwise from north, in `[0, 360)`.
    pub heading: f64,
    pub status: DriverStatus,
    /// Unix timestamp in milliseconds.
    pub updated_at: i64,
}

/// One candidate returned by a proximity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDriver {
    pub driver_id: DriverId,
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
    /// Great-circle distance to the rider in meters.
    pub distance: f64,
}
