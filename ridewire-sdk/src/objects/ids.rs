//! Identity newtypes.
//!
//! Driver and rider identities are asserted by clients and trusted, so they
//! are opaque strings. Ride request ids are generated server-side as UUIDv7
//! values, which sort by creation time.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identity of a driver as asserted in the connection handshake.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(pub CompactString);

/// Identity of a rider (called "user" on the wire).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub CompactString);

/// Server-generated identity of a ride request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl DriverId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl UserId {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl RequestId {
    /// Generate a new, time-ordered request id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }
}

impl From<&str> for DriverId {
    fn from(value: &str) -> Self {
        Self(CompactString::from(value))
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(CompactString::from(value))
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
