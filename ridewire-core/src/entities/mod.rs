//! In-memory state of the dispatch core.
//!
//! Every store is a set of `DashMap`s and is safe to share behind an `Arc`.
//! When one operation touches several stores it locks them in the order
//! ride → presence → search, and never holds a guard across an `.await`.

pub mod presence;
pub mod registry;
pub mod retry_search;
pub mod ride_request;
pub mod subscription;

pub use presence::{DriverPresence, PresenceStore};
pub use registry::{ConnectionRegistry, Identity};
pub use retry_search::{RetrySearch, SearchStep, SearchTable};
pub use ride_request::{InvalidTransition, RideBook, RideEvent, RideRequest, transition};
pub use subscription::SubscriptionTable;
