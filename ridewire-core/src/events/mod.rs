//! Event plumbing of the dispatch core.
//!
//! # Event Flow
//!
//! 1. A socket frame is decoded into a `ClientMessage` by the `MessageRouter`
//! 2. The router resolves the acting identity and emits one command
//! 3. The `Dispatcher` applies the command to shared state
//! 4. Outbound `ServerMessage`s are queued on the affected connections'
//!    [`ChannelHandle`]s and written by each connection's writer task
//!
//! Retry searches are advanced separately by the `SearchTicker`, which
//! emits [`AdvanceSearches`] on a fixed tick.

pub mod channels;
pub mod types;

pub use channels::{
    ChannelHandle, ConnectionId, DEFAULT_OUTBOUND_BUFFER, OutboundReceiver, OutboundSender,
    outbound_channel,
};

pub use types::{
    AcceptRide, AdvanceSearches, BookRide, CancelRide, CompleteRide, ConnectionClosed, RejectRide,
    RequestRide, StartRide, SubscribeToDriver, UpdateLocation,
};
