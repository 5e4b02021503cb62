//! Ridewire SDK
//!
//! Shared wire types for the Ridewire dispatch server and an optional
//! websocket client (behind the `client` feature).

#[cfg(feature = "client")]
pub mod client;
pub mod objects;
