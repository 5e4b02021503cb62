//! Ridewire dispatch server.
//!
//! Hosts the dispatch core behind an axum websocket endpoint. The binary in
//! `main.rs` wires configuration, tracing and signals around these modules.

pub mod api;
pub mod config;
pub mod server;
pub mod shutdown;
pub mod state;
