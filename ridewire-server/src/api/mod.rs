//! HTTP and websocket handlers.

pub mod ws;
