//! Outbound channel factories and handles.
//!
//! Every live connection owns one bounded queue of [`ServerMessage`]s that a
//! dedicated writer task drains into the socket. Handlers only ever
//! `try_send` into it, so a stalled peer fills its own queue and loses its
//! own messages without holding up anyone else.

use ridewire_sdk::objects::ServerMessage;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Default capacity of a connection's outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Sender half of a connection's outbound queue.
pub type OutboundSender = mpsc::Sender<ServerMessage>;
/// Receiver half of a connection's outbound queue, owned by the writer task.
pub type OutboundReceiver = mpsc::Receiver<ServerMessage>;

/// Create a new outbound queue with the given capacity (at least one slot).
pub fn outbound_channel(buffer: usize) -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(buffer.max(1))
}

/// Process-unique identifier of one socket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Handle to a live connection's outbound queue.
///
/// Cheap to clone; all clones refer to the same connection.
#[derive(Debug, Clone)]
pub struct ChannelHandle {
    id: ConnectionId,
    tx: OutboundSender,
}

impl ChannelHandle {
    /// Wrap an outbound sender under a fresh connection id.
    pub fn new(tx: OutboundSender) -> Self {
        Self {
            id: ConnectionId::next(),
            tx,
        }
    }

    /// Create a handle together with the receiver its writer should drain.
    pub fn open(buffer: usize) -> (Self, OutboundReceiver) {
        let (tx, rx) = outbound_channel(buffer);
        (Self::new(tx), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Queue `message` without waiting.
    ///
    /// Returns `false` if the message was dropped because the queue is full
    /// or the connection is gone.
    pub fn deliver(&self, message: ServerMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    connection = %self.id,
                    kind = message.kind(),
                    "Outbound queue full, dropping message"
                );
                false
            }
            Err(TrySendError::Closed(message)) => {
                debug!(
                    connection = %self.id,
                    kind = message.kind(),
                    "Outbound queue closed, dropping message"
                );
                false
            }
        }
    }
}
