//! Per-connection handle held by the hub.

use std::fmt;

use table_common::id::prefix;
use table_common::PrefixedId;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::events::Frame;

/// Unique identifier of one accepted client socket (`conn_` prefixed ULID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl PrefixedId for ConnectionId {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl ConnectionId {
    pub fn new() -> Self {
        Self(<Self as PrefixedId>::generate())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a frame could not be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    /// The writer is not keeping up; the connection must be torn down.
    Full,
    /// The writer has already exited.
    Closed,
}

/// The hub's end of a connection: its id and the producer side of its
/// bounded outbound queue.
///
/// Dropping the handle closes the queue, which tells the writer to drain what
/// is left, send a close frame and exit.
#[derive(Debug)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
}

impl ConnectionHandle {
    /// Create a handle and the receiver its writer task drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        (
            Self {
                id: ConnectionId::new(),
                outbound,
            },
            rx,
        )
    }

    /// Queue a frame without waiting.
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), EnqueueError> {
        self.outbound.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => EnqueueError::Full,
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}
