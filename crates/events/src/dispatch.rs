//! The seam between the completion consumer and whatever owns live
//! client connections.

use async_trait::async_trait;
use bytes::Bytes;

/// What happened to one payload handed to a [`Dispatcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No live connection is indexed for the user. The payload is dropped.
    NoConnection,
    /// Every indexed connection accepted the payload.
    Delivered { connections: usize },
    /// At least one connection had a full or closed outbound buffer and was
    /// torn down. `delivered` counts the ones that still accepted it.
    Evicted { delivered: usize, evicted: usize },
    /// The dispatcher is no longer running.
    Unavailable,
}

impl DispatchOutcome {
    /// Number of connections that queued the payload.
    pub fn delivered(&self) -> usize {
        match *self {
            Self::Delivered { connections } => connections,
            Self::Evicted { delivered, .. } => delivered,
            Self::NoConnection | Self::Unavailable => 0,
        }
    }
}

/// Routes a raw payload to the live connections of one user.
///
/// Implementations must never block on a slow client.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, user_id: &str, payload: Bytes) -> DispatchOutcome;
}
