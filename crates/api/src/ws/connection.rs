use std::fmt;
use std::time::Duration;

use axum::extract::ws::{Message, Utf8Bytes};
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use meritum_core::types::{Timestamp, UserId};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::ws::hub::Hub;

/// Default outbound buffer per connection, in messages.
pub const OUTBOUND_CAPACITY: usize = 256;

/// Largest inbound frame accepted from a client, in bytes.
pub const MAX_MESSAGE_SIZE: usize = 512;

/// Upper bound on the number of queued payloads written before one flush.
const MAX_BATCH: usize = OUTBOUND_CAPACITY;

/// Opaque per-connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(uuid::Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifies one registered connection for removal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub id: ConnectionId,
    pub user_id: UserId,
}

/// Registry-side half of a live client connection.
///
/// The registry holds the only [`mpsc::Sender`]; dropping the `Connection`
/// closes the outbound channel, which makes the write pump send a close
/// frame and exit.
#[derive(Debug)]
pub struct Connection {
    key: ConnectionKey,
    outbound: mpsc::Sender<Bytes>,
    connected_at: Timestamp,
}

impl Connection {
    /// Create a connection for `user_id` with a bounded outbound buffer.
    ///
    /// Returns the receiver half for the write pump.
    pub fn new(user_id: impl Into<UserId>, capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let conn = Self {
            key: ConnectionKey {
                id: ConnectionId::new(),
                user_id: user_id.into(),
            },
            outbound,
            connected_at: chrono::Utc::now(),
        };
        (conn, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.key.id
    }

    pub fn user_id(&self) -> &str {
        &self.key.user_id
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn connected_at(&self) -> Timestamp {
        self.connected_at
    }

    /// Wall-clock time since the connection was created.
    pub fn connected_for(&self) -> chrono::Duration {
        chrono::Utc::now() - self.connected_at
    }

    /// Queue a payload without waiting.
    pub(crate) fn try_send(&self, payload: Bytes) -> Result<(), mpsc::error::TrySendError<Bytes>> {
        self.outbound.try_send(payload)
    }
}

/// Liveness timings for the read and write pumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpConfig {
    /// Read deadline, extended by every pong.
    pub pong_wait: Duration,
    /// Deadline for each write (or batch of writes).
    pub write_wait: Duration,
    /// Ping interval. Always shorter than `pong_wait`.
    pub ping_period: Duration,
}

impl PumpConfig {
    pub fn new(pong_wait: Duration, write_wait: Duration) -> Self {
        Self {
            pong_wait,
            write_wait,
            ping_period: pong_wait * 9 / 10,
        }
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(10))
    }
}

#[derive(Debug, thiserror::Error)]
enum WriteError {
    #[error("write deadline exceeded")]
    Deadline,

    #[error(transparent)]
    Socket(#[from] axum::Error),
}

/// Drain inbound frames until the peer goes away, then unregister.
///
/// Client payloads are discarded. Every pong pushes the read deadline out by
/// `pong_wait`; the pump also stops when `writer_done` fires so a dead write
/// side does not leave the connection registered.
pub async fn read_pump<S>(
    mut stream: S,
    key: ConnectionKey,
    hub: Hub,
    config: PumpConfig,
    writer_done: CancellationToken,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    let mut deadline = Instant::now() + config.pong_wait;

    loop {
        let next = tokio::select! {
            () = writer_done.cancelled() => {
                tracing::debug!(conn_id = %key.id, "Write pump stopped");
                break;
            }
            next = tokio::time::timeout_at(deadline, stream.next()) => next,
        };

        match next {
            Err(_) => {
                tracing::debug!(conn_id = %key.id, "Read deadline expired");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(conn_id = %key.id, error = %e, "WebSocket receive error");
                break;
            }
            Ok(Some(Ok(Message::Pong(_)))) => {
                tracing::trace!(conn_id = %key.id, "Pong received");
                deadline = Instant::now() + config.pong_wait;
            }
            Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(_))) => {}
        }
    }

    let conn_id = key.id;
    hub.unregister(key).await;
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Forward queued payloads to the socket and keep the peer alive with pings.
///
/// Exits when the outbound channel closes (after sending a close frame), when
/// a write misses its deadline, or when the socket errors. `done` is
/// cancelled on every exit path.
pub async fn write_pump<S>(
    mut sink: S,
    mut outbound: mpsc::Receiver<Bytes>,
    conn_id: ConnectionId,
    config: PumpConfig,
    done: CancellationToken,
) where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let _done = done.drop_guard();
    let mut ticker = tokio::time::interval_at(Instant::now() + config.ping_period, config.ping_period);

    loop {
        tokio::select! {
            next = outbound.recv() => {
                let Some(payload) = next else {
                    // Registry dropped the sender.
                    let close = sink.send(Message::Close(None));
                    let _ = tokio::time::timeout(config.write_wait, close).await;
                    tracing::debug!(conn_id = %conn_id, "Outbound channel closed");
                    break;
                };
                if let Err(e) = write_batch(&mut sink, &mut outbound, payload, config.write_wait).await {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket write failed");
                    break;
                }
            }
            _ = ticker.tick() => {
                let ping = sink.send(Message::Ping(Bytes::new()));
                let result = match tokio::time::timeout(config.write_wait, ping).await {
                    Ok(result) => result.map_err(WriteError::from),
                    Err(_) => Err(WriteError::Deadline),
                };
                if let Err(e) = result {
                    tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket ping failed");
                    break;
                }
            }
        }
    }
}

/// Write `first` plus whatever is already queued, one frame per payload,
/// then flush once.
async fn write_batch<S>(
    sink: &mut S,
    outbound: &mut mpsc::Receiver<Bytes>,
    first: Bytes,
    write_wait: Duration,
) -> Result<(), WriteError>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let batch = async {
        sink.feed(frame(first)).await?;
        for _ in 1..MAX_BATCH {
            match outbound.try_recv() {
                Ok(next) => sink.feed(frame(next)).await?,
                Err(_) => break,
            }
        }
        sink.flush().await
    };

    match tokio::time::timeout(write_wait, batch).await {
        Ok(result) => result.map_err(WriteError::from),
        Err(_) => Err(WriteError::Deadline),
    }
}

/// Text frame for UTF-8 payloads, binary otherwise. Both reuse the payload
/// buffer as-is.
fn frame(payload: Bytes) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}
