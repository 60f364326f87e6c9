//! Connection registry.
//!
//! A single task owns every map. Register, unregister and dispatch arrive as
//! commands on one mailbox, so they are applied in arrival order and never
//! race each other. [`Hub`] is the cheap, cloneable handle to that task.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use meritum_core::types::UserId;
use meritum_events::{DispatchOutcome, Dispatcher};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ws::connection::{Connection, ConnectionId, ConnectionKey};

/// Mailbox size for registry commands.
const COMMAND_CAPACITY: usize = 1024;

/// How a second connection for the same user is treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionPolicy {
    /// The newest connection becomes the only one indexed for the user.
    /// Older connections stay open but receive nothing.
    #[default]
    Replace,
    /// Every connection of the user receives every notification.
    FanOut,
}

impl FromStr for ConnectionPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "fanout" | "fan-out" => Ok(Self::FanOut),
            _ => Err(()),
        }
    }
}

/// Point-in-time registry counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    /// Registered connections, indexed or not.
    pub connections: usize,
    /// Users with at least one indexed connection.
    pub users: usize,
}

enum Command {
    Register(Connection),
    Unregister(ConnectionKey),
    Dispatch {
        user_id: UserId,
        payload: Bytes,
        reply: oneshot::Sender<DispatchOutcome>,
    },
    Stats(oneshot::Sender<HubStats>),
    ConnectionsFor {
        user_id: UserId,
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
    Contains {
        id: ConnectionId,
        reply: oneshot::Sender<bool>,
    },
}

/// Handle to the registry task.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::Sender<Command>,
}

impl Hub {
    /// Spawn the registry task.
    ///
    /// The task stops when `cancel` fires or every handle is dropped. On stop
    /// it drops all connections, which closes their outbound channels.
    pub fn start(policy: ConnectionPolicy, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        let (commands, mailbox) = mpsc::channel(COMMAND_CAPACITY);
        let registry = Registry::new(policy);
        let handle = tokio::spawn(run(registry, mailbox, cancel));
        (Self { commands }, handle)
    }

    /// Index `conn` for its user.
    pub async fn register(&self, conn: Connection) {
        if self.commands.send(Command::Register(conn)).await.is_err() {
            tracing::debug!("Registry stopped, dropping new connection");
        }
    }

    /// Remove the connection identified by `key`. Repeated calls are no-ops.
    pub async fn unregister(&self, key: ConnectionKey) {
        let _ = self.commands.send(Command::Unregister(key)).await;
    }

    /// Queue `payload` on the user's indexed connection(s) without blocking
    /// on any client.
    pub async fn dispatch_to(&self, user_id: &str, payload: Bytes) -> DispatchOutcome {
        let (reply, rx) = oneshot::channel();
        let command = Command::Dispatch {
            user_id: user_id.to_string(),
            payload,
            reply,
        };
        if self.commands.send(command).await.is_err() {
            return DispatchOutcome::Unavailable;
        }
        rx.await.unwrap_or(DispatchOutcome::Unavailable)
    }

    pub async fn stats(&self) -> HubStats {
        self.request(Command::Stats).await.unwrap_or_default()
    }

    /// Connections currently indexed for `user_id`.
    pub async fn connections_for(&self, user_id: &str) -> Vec<ConnectionId> {
        let user_id = user_id.to_string();
        self.request(|reply| Command::ConnectionsFor { user_id, reply })
            .await
            .unwrap_or_default()
    }

    /// Whether `id` is still registered (indexed or not).
    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.request(|reply| Command::Contains { id, reply })
            .await
            .unwrap_or(false)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(build(reply)).await.ok()?;
        rx.await.ok()
    }
}

#[async_trait]
impl Dispatcher for Hub {
    async fn dispatch(&self, user_id: &str, payload: Bytes) -> DispatchOutcome {
        self.dispatch_to(user_id, payload).await
    }
}

async fn run(mut registry: Registry, mut mailbox: mpsc::Receiver<Command>, cancel: CancellationToken) {
    loop {
        let command = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = mailbox.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        registry.apply(command);
    }

    registry.close_all();
}

/// The maps behind [`Hub`]. Only the registry task touches them.
struct Registry {
    policy: ConnectionPolicy,
    all: HashMap<ConnectionId, Connection>,
    by_user: HashMap<UserId, Vec<ConnectionId>>,
}

impl Registry {
    fn new(policy: ConnectionPolicy) -> Self {
        Self {
            policy,
            all: HashMap::new(),
            by_user: HashMap::new(),
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register(conn) => self.register(conn),
            Command::Unregister(key) => {
                self.unregister(&key);
            }
            Command::Dispatch {
                user_id,
                payload,
                reply,
            } => {
                let _ = reply.send(self.dispatch(&user_id, payload));
            }
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::ConnectionsFor { user_id, reply } => {
                let ids = self.by_user.get(&user_id).cloned().unwrap_or_default();
                let _ = reply.send(ids);
            }
            Command::Contains { id, reply } => {
                let _ = reply.send(self.all.contains_key(&id));
            }
        }
    }

    fn register(&mut self, conn: Connection) {
        let id = conn.id();
        let user_id = conn.user_id().to_string();
        let indexed = self.by_user.entry(user_id.clone()).or_default();

        let replaced = match self.policy {
            ConnectionPolicy::Replace => {
                let previous = indexed.len();
                indexed.clear();
                indexed.push(id);
                previous > 0
            }
            ConnectionPolicy::FanOut => {
                indexed.push(id);
                false
            }
        };
        self.all.insert(id, conn);

        tracing::info!(user_id = %user_id, conn_id = %id, replaced, "Client registered");
    }

    /// Returns `false` if the connection was already gone.
    fn unregister(&mut self, key: &ConnectionKey) -> bool {
        let Some(conn) = self.remove(key.id) else {
            return false;
        };
        tracing::info!(
            user_id = %key.user_id,
            conn_id = %key.id,
            connected_secs = conn.connected_for().num_seconds(),
            "Client unregistered"
        );
        true
    }

    fn dispatch(&mut self, user_id: &str, payload: Bytes) -> DispatchOutcome {
        let Some(ids) = self.by_user.get(user_id) else {
            return DispatchOutcome::NoConnection;
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for id in ids {
            let Some(conn) = self.all.get(id) else {
                failed.push(*id);
                continue;
            };
            match conn.try_send(payload.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(user_id, conn_id = %id, "Outbound buffer full, closing connection");
                    failed.push(*id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => failed.push(*id),
            }
        }

        if failed.is_empty() {
            return DispatchOutcome::Delivered {
                connections: delivered,
            };
        }
        let evicted = failed.len();
        for id in failed {
            self.remove(id);
        }
        DispatchOutcome::Evicted { delivered, evicted }
    }

    /// Drop `id` from both maps. Dropping the connection closes its channel.
    fn remove(&mut self, id: ConnectionId) -> Option<Connection> {
        let conn = self.all.remove(&id)?;
        if let Some(indexed) = self.by_user.get_mut(conn.user_id()) {
            indexed.retain(|other| *other != id);
            if indexed.is_empty() {
                self.by_user.remove(conn.user_id());
            }
        }
        Some(conn)
    }

    fn stats(&self) -> HubStats {
        HubStats {
            connections: self.all.len(),
            users: self.by_user.len(),
        }
    }

    fn close_all(&mut self) {
        let count = self.all.len();
        self.by_user.clear();
        self.all.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }
}
