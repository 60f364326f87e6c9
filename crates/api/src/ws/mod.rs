//! Real-time delivery to browser clients.
//!
//! - [`hub`] -- the connection registry and its [`Dispatcher`](meritum_events::Dispatcher)
//!   implementation.
//! - [`connection`] -- per-connection state plus the read and write pumps.
//! - [`handler`] -- the authenticated HTTP upgrade.

pub mod connection;
mod handler;
pub mod hub;

pub use connection::{
    Connection, ConnectionId, ConnectionKey, PumpConfig, MAX_MESSAGE_SIZE, OUTBOUND_CAPACITY,
};
pub use handler::ws_handler;
pub use hub::{ConnectionPolicy, Hub, HubStats};
