//! netbridge: a stream connection bridge.
//!
//! The bridge owns listening sockets, accepts and dials stream
//! connections (TCP, TLS, or unix), tracks each connection with tag
//! metadata in a registry, dispatches inbound bytes to caller-supplied
//! handlers, and coordinates graceful all-at-once shutdown.

// Core subsystems
pub mod bridge;
pub mod config;
pub mod net;

// Cross-cutting concerns
pub mod error;
pub mod lifecycle;

pub use bridge::{Bridge, Handlers};
pub use config::schema::{BridgeConfig, DialerConfig, ListenerConfig, Network};
pub use error::BridgeError;
pub use lifecycle::Shutdown;
pub use net::connection::{Connection, ConnectionId};
pub use net::listener::ListenerKey;
