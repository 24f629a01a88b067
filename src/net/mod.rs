//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming connection
//!     → listener.rs (bind, accept, transient-error retry)
//!     → tls.rs (optional TLS handshake)
//!     → connection.rs (identity, tags, close-once lifecycle)
//!     → registry.rs (ID → connection table, tag lookups)
//!
//! Outgoing connection
//!     → dialer.rs (resolve, keep-alive, connect timeout, optional TLS)
//!     → same wrap/register path as accepted connections
//! ```
//!
//! # Design Decisions
//! - All streams erase to a boxed trait object so TCP, TLS, and unix
//!   sockets flow through one code path
//! - Each connection is tracked for graceful shutdown
//! - TLS is optional and handled transparently

pub mod connection;
pub mod dialer;
pub mod listener;
pub mod registry;
pub mod tls;

use tokio::io::{AsyncRead, AsyncWrite};

/// A duplex byte stream usable by the bridge.
pub trait Stream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Stream for T {}

/// Type-erased stream; TCP, TLS, and unix streams all coerce to this.
pub type BoxedStream = Box<dyn Stream>;
