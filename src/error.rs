//! Bridge-wide error type.

use std::time::Duration;

use thiserror::Error;

use crate::config::loader::ConfigError;
use crate::net::connection::ConnectionId;
use crate::net::listener::ListenerKey;

/// The error type for bridge operations.
///
/// Transport failures from the underlying socket layer are propagated
/// verbatim through the `Io` variant. Accept-loop and read-loop errors are
/// handled inside their loops and never surface here.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// A listener is already registered under this (network, address) key.
    /// The existing listener is left running.
    #[error("listener already exists for {key}")]
    ListenerExists {
        /// The key that collided.
        key: ListenerKey,
    },

    /// Attempted to operate on a connection ID that is not registered.
    #[error("connection {id} not found")]
    ConnectionNotFound {
        /// The connection ID that was not found.
        id: ConnectionId,
    },

    /// An outbound connect did not complete within the configured timeout.
    #[error("dial to {address} timed out after {timeout:?}")]
    DialTimeout {
        /// The address being dialed.
        address: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// The provided address could not be resolved or is unsupported on
    /// this platform.
    #[error("invalid address '{address}'")]
    InvalidAddress {
        /// The offending address.
        address: String,
    },

    /// Certificate or key material could not be loaded, or the TLS
    /// configuration could not be built from it.
    #[error("TLS error: {0}")]
    Tls(String),

    /// One or more targets of a broadcast failed. Every matching
    /// connection is attempted; the failures are collected here so callers
    /// can see exactly which targets were not reached.
    #[error("broadcast failed for {} connection(s)", .failures.len())]
    BroadcastFailed {
        /// Per-target failures, in iteration order.
        failures: Vec<(ConnectionId, std::io::Error)>,
    },

    /// Configuration loading or validation failed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Low-level I/O error from the operating system, unmodified.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
