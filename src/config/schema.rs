//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! bridge. All types derive Serde traits for deserialization from config
//! files.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::loader::{self, ConfigError};

/// Transport family for listeners and dialers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    /// TCP stream socket.
    #[default]
    Tcp,
    /// Unix domain stream socket (unix platforms only).
    Unix,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Tcp => write!(f, "tcp"),
            Network::Unix => write!(f, "unix"),
        }
    }
}

/// Root configuration for the bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Listeners bound at startup, in order.
    pub listeners: Vec<ListenerConfig>,

    /// Size of the reusable per-connection read buffer.
    pub read_buffer_size: usize,

    /// Optional bound on a single blocked read. Expiry closes the
    /// connection. Unset means reads block until data, EOF, or shutdown.
    pub read_timeout_secs: Option<u64>,

    /// Delay before retrying a transient accept error.
    pub accept_retry_ms: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listeners: Vec::new(),
            read_buffer_size: 64 * 1024,
            read_timeout_secs: None,
            accept_retry_ms: 100,
        }
    }
}

impl BridgeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        loader::load_config(path)
    }

    /// Per-iteration read bound, if configured.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_secs.map(Duration::from_secs)
    }

    /// Delay between retries of a transient accept error.
    pub fn accept_retry(&self) -> Duration {
        Duration::from_millis(self.accept_retry_ms)
    }
}

/// Listener configuration. A listener is keyed by (network, address);
/// the key must be unique among active listeners.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Transport family.
    pub network: Network,

    /// Bind address (e.g., "127.0.0.1:9000", or a socket path for unix).
    pub address: String,

    /// Optional TLS configuration. When set, accepted connections are
    /// handshaken before entering the bridge.
    pub tls: Option<TlsServerConfig>,
}

/// Dialer configuration for outbound connections.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DialerConfig {
    /// Transport family.
    pub network: Network,

    /// Remote address (e.g., "example.com:9000", or a socket path).
    pub address: String,

    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,

    /// TCP keep-alive interval in seconds. Unset disables keep-alive.
    pub keepalive_secs: Option<u64>,

    /// Optional TLS configuration for the dialed connection.
    pub tls: Option<TlsClientConfig>,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            network: Network::Tcp,
            address: String::new(),
            connect_timeout_ms: 10_000,
            keepalive_secs: None,
            tls: None,
        }
    }
}

impl DialerConfig {
    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Keep-alive interval as a `Duration`, if enabled.
    pub fn keepalive(&self) -> Option<Duration> {
        self.keepalive_secs.map(Duration::from_secs)
    }
}

/// TLS material for a listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsServerConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// TLS settings for a dialed connection.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsClientConfig {
    /// Server name for SNI and certificate verification. Defaults to the
    /// host portion of the dial address.
    pub server_name: Option<String>,

    /// Path to a PEM file of trusted root certificates. Unset uses the
    /// webpki root set.
    pub ca_path: Option<PathBuf>,
}
