//! Listening sockets keyed by (network, address).
//!
//! # Responsibilities
//! - Bind to configured address(es), plain or TLS
//! - Hand accepted streams to the bridge's accept loop
//! - Classify accept errors as transient or fatal

use std::fmt;
use std::io;

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::net::UnixListener;
use tokio_rustls::TlsAcceptor;

use crate::config::schema::{ListenerConfig, Network};
use crate::error::BridgeError;
use crate::net::{tls, BoxedStream};

/// Identity of an active listener: network plus the configured address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerKey {
    /// Transport family.
    pub network: Network,
    /// Configured (not resolved) address.
    pub address: String,
}

impl ListenerKey {
    /// Key for a listener config.
    pub fn new(network: Network, address: impl Into<String>) -> Self {
        Self {
            network,
            address: address.into(),
        }
    }
}

impl fmt::Display for ListenerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.network, self.address)
    }
}

/// A bound, accepting socket.
pub(crate) struct BoundListener {
    inner: ListenerInner,
    tls: Option<TlsAcceptor>,
    local_addr: String,
}

enum ListenerInner {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl BoundListener {
    /// Bind per the config. TLS material is loaded before the socket is
    /// bound so a bad certificate registers nothing.
    pub(crate) async fn bind(config: &ListenerConfig) -> Result<Self, BridgeError> {
        let tls = match &config.tls {
            Some(tls_config) => Some(tls::load_acceptor(tls_config)?),
            None => None,
        };

        match config.network {
            Network::Tcp => {
                let listener = TcpListener::bind(config.address.as_str()).await?;
                let local_addr = listener.local_addr()?.to_string();
                tracing::info!(network = %config.network, address = %local_addr, "Listener bound");
                Ok(Self {
                    inner: ListenerInner::Tcp(listener),
                    tls,
                    local_addr,
                })
            }
            #[cfg(unix)]
            Network::Unix => {
                let listener = UnixListener::bind(config.address.as_str())?;
                tracing::info!(network = %config.network, address = %config.address, "Listener bound");
                Ok(Self {
                    inner: ListenerInner::Unix(listener),
                    tls,
                    local_addr: config.address.clone(),
                })
            }
            #[cfg(not(unix))]
            Network::Unix => Err(BridgeError::InvalidAddress {
                address: config.address.clone(),
            }),
        }
    }

    /// Resolved local address (useful when binding port 0).
    pub(crate) fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// TLS acceptor for this listener, if configured. The handshake is
    /// performed by the accept loop so a failed handshake only costs the
    /// one connection.
    pub(crate) fn tls_acceptor(&self) -> Option<&TlsAcceptor> {
        self.tls.as_ref()
    }

    /// Accept one connection, returning the raw stream and peer address.
    pub(crate) async fn accept(&self) -> io::Result<(BoxedStream, String)> {
        match &self.inner {
            ListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await?;
                Ok((Box::new(stream), peer.to_string()))
            }
            #[cfg(unix)]
            ListenerInner::Unix(listener) => {
                let (stream, peer) = listener.accept().await?;
                let peer = peer
                    .as_pathname()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unnamed".to_string());
                Ok((Box::new(stream), peer))
            }
        }
    }
}

/// Whether an accept error is a temporary network condition worth
/// retrying, as opposed to a fatal listener failure.
pub(crate) fn is_transient_accept_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}
