//! Outbound connection establishment.
//!
//! # Responsibilities
//! - Resolve the dial address and connect within the configured timeout
//! - Apply socket options (TCP_NODELAY, keep-alive interval)
//! - Optionally wrap the stream in TLS
//!
//! Failures propagate untouched and register nothing; the bridge only
//! wraps a stream this module has fully established.

use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};
use tokio::net::TcpSocket;
#[cfg(unix)]
use tokio::net::UnixStream;

use crate::config::schema::{DialerConfig, Network};
use crate::error::BridgeError;
use crate::net::{tls, BoxedStream};

/// Establish an outbound stream per the dialer config. Returns the
/// stream and the peer address as a display string.
pub(crate) async fn connect(config: &DialerConfig) -> Result<(BoxedStream, String), BridgeError> {
    match config.network {
        Network::Tcp => connect_tcp(config).await,
        #[cfg(unix)]
        Network::Unix => connect_unix(config).await,
        #[cfg(not(unix))]
        Network::Unix => Err(BridgeError::InvalidAddress {
            address: config.address.clone(),
        }),
    }
}

async fn connect_tcp(config: &DialerConfig) -> Result<(BoxedStream, String), BridgeError> {
    let timeout = config.connect_timeout();

    let addr = tokio::net::lookup_host(config.address.as_str())
        .await?
        .next()
        .ok_or_else(|| BridgeError::InvalidAddress {
            address: config.address.clone(),
        })?;

    let socket = tcp_socket(&addr, config)?;
    let stream = tokio::time::timeout(timeout, socket.connect(addr))
        .await
        .map_err(|_| BridgeError::DialTimeout {
            address: config.address.clone(),
            timeout,
        })??;
    stream.set_nodelay(true)?;

    let peer = addr.to_string();
    tracing::debug!(address = %peer, "Dialed connection established");

    match &config.tls {
        Some(tls_config) => {
            let connector = tls::build_connector(tls_config)?;
            let name = tls::server_name(tls_config, &config.address)?;
            let stream = tokio::time::timeout(timeout, connector.connect(name, stream))
                .await
                .map_err(|_| BridgeError::DialTimeout {
                    address: config.address.clone(),
                    timeout,
                })??;
            Ok((Box::new(stream), peer))
        }
        None => Ok((Box::new(stream), peer)),
    }
}

/// Build the raw socket so keep-alive can be configured before connect;
/// tokio's own types do not expose the keep-alive interval.
fn tcp_socket(addr: &SocketAddr, config: &DialerConfig) -> Result<TcpSocket, BridgeError> {
    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    if let Some(interval) = config.keepalive() {
        socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(interval))?;
    }
    socket.set_nonblocking(true)?;

    Ok(TcpSocket::from_std_stream(socket.into()))
}

#[cfg(unix)]
async fn connect_unix(config: &DialerConfig) -> Result<(BoxedStream, String), BridgeError> {
    let timeout = config.connect_timeout();
    let stream = tokio::time::timeout(timeout, UnixStream::connect(config.address.as_str()))
        .await
        .map_err(|_| BridgeError::DialTimeout {
            address: config.address.clone(),
            timeout,
        })??;

    tracing::debug!(address = %config.address, "Dialed unix connection established");
    Ok((Box::new(stream), config.address.clone()))
}
