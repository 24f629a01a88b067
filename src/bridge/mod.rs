//! The bridge aggregate: listeners, connections, and coordinated
//! shutdown.
//!
//! # Data Flow
//! ```text
//! accept loop (one per listener)
//!     → optional TLS handshake
//!     → wrap stream into Connection (close hook deregisters)
//!     → ConnectionRegistry
//!     → spawn read loop
//!     → on_connection callback (synchronous, in-loop)
//!
//! read loop (one per connection)
//!     → read chunk → copy bytes → on_message callback (synchronous)
//!     → exit on EOF/error/shutdown → Connection::close (exactly once)
//! ```
//!
//! # Design Decisions
//! - Callbacks run inside the owning loop; a slow handler stalls only
//!   that listener or connection
//! - The read loop is the sole authority on connection death; send
//!   failures never deregister
//! - Cancellation is cooperative at select points

use std::io;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::config::schema::{BridgeConfig, DialerConfig, ListenerConfig};
use crate::error::BridgeError;
use crate::lifecycle::{Shutdown, TaskGuard, TaskTracker};
use crate::net::connection::{Connection, ConnectionId};
use crate::net::listener::{is_transient_accept_error, BoundListener, ListenerKey};
use crate::net::registry::ConnectionRegistry;
use crate::net::{dialer, BoxedStream};

/// Callback invoked once per accepted or dialed connection.
pub type ConnectionCallback = Arc<dyn Fn(Arc<Connection>) + Send + Sync>;

/// Callback invoked once per successfully read chunk. The bytes are a
/// fresh copy, never the loop's reusable read buffer.
pub type MessageCallback = Arc<dyn Fn(Arc<Connection>, Vec<u8>) + Send + Sync>;

/// Caller-supplied callbacks, fixed at bridge construction.
#[derive(Clone, Default)]
pub struct Handlers {
    /// Fired after a connection is registered and its read loop spawned.
    pub on_connection: Option<ConnectionCallback>,
    /// Fired for each chunk read from a connection.
    pub on_message: Option<MessageCallback>,
}

impl Handlers {
    /// Set the connection-observed callback.
    pub fn on_connection(mut self, f: impl Fn(Arc<Connection>) + Send + Sync + 'static) -> Self {
        self.on_connection = Some(Arc::new(f));
        self
    }

    /// Set the message-observed callback.
    pub fn on_message(
        mut self,
        f: impl Fn(Arc<Connection>, Vec<u8>) + Send + Sync + 'static,
    ) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }
}

/// A network connection bridge.
///
/// Owns zero or more listeners and every connection accepted or dialed
/// through it. Cheap to clone; all clones share the same state. Torn
/// down by the idempotent [`Bridge::close`].
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<Inner>,
}

struct Inner {
    config: BridgeConfig,
    handlers: Handlers,
    registry: Arc<ConnectionRegistry>,
    listeners: DashMap<ListenerKey, String>,
    shutdown: Shutdown,
    tracker: TaskTracker,
    close_started: std::sync::atomic::AtomicBool,
    close_done_tx: tokio::sync::watch::Sender<bool>,
    close_done_rx: tokio::sync::watch::Receiver<bool>,
}

impl Bridge {
    /// Create a bridge with the given config and handlers. No sockets
    /// are touched until [`Bridge::start`] or [`Bridge::add_listener`].
    pub fn new(config: BridgeConfig, handlers: Handlers) -> Self {
        let (close_done_tx, close_done_rx) = tokio::sync::watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                handlers,
                registry: Arc::new(ConnectionRegistry::new()),
                listeners: DashMap::new(),
                shutdown: Shutdown::new(),
                tracker: TaskTracker::new(),
                close_started: std::sync::atomic::AtomicBool::new(false),
                close_done_tx,
                close_done_rx,
            }),
        }
    }

    /// Bind every listener named in the config, in order. Fails fast on
    /// the first error.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let configs = self.inner.config.listeners.clone();
        for config in &configs {
            self.add_listener(config).await?;
        }
        Ok(())
    }

    /// Bind a listener and start its accept loop. Returns the resolved
    /// local address. Fails with [`BridgeError::ListenerExists`] if a
    /// listener with the same (network, address) key is active; the
    /// existing listener is unaffected.
    pub async fn add_listener(&self, config: &ListenerConfig) -> Result<String, BridgeError> {
        if self.inner.shutdown.is_triggered() {
            return Err(closed_error());
        }

        let key = ListenerKey::new(config.network, config.address.clone());
        if self.inner.listeners.contains_key(&key) {
            return Err(BridgeError::ListenerExists { key });
        }

        let listener = BoundListener::bind(config).await?;
        let local_addr = listener.local_addr().to_string();

        // Re-check under the entry so a racing identical add_listener
        // cannot register twice; the loser's fresh socket is dropped.
        match self.inner.listeners.entry(key.clone()) {
            Entry::Occupied(_) => {
                return Err(BridgeError::ListenerExists { key });
            }
            Entry::Vacant(entry) => {
                entry.insert(local_addr.clone());
            }
        }

        let Some(guard) = self.inner.tracker.track() else {
            self.inner.listeners.remove(&key);
            return Err(closed_error());
        };

        let shutdown_rx = self.inner.shutdown.subscribe();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(accept_loop(inner, key, listener, shutdown_rx, guard));

        Ok(local_addr)
    }

    /// Establish an outbound connection. On success the connection
    /// follows the same register/dispatch/notify path as an accepted one
    /// and the handle is returned. On failure nothing is registered and
    /// the underlying error propagates.
    pub async fn dial(&self, config: &DialerConfig) -> Result<Arc<Connection>, BridgeError> {
        if self.inner.shutdown.is_triggered() {
            return Err(closed_error());
        }

        let (stream, peer) = dialer::connect(config).await?;
        self.inner.register_connection(stream, peer)
    }

    /// Write `data` to the connection with this ID. Fails with
    /// [`BridgeError::ConnectionNotFound`] on an unknown ID, without side
    /// effects; transport errors propagate unmodified and do not
    /// deregister the connection.
    pub async fn send(&self, id: ConnectionId, data: &[u8]) -> Result<(), BridgeError> {
        let conn = self
            .inner
            .registry
            .get(id)
            .ok_or(BridgeError::ConnectionNotFound { id })?;
        conn.send(data).await?;
        Ok(())
    }

    /// Send `data` to every connection whose tag `key` equals `value`.
    /// Best-effort: every target is attempted; failures are collected
    /// into [`BridgeError::BroadcastFailed`].
    pub async fn broadcast(
        &self,
        tag_key: &str,
        tag_value: &str,
        data: &[u8],
    ) -> Result<(), BridgeError> {
        let targets = self.inner.registry.with_tag(tag_key, tag_value);
        trace!(tag_key, tag_value, targets = targets.len(), "Broadcasting");

        let mut failures = Vec::new();
        for conn in targets {
            if let Err(err) = conn.send(data).await {
                warn!(id = %conn.id(), error = %err, "Broadcast send failed");
                failures.push((conn.id(), err));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::BroadcastFailed { failures })
        }
    }

    /// Look up a live connection by ID.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.inner.registry.get(id)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Number of active listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.len()
    }

    /// Shut the bridge down: signal every loop, close every connection,
    /// and return once every accept loop and read loop has terminated.
    /// Idempotent; concurrent and repeated calls all return after the
    /// one teardown completes.
    pub async fn close(&self) {
        use std::sync::atomic::Ordering;

        if self.inner.close_started.swap(true, Ordering::SeqCst) {
            let mut done = self.inner.close_done_rx.clone();
            while !*done.borrow() {
                if done.changed().await.is_err() {
                    break;
                }
            }
            return;
        }

        info!("Bridge shutting down");
        self.inner.shutdown.trigger();

        for conn in self.inner.registry.drain() {
            conn.close().await;
        }

        self.inner.tracker.wait().await;
        self.inner.listeners.clear();

        let _ = self.inner.close_done_tx.send(true);
        info!("Bridge shutdown complete");
    }
}

impl Inner {
    /// Wrap an established stream: allocate an ID, register, spawn the
    /// read loop, fire `on_connection`. Shared by accept and dial.
    fn register_connection(
        self: &Arc<Self>,
        stream: BoxedStream,
        peer: String,
    ) -> Result<Arc<Connection>, BridgeError> {
        let guard = self.tracker.track().ok_or_else(closed_error)?;

        let (reader, writer) = tokio::io::split(stream);
        let id = self.registry.allocate_id();

        let registry = Arc::clone(&self.registry);
        let conn = Arc::new(Connection::new(
            id,
            peer,
            writer,
            Box::new(move || {
                registry.remove(id);
            }),
        ));

        self.registry.insert(Arc::clone(&conn));
        debug!(id = %id, peer_addr = %conn.peer_addr(), "Connection registered");

        let shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(read_loop(
            Arc::clone(self),
            Arc::clone(&conn),
            reader,
            shutdown_rx,
            guard,
        ));

        if let Some(callback) = &self.handlers.on_connection {
            callback(Arc::clone(&conn));
        }

        Ok(conn)
    }
}

fn closed_error() -> BridgeError {
    BridgeError::Io(io::Error::new(
        io::ErrorKind::NotConnected,
        "bridge is shut down",
    ))
}

/// One loop per listener: accept, wrap, register, dispatch, notify.
async fn accept_loop(
    inner: Arc<Inner>,
    key: ListenerKey,
    listener: BoundListener,
    mut shutdown_rx: broadcast::Receiver<()>,
    _guard: TaskGuard,
) {
    let retry_delay = inner.config.accept_retry();

    loop {
        if inner.shutdown.is_triggered() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            result = listener.accept() => match result {
                Ok((stream, peer)) => {
                    let stream = match listener.tls_acceptor() {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(tls_stream) => Box::new(tls_stream) as BoxedStream,
                            Err(err) => {
                                warn!(key = %key, peer_addr = %peer, error = %err, "TLS handshake failed");
                                continue;
                            }
                        },
                        None => stream,
                    };

                    debug!(key = %key, peer_addr = %peer, "Connection accepted");
                    if inner.register_connection(stream, peer).is_err() {
                        // Bridge is draining; stop accepting.
                        break;
                    }
                }
                Err(err) if is_transient_accept_error(&err) => {
                    warn!(key = %key, error = %err, "Transient accept error");
                    tokio::time::sleep(retry_delay).await;
                }
                Err(err) => {
                    error!(key = %key, error = %err, "Fatal accept error, stopping listener");
                    break;
                }
            }
        }
    }

    inner.listeners.remove(&key);
    debug!(key = %key, "Accept loop terminated");
}

/// One loop per connection: read, copy, dispatch. Exit by any path runs
/// `Connection::close` exactly once (the close latch dedupes).
async fn read_loop(
    inner: Arc<Inner>,
    conn: Arc<Connection>,
    mut reader: ReadHalf<BoxedStream>,
    mut shutdown_rx: broadcast::Receiver<()>,
    _guard: TaskGuard,
) {
    let mut buf = vec![0u8; inner.config.read_buffer_size];
    let read_timeout = inner.config.read_timeout();

    loop {
        if conn.is_closed() || inner.shutdown.is_triggered() {
            break;
        }

        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = conn.closed() => break,
            result = read_chunk(&mut reader, &mut buf, read_timeout) => match result {
                Ok(0) => {
                    debug!(id = %conn.id(), "Connection closed by peer");
                    break;
                }
                Ok(n) => {
                    conn.touch();
                    trace!(id = %conn.id(), len = n, "Read data");
                    if let Some(callback) = &inner.handlers.on_message {
                        callback(Arc::clone(&conn), buf[..n].to_vec());
                    }
                }
                Err(err) => {
                    debug!(id = %conn.id(), error = %err, "Read failed");
                    break;
                }
            }
        }
    }

    conn.close().await;
}

async fn read_chunk(
    reader: &mut ReadHalf<BoxedStream>,
    buf: &mut [u8],
    timeout: Option<std::time::Duration>,
) -> io::Result<usize> {
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, reader.read(buf)).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
        },
        None => reader.read(buf).await,
    }
}
