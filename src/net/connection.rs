//! Connection identity and lifecycle tracking.
//!
//! # Responsibilities
//! - Wrap one transport stream's write half with identity and metadata
//! - Track creation and last-used timestamps
//! - Hold mutable tag metadata for broadcast targeting
//! - Guarantee close-exactly-once semantics across racing close paths

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::Notify;

use crate::net::BoxedStream;

/// Unique identifier for a connection, allocated by the owning registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One-shot hook invoked when the connection closes; the bridge uses it
/// to deregister the connection.
pub(crate) type CloseHook = Box<dyn FnOnce() + Send>;

/// A live connection owned by the bridge.
///
/// Holds the write half of the stream; the read half is owned by the
/// connection's read loop. Cloning the `Arc<Connection>` handle is cheap
/// and any holder may send, tag, or close.
pub struct Connection {
    id: ConnectionId,
    peer_addr: String,
    writer: tokio::sync::Mutex<WriteHalf<BoxedStream>>,
    created_at: SystemTime,
    /// Unix milliseconds, advanced with fetch_max so it never goes
    /// backwards even under racing reads and writes.
    last_used_ms: AtomicU64,
    tags: RwLock<HashMap<String, String>>,
    closed: AtomicBool,
    closed_notify: Notify,
    on_close: Mutex<Option<CloseHook>>,
}

impl Connection {
    pub(crate) fn new(
        id: ConnectionId,
        peer_addr: String,
        writer: WriteHalf<BoxedStream>,
        on_close: CloseHook,
    ) -> Self {
        Self {
            id,
            peer_addr,
            writer: tokio::sync::Mutex::new(writer),
            created_at: SystemTime::now(),
            last_used_ms: AtomicU64::new(unix_millis()),
            tags: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            closed_notify: Notify::new(),
            on_close: Mutex::new(Some(on_close)),
        }
    }

    /// This connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Remote address, as a display string.
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// When the connection was wrapped.
    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// When the connection last completed a read or write.
    pub fn last_used(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.last_used_ms.load(Ordering::Relaxed))
    }

    /// Advance the last-used timestamp to now.
    pub(crate) fn touch(&self) {
        self.last_used_ms.fetch_max(unix_millis(), Ordering::Relaxed);
    }

    /// Get a tag value.
    pub fn tag(&self, key: &str) -> Option<String> {
        self.tags.read().expect("tag lock poisoned").get(key).cloned()
    }

    /// Set a tag, replacing any previous value for the key.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<String>) {
        self.tags
            .write()
            .expect("tag lock poisoned")
            .insert(key.into(), value.into());
    }

    /// Remove a tag. Removing an absent key is a no-op.
    pub fn remove_tag(&self, key: &str) {
        self.tags.write().expect("tag lock poisoned").remove(key);
    }

    /// Snapshot of all tags.
    pub fn tags(&self) -> HashMap<String, String> {
        self.tags.read().expect("tag lock poisoned").clone()
    }

    pub(crate) fn matches_tag(&self, key: &str, value: &str) -> bool {
        self.tags
            .read()
            .expect("tag lock poisoned")
            .get(key)
            .is_some_and(|v| v == value)
    }

    /// Write `data` to the transport, updating last-used on success.
    /// Transport errors are returned unmodified; a send failure does not
    /// close or deregister the connection.
    pub async fn send(&self, data: &[u8]) -> std::io::Result<()> {
        let mut writer = self.writer.lock().await;
        writer.write_all(data).await?;
        writer.flush().await?;
        drop(writer);
        self.touch();
        Ok(())
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Resolves once the connection is closed. Used by the read loop as
    /// its wakeup; there is exactly one waiter, so the stored permit from
    /// `notify_one` cannot be lost.
    pub(crate) async fn closed(&self) {
        self.closed_notify.notified().await;
    }

    /// Close the connection. The first caller wins: the read loop is
    /// woken, the write half is shut down (best effort; skipped if a
    /// write is in flight, drop closes the socket), and the close hook
    /// fires. Later callers return immediately.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.closed_notify.notify_one();

        if let Ok(mut writer) = self.writer.try_lock() {
            let _ = writer.shutdown().await;
        }

        let hook = self.on_close.lock().expect("close hook lock poisoned").take();
        if let Some(hook) = hook {
            hook();
        }

        tracing::debug!(id = %self.id, peer_addr = %self.peer_addr, "Connection closed");
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::sync::Arc;

    fn test_connection(hook: CloseHook) -> Connection {
        let (_client, server) = tokio::io::duplex(256);
        let boxed: BoxedStream = Box::new(server);
        let (_read, write) = tokio::io::split(boxed);
        Connection::new(ConnectionId::new(1), "test-peer".into(), write, hook)
    }

    #[test]
    fn connection_id_display() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
    }

    #[tokio::test]
    async fn tags_round_trip() {
        let conn = test_connection(Box::new(|| {}));

        assert!(conn.tag("room").is_none());
        conn.set_tag("room", "1");
        assert_eq!(conn.tag("room").as_deref(), Some("1"));
        assert!(conn.matches_tag("room", "1"));
        assert!(!conn.matches_tag("room", "2"));

        conn.set_tag("room", "2");
        assert_eq!(conn.tag("room").as_deref(), Some("2"));

        conn.remove_tag("room");
        assert!(conn.tag("room").is_none());
        conn.remove_tag("room");
    }

    #[tokio::test]
    async fn close_hook_fires_exactly_once() {
        let fired = Arc::new(AtomicU32::new(0));
        let hook_fired = fired.clone();
        let conn = Arc::new(test_connection(Box::new(move || {
            hook_fired.fetch_add(1, Ordering::SeqCst);
        })));

        assert!(!conn.is_closed());

        let racers: Vec<_> = (0..8)
            .map(|_| {
                let conn = conn.clone();
                tokio::spawn(async move { conn.close().await })
            })
            .collect();
        for racer in racers {
            racer.await.unwrap();
        }

        assert!(conn.is_closed());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_wakes_waiter() {
        let conn = Arc::new(test_connection(Box::new(|| {})));
        let waiter = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.closed().await })
        };
        conn.close().await;
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter not woken")
            .unwrap();
    }

    #[tokio::test]
    async fn send_updates_last_used() {
        let (client, server) = tokio::io::duplex(256);
        let boxed: BoxedStream = Box::new(server);
        let (_read, write) = tokio::io::split(boxed);
        let conn = Connection::new(ConnectionId::new(2), "test-peer".into(), write, Box::new(|| {}));
        // Keep the far end alive so writes succeed.
        let _client = client;

        let before = conn.last_used();
        tokio::time::sleep(Duration::from_millis(5)).await;
        conn.send(b"hello").await.unwrap();
        let after = conn.last_used();
        assert!(after >= before);
    }
}
