//! Connection registry: ID → connection table with tag lookups.
//!
//! The registry is instance-owned (one per bridge) and allocates the
//! connection IDs itself from a monotonic counter, so each bridge is
//! independently testable and IDs never collide.
//!
//! # Design
//!
//! - Point lookups and mutations go through one RwLock'd map
//! - Tag filtering snapshots matching connections under the read lock;
//!   callers do their I/O on the snapshot after the lock is released
//! - Tag data itself lives in the Connection under its own lock, so tag
//!   reads never contend with registry-wide scans

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::net::connection::{Connection, ConnectionId};

/// Registry of live connections.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<ConnectionId, Arc<Connection>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate the next connection ID. Relaxed ordering is sufficient
    /// since we only need uniqueness, not synchronization.
    pub fn allocate_id(&self) -> ConnectionId {
        ConnectionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Insert a connection under its ID. Last writer wins if an ID is
    /// ever reused (cannot happen with `allocate_id`).
    pub fn insert(&self, conn: Arc<Connection>) {
        self.connections
            .write()
            .expect("registry lock poisoned")
            .insert(conn.id(), conn);
    }

    /// Remove a connection. Removing an absent ID is a no-op.
    pub fn remove(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .write()
            .expect("registry lock poisoned")
            .remove(&id)
    }

    /// Point lookup.
    pub fn get(&self, id: ConnectionId) -> Option<Arc<Connection>> {
        self.connections
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .cloned()
    }

    /// Snapshot of all connections whose tag `key` equals `value`. Taken
    /// under the read lock, so it cannot race with concurrent
    /// insert/remove.
    pub fn with_tag(&self, key: &str, value: &str) -> Vec<Arc<Connection>> {
        self.connections
            .read()
            .expect("registry lock poisoned")
            .values()
            .filter(|conn| conn.matches_tag(key, value))
            .cloned()
            .collect()
    }

    /// Remove and return every connection. Used by shutdown.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.connections
            .write()
            .expect("registry lock poisoned")
            .drain()
            .map(|(_, conn)| conn)
            .collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections
            .read()
            .expect("registry lock poisoned")
            .len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
