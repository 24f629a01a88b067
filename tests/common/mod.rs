//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use netbridge::{ConnectionId, Handlers};

/// Initialize tracing for a test binary. Safe to call repeatedly.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "netbridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Records every handler invocation for later assertions.
#[derive(Clone, Default)]
pub struct Recorder {
    pub connections: Arc<Mutex<Vec<ConnectionId>>>,
    pub messages: Arc<Mutex<Vec<(ConnectionId, Vec<u8>)>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handlers that record into this recorder.
    pub fn handlers(&self) -> Handlers {
        let connections = self.connections.clone();
        let messages = self.messages.clone();
        Handlers::default()
            .on_connection(move |conn| {
                connections.lock().unwrap().push(conn.id());
            })
            .on_message(move |conn, data| {
                messages.lock().unwrap().push((conn.id(), data));
            })
    }

    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    pub fn messages(&self) -> Vec<(ConnectionId, Vec<u8>)> {
        self.messages.lock().unwrap().clone()
    }
}

/// Poll `cond` every 10 ms until it holds, panicking after two seconds.
pub async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
