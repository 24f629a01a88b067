//! Shutdown coordination for the bridge.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::{broadcast, mpsc};

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks subscribe
/// to. Tasks must subscribe before they are spawned so a trigger can
/// never be missed; `is_triggered` covers the window before the first
/// select.
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal. Idempotent.
    pub fn trigger(&self) {
        if !self.triggered.swap(true, Ordering::SeqCst) {
            let _ = self.tx.send(());
        }
    }

    /// Whether shutdown has been triggered.
    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks spawned loops so shutdown can join them.
///
/// Every loop holds a [`TaskGuard`]; `wait` completes once the last
/// guard drops. The channel is never sent on; completion is signalled
/// purely by sender drop.
pub struct TaskTracker {
    guard_tx: Mutex<Option<mpsc::Sender<()>>>,
    done_rx: tokio::sync::Mutex<Option<mpsc::Receiver<()>>>,
}

impl TaskTracker {
    /// Create a new tracker.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            guard_tx: Mutex::new(Some(tx)),
            done_rx: tokio::sync::Mutex::new(Some(rx)),
        }
    }

    /// Register a new loop. Returns `None` once `wait` has begun, so no
    /// new loop can be spawned into a draining bridge.
    pub fn track(&self) -> Option<TaskGuard> {
        self.guard_tx
            .lock()
            .expect("tracker lock poisoned")
            .as_ref()
            .map(|tx| TaskGuard { _tx: tx.clone() })
    }

    /// Block until every outstanding guard has dropped. Subsequent calls
    /// return immediately.
    pub async fn wait(&self) {
        drop(self.guard_tx.lock().expect("tracker lock poisoned").take());

        let rx = self.done_rx.lock().await.take();
        if let Some(mut rx) = rx {
            while rx.recv().await.is_some() {}
        }
    }
}

impl Default for TaskTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard held by a tracked loop for its lifetime.
pub struct TaskGuard {
    _tx: mpsc::Sender<()>,
}
