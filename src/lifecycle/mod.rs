//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     close() → Shutdown::trigger → accept loops and read loops exit
//!     → TaskTracker::wait completes once the last loop drops its guard
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: signal first, then close connections, then join
//! - Cancellation is cooperative; loops observe the signal at select
//!   points, never by preemption

pub mod shutdown;

pub use shutdown::Shutdown;
pub use shutdown::{TaskGuard, TaskTracker};
