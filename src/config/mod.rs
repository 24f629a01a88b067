//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BridgeConfig (validated, immutable)
//!     → owned by the Bridge for its lifetime
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the bridge never reloads it
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BridgeConfig;
pub use schema::DialerConfig;
pub use schema::ListenerConfig;
pub use schema::Network;
