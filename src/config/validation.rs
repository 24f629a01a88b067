//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Detect duplicate listener keys before any socket is bound
//! - Validate value ranges (buffer size, port syntax)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: BridgeConfig → Result<(), Vec<ValidationError>>
//! - Addresses are checked syntactically only; name resolution happens at
//!   bind/dial time

use std::collections::HashSet;

use thiserror::Error;

use crate::config::schema::{BridgeConfig, Network};

/// A single semantic problem found in a config.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Two listener entries share a (network, address) key.
    #[error("duplicate listener for {network} {address}")]
    DuplicateListener {
        /// Transport family of the colliding entries.
        network: Network,
        /// Address of the colliding entries.
        address: String,
    },

    /// A listener has an empty address.
    #[error("listener address must not be empty")]
    EmptyAddress,

    /// A TCP address has no parseable port.
    #[error("invalid tcp address '{address}': missing or invalid port")]
    InvalidPort {
        /// The offending address.
        address: String,
    },

    /// The read buffer cannot be zero-sized.
    #[error("read_buffer_size must be greater than zero")]
    ZeroReadBuffer,
}

/// Validate a parsed config, collecting every problem found.
pub fn validate_config(config: &BridgeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.read_buffer_size == 0 {
        errors.push(ValidationError::ZeroReadBuffer);
    }

    let mut seen = HashSet::new();
    for listener in &config.listeners {
        if listener.address.is_empty() {
            errors.push(ValidationError::EmptyAddress);
            continue;
        }

        if listener.network == Network::Tcp && !has_valid_port(&listener.address) {
            errors.push(ValidationError::InvalidPort {
                address: listener.address.clone(),
            });
        }

        if !seen.insert((listener.network, listener.address.clone())) {
            errors.push(ValidationError::DuplicateListener {
                network: listener.network,
                address: listener.address.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn has_valid_port(address: &str) -> bool {
    match address.rsplit_once(':') {
        Some((host, port)) => !host.is_empty() && port.parse::<u16>().is_ok(),
        None => false,
    }
}
