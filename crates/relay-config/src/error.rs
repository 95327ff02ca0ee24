//! Configuration error types.

use relay_broker::BrokerError;
use thiserror::Error;

/// Errors from configuration load, persistence, and sync.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The durable store could not be read or written.
    #[error("Config store error: {reason}")]
    Store { reason: String },

    /// The broker broadcast or subscription failed.
    #[error("Config broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A broadcast payload could not be encoded or decoded.
    #[error("Config payload error: {0}")]
    Payload(#[from] serde_json::Error),
}
