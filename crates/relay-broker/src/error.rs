//! Broker error types.

use thiserror::Error;

/// Errors from broker operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// The broker could not be reached or the round trip failed.
    #[error("Broker transport error: {reason}")]
    Transport { reason: String },

    /// The broker connection has been closed.
    #[error("Broker connection closed")]
    Closed,

    /// A value could not be encoded or decoded.
    #[error("Broker serialization error: {reason}")]
    Serialization { reason: String },
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Serialization {
            reason: err.to_string(),
        }
    }
}
