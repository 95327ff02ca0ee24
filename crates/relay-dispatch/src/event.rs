//! Event records: the in-memory queue entry and the wire message.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::time::Instant;

/// The pub/sub wire message: `{"type": <string>, "payload": <JSON>}`.
///
/// Batched publish sends one such message per event, never a wrapped array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: Value,
}

impl WireEvent {
    /// Build a wire message.
    #[must_use]
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }
}

/// An event waiting in a channel queue.
#[derive(Debug, Clone)]
pub struct PendingEvent {
    pub event_type: String,
    pub payload: Value,
    /// When the event entered the queue; drives age-based cleanup.
    pub enqueued_at: Instant,
}

impl PendingEvent {
    /// Convert into the wire representation, dropping queue bookkeeping.
    #[must_use]
    pub fn into_wire(self) -> WireEvent {
        WireEvent {
            event_type: self.event_type,
            payload: self.payload,
        }
    }
}
