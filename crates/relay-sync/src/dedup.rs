//! # Event Deduplicator
//!
//! Content-addressed idempotency filter: the first process to see an event
//! plants a marker key with a TTL; anyone who finds the marker already
//! present treats the event as handled. Marker identity comes from a
//! deterministic digest of the event type and its identifying payload
//! fields.

use crate::DEDUP_PREFIX;
use relay_broker::BrokerPool;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// What `is_duplicate` reports when the broker cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Treat the event as new (at-least-once processing survives broker
    /// outages; duplicates may slip through).
    FailOpen,
    /// Treat the event as a duplicate (processing is suppressed until the
    /// broker recovers).
    FailClosed,
}

/// Prevents duplicate event processing across processes.
pub struct EventDeduplicator {
    pool: Arc<BrokerPool>,
    ttl: Duration,
    policy: ErrorPolicy,
}

impl EventDeduplicator {
    /// Marker lifetime: how long "already processed" holds.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

    /// Create a deduplicator with the default TTL and fail-open policy.
    pub fn new(pool: Arc<BrokerPool>) -> Self {
        Self::with_settings(pool, Self::DEFAULT_TTL, ErrorPolicy::FailOpen)
    }

    /// Create a deduplicator with explicit TTL and error policy.
    pub fn with_settings(pool: Arc<BrokerPool>, ttl: Duration, policy: ErrorPolicy) -> Self {
        Self { pool, ttl, policy }
    }

    /// Deterministic marker identity for an event.
    ///
    /// If the payload carries an `"id"` field, only that field (plus the
    /// event type) seeds the digest, so retries with drifting ancillary
    /// fields still collapse to one identity. Otherwise the whole payload
    /// seeds it. Keys serialize sorted, SHA-256, truncated to 16 hex chars,
    /// prefixed with the event type as a readable marker.
    #[must_use]
    pub fn event_id(event_type: &str, payload: &Value) -> String {
        let mut seed = match payload {
            Value::Object(fields) => match fields.get("id") {
                Some(id) => {
                    let mut map = Map::new();
                    map.insert("id".to_string(), id.clone());
                    map
                }
                None => fields.clone(),
            },
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other.clone());
                map
            }
        };
        seed.insert("type".to_string(), json!(event_type));

        // serde_json's default map is BTreeMap-backed, so this serializes
        // with sorted keys and the digest is order-independent.
        let encoded = Value::Object(seed).to_string();
        let digest = Sha256::digest(encoded.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        format!("{event_type}:{}", &hex[..16])
    }

    fn marker_key(event_type: &str, payload: &Value) -> String {
        format!("{DEDUP_PREFIX}{}", Self::event_id(event_type, payload))
    }

    /// Atomic check-and-mark: plant the marker if absent.
    ///
    /// Returns `false` on first sighting (marker created), `true` when the
    /// marker already exists within the TTL window. A transport error is
    /// resolved by the configured [`ErrorPolicy`].
    pub async fn is_duplicate(&self, event_type: &str, payload: &Value) -> bool {
        let key = Self::marker_key(event_type, payload);

        let result = async {
            let broker = self.pool.get_connection().await?;
            broker.set_nx_ex(&key, "1", self.ttl).await
        }
        .await;

        match result {
            Ok(true) => {
                debug!(event_id = %key, "New event marked");
                false
            }
            Ok(false) => {
                debug!(event_id = %key, "Duplicate event detected");
                true
            }
            Err(e) => {
                error!(event_id = %key, error = %e, policy = ?self.policy,
                    "Duplicate check failed");
                matches!(self.policy, ErrorPolicy::FailClosed)
            }
        }
    }

    /// Unconditionally (re)plant the marker with a fresh TTL.
    ///
    /// For callers that decouple the duplicate check from the "mark as
    /// done" step. Returns `false` (logged) on transport error.
    pub async fn mark_processed(&self, event_type: &str, payload: &Value) -> bool {
        let key = Self::marker_key(event_type, payload);

        let result = async {
            let broker = self.pool.get_connection().await?;
            broker.set_ex(&key, "1", self.ttl).await
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(event_id = %key, error = %e, "Failed to mark event processed");
                false
            }
        }
    }
}
