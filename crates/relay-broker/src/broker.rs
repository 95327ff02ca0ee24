//! # Broker Trait
//!
//! Defines the collaborator interface consumed by the dispatch, sync, and
//! config crates: conditional-set-with-expiration, atomic compare-and-delete,
//! hash get/set/delete, publish/subscribe, pipelined batch publish, and a
//! round-trip probe with server introspection.

use crate::error::BrokerError;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;

/// Server memory and connection statistics.
///
/// Memory footprint, fragmentation, and client count, exposed for operator
/// dashboards and maintenance jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerStats {
    /// Bytes currently used by the broker.
    pub used_memory: u64,
    /// Human-readable rendering of `used_memory`.
    pub used_memory_human: String,
    /// Configured memory ceiling (0 = unlimited).
    pub max_memory: u64,
    /// Ratio of resident to logically-used memory.
    pub fragmentation_ratio: f64,
    /// Number of connected clients.
    pub connected_clients: u64,
}

/// Shared key-value + pub/sub broker.
///
/// Implementations must make `set_nx_ex` and `compare_and_delete` atomic
/// with respect to concurrent callers; the distributed lock and the event
/// deduplicator are built directly on those two guarantees.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Conditional create with expiration: set `key` to `value` only if the
    /// key does not already exist.
    ///
    /// Returns `true` if the key was absent and is now set.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, BrokerError>;

    /// Unconditional write with expiration.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError>;

    /// Read a key. `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, BrokerError>;

    /// Atomically delete `key` only if its current value equals `expected`.
    ///
    /// Returns `true` only if an entry was actually removed. This is the
    /// primitive behind ownership-checked lock release.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, BrokerError>;

    /// Set a field in a named hash.
    async fn hash_set(&self, name: &str, field: &str, value: &str) -> Result<(), BrokerError>;

    /// Read a field from a named hash.
    async fn hash_get(&self, name: &str, field: &str) -> Result<Option<String>, BrokerError>;

    /// Delete a field from a named hash. Returns `true` if the field existed.
    async fn hash_delete(&self, name: &str, field: &str) -> Result<bool, BrokerError>;

    /// Number of fields in a named hash.
    async fn hash_len(&self, name: &str) -> Result<usize, BrokerError>;

    /// All field names of a hash, in insertion order.
    async fn hash_fields(&self, name: &str) -> Result<Vec<String>, BrokerError>;

    /// Set or refresh the expiration of a key (or hash). Returns `true` if
    /// the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BrokerError>;

    /// Publish a single message to a channel.
    ///
    /// Returns the number of subscribers that received it.
    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BrokerError>;

    /// Pipelined publish: one wire message per entry, in order.
    ///
    /// Returns the number of messages published.
    async fn publish_batch(&self, channel: &str, messages: &[String])
        -> Result<usize, BrokerError>;

    /// Subscribe to a channel, receiving messages published after this call.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;

    /// Round-trip probe.
    async fn ping(&self) -> Result<(), BrokerError>;

    /// Memory and connection introspection.
    async fn server_stats(&self) -> Result<ServerStats, BrokerError>;
}

/// A live subscription handle for one channel.
///
/// Messages arrive in publish order. A slow consumer may lag; lagged
/// messages are skipped (and logged) rather than erroring the stream.
pub struct Subscription {
    receiver: broadcast::Receiver<String>,
    channel: String,
}

impl Subscription {
    pub(crate) fn new(receiver: broadcast::Receiver<String>, channel: String) -> Self {
        Self { receiver, channel }
    }

    /// The channel this subscription is bound to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next message.
    ///
    /// Returns `None` when the broker side is closed.
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Closed) => return None,
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(
                        channel = %self.channel,
                        lagged = count,
                        "Subscriber lagged, messages skipped"
                    );
                }
            }
        }
    }

    /// Try to receive a message without blocking.
    ///
    /// `Ok(None)` means no message is currently available; `Err` means the
    /// broker side is closed.
    pub fn try_recv(&mut self) -> Result<Option<String>, BrokerError> {
        loop {
            match self.receiver.try_recv() {
                Ok(msg) => return Ok(Some(msg)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(BrokerError::Closed),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            }
        }
    }

    /// Convert into a `Stream` of messages, silently skipping lagged gaps.
    pub fn into_stream(self) -> impl Stream<Item = String> {
        BroadcastStream::new(self.receiver).filter_map(|item| match item {
            Ok(msg) => Some(msg),
            Err(BroadcastStreamRecvError::Lagged(_)) => None,
        })
    }
}
