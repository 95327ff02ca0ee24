//! # In-Memory Broker
//!
//! Single-process [`Broker`] implementation backed by an expiring key-value
//! map and per-channel `tokio::sync::broadcast` fan-out.
//!
//! Suitable for single-node operation and tests; distributed deployments
//! would substitute a networked implementation behind the same trait.
//! Expiry is tracked on `tokio::time::Instant` so tests driving the paused
//! clock can exercise TTL behavior deterministically.

use crate::broker::{Broker, ServerStats, Subscription};
use crate::error::BrokerError;
use crate::SUBSCRIPTION_CAPACITY;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::trace;

/// An expiring key-value entry.
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

/// A named hash table with optional whole-table expiry.
///
/// Fields keep insertion order, matching the broker semantics the
/// event-message map maintenance relies on.
#[derive(Default)]
struct HashTable {
    fields: Vec<(String, String)>,
    expires_at: Option<Instant>,
}

impl HashTable {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| deadline <= now)
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    hashes: HashMap<String, HashTable>,
    channels: HashMap<String, broadcast::Sender<String>>,
}

impl State {
    /// Drop the entry/hash under `key` if its TTL has elapsed.
    fn purge(&mut self, key: &str, now: Instant) {
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }
        if self.hashes.get(key).is_some_and(|h| h.is_expired(now)) {
            self.hashes.remove(key);
        }
    }

    fn sender(&mut self, channel: &str) -> &broadcast::Sender<String> {
        self.channels.entry(channel.to_string()).or_insert_with(|| {
            let (tx, _) = broadcast::channel(SUBSCRIPTION_CAPACITY);
            tx
        })
    }
}

/// In-memory broker. Cloning yields another handle to the same state, the
/// way multiple pooled connections share one server.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Mutex<State>>,
}

impl MemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, BrokerError> {
        self.inner.lock().map_err(|_| BrokerError::Transport {
            reason: "broker state poisoned".to_string(),
        })
    }

    /// Number of live (unexpired) key-value entries. Test/introspection aid.
    pub fn entry_count(&self) -> usize {
        let now = Instant::now();
        self.inner
            .lock()
            .map(|state| state.entries.values().filter(|e| !e.is_expired(now)).count())
            .unwrap_or(0)
    }

    fn human_bytes(bytes: u64) -> String {
        if bytes >= 1024 * 1024 {
            format!("{:.2}M", bytes as f64 / (1024.0 * 1024.0))
        } else if bytes >= 1024 {
            format!("{:.2}K", bytes as f64 / 1024.0)
        } else {
            format!("{bytes}B")
        }
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(key, now);

        if state.entries.contains_key(key) {
            return Ok(false);
        }
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        trace!(key, ttl_secs = ttl.as_secs(), "Conditional create succeeded");
        Ok(true)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(key, now);
        Ok(state.entries.get(key).map(|e| e.value.clone()))
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(key, now);

        match state.entries.get(key) {
            Some(entry) if entry.value == expected => {
                state.entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn hash_set(&self, name: &str, field: &str, value: &str) -> Result<(), BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(name, now);

        let table = state.hashes.entry(name.to_string()).or_default();
        if let Some(slot) = table.fields.iter_mut().find(|(f, _)| f == field) {
            slot.1 = value.to_string();
        } else {
            table.fields.push((field.to_string(), value.to_string()));
        }
        Ok(())
    }

    async fn hash_get(&self, name: &str, field: &str) -> Result<Option<String>, BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(name, now);

        Ok(state.hashes.get(name).and_then(|table| {
            table
                .fields
                .iter()
                .find(|(f, _)| f == field)
                .map(|(_, v)| v.clone())
        }))
    }

    async fn hash_delete(&self, name: &str, field: &str) -> Result<bool, BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(name, now);

        let Some(table) = state.hashes.get_mut(name) else {
            return Ok(false);
        };
        let before = table.fields.len();
        table.fields.retain(|(f, _)| f != field);
        let removed = table.fields.len() < before;
        if table.fields.is_empty() {
            state.hashes.remove(name);
        }
        Ok(removed)
    }

    async fn hash_len(&self, name: &str) -> Result<usize, BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(name, now);
        Ok(state.hashes.get(name).map_or(0, |t| t.fields.len()))
    }

    async fn hash_fields(&self, name: &str) -> Result<Vec<String>, BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(name, now);
        Ok(state
            .hashes
            .get(name)
            .map(|t| t.fields.iter().map(|(f, _)| f.clone()).collect())
            .unwrap_or_default())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, BrokerError> {
        let now = Instant::now();
        let mut state = self.state()?;
        state.purge(key, now);

        if let Some(entry) = state.entries.get_mut(key) {
            entry.expires_at = Some(now + ttl);
            return Ok(true);
        }
        if let Some(table) = state.hashes.get_mut(key) {
            table.expires_at = Some(now + ttl);
            return Ok(true);
        }
        Ok(false)
    }

    async fn publish(&self, channel: &str, message: &str) -> Result<usize, BrokerError> {
        let mut state = self.state()?;
        let receivers = state
            .sender(channel)
            .send(message.to_string())
            .unwrap_or(0);
        trace!(channel, receivers, "Message published");
        Ok(receivers)
    }

    async fn publish_batch(
        &self,
        channel: &str,
        messages: &[String],
    ) -> Result<usize, BrokerError> {
        let mut state = self.state()?;
        let sender = state.sender(channel).clone();
        drop(state);

        for message in messages {
            // A send error only means nobody is listening right now.
            let _ = sender.send(message.clone());
        }
        Ok(messages.len())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let mut state = self.state()?;
        let receiver = state.sender(channel).subscribe();
        Ok(Subscription::new(receiver, channel.to_string()))
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        self.state().map(|_| ())
    }

    async fn server_stats(&self) -> Result<ServerStats, BrokerError> {
        let state = self.state()?;
        let kv_bytes: usize = state
            .entries
            .iter()
            .map(|(k, e)| k.len() + e.value.len())
            .sum();
        let hash_bytes: usize = state
            .hashes
            .iter()
            .map(|(name, t)| {
                name.len()
                    + t.fields
                        .iter()
                        .map(|(f, v)| f.len() + v.len())
                        .sum::<usize>()
            })
            .sum();
        let used = (kv_bytes + hash_bytes) as u64;
        let clients = state
            .channels
            .values()
            .map(|tx| tx.receiver_count() as u64)
            .sum();

        Ok(ServerStats {
            used_memory: used,
            used_memory_human: Self::human_bytes(used),
            max_memory: 0,
            fragmentation_ratio: 1.0,
            connected_clients: clients,
        })
    }
}
