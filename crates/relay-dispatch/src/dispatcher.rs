//! # Event Dispatcher
//!
//! Public facade combining the connection pool, the throttler, and the
//! per-channel flush tasks. Carries the publish counters and the broker
//! maintenance helpers (hash storage, server introspection, queue cleanup).

use crate::event::{PendingEvent, WireEvent};
use crate::throttler::{EventThrottler, ThrottleDecision};
use crate::{is_critical, DEFAULT_CHANNEL, EVENT_MSG_MAP, EVENT_MSG_MAP_KEEP};
use relay_broker::{BrokerError, BrokerPool, ServerStats, Subscription};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How often a flush task re-checks its channel.
const FLUSH_TICK: Duration = Duration::from_secs(1);

#[derive(Default)]
struct Counters {
    published: AtomicU64,
    throttled: AtomicU64,
    batched: AtomicU64,
    rejected: AtomicU64,
}

/// Snapshot of dispatcher counters and sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Events published immediately (single message).
    pub events_published: u64,
    /// Events accepted into a channel queue.
    pub events_throttled: u64,
    /// Events published as part of a batch flush.
    pub events_batched: u64,
    /// Events dropped because a channel queue was at capacity.
    pub events_rejected: u64,
    /// Channels with live queues.
    pub active_channels: usize,
    /// Configured pool connection count.
    pub pool_size: usize,
}

struct FlushTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Throttled, batched publish/subscribe facade over the broker.
pub struct EventDispatcher {
    pool: Arc<BrokerPool>,
    throttler: Arc<EventThrottler>,
    counters: Arc<Counters>,
    flush_tasks: tokio::sync::Mutex<HashMap<String, FlushTask>>,
    shutdown: CancellationToken,
}

impl EventDispatcher {
    /// Create a dispatcher over a shared pool.
    pub fn new(pool: Arc<BrokerPool>) -> Self {
        Self {
            pool,
            throttler: Arc::new(EventThrottler::new()),
            counters: Arc::new(Counters::default()),
            flush_tasks: tokio::sync::Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Publish on the default application channel without forcing.
    pub async fn publish(&self, event_type: &str, payload: Value) -> bool {
        self.publish_on(DEFAULT_CHANNEL, event_type, payload, false)
            .await
    }

    /// Publish an event with optional throttling bypass.
    ///
    /// Returns `true` when the event was published or accepted into a
    /// queue; `false` only when an immediate publish failed. Transport
    /// errors never propagate.
    pub async fn publish_on(
        &self,
        channel: &str,
        event_type: &str,
        payload: Value,
        force: bool,
    ) -> bool {
        if !force {
            match self
                .throttler
                .add_event(channel, event_type, payload.clone())
            {
                ThrottleDecision::Rejected => {
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                    warn!(channel, event_type, "Channel queue full, event dropped");
                    return true;
                }
                ThrottleDecision::Queued => {
                    self.counters.throttled.fetch_add(1, Ordering::Relaxed);
                    debug!(channel, event_type, "Event throttled");
                    self.ensure_flush_task(channel).await;
                    return true;
                }
                ThrottleDecision::PublishNow => {}
            }
        }

        self.counters.published.fetch_add(1, Ordering::Relaxed);

        // Critical events and saturated queues skip the batch path entirely.
        if force
            || is_critical(event_type)
            || self.throttler.queue_depth(channel) >= EventThrottler::DEFAULT_SIZE_THRESHOLD
        {
            return self.publish_immediate(channel, event_type, payload).await;
        }

        // Flush-interval trigger: the event sits in the queue and the next
        // task tick carries it out with the rest of the batch.
        self.ensure_flush_task(channel).await;
        true
    }

    /// Subscribe to the default application channel.
    pub async fn subscribe(&self) -> Result<Subscription, BrokerError> {
        let broker = self.pool.get_connection().await?;
        broker.subscribe(DEFAULT_CHANNEL).await
    }

    async fn publish_immediate(&self, channel: &str, event_type: &str, payload: Value) -> bool {
        let message = match serde_json::to_string(&WireEvent::new(event_type, payload)) {
            Ok(m) => m,
            Err(e) => {
                error!(event_type, error = %e, "Failed to encode event");
                return false;
            }
        };

        match self.pool.get_connection().await {
            Ok(broker) => match broker.publish(channel, &message).await {
                Ok(receivers) => {
                    debug!(channel, event_type, receivers, "Event published");
                    true
                }
                Err(e) => {
                    error!(channel, event_type, error = %e, "Failed to publish event");
                    false
                }
            },
            Err(e) => {
                error!(channel, event_type, error = %e, "Failed to reach broker");
                false
            }
        }
    }

    /// Spawn the channel's flush task if none is live.
    async fn ensure_flush_task(&self, channel: &str) {
        let mut tasks = self.flush_tasks.lock().await;
        if let Some(task) = tasks.get(channel) {
            if !task.handle.is_finished() {
                return;
            }
        }

        let cancel = self.shutdown.child_token();
        let handle = tokio::spawn(flush_loop(
            channel.to_string(),
            Arc::clone(&self.pool),
            Arc::clone(&self.throttler),
            Arc::clone(&self.counters),
            cancel.clone(),
        ));
        tasks.insert(channel.to_string(), FlushTask { cancel, handle });
    }

    /// Store a JSON value in a named broker hash, optionally refreshing the
    /// hash TTL. Errors degrade to `false` with a log record.
    pub async fn store_hash(
        &self,
        name: &str,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> bool {
        let encoded = value.to_string();
        let result: Result<(), BrokerError> = async {
            let broker = self.pool.get_connection().await?;
            broker.hash_set(name, key, &encoded).await?;
            if let Some(ttl) = ttl {
                broker.expire(name, ttl).await?;
            }
            Ok(())
        }
        .await;

        match result {
            Ok(()) => true,
            Err(e) => {
                error!(name, key, error = %e, "Failed to store hash field");
                false
            }
        }
    }

    /// Read a JSON value from a named broker hash.
    pub async fn get_hash(&self, name: &str, key: &str) -> Option<Value> {
        let raw = match self.pool.get_connection().await {
            Ok(broker) => match broker.hash_get(name, key).await {
                Ok(raw) => raw,
                Err(e) => {
                    error!(name, key, error = %e, "Failed to read hash field");
                    return None;
                }
            },
            Err(e) => {
                error!(name, key, error = %e, "Failed to reach broker");
                return None;
            }
        };

        raw.and_then(|s| match serde_json::from_str(&s) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(name, key, error = %e, "Hash field held malformed JSON");
                None
            }
        })
    }

    /// Delete a field from a named broker hash.
    pub async fn delete_hash_key(&self, name: &str, key: &str) -> bool {
        match self.pool.get_connection().await {
            Ok(broker) => match broker.hash_delete(name, key).await {
                Ok(_) => true,
                Err(e) => {
                    error!(name, key, error = %e, "Failed to delete hash field");
                    false
                }
            },
            Err(e) => {
                error!(name, key, error = %e, "Failed to reach broker");
                false
            }
        }
    }

    /// Broker memory/connection introspection; `None` on any failure.
    pub async fn memory_info(&self) -> Option<ServerStats> {
        match self.pool.get_connection().await {
            Ok(broker) => match broker.server_stats().await {
                Ok(stats) => Some(stats),
                Err(e) => {
                    error!(error = %e, "Failed to read server stats");
                    None
                }
            },
            Err(e) => {
                error!(error = %e, "Failed to reach broker");
                None
            }
        }
    }

    /// Maintenance pass: drop aged queue entries and prune the
    /// event-message map down to its most recent entries.
    pub async fn cleanup_expired_data(&self) {
        self.throttler
            .cleanup_old_events(EventThrottler::DEFAULT_MAX_AGE);

        let result: Result<(), BrokerError> = async {
            let broker = self.pool.get_connection().await?;
            let count = broker.hash_len(EVENT_MSG_MAP).await?;
            if count <= EVENT_MSG_MAP_KEEP {
                return Ok(());
            }

            let fields = broker.hash_fields(EVENT_MSG_MAP).await?;
            let excess = fields.len().saturating_sub(EVENT_MSG_MAP_KEEP);
            for field in fields.into_iter().take(excess) {
                broker.hash_delete(EVENT_MSG_MAP, &field).await?;
            }
            info!(removed = excess, "Pruned old event message mappings");
            Ok(())
        }
        .await;

        if let Err(e) = result {
            error!(error = %e, "Failed to clean up expired data");
        }
    }

    /// Pool health probe passthrough.
    pub async fn health_check(&self) -> bool {
        self.pool.health_check().await
    }

    /// Counter and sizing snapshot.
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            events_published: self.counters.published.load(Ordering::Relaxed),
            events_throttled: self.counters.throttled.load(Ordering::Relaxed),
            events_batched: self.counters.batched.load(Ordering::Relaxed),
            events_rejected: self.counters.rejected.load(Ordering::Relaxed),
            active_channels: self.throttler.active_channels(),
            pool_size: self.pool.max_connections(),
        }
    }

    /// Direct throttler access (introspection and tests).
    #[must_use]
    pub fn throttler(&self) -> &EventThrottler {
        &self.throttler
    }

    /// Cancel all flush tasks (each performs a final drain), await them,
    /// then close the pool.
    pub async fn close(&self) {
        self.shutdown.cancel();

        let tasks: Vec<FlushTask> = {
            let mut map = self.flush_tasks.lock().await;
            map.drain().map(|(_, task)| task).collect()
        };
        for task in tasks {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                if !e.is_cancelled() {
                    error!(error = %e, "Flush task ended abnormally");
                }
            }
        }

        self.pool.close().await;
        info!("Event dispatcher closed");
    }
}

/// One cooperative flush task per active channel: wake every second, flush
/// due queues, drain once more on cancellation.
async fn flush_loop(
    channel: String,
    pool: Arc<BrokerPool>,
    throttler: Arc<EventThrottler>,
    counters: Arc<Counters>,
    cancel: CancellationToken,
) {
    let start = tokio::time::Instant::now() + FLUSH_TICK;
    let mut tick = tokio::time::interval_at(start, FLUSH_TICK);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let events = throttler.get_events(&channel);
                if !events.is_empty() {
                    batch_publish(&channel, events, &pool, &counters).await;
                }
                debug!(channel = %channel, "Flush task stopped");
                return;
            }
            _ = tick.tick() => {
                if throttler.should_flush(&channel) {
                    let events = throttler.get_events(&channel);
                    if !events.is_empty() {
                        batch_publish(&channel, events, &pool, &counters).await;
                    }
                }
            }
        }
    }
}

/// Publish a drained batch as individual wire messages over one pipeline.
async fn batch_publish(
    channel: &str,
    events: Vec<PendingEvent>,
    pool: &BrokerPool,
    counters: &Counters,
) {
    let mut messages = Vec::with_capacity(events.len());
    for event in events {
        match serde_json::to_string(&event.into_wire()) {
            Ok(m) => messages.push(m),
            Err(e) => error!(channel, error = %e, "Failed to encode batched event"),
        }
    }
    if messages.is_empty() {
        return;
    }

    let result: Result<usize, BrokerError> = async {
        let broker = pool.get_connection().await?;
        broker.publish_batch(channel, &messages).await
    }
    .await;

    match result {
        Ok(count) => {
            counters.batched.fetch_add(count as u64, Ordering::Relaxed);
            debug!(channel, count, "Batched events published");
        }
        Err(e) => {
            error!(channel, error = %e, "Failed to batch publish events");
        }
    }
}
