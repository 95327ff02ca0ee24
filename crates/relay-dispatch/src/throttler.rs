//! # Event Throttler
//!
//! Per-channel in-memory queues that decide whether an incoming event is
//! published immediately or deferred into the next batch. Deferral is the
//! default; immediate publish is earned by criticality, queue depth, or
//! elapsed time since the channel's last flush.

use crate::event::PendingEvent;
use crate::is_critical;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outcome of submitting an event to the throttler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// The event qualifies for an immediate publish (it was still queued).
    PublishNow,
    /// The event was queued for a later batched flush.
    Queued,
    /// The channel queue is at capacity; the event was not queued.
    Rejected,
}

#[derive(Default)]
struct ThrottlerState {
    queues: HashMap<String, VecDeque<PendingEvent>>,
    last_flush: HashMap<String, Instant>,
}

/// Throttles high-frequency events to reduce broker load.
pub struct EventThrottler {
    state: Mutex<ThrottlerState>,
    flush_interval: Duration,
    size_threshold: usize,
    hard_cap: usize,
}

impl EventThrottler {
    /// Elapsed time after which a channel's queue is due for a flush.
    pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(2);

    /// Queue depth that makes a channel immediately flush-eligible.
    pub const DEFAULT_SIZE_THRESHOLD: usize = 10;

    /// Hard cap on a channel queue; events beyond it are rejected.
    pub const DEFAULT_HARD_CAP: usize = 50;

    /// Maximum event age tolerated by [`cleanup_old_events`](Self::cleanup_old_events).
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(300);

    /// Create a throttler with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(
            Self::DEFAULT_FLUSH_INTERVAL,
            Self::DEFAULT_SIZE_THRESHOLD,
            Self::DEFAULT_HARD_CAP,
        )
    }

    /// Create a throttler with custom thresholds.
    #[must_use]
    pub fn with_settings(flush_interval: Duration, size_threshold: usize, hard_cap: usize) -> Self {
        Self {
            state: Mutex::new(ThrottlerState::default()),
            flush_interval,
            size_threshold,
            hard_cap,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ThrottlerState> {
        // Queue state stays usable even if a holder panicked mid-update.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Submit an event for channel `channel`.
    ///
    /// The event is appended unless the queue is at the hard cap. The
    /// decision reports whether the caller should publish immediately:
    /// critical types always qualify; otherwise queue depth reaching the
    /// size threshold or the flush interval elapsing since the channel's
    /// last flush qualifies.
    pub fn add_event(&self, channel: &str, event_type: &str, payload: Value) -> ThrottleDecision {
        let now = Instant::now();
        let mut guard = self.lock();
        let state = &mut *guard;

        let last_flush = *state
            .last_flush
            .entry(channel.to_string())
            .or_insert(now);
        let queue = state.queues.entry(channel.to_string()).or_default();

        if queue.len() >= self.hard_cap {
            debug!(channel, cap = self.hard_cap, "Channel queue full, event rejected");
            return ThrottleDecision::Rejected;
        }

        queue.push_back(PendingEvent {
            event_type: event_type.to_string(),
            payload,
            enqueued_at: now,
        });

        if is_critical(event_type) {
            return ThrottleDecision::PublishNow;
        }

        if queue.len() >= self.size_threshold
            || now.duration_since(last_flush) >= self.flush_interval
        {
            ThrottleDecision::PublishNow
        } else {
            ThrottleDecision::Queued
        }
    }

    /// Re-evaluate the size/time flush conditions for a channel.
    ///
    /// Used by the periodic flush task; `false` for unknown channels.
    pub fn should_flush(&self, channel: &str) -> bool {
        let now = Instant::now();
        let state = self.lock();

        let Some(queue) = state.queues.get(channel) else {
            return false;
        };
        let Some(last_flush) = state.last_flush.get(channel) else {
            return false;
        };

        queue.len() >= self.size_threshold
            || now.duration_since(*last_flush) >= self.flush_interval
    }

    /// Atomically snapshot and clear a channel's queue.
    ///
    /// Resets the channel's last-flush instant. Events come back in enqueue
    /// order; an unknown channel yields an empty vec.
    pub fn get_events(&self, channel: &str) -> Vec<PendingEvent> {
        let now = Instant::now();
        let mut state = self.lock();

        let Some(queue) = state.queues.get_mut(channel) else {
            return Vec::new();
        };
        let events: Vec<PendingEvent> = queue.drain(..).collect();
        state.last_flush.insert(channel.to_string(), now);
        events
    }

    /// Drop events older than `max_age` from every channel, removing
    /// channels whose queues become empty (and their flush bookkeeping).
    ///
    /// Explicit maintenance operation; nothing calls this automatically.
    pub fn cleanup_old_events(&self, max_age: Duration) {
        let now = Instant::now();
        let mut state = self.lock();

        let mut emptied: Vec<String> = Vec::new();
        for (channel, queue) in &mut state.queues {
            while queue
                .front()
                .is_some_and(|e| now.duration_since(e.enqueued_at) > max_age)
            {
                queue.pop_front();
            }
            if queue.is_empty() {
                emptied.push(channel.clone());
            }
        }

        for channel in emptied {
            state.queues.remove(&channel);
            state.last_flush.remove(&channel);
            debug!(channel = %channel, "Idle channel queue removed");
        }
    }

    /// Current queue depth for a channel (0 for unknown channels).
    pub fn queue_depth(&self, channel: &str) -> usize {
        self.lock().queues.get(channel).map_or(0, VecDeque::len)
    }

    /// Number of channels with live queues.
    pub fn active_channels(&self) -> usize {
        self.lock().queues.len()
    }
}

impl Default for EventThrottler {
    fn default() -> Self {
        Self::new()
    }
}
