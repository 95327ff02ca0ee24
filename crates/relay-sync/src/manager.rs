//! # Concurrency Manager
//!
//! Facade aggregating lock construction and event deduplication, plus a
//! run-under-lock helper that guarantees release.

use crate::dedup::EventDeduplicator;
use crate::lock::DistributedLock;
use relay_broker::BrokerPool;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Outcome of [`ConcurrencyManager::execute_with_lock`].
///
/// A tagged result instead of an `Option` sentinel: lock contention is
/// always distinguishable from a unit of work that legitimately produced
/// an empty value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome<T> {
    /// The lock was held and the unit of work ran to completion.
    Completed(T),
    /// The lock could not be acquired; the unit of work never ran.
    NotAcquired,
}

impl<T> LockOutcome<T> {
    /// The completed value, if any.
    pub fn into_option(self) -> Option<T> {
        match self {
            LockOutcome::Completed(value) => Some(value),
            LockOutcome::NotAcquired => None,
        }
    }

    /// Whether the unit of work ran.
    #[must_use]
    pub fn completed(&self) -> bool {
        matches!(self, LockOutcome::Completed(_))
    }
}

/// Acquisition parameters for [`ConcurrencyManager::execute_with_lock`].
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Lock entry TTL.
    pub ttl: Duration,
    /// Whether to wait for a contended lock.
    pub wait: bool,
    /// Give-up deadline when waiting.
    pub max_wait: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: DistributedLock::DEFAULT_TTL,
            wait: true,
            max_wait: DistributedLock::DEFAULT_MAX_WAIT,
        }
    }
}

/// Aggregates distributed locks and event deduplication behind one handle.
pub struct ConcurrencyManager {
    pool: Arc<BrokerPool>,
    deduplicator: EventDeduplicator,
}

impl ConcurrencyManager {
    /// Create a manager over a shared pool with default dedup settings.
    pub fn new(pool: Arc<BrokerPool>) -> Self {
        let deduplicator = EventDeduplicator::new(Arc::clone(&pool));
        Self { pool, deduplicator }
    }

    /// Construct a fresh lock for `key` with the default TTL.
    ///
    /// Locks are not pooled or cached; every call is an independent
    /// instance with its own owner token.
    #[must_use]
    pub fn lock(&self, key: &str) -> DistributedLock {
        DistributedLock::new(Arc::clone(&self.pool), key)
    }

    /// Construct a fresh lock with an explicit TTL.
    #[must_use]
    pub fn lock_with_ttl(&self, key: &str, ttl: Duration) -> DistributedLock {
        DistributedLock::with_ttl(Arc::clone(&self.pool), key, ttl)
    }

    /// Run a unit of work while holding the lock for `key`.
    ///
    /// If acquisition fails the work never runs and `NotAcquired` is
    /// returned. Otherwise the lock is released after the work completes,
    /// whatever it produced. A panic inside the work leaves the entry to
    /// TTL expiry, the same path a crashed process takes.
    pub async fn execute_with_lock<F, T>(
        &self,
        key: &str,
        work: F,
        options: LockOptions,
    ) -> LockOutcome<T>
    where
        F: Future<Output = T>,
    {
        let mut lock = self.lock_with_ttl(key, options.ttl);

        if !lock.acquire(options.wait, options.max_wait).await {
            warn!(key, "Could not acquire lock for execution");
            return LockOutcome::NotAcquired;
        }

        let value = work.await;
        lock.release().await;
        LockOutcome::Completed(value)
    }

    /// Duplicate check passthrough (atomic check-and-mark).
    pub async fn is_duplicate_event(&self, event_type: &str, payload: &Value) -> bool {
        self.deduplicator.is_duplicate(event_type, payload).await
    }

    /// Processed-marker passthrough.
    pub async fn mark_event_processed(&self, event_type: &str, payload: &Value) -> bool {
        self.deduplicator.mark_processed(event_type, payload).await
    }

    /// Access to the underlying deduplicator.
    #[must_use]
    pub fn deduplicator(&self) -> &EventDeduplicator {
        &self.deduplicator
    }
}
