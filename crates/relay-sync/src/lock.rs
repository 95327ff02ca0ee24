//! # Distributed Lock
//!
//! Broker-backed mutual exclusion: conditional create with expiration for
//! acquisition, compare-and-delete for release. Each lock instance carries
//! a unique owner token so a holder whose TTL lapsed can never delete a
//! successor's entry.

use crate::LOCK_PREFIX;
use relay_broker::BrokerPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// A single-use distributed lock bound to one key.
///
/// State machine: unacquired → acquired → released. TTL expiry is never
/// observed locally as a transition, but it changes what a later
/// `release()` returns.
pub struct DistributedLock {
    pool: Arc<BrokerPool>,
    key: String,
    token: String,
    ttl: Duration,
    retry_interval: Duration,
    acquired: bool,
}

impl DistributedLock {
    /// Lock entry TTL: auto-release deadline for a crashed holder.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(30);

    /// Pause between acquisition retries.
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

    /// How long a blocking `acquire` keeps trying before giving up.
    pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(5);

    /// Create an unacquired lock for `key` with the default TTL.
    pub fn new(pool: Arc<BrokerPool>, key: &str) -> Self {
        Self::with_ttl(pool, key, Self::DEFAULT_TTL)
    }

    /// Create an unacquired lock with an explicit TTL.
    pub fn with_ttl(pool: Arc<BrokerPool>, key: &str, ttl: Duration) -> Self {
        Self {
            pool,
            key: format!("{LOCK_PREFIX}{key}"),
            token: Uuid::new_v4().to_string(),
            ttl,
            retry_interval: Self::DEFAULT_RETRY_INTERVAL,
            acquired: false,
        }
    }

    /// Fully namespaced broker key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether this instance believes it holds the lock.
    #[must_use]
    pub fn locked(&self) -> bool {
        self.acquired
    }

    /// Attempt to acquire the lock.
    ///
    /// With `wait`, retries on a fixed interval until success or `max_wait`
    /// elapses. Transport errors count as failed attempts and are retried;
    /// with `wait == false` they yield an immediate `false`. Never errors.
    pub async fn acquire(&mut self, wait: bool, max_wait: Duration) -> bool {
        let started = Instant::now();

        loop {
            let attempt = async {
                let broker = self.pool.get_connection().await?;
                broker.set_nx_ex(&self.key, &self.token, self.ttl).await
            }
            .await;

            match attempt {
                Ok(true) => {
                    self.acquired = true;
                    debug!(key = %self.key, "Lock acquired");
                    return true;
                }
                Ok(false) => {
                    if !wait {
                        return false;
                    }
                }
                Err(e) => {
                    error!(key = %self.key, error = %e, "Lock acquisition attempt failed");
                    if !wait {
                        return false;
                    }
                }
            }

            if started.elapsed() >= max_wait {
                warn!(
                    key = %self.key,
                    max_wait_ms = max_wait.as_millis() as u64,
                    "Gave up waiting for lock"
                );
                return false;
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    /// Release the lock.
    ///
    /// No-op returning `false` if this instance never acquired it. The
    /// delete is ownership-checked: it only removes the entry when the
    /// stored token still matches this instance, so a lock that expired and
    /// was re-acquired elsewhere is left alone (logged as a warning).
    pub async fn release(&mut self) -> bool {
        if !self.acquired {
            return false;
        }

        let result = async {
            let broker = self.pool.get_connection().await?;
            broker.compare_and_delete(&self.key, &self.token).await
        }
        .await;

        match result {
            Ok(true) => {
                self.acquired = false;
                debug!(key = %self.key, "Lock released");
                true
            }
            Ok(false) => {
                warn!(key = %self.key, "Lock no longer owned by this instance");
                false
            }
            Err(e) => {
                error!(key = %self.key, error = %e, "Failed to release lock");
                false
            }
        }
    }
}
