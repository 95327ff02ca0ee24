//! # Relay Sync - Cross-Process Coordination Primitives
//!
//! Mutual exclusion and idempotency over the shared broker:
//!
//! - [`DistributedLock`]: broker-backed lock built on conditional create
//!   with TTL and an ownership-checked atomic release. The TTL bounds the
//!   blast radius of a crashed holder; the token-checked delete prevents
//!   releasing a lock someone else re-acquired after expiry.
//! - [`EventDeduplicator`]: content-addressed idempotency filter using
//!   create-if-absent markers with a TTL.
//! - [`ConcurrencyManager`]: facade aggregating both, including a
//!   run-under-lock helper with a tagged outcome.
//!
//! Coordination is advisory: nothing stops a caller from touching a
//! resource without taking the lock. The broker schema enforces only the
//! primitives, not the discipline.

pub mod dedup;
pub mod lock;
pub mod manager;

pub use dedup::{ErrorPolicy, EventDeduplicator};
pub use lock::DistributedLock;
pub use manager::{ConcurrencyManager, LockOptions, LockOutcome};

/// Namespace prefix for lock keys.
pub const LOCK_PREFIX: &str = "lock:";

/// Namespace prefix for dedup marker keys.
pub const DEDUP_PREFIX: &str = "event:";
