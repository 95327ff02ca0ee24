//! # Relay Broker - Shared Broker Abstraction
//!
//! The broker is the shared key-value + pub/sub backing store every other
//! relay crate coordinates through: conditional writes with expiration,
//! atomic compare-and-delete, hash tables, and channel fan-out.
//!
//! ## Components
//!
//! - [`Broker`]: the collaborator trait. Everything the rest of the
//!   workspace needs from the broker goes through this seam.
//! - [`MemoryBroker`]: single-process implementation backed by
//!   `tokio::sync::broadcast` channels and an expiring key-value map.
//!   Suitable for single-node operation and tests; distributed deployments
//!   substitute a networked implementation behind the same trait.
//! - [`BrokerPool`]: lazily-initialized shared handle with a time-gated
//!   health check.
//!
//! ## Failure posture
//!
//! Trait operations return `Result<_, BrokerError>`. Callers in the other
//! relay crates catch transport errors at the call site and degrade to safe
//! defaults rather than propagating them across their public boundaries.

pub mod broker;
pub mod error;
pub mod memory;
pub mod pool;

pub use broker::{Broker, ServerStats, Subscription};
pub use error::BrokerError;
pub use memory::MemoryBroker;
pub use pool::{BrokerConnector, BrokerPool, MemoryConnector};

/// Maximum messages buffered per subscriber before lag kicks in.
pub const SUBSCRIPTION_CAPACITY: usize = 1024;

/// Default maximum connection count a pool asks its connector for.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Default interval between health-check probes, in seconds.
pub const DEFAULT_HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
