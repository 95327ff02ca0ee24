//! # Relay Config - Cross-Process Configuration Sync
//!
//! A process-wide configuration cache loaded wholesale from a durable
//! store at startup and kept consistent across processes by broadcasting
//! every write on a fixed broker channel.
//!
//! ```text
//! Process A: set("k", v) ──→ local cache ──→ [store upsert + broadcast]
//!                                                       │
//! Process B: listener ←── cfg_updates channel ←─────────┘
//! ```
//!
//! Values are tagged scalars ([`ConfigValue`]): the string-to-type coercion
//! ladder runs once at ingest, not on every read.

pub mod error;
pub mod store;
pub mod synced;
pub mod value;

pub use error::ConfigError;
pub use store::{ConfigStore, MemoryConfigStore};
pub use synced::SyncedConfig;
pub use value::ConfigValue;

/// Fixed broadcast channel for configuration change notifications.
pub const CONFIG_CHANNEL: &str = "cfg_updates";
