//! # Relay Test Suite
//!
//! Unified test crate exercising the relay crates together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # Cross-crate flows over a shared in-memory broker
//!     ├── dispatch_flow.rs       # Throttled publishing end to end
//!     ├── lock_coordination.rs   # Locks + dedup under contention
//!     ├── config_sync.rs         # Cross-process configuration sync
//!     └── transport_failures.rs  # Degradation when the broker is down
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p relay-tests
//!
//! # By flow
//! cargo test -p relay-tests integration::dispatch_flow
//! cargo test -p relay-tests integration::lock_coordination
//! cargo test -p relay-tests integration::config_sync
//! cargo test -p relay-tests integration::transport_failures
//! ```

#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
