//! Cross-crate integration flows.
//!
//! Every test here wires two or more relay crates over one shared
//! [`relay_broker::MemoryBroker`], the same way separate processes would
//! share one broker deployment.

pub mod dispatch_flow;
pub mod lock_coordination;
pub mod transport_failures;
