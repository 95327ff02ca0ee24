//! # Relay Dispatch - Throttled Event Distribution
//!
//! The public publish/subscribe facade the rest of an application uses.
//! Low-priority events are queued per channel and flushed in batches by a
//! background task; critical events and full queues bypass the queue and go
//! straight to the broker.
//!
//! ```text
//! publish() ──→ [Throttler] ──queued──→ [Flush Task (1s tick)] ──batch──→ Broker
//!                   │
//!                   └──critical / full / forced──────────immediate──────→ Broker
//! ```
//!
//! ## Failure posture
//!
//! `publish` never raises: an immediate-publish failure is logged and
//! surfaces as `false`. A queued event is reported as success the moment it
//! is accepted by the throttler; there is no retry queue or dead-letter
//! path. Capacity overflow is counted and logged but still reported as
//! overall success (best-effort telemetry posture).

pub mod dispatcher;
pub mod event;
pub mod throttler;

pub use dispatcher::{DispatchStats, EventDispatcher};
pub use event::{PendingEvent, WireEvent};
pub use throttler::{EventThrottler, ThrottleDecision};

/// Default pub/sub channel for application events.
pub const DEFAULT_CHANNEL: &str = "app_events";

/// Event types that always bypass throttling.
pub const CRITICAL_EVENT_TYPES: [&str; 2] = ["error", "critical"];

/// Hash holding event-to-message mappings, pruned during maintenance.
pub const EVENT_MSG_MAP: &str = "event_msg_map";

/// Entries retained in [`EVENT_MSG_MAP`] after a maintenance pass.
pub const EVENT_MSG_MAP_KEEP: usize = 1000;

/// True if the event type belongs to the critical set.
#[must_use]
pub fn is_critical(event_type: &str) -> bool {
    CRITICAL_EVENT_TYPES.contains(&event_type)
}
