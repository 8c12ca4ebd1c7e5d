//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for plugging event consumers into the
//! workstation runtime: UI status bars, audit logs, metrics exporters.
//!
//! Each subscriber gets:
//! - **Dedicated worker task** (runs independently)
//! - **Per-subscriber bounded queue** (capacity via [`Subscribe::queue_capacity`])
//! - **Panic isolation** (panics are reported as `EventKind::SubscriberPanicked`)
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use bagvisor::{Event, EventKind, Subscribe};
//!
//! struct IdleLamp;
//!
//! #[async_trait]
//! impl Subscribe for IdleLamp {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::QueueEmpty) {
//!             // switch the console to its idle visual state
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "idle-lamp" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of runtime events.
///
/// ### Implementation requirements
/// - Use async I/O; avoid blocking the executor.
/// - Handle errors internally; do not panic.
/// - Slow processing affects only this subscriber's queue.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes a single event, in FIFO order per subscriber.
    async fn on_event(&self, event: &Event);

    /// Subscriber name used in overflow/panic events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to a minimum of 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
