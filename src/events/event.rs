//! # Runtime events emitted by the pool workers.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Slot lifecycle**: a slot moved along the transition table
//! - **Intake outcomes**: notifications dropped, retained or idle signals
//! - **Session/runtime**: connectivity changes, flushes, shutdown
//! - **Subscriber health**: overflow and panics in event consumers
//!
//! The [`Event`] struct carries metadata such as timestamps, slot index,
//! bag id, origin, source name and reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically. Use `seq` to restore order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use bagvisor::{Event, EventKind, Origin};
//!
//! let ev = Event::new(EventKind::SlotFailed)
//!     .with_slot(0)
//!     .with_bag("B1")
//!     .with_origin(Origin::LiveFeed)
//!     .with_reason("checksum mismatch");
//!
//! assert_eq!(ev.kind, EventKind::SlotFailed);
//! assert_eq!(ev.bag.as_deref(), Some("B1"));
//! assert_eq!(ev.slot, Some(0));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::pool::Origin;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Slot lifecycle ===
    /// Slot claimed for a new bag (`-> Initialised`).
    ///
    /// Sets: `slot`, `bag`, `origin`, `source`
    SlotClaimed,

    /// Transfer started (`Initialised -> Construction`).
    ///
    /// Sets: `slot`, `bag`, `origin`, `source`
    TransferStarted,

    /// Transfer and validation succeeded (`Construction -> ReadyToRender`).
    ///
    /// Sets: `slot`, `bag`, `origin`, `source`
    SlotReady,

    /// Transfer or validation failed (`Construction -> Error`).
    ///
    /// Sets: `slot`, `bag`, `origin`, `source`, `reason`
    SlotFailed,

    /// Display consumer put the bag on screen (`ReadyToRender -> Rendering`).
    ///
    /// Sets: `slot`, `bag`, `origin`
    RenderStarted,

    /// Operator decision disposed the bag (`Rendering -> Disposed`).
    ///
    /// Sets: `slot`, `bag`, `reason` (decision)
    SlotDisposed,

    /// Auto-clear timeout disposed the bag (`Rendering -> Disposed`).
    ///
    /// Sets: `slot`, `bag`
    AutoCleared,

    /// Rendered bag vanished without a decision (flush).
    ///
    /// Sets: `slot`, `bag`
    RenderWithdrawn,

    /// Error acknowledged (`Error -> Disposed`).
    ///
    /// Sets: `slot`, `bag`
    ErrorAcknowledged,

    // === Intake outcomes ===
    /// Admission policy dropped the notification.
    ///
    /// Sets: `bag`, `origin`, `source`, `reason` (rejection label)
    AdmissionRejected,

    /// Notification for a bag already on screen or pending.
    ///
    /// Sets: `bag`, `origin`, `source`
    DuplicateDropped,

    /// No slot in a free state.
    ///
    /// Sets: `bag`, `origin`, `source`
    NoFreeSlot,

    /// Keep the displayed bag while a new one is built.
    ///
    /// Sets: `slot` (rendering slot), `bag` (rendering bag), `reason` (incoming bag)
    Retain,

    /// Nothing in flight while online.
    ///
    /// Sets: `source`
    QueueEmpty,

    /// Source poll failed.
    ///
    /// Sets: `source`, `reason`
    SourceFailed,

    // === Session / runtime ===
    /// Every slot forced to `Disposed`.
    ///
    /// Sets: `reason` (cause and discarded count)
    PoolFlushed,

    /// Connectivity changed.
    ///
    /// Sets: `reason` (new state label)
    SessionChanged,

    /// Shutdown requested (OS signal or explicit).
    ShutdownRequested,

    /// All workers stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; some workers did not stop in time.
    GraceExceeded,

    // === Subscriber health ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `source` (subscriber name), `reason`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `source` (subscriber name), `reason`
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Slot index, if applicable.
    pub slot: Option<usize>,
    /// Bag id, if applicable.
    pub bag: Option<Arc<str>>,
    /// Bag origin, if applicable.
    pub origin: Option<Origin>,
    /// Name of the emitting worker (intake controller, subscriber).
    pub source: Option<Arc<str>>,
    /// Human-readable reason (errors, decisions, rejection labels).
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            slot: None,
            bag: None,
            origin: None,
            source: None,
            reason: None,
        }
    }

    /// Attaches a slot index.
    #[inline]
    pub fn with_slot(mut self, index: usize) -> Self {
        self.slot = Some(index);
        self
    }

    /// Attaches a bag id.
    #[inline]
    pub fn with_bag(mut self, bag: impl Into<Arc<str>>) -> Self {
        self.bag = Some(bag.into());
        self
    }

    /// Attaches a bag origin.
    #[inline]
    pub fn with_origin(mut self, origin: Origin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Attaches the emitting worker's name.
    #[inline]
    pub fn with_source(mut self, source: impl Into<Arc<str>>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_source(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_source(subscriber)
            .with_reason(info)
    }

    /// True for events about subscriber health (never re-published to subscribers).
    #[inline]
    pub fn is_subscriber_health(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_is_monotonic() {
        let a = Event::new(EventKind::QueueEmpty);
        let b = Event::new(EventKind::QueueEmpty);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_subscriber_helpers() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_health());
        assert_eq!(ev.source.as_deref(), Some("audit"));
        assert!(!Event::new(EventKind::SlotReady).is_subscriber_health());
    }
}
