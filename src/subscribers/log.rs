//! # LogWriter: events as `tracing` records
//!
//! Maps every [`Event`] onto one structured `tracing` record with the
//! `bagvisor::events` target. Lifecycle progress goes out at `debug`,
//! dropped notifications and disposals at `info`, failures at `warn`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! DEBUG bagvisor::events: slot claimed slot=0 bag="B1" origin=live_feed source="live"
//! INFO  bagvisor::events: admission rejected bag="B2" reason="admission_in_flight"
//!  WARN bagvisor::events: slot failed slot=0 bag="B1" reason="transfer timed out after 30s"
//! INFO  bagvisor::events: pool flushed reason="unregistered discarded=1"
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Tracing-backed event writer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let slot = e.slot;
        let bag = e.bag.as_deref();
        let origin = e.origin.map(|o| o.as_label());
        let source = e.source.as_deref();
        let reason = e.reason.as_deref();

        macro_rules! record {
            ($lvl:ident, $msg:literal) => {
                $lvl!(
                    target: "bagvisor::events",
                    seq = e.seq,
                    slot = ?slot,
                    bag = ?bag,
                    origin = ?origin,
                    source = ?source,
                    reason = ?reason,
                    $msg
                )
            };
        }

        match e.kind {
            EventKind::SlotClaimed => record!(debug, "slot claimed"),
            EventKind::TransferStarted => record!(debug, "transfer started"),
            EventKind::SlotReady => record!(debug, "slot ready"),
            EventKind::RenderStarted => record!(debug, "render started"),
            EventKind::QueueEmpty => record!(debug, "queue empty"),
            EventKind::SlotDisposed => record!(info, "slot disposed"),
            EventKind::AutoCleared => record!(info, "slot auto-cleared"),
            EventKind::ErrorAcknowledged => record!(info, "error acknowledged"),
            EventKind::AdmissionRejected => record!(info, "admission rejected"),
            EventKind::DuplicateDropped => record!(info, "duplicate dropped"),
            EventKind::NoFreeSlot => record!(info, "no free slot"),
            EventKind::Retain => record!(info, "retain displayed bag"),
            EventKind::PoolFlushed => record!(info, "pool flushed"),
            EventKind::SessionChanged => record!(info, "session changed"),
            EventKind::ShutdownRequested => record!(info, "shutdown requested"),
            EventKind::AllStoppedWithin => record!(info, "all workers stopped within grace"),
            EventKind::SlotFailed => record!(warn, "slot failed"),
            EventKind::RenderWithdrawn => record!(warn, "render withdrawn"),
            EventKind::SourceFailed => record!(warn, "source failed"),
            EventKind::GraceExceeded => record!(warn, "grace exceeded"),
            EventKind::SubscriberOverflow => record!(warn, "subscriber overflow"),
            EventKind::SubscriberPanicked => record!(warn, "subscriber panicked"),
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
