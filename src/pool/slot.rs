//! # Slot: one reusable bag buffer.
//!
//! A [`Slot`] is created once per index at pool start-up and recycled forever.
//! It has no operations of its own; every mutation goes through the
//! [`Pool`](crate::Pool) so the lifecycle invariants hold.
//!
//! Callers only ever see a [`SlotView`] (an owned snapshot) or hold a
//! [`SlotLease`] (proof of a claim, checked by the pool on every use).

use tokio::time::Instant;

use super::state::{Origin, SlotState};

/// Parsed bag content: CT volume and threat report, both opaque to the pool.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Payload {
    /// Reconstructed volume bytes.
    pub volume: Vec<u8>,
    /// Threat report bytes (may be empty when no threats were reported).
    pub report: Vec<u8>,
}

impl Payload {
    /// Creates a payload from its two parts.
    pub fn new(volume: impl Into<Vec<u8>>, report: impl Into<Vec<u8>>) -> Self {
        Self {
            volume: volume.into(),
            report: report.into(),
        }
    }

    /// Total number of bytes held.
    pub fn len(&self) -> usize {
        self.volume.len() + self.report.len()
    }

    /// True if both parts are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Payload")
            .field("volume_bytes", &self.volume.len())
            .field("report_bytes", &self.report.len())
            .finish()
    }
}

/// Internal slot record, owned by the pool.
#[derive(Debug)]
pub(crate) struct Slot {
    pub index: usize,
    pub state: SlotState,
    /// Bumped on every claim and every flush.
    pub generation: u64,
    pub bag_id: Option<String>,
    pub origin: Option<Origin>,
    pub payload: Option<Payload>,
    pub error_message: Option<String>,
    pub created_at: Option<Instant>,
    pub decision_at: Option<Instant>,
}

impl Slot {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            state: SlotState::Empty,
            generation: 0,
            bag_id: None,
            origin: None,
            payload: None,
            error_message: None,
            created_at: None,
            decision_at: None,
        }
    }

    /// Full recycle: clears everything a previous bag left behind.
    pub fn recycle(&mut self) {
        self.bag_id = None;
        self.origin = None;
        self.payload = None;
        self.error_message = None;
        self.created_at = None;
        self.decision_at = None;
    }

    pub fn view(&self) -> SlotView {
        SlotView {
            index: self.index,
            state: self.state,
            generation: self.generation,
            bag_id: self.bag_id.clone(),
            origin: self.origin,
            has_payload: self.payload.is_some(),
            error_message: self.error_message.clone(),
            created_at: self.created_at,
            decision_at: self.decision_at,
        }
    }
}

/// Point-in-time copy of a slot's fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotView {
    /// Stable index within the pool.
    pub index: usize,
    /// Lifecycle state at snapshot time.
    pub state: SlotState,
    /// Claim generation at snapshot time.
    pub generation: u64,
    /// Bag held by the slot, if any.
    pub bag_id: Option<String>,
    /// Source that filled the slot, if any.
    pub origin: Option<Origin>,
    /// Whether a payload is attached.
    pub has_payload: bool,
    /// Failure description; only set in [`SlotState::Error`].
    pub error_message: Option<String>,
    /// When the current bag claimed the slot.
    pub created_at: Option<Instant>,
    /// When the slot last entered `Disposed` by a decision, auto-clear or acknowledgement.
    pub decision_at: Option<Instant>,
}

impl SlotView {
    /// Lease matching this snapshot. Only valid while the generation is current.
    pub fn lease(&self) -> SlotLease {
        SlotLease {
            index: self.index,
            generation: self.generation,
        }
    }
}

/// Proof that the holder claimed slot `index` at `generation`.
///
/// Lease-guarded pool operations fail once the slot has been flushed or
/// recycled for another bag, even if the state happens to match again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotLease {
    /// Slot index.
    pub index: usize,
    /// Generation observed at claim time.
    pub generation: u64,
}
