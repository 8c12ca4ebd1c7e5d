//! # Slot lifecycle states, state masks and bag origins.
//!
//! [`SlotState`] is the single authoritative lifecycle field of a slot.
//! [`StateMask`] is a compact bit set over those states used by
//! claim/count operations on the [`Pool`](crate::Pool).
//!
//! ## Transition table
//! ```text
//! Empty         ─► Initialised      (intake claims on new bag arrival)
//! Disposed      ─► Initialised      (slot recycled for a new bag)
//! Error         ─► Initialised      (slot recycled for a new bag)
//! Initialised   ─► Construction     (intake begins data transfer)
//! Construction  ─► ReadyToRender    (transfer + validation succeed)
//! Construction  ─► Error            (transfer or validation fails)
//! ReadyToRender ─► Rendering        (display consumer selects slot)
//! Rendering     ─► Disposed         (operator decision or auto-clear)
//! Error         ─► Disposed         (error acknowledged)
//! ```
//! No other edges exist; [`SlotState::can_transition`] is the closed table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a single slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotState {
    /// Never used since start-up.
    Empty,
    /// Claimed by an intake controller, transfer not started yet.
    Initialised,
    /// Bag data is being transferred and validated.
    Construction,
    /// Bag is complete and waiting for the display consumer.
    ReadyToRender,
    /// Bag is on screen.
    Rendering,
    /// Bag has been decided (or flushed); slot is reusable.
    Disposed,
    /// Transfer or validation failed; slot is reusable.
    Error,
}

impl SlotState {
    /// All states, in declaration order.
    pub const ALL: [SlotState; 7] = [
        SlotState::Empty,
        SlotState::Initialised,
        SlotState::Construction,
        SlotState::ReadyToRender,
        SlotState::Rendering,
        SlotState::Disposed,
        SlotState::Error,
    ];

    /// Returns `true` if `self -> to` is an edge of the transition table.
    pub const fn can_transition(self, to: SlotState) -> bool {
        use SlotState::*;
        matches!(
            (self, to),
            (Empty, Initialised)
                | (Disposed, Initialised)
                | (Error, Initialised)
                | (Initialised, Construction)
                | (Construction, ReadyToRender)
                | (Construction, Error)
                | (ReadyToRender, Rendering)
                | (Rendering, Disposed)
                | (Error, Disposed)
        )
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub const fn as_label(self) -> &'static str {
        match self {
            SlotState::Empty => "empty",
            SlotState::Initialised => "initialised",
            SlotState::Construction => "construction",
            SlotState::ReadyToRender => "ready_to_render",
            SlotState::Rendering => "rendering",
            SlotState::Disposed => "disposed",
            SlotState::Error => "error",
        }
    }

    const fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for SlotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Set of [`SlotState`]s.
///
/// ## Example
/// ```rust
/// use bagvisor::{SlotState, StateMask};
///
/// let mask = StateMask::of(&[SlotState::Disposed, SlotState::Error]);
/// assert!(mask.contains(SlotState::Error));
/// assert!(!mask.contains(SlotState::Rendering));
/// assert!(StateMask::FREE.contains(SlotState::Empty));
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateMask(u8);

impl StateMask {
    /// Matches nothing.
    pub const NONE: StateMask = StateMask(0);

    /// States an intake controller may claim: `Empty`, `Disposed`, `Error`.
    pub const FREE: StateMask = StateMask(
        SlotState::Empty.bit() | SlotState::Disposed.bit() | SlotState::Error.bit(),
    );

    /// States holding an in-flight bag:
    /// `Initialised`, `Construction`, `ReadyToRender`, `Rendering`.
    pub const ACTIVE: StateMask = StateMask(
        SlotState::Initialised.bit()
            | SlotState::Construction.bit()
            | SlotState::ReadyToRender.bit()
            | SlotState::Rendering.bit(),
    );

    /// In-flight states that are not on screen yet.
    pub const PENDING: StateMask = StateMask(
        SlotState::Initialised.bit()
            | SlotState::Construction.bit()
            | SlotState::ReadyToRender.bit(),
    );

    /// States whose payload may be snapshotted by the archive bridge.
    pub const ARCHIVABLE: StateMask = StateMask(
        SlotState::Empty.bit()
            | SlotState::Disposed.bit()
            | SlotState::Error.bit()
            | SlotState::Rendering.bit(),
    );

    /// Mask with exactly one state.
    pub const fn only(state: SlotState) -> Self {
        StateMask(state.bit())
    }

    /// Mask over the given states.
    pub fn of(states: &[SlotState]) -> Self {
        states.iter().fold(Self::NONE, |m, s| m.with(*s))
    }

    /// Returns a copy with `state` added.
    pub const fn with(self, state: SlotState) -> Self {
        StateMask(self.0 | state.bit())
    }

    /// Returns `true` if `state` is a member.
    pub const fn contains(self, state: SlotState) -> bool {
        self.0 & state.bit() != 0
    }

    /// Returns `true` if no state is a member.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<SlotState> for StateMask {
    fn from(state: SlotState) -> Self {
        StateMask::only(state)
    }
}

impl fmt::Debug for StateMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(SlotState::ALL.iter().filter(|s| self.contains(**s)))
            .finish()
    }
}

/// Source that filled a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Origin {
    /// Live network feed from the scanner.
    LiveFeed,
    /// Forced review requested by the baggage-handling system.
    BhsForced,
    /// Bag re-assigned to this search station.
    SearchReassigned,
    /// Bag re-loaded from a previously archived record.
    RemoteArchive,
    /// Replay of an archived bag.
    Rerun,
    /// Training library bag.
    Training,
}

impl Origin {
    /// Returns `true` for origins whose content comes from the archive.
    pub const fn is_archived(self) -> bool {
        matches!(self, Origin::RemoteArchive | Origin::Rerun | Origin::Training)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub const fn as_label(self) -> &'static str {
        match self {
            Origin::LiveFeed => "live_feed",
            Origin::BhsForced => "bhs_forced",
            Origin::SearchReassigned => "search_reassigned",
            Origin::RemoteArchive => "remote_archive",
            Origin::Rerun => "rerun",
            Origin::Training => "training",
        }
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}
