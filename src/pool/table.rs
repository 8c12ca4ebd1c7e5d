//! # Pool: fixed-size slot table with compare-and-swap transitions.
//!
//! The [`Pool`] owns every [`Slot`] and the only lock in the core. All state
//! changes go through [`Pool::transition`] (or one of its lease-guarded
//! variants), which succeeds only if the slot is currently in `from` and
//! `from -> to` is an edge of the transition table.
//!
//! ## Claiming
//! ```text
//! claim_by_state_mask(FREE) ──► optimistic read (no mutation)
//!            │
//!            ▼
//! initialise(idx, seen_state, bag, origin, policy)
//!            ├─ state still == seen_state && policy admits ─► Initialised (lease)
//!            ├─ state moved                                 ─► ClaimError::Lost (re-scan)
//!            └─ policy rejects                              ─► ClaimError::Rejected
//! ```
//!
//! ## Rules
//! - Critical sections are a vector access plus a few field writes; no I/O,
//!   no `.await` while the lock is held.
//! - Every successful mutation bumps the change channel ([`Pool::subscribe`]).
//! - Invariants are checked after every mutation; a violation panics.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::time::Instant;

use super::slot::{Payload, Slot, SlotLease, SlotView};
use super::state::{Origin, SlotState, StateMask};
use crate::error::ClaimError;
use crate::policies::{Admission, AdmissionPolicy, Occupant};

/// Successful verified claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claimed {
    /// Lease on the claimed slot (now `Initialised`).
    pub lease: SlotLease,
    /// What the admission policy decided under the lock.
    pub admission: Admission,
}

/// Fixed-size collection of bag slots.
///
/// Construct once at start-up and share via `Arc<Pool>`.
#[derive(Debug)]
pub struct Pool {
    slots: Mutex<Vec<Slot>>,
    changed: watch::Sender<u64>,
}

impl Pool {
    /// Creates a pool with `slot_count` slots, all `Empty` (minimum 1).
    pub fn new(slot_count: usize) -> Self {
        let slots = (0..slot_count.max(1)).map(Slot::new).collect();
        let (changed, _rx) = watch::channel(0);
        Self {
            slots: Mutex::new(slots),
            changed,
        }
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Always false; a pool has at least one slot.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns a receiver whose value changes after every successful mutation.
    ///
    /// Waiters use `changed().await` instead of polling slot states.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }

    /// Returns the first slot (lowest index) whose state is in `mask`, without changing it.
    ///
    /// The result is only a hint: the caller must confirm it with a
    /// transition, which fails if another caller got there first.
    pub fn claim_by_state_mask(&self, mask: StateMask) -> Option<SlotView> {
        self.lock()
            .iter()
            .find(|s| mask.contains(s.state))
            .map(Slot::view)
    }

    /// Compare-and-swap state change.
    ///
    /// Returns `false` without mutating anything if the slot is not in `from`,
    /// if `from -> to` is not a table edge, or if `to` is `Rendering` while
    /// another slot is already rendering. `ReadyToRender` is only reachable
    /// through [`complete`](Self::complete), which attaches the payload.
    pub fn transition(&self, index: usize, from: SlotState, to: SlotState) -> bool {
        self.mutate(index, None, from, to, |_| {}).is_some()
    }

    /// Like [`transition`](Self::transition) but returns a lease on the slot.
    pub fn transition_leased(
        &self,
        index: usize,
        from: SlotState,
        to: SlotState,
    ) -> Option<SlotLease> {
        self.mutate(index, None, from, to, |_| {})
    }

    /// Number of slots whose state is in `mask`.
    pub fn count_in_state(&self, mask: StateMask) -> usize {
        self.lock().iter().filter(|s| mask.contains(s.state)).count()
    }

    /// Forces every slot to `Disposed`, bypassing the transition table.
    ///
    /// Used on logout and network loss. All outstanding leases become stale.
    /// Returns the number of slots that held an in-flight bag.
    pub fn flush_all(&self) -> usize {
        let discarded = {
            let mut slots = self.lock();
            let mut discarded = 0;
            for slot in slots.iter_mut() {
                if StateMask::ACTIVE.contains(slot.state) {
                    discarded += 1;
                }
                if matches!(slot.state, SlotState::Initialised | SlotState::Construction) {
                    slot.payload = None;
                }
                slot.state = SlotState::Disposed;
                slot.generation += 1;
                slot.error_message = None;
            }
            check_invariants(&slots);
            discarded
        };
        self.notify();
        discarded
    }

    /// Verified claim of a free slot for a new bag.
    ///
    /// Re-checks that slot `index` is still in `seen` and re-evaluates
    /// `policy` against the locked table, then moves the slot to
    /// `Initialised` and records `bag_id`/`origin`.
    pub fn initialise(
        &self,
        index: usize,
        seen: SlotState,
        bag_id: &str,
        origin: Origin,
        policy: &AdmissionPolicy,
    ) -> Result<Claimed, ClaimError> {
        let claimed = {
            let mut slots = self.lock();
            let Some(slot) = slots.get(index) else {
                return Err(ClaimError::Lost);
            };
            if slot.state != seen || !seen.can_transition(SlotState::Initialised) {
                return Err(ClaimError::Lost);
            }

            let admission = policy
                .evaluate(slots.iter().map(occupant), bag_id)
                .map_err(ClaimError::Rejected)?;

            let slot = &mut slots[index];
            enter(slot, SlotState::Initialised);
            slot.bag_id = Some(bag_id.to_owned());
            slot.origin = Some(origin);
            check_invariants(&slots);

            Claimed {
                lease: SlotLease {
                    index,
                    generation: slots[index].generation,
                },
                admission,
            }
        };
        self.notify();
        Ok(claimed)
    }

    /// Records bag identity on a slot claimed through a raw `transition` to `Initialised`.
    pub fn assign(&self, lease: SlotLease, bag_id: &str, origin: Origin) -> bool {
        let ok = {
            let mut slots = self.lock();
            match slots.get_mut(lease.index) {
                Some(slot)
                    if slot.generation == lease.generation
                        && slot.state == SlotState::Initialised =>
                {
                    slot.bag_id = Some(bag_id.to_owned());
                    slot.origin = Some(origin);
                    true
                }
                _ => false,
            }
        };
        if ok {
            self.notify();
        }
        ok
    }

    /// Lease-guarded transition.
    pub fn advance(&self, lease: SlotLease, from: SlotState, to: SlotState) -> bool {
        self.mutate(lease.index, Some(lease.generation), from, to, |_| {})
            .is_some()
    }

    /// `Construction -> ReadyToRender`, attaching the validated payload.
    pub fn complete(&self, lease: SlotLease, payload: Payload) -> bool {
        self.mutate(
            lease.index,
            Some(lease.generation),
            SlotState::Construction,
            SlotState::ReadyToRender,
            move |slot| slot.payload = Some(payload),
        )
        .is_some()
    }

    /// `Construction -> Error`, recording why.
    pub fn fail(&self, lease: SlotLease, message: impl Into<String>) -> bool {
        let message = message.into();
        self.mutate(
            lease.index,
            Some(lease.generation),
            SlotState::Construction,
            SlotState::Error,
            move |slot| slot.error_message = Some(message),
        )
        .is_some()
    }

    /// Lease-guarded `Rendering -> Disposed`.
    pub fn dispose(&self, lease: SlotLease) -> bool {
        self.advance(lease, SlotState::Rendering, SlotState::Disposed)
    }

    /// `Error -> Disposed` once the failure has been acknowledged.
    pub fn acknowledge_error(&self, index: usize) -> bool {
        self.transition(index, SlotState::Error, SlotState::Disposed)
    }

    /// Snapshot of every slot in index order.
    pub fn snapshot(&self) -> Vec<SlotView> {
        self.lock().iter().map(Slot::view).collect()
    }

    /// Snapshot of one slot.
    pub fn slot(&self, index: usize) -> Option<SlotView> {
        self.lock().get(index).map(Slot::view)
    }

    /// Copy of a slot's payload, if it holds one.
    pub fn payload(&self, index: usize) -> Option<Payload> {
        self.lock().get(index).and_then(|s| s.payload.clone())
    }

    /// Copy of a slot's payload together with the slot's current view.
    pub fn read_payload(&self, index: usize) -> Option<(SlotView, Payload)> {
        let slots = self.lock();
        let slot = slots.get(index)?;
        slot.payload.clone().map(|p| (slot.view(), p))
    }

    /// Copy of the payload if `lease` is still current.
    pub fn leased_payload(&self, lease: SlotLease) -> Option<Payload> {
        let slots = self.lock();
        slots
            .get(lease.index)
            .filter(|s| s.generation == lease.generation)
            .and_then(|s| s.payload.clone())
    }

    // ---------------------------
    // Internals
    // ---------------------------

    fn lock(&self) -> MutexGuard<'_, Vec<Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changed.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Single verified-write path shared by every transition.
    fn mutate(
        &self,
        index: usize,
        generation: Option<u64>,
        from: SlotState,
        to: SlotState,
        f: impl FnOnce(&mut Slot),
    ) -> Option<SlotLease> {
        if !from.can_transition(to) {
            return None;
        }
        let lease = {
            let mut slots = self.lock();
            if to == SlotState::Rendering
                && slots
                    .iter()
                    .any(|s| s.index != index && s.state == SlotState::Rendering)
            {
                return None;
            }
            let slot = slots.get_mut(index)?;
            if slot.state != from || generation.is_some_and(|g| g != slot.generation) {
                return None;
            }
            f(slot);
            // Only `complete` attaches a payload; nothing else may publish a bag.
            if to == SlotState::ReadyToRender && slot.payload.is_none() {
                return None;
            }
            enter(slot, to);
            let lease = SlotLease {
                index,
                generation: slot.generation,
            };
            check_invariants(&slots);
            lease
        };
        self.notify();
        Some(lease)
    }
}

/// Applies the side effects of entering `to`.
fn enter(slot: &mut Slot, to: SlotState) {
    match to {
        SlotState::Initialised => {
            slot.recycle();
            slot.generation += 1;
            slot.created_at = Some(Instant::now());
        }
        SlotState::Disposed => {
            slot.error_message = None;
            slot.decision_at = Some(Instant::now());
        }
        _ => {}
    }
    slot.state = to;
}

fn occupant(slot: &Slot) -> Occupant<'_> {
    Occupant {
        index: slot.index,
        state: slot.state,
        bag_id: slot.bag_id.as_deref(),
    }
}

fn check_invariants(slots: &[Slot]) {
    let rendering = slots
        .iter()
        .filter(|s| s.state == SlotState::Rendering)
        .count();
    assert!(rendering <= 1, "pool invariant: {rendering} slots rendering");

    for (i, slot) in slots.iter().enumerate() {
        assert_eq!(slot.index, i, "pool invariant: slot index drifted");
        assert_eq!(
            slot.error_message.is_some(),
            slot.state == SlotState::Error,
            "pool invariant: error message on slot {i} in state {}",
            slot.state
        );
        if slot.state == SlotState::Empty {
            assert!(
                slot.bag_id.is_none() && slot.payload.is_none(),
                "pool invariant: empty slot {i} holds a bag"
            );
        }
        if slot.payload.is_some() {
            assert!(
                matches!(
                    slot.state,
                    SlotState::ReadyToRender | SlotState::Rendering | SlotState::Disposed
                ),
                "pool invariant: payload on slot {i} in state {}",
                slot.state
            );
        }
    }
}
