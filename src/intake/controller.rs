//! # IntakeController: turns a bag notification into a filled slot.
//!
//! One controller per bag source. [`IntakeController::handle`] runs the whole
//! path for one notification and always leaves the slot in a resting state
//! (`ReadyToRender` or `Error`) before returning, unless the pool was flushed
//! underneath it.
//!
//! ## Flow
//! ```text
//! handle(bag, origin)
//!   ├─► policy.evaluate(snapshot)        ─ reject ─► AdmissionRejected / DuplicateDropped
//!   ├─► loop {
//!   │     claim_by_state_mask(FREE)      ─ none ───► NoFreeSlot
//!   │     initialise(idx, seen, ...)     ─ Lost ───► re-scan
//!   │                                    ─ Rejected► AdmissionRejected
//!   │   }                                 (Retain ─► publish Retain)
//!   ├─► transfer.begin(bag)               (slot: Initialised)
//!   ├─► Initialised → Construction
//!   ├─► drain chunks, assemble, validate  (bounded by transfer_timeout)
//!   └─► Ok  ─► Construction → ReadyToRender (payload attached)
//!       Err ─► Construction → Error         (message recorded)
//! ```
//!
//! ## Rules
//! - Transfers run outside the pool lock.
//! - A lost claim is not an error; the controller re-scans.
//! - A stale lease (slot flushed mid-transfer) discards the result silently.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{Instant, timeout_at};

use super::source::Notification;
use super::transfer::{ChunkStream, PayloadAssembler, Transfer};
use crate::error::{ClaimError, TransferError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::{Admission, AdmissionPolicy, Occupant, Rejection};
use crate::pool::{Claimed, Payload, Pool, SlotLease, SlotState, StateMask};

/// Result of handling one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntakeOutcome {
    /// Slot is `ReadyToRender`.
    Ready(SlotLease),
    /// Slot is `Error`; it can be reclaimed by the next notification.
    Failed(SlotLease, TransferError),
    /// Admission policy dropped the notification.
    Rejected(Rejection),
    /// No slot was free.
    NoFreeSlot,
    /// The pool was flushed while the bag was being built.
    Flushed(SlotLease),
}

/// Per-source intake controller.
pub struct IntakeController {
    name: Arc<str>,
    pool: Arc<Pool>,
    policy: AdmissionPolicy,
    transfer: Arc<dyn Transfer>,
    bus: Bus,
    transfer_timeout: Option<Duration>,
}

impl IntakeController {
    /// Creates a controller; `transfer_timeout = None` leaves transfers unbounded.
    pub fn new(
        name: impl Into<Arc<str>>,
        pool: Arc<Pool>,
        policy: AdmissionPolicy,
        transfer: Arc<dyn Transfer>,
        bus: Bus,
        transfer_timeout: Option<Duration>,
    ) -> Self {
        Self {
            name: name.into(),
            pool,
            policy,
            transfer,
            bus,
            transfer_timeout,
        }
    }

    /// Controller name (used as `source` in events).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Admission policy this controller enforces.
    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    /// Pool this controller fills.
    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Handles one "bag available" notification end to end.
    pub async fn handle(&self, n: &Notification) -> IntakeOutcome {
        match self.claim(n) {
            Ok(claimed) => self.fill(claimed.lease, n).await,
            Err(outcome) => outcome,
        }
    }

    /// Admission check plus verified claim of the lowest free slot.
    fn claim(&self, n: &Notification) -> Result<Claimed, IntakeOutcome> {
        let snapshot = self.pool.snapshot();
        let occupants = snapshot.iter().map(|v| Occupant {
            index: v.index,
            state: v.state,
            bag_id: v.bag_id.as_deref(),
        });
        if let Err(rejection) = self.policy.evaluate(occupants, &n.bag_id) {
            return Err(self.rejected(n, rejection));
        }

        // Each lost race means another caller moved a slot forward, so the
        // number of useful retries is bounded by the pool size.
        for _ in 0..=self.pool.len() {
            let Some(free) = self.pool.claim_by_state_mask(StateMask::FREE) else {
                break;
            };
            match self
                .pool
                .initialise(free.index, free.state, &n.bag_id, n.origin, &self.policy)
            {
                Ok(claimed) => {
                    if let Admission::Retain { index, bag_id } = &claimed.admission {
                        self.bus.publish(
                            Event::new(EventKind::Retain)
                                .with_slot(*index)
                                .with_bag(bag_id.as_str())
                                .with_source(self.name.clone())
                                .with_reason(n.bag_id.as_str()),
                        );
                    }
                    self.publish(EventKind::SlotClaimed, claimed.lease.index, n);
                    return Ok(claimed);
                }
                Err(ClaimError::Lost) => continue,
                Err(ClaimError::Rejected(rejection)) => return Err(self.rejected(n, rejection)),
            }
        }

        tracing::info!(source = %self.name, bag = %n.bag_id, "no free slot; notification dropped");
        self.bus.publish(
            Event::new(EventKind::NoFreeSlot)
                .with_bag(n.bag_id.as_str())
                .with_origin(n.origin)
                .with_source(self.name.clone()),
        );
        Err(IntakeOutcome::NoFreeSlot)
    }

    /// Drives a claimed slot through `Construction` to a resting state.
    async fn fill(&self, lease: SlotLease, n: &Notification) -> IntakeOutcome {
        let deadline = self.transfer_timeout.map(|t| (Instant::now() + t, t));

        let started = bounded(deadline, self.transfer.begin(&n.bag_id, n.origin)).await;

        if !self
            .pool
            .advance(lease, SlotState::Initialised, SlotState::Construction)
        {
            return self.flushed(lease, n);
        }
        self.publish(EventKind::TransferStarted, lease.index, n);

        let result = match started {
            Ok(stream) => bounded(deadline, drain(stream)).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(payload) => {
                if !self.pool.complete(lease, payload) {
                    return self.flushed(lease, n);
                }
                self.publish(EventKind::SlotReady, lease.index, n);
                IntakeOutcome::Ready(lease)
            }
            Err(error) => {
                if !self.pool.fail(lease, error.to_string()) {
                    return self.flushed(lease, n);
                }
                tracing::warn!(
                    source = %self.name,
                    slot = lease.index,
                    bag = %n.bag_id,
                    error = %error,
                    label = error.as_label(),
                    "bag transfer failed"
                );
                self.bus.publish(
                    Event::new(EventKind::SlotFailed)
                        .with_slot(lease.index)
                        .with_bag(n.bag_id.as_str())
                        .with_origin(n.origin)
                        .with_source(self.name.clone())
                        .with_reason(error.to_string()),
                );
                IntakeOutcome::Failed(lease, error)
            }
        }
    }

    fn rejected(&self, n: &Notification, rejection: Rejection) -> IntakeOutcome {
        let kind = match rejection {
            Rejection::Duplicate => EventKind::DuplicateDropped,
            _ => EventKind::AdmissionRejected,
        };
        tracing::info!(
            source = %self.name,
            bag = %n.bag_id,
            reason = rejection.as_label(),
            "notification dropped by admission policy"
        );
        self.bus.publish(
            Event::new(kind)
                .with_bag(n.bag_id.as_str())
                .with_origin(n.origin)
                .with_source(self.name.clone())
                .with_reason(rejection.as_label()),
        );
        IntakeOutcome::Rejected(rejection)
    }

    fn flushed(&self, lease: SlotLease, n: &Notification) -> IntakeOutcome {
        tracing::debug!(source = %self.name, slot = lease.index, bag = %n.bag_id, "slot flushed during intake");
        IntakeOutcome::Flushed(lease)
    }

    fn publish(&self, kind: EventKind, index: usize, n: &Notification) {
        self.bus.publish(
            Event::new(kind)
                .with_slot(index)
                .with_bag(n.bag_id.as_str())
                .with_origin(n.origin)
                .with_source(self.name.clone()),
        );
    }
}

async fn drain(mut stream: ChunkStream) -> Result<Payload, TransferError> {
    let mut assembler = PayloadAssembler::default();
    while let Some(chunk) = stream.next().await {
        assembler.push(chunk?);
    }
    assembler.finish()
}

/// Runs `fut` against the shared transfer deadline, if any.
async fn bounded<T>(
    deadline: Option<(Instant, Duration)>,
    fut: impl Future<Output = Result<T, TransferError>>,
) -> Result<T, TransferError> {
    match deadline {
        Some((at, timeout)) => timeout_at(at, fut)
            .await
            .unwrap_or(Err(TransferError::Timeout { timeout })),
        None => fut.await,
    }
}
