//! # DisplayConsumer: the single reader of `ReadyToRender` slots.
//!
//! Wakes on pool changes (never sleeps to poll), puts the lowest-index
//! `ReadyToRender` slot on screen and takes it off again when:
//! - the operator decides on that bag ([`DisplayHandle::decide`]);
//! - the auto-clear deadline, measured from render start, passes;
//! - the pool is flushed underneath it.
//!
//! ```text
//! loop {
//!   reconcile():
//!     shown slot no longer Rendering (same generation)? ─► withdraw, RenderWithdrawn
//!     nothing shown? ─► ReadyToRender → Rendering, present, RenderStarted
//!                       (no readable payload ─► Rendering → Disposed, try the next)
//!   select! {
//!     token.cancelled()        ─► exit
//!     decisions.recv()         ─► matching bag: Rendering → Disposed, SlotDisposed
//!     pool.changed()           ─► reconcile
//!     bus Retain for shown bag ─► renderer.retain, auto-clear suspended
//!     sleep_until(deadline)    ─► Rendering → Disposed, AutoCleared, withdraw
//!   }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::renderer::{Decision, Renderer};
use crate::error::DisplayError;
use crate::events::{Bus, Event, EventKind};
use crate::pool::{Pool, SlotLease, SlotState, StateMask};

const DECISION_CAPACITY: usize = 8;

/// Operator-facing side of the display consumer.
#[derive(Clone)]
pub struct DisplayHandle {
    tx: mpsc::Sender<Decision>,
    pool: Arc<Pool>,
    bus: Bus,
}

impl DisplayHandle {
    /// Delivers an operator decision for the bag on screen.
    ///
    /// A decision for any other bag is ignored by the consumer.
    pub async fn decide(&self, decision: Decision) -> Result<(), DisplayError> {
        self.tx
            .send(decision)
            .await
            .map_err(|_| DisplayError::Stopped)
    }

    /// Acknowledges a failed slot (`Error → Disposed`) so it can be reused.
    ///
    /// Returns `false` if the slot is not in `Error`.
    pub fn acknowledge_error(&self, index: usize) -> bool {
        let Some(view) = self.pool.slot(index) else {
            return false;
        };
        if !self.pool.acknowledge_error(index) {
            return false;
        }
        let mut ev = Event::new(EventKind::ErrorAcknowledged).with_slot(index);
        if let Some(bag) = view.bag_id.as_deref() {
            ev = ev.with_bag(bag);
        }
        self.bus.publish(ev);
        true
    }
}

/// What is on screen right now.
#[derive(Debug)]
struct Showing {
    lease: SlotLease,
    bag_id: String,
    since: Instant,
    retained: bool,
}

/// Single consumer that renders one bag at a time.
pub struct DisplayConsumer {
    pool: Arc<Pool>,
    bus: Bus,
    renderer: Arc<dyn Renderer>,
    auto_clear: Option<Duration>,
    decisions: mpsc::Receiver<Decision>,
}

impl DisplayConsumer {
    /// Creates the consumer and its handle; `auto_clear = None` disables auto-clear.
    pub fn new(
        pool: Arc<Pool>,
        bus: Bus,
        renderer: Arc<dyn Renderer>,
        auto_clear: Option<Duration>,
    ) -> (Self, DisplayHandle) {
        let (tx, decisions) = mpsc::channel(DECISION_CAPACITY);
        let handle = DisplayHandle {
            tx,
            pool: pool.clone(),
            bus: bus.clone(),
        };
        let consumer = Self {
            pool,
            bus,
            renderer,
            auto_clear,
            decisions,
        };
        (consumer, handle)
    }

    /// Runs until `token` is cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        let mut changes = self.pool.subscribe();
        let mut events = self.bus.subscribe();
        let mut decisions_open = true;
        let mut current: Option<Showing> = None;

        loop {
            changes.borrow_and_update();
            self.reconcile(&mut current).await;

            let deadline = current
                .as_ref()
                .filter(|s| !s.retained)
                .and_then(|s| self.auto_clear.map(|d| s.since + d));

            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                decision = self.decisions.recv(), if decisions_open => match decision {
                    Some(d) => self.decide(&mut current, d),
                    None => decisions_open = false,
                },
                changed = changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                ev = events.recv() => match ev {
                    Ok(ev) if ev.kind == EventKind::Retain => self.retain(&mut current, &ev).await,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.auto_clear(&mut current).await;
                }
            }
        }
        tracing::debug!("display consumer stopped");
    }

    /// Detects a flushed slot and puts the next ready bag on screen.
    async fn reconcile(&self, current: &mut Option<Showing>) {
        if let Some(s) = current.as_ref() {
            let still_rendering = self.pool.slot(s.lease.index).is_some_and(|v| {
                v.state == SlotState::Rendering && v.generation == s.lease.generation
            });
            if still_rendering {
                return;
            }
            if let Some(s) = current.take() {
                tracing::info!(slot = s.lease.index, bag = %s.bag_id, "rendered bag withdrawn");
                self.renderer.withdraw(s.lease.index, &s.bag_id).await;
                self.bus.publish(
                    Event::new(EventKind::RenderWithdrawn)
                        .with_slot(s.lease.index)
                        .with_bag(s.bag_id.as_str()),
                );
            }
        }

        while let Some(ready) = self
            .pool
            .claim_by_state_mask(StateMask::only(SlotState::ReadyToRender))
        {
            let Some(lease) = self.pool.transition_leased(
                ready.index,
                SlotState::ReadyToRender,
                SlotState::Rendering,
            ) else {
                return;
            };
            if let Some(showing) = self.present(lease).await {
                *current = Some(showing);
                return;
            }
        }
    }

    /// Hands a freshly claimed `Rendering` slot to the renderer.
    ///
    /// A slot whose bag cannot be read is disposed at once so it never
    /// holds the single `Rendering` place untracked.
    async fn present(&self, lease: SlotLease) -> Option<Showing> {
        let view = self
            .pool
            .slot(lease.index)
            .filter(|v| v.generation == lease.generation && v.state == SlotState::Rendering);
        let (Some(view), Some(payload)) = (view, self.pool.leased_payload(lease)) else {
            if self.pool.dispose(lease) {
                tracing::warn!(slot = lease.index, "ready slot without payload disposed");
                self.bus.publish(
                    Event::new(EventKind::SlotDisposed)
                        .with_slot(lease.index)
                        .with_reason("no_payload"),
                );
            }
            return None;
        };
        let bag_id = view.bag_id.unwrap_or_default();

        self.renderer.present(lease.index, &bag_id, &payload).await;
        let mut ev = Event::new(EventKind::RenderStarted)
            .with_slot(lease.index)
            .with_bag(bag_id.as_str());
        if let Some(origin) = view.origin {
            ev = ev.with_origin(origin);
        }
        self.bus.publish(ev);

        Some(Showing {
            lease,
            bag_id,
            since: Instant::now(),
            retained: false,
        })
    }

    fn decide(&self, current: &mut Option<Showing>, decision: Decision) {
        let Some(s) = current.as_ref().filter(|s| s.bag_id == decision.bag_id) else {
            tracing::debug!(bag = %decision.bag_id, "decision for bag not on screen; ignored");
            return;
        };
        if self.pool.dispose(s.lease) {
            self.bus.publish(
                Event::new(EventKind::SlotDisposed)
                    .with_slot(s.lease.index)
                    .with_bag(s.bag_id.as_str())
                    .with_reason(decision.verdict.as_label()),
            );
            *current = None;
        }
    }

    async fn auto_clear(&self, current: &mut Option<Showing>) {
        let Some(s) = current.as_ref() else {
            return;
        };
        if !self.pool.dispose(s.lease) {
            return;
        }
        if let Some(s) = current.take() {
            tracing::info!(slot = s.lease.index, bag = %s.bag_id, "rendered bag auto-cleared");
            self.renderer.withdraw(s.lease.index, &s.bag_id).await;
            self.bus.publish(
                Event::new(EventKind::AutoCleared)
                    .with_slot(s.lease.index)
                    .with_bag(s.bag_id.as_str()),
            );
        }
    }

    async fn retain(&self, current: &mut Option<Showing>, ev: &Event) {
        let Some(s) = current.as_mut() else {
            return;
        };
        if ev.slot != Some(s.lease.index) || ev.bag.as_deref() != Some(s.bag_id.as_str()) {
            return;
        }
        s.retained = true;
        let incoming = ev.reason.as_deref().unwrap_or_default();
        self.renderer.retain(s.lease.index, &s.bag_id, incoming).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::display::Verdict;
    use crate::policies::AdmissionPolicy;
    use crate::pool::{Origin, Payload};

    #[derive(Default)]
    struct Screen(Mutex<Vec<String>>);

    impl Screen {
        fn log(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Renderer for Screen {
        async fn present(&self, index: usize, bag_id: &str, _payload: &Payload) {
            self.0.lock().unwrap().push(format!("present {index} {bag_id}"));
        }

        async fn withdraw(&self, index: usize, bag_id: &str) {
            self.0.lock().unwrap().push(format!("withdraw {index} {bag_id}"));
        }

        async fn retain(&self, index: usize, bag_id: &str, incoming: &str) {
            self.0
                .lock()
                .unwrap()
                .push(format!("retain {index} {bag_id} for {incoming}"));
        }
    }

    fn ready(pool: &Pool, index: usize, bag: &str) {
        let seen = pool.slot(index).unwrap().state;
        let lease = pool
            .initialise(index, seen, bag, Origin::LiveFeed, &AdmissionPolicy::RetainAndReplace)
            .unwrap()
            .lease;
        assert!(pool.advance(lease, SlotState::Initialised, SlotState::Construction));
        assert!(pool.complete(lease, Payload::new(vec![1], Vec::new())));
    }

    async fn wait_for(rx: &mut broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    }

    struct Rig {
        pool: Arc<Pool>,
        bus: Bus,
        screen: Arc<Screen>,
        handle: DisplayHandle,
        token: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(slots: usize, auto_clear: Option<Duration>) -> Rig {
        let pool = Arc::new(Pool::new(slots));
        let bus = Bus::new(64);
        let screen = Arc::new(Screen::default());
        let (consumer, handle) = DisplayConsumer::new(pool.clone(), bus.clone(), screen.clone(), auto_clear);
        let token = CancellationToken::new();
        let task = tokio::spawn(consumer.run(token.clone()));
        Rig {
            pool,
            bus,
            screen,
            handle,
            token,
            task,
        }
    }

    impl Rig {
        async fn stop(self) {
            self.token.cancel();
            self.task.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_renders_ready_slot_and_disposes_on_decision() {
        let rig = start(2, None);
        let mut events = rig.bus.subscribe();

        ready(&rig.pool, 0, "B1");
        let started = wait_for(&mut events, EventKind::RenderStarted).await;
        assert_eq!(started.slot, Some(0));
        assert_eq!(rig.pool.slot(0).unwrap().state, SlotState::Rendering);

        rig.handle.decide(Decision::new("B9", Verdict::Clear)).await.unwrap();
        rig.handle.decide(Decision::new("B1", Verdict::Suspect)).await.unwrap();
        let disposed = wait_for(&mut events, EventKind::SlotDisposed).await;
        assert_eq!(disposed.reason.as_deref(), Some("suspect"));

        let view = rig.pool.slot(0).unwrap();
        assert_eq!(view.state, SlotState::Disposed);
        assert!(view.decision_at.is_some());
        assert_eq!(rig.screen.log(), vec!["present 0 B1"]);
        rig.stop().await;
    }

    #[tokio::test]
    async fn test_next_ready_slot_follows_disposal() {
        let rig = start(2, None);
        let mut events = rig.bus.subscribe();

        ready(&rig.pool, 0, "B1");
        wait_for(&mut events, EventKind::RenderStarted).await;
        ready(&rig.pool, 1, "B2");

        rig.handle.decide(Decision::new("B1", Verdict::Clear)).await.unwrap();
        let next = wait_for(&mut events, EventKind::RenderStarted).await;
        assert_eq!(next.bag.as_deref(), Some("B2"));
        assert_eq!(rig.pool.count_in_state(StateMask::only(SlotState::Rendering)), 1);
        rig.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_clear_disposes_after_deadline() {
        let rig = start(1, Some(Duration::from_secs(30)));
        let mut events = rig.bus.subscribe();

        ready(&rig.pool, 0, "B1");
        wait_for(&mut events, EventKind::RenderStarted).await;
        let started = Instant::now();

        wait_for(&mut events, EventKind::AutoCleared).await;
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(rig.pool.slot(0).unwrap().state, SlotState::Disposed);
        assert_eq!(rig.screen.log(), vec!["present 0 B1", "withdraw 0 B1"]);
        rig.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retained_bag_is_not_auto_cleared() {
        let rig = start(2, Some(Duration::from_secs(5)));
        let mut events = rig.bus.subscribe();

        ready(&rig.pool, 0, "B1");
        wait_for(&mut events, EventKind::RenderStarted).await;
        rig.bus.publish(
            Event::new(EventKind::Retain)
                .with_slot(0)
                .with_bag("B1")
                .with_reason("B2"),
        );

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(rig.pool.slot(0).unwrap().state, SlotState::Rendering);
        assert_eq!(rig.screen.log(), vec!["present 0 B1", "retain 0 B1 for B2"]);
        rig.stop().await;
    }

    #[tokio::test]
    async fn test_flush_while_rendering_withdraws() {
        let rig = start(1, None);
        let mut events = rig.bus.subscribe();

        ready(&rig.pool, 0, "B1");
        wait_for(&mut events, EventKind::RenderStarted).await;
        rig.pool.flush_all();

        let withdrawn = wait_for(&mut events, EventKind::RenderWithdrawn).await;
        assert_eq!(withdrawn.bag.as_deref(), Some("B1"));
        assert_eq!(rig.screen.log(), vec!["present 0 B1", "withdraw 0 B1"]);

        // A late decision for the flushed bag changes nothing.
        rig.handle.decide(Decision::new("B1", Verdict::Clear)).await.unwrap();
        ready(&rig.pool, 0, "B2");
        let next = wait_for(&mut events, EventKind::RenderStarted).await;
        assert_eq!(next.bag.as_deref(), Some("B2"));
        rig.stop().await;
    }

    #[tokio::test]
    async fn test_payloadless_slot_never_blocks_the_screen() {
        let rig = start(2, None);
        let mut events = rig.bus.subscribe();

        // Raw transitions cannot publish a bag without its payload.
        assert!(rig.pool.transition(0, SlotState::Empty, SlotState::Initialised));
        assert!(rig.pool.transition(0, SlotState::Initialised, SlotState::Construction));
        assert!(!rig.pool.transition(0, SlotState::Construction, SlotState::ReadyToRender));

        assert!(rig.pool.transition(1, SlotState::Empty, SlotState::Initialised));
        let lease = rig.pool.slot(1).unwrap().lease();
        assert!(rig.pool.assign(lease, "B2", Origin::LiveFeed));
        assert!(rig.pool.advance(lease, SlotState::Initialised, SlotState::Construction));
        assert!(rig.pool.complete(lease, Payload::new(vec![1], Vec::new())));
        let started = wait_for(&mut events, EventKind::RenderStarted).await;
        assert_eq!(started.slot, Some(1));
        assert_eq!(started.bag.as_deref(), Some("B2"));

        rig.handle.decide(Decision::new("B2", Verdict::Clear)).await.unwrap();
        wait_for(&mut events, EventKind::SlotDisposed).await;
        let states: Vec<_> = rig.pool.snapshot().into_iter().map(|v| v.state).collect();
        assert_eq!(states, vec![SlotState::Construction, SlotState::Disposed]);
        rig.stop().await;
    }

    #[tokio::test]
    async fn test_acknowledge_error_frees_slot() {
        let rig = start(1, None);
        let seen = rig.pool.slot(0).unwrap().state;
        let lease = rig
            .pool
            .initialise(0, seen, "B1", Origin::LiveFeed, &AdmissionPolicy::SingleFlow)
            .unwrap()
            .lease;
        assert!(rig.pool.advance(lease, SlotState::Initialised, SlotState::Construction));
        assert!(rig.pool.fail(lease, "bad checksum"));

        assert!(rig.handle.acknowledge_error(0));
        assert!(!rig.handle.acknowledge_error(0));
        let view = rig.pool.slot(0).unwrap();
        assert_eq!(view.state, SlotState::Disposed);
        assert!(view.error_message.is_none());
        rig.stop().await;
    }
}
