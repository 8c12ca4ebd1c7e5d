//! # IntakeWorker: poll loop around one [`IntakeController`].
//!
//! The worker owns the controller's timing: it polls the [`BagSource`] once
//! per poll interval, serves notifications injected through an
//! [`IntakeHandle`], pauses while the session is offline and backs off when the
//! source keeps failing.
//!
//! ```text
//! loop {
//!   select! {
//!     token.cancelled()        ─► exit
//!     inbox.recv()             ─► controller.handle(n)      (online only)
//!     sleep_until(next)        ─► tick():
//!                                    offline   ─► skip, next = now + interval
//!                                    drain source until None
//!                                      Err(Closed) ─► stop polling
//!                                      Err(e)      ─► SourceFailed, next = now + backoff
//!                                    idle edge ─► QueueEmpty
//!     session.changed()        ─► resume at once when back online
//!   }
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use super::controller::{IntakeController, IntakeOutcome};
use super::source::{BagSource, Notification};
use crate::error::SourceError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::RetryBackoff;
use crate::pool::StateMask;
use crate::session::SessionState;

const INBOX_CAPACITY: usize = 16;

/// Sender side of a worker's notification inbox.
#[derive(Clone, Debug)]
pub struct IntakeHandle {
    name: Arc<str>,
    tx: mpsc::Sender<Notification>,
}

impl IntakeHandle {
    /// Name of the controller behind this handle.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues a notification, waiting for inbox space.
    pub async fn submit(&self, n: Notification) -> Result<(), SourceError> {
        self.tx.send(n).await.map_err(|_| SourceError::Closed)
    }

    /// Queues a notification without waiting; a full inbox drops it.
    pub fn try_submit(&self, n: Notification) -> Result<(), SourceError> {
        self.tx.try_send(n).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SourceError::Unavailable {
                error: "intake inbox full".into(),
            },
            mpsc::error::TrySendError::Closed(_) => SourceError::Closed,
        })
    }
}

/// Poll loop for one intake controller.
pub struct IntakeWorker {
    controller: IntakeController,
    source: Option<Arc<dyn BagSource>>,
    inbox: mpsc::Receiver<Notification>,
    session: watch::Receiver<SessionState>,
    poll_interval: Duration,
    backoff: RetryBackoff,
    bus: Bus,
}

impl IntakeWorker {
    /// Creates a worker and the handle feeding its inbox.
    ///
    /// A worker without a source only serves its inbox.
    pub fn new(
        controller: IntakeController,
        source: Option<Arc<dyn BagSource>>,
        session: watch::Receiver<SessionState>,
        poll_interval: Duration,
        backoff: RetryBackoff,
        bus: Bus,
    ) -> (Self, IntakeHandle) {
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let handle = IntakeHandle {
            name: controller.name().into(),
            tx,
        };
        let worker = Self {
            controller,
            source,
            inbox,
            session,
            poll_interval,
            backoff,
            bus,
        };
        (worker, handle)
    }

    /// Name of the controller this worker drives.
    pub fn name(&self) -> &str {
        self.controller.name()
    }

    /// Runs until `token` is cancelled.
    ///
    /// A notification already being handled is finished first, so no slot is
    /// left in `Initialised` or `Construction` by a shutdown.
    pub async fn run(mut self, token: CancellationToken) {
        let mut polling = self.source.is_some();
        let mut inbox_open = true;
        let mut session_open = true;
        let mut failures: u32 = 0;
        let mut idle = false;
        let mut next = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                received = self.inbox.recv(), if inbox_open => match received {
                    Some(n) => {
                        if self.online() {
                            self.controller.handle(&n).await;
                        } else {
                            tracing::debug!(source = self.controller.name(), bag = %n.bag_id, "offline; notification dropped");
                        }
                    }
                    None => inbox_open = false,
                },
                _ = sleep_until(next), if polling => {
                    next = Instant::now() + self.tick(&token, &mut polling, &mut failures, &mut idle).await;
                }
                changed = self.session.changed(), if session_open => {
                    if changed.is_err() {
                        session_open = false;
                    } else if self.online() {
                        next = Instant::now();
                    }
                }
            }
        }
        tracing::debug!(source = self.controller.name(), "intake worker stopped");
    }

    /// One poll tick; returns the delay until the next one.
    async fn tick(
        &self,
        token: &CancellationToken,
        polling: &mut bool,
        failures: &mut u32,
        idle: &mut bool,
    ) -> Duration {
        if !self.online() {
            *idle = false;
            return self.poll_interval;
        }
        let Some(source) = self.source.as_ref() else {
            *polling = false;
            return self.poll_interval;
        };

        while !token.is_cancelled() {
            match source.poll().await {
                Ok(Some(n)) => {
                    *failures = 0;
                    if let IntakeOutcome::Ready(lease) = self.controller.handle(&n).await {
                        tracing::debug!(source = source.name(), slot = lease.index, bag = %n.bag_id, "bag ready");
                    }
                }
                Ok(None) => {
                    *failures = 0;
                    break;
                }
                Err(SourceError::Closed) => {
                    tracing::info!(source = source.name(), "source closed; polling stopped");
                    *polling = false;
                    break;
                }
                Err(e) => {
                    let delay = self.backoff.delay(*failures);
                    *failures = failures.saturating_add(1);
                    tracing::warn!(source = source.name(), error = %e, ?delay, "source poll failed");
                    self.bus.publish(
                        Event::new(EventKind::SourceFailed)
                            .with_source(source.name())
                            .with_reason(e.to_string()),
                    );
                    return delay;
                }
            }
        }

        let now_idle = self.controller.pool().count_in_state(StateMask::ACTIVE) == 0;
        if now_idle && !*idle {
            self.bus
                .publish(Event::new(EventKind::QueueEmpty).with_source(source.name()));
        }
        *idle = now_idle;
        self.poll_interval
    }

    fn online(&self) -> bool {
        self.session.borrow().is_online()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::intake::testing::ScriptedTransfer;
    use crate::policies::AdmissionPolicy;
    use crate::pool::{Origin, Pool, SlotState};

    struct Queue(Mutex<VecDeque<Result<Option<Notification>, SourceError>>>);

    #[async_trait]
    impl BagSource for Queue {
        fn name(&self) -> &str {
            "queue"
        }

        async fn poll(&self) -> Result<Option<Notification>, SourceError> {
            self.0.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }
    }

    fn worker(
        pool: &Arc<Pool>,
        source: Option<Arc<dyn BagSource>>,
        session: watch::Receiver<SessionState>,
        bus: &Bus,
    ) -> (IntakeWorker, IntakeHandle) {
        let controller = IntakeController::new(
            "queue",
            pool.clone(),
            AdmissionPolicy::RetainAndReplace,
            ScriptedTransfer::ok(),
            bus.clone(),
            None,
        );
        IntakeWorker::new(
            controller,
            source,
            session,
            Duration::from_secs(1),
            RetryBackoff::default(),
            bus.clone(),
        )
    }

    async fn wait_for(rx: &mut tokio::sync::broadcast::Receiver<Event>, kind: EventKind) -> Event {
        loop {
            let ev = rx.recv().await.unwrap();
            if ev.kind == kind {
                return ev;
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_source_and_fills_slot() {
        let pool = Arc::new(Pool::new(2));
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let source: Arc<dyn BagSource> = Arc::new(Queue(Mutex::new(VecDeque::from([Ok(Some(
            Notification::new("B1", Origin::LiveFeed),
        ))]))));
        let (_tx, session) = watch::channel(SessionState::Registered);
        let (w, _handle) = worker(&pool, Some(source), session, &bus);

        let token = CancellationToken::new();
        let task = tokio::spawn(w.run(token.clone()));

        wait_for(&mut events, EventKind::SlotReady).await;
        assert_eq!(pool.slot(0).unwrap().state, SlotState::ReadyToRender);

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_source_failure_publishes_and_backs_off() {
        let pool = Arc::new(Pool::new(1));
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let source: Arc<dyn BagSource> = Arc::new(Queue(Mutex::new(VecDeque::from([Err(
            SourceError::Unavailable {
                error: "conn refused".into(),
            },
        )]))));
        let (_tx, session) = watch::channel(SessionState::Registered);
        let (w, _handle) = worker(&pool, Some(source), session, &bus);

        let token = CancellationToken::new();
        let task = tokio::spawn(w.run(token.clone()));

        let failed = wait_for(&mut events, EventKind::SourceFailed).await;
        assert_eq!(failed.reason.as_deref(), Some("source unavailable: conn refused"));
        // Recovered poll is empty and the pool is idle.
        wait_for(&mut events, EventKind::QueueEmpty).await;

        token.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_injects_notification() {
        let pool = Arc::new(Pool::new(1));
        let bus = Bus::new(64);
        let mut events = bus.subscribe();
        let (_tx, session) = watch::channel(SessionState::Registered);
        let (w, handle) = worker(&pool, None, session, &bus);

        let token = CancellationToken::new();
        let task = tokio::spawn(w.run(token.clone()));

        handle
            .submit(Notification::new("A1", Origin::RemoteArchive))
            .await
            .unwrap();
        wait_for(&mut events, EventKind::SlotReady).await;
        assert_eq!(pool.slot(0).unwrap().origin, Some(Origin::RemoteArchive));

        token.cancel();
        task.await.unwrap();
        assert_eq!(
            handle.submit(Notification::new("A2", Origin::RemoteArchive)).await,
            Err(SourceError::Closed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_session_pauses_intake() {
        let pool = Arc::new(Pool::new(1));
        let bus = Bus::new(64);
        let source: Arc<dyn BagSource> = Arc::new(Queue(Mutex::new(VecDeque::from([Ok(Some(
            Notification::new("B1", Origin::LiveFeed),
        ))]))));
        let (tx, session) = watch::channel(SessionState::Unregistered);
        let (w, handle) = worker(&pool, Some(source), session, &bus);

        let token = CancellationToken::new();
        let task = tokio::spawn(w.run(token.clone()));

        handle
            .submit(Notification::new("B9", Origin::LiveFeed))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(pool.count_in_state(StateMask::ACTIVE), 0);

        let mut events = bus.subscribe();
        tx.send(SessionState::Registered).unwrap();
        let ready = wait_for(&mut events, EventKind::SlotReady).await;
        assert_eq!(ready.bag.as_deref(), Some("B1"));

        token.cancel();
        task.await.unwrap();
    }
}
