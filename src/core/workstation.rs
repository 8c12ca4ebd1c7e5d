//! # Workstation: wires the pool, its workers and event delivery together.
//!
//! The [`Workstation`] owns the [`Pool`], the event [`Bus`] and a
//! [`SubscriberSet`]. [`Workstation::run`] spawns one intake worker per bag
//! source (plus one serving archive commands), the display consumer and the
//! session watcher, then waits for a stop trigger and shuts everything down
//! within [`Config::grace`].
//!
//! ## High-level architecture
//! ```text
//! WorkstationBuilder::build()
//!   - Pool::new(cfg.slot_count), Bus::new(cfg.bus_capacity)
//!   - policy = cfg.roles.policy_for(cfg.role)            (once)
//!   - transfer = OriginRouter(live transfer, ArchiveBridge)
//!   - per source: IntakeController + IntakeWorker
//!   - "archive-commands" IntakeWorker (no source) ─► ArchiveCommands
//!   - DisplayConsumer + DisplayHandle, SessionWatcher
//!
//! run():
//!   event_listener(): Bus.subscribe() ─► SubscriberSet::emit(&Event)
//!   spawn workers (child tokens, AliveGuard each)
//!   stop_requested(): OS signal | shutdown()
//!        └─► publish ShutdownRequested
//!        └─► token.cancel()
//!        └─► wait_all_with_grace(cfg.grace):
//!               ├─ all joined   → AllStoppedWithin, Ok(())
//!               └─ timeout      → GraceExceeded, Err(GraceExceeded { stuck })
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use futures::{StreamExt, stream};
//! use bagvisor::{
//!     ChunkStream, Config, Origin, Payload, Renderer, Transfer, TransferChunk,
//!     TransferError, Workstation,
//! };
//!
//! struct Scanner;
//!
//! #[async_trait]
//! impl Transfer for Scanner {
//!     async fn begin(&self, _bag: &str, _origin: Origin) -> Result<ChunkStream, TransferError> {
//!         Ok(stream::iter(vec![Ok(TransferChunk::Volume(vec![0; 16]))]).boxed())
//!     }
//! }
//!
//! struct Screen;
//!
//! #[async_trait]
//! impl Renderer for Screen {
//!     async fn present(&self, index: usize, bag_id: &str, _payload: &Payload) {
//!         println!("slot {index}: {bag_id}");
//!     }
//!     async fn withdraw(&self, _index: usize, _bag_id: &str) {}
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let ws = Workstation::builder(Config::default())
//!         .with_transfer(Arc::new(Scanner))
//!         .with_renderer(Arc::new(Screen))
//!         .build()?;
//!     ws.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::alive::AliveTracker;
use super::builder::WorkstationBuilder;
use super::shutdown;
use crate::{
    archive::{ArchiveBridge, ArchiveCommands, OriginRouter},
    config::Config,
    display::{DisplayConsumer, DisplayHandle, Renderer},
    error::RuntimeError,
    events::{Bus, Event, EventKind},
    intake::{BagSource, IntakeController, IntakeHandle, IntakeWorker, Transfer},
    pool::Pool,
    session::{SessionState, SessionWatcher},
    subscribers::SubscriberSet,
};

const COMMANDS_INTAKE: &str = "archive-commands";

/// Workers created at build time and started by the first `run()`.
struct Parts {
    workers: Vec<IntakeWorker>,
    consumer: DisplayConsumer,
    watcher: SessionWatcher,
}

/// Screening workstation runtime.
pub struct Workstation {
    cfg: Config,
    pool: Arc<Pool>,
    bus: Bus,
    subs: Arc<SubscriberSet>,
    alive: AliveTracker,
    token: CancellationToken,
    display: DisplayHandle,
    commands: ArchiveCommands,
    intakes: Vec<IntakeHandle>,
    parts: Mutex<Option<Parts>>,
    // Keeps the fallback session channel open when none was supplied.
    _session: Option<watch::Sender<SessionState>>,
}

impl Workstation {
    /// Starts building a workstation from `cfg`.
    pub fn builder(cfg: Config) -> WorkstationBuilder {
        WorkstationBuilder::new(cfg)
    }

    pub(super) fn assemble(
        b: WorkstationBuilder,
        live: Arc<dyn Transfer>,
        renderer: Arc<dyn Renderer>,
    ) -> Self {
        let cfg = b.cfg;
        let pool = Arc::new(Pool::new(cfg.slot_count));
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(b.subscribers, bus.clone()));

        let (fallback, session) = match b.session {
            Some(rx) => (None, rx),
            None => {
                let (tx, rx) = watch::channel(SessionState::Registered);
                (Some(tx), rx)
            }
        };

        let policy = cfg.admission_policy();
        let bridge = Arc::new(ArchiveBridge::new(pool.clone(), b.archive));
        let transfer: Arc<dyn Transfer> = Arc::new(OriginRouter::new(live, bridge.clone()));

        let intake = |name: &str, source: Option<Arc<dyn BagSource>>| {
            let controller = IntakeController::new(
                name,
                pool.clone(),
                policy,
                transfer.clone(),
                bus.clone(),
                cfg.transfer_timeout(),
            );
            IntakeWorker::new(
                controller,
                source,
                session.clone(),
                cfg.poll_interval,
                cfg.source_backoff,
                bus.clone(),
            )
        };

        let mut workers = Vec::with_capacity(b.sources.len() + 1);
        let mut intakes = Vec::with_capacity(b.sources.len() + 1);
        for source in b.sources {
            let name = source.name().to_owned();
            let (worker, handle) = intake(&name, Some(source));
            workers.push(worker);
            intakes.push(handle);
        }
        let (worker, commands_intake) = intake(COMMANDS_INTAKE, None);
        workers.push(worker);
        intakes.push(commands_intake.clone());

        let commands = ArchiveCommands::new(bridge, commands_intake);
        let (consumer, display) =
            DisplayConsumer::new(pool.clone(), bus.clone(), renderer, cfg.auto_clear_after());
        let watcher = SessionWatcher::new(pool.clone(), bus.clone(), session);

        tracing::debug!(
            slots = pool.len(),
            role = ?cfg.role,
            policy = ?policy,
            intakes = intakes.len(),
            "workstation assembled"
        );

        Self {
            cfg,
            pool,
            bus,
            subs,
            alive: AliveTracker::new(),
            token: CancellationToken::new(),
            display,
            commands,
            intakes,
            parts: Mutex::new(Some(Parts {
                workers,
                consumer,
                watcher,
            })),
            _session: fallback,
        }
    }

    /// Runs all workers until an OS signal or [`shutdown`](Self::shutdown).
    ///
    /// Returns [`RuntimeError::AlreadyRunning`] on a second call and
    /// [`RuntimeError::GraceExceeded`] when workers do not stop within
    /// [`Config::grace`].
    pub async fn run(&self) -> Result<(), RuntimeError> {
        let parts = self
            .parts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(RuntimeError::AlreadyRunning)?;

        self.event_listener();
        let mut set = JoinSet::new();
        self.spawn_workers(&mut set, parts);
        tracing::info!(slots = self.pool.len(), role = ?self.cfg.role, "workstation running");

        let cause = match shutdown::stop_requested(&self.token).await {
            Ok(cause) => cause,
            Err(e) => {
                self.token.cancel();
                return Err(RuntimeError::Signal(e));
            }
        };
        tracing::info!(cause = cause.as_label(), "workstation stopping");
        self.bus
            .publish(Event::new(EventKind::ShutdownRequested).with_reason(cause.as_label()));
        self.token.cancel();
        self.wait_all_with_grace(&mut set).await
    }

    /// Requests a graceful stop of a running workstation.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Shared slot pool.
    pub fn pool(&self) -> &Arc<Pool> {
        &self.pool
    }

    /// Event bus; subscribe for runtime events.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    /// Effective configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Operator side of the display consumer.
    pub fn display(&self) -> DisplayHandle {
        self.display.clone()
    }

    /// Archive command surface.
    pub fn archive(&self) -> ArchiveCommands {
        self.commands.clone()
    }

    /// Inbox of the intake controller called `name`.
    ///
    /// Source-driven controllers are named after their source; archive
    /// commands use `"archive-commands"`.
    pub fn intake(&self, name: &str) -> Option<IntakeHandle> {
        self.intakes.iter().find(|h| h.name() == name).cloned()
    }

    /// Subscribes to the bus and forwards events to the subscriber set (fire-and-forget).
    fn event_listener(&self) {
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn spawn_workers(&self, set: &mut JoinSet<()>, parts: Parts) {
        for worker in parts.workers {
            let guard = self.alive.enter(worker.name());
            let token = self.token.child_token();
            set.spawn(async move {
                let _guard = guard;
                worker.run(token).await;
            });
        }

        let guard = self.alive.enter("display");
        let token = self.token.child_token();
        set.spawn(async move {
            let _guard = guard;
            parts.consumer.run(token).await;
        });

        let guard = self.alive.enter("session");
        let token = self.token.child_token();
        set.spawn(async move {
            let _guard = guard;
            parts.watcher.run(token).await;
        });
    }

    /// Waits for all workers to finish within the configured grace period.
    async fn wait_all_with_grace(&self, set: &mut JoinSet<()>) -> Result<(), RuntimeError> {
        let grace = self.cfg.grace;
        let done = async { while set.join_next().await.is_some() {} };

        match tokio::time::timeout(grace, done).await {
            Ok(()) => {
                self.bus.publish(Event::new(EventKind::AllStoppedWithin));
                Ok(())
            }
            Err(_) => {
                let stuck = self.alive.snapshot();
                tracing::error!(?grace, ?stuck, "workers did not stop within grace");
                self.bus.publish(
                    Event::new(EventKind::GraceExceeded).with_reason(stuck.join(",")),
                );
                Err(RuntimeError::GraceExceeded { grace, stuck })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::error::SourceError;
    use crate::intake::testing::{GatedTransfer, ScriptedTransfer};
    use crate::intake::Notification;
    use crate::pool::{Origin, Payload};

    struct Blank;

    #[async_trait]
    impl Renderer for Blank {
        async fn present(&self, _index: usize, _bag_id: &str, _payload: &Payload) {}
        async fn withdraw(&self, _index: usize, _bag_id: &str) {}
    }

    struct Once(StdMutex<Option<Notification>>);

    #[async_trait]
    impl BagSource for Once {
        fn name(&self) -> &str {
            "live"
        }

        async fn poll(&self) -> Result<Option<Notification>, SourceError> {
            Ok(self.0.lock().unwrap().take())
        }
    }

    #[tokio::test]
    async fn test_build_requires_collaborators() {
        let err = Workstation::builder(Config::default())
            .with_renderer(Arc::new(Blank))
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "runtime_missing_component");

        let cfg = Config {
            slot_count: 0,
            ..Config::default()
        };
        let err = Workstation::builder(cfg)
            .with_renderer(Arc::new(Blank))
            .with_transfer(ScriptedTransfer::ok())
            .build()
            .err()
            .unwrap();
        assert_eq!(err.as_label(), "config_invalid");
    }

    #[tokio::test]
    async fn test_shutdown_stops_within_grace_and_run_is_single_use() {
        let ws = Arc::new(
            Workstation::builder(Config::default())
                .with_renderer(Arc::new(Blank))
                .with_transfer(ScriptedTransfer::ok())
                .build()
                .unwrap(),
        );
        assert!(ws.intake("archive-commands").is_some());
        let mut events = ws.bus().subscribe();

        let running = tokio::spawn({
            let ws = ws.clone();
            async move { ws.run().await }
        });
        ws.shutdown();
        running.await.unwrap().unwrap();

        let mut kinds = Vec::new();
        while let Ok(ev) = events.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::ShutdownRequested));
        assert!(kinds.contains(&EventKind::AllStoppedWithin));
        assert!(matches!(ws.run().await, Err(RuntimeError::AlreadyRunning)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_transfer_exceeds_grace() {
        let gated = GatedTransfer::new();
        let _gate = gated.gate("B1");
        let cfg = Config {
            transfer_timeout: Duration::ZERO,
            grace: Duration::from_secs(2),
            ..Config::default()
        };
        let source = Once(StdMutex::new(Some(Notification::new("B1", Origin::LiveFeed))));
        let ws = Arc::new(
            Workstation::builder(cfg)
                .with_renderer(Arc::new(Blank))
                .with_transfer(gated)
                .with_source(Arc::new(source))
                .build()
                .unwrap(),
        );
        let mut events = ws.bus().subscribe();
        let running = tokio::spawn({
            let ws = ws.clone();
            async move { ws.run().await }
        });

        loop {
            if events.recv().await.unwrap().kind == EventKind::TransferStarted {
                break;
            }
        }
        ws.shutdown();
        match running.await.unwrap() {
            Err(RuntimeError::GraceExceeded { stuck, .. }) => assert_eq!(stuck, vec!["live"]),
            other => panic!("unexpected {other:?}"),
        }
    }
}
