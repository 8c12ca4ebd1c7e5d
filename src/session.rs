//! # Network/session connectivity.
//!
//! The session collaborator publishes [`SessionState`] changes through a
//! `tokio::sync::watch` channel. Two things react to it:
//! - intake controllers pause polling while not `Registered`;
//! - the [`SessionWatcher`] flushes the pool when the workstation leaves
//!   `Registered` (network loss or logout).
//!
//! ```text
//! session collaborator ── watch<SessionState> ──┬──► IntakeController (pause/resume)
//!                                               └──► SessionWatcher ──► Pool::flush_all
//! ```

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::events::{Bus, Event, EventKind};
use crate::pool::Pool;

/// Connectivity to the central server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// Logged in and reachable.
    Registered,
    /// Link lost; trying to get back.
    Reconnecting,
    /// Logged out.
    Unregistered,
}

impl SessionState {
    /// True when bags may flow.
    pub const fn is_online(self) -> bool {
        matches!(self, SessionState::Registered)
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub const fn as_label(self) -> &'static str {
        match self {
            SessionState::Registered => "registered",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Unregistered => "unregistered",
        }
    }
}

/// Flushes the pool whenever the session drops out of `Registered`.
pub struct SessionWatcher {
    pool: Arc<Pool>,
    bus: Bus,
    rx: watch::Receiver<SessionState>,
    last: SessionState,
}

impl SessionWatcher {
    /// Creates a watcher over `rx`; the current value is the baseline.
    pub fn new(pool: Arc<Pool>, bus: Bus, mut rx: watch::Receiver<SessionState>) -> Self {
        let last = *rx.borrow_and_update();
        Self {
            pool,
            bus,
            rx,
            last,
        }
    }

    /// Runs until cancelled or the session channel closes.
    pub async fn run(mut self, token: CancellationToken) {
        let mut last = self.last;
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let now = *self.rx.borrow_and_update();
                    self.apply(last, now);
                    last = now;
                }
            }
        }
    }

    /// Reacts to one observed change.
    fn apply(&self, last: SessionState, now: SessionState) {
        if now == last {
            return;
        }
        tracing::info!(from = last.as_label(), to = now.as_label(), "session changed");
        self.bus
            .publish(Event::new(EventKind::SessionChanged).with_reason(now.as_label()));

        if !now.is_online() {
            let discarded = self.pool.flush_all();
            self.bus.publish(
                Event::new(EventKind::PoolFlushed)
                    .with_reason(format!("{} discarded={discarded}", now.as_label())),
            );
        }
    }
}
