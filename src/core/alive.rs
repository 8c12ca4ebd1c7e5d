//! # Worker liveness for shutdown reporting.
//!
//! Every runtime worker (intake workers, display consumer, session watcher)
//! holds an [`AliveGuard`] for as long as its future runs. The guard is
//! released on drop, so a worker that returns, panics or is aborted leaves
//! the set the same way.
//!
//! ```text
//! Workstation::run ──► tracker.enter("live") ──► spawn(async { let _g = guard; worker.run().await })
//! grace exceeded   ──► tracker.snapshot()    ──► RuntimeError::GraceExceeded { stuck }
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Thread-safe set of running worker names (with multiplicity).
#[derive(Clone, Default)]
pub(crate) struct AliveTracker {
    state: Arc<Mutex<BTreeMap<Arc<str>, usize>>>,
}

impl AliveTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Marks `name` alive until the returned guard is dropped.
    pub(crate) fn enter(&self, name: impl Into<Arc<str>>) -> AliveGuard {
        let name = name.into();
        *self.lock().entry(name.clone()).or_insert(0) += 1;
        AliveGuard {
            tracker: self.clone(),
            name,
        }
    }

    /// Sorted names of workers still running.
    pub(crate) fn snapshot(&self) -> Vec<String> {
        self.lock().keys().map(|n| n.to_string()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Arc<str>, usize>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps one worker name in the [`AliveTracker`].
pub(crate) struct AliveGuard {
    tracker: AliveTracker,
    name: Arc<str>,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        let mut state = self.tracker.lock();
        if let Some(count) = state.get_mut(&self.name) {
            *count -= 1;
            if *count == 0 {
                state.remove(&self.name);
            }
        }
    }
}
