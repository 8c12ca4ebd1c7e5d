use std::sync::Arc;

use tokio::sync::watch;

use super::workstation::Workstation;
use crate::{
    archive::{ArchiveStore, MemoryArchive},
    config::Config,
    display::Renderer,
    error::RuntimeError,
    intake::{BagSource, Transfer},
    session::SessionState,
    subscribers::Subscribe,
};

/// Builder for a [`Workstation`].
pub struct WorkstationBuilder {
    pub(super) cfg: Config,
    pub(super) subscribers: Vec<Arc<dyn Subscribe>>,
    pub(super) sources: Vec<Arc<dyn BagSource>>,
    transfer: Option<Arc<dyn Transfer>>,
    renderer: Option<Arc<dyn Renderer>>,
    pub(super) session: Option<watch::Receiver<SessionState>>,
    pub(super) archive: Arc<dyn ArchiveStore>,
}

impl WorkstationBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            sources: Vec::new(),
            transfer: None,
            renderer: None,
            session: None,
            archive: Arc::new(MemoryArchive::new()),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (claims, transfers, disposals,
    /// flushes) through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Adds a bag source; each source gets its own intake controller.
    pub fn with_source(mut self, source: Arc<dyn BagSource>) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the transfer used for live origins (required).
    pub fn with_transfer(mut self, transfer: Arc<dyn Transfer>) -> Self {
        self.transfer = Some(transfer);
        self
    }

    /// Sets the UI renderer (required).
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    /// Connects the session state channel.
    ///
    /// Without one the workstation behaves as permanently `Registered`.
    pub fn with_session(mut self, session: watch::Receiver<SessionState>) -> Self {
        self.session = Some(session);
        self
    }

    /// Replaces the default in-memory archive.
    pub fn with_archive(mut self, archive: Arc<dyn ArchiveStore>) -> Self {
        self.archive = archive;
        self
    }

    /// Builds the workstation.
    ///
    /// Must be called from within a tokio runtime (subscriber workers are
    /// spawned here). Fails on an invalid config or a missing collaborator.
    pub fn build(mut self) -> Result<Workstation, RuntimeError> {
        if let Err(e) = self.cfg.validate() {
            tracing::error!(error = %e, "invalid workstation config");
            return Err(RuntimeError::Config(e));
        }
        let transfer = self.transfer.take().ok_or(RuntimeError::Missing {
            component: "transfer",
        })?;
        let renderer = self.renderer.take().ok_or(RuntimeError::Missing {
            component: "renderer",
        })?;
        Ok(Workstation::assemble(self, transfer, renderer))
    }
}
