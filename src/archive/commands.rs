//! # Archive commands issued from the UI.
//!
//! None of these bypass the slot state machine: `show_bag` goes through an
//! intake controller like any other bag, the archive writers only read
//! slots through [`ArchiveBridge::snapshot_bag`]. Every command is keyed by
//! bag id, never by slot index.

use std::sync::Arc;

use super::bridge::ArchiveBridge;
use super::store::{ArchiveEntry, SortKey};
use crate::error::ArchiveError;
use crate::intake::{IntakeHandle, Notification};
use crate::pool::Origin;

/// Command surface over the archive bridge.
#[derive(Clone)]
pub struct ArchiveCommands {
    bridge: Arc<ArchiveBridge>,
    intake: IntakeHandle,
}

impl ArchiveCommands {
    /// Creates the command surface; `intake` must route archived origins to `bridge`.
    pub fn new(bridge: Arc<ArchiveBridge>, intake: IntakeHandle) -> Self {
        Self { bridge, intake }
    }

    /// Asks the intake side to load `bag_id` from the archive into a slot.
    ///
    /// The bag then follows the normal admission and claim path; it may be
    /// dropped like any other notification.
    pub async fn show_bag(&self, bag_id: &str) -> Result<(), ArchiveError> {
        self.bridge.store().load(bag_id).await?;
        tracing::info!(bag = bag_id, intake = self.intake.name(), "show archived bag");
        self.intake
            .submit(Notification::new(bag_id, Origin::RemoteArchive))
            .await
            .map_err(|_| ArchiveError::IntakeClosed)
    }

    /// Removes `bag_id` from the archive.
    pub async fn delete_bag(&self, bag_id: &str) -> Result<(), ArchiveError> {
        self.bridge.store().delete(bag_id).await?;
        tracing::info!(bag = bag_id, "archived bag deleted");
        Ok(())
    }

    /// Lists the archive ordered by `key`.
    pub async fn sort_list(&self, key: SortKey) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let mut entries = self.bridge.store().list().await?;
        key.sort(&mut entries);
        Ok(entries)
    }

    /// Saves `bag_id` from the slot holding it to the local archive.
    ///
    /// The slot must be archivable (`Rendering`, `Disposed`); its state is
    /// not touched.
    pub async fn archive_to_local(&self, bag_id: &str) -> Result<ArchiveEntry, ArchiveError> {
        let bag = self.bridge.snapshot_bag(bag_id)?;
        let entry = ArchiveEntry::from(&bag);
        self.bridge.store().save(bag).await?;
        tracing::info!(bag = bag_id, size = entry.size, "bag archived locally");
        Ok(entry)
    }

    /// Writes `bag_id` to removable media.
    ///
    /// The local archive is tried first, so bags whose slot has long been
    /// recycled can still be exported; otherwise the bag is copied from the
    /// pool.
    pub async fn archive_to_removable_media(
        &self,
        bag_id: &str,
    ) -> Result<ArchiveEntry, ArchiveError> {
        let bag = match self.bridge.store().load(bag_id).await {
            Ok(bag) => bag,
            Err(ArchiveError::NotFound { .. }) => self.bridge.snapshot_bag(bag_id)?,
            Err(e) => return Err(e),
        };
        let entry = ArchiveEntry::from(&bag);
        self.bridge.store().export_to_media(bag).await?;
        tracing::info!(bag = bag_id, size = entry.size, "bag exported to removable media");
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::watch;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::archive::{ArchiveStore, ArchivedBag, MemoryArchive, OriginRouter};
    use crate::events::{Bus, EventKind};
    use crate::intake::testing::ScriptedTransfer;
    use crate::intake::{IntakeController, IntakeWorker};
    use crate::policies::{AdmissionPolicy, RetryBackoff};
    use crate::pool::{Payload, Pool, SlotState};
    use crate::session::SessionState;

    struct Rig {
        pool: Arc<Pool>,
        bus: Bus,
        store: Arc<MemoryArchive>,
        commands: ArchiveCommands,
        token: CancellationToken,
        _session: watch::Sender<SessionState>,
    }

    fn start() -> Rig {
        let pool = Arc::new(Pool::new(2));
        let bus = Bus::new(64);
        let store = Arc::new(MemoryArchive::new());
        let bridge = Arc::new(ArchiveBridge::new(pool.clone(), store.clone()));
        let router = Arc::new(OriginRouter::new(ScriptedTransfer::ok(), bridge.clone()));
        let controller = IntakeController::new(
            "commands",
            pool.clone(),
            AdmissionPolicy::SingleFlow,
            router,
            bus.clone(),
            None,
        );
        let (session_tx, session) = watch::channel(SessionState::Registered);
        let (worker, intake) = IntakeWorker::new(
            controller,
            None,
            session,
            Duration::from_secs(1),
            RetryBackoff::default(),
            bus.clone(),
        );
        let token = CancellationToken::new();
        tokio::spawn(worker.run(token.clone()));
        Rig {
            pool,
            bus,
            store,
            commands: ArchiveCommands::new(bridge, intake),
            token,
            _session: session_tx,
        }
    }

    fn archived(id: &str) -> ArchivedBag {
        ArchivedBag {
            bag_id: id.to_owned(),
            origin: Some(Origin::LiveFeed),
            payload: Payload::new(vec![8; 3], Vec::new()),
            archived_at: std::time::SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn test_show_bag_enters_pool_through_intake() {
        let rig = start();
        rig.store.save(archived("A1")).await.unwrap();
        let mut events = rig.bus.subscribe();

        rig.commands.show_bag("A1").await.unwrap();
        loop {
            if events.recv().await.unwrap().kind == EventKind::SlotReady {
                break;
            }
        }
        let view = rig.pool.slot(0).unwrap();
        assert_eq!(view.state, SlotState::ReadyToRender);
        assert_eq!(view.origin, Some(Origin::RemoteArchive));
        assert_eq!(rig.pool.payload(0).unwrap().volume, vec![8; 3]);
        rig.token.cancel();
    }

    #[tokio::test]
    async fn test_show_unknown_bag_is_not_found() {
        let rig = start();
        assert_eq!(
            rig.commands.show_bag("nope").await,
            Err(ArchiveError::NotFound {
                bag_id: "nope".into()
            })
        );
        assert_eq!(rig.pool.snapshot().iter().filter(|v| v.state != SlotState::Empty).count(), 0);
        rig.token.cancel();
    }

    #[tokio::test]
    async fn test_archive_rendering_slot_locally_and_to_media() {
        let rig = start();
        let lease = rig
            .pool
            .initialise(0, SlotState::Empty, "B1", Origin::LiveFeed, &AdmissionPolicy::SingleFlow)
            .unwrap()
            .lease;
        assert!(rig.pool.advance(lease, SlotState::Initialised, SlotState::Construction));
        assert!(rig.pool.complete(lease, Payload::new(vec![1], Vec::new())));
        assert_eq!(
            rig.commands.archive_to_local("B1").await.unwrap_err().as_label(),
            "archive_not_archivable"
        );

        assert!(rig.pool.advance(lease, SlotState::ReadyToRender, SlotState::Rendering));
        assert_eq!(rig.commands.archive_to_local("B1").await.unwrap().bag_id, "B1");
        assert_eq!(rig.pool.slot(0).unwrap().state, SlotState::Rendering);
        assert_eq!(rig.store.load("B1").await.unwrap().payload.volume, vec![1]);

        assert_eq!(
            rig.commands.archive_to_removable_media("B1").await,
            Err(ArchiveError::NoMedia)
        );
        rig.store.mount_media().unwrap();
        rig.commands.archive_to_removable_media("B1").await.unwrap();
        assert_eq!(rig.store.exported().unwrap(), vec!["B1"]);
        rig.token.cancel();
    }

    #[tokio::test]
    async fn test_export_archived_bag_after_slot_recycled() {
        let rig = start();
        rig.store.save(archived("A3")).await.unwrap();
        rig.store.mount_media().unwrap();
        assert!(rig.pool.snapshot().iter().all(|v| v.bag_id.is_none()));

        let entry = rig.commands.archive_to_removable_media("A3").await.unwrap();
        assert_eq!(entry.bag_id, "A3");
        assert_eq!(entry.size, 3);
        assert_eq!(rig.store.exported().unwrap(), vec!["A3"]);

        assert_eq!(
            rig.commands.archive_to_local("A3").await.unwrap_err().as_label(),
            "archive_not_in_pool"
        );
        assert_eq!(
            rig.commands.archive_to_removable_media("ghost").await.unwrap_err().as_label(),
            "archive_not_in_pool"
        );
        rig.token.cancel();
    }

    #[tokio::test]
    async fn test_sort_and_delete() {
        let rig = start();
        rig.store.save(archived("B2")).await.unwrap();
        rig.store.save(archived("B1")).await.unwrap();

        let ids: Vec<_> = rig
            .commands
            .sort_list(SortKey::BagId)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.bag_id)
            .collect();
        assert_eq!(ids, ["B1", "B2"]);

        rig.commands.delete_bag("B1").await.unwrap();
        assert_eq!(rig.commands.sort_list(SortKey::Newest).await.unwrap().len(), 1);
        rig.token.cancel();
    }
}
