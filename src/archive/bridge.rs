//! # ArchiveBridge: the pool's only door to archive storage.
//!
//! ## Read path
//! [`ArchiveBridge::snapshot`] copies a slot's payload without touching its
//! state. Only idle or on-screen slots can be copied:
//! ```text
//! Empty / Disposed / Error / Rendering ─► ArchivedBag   (state unchanged)
//! Initialised / Construction / ReadyToRender ─► NotArchivable
//! ```
//!
//! ## Write path
//! The bridge is a [`Transfer`]: archived bags re-enter the pool through an
//! intake controller that has already claimed a slot, exactly like a live
//! bag. Live origins are refused. [`OriginRouter`] puts the bridge and a live
//! transfer behind one [`Transfer`] so one controller can serve both.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use futures::{StreamExt, stream};

use super::store::{ArchiveStore, ArchivedBag};
use crate::error::{ArchiveError, TransferError};
use crate::intake::{ChunkStream, Transfer, TransferChunk};
use crate::pool::{Origin, Pool, StateMask};

/// Connects the pool with an [`ArchiveStore`].
pub struct ArchiveBridge {
    pool: Arc<Pool>,
    store: Arc<dyn ArchiveStore>,
}

impl ArchiveBridge {
    /// Creates a bridge over `pool` and `store`.
    pub fn new(pool: Arc<Pool>, store: Arc<dyn ArchiveStore>) -> Self {
        Self { pool, store }
    }

    /// Backing store.
    pub fn store(&self) -> &Arc<dyn ArchiveStore> {
        &self.store
    }

    /// Copies the bag held by slot `index`.
    pub fn snapshot(&self, index: usize) -> Result<ArchivedBag, ArchiveError> {
        let view = self
            .pool
            .slot(index)
            .ok_or(ArchiveError::NoSuchSlot { index })?;
        if !StateMask::ARCHIVABLE.contains(view.state) {
            return Err(ArchiveError::NotArchivable {
                index,
                state: view.state,
            });
        }

        // Payload and view come from the same critical section.
        let (view, payload) = self
            .pool
            .read_payload(index)
            .ok_or(ArchiveError::NoPayload { index })?;
        if !StateMask::ARCHIVABLE.contains(view.state) {
            return Err(ArchiveError::NotArchivable {
                index,
                state: view.state,
            });
        }

        Ok(ArchivedBag {
            bag_id: view.bag_id.unwrap_or_default(),
            origin: view.origin,
            payload,
            archived_at: SystemTime::now(),
        })
    }

    /// Copies the slot holding `bag_id`.
    ///
    /// An archivable slot is preferred when the same bag occupies more than
    /// one (a disposed copy and a pending reload).
    pub fn snapshot_bag(&self, bag_id: &str) -> Result<ArchivedBag, ArchiveError> {
        let not_in_pool = || ArchiveError::NotInPool {
            bag_id: bag_id.to_owned(),
        };
        let holding: Vec<_> = self
            .pool
            .snapshot()
            .into_iter()
            .filter(|v| v.bag_id.as_deref() == Some(bag_id))
            .collect();
        let index = holding
            .iter()
            .find(|v| StateMask::ARCHIVABLE.contains(v.state))
            .or_else(|| holding.first())
            .map(|v| v.index)
            .ok_or_else(not_in_pool)?;

        let bag = self.snapshot(index)?;
        // The slot may have been recycled since the scan.
        if bag.bag_id != bag_id {
            return Err(not_in_pool());
        }
        Ok(bag)
    }
}

#[async_trait]
impl Transfer for ArchiveBridge {
    async fn begin(&self, bag_id: &str, origin: Origin) -> Result<ChunkStream, TransferError> {
        if !origin.is_archived() {
            return Err(TransferError::Unsupported {
                origin: origin.as_label(),
            });
        }
        let bag = self
            .store
            .load(bag_id)
            .await
            .map_err(|e| TransferError::failed(e.to_string()))?;

        tracing::debug!(bag = bag_id, origin = origin.as_label(), size = bag.payload.len(), "restoring archived bag");
        let mut chunks = vec![Ok(TransferChunk::Volume(bag.payload.volume))];
        if !bag.payload.report.is_empty() {
            chunks.push(Ok(TransferChunk::Report(bag.payload.report)));
        }
        Ok(stream::iter(chunks).boxed())
    }
}

/// Sends archived origins to the archive bridge and everything else to `live`.
pub struct OriginRouter {
    live: Arc<dyn Transfer>,
    archive: Arc<ArchiveBridge>,
}

impl OriginRouter {
    /// Creates a router.
    pub fn new(live: Arc<dyn Transfer>, archive: Arc<ArchiveBridge>) -> Self {
        Self { live, archive }
    }
}

#[async_trait]
impl Transfer for OriginRouter {
    async fn begin(&self, bag_id: &str, origin: Origin) -> Result<ChunkStream, TransferError> {
        if origin.is_archived() {
            self.archive.begin(bag_id, origin).await
        } else {
            self.live.begin(bag_id, origin).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::intake::PayloadAssembler;
    use crate::policies::AdmissionPolicy;
    use crate::pool::{Payload, SlotState};

    fn bridge(slots: usize) -> (Arc<Pool>, Arc<MemoryArchive>, ArchiveBridge) {
        let pool = Arc::new(Pool::new(slots));
        let store = Arc::new(MemoryArchive::new());
        let bridge = ArchiveBridge::new(pool.clone(), store.clone());
        (pool, store, bridge)
    }

    fn fill(pool: &Pool, bag: &str) -> crate::pool::SlotLease {
        let lease = pool
            .initialise(0, SlotState::Empty, bag, Origin::LiveFeed, &AdmissionPolicy::SingleFlow)
            .unwrap()
            .lease;
        assert!(pool.advance(lease, SlotState::Initialised, SlotState::Construction));
        assert!(pool.complete(lease, Payload::new(vec![4, 5], b"gun".to_vec())));
        lease
    }

    #[test]
    fn test_snapshot_rendering_slot_leaves_state_alone() {
        let (pool, _, bridge) = bridge(1);
        let lease = fill(&pool, "B1");
        assert!(pool.advance(lease, SlotState::ReadyToRender, SlotState::Rendering));
        let before = pool.snapshot();

        let bag = bridge.snapshot(0).unwrap();
        assert_eq!(bag.bag_id, "B1");
        assert_eq!(bag.payload.report, b"gun".to_vec());
        assert_eq!(pool.snapshot(), before);
    }

    #[test]
    fn test_snapshot_refuses_pending_and_empty_slots() {
        let (pool, _, bridge) = bridge(1);
        assert!(matches!(bridge.snapshot(0), Err(ArchiveError::NoPayload { index: 0 })));
        assert!(matches!(bridge.snapshot(3), Err(ArchiveError::NoSuchSlot { index: 3 })));

        fill(&pool, "B1");
        assert!(matches!(
            bridge.snapshot(0),
            Err(ArchiveError::NotArchivable {
                state: SlotState::ReadyToRender,
                ..
            })
        ));
    }

    #[test]
    fn test_disposed_slot_is_archivable_until_recycled() {
        let (pool, _, bridge) = bridge(1);
        let lease = fill(&pool, "B1");
        assert!(pool.advance(lease, SlotState::ReadyToRender, SlotState::Rendering));
        assert!(pool.dispose(lease));
        assert_eq!(bridge.snapshot(0).unwrap().payload.volume, vec![4, 5]);
    }

    #[test]
    fn test_snapshot_by_bag_id() {
        let (pool, _, bridge) = bridge(1);
        assert_eq!(
            bridge.snapshot_bag("B1").unwrap_err().as_label(),
            "archive_not_in_pool"
        );

        let lease = fill(&pool, "B1");
        assert_eq!(
            bridge.snapshot_bag("B1").unwrap_err().as_label(),
            "archive_not_archivable"
        );
        assert!(pool.advance(lease, SlotState::ReadyToRender, SlotState::Rendering));
        assert!(pool.dispose(lease));
        assert_eq!(bridge.snapshot_bag("B1").unwrap().bag_id, "B1");
        assert!(bridge.snapshot_bag("B2").is_err());
    }

    #[tokio::test]
    async fn test_restore_streams_stored_payload() {
        let (_, store, bridge) = bridge(1);
        store
            .save(ArchivedBag {
                bag_id: "A7".into(),
                origin: Some(Origin::LiveFeed),
                payload: Payload::new(vec![1, 2], b"knife".to_vec()),
                archived_at: SystemTime::now(),
            })
            .await
            .unwrap();

        let mut stream = bridge.begin("A7", Origin::Rerun).await.unwrap();
        let mut asm = PayloadAssembler::default();
        while let Some(chunk) = stream.next().await {
            asm.push(chunk.unwrap());
        }
        assert_eq!(asm.finish().unwrap(), Payload::new(vec![1, 2], b"knife".to_vec()));
    }

    #[tokio::test]
    async fn test_restore_refuses_live_origin_and_missing_bag() {
        let (_, _, bridge) = bridge(1);
        assert!(matches!(
            bridge.begin("A7", Origin::LiveFeed).await,
            Err(TransferError::Unsupported { origin: "live_feed" })
        ));
        assert!(matches!(
            bridge.begin("A7", Origin::RemoteArchive).await,
            Err(TransferError::Failed { .. })
        ));
    }
}
