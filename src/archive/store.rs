//! # Archive storage.
//!
//! [`ArchiveStore`] is the persistence seam behind the archive bridge. Naming,
//! rotation and on-disk layout are the store's business; the core only hands
//! over [`ArchivedBag`] copies and asks for them back by bag id.
//!
//! [`MemoryArchive`] keeps everything in process and is what the tests use.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ArchiveError;
use crate::pool::{Origin, Payload};

/// Copy of a bag taken out of the pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedBag {
    /// Bag identifier.
    pub bag_id: String,
    /// Where the bag originally came from.
    pub origin: Option<Origin>,
    /// Volume and report bytes.
    pub payload: Payload,
    /// When the copy was taken.
    pub archived_at: SystemTime,
}

/// Listing row; the payload stays in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveEntry {
    /// Bag identifier.
    pub bag_id: String,
    /// Where the bag originally came from.
    pub origin: Option<Origin>,
    /// When the copy was taken.
    pub archived_at: SystemTime,
    /// Payload size in bytes.
    pub size: usize,
}

impl From<&ArchivedBag> for ArchiveEntry {
    fn from(bag: &ArchivedBag) -> Self {
        Self {
            bag_id: bag.bag_id.clone(),
            origin: bag.origin,
            archived_at: bag.archived_at,
            size: bag.payload.len(),
        }
    }
}

/// Ordering for archive listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortKey {
    /// Most recently archived first.
    #[default]
    Newest,
    /// Oldest first.
    Oldest,
    /// Lexicographic by bag id.
    BagId,
    /// Largest payload first.
    Size,
}

impl SortKey {
    /// Sorts `entries` in place; ties keep bag id order.
    pub fn sort(self, entries: &mut [ArchiveEntry]) {
        match self {
            SortKey::Newest => entries.sort_by(|a, b| {
                b.archived_at
                    .cmp(&a.archived_at)
                    .then_with(|| a.bag_id.cmp(&b.bag_id))
            }),
            SortKey::Oldest => entries.sort_by(|a, b| {
                a.archived_at
                    .cmp(&b.archived_at)
                    .then_with(|| a.bag_id.cmp(&b.bag_id))
            }),
            SortKey::BagId => entries.sort_by(|a, b| a.bag_id.cmp(&b.bag_id)),
            SortKey::Size => {
                entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.bag_id.cmp(&b.bag_id)))
            }
        }
    }
}

/// Persistence for archived bags.
#[async_trait]
pub trait ArchiveStore: Send + Sync + 'static {
    /// Stores `bag`, replacing any copy with the same id.
    async fn save(&self, bag: ArchivedBag) -> Result<(), ArchiveError>;

    /// Returns the stored copy of `bag_id`.
    async fn load(&self, bag_id: &str) -> Result<ArchivedBag, ArchiveError>;

    /// Removes `bag_id`.
    async fn delete(&self, bag_id: &str) -> Result<(), ArchiveError>;

    /// Lists every stored bag, in no particular order.
    async fn list(&self) -> Result<Vec<ArchiveEntry>, ArchiveError>;

    /// Writes `bag` to removable media.
    ///
    /// Returns [`ArchiveError::NoMedia`] when nothing is mounted.
    async fn export_to_media(&self, bag: ArchivedBag) -> Result<(), ArchiveError>;
}

/// In-process archive.
///
/// Not durable; removable media is simulated with [`MemoryArchive::mount_media`].
#[derive(Debug, Default)]
pub struct MemoryArchive {
    bags: RwLock<BTreeMap<String, ArchivedBag>>,
    media: RwLock<Option<Vec<ArchivedBag>>>,
}

fn poison_err<T>(_: PoisonError<T>) -> ArchiveError {
    ArchiveError::Storage {
        error: "lock poisoned".into(),
    }
}

impl MemoryArchive {
    /// Creates an empty archive with no media mounted.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates inserting an empty removable device.
    pub fn mount_media(&self) -> Result<(), ArchiveError> {
        let mut media = self.media.write().map_err(poison_err)?;
        media.get_or_insert_with(Vec::new);
        Ok(())
    }

    /// Bag ids written to the mounted media, in export order.
    pub fn exported(&self) -> Result<Vec<String>, ArchiveError> {
        let media = self.media.read().map_err(poison_err)?;
        Ok(media
            .iter()
            .flatten()
            .map(|b| b.bag_id.clone())
            .collect())
    }
}

#[async_trait]
impl ArchiveStore for MemoryArchive {
    async fn save(&self, bag: ArchivedBag) -> Result<(), ArchiveError> {
        let mut bags = self.bags.write().map_err(poison_err)?;
        bags.insert(bag.bag_id.clone(), bag);
        Ok(())
    }

    async fn load(&self, bag_id: &str) -> Result<ArchivedBag, ArchiveError> {
        let bags = self.bags.read().map_err(poison_err)?;
        bags.get(bag_id).cloned().ok_or_else(|| ArchiveError::NotFound {
            bag_id: bag_id.to_owned(),
        })
    }

    async fn delete(&self, bag_id: &str) -> Result<(), ArchiveError> {
        let mut bags = self.bags.write().map_err(poison_err)?;
        bags.remove(bag_id)
            .map(drop)
            .ok_or_else(|| ArchiveError::NotFound {
                bag_id: bag_id.to_owned(),
            })
    }

    async fn list(&self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let bags = self.bags.read().map_err(poison_err)?;
        Ok(bags.values().map(ArchiveEntry::from).collect())
    }

    async fn export_to_media(&self, bag: ArchivedBag) -> Result<(), ArchiveError> {
        let mut media = self.media.write().map_err(poison_err)?;
        let device = media.as_mut().ok_or(ArchiveError::NoMedia)?;
        device.push(bag);
        Ok(())
    }
}
