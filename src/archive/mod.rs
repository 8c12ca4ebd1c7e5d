//! Archive side: snapshots out of the pool, restores back in.
//!
//! ## Contents
//! - [`ArchiveStore`], [`MemoryArchive`], [`ArchivedBag`], [`ArchiveEntry`], [`SortKey`] storage
//! - [`ArchiveBridge`] read path (`snapshot`) and write path (`Transfer` for archived origins)
//! - [`OriginRouter`] one transfer for both live and archived origins
//! - [`ArchiveCommands`] UI command surface
//!
//! ```text
//! ArchiveCommands ──show_bag──► IntakeHandle ──► IntakeController ──► Pool
//!        │                                             │
//!        │                                      OriginRouter::begin
//!        │                                             │ archived origin
//!        └──archive_to_*──► ArchiveBridge::snapshot ◄──┘ ArchiveBridge::begin
//!                                   │                            │
//!                                   └────────► ArchiveStore ◄────┘
//! ```

mod bridge;
mod commands;
mod store;

pub use bridge::{ArchiveBridge, OriginRouter};
pub use commands::ArchiveCommands;
pub use store::{ArchiveEntry, ArchiveStore, ArchivedBag, MemoryArchive, SortKey};
