//! Intake: bag sources, transfers and the controllers that fill slots.
//!
//! ## Contents
//! - [`BagSource`], [`Notification`] upstream "bag available" signals
//! - [`Transfer`], [`TransferChunk`], [`PayloadAssembler`] bag content streaming
//! - [`IntakeController`] claim → construction → ready/error for one notification
//! - [`IntakeWorker`], [`IntakeHandle`] poll loop and notification injection
//!
//! ```text
//! BagSource ──poll──► IntakeWorker ──► IntakeController ──► Pool
//! IntakeHandle ──submit──┘                  │
//!                                           └──► Transfer::begin(bag)
//! ```

mod controller;
mod source;
mod transfer;
mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use controller::{IntakeController, IntakeOutcome};
pub use source::{BagSource, Notification};
pub use transfer::{ChunkStream, PayloadAssembler, Transfer, TransferChunk};
pub use worker::{IntakeHandle, IntakeWorker};
