//! # Data-transfer collaborator.
//!
//! [`Transfer::begin`] opens a stream of [`TransferChunk`]s for one bag. The
//! stream ending is the terminal success signal; an `Err` item is the terminal
//! failure signal. The intake controller assembles the chunks with
//! [`PayloadAssembler`] and validates the result before the slot becomes
//! `ReadyToRender`.
//!
//! ```text
//! begin(bag) ──► Volume ─► Volume ─► Report ─► (end)     => Ok(Payload)
//! begin(bag) ──► Volume ─► Err(e)                         => Err(e)
//! begin(bag) ──► (end)                                    => Err(Invalid: empty volume)
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::TransferError;
use crate::pool::{Origin, Payload};

/// One piece of a bag transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferChunk {
    /// Part of the reconstructed volume, appended in arrival order.
    Volume(Vec<u8>),
    /// Part of the threat report, appended in arrival order.
    Report(Vec<u8>),
}

/// Chunk stream returned by [`Transfer::begin`].
pub type ChunkStream = BoxStream<'static, Result<TransferChunk, TransferError>>;

/// Source of bag content for claimed slots.
#[async_trait]
pub trait Transfer: Send + Sync + 'static {
    /// Starts transferring `bag_id`.
    async fn begin(&self, bag_id: &str, origin: Origin) -> Result<ChunkStream, TransferError>;
}

/// Accumulates chunks into a [`Payload`].
#[derive(Debug, Default)]
pub struct PayloadAssembler {
    payload: Payload,
    chunks: usize,
}

impl PayloadAssembler {
    /// Appends one chunk.
    pub fn push(&mut self, chunk: TransferChunk) {
        self.chunks += 1;
        match chunk {
            TransferChunk::Volume(bytes) => self.payload.volume.extend_from_slice(&bytes),
            TransferChunk::Report(bytes) => self.payload.report.extend_from_slice(&bytes),
        }
    }

    /// Validates and returns the assembled payload.
    ///
    /// A bag without volume data cannot be displayed.
    pub fn finish(self) -> Result<Payload, TransferError> {
        if self.payload.volume.is_empty() {
            return Err(TransferError::Invalid {
                reason: format!("empty volume after {} chunks", self.chunks),
            });
        }
        Ok(self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembles_in_arrival_order() {
        let mut asm = PayloadAssembler::default();
        asm.push(TransferChunk::Volume(vec![1, 2]));
        asm.push(TransferChunk::Report(b"knife".to_vec()));
        asm.push(TransferChunk::Volume(vec![3]));
        let payload = asm.finish().unwrap();
        assert_eq!(payload.volume, vec![1, 2, 3]);
        assert_eq!(payload.report, b"knife".to_vec());
    }

    #[test]
    fn test_report_only_is_invalid() {
        let mut asm = PayloadAssembler::default();
        asm.push(TransferChunk::Report(vec![1]));
        let err = asm.finish().unwrap_err();
        assert_eq!(err.as_label(), "transfer_invalid");
        assert_eq!(err.to_string(), "validation failed: empty volume after 1 chunks");
    }
}
