//! Test doubles for the transfer collaborator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::{StreamExt, stream};
use tokio::sync::oneshot;

use super::transfer::{ChunkStream, Transfer, TransferChunk};
use crate::error::TransferError;
use crate::pool::Origin;

enum Script {
    Chunks(Vec<TransferChunk>),
    FailMidway(String),
    Refuse,
}

/// Transfer that plays the same script for every bag.
pub(crate) struct ScriptedTransfer {
    script: Script,
}

impl ScriptedTransfer {
    pub(crate) fn ok() -> Arc<Self> {
        Arc::new(Self {
            script: Script::Chunks(vec![
                TransferChunk::Volume(vec![1, 2, 3]),
                TransferChunk::Report(b"clear".to_vec()),
            ]),
        })
    }

    pub(crate) fn empty() -> Arc<Self> {
        Arc::new(Self {
            script: Script::Chunks(Vec::new()),
        })
    }

    pub(crate) fn failing(error: &str) -> Arc<Self> {
        Arc::new(Self {
            script: Script::FailMidway(error.to_owned()),
        })
    }

    pub(crate) fn refusing() -> Arc<Self> {
        Arc::new(Self {
            script: Script::Refuse,
        })
    }
}

#[async_trait]
impl Transfer for ScriptedTransfer {
    async fn begin(&self, _bag_id: &str, _origin: Origin) -> Result<ChunkStream, TransferError> {
        match &self.script {
            Script::Chunks(chunks) => Ok(stream::iter(chunks.clone().into_iter().map(Ok)).boxed()),
            Script::FailMidway(error) => Ok(stream::iter(vec![
                Ok(TransferChunk::Volume(vec![9])),
                Err(TransferError::failed(error.clone())),
            ])
            .boxed()),
            Script::Refuse => Err(TransferError::failed("refused")),
        }
    }
}

/// Transfer whose streams block until the test releases them.
pub(crate) struct GatedTransfer {
    gates: Mutex<HashMap<String, oneshot::Receiver<Result<Vec<u8>, TransferError>>>>,
}

impl GatedTransfer {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            gates: Mutex::new(HashMap::new()),
        })
    }

    /// Registers a gate for `bag_id`; sending on it completes the transfer.
    pub(crate) fn gate(&self, bag_id: &str) -> oneshot::Sender<Result<Vec<u8>, TransferError>> {
        let (tx, rx) = oneshot::channel();
        self.gates.lock().unwrap().insert(bag_id.to_owned(), rx);
        tx
    }
}

#[async_trait]
impl Transfer for GatedTransfer {
    async fn begin(&self, bag_id: &str, _origin: Origin) -> Result<ChunkStream, TransferError> {
        let rx = self.gates.lock().unwrap().remove(bag_id);
        let Some(rx) = rx else {
            return Ok(stream::iter(vec![Ok(TransferChunk::Volume(vec![0]))]).boxed());
        };
        Ok(stream::once(async move {
            match rx.await {
                Ok(Ok(volume)) => Ok(TransferChunk::Volume(volume)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(TransferError::failed("gate dropped")),
            }
        })
        .boxed())
    }
}
