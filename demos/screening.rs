//! # Example: screening
//!
//! A two-slot OSR workstation fed by a scripted scanner.
//!
//! Shows how to:
//! - Implement [`BagSource`], [`Transfer`] and [`Renderer`].
//! - Attach the built-in [`LogWriter`] subscriber.
//! - Post operator decisions through the [`DisplayHandle`].
//! - Replay an archived bag with [`ArchiveCommands::show_bag`].
//!
//! ## Flow
//! ```text
//! Scanner ──► IntakeWorker("scanner") ──► Pool ──► DisplayConsumer ──► Console
//!                                          ▲                │
//! ArchiveCommands::show_bag ───────────────┘                └─► operator (Decision)
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example screening
//! ```

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bagvisor::{
    ArchiveStore, ArchivedBag, BagSource, ChunkStream, Config, Decision, EventKind, LogWriter,
    MemoryArchive, Notification, Origin, Payload, Renderer, SourceError, Subscribe, Transfer,
    TransferChunk, TransferError, Verdict, Workstation,
};
use futures::{StreamExt, stream};
use tracing_subscriber::EnvFilter;

/// Emits a fixed list of bags, one per poll.
struct Scanner(Mutex<Vec<&'static str>>);

#[async_trait]
impl BagSource for Scanner {
    fn name(&self) -> &str {
        "scanner"
    }

    async fn poll(&self) -> Result<Option<Notification>, SourceError> {
        let next = self.0.lock().map_err(|_| SourceError::Closed)?.pop();
        Ok(next.map(|bag| Notification::new(bag, Origin::LiveFeed)))
    }
}

/// Pretends to pull an image volume off the network.
struct Network;

#[async_trait]
impl Transfer for Network {
    async fn begin(&self, bag_id: &str, _origin: Origin) -> Result<ChunkStream, TransferError> {
        if bag_id.ends_with('X') {
            return Err(TransferError::failed("scanner reported a corrupt volume"));
        }
        let chunks = vec![
            Ok(TransferChunk::Volume(vec![0u8; 512])),
            Ok(TransferChunk::Report(b"no threat".to_vec())),
        ];
        Ok(stream::iter(chunks).boxed())
    }
}

struct Console;

#[async_trait]
impl Renderer for Console {
    async fn present(&self, index: usize, bag_id: &str, payload: &Payload) {
        println!("[screen] slot {index}: {bag_id} ({} bytes)", payload.len());
    }

    async fn withdraw(&self, index: usize, bag_id: &str) {
        println!("[screen] slot {index}: {bag_id} withdrawn");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let archive = Arc::new(MemoryArchive::new());
    archive
        .save(ArchivedBag {
            bag_id: "A-17".into(),
            origin: Some(Origin::LiveFeed),
            payload: Payload::new(vec![1u8; 256], Vec::new()),
            archived_at: SystemTime::now(),
        })
        .await?;

    let cfg = Config {
        poll_interval: Duration::from_millis(100),
        grace: Duration::from_secs(2),
        ..Config::default()
    };
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let ws = Arc::new(
        Workstation::builder(cfg)
            .with_subscribers(subs)
            .with_source(Arc::new(Scanner(Mutex::new(vec!["B3", "B2X", "B1"]))))
            .with_transfer(Arc::new(Network))
            .with_renderer(Arc::new(Console))
            .with_archive(archive)
            .build()?,
    );

    let runtime = tokio::spawn({
        let ws = ws.clone();
        async move { ws.run().await }
    });

    // Operator: clears every bag shortly after it appears.
    let display = ws.display();
    let mut events = ws.bus().subscribe();
    let mut screened = 0;
    while screened < 3 {
        let ev = events.recv().await?;
        match ev.kind {
            EventKind::RenderStarted => {
                let Some(bag) = ev.bag else { continue };
                tokio::time::sleep(Duration::from_millis(300)).await;
                display.decide(Decision::new(&*bag, Verdict::Clear)).await?;
                screened += 1;
                if screened == 2 {
                    ws.archive().show_bag("A-17").await?;
                }
            }
            EventKind::SlotFailed => {
                println!("[operator] failed: {}", ev.reason.as_deref().unwrap_or("?"));
                if let Some(index) = ev.slot {
                    display.acknowledge_error(index);
                }
            }
            _ => {}
        }
    }

    ws.shutdown();
    runtime.await??;
    Ok(())
}
