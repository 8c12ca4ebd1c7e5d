//! # bagvisor
//!
//! **Bagvisor** is the resource-management core of an X-ray baggage-screening
//! workstation: a small, fixed pool of reusable bag slots shared between
//! independently scheduled intake controllers and a single display consumer.
//!
//! It guarantees that no two producers fill the same slot, that the bag on
//! screen is never recycled underneath the operator, that a role's admission
//! policy limits how many bags are in flight, and that failed transfers return
//! their slot to a reusable state.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!  ┌────────────┐  ┌────────────┐  ┌──────────────────┐
//!  │ BagSource  │  │ BagSource  │  │ ArchiveCommands  │
//!  │ (live feed)│  │ (BHS force)│  │ (show_bag, ...)  │
//!  └─────┬──────┘  └─────┬──────┘  └────────┬─────────┘
//!        ▼               ▼                  ▼
//!  ┌────────────┐  ┌────────────┐  ┌──────────────────┐
//!  │IntakeWorker│  │IntakeWorker│  │   IntakeWorker   │  poll / inbox / backoff
//!  │ Controller │  │ Controller │  │    Controller    │  admission + verified claim
//!  └─────┬──────┘  └─────┬──────┘  └────────┬─────────┘
//!        │  Transfer::begin (outside the lock, OriginRouter → live | ArchiveBridge)
//!        ▼               ▼                  ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ Pool (Mutex<Vec<Slot>>, CAS transitions, invariants)  │──► watch<u64> (state changed)
//! └──────────────────────────┬───────────────────────────┘            │
//!                            ▲ flush_all                              ▼
//!                     SessionWatcher ◄── watch<SessionState>   DisplayConsumer ──► Renderer
//!                                                                     ▲
//!                                                         DisplayHandle (decisions)
//!
//! every component ── publish(Event) ──► Bus ──► SubscriberSet ──► LogWriter, ...
//! ```
//!
//! ### Slot lifecycle
//! ```text
//!  Empty ────┐
//!  Disposed ─┼─► Initialised ─► Construction ─┬─► ReadyToRender ─► Rendering ─► Disposed
//!  Error ────┘                                └─► Error ─(acknowledge)─► Disposed
//!
//! flush_all (logout / network loss): every slot ─► Disposed
//! ```
//!
//! ## Features
//! | Area              | Description                                                 | Key types / traits                          |
//! |-------------------|-------------------------------------------------------------|---------------------------------------------|
//! | **Pool**          | Fixed slot table with verified claims and CAS transitions.  | [`Pool`], [`SlotState`], [`StateMask`]      |
//! | **Policies**      | Role-driven admission, source retry backoff.                | [`AdmissionPolicy`], [`RoleTable`], [`RetryBackoff`] |
//! | **Intake**        | Sources, transfers, per-source controllers.                 | [`BagSource`], [`Transfer`], [`IntakeController`] |
//! | **Display**       | Single consumer, operator decisions, auto-clear.            | [`DisplayConsumer`], [`Renderer`], [`Decision`] |
//! | **Archive**       | Snapshots and restores through the state machine.           | [`ArchiveBridge`], [`ArchiveStore`], [`ArchiveCommands`] |
//! | **Runtime**       | Wiring, events, subscribers, graceful shutdown.             | [`Workstation`], [`Event`], [`Subscribe`]   |
//! | **Errors**        | Typed errors with stable labels.                            | [`TransferError`], [`RuntimeError`]         |
//! | **Configuration** | Centralized settings with JSON loading.                     | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], a `tracing`-backed subscriber.
//!
//! ## Example
//! ```rust
//! use bagvisor::{AdmissionPolicy, Origin, Pool, SlotState, StateMask};
//!
//! let pool = Pool::new(2);
//! let free = pool.claim_by_state_mask(StateMask::FREE).unwrap();
//! let claimed = pool
//!     .initialise(free.index, free.state, "B1", Origin::LiveFeed, &AdmissionPolicy::SingleFlow)
//!     .unwrap();
//! assert_eq!(pool.slot(claimed.lease.index).unwrap().state, SlotState::Initialised);
//!
//! // A second bag is refused while B1 is in flight.
//! let free = pool.claim_by_state_mask(StateMask::FREE).unwrap();
//! assert!(pool
//!     .initialise(free.index, free.state, "B2", Origin::LiveFeed, &AdmissionPolicy::SingleFlow)
//!     .is_err());
//! ```
mod archive;
mod config;
mod core;
mod display;
mod error;
mod events;
mod intake;
mod policies;
mod pool;
mod session;
mod subscribers;

// ---- Public re-exports ----

pub use archive::{
    ArchiveBridge, ArchiveCommands, ArchiveEntry, ArchiveStore, ArchivedBag, MemoryArchive,
    OriginRouter, SortKey,
};
pub use config::Config;
pub use self::core::{Workstation, WorkstationBuilder};
pub use display::{Decision, DisplayConsumer, DisplayHandle, Renderer, Verdict};
pub use error::{
    ArchiveError, ClaimError, ConfigError, DisplayError, RuntimeError, SourceError, TransferError,
};
pub use events::{Bus, Event, EventKind};
pub use intake::{
    BagSource, ChunkStream, IntakeController, IntakeHandle, IntakeOutcome, IntakeWorker,
    Notification, PayloadAssembler, Transfer, TransferChunk,
};
pub use policies::{
    Admission, AdmissionPolicy, JitterPolicy, Occupant, Rejection, RetryBackoff, Role, RoleTable,
};
pub use pool::{Claimed, Origin, Payload, Pool, SlotLease, SlotState, SlotView, StateMask};
pub use session::{SessionState, SessionWatcher};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose the built-in tracing subscriber.
// Enable with: `--features logging` (on by default)
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
