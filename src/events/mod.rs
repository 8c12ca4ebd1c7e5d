//! Runtime events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `IntakeController`, `DisplayConsumer`, `SessionWatcher`,
//!   `Workstation` (shutdown), `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `Workstation::event_listener()` fanning out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
