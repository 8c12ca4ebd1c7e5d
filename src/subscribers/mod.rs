//! # Event subscribers for the workstation runtime.
//!
//! [`Subscribe`] is the consumer trait; [`SubscriberSet`] fans each event out
//! to all subscribers through per-subscriber queues.
//!
//! ## Architecture
//! ```text
//! IntakeController / DisplayConsumer ── publish(Event) ──► Bus
//!                                                           │
//!                              Workstation::event_listener ◄┘
//!                                           │
//!                                     SubscriberSet::emit
//!                                 ┌─────────┼──────────┐
//!                                 ▼         ▼          ▼
//!                             LogWriter   UI lamp    Custom
//! ```

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscriber;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscriber::Subscribe;
