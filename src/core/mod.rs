//! Runtime core: wiring and lifecycle.
//!
//! The only public API from this module is [`Workstation`] and its
//! [`WorkstationBuilder`].
//!
//! Internal modules:
//! - [`workstation`]: spawns workers, fans events out, handles shutdown;
//! - [`builder`]: collects collaborators and validates the config;
//! - [`alive`]: tracks running workers for the grace report;
//! - [`shutdown`]: OS signal / explicit stop trigger.

mod alive;
mod builder;
mod shutdown;
mod workstation;

pub use builder::WorkstationBuilder;
pub use workstation::Workstation;
