//! Bag-slot pool: slots, lifecycle states and the shared slot table.
//!
//! ## Contents
//! - [`SlotState`], [`StateMask`], [`Origin`] lifecycle vocabulary
//! - [`Payload`], [`SlotView`], [`SlotLease`] what callers see and hold
//! - [`Pool`] the only shared mutable state in the core

mod slot;
mod state;
mod table;

pub use slot::{Payload, SlotLease, SlotView};
pub use state::{Origin, SlotState, StateMask};
pub use table::{Claimed, Pool};
