//! Display side: the single consumer that moves bags on and off screen.
//!
//! ## Contents
//! - [`Renderer`] UI collaborator (present / withdraw / retain)
//! - [`Decision`], [`Verdict`] what the operator sends back
//! - [`DisplayConsumer`], [`DisplayHandle`] the consumer task and its command side

mod consumer;
mod renderer;

pub use consumer::{DisplayConsumer, DisplayHandle};
pub use renderer::{Decision, Renderer, Verdict};
