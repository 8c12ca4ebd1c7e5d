//! # Rendering collaborator and operator decisions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::pool::Payload;

/// Operator verdict on a displayed bag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Bag cleared.
    Clear,
    /// Bag sent for search.
    Suspect,
}

impl Verdict {
    /// Returns a short stable label (snake_case) for use in logs.
    pub const fn as_label(self) -> &'static str {
        match self {
            Verdict::Clear => "clear",
            Verdict::Suspect => "suspect",
        }
    }
}

/// Decision delivered back from the UI for the bag on screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Bag the decision is about; must match the rendering slot.
    pub bag_id: String,
    /// What the operator decided.
    pub verdict: Verdict,
}

impl Decision {
    /// Creates a decision.
    pub fn new(bag_id: impl Into<String>, verdict: Verdict) -> Self {
        Self {
            bag_id: bag_id.into(),
            verdict,
        }
    }
}

/// UI side of the display consumer.
///
/// Calls are made from the consumer task, one at a time, and never while the
/// pool lock is held.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    /// A slot entered `Rendering`; show its payload.
    async fn present(&self, index: usize, bag_id: &str, payload: &Payload);

    /// The bag left the screen without an operator decision (flush or auto-clear).
    async fn withdraw(&self, index: usize, bag_id: &str);

    /// Keep showing `bag_id` while `incoming` is being prepared in another slot.
    async fn retain(&self, index: usize, bag_id: &str, incoming: &str) {
        let _ = (index, bag_id, incoming);
    }
}
