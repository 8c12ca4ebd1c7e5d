//! # Bag sources.
//!
//! A [`BagSource`] is polled by its intake worker once per poll interval and
//! reports bags that became available upstream (live feed, BHS forced review,
//! rerun queue, re-authentication flush). The core never queues
//! notifications; a source is expected to re-send a bag that is still relevant.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::pool::Origin;

/// "Bag available" notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Notification {
    /// Opaque bag identifier.
    pub bag_id: String,
    /// Where the bag comes from.
    pub origin: Origin,
}

impl Notification {
    /// Creates a notification.
    pub fn new(bag_id: impl Into<String>, origin: Origin) -> Self {
        Self {
            bag_id: bag_id.into(),
            origin,
        }
    }
}

/// Upstream producer of bag notifications.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use bagvisor::{BagSource, Notification, Origin, SourceError};
///
/// struct Forced(std::sync::Mutex<Vec<String>>);
///
/// #[async_trait]
/// impl BagSource for Forced {
///     fn name(&self) -> &str { "bhs-forced" }
///
///     async fn poll(&self) -> Result<Option<Notification>, SourceError> {
///         let next = self.0.lock().unwrap().pop();
///         Ok(next.map(|id| Notification::new(id, Origin::BhsForced)))
///     }
/// }
/// ```
#[async_trait]
pub trait BagSource: Send + Sync + 'static {
    /// Stable name used in logs and events.
    fn name(&self) -> &str;

    /// Returns the next available bag, `None` when nothing is waiting.
    async fn poll(&self) -> Result<Option<Notification>, SourceError>;
}
