//! # Retry backoff for bag sources.
//!
//! When an intake controller fails to poll its source, the next poll is
//! delayed by [`RetryBackoff::delay`] instead of the regular poll interval.
//! The delay for the `n`-th consecutive failure (0-indexed) is
//! `first × factor^n`, capped at `max`, then jittered. A successful poll resets
//! the failure count.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use bagvisor::{JitterPolicy, RetryBackoff};
//!
//! let backoff = RetryBackoff {
//!     first: Duration::from_millis(500),
//!     max: Duration::from_secs(8),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(backoff.delay(0), Duration::from_millis(500));
//! assert_eq!(backoff.delay(2), Duration::from_secs(2));
//! assert_eq!(backoff.delay(20), Duration::from_secs(8));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::jitter::JitterPolicy;
use crate::config::millis;

/// Exponential retry delay for failing sources.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryBackoff {
    /// Delay after the first failure.
    #[serde(with = "millis")]
    pub first: Duration,
    /// Upper bound for the delay.
    #[serde(with = "millis")]
    pub max: Duration,
    /// Growth factor per consecutive failure.
    pub factor: f64,
    /// Randomization applied to the capped delay.
    pub jitter: JitterPolicy,
}

impl Default for RetryBackoff {
    /// `first = 1s`, `max = 30s`, `factor = 2.0`, equal jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_secs(1),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Equal,
        }
    }
}

impl RetryBackoff {
    /// Delay before retrying after `failures` consecutive failures (0-indexed).
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
