//! # Workstation runtime configuration.
//!
//! Provides [`Config`], the centralized settings for the pool, intake
//! controllers, display consumer and shutdown.
//!
//! Config is used in two ways:
//! 1. **Runtime creation**: `Workstation::builder(config)`
//! 2. **Policy selection**: `config.admission_policy()` resolves the role once
//!
//! ## Sentinel values
//! - `transfer_timeout = 0` → transfers are not time-bounded
//! - `auto_clear = 0` → rendered bags stay until an operator decision
//!
//! ## Loading
//! [`Config::from_json`] accepts a partial document; missing fields keep their
//! defaults and durations are given in milliseconds.
//! ```rust
//! use std::time::Duration;
//! use bagvisor::{Config, Role};
//!
//! let cfg = Config::from_json(r#"{ "role": "Supervisor", "auto_clear": 45000 }"#).unwrap();
//! assert_eq!(cfg.role, Role::Supervisor);
//! assert_eq!(cfg.auto_clear_after(), Some(Duration::from_secs(45)));
//! assert_eq!(cfg.slot_count, 2);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policies::{AdmissionPolicy, RetryBackoff, Role, RoleTable};

/// Global configuration for the workstation runtime.
///
/// ## Field semantics
/// - `slot_count`: number of reusable bag slots (min 1; clamped by Pool)
/// - `role`: workstation role, resolved against `roles` once at build time
/// - `poll_interval`: period of each intake controller's poll loop
/// - `transfer_timeout`: upper bound for one bag transfer (`0` = none)
/// - `auto_clear`: rendered bag is disposed after this long (`0` = never)
/// - `grace`: maximum wait for workers to stop on shutdown
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `source_backoff`: retry delay policy for failing sources
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Number of slots in the pool.
    pub slot_count: usize,

    /// Workstation role.
    pub role: Role,

    /// Role → admission policy table.
    pub roles: RoleTable,

    /// Poll period of every intake controller.
    #[serde(with = "millis")]
    pub poll_interval: Duration,

    /// Time bound for one bag transfer.
    ///
    /// - `Duration::ZERO` = unbounded
    /// - `> 0` = the slot goes to `Error` when exceeded
    #[serde(with = "millis")]
    pub transfer_timeout: Duration,

    /// Auto-clear timeout for the rendered bag.
    #[serde(with = "millis")]
    pub auto_clear: Duration,

    /// Maximum time to wait for graceful shutdown.
    #[serde(with = "millis")]
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Retry delay for failing sources.
    pub source_backoff: RetryBackoff,
}

impl Config {
    /// Parses a (possibly partial) JSON document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let cfg: Config = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects values that cannot drive a runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slot_count == 0 {
            return Err(ConfigError::Invalid {
                field: "slot_count",
                reason: "must be at least 1",
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll_interval",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }

    /// Admission policy for the configured role.
    #[inline]
    pub fn admission_policy(&self) -> AdmissionPolicy {
        self.roles.policy_for(self.role)
    }

    /// Returns the transfer timeout as an `Option`.
    #[inline]
    pub fn transfer_timeout(&self) -> Option<Duration> {
        (!self.transfer_timeout.is_zero()).then_some(self.transfer_timeout)
    }

    /// Returns the auto-clear timeout as an `Option`.
    #[inline]
    pub fn auto_clear_after(&self) -> Option<Duration> {
        (!self.auto_clear.is_zero()).then_some(self.auto_clear)
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `slot_count = 2`
    /// - `role = Osr` with the default [`RoleTable`]
    /// - `poll_interval = 1s`
    /// - `transfer_timeout = 30s`
    /// - `auto_clear = 0` (disabled)
    /// - `grace = 10s`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            slot_count: 2,
            role: Role::Osr,
            roles: RoleTable::default(),
            poll_interval: Duration::from_secs(1),
            transfer_timeout: Duration::from_secs(30),
            auto_clear: Duration::ZERO,
            grace: Duration::from_secs(10),
            bus_capacity: 1024,
            source_backoff: RetryBackoff::default(),
        }
    }
}

/// Serde adapter: `Duration` as integer milliseconds.
pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}
