//! Admission and retry policies.
//!
//! ## Contents
//! - [`AdmissionPolicy`] whether a new bag may claim a slot (single-flow / retain-and-replace)
//! - [`RoleTable`] role → admission policy, chosen once at start-up
//! - [`RetryBackoff`] how long a failing source waits before the next poll
//! - [`JitterPolicy`] randomization of that wait
//!
//! ## Quick wiring
//! ```text
//! Config { role, roles: RoleTable, source_backoff: RetryBackoff }
//!      └─► Workstation::build():
//!           - roles.policy_for(role) ─► every IntakeController
//!           - source_backoff         ─► IntakeController poll loop
//! ```

mod admission;
mod backoff;
mod jitter;

pub use admission::{Admission, AdmissionPolicy, Occupant, Rejection, Role, RoleTable};
pub use backoff::RetryBackoff;
pub use jitter::JitterPolicy;
