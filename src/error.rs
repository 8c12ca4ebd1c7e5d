//! Error types used by the pool runtime and its collaborators.
//!
//! - [`ClaimError`]: a verified claim did not go through.
//! - [`TransferError`]: bag data could not be transferred or validated.
//! - [`SourceError`]: a bag source could not be polled.
//! - [`DisplayError`]: the display consumer is no longer running.
//! - [`ArchiveError`]: archive store or bridge failure.
//! - [`ConfigError`]: configuration could not be loaded.
//! - [`RuntimeError`]: the workstation runtime itself failed.
//!
//! Every type provides `as_label()` (stable snake_case) for logs. None of the
//! per-bag errors is fatal: they end in a dropped notification or an `Error`
//! slot. Pool invariant violations are not errors; they panic.

use std::time::Duration;

use thiserror::Error;

use crate::policies::Rejection;
use crate::pool::SlotState;

/// # Why a verified claim failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClaimError {
    /// Another caller moved the slot first; re-scan and try again.
    #[error("slot claimed concurrently")]
    Lost,

    /// Admission policy refused the bag under the pool lock.
    #[error("admission rejected: {0}")]
    Rejected(Rejection),
}

impl ClaimError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ClaimError::Lost => "claim_lost",
            ClaimError::Rejected(r) => r.as_label(),
        }
    }
}

/// # Errors produced while filling a slot.
///
/// All of them resolve the slot to `Error` with the message recorded.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The collaborator could not start or continue the transfer.
    #[error("transfer failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The transfer did not finish in time.
    #[error("transfer timed out after {timeout:?}")]
    Timeout {
        /// The configured bound.
        timeout: Duration,
    },

    /// Data arrived but is not a usable bag.
    #[error("validation failed: {reason}")]
    Invalid {
        /// What was wrong with the data.
        reason: String,
    },

    /// The collaborator does not serve this origin.
    #[error("origin {origin} not supported by this transfer")]
    Unsupported {
        /// Label of the refused origin.
        origin: &'static str,
    },
}

impl TransferError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            TransferError::Failed { .. } => "transfer_failed",
            TransferError::Timeout { .. } => "transfer_timeout",
            TransferError::Invalid { .. } => "transfer_invalid",
            TransferError::Unsupported { .. } => "transfer_unsupported",
        }
    }

    /// Shorthand for [`TransferError::Failed`].
    pub fn failed(error: impl Into<String>) -> Self {
        TransferError::Failed {
            error: error.into(),
        }
    }
}

/// # Errors produced by bag sources.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Source is temporarily unreachable; polling backs off.
    #[error("source unavailable: {error}")]
    Unavailable {
        /// The underlying error message.
        error: String,
    },

    /// Source is gone for good; the controller stops polling it.
    #[error("source closed")]
    Closed,
}

impl SourceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SourceError::Unavailable { .. } => "source_unavailable",
            SourceError::Closed => "source_closed",
        }
    }
}

/// # Operator commands that could not reach the display consumer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DisplayError {
    /// The consumer task has stopped.
    #[error("display consumer stopped")]
    Stopped,
}

impl DisplayError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            DisplayError::Stopped => "display_stopped",
        }
    }
}

/// # Errors produced by the archive bridge and stores.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArchiveError {
    /// No archived record with that bag id.
    #[error("bag {bag_id} not found in archive")]
    NotFound {
        /// Requested bag.
        bag_id: String,
    },

    /// No slot currently holds that bag.
    #[error("bag {bag_id} is not in any slot")]
    NotInPool {
        /// Requested bag.
        bag_id: String,
    },

    /// Slot index outside the pool.
    #[error("slot {index} does not exist")]
    NoSuchSlot {
        /// Requested index.
        index: usize,
    },

    /// Slot is in a state whose payload may not be read.
    #[error("slot {index} is {state}; cannot snapshot")]
    NotArchivable {
        /// Requested index.
        index: usize,
        /// State at the time of the request.
        state: SlotState,
    },

    /// Slot has no payload to snapshot.
    #[error("slot {index} holds no payload")]
    NoPayload {
        /// Requested index.
        index: usize,
    },

    /// Removable media is not present.
    #[error("removable media not available")]
    NoMedia,

    /// Storage back-end failure.
    #[error("archive storage error: {error}")]
    Storage {
        /// The underlying error message.
        error: String,
    },

    /// Command could not reach the intake controller.
    #[error("intake channel closed")]
    IntakeClosed,
}

impl ArchiveError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ArchiveError::NotFound { .. } => "archive_not_found",
            ArchiveError::NotInPool { .. } => "archive_not_in_pool",
            ArchiveError::NoSuchSlot { .. } => "archive_no_such_slot",
            ArchiveError::NotArchivable { .. } => "archive_not_archivable",
            ArchiveError::NoPayload { .. } => "archive_no_payload",
            ArchiveError::NoMedia => "archive_no_media",
            ArchiveError::Storage { .. } => "archive_storage",
            ArchiveError::IntakeClosed => "archive_intake_closed",
        }
    }
}

/// # Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Document is not valid JSON for [`Config`](crate::Config).
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is out of range.
    #[error("invalid config field {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why it was refused.
        reason: &'static str,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Parse(_) => "config_parse",
            ConfigError::Invalid { .. } => "config_invalid",
        }
    }
}

/// # Errors produced by the workstation runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some workers were still running.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Workers that did not stop in time.
        stuck: Vec<String>,
    },

    /// `run()` was called twice.
    #[error("workstation already running")]
    AlreadyRunning,

    /// A required collaborator was not supplied to the builder.
    #[error("workstation needs a {component}")]
    Missing {
        /// Which collaborator.
        component: &'static str,
    },

    /// Configuration rejected at build time.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// OS signal handlers could not be installed.
    #[error("signal handler error: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use bagvisor::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::AlreadyRunning => "runtime_already_running",
            RuntimeError::Missing { .. } => "runtime_missing_component",
            RuntimeError::Config(e) => e.as_label(),
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_are_stable() {
        assert_eq!(ClaimError::Lost.as_label(), "claim_lost");
        assert_eq!(
            ClaimError::Rejected(Rejection::Duplicate).as_label(),
            "admission_duplicate"
        );
        assert_eq!(TransferError::failed("x").as_label(), "transfer_failed");
        assert_eq!(SourceError::Closed.as_label(), "source_closed");
        assert_eq!(ArchiveError::NoMedia.as_label(), "archive_no_media");
        assert_eq!(DisplayError::Stopped.as_label(), "display_stopped");
    }

    #[test]
    fn test_messages() {
        let err = TransferError::Timeout {
            timeout: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "transfer timed out after 2s");
        let err = ArchiveError::NotArchivable {
            index: 1,
            state: SlotState::Construction,
        };
        assert_eq!(err.to_string(), "slot 1 is construction; cannot snapshot");
    }
}
