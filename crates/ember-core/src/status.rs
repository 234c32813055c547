//! # Execution Status
//!
//! The event state machine's status ordering.
//!
//! A status only ever moves forward: `Queued` → `Submitted` → `Running` →
//! `Complete`, or from any non-terminal state to an error. The raw integer
//! projection preserves that ordering (3, 2, 1, 0, negative), which is what
//! the callback-threshold logic and the wait machinery compare against.

use core::fmt;

use crate::error::Error;

// =============================================================================
// EXECUTION STATUS
// =============================================================================

/// Execution status of a submitted command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecStatus {
    /// In the scheduler FIFO, not yet picked up by the worker
    Queued,
    /// Picked up by the worker, about to run
    Submitted,
    /// The command is executing on the device
    Running,
    /// The command finished successfully
    Complete,
    /// The command (or a user status set) ended in an error
    Errored(Error),
}

impl ExecStatus {
    /// Raw ordered projection: `Queued`=3, `Submitted`=2, `Running`=1,
    /// `Complete`=0, errors negative (see [`Error::code`]).
    #[inline]
    pub const fn raw(self) -> i32 {
        match self {
            Self::Queued => 3,
            Self::Submitted => 2,
            Self::Running => 1,
            Self::Complete => 0,
            Self::Errored(e) => e.code(),
        }
    }

    /// Terminal means the status can never change again.
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Errored(_))
    }

    /// Check for the error arm.
    #[inline]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Errored(_))
    }

    /// The error, if this is an error status.
    #[inline]
    pub const fn error(self) -> Option<Error> {
        match self {
            Self::Errored(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queued => write!(f, "queued"),
            Self::Submitted => write!(f, "submitted"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Errored(e) => write!(f, "errored ({e})"),
        }
    }
}

// =============================================================================
// CALLBACK LEVELS
// =============================================================================

/// Status levels a completion callback can be registered against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    /// Fire when the event is picked up by the worker
    Submitted,
    /// Fire when the command starts executing
    Running,
    /// Fire when the event reaches a terminal status
    Complete,
}

impl StatusLevel {
    /// Raw projection on the same scale as [`ExecStatus::raw`].
    #[inline]
    pub const fn raw(self) -> i32 {
        match self {
            Self::Submitted => 2,
            Self::Running => 1,
            Self::Complete => 0,
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(ExecStatus::Queued.raw() > ExecStatus::Submitted.raw());
        assert!(ExecStatus::Submitted.raw() > ExecStatus::Running.raw());
        assert!(ExecStatus::Running.raw() > ExecStatus::Complete.raw());
        assert!(ExecStatus::Complete.raw() > ExecStatus::Errored(Error::OutOfResources).raw());
    }

    #[test]
    fn test_terminal() {
        assert!(!ExecStatus::Queued.is_terminal());
        assert!(!ExecStatus::Submitted.is_terminal());
        assert!(!ExecStatus::Running.is_terminal());
        assert!(ExecStatus::Complete.is_terminal());
        assert!(ExecStatus::Errored(Error::Timeout).is_terminal());
        assert!(ExecStatus::Errored(Error::Timeout).is_error());
        assert!(!ExecStatus::Complete.is_error());
    }

    #[test]
    fn test_level_scale_matches_status_scale() {
        assert_eq!(StatusLevel::Submitted.raw(), ExecStatus::Submitted.raw());
        assert_eq!(StatusLevel::Running.raw(), ExecStatus::Running.raw());
        assert_eq!(StatusLevel::Complete.raw(), ExecStatus::Complete.raw());
    }
}
