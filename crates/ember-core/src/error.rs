//! # EMBER Error Handling
//!
//! Unified error type for the compute runtime.
//!
//! Error handling in EMBER follows these principles:
//! - Errors are typed and categorized by subsystem
//! - No panics in production code paths
//! - Every error maps to a stable negative status code, which doubles as
//!   the terminal execution status of a failed event
//! - Errors are `no_std` compatible

use core::fmt;

// =============================================================================
// RESULT TYPE
// =============================================================================

/// EMBER Result type alias
pub type Result<T> = core::result::Result<T, Error>;

// =============================================================================
// ERROR ENUM
// =============================================================================

/// EMBER unified error type
///
/// Covers all error conditions across the runtime. The discriminants are
/// not the ABI; the stable numeric mapping lives in [`Error::code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Handle / State Validation
    // =========================================================================
    /// Queue handle is malformed or already released
    InvalidQueue,
    /// Event handle is malformed, already bound, or otherwise unusable
    InvalidEvent,
    /// Kernel image is malformed (no code, oversized parameters, ...)
    InvalidKernel,
    /// Operation is not legal in the object's current state
    InvalidOperation,

    // =========================================================================
    // Dispatch Validation
    // =========================================================================
    /// Work dimensionality outside 1..=3
    InvalidWorkDimension,
    /// A global size component is zero or not divisible by the group size
    InvalidGlobalSize,
    /// Global offset is not representable for the device
    InvalidGlobalOffset,
    /// No usable group shape (exceeds lane count or does not divide)
    InvalidGroupSize,

    // =========================================================================
    // Resources
    // =========================================================================
    /// Device memory allocation failed
    AllocationFailed,
    /// The compute unit rejected or failed an execution
    OutOfResources,
    /// The compute unit did not confirm completion within the timeout
    Timeout,

    // =========================================================================
    // Dependencies
    // =========================================================================
    /// A predecessor event in the wait list ended with an error status
    WaitListFailed,
}

impl Error {
    /// Stable negative status code for this error.
    ///
    /// The code is what callers observe as the terminal status of a failed
    /// event, so the mapping is part of the runtime's ABI and must not be
    /// renumbered.
    ///
    /// | code | error |
    /// |------|-------|
    /// | -4   | [`Error::AllocationFailed`] |
    /// | -5   | [`Error::OutOfResources`] |
    /// | -6   | [`Error::Timeout`] |
    /// | -14  | [`Error::WaitListFailed`] |
    /// | -36  | [`Error::InvalidQueue`] |
    /// | -48  | [`Error::InvalidKernel`] |
    /// | -53  | [`Error::InvalidWorkDimension`] |
    /// | -54  | [`Error::InvalidGroupSize`] |
    /// | -55  | [`Error::InvalidGlobalOffset`] |
    /// | -58  | [`Error::InvalidEvent`] |
    /// | -59  | [`Error::InvalidOperation`] |
    /// | -63  | [`Error::InvalidGlobalSize`] |
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            Self::AllocationFailed => -4,
            Self::OutOfResources => -5,
            Self::Timeout => -6,
            Self::WaitListFailed => -14,
            Self::InvalidQueue => -36,
            Self::InvalidKernel => -48,
            Self::InvalidWorkDimension => -53,
            Self::InvalidGroupSize => -54,
            Self::InvalidGlobalOffset => -55,
            Self::InvalidEvent => -58,
            Self::InvalidOperation => -59,
            Self::InvalidGlobalSize => -63,
        }
    }

    /// Reverse of [`Error::code`]; `None` for unknown codes.
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            -4 => Self::AllocationFailed,
            -5 => Self::OutOfResources,
            -6 => Self::Timeout,
            -14 => Self::WaitListFailed,
            -36 => Self::InvalidQueue,
            -48 => Self::InvalidKernel,
            -53 => Self::InvalidWorkDimension,
            -54 => Self::InvalidGroupSize,
            -55 => Self::InvalidGlobalOffset,
            -58 => Self::InvalidEvent,
            -59 => Self::InvalidOperation,
            -63 => Self::InvalidGlobalSize,
            _ => return None,
        })
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Validation
            Self::InvalidQueue => write!(f, "invalid command queue"),
            Self::InvalidEvent => write!(f, "invalid event"),
            Self::InvalidKernel => write!(f, "invalid kernel image"),
            Self::InvalidOperation => write!(f, "operation not legal in current state"),

            // Dispatch
            Self::InvalidWorkDimension => write!(f, "work dimensionality outside 1..=3"),
            Self::InvalidGlobalSize => write!(f, "invalid global work size"),
            Self::InvalidGlobalOffset => write!(f, "invalid global work offset"),
            Self::InvalidGroupSize => write!(f, "no usable work-group size"),

            // Resources
            Self::AllocationFailed => write!(f, "device memory allocation failed"),
            Self::OutOfResources => write!(f, "compute unit execution failed"),
            Self::Timeout => write!(f, "compute unit execution timed out"),

            // Dependencies
            Self::WaitListFailed => write!(f, "an event in the wait list failed"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_negative() {
        let all = [
            Error::InvalidQueue,
            Error::InvalidEvent,
            Error::InvalidKernel,
            Error::InvalidOperation,
            Error::InvalidWorkDimension,
            Error::InvalidGlobalSize,
            Error::InvalidGlobalOffset,
            Error::InvalidGroupSize,
            Error::AllocationFailed,
            Error::OutOfResources,
            Error::Timeout,
            Error::WaitListFailed,
        ];
        for e in all {
            assert!(e.code() < 0, "{e:?} must map to a negative code");
        }
    }

    #[test]
    fn test_code_round_trip() {
        let all = [
            Error::InvalidQueue,
            Error::InvalidEvent,
            Error::InvalidKernel,
            Error::InvalidOperation,
            Error::InvalidWorkDimension,
            Error::InvalidGlobalSize,
            Error::InvalidGlobalOffset,
            Error::InvalidGroupSize,
            Error::AllocationFailed,
            Error::OutOfResources,
            Error::Timeout,
            Error::WaitListFailed,
        ];
        for e in all {
            assert_eq!(Error::from_code(e.code()), Some(e));
        }
        assert_eq!(Error::from_code(-1000), None);
        assert_eq!(Error::from_code(0), None);
    }
}
