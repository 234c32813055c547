//! # EMBER Core
//!
//! Foundational types for the EMBER compute runtime.
//!
//! This crate carries the pieces every other layer agrees on: strongly
//! typed device addresses and handles, the unified error type with its
//! stable status-code mapping, and the execution-status ordering that
//! drives the event state machine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ember-core                             │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────┐  │
//! │  │   Types     │  │   Status    │  │     Error           │  │
//! │  │ (DeviceAddr,│  │ (ExecStatus │  │   Handling          │  │
//! │  │  Handle<T>) │  │  ordering)  │  │                     │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

#[cfg(feature = "std")]
extern crate std;

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod error;
pub mod status;
pub mod types;

// Re-exports for convenience
pub use error::{Error, Result};
pub use status::{ExecStatus, StatusLevel};
pub use types::*;
