//! # EMBER Exec
//!
//! Kernel dispatch for the single-compute-unit VPU.
//!
//! Turning an abstract N-dimensional index space into hardware work takes
//! three steps, each its own module:
//!
//! 1. [`partition`]: derive a group shape that tiles the index space
//!    within the device's lane budget (pure functions, no device access).
//! 2. [`layout`]: the byte-exact parameter-block format the compiled
//!    kernel code reads; one authoritative, versioned field table.
//! 3. [`dispatch`]: walk the group grid, batching consecutive groups
//!    along the first axis into single hardware-execute calls, rewriting
//!    the parameter blocks in place between calls.
//!
//! ```text
//! index space ──▶ partition ──▶ group grid ──▶ batches ──▶ execute()
//!                                  │
//!                                  └──▶ layout: per-lane parameter blocks
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod dispatch;
pub mod kernel;
pub mod layout;
pub mod partition;

// Re-exports for convenience
pub use dispatch::{KernelInvocation, dispatch};
pub use kernel::{KernelImage, KernelParam};
pub use partition::derive_group_size;
