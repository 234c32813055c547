//! # EMBER HAL
//!
//! Hardware abstraction for the embedded VPU.
//!
//! The VPU is a fixed-function device with exactly one compute unit: a
//! small array of SIMD lanes that all start from the same code address and
//! read their inputs from per-lane parameter blocks in device memory. The
//! HAL reduces the hardware surface to two things:
//!
//! 1. [`ComputeUnit`]: the single blocking execute entry point, and the
//!    device facts (lane count, batch limit) the dispatcher plans against.
//! 2. [`DeviceAllocator`] / [`DeviceBuffer`]: bus-addressed, host-mapped
//!    device memory.
//!
//! The [`soft`] module provides a software model of both, used for
//! bring-up and for hermetic tests higher up the stack.

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod memory;
pub mod soft;
pub mod time;
pub mod unit;

// Re-exports for convenience
pub use memory::{AllocFlags, DeviceAllocator, DeviceBuffer, DeviceContext};
pub use unit::{ComputeUnit, DeviceFacts, ExecuteRequest, LaunchRecord, MAX_LANES};
