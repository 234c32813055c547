//! # Compute Unit
//!
//! The one hardware execution entry point and the facts describing it.

use core::time::Duration;

use ember_core::{DeviceAddr, Result};

// =============================================================================
// HARDWARE CONSTANTS
// =============================================================================

/// Number of physical SIMD lanes in the compute unit.
///
/// This is a property of the silicon; [`DeviceFacts::lanes`] may report
/// fewer (firmware can fuse lanes off) but never more.
pub const MAX_LANES: usize = 12;

// =============================================================================
// DEVICE FACTS
// =============================================================================

/// Static capabilities of the attached VPU
///
/// Injected into the scheduler and dispatcher rather than read from a
/// global, so tests can shrink the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFacts {
    /// Maximum number of lanes one dispatch may occupy
    pub lanes: u32,
    /// Maximum consecutive groups batched into one execute call
    pub max_batch: u32,
}

impl DeviceFacts {
    /// Per-execute timeout the runtime waits for hardware completion.
    pub const EXECUTE_TIMEOUT: Duration = Duration::from_secs(1);
}

impl Default for DeviceFacts {
    fn default() -> Self {
        Self {
            lanes: MAX_LANES as u32,
            max_batch: 8,
        }
    }
}

// =============================================================================
// LAUNCH RECORD
// =============================================================================

/// Per-lane launch message
///
/// The hardware reads one record per lane: where that lane's first
/// parameter block lives and where the kernel code starts. Two little-endian
/// words, exactly as the device expects them.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LaunchRecord {
    /// Bus address of the lane's first parameter block
    pub uniforms_addr: u32,
    /// Bus address of the kernel machine code
    pub code_addr: u32,
}

impl LaunchRecord {
    /// Create a launch record from typed addresses
    #[inline]
    pub const fn new(uniforms: DeviceAddr, code: DeviceAddr) -> Self {
        Self {
            uniforms_addr: uniforms.raw(),
            code_addr: code.raw(),
        }
    }
}

static_assertions::assert_eq_size!(LaunchRecord, [u32; 2]);

// =============================================================================
// EXECUTE REQUEST
// =============================================================================

/// One hardware-execute call
///
/// `records` is the host view of the launch-record array; `records_addr`
/// is where the same array lives in the device's address space. Both refer
/// to the same bytes: the host copy exists so software models can observe
/// the call without a bus.
#[derive(Debug)]
pub struct ExecuteRequest<'a> {
    /// Number of lanes to start (length of `records`)
    pub lanes: u32,
    /// Host view of the launch records
    pub records: &'a [LaunchRecord],
    /// Device address of the launch-record array
    pub records_addr: DeviceAddr,
    /// Flush the instruction cache before starting (first dispatch of a
    /// kernel only; the code region does not change afterwards)
    pub flush_icache: bool,
    /// How long to wait for hardware completion
    pub timeout: Duration,
}

// =============================================================================
// COMPUTE UNIT TRAIT
// =============================================================================

/// The VPU's single compute unit
///
/// `execute` blocks the calling thread until the hardware confirms
/// completion or the timeout elapses. The runtime guarantees a single
/// caller (the scheduler worker), so implementations need no internal
/// submission queue.
pub trait ComputeUnit: Send + Sync {
    /// Static device capabilities
    fn facts(&self) -> DeviceFacts;

    /// Run one batch of lanes to completion.
    ///
    /// Returns [`ember_core::Error::Timeout`] if the device did not signal
    /// completion in time and [`ember_core::Error::OutOfResources`] for a
    /// hardware-reported fault.
    fn execute(&self, req: &ExecuteRequest<'_>) -> Result<()>;
}

// =============================================================================
// TESTS
// =============================================================================
