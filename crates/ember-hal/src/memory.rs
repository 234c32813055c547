//! # Device Memory
//!
//! Bus-addressed, host-mapped device memory.
//!
//! The VPU shares physical memory with the host; an allocation is a
//! contiguous region with one bus address (what the device dereferences)
//! and one host mapping (what the runtime reads and writes). Allocations
//! are freed when the last owner drops its handle.

use std::sync::{Arc, Mutex};

use ember_core::{DeviceAddr, Error, Result};

use crate::unit::ComputeUnit;

// =============================================================================
// ALLOCATION FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Properties requested for a device memory allocation
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocFlags: u32 {
        /// Host reads/writes the region (all runtime allocations do)
        const HOST_VISIBLE = 1 << 0;
        /// Region holds machine code the compute unit will fetch
        const EXECUTABLE = 1 << 1;
        /// Zero the region before handing it out
        const ZERO_FILL = 1 << 2;
    }
}

// =============================================================================
// DEVICE BUFFER
// =============================================================================

/// A live device memory allocation
///
/// Contents are guarded by a lock: the scheduler worker is the only writer
/// while a command runs, but host threads may map/read buffers they own
/// concurrently with unrelated commands.
#[derive(Debug)]
pub struct DeviceBuffer {
    addr: DeviceAddr,
    len: usize,
    data: Mutex<Box<[u8]>>,
}

impl DeviceBuffer {
    /// Create a zero-filled buffer at the given bus address
    pub fn new(addr: DeviceAddr, len: usize) -> Self {
        Self {
            addr,
            len,
            data: Mutex::new(vec![0u8; len].into_boxed_slice()),
        }
    }

    /// Bus address of the first byte
    #[inline]
    pub fn addr(&self) -> DeviceAddr {
        self.addr
    }

    /// Size in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check for a zero-sized buffer
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<()> {
        if offset.checked_add(len).is_none_or(|end| end > self.len) {
            return Err(Error::InvalidOperation);
        }
        Ok(())
    }

    /// Copy `out.len()` bytes starting at `offset` into `out`
    pub fn read(&self, offset: usize, out: &mut [u8]) -> Result<()> {
        self.check_range(offset, out.len())?;
        let data = self.data.lock().expect("buffer lock poisoned");
        out.copy_from_slice(&data[offset..offset + out.len()]);
        Ok(())
    }

    /// Copy `bytes` into the buffer starting at `offset`
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.check_range(offset, bytes.len())?;
        let mut data = self.data.lock().expect("buffer lock poisoned");
        data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Repeat `pattern` over `len` bytes starting at `offset`.
    ///
    /// `len` must be a multiple of the pattern length (the API layer
    /// validates this before a fill command is created).
    pub fn fill(&self, offset: usize, pattern: &[u8], len: usize) -> Result<()> {
        if pattern.is_empty() || len % pattern.len() != 0 {
            return Err(Error::InvalidOperation);
        }
        self.check_range(offset, len)?;
        let mut data = self.data.lock().expect("buffer lock poisoned");
        for chunk in data[offset..offset + len].chunks_mut(pattern.len()) {
            chunk.copy_from_slice(pattern);
        }
        Ok(())
    }

    /// Snapshot the full contents (software-model observation hook)
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().expect("buffer lock poisoned").to_vec()
    }
}

// =============================================================================
// ALLOCATOR TRAIT
// =============================================================================

/// Device memory allocator
///
/// Allocations are shared-ownership; the region is returned to the
/// allocator when the last `Arc` drops.
pub trait DeviceAllocator: Send + Sync {
    /// Allocate `size` bytes of device memory
    fn allocate(&self, size: usize, flags: AllocFlags) -> Result<Arc<DeviceBuffer>>;

    /// Total memory the device exposes
    fn total_capacity(&self) -> usize;

    /// Memory currently available for allocation
    fn available(&self) -> usize;
}

// =============================================================================
// DEVICE CONTEXT
// =============================================================================

/// Everything a command needs to touch the device
///
/// One context per physical device; cloning shares the underlying unit
/// and allocator.
#[derive(Clone)]
pub struct DeviceContext {
    /// The compute unit
    pub unit: Arc<dyn ComputeUnit>,
    /// The device memory allocator
    pub memory: Arc<dyn DeviceAllocator>,
}

impl DeviceContext {
    /// Bundle a compute unit and an allocator
    pub fn new(unit: Arc<dyn ComputeUnit>, memory: Arc<dyn DeviceAllocator>) -> Self {
        Self { unit, memory }
    }
}

impl core::fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DeviceContext")
            .field("facts", &self.unit.facts())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
