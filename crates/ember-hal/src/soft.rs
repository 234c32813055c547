//! # Software Device Model
//!
//! A host-memory stand-in for the VPU and its allocator.
//!
//! The soft device honors the same contracts as the hardware backends:
//! bump-allocated bus addresses, host-visible buffers, and a compute unit
//! that consumes launch records. Instead of running kernel code it records
//! every execute call together with a snapshot of the memory the records
//! point into, which is what the dispatcher tests assert against.

use std::sync::{Arc, Mutex, Weak};

use ember_core::{DeviceAddr, Error, Result, align_up};

use crate::memory::{AllocFlags, DeviceAllocator, DeviceBuffer, DeviceContext};
use crate::unit::{ComputeUnit, DeviceFacts, ExecuteRequest, LaunchRecord};

// Bus window the soft device hands addresses out of.
const SOFT_BASE_ADDR: u32 = 0x2000_0000;
const SOFT_CAPACITY: usize = 64 * 1024 * 1024;
const SOFT_ALIGN: usize = 4096;

// =============================================================================
// SOFT ALLOCATOR
// =============================================================================

/// Bump allocator over a fake bus window, with an allocation registry
///
/// The registry maps bus ranges back to live buffers so the soft compute
/// unit can resolve the addresses inside launch records the way the real
/// device resolves them over the bus.
pub struct SoftAllocator {
    state: Mutex<AllocState>,
}

struct AllocState {
    next: u32,
    registry: Vec<Registration>,
}

struct Registration {
    start: u32,
    end: u32,
    buffer: Weak<DeviceBuffer>,
}

impl SoftAllocator {
    /// Create an empty soft allocator
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(AllocState {
                next: SOFT_BASE_ADDR,
                registry: Vec::new(),
            }),
        })
    }

    /// Resolve a bus address to a live buffer and an offset into it
    pub fn resolve(&self, addr: DeviceAddr) -> Option<(Arc<DeviceBuffer>, usize)> {
        let state = self.state.lock().expect("allocator lock poisoned");
        for reg in &state.registry {
            if addr.raw() >= reg.start && addr.raw() < reg.end {
                if let Some(buffer) = reg.buffer.upgrade() {
                    return Some((buffer, (addr.raw() - reg.start) as usize));
                }
            }
        }
        None
    }

    fn live_bytes(registry: &[Registration]) -> usize {
        registry
            .iter()
            .filter(|r| r.buffer.strong_count() > 0)
            .map(|r| (r.end - r.start) as usize)
            .sum()
    }
}

impl DeviceAllocator for SoftAllocator {
    fn allocate(&self, size: usize, _flags: AllocFlags) -> Result<Arc<DeviceBuffer>> {
        if size == 0 {
            return Err(Error::AllocationFailed);
        }
        let mut state = self.state.lock().expect("allocator lock poisoned");
        // Dead registrations keep their addresses; the window is large
        // enough that the bump pointer outlives any test run.
        state.registry.retain(|r| r.buffer.strong_count() > 0);

        let aligned = align_up(size, SOFT_ALIGN);
        if Self::live_bytes(&state.registry) + aligned > SOFT_CAPACITY {
            return Err(Error::AllocationFailed);
        }
        let start = state.next;
        let Some(next) = start.checked_add(aligned as u32) else {
            return Err(Error::AllocationFailed);
        };
        state.next = next;

        let buffer = Arc::new(DeviceBuffer::new(DeviceAddr::new(start), size));
        state.registry.push(Registration {
            start,
            end: next,
            buffer: Arc::downgrade(&buffer),
        });
        log::trace!("soft alloc: {} bytes at {}", size, buffer.addr());
        Ok(buffer)
    }

    fn total_capacity(&self) -> usize {
        SOFT_CAPACITY
    }

    fn available(&self) -> usize {
        let state = self.state.lock().expect("allocator lock poisoned");
        SOFT_CAPACITY - Self::live_bytes(&state.registry)
    }
}

// =============================================================================
// EXECUTE CAPTURE
// =============================================================================

/// One observed execute call
#[derive(Debug, Clone)]
pub struct ExecCapture {
    /// Lanes the call started
    pub lanes: u32,
    /// Whether the instruction cache was flushed
    pub flush_icache: bool,
    /// The launch records as handed to the hardware
    pub records: Vec<LaunchRecord>,
    /// Bus address of the buffer backing the launch records
    pub memory_base: DeviceAddr,
    /// Snapshot of that buffer at call time
    pub memory: Vec<u8>,
}

// =============================================================================
// SOFT COMPUTE UNIT
// =============================================================================

/// Recording compute unit
///
/// Every execute call is captured; an injected error makes the next call
/// fail, which is how the timeout/fault paths are exercised.
pub struct SoftVpu {
    facts: DeviceFacts,
    allocator: Arc<SoftAllocator>,
    captures: Mutex<Vec<ExecCapture>>,
    inject: Mutex<Option<Error>>,
}

impl SoftVpu {
    /// Create a soft unit over the given allocator
    pub fn new(facts: DeviceFacts, allocator: Arc<SoftAllocator>) -> Arc<Self> {
        Arc::new(Self {
            facts,
            allocator,
            captures: Mutex::new(Vec::new()),
            inject: Mutex::new(None),
        })
    }

    /// Number of execute calls observed so far
    pub fn call_count(&self) -> usize {
        self.captures.lock().expect("capture lock poisoned").len()
    }

    /// Clone out all observed calls
    pub fn captures(&self) -> Vec<ExecCapture> {
        self.captures.lock().expect("capture lock poisoned").clone()
    }

    /// Make the next execute call fail with `error`
    pub fn inject_failure(&self, error: Error) {
        *self.inject.lock().expect("inject lock poisoned") = Some(error);
    }
}

impl ComputeUnit for SoftVpu {
    fn facts(&self) -> DeviceFacts {
        self.facts
    }

    fn execute(&self, req: &ExecuteRequest<'_>) -> Result<()> {
        if let Some(error) = self.inject.lock().expect("inject lock poisoned").take() {
            log::trace!("soft execute: injected {error}");
            return Err(error);
        }
        if req.lanes as usize != req.records.len() {
            return Err(Error::OutOfResources);
        }
        let (buffer, _) = self
            .allocator
            .resolve(req.records_addr)
            .ok_or(Error::OutOfResources)?;
        self.captures
            .lock()
            .expect("capture lock poisoned")
            .push(ExecCapture {
                lanes: req.lanes,
                flush_icache: req.flush_icache,
                records: req.records.to_vec(),
                memory_base: buffer.addr(),
                memory: buffer.snapshot(),
            });
        Ok(())
    }
}

/// Build a soft device context, returning the unit for observation
pub fn soft_context(facts: DeviceFacts) -> (DeviceContext, Arc<SoftVpu>) {
    let allocator = SoftAllocator::new();
    let unit = SoftVpu::new(facts, allocator.clone());
    (DeviceContext::new(unit.clone(), allocator), unit)
}

// =============================================================================
// TESTS
// =============================================================================
