//! # Commands
//!
//! The unit of work an event eventually executes.
//!
//! A command is a closed set of variants: buffer movement, a fill, a
//! kernel invocation, and the no-op marker. The worker thread executes
//! each command exactly once against the device context; dependency
//! ordering is the scheduler's business, so commands themselves never
//! block on other events.

use std::fmt;
use std::sync::Arc;

use ember_core::Result;
use ember_exec::dispatch::{KernelInvocation, dispatch};
use ember_hal::memory::{DeviceBuffer, DeviceContext};

// =============================================================================
// HOST SLICE
// =============================================================================

/// Unowned host memory a transfer command reads or writes
///
/// The enqueue API hands the runtime a raw caller pointer; the command
/// touches it on the worker thread while the event is `Running`.
pub struct HostSlice {
    ptr: *mut u8,
    len: usize,
}

impl HostSlice {
    /// Wrap a caller-owned region.
    ///
    /// # Safety
    /// `ptr` must be valid for reads and writes of `len` bytes until the
    /// owning event reaches a terminal status, and the caller must not
    /// touch the region while the command runs.
    pub unsafe fn new(ptr: *mut u8, len: usize) -> Self {
        Self { ptr, len }
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check for a zero-length region
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn as_slice(&self) -> &[u8] {
        // SAFETY: validity for the command's lifetime is the `new` contract.
        unsafe { core::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: validity for the command's lifetime is the `new` contract.
        unsafe { core::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

// SAFETY: the region is exclusively the command's between enqueue and the
// terminal status, per the `new` contract; the worker is the only toucher.
unsafe impl Send for HostSlice {}

impl fmt::Debug for HostSlice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostSlice({:p}, {} bytes)", self.ptr, self.len)
    }
}

// =============================================================================
// COMMAND
// =============================================================================

/// One unit of device work
#[derive(Debug)]
pub enum Command {
    /// Copy device memory into host memory
    ReadBuffer {
        /// Source buffer
        src: Arc<DeviceBuffer>,
        /// Byte offset into the source
        src_offset: usize,
        /// Destination region on the host
        dst: HostSlice,
    },
    /// Copy host memory into device memory
    WriteBuffer {
        /// Destination buffer
        dst: Arc<DeviceBuffer>,
        /// Byte offset into the destination
        dst_offset: usize,
        /// Source region on the host
        src: HostSlice,
    },
    /// Copy between device buffers
    CopyBuffer {
        /// Source buffer
        src: Arc<DeviceBuffer>,
        /// Byte offset into the source
        src_offset: usize,
        /// Destination buffer
        dst: Arc<DeviceBuffer>,
        /// Byte offset into the destination
        dst_offset: usize,
        /// Bytes to copy
        len: usize,
    },
    /// Repeat a pattern over a device region
    FillBuffer {
        /// Destination buffer
        dst: Arc<DeviceBuffer>,
        /// Byte offset into the destination
        offset: usize,
        /// Fill pattern
        pattern: Vec<u8>,
        /// Bytes to fill (a whole number of patterns)
        len: usize,
    },
    /// Run a kernel over its index space
    InvokeKernel(Box<KernelInvocation>),
    /// No-op (barrier/marker); ordering comes from the FIFO itself
    Marker,
}

impl Command {
    /// Short name for logging
    pub fn label(&self) -> &'static str {
        match self {
            Self::ReadBuffer { .. } => "read-buffer",
            Self::WriteBuffer { .. } => "write-buffer",
            Self::CopyBuffer { .. } => "copy-buffer",
            Self::FillBuffer { .. } => "fill-buffer",
            Self::InvokeKernel(_) => "invoke-kernel",
            Self::Marker => "marker",
        }
    }

    /// Perform the action. Called exactly once, on the worker thread.
    pub(crate) fn execute(self, ctx: &DeviceContext) -> Result<()> {
        match self {
            Self::ReadBuffer {
                src,
                src_offset,
                mut dst,
            } => src.read(src_offset, dst.as_mut_slice()),
            Self::WriteBuffer {
                dst,
                dst_offset,
                src,
            } => dst.write(dst_offset, src.as_slice()),
            Self::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                len,
            } => {
                // Staged through the host; buffers lock independently, so
                // a direct lock-both copy would risk ordering deadlocks.
                let mut staging = vec![0u8; len];
                src.read(src_offset, &mut staging)?;
                dst.write(dst_offset, &staging)
            }
            Self::FillBuffer {
                dst,
                offset,
                pattern,
                len,
            } => dst.fill(offset, &pattern, len),
            Self::InvokeKernel(inv) => dispatch(&inv, ctx),
            Self::Marker => Ok(()),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::Error;
    use ember_hal::memory::AllocFlags;
    use ember_hal::soft::soft_context;
    use ember_hal::unit::DeviceFacts;

    fn ctx() -> DeviceContext {
        soft_context(DeviceFacts::default()).0
    }

    #[test]
    fn test_write_then_read_round_trip() {
        let ctx = ctx();
        let buf = ctx.memory.allocate(16, AllocFlags::HOST_VISIBLE).unwrap();

        let mut src = [9u8, 8, 7, 6];
        // SAFETY: `src` outlives the synchronous execute below.
        let host = unsafe { HostSlice::new(src.as_mut_ptr(), src.len()) };
        Command::WriteBuffer {
            dst: buf.clone(),
            dst_offset: 4,
            src: host,
        }
        .execute(&ctx)
        .unwrap();

        let mut out = [0u8; 4];
        // SAFETY: `out` outlives the synchronous execute below.
        let host = unsafe { HostSlice::new(out.as_mut_ptr(), out.len()) };
        Command::ReadBuffer {
            src: buf,
            src_offset: 4,
            dst: host,
        }
        .execute(&ctx)
        .unwrap();
        assert_eq!(out, [9, 8, 7, 6]);
    }

    #[test]
    fn test_copy_between_buffers() {
        let ctx = ctx();
        let a = ctx.memory.allocate(8, AllocFlags::HOST_VISIBLE).unwrap();
        let b = ctx.memory.allocate(8, AllocFlags::HOST_VISIBLE).unwrap();
        a.write(0, &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();

        Command::CopyBuffer {
            src: a,
            src_offset: 2,
            dst: b.clone(),
            dst_offset: 0,
            len: 4,
        }
        .execute(&ctx)
        .unwrap();
        assert_eq!(&b.snapshot()[0..4], &[3, 4, 5, 6]);
    }

    #[test]
    fn test_fill_and_marker() {
        let ctx = ctx();
        let buf = ctx.memory.allocate(8, AllocFlags::HOST_VISIBLE).unwrap();
        Command::FillBuffer {
            dst: buf.clone(),
            offset: 0,
            pattern: vec![0x5A],
            len: 8,
        }
        .execute(&ctx)
        .unwrap();
        assert_eq!(buf.snapshot(), vec![0x5A; 8]);
        assert!(Command::Marker.execute(&ctx).is_ok());
    }

    #[test]
    fn test_out_of_range_copy_fails() {
        let ctx = ctx();
        let a = ctx.memory.allocate(8, AllocFlags::HOST_VISIBLE).unwrap();
        let b = ctx.memory.allocate(8, AllocFlags::HOST_VISIBLE).unwrap();
        let err = Command::CopyBuffer {
            src: a,
            src_offset: 4,
            dst: b,
            dst_offset: 0,
            len: 8,
        }
        .execute(&ctx)
        .unwrap_err();
        assert_eq!(err, Error::InvalidOperation);
    }
}
