//! # Kernel Dispatcher
//!
//! Drives one kernel invocation through the compute unit.
//!
//! The index space is tiled into groups of at most the device's lane
//! count. Consecutive groups along the first axis are batched into one
//! hardware-execute call: each lane gets one parameter block per batched
//! iteration, chained by the continue-batch flag the hardware checks
//! before looping. Between execute calls only the parameter blocks are
//! rewritten: global data, code, and launch records stay in place in the
//! same scratch allocation.

use std::sync::Arc;

use arrayvec::ArrayVec;
use bytemuck::bytes_of;

use ember_core::{Error, Result, align_up};
use ember_hal::memory::{AllocFlags, DeviceBuffer, DeviceContext};
use ember_hal::unit::{DeviceFacts, ExecuteRequest, LaunchRecord, MAX_LANES};

use crate::kernel::{CODE_ALIGN, KernelImage};
use crate::layout::{
    ImplicitBlock, WORD_BYTES, block_words, continue_flag_word, pack_triple,
};
use crate::partition::{derive_group_size, validate_group_size};

// =============================================================================
// KERNEL INVOCATION
// =============================================================================

/// Immutable snapshot of one kernel invocation
///
/// Built by [`KernelInvocation::plan`] at enqueue time; never mutated
/// afterwards. Unused dimensions are normalized to size 1 / offset 0.
#[derive(Debug, Clone)]
pub struct KernelInvocation {
    /// The kernel to run
    pub kernel: KernelImage,
    /// Work dimensionality (1..=3)
    pub work_dim: u32,
    /// Global offset per axis
    pub global_offset: [u32; 3],
    /// Global size per axis
    pub global_size: [u32; 3],
    /// Group (local) size per axis
    pub local_size: [u32; 3],
}

impl KernelInvocation {
    /// Validate and snapshot an invocation.
    ///
    /// When `local_size` is `None` the partitioner derives one. All
    /// validation errors here are synchronous: no event exists yet.
    pub fn plan(
        kernel: KernelImage,
        work_dim: u32,
        global_offset: [u32; 3],
        global_size: [u32; 3],
        local_size: Option<[u32; 3]>,
        facts: &DeviceFacts,
    ) -> Result<Self> {
        if !(1..=3).contains(&work_dim) {
            return Err(Error::InvalidWorkDimension);
        }
        kernel.validate()?;

        let mut global = global_size;
        let mut offset = global_offset;
        let mut local = local_size;
        for i in work_dim as usize..3 {
            global[i] = 1;
            offset[i] = 0;
            if let Some(l) = local.as_mut() {
                l[i] = 1;
            }
        }

        for i in 0..3 {
            if offset[i].checked_add(global[i]).is_none() {
                return Err(Error::InvalidGlobalOffset);
            }
        }

        let max_lanes = effective_lanes(facts);
        let local = match local {
            Some(l) => l,
            None => derive_group_size(global, kernel.required_group, max_lanes)?,
        };
        validate_group_size(global, local, max_lanes)?;

        Ok(Self {
            kernel,
            work_dim,
            global_offset: offset,
            global_size: global,
            local_size: local,
        })
    }

    /// Lanes one group occupies
    pub fn lane_count(&self) -> u32 {
        self.local_size[0] * self.local_size[1] * self.local_size[2]
    }

    /// Groups per axis
    pub fn group_limits(&self) -> [u32; 3] {
        [
            self.global_size[0] / self.local_size[0],
            self.global_size[1] / self.local_size[1],
            self.global_size[2] / self.local_size[2],
        ]
    }
}

fn effective_lanes(facts: &DeviceFacts) -> u32 {
    facts.lanes.min(MAX_LANES as u32)
}

// =============================================================================
// GROUP WALK
// =============================================================================

/// Iteration state over the group grid, advancing by whole batches along
/// the first axis. Transient; lives for one dispatch only.
#[derive(Debug)]
struct GroupWalk {
    limits: [u32; 3],
    index: [u32; 3],
    batch: u32,
}

impl GroupWalk {
    fn new(limits: [u32; 3], batch: u32) -> Self {
        Self {
            limits,
            index: [0, 0, 0],
            batch,
        }
    }

    fn index(&self) -> [u32; 3] {
        self.index
    }

    /// Step to the next batch; false once the grid is exhausted.
    fn advance(&mut self) -> bool {
        self.index[0] += self.batch;
        if self.index[0] < self.limits[0] {
            return true;
        }
        self.index[0] = 0;
        self.index[1] += 1;
        if self.index[1] < self.limits[1] {
            return true;
        }
        self.index[1] = 0;
        self.index[2] += 1;
        self.index[2] < self.limits[2]
    }
}

/// Largest batch that evenly divides the first group axis, capped by the
/// device's batch limit.
fn pick_batch(limit_x: u32, max_batch: u32) -> u32 {
    let mut b = max_batch.max(1).min(limit_x);
    while b > 1 {
        if limit_x % b == 0 {
            return b;
        }
        b -= 1;
    }
    1
}

// =============================================================================
// SCRATCH LAYOUT
// =============================================================================

/// Byte offsets of the regions inside the scratch allocation:
/// global data, code, parameter blocks (lane-major), launch records.
#[derive(Debug, Clone, Copy)]
struct ScratchPlan {
    code_off: usize,
    uniforms_off: usize,
    records_off: usize,
    block_bytes: usize,
    lane_stride: usize,
    total: usize,
}

fn scratch_plan(kernel: &KernelImage, lanes: u32, batch: u32) -> ScratchPlan {
    let code_off = align_up(kernel.global_data.len(), CODE_ALIGN);
    let uniforms_off = align_up(code_off + kernel.code.len(), CODE_ALIGN);
    let block_bytes = block_words(kernel.param_words()) * WORD_BYTES;
    let lane_stride = block_bytes * batch as usize;
    let records_off = uniforms_off + lanes as usize * lane_stride;
    let total = records_off + lanes as usize * core::mem::size_of::<LaunchRecord>();
    ScratchPlan {
        code_off,
        uniforms_off,
        records_off,
        block_bytes,
        lane_stride,
        total,
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Run one kernel invocation to completion.
///
/// Blocks the caller (the scheduler worker) for the duration; every
/// hardware-execute call waits for completion or times out. A timeout or
/// hardware fault aborts the invocation with
/// [`Error::OutOfResources`].
pub fn dispatch(inv: &KernelInvocation, ctx: &DeviceContext) -> Result<()> {
    inv.kernel.validate()?;
    let facts = ctx.unit.facts();
    validate_group_size(inv.global_size, inv.local_size, effective_lanes(&facts))?;

    let lanes = inv.lane_count();
    let limits = inv.group_limits();
    let batch = pick_batch(limits[0], facts.max_batch);
    let plan = scratch_plan(&inv.kernel, lanes, batch);

    let scratch = ctx
        .memory
        .allocate(plan.total, AllocFlags::HOST_VISIBLE | AllocFlags::EXECUTABLE)?;
    scratch.write(0, &inv.kernel.global_data)?;
    scratch.write(plan.code_off, &inv.kernel.code)?;

    let code_addr = scratch.addr().offset(plan.code_off as u32);
    let mut records: ArrayVec<LaunchRecord, MAX_LANES> = ArrayVec::new();
    for lane in 0..lanes {
        let uniforms = scratch
            .addr()
            .offset((plan.uniforms_off + lane as usize * plan.lane_stride) as u32);
        records.push(LaunchRecord::new(uniforms, code_addr));
    }
    scratch.write(plan.records_off, bytemuck::cast_slice(records.as_slice()))?;
    let records_addr = scratch.addr().offset(plan.records_off as u32);

    let explicit: Vec<u32> = inv
        .kernel
        .params
        .iter()
        .flat_map(|p| p.words.iter().copied())
        .collect();

    log::debug!(
        "dispatch '{}': {}x{}x{} groups, {} lanes, batch {}",
        inv.kernel.name,
        limits[0],
        limits[1],
        limits[2],
        lanes,
        batch
    );

    let mut walk = GroupWalk::new(limits, batch);
    let mut flush_icache = true;
    loop {
        write_blocks(&scratch, &plan, inv, walk.index(), batch, &explicit)?;

        let req = ExecuteRequest {
            lanes,
            records: records.as_slice(),
            records_addr,
            flush_icache,
            timeout: DeviceFacts::EXECUTE_TIMEOUT,
        };
        ctx.unit.execute(&req).map_err(|e| {
            log::warn!("dispatch '{}' aborted: {e}", inv.kernel.name);
            Error::OutOfResources
        })?;
        flush_icache = false;

        if !walk.advance() {
            return Ok(());
        }
    }
}

/// Rewrite every lane's parameter blocks for the batch starting at
/// `group_base`. Iterations are written in reverse: the final block of
/// the batch goes down first and is the one carrying the stop flag.
fn write_blocks(
    scratch: &Arc<DeviceBuffer>,
    plan: &ScratchPlan,
    inv: &KernelInvocation,
    group_base: [u32; 3],
    batch: u32,
    explicit: &[u32],
) -> Result<()> {
    let [lx, ly, _] = inv.local_size;
    let flag_off = continue_flag_word(explicit.len()) * WORD_BYTES;
    let mut area = vec![0u8; inv.lane_count() as usize * plan.lane_stride];

    for lane in 0..inv.lane_count() {
        let local = [lane % lx, (lane / lx) % ly, lane / (lx * ly)];
        let lane_off = lane as usize * plan.lane_stride;

        for it in (0..batch).rev() {
            let block = ImplicitBlock {
                work_dim: inv.work_dim,
                local_sizes: pack_triple(
                    inv.local_size[0],
                    inv.local_size[1],
                    inv.local_size[2],
                ),
                local_index: pack_triple(local[0], local[1], local[2]),
                group_count: inv.group_limits(),
                group_index: [group_base[0] + it, group_base[1], group_base[2]],
                global_offset: inv.global_offset,
                // Global data sits at the start of the scratch region.
                global_data_addr: scratch.addr().raw(),
            };

            let block_off = lane_off + it as usize * plan.block_bytes;
            let implicit = bytes_of(&block);
            area[block_off..block_off + implicit.len()].copy_from_slice(implicit);

            let params_off = block_off + implicit.len();
            let param_bytes: &[u8] = bytemuck::cast_slice(explicit);
            area[params_off..params_off + param_bytes.len()].copy_from_slice(param_bytes);

            let cont: u32 = if it + 1 == batch { 0 } else { 1 };
            area[block_off + flag_off..block_off + flag_off + WORD_BYTES]
                .copy_from_slice(&cont.to_le_bytes());
        }
    }

    scratch.write(plan.uniforms_off, &area)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::KernelParam;
    use crate::layout::{IMPLICIT_WORDS, unpack_triple};
    use ember_hal::soft::{ExecCapture, soft_context};

    fn facts(lanes: u32, max_batch: u32) -> DeviceFacts {
        DeviceFacts { lanes, max_batch }
    }

    fn kernel() -> KernelImage {
        KernelImage {
            name: "saxpy".into(),
            code: vec![0xA5; 16],
            global_data: vec![1, 2, 3, 4],
            params: vec![KernelParam::scalar("n", 42), KernelParam::scalar("x", 7)],
            required_group: [0, 0, 0],
        }
    }

    fn words_at(mem: &[u8], byte_off: usize, n: usize) -> Vec<u32> {
        mem[byte_off..byte_off + n * WORD_BYTES]
            .chunks(WORD_BYTES)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    fn block_at(cap: &ExecCapture, plan: &ScratchPlan, lane: usize, it: usize, n: usize) -> Vec<u32> {
        let off = plan.uniforms_off + lane * plan.lane_stride + it * plan.block_bytes;
        words_at(&cap.memory, off, n)
    }

    #[test]
    fn test_single_group_single_call() {
        // Index space matching the lane budget: one group, one call.
        let f = facts(4, 8);
        let inv =
            KernelInvocation::plan(kernel(), 1, [0; 3], [4, 1, 1], None, &f).unwrap();
        assert_eq!(inv.local_size, [4, 1, 1]);

        let (ctx, unit) = soft_context(f);
        dispatch(&inv, &ctx).unwrap();
        assert_eq!(unit.call_count(), 1);

        let cap = &unit.captures()[0];
        assert_eq!(cap.lanes, 4);
        assert!(cap.flush_icache);
    }

    #[test]
    fn test_greedy_split_batches_whole_row() {
        // Global 10 with 4 lanes: groups of 2, five groups along x, all
        // batched into a single call (5 <= max batch).
        let f = facts(4, 8);
        let inv =
            KernelInvocation::plan(kernel(), 1, [0; 3], [10, 1, 1], None, &f).unwrap();
        assert_eq!(inv.local_size, [2, 1, 1]);
        assert_eq!(inv.group_limits(), [5, 1, 1]);

        let (ctx, unit) = soft_context(f);
        dispatch(&inv, &ctx).unwrap();
        assert_eq!(unit.call_count(), 1);

        let plan = scratch_plan(&inv.kernel, 2, 5);
        let cap = &unit.captures()[0];
        let n = block_words(inv.kernel.param_words());
        for it in 0..5 {
            let words = block_at(cap, &plan, 0, it, n);
            assert_eq!(words[6], it as u32, "group_index_x of iteration {it}");
            let expect_cont = if it == 4 { 0 } else { 1 };
            assert_eq!(words[n - 1], expect_cont, "continue flag of iteration {it}");
        }
    }

    #[test]
    fn test_execute_call_count_and_icache_flush() {
        // limits (8, 2, 1), batch 4 -> 2 * 2 = 4 calls, flush on the first only.
        let f = facts(4, 4);
        let inv = KernelInvocation::plan(
            kernel(),
            2,
            [0; 3],
            [16, 2, 1],
            Some([2, 1, 1]),
            &f,
        )
        .unwrap();
        assert_eq!(inv.group_limits(), [8, 2, 1]);

        let (ctx, unit) = soft_context(f);
        dispatch(&inv, &ctx).unwrap();

        let caps = unit.captures();
        assert_eq!(caps.len(), 4);
        assert!(caps[0].flush_icache);
        assert!(caps[1..].iter().all(|c| !c.flush_icache));

        // The walk advances x by the batch, then wraps into y.
        let plan = scratch_plan(&inv.kernel, 2, 4);
        let n = block_words(inv.kernel.param_words());
        let bases: Vec<[u32; 3]> = caps
            .iter()
            .map(|c| {
                let w = block_at(c, &plan, 0, 0, n);
                [w[6], w[7], w[8]]
            })
            .collect();
        assert_eq!(bases, vec![[0, 0, 0], [4, 0, 0], [0, 1, 0], [4, 1, 0]]);
    }

    #[test]
    fn test_block_contents() {
        let f = facts(4, 8);
        let inv = KernelInvocation::plan(
            kernel(),
            1,
            [32, 0, 0],
            [8, 1, 1],
            Some([4, 1, 1]),
            &f,
        )
        .unwrap();

        let (ctx, unit) = soft_context(f);
        dispatch(&inv, &ctx).unwrap();

        let plan = scratch_plan(&inv.kernel, 4, 2);
        let cap = &unit.captures()[0];
        let n = block_words(inv.kernel.param_words());

        // Lane 3, first iteration of the batch.
        let words = block_at(cap, &plan, 3, 0, n);
        assert_eq!(words[0], 1, "work_dim");
        assert_eq!(unpack_triple(words[1]), [4, 1, 1], "local sizes");
        assert_eq!(unpack_triple(words[2]), [3, 0, 0], "local index");
        assert_eq!(&words[3..6], &[2, 1, 1], "group count");
        assert_eq!(&words[9..12], &[32, 0, 0], "global offset");
        assert_eq!(words[12], cap.memory_base.raw(), "global data address");
        assert_eq!(&words[IMPLICIT_WORDS..IMPLICIT_WORDS + 2], &[42, 7], "params");

        // Global data and code landed where the records say.
        assert_eq!(&cap.memory[0..4], &[1, 2, 3, 4]);
        let code_addr = cap.records[0].code_addr;
        let code_off = (code_addr - cap.memory_base.raw()) as usize;
        assert_eq!(code_off, plan.code_off);
        assert_eq!(&cap.memory[code_off..code_off + 16], &[0xA5; 16]);

        // Launch records: lane-major parameter-block addresses.
        for (lane, rec) in cap.records.iter().enumerate() {
            let expect = cap.memory_base.raw()
                + (plan.uniforms_off + lane * plan.lane_stride) as u32;
            assert_eq!(rec.uniforms_addr, expect);
        }
    }

    #[test]
    fn test_hardware_failure_is_resource_exhaustion() {
        let f = facts(4, 8);
        let inv =
            KernelInvocation::plan(kernel(), 1, [0; 3], [4, 1, 1], None, &f).unwrap();
        let (ctx, unit) = soft_context(f);
        unit.inject_failure(Error::Timeout);
        assert_eq!(dispatch(&inv, &ctx), Err(Error::OutOfResources));
    }

    #[test]
    fn test_plan_rejects_bad_shapes() {
        let f = facts(4, 8);
        assert_eq!(
            KernelInvocation::plan(kernel(), 0, [0; 3], [4, 1, 1], None, &f).unwrap_err(),
            Error::InvalidWorkDimension
        );
        assert_eq!(
            KernelInvocation::plan(kernel(), 4, [0; 3], [4, 1, 1], None, &f).unwrap_err(),
            Error::InvalidWorkDimension
        );
        // Explicit group size that does not divide the global size.
        assert_eq!(
            KernelInvocation::plan(kernel(), 1, [0; 3], [10, 1, 1], Some([4, 1, 1]), &f)
                .unwrap_err(),
            Error::InvalidGlobalSize
        );
        // Lane product over budget.
        assert_eq!(
            KernelInvocation::plan(kernel(), 2, [0; 3], [8, 8, 1], Some([4, 4, 1]), &f)
                .unwrap_err(),
            Error::InvalidGroupSize
        );
        // Offset pushing the range past the device address space.
        assert_eq!(
            KernelInvocation::plan(kernel(), 1, [u32::MAX, 0, 0], [4, 1, 1], None, &f)
                .unwrap_err(),
            Error::InvalidGlobalOffset
        );
    }

    #[test]
    fn test_plan_normalizes_unused_dimensions() {
        let f = facts(4, 8);
        let inv = KernelInvocation::plan(
            kernel(),
            1,
            [5, 9, 9],
            [4, 7, 7],
            Some([4, 7, 7]),
            &f,
        )
        .unwrap();
        assert_eq!(inv.global_size, [4, 1, 1]);
        assert_eq!(inv.local_size, [4, 1, 1]);
        assert_eq!(inv.global_offset, [5, 0, 0]);
    }

    #[test]
    fn test_pick_batch() {
        assert_eq!(pick_batch(1, 8), 1);
        assert_eq!(pick_batch(5, 8), 5);
        assert_eq!(pick_batch(8, 4), 4);
        assert_eq!(pick_batch(7, 4), 1);
        assert_eq!(pick_batch(12, 8), 6);
        assert_eq!(pick_batch(9, 0), 1);
    }

    #[test]
    fn test_group_walk_covers_grid_exactly_once() {
        let mut walk = GroupWalk::new([6, 2, 2], 3);
        let mut seen = vec![walk.index()];
        while walk.advance() {
            seen.push(walk.index());
        }
        assert_eq!(
            seen,
            vec![
                [0, 0, 0],
                [3, 0, 0],
                [0, 1, 0],
                [3, 1, 0],
                [0, 0, 1],
                [3, 0, 1],
                [0, 1, 1],
                [3, 1, 1],
            ]
        );
    }
}
