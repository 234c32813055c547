//! # Command Queues
//!
//! The caller-facing ordering context.
//!
//! A queue is a lightweight handle: flags plus a reference to the shared
//! scheduler. Enqueueing binds an event to the queue and pushes it onto
//! the global FIFO; ordering across all queues of a device is submission
//! order, regardless of which queue an event went through.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ember_core::{QueueId, Result};

use crate::event::Event;
use crate::scheduler::Scheduler;

// =============================================================================
// QUEUE FLAGS
// =============================================================================

bitflags::bitflags! {
    /// Properties requested at queue creation
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueueFlags: u32 {
        /// Caller permits out-of-order execution. Accepted and queryable,
        /// but the engine executes in FIFO order either way: there is
        /// only one execution unit to order against.
        const OUT_OF_ORDER_EXEC = 1 << 0;
        /// Record profiling timestamps on this queue's events
        const PROFILING = 1 << 1;
    }
}

// =============================================================================
// COMMAND QUEUE
// =============================================================================

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// An ordering context bound to the shared scheduler
#[derive(Debug)]
pub struct CommandQueue {
    id: QueueId,
    flags: QueueFlags,
    scheduler: Arc<Scheduler>,
}

impl CommandQueue {
    /// Create a queue on `scheduler`
    pub fn new(scheduler: Arc<Scheduler>, flags: QueueFlags) -> Arc<Self> {
        let id = QueueId::new(NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed));
        log::debug!("queue {id:?} created (flags {flags:?})");
        Arc::new(Self {
            id,
            flags,
            scheduler,
        })
    }

    /// Unique queue id
    #[inline]
    pub fn id(&self) -> QueueId {
        self.id
    }

    /// Flags the queue was created with
    #[inline]
    pub fn flags(&self) -> QueueFlags {
        self.flags
    }

    /// Whether events on this queue record profiling timestamps
    #[inline]
    pub fn profiling_enabled(&self) -> bool {
        self.flags.contains(QueueFlags::PROFILING)
    }

    /// The scheduler this queue feeds
    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Bind `event` to this queue and schedule it.
    ///
    /// Fails without side effects if the event is already bound, already
    /// terminal, or a user event.
    pub fn enqueue(&self, event: &Arc<Event>) -> Result<()> {
        event.prepare_to_queue(self.id, self.profiling_enabled())?;
        self.scheduler.submit(event.clone());
        Ok(())
    }

    /// No-op: enqueue already hands commands to the scheduler.
    pub fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Drain this queue's events from the FIFO.
    ///
    /// A courtesy drain, not an atomic barrier: each pass waits for the
    /// earliest still-queued event bound to this queue, until a scan finds
    /// none. Events enqueued concurrently from other threads may be missed.
    pub fn finish(&self) -> Result<()> {
        while let Some(event) = self.scheduler.find_queued(self.id) {
            // A failed event still counts as drained; its error surfaces
            // through wait_for on the event itself.
            let _ = event.wait_for();
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use ember_core::{Error, ExecStatus};
    use ember_hal::soft::soft_context;
    use ember_hal::unit::DeviceFacts;
    use std::sync::mpsc;
    use std::time::Duration;

    fn queue(flags: QueueFlags) -> Arc<CommandQueue> {
        let (ctx, _) = soft_context(DeviceFacts::default());
        CommandQueue::new(Scheduler::new(ctx).unwrap(), flags)
    }

    #[test]
    fn test_enqueue_runs_to_completion() {
        let q = queue(QueueFlags::empty());
        let event = Event::with_command(Command::Marker);
        q.enqueue(&event).unwrap();
        assert_eq!(event.wait_for(), ExecStatus::Complete);
    }

    #[test]
    fn test_enqueue_validation() {
        let q = queue(QueueFlags::empty());

        let event = Event::with_command(Command::Marker);
        q.enqueue(&event).unwrap();
        // Re-binding a queued (or finished) event is rejected.
        assert_eq!(q.enqueue(&event), Err(Error::InvalidEvent));

        // User events never enter the scheduler.
        let user = Event::user();
        assert_eq!(q.enqueue(&user), Err(Error::InvalidEvent));
    }

    #[test]
    fn test_finish_drains_own_events() {
        let q = queue(QueueFlags::empty());
        let events: Vec<_> = (0..4)
            .map(|_| Event::with_command(Command::Marker))
            .collect();
        for event in &events {
            q.enqueue(event).unwrap();
        }
        q.finish().unwrap();
        assert!(q.scheduler().find_queued(q.id()).is_none());
        for event in &events {
            assert_eq!(event.wait_for(), ExecStatus::Complete);
        }
    }

    #[test]
    fn test_queues_share_one_fifo() {
        let (ctx, _) = soft_context(DeviceFacts::default());
        let sched = Scheduler::new(ctx).unwrap();
        let q1 = CommandQueue::new(sched.clone(), QueueFlags::empty());
        let q2 = CommandQueue::new(sched, QueueFlags::OUT_OF_ORDER_EXEC);
        assert!(q2.flags().contains(QueueFlags::OUT_OF_ORDER_EXEC));

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let events: Vec<_> = (0..6)
            .map(|i| {
                let event = Event::with_command(Command::Marker);
                let order = order.clone();
                event
                    .set_callback(ember_core::StatusLevel::Running, move |_| {
                        order.lock().unwrap().push(i);
                    })
                    .unwrap();
                event
            })
            .collect();

        // Alternate queues; the out-of-order flag changes nothing.
        for (i, event) in events.iter().enumerate() {
            if i % 2 == 0 {
                q1.enqueue(event).unwrap();
            } else {
                q2.enqueue(event).unwrap();
            }
        }
        for event in &events {
            event.wait_for();
        }
        assert_eq!(*order.lock().unwrap(), (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_dependent_still_runs_after_predecessor_fails() {
        let (ctx, _) = soft_context(DeviceFacts::default());
        let sched = Scheduler::new(ctx.clone()).unwrap();
        let q = CommandQueue::new(sched, QueueFlags::empty());

        let buf = ctx
            .memory
            .allocate(4, ember_hal::memory::AllocFlags::HOST_VISIBLE)
            .unwrap();
        let a = Event::with_command(Command::FillBuffer {
            dst: buf,
            offset: 0,
            pattern: vec![1],
            len: 1024,
        });
        let b = Event::with_command(Command::Marker);
        b.set_wait_list(&[a.clone()]).unwrap();

        let (tx, rx) = mpsc::channel();
        b.set_callback(ember_core::StatusLevel::Complete, move |status| {
            let _ = tx.send(status);
        })
        .unwrap();

        q.enqueue(&a).unwrap();
        q.enqueue(&b).unwrap();

        // The FIFO runs b unconditionally, and b itself succeeds.
        assert!(a.wait_for().is_error());
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            ExecStatus::Complete
        );

        // A caller following the a-then-b wait pattern sees the aggregate
        // wait-list error on a fresh dependent that has not settled yet.
        let c = Event::with_command(Command::Marker);
        c.set_wait_list(&[a]).unwrap();
        assert_eq!(c.wait_for(), ExecStatus::Errored(Error::WaitListFailed));
    }

    #[test]
    fn test_kernel_command_reaches_the_device() {
        let facts = DeviceFacts { lanes: 4, max_batch: 8 };
        let (ctx, unit) = soft_context(facts);
        let q = CommandQueue::new(Scheduler::new(ctx).unwrap(), QueueFlags::empty());

        let kernel = ember_exec::kernel::KernelImage {
            name: "memset".into(),
            code: vec![0xEE; 8],
            global_data: Vec::new(),
            params: Vec::new(),
            required_group: [0, 0, 0],
        };
        let inv = ember_exec::dispatch::KernelInvocation::plan(
            kernel,
            1,
            [0; 3],
            [8, 1, 1],
            None,
            &facts,
        )
        .unwrap();

        let event = Event::with_command(Command::InvokeKernel(Box::new(inv)));
        q.enqueue(&event).unwrap();
        assert_eq!(event.wait_for(), ExecStatus::Complete);
        // 8 wide on 4 lanes: two groups, batched into one execute call.
        assert_eq!(unit.call_count(), 1);
        assert_eq!(unit.captures()[0].lanes, 4);
    }

    #[test]
    fn test_profiling_timestamps() {
        let q = queue(QueueFlags::PROFILING);
        let event = Event::with_command(Command::Marker);
        q.enqueue(&event).unwrap();
        assert_eq!(event.wait_for(), ExecStatus::Complete);

        let profile = event.profile().expect("profiling was enabled");
        assert!(profile.queued <= profile.submitted);
        assert!(profile.submitted <= profile.started);
        assert!(profile.started <= profile.ended);
    }

    #[test]
    fn test_profile_absent_without_flag() {
        let q = queue(QueueFlags::empty());
        let event = Event::with_command(Command::Marker);
        q.enqueue(&event).unwrap();
        event.wait_for();
        assert!(event.profile().is_none());
    }
}
