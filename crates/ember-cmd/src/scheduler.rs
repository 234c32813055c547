//! # Scheduler
//!
//! The global FIFO and its single worker thread.
//!
//! All queues of a device feed one FIFO, drained in submission order by
//! one worker: the hardware has exactly one execution unit, so per-queue
//! workers would only add synchronization around the same silicon. The
//! worker owns the only path to the compute unit; no lock guards the
//! hardware itself.
//!
//! Errors are terminal, never retried, and never block the FIFO: a failed
//! command marks its event and the worker moves on to the next one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use ember_core::{Error, ExecStatus, QueueId, Result};
use ember_hal::memory::DeviceContext;

use crate::event::Event;

// =============================================================================
// SCHEDULER
// =============================================================================

/// The command scheduler for one device
///
/// Constructed explicitly with its device dependency (no hidden global);
/// queues share it via `Arc`, so the worker lives from the first queue's
/// creation to the last handle's release. Dropping the scheduler stops
/// the worker after the FIFO drains.
pub struct Scheduler {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    device: DeviceContext,
    fifo: Mutex<VecDeque<Arc<Event>>>,
    event_available: Condvar,
    stop: AtomicBool,
}

impl Scheduler {
    /// Start a scheduler (and its worker thread) for `device`.
    pub fn new(device: DeviceContext) -> Result<Arc<Self>> {
        let shared = Arc::new(Shared {
            device,
            fifo: Mutex::new(VecDeque::new()),
            event_available: Condvar::new(),
            stop: AtomicBool::new(false),
        });
        let worker_shared = shared.clone();
        let worker = std::thread::Builder::new()
            .name("ember-scheduler".into())
            .spawn(move || worker_loop(&worker_shared))
            .map_err(|_| Error::OutOfResources)?;
        Ok(Arc::new(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }))
    }

    /// The device this scheduler drives
    pub fn device(&self) -> &DeviceContext {
        &self.shared.device
    }

    /// Events currently sitting in the FIFO
    pub fn pending(&self) -> usize {
        self.shared.fifo.lock().expect("fifo lock poisoned").len()
    }

    /// Hand an event to the worker. The FIFO holds a reference until the
    /// command has run.
    pub(crate) fn submit(&self, event: Arc<Event>) {
        let mut fifo = self.shared.fifo.lock().expect("fifo lock poisoned");
        fifo.push_back(event);
        drop(fifo);
        self.shared.event_available.notify_one();
    }

    /// Earliest FIFO event still bound to `queue`, if any.
    ///
    /// A snapshot, not a barrier: events enqueued after the scan are not
    /// seen, and the event currently on the worker is no longer in the
    /// FIFO.
    pub(crate) fn find_queued(&self, queue: QueueId) -> Option<Arc<Event>> {
        let fifo = self.shared.fifo.lock().expect("fifo lock poisoned");
        fifo.iter()
            .find(|event| event.queue_id() == Some(queue))
            .cloned()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.event_available.notify_all();
        if let Some(worker) = self
            .worker
            .lock()
            .expect("worker handle lock poisoned")
            .take()
        {
            let _ = worker.join();
        }
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// WORKER
// =============================================================================

fn worker_loop(shared: &Shared) {
    log::debug!("scheduler worker started");
    loop {
        let event = {
            let mut fifo = shared.fifo.lock().expect("fifo lock poisoned");
            loop {
                if let Some(event) = fifo.pop_front() {
                    break Some(event);
                }
                // Stop only once the FIFO is drained; enqueued work always
                // runs, even during shutdown.
                if shared.stop.load(Ordering::Acquire) {
                    break None;
                }
                fifo = shared
                    .event_available
                    .wait(fifo)
                    .expect("fifo lock poisoned");
            }
        };
        let Some(event) = event else {
            break;
        };
        run_event(&shared.device, &event);
        // The scheduler's reference is released here; waiters were woken
        // by the terminal status update.
    }
    log::debug!("scheduler worker stopped");
}

fn run_event(device: &DeviceContext, event: &Arc<Event>) {
    event.update_status(ExecStatus::Submitted, true);
    event.update_status(ExecStatus::Running, true);

    let result = match event.take_command() {
        Some(command) => {
            log::trace!("running {} for event {:?}", command.label(), event.id());
            command.execute(device)
        }
        None => Ok(()),
    };

    match result {
        Ok(()) => event.update_status(ExecStatus::Complete, true),
        Err(error) => {
            log::warn!("event {:?} failed: {error}", event.id());
            event.update_status(ExecStatus::Errored(error), true);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
