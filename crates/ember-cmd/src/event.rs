//! # Events
//!
//! One event tracks one submitted command's lifecycle.
//!
//! Status moves forward only: `Queued` → `Submitted` → `Running` →
//! `Complete`, or to a terminal error. Everything mutable lives under one
//! per-event lock; the condvar that `wait_for` blocks on is paired with
//! that same lock, so the terminal-status check and the wait are atomic
//! and a status set between them cannot be missed.
//!
//! User events are the one exception to worker-driven transitions: they
//! start `Submitted`, never enter the scheduler, and an external caller
//! moves them to their terminal status exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use ember_core::{Error, EventId, ExecStatus, QueueId, Result, StatusLevel};
use ember_hal::time::monotonic_ns;

use crate::command::Command;

// =============================================================================
// PROFILING
// =============================================================================

/// Monotonic timestamps of one event's life, in nanoseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EventProfile {
    /// When the event entered the FIFO
    pub queued: u64,
    /// When the worker picked it up
    pub submitted: u64,
    /// When the command started executing
    pub started: u64,
    /// When the event reached its terminal status
    pub ended: u64,
}

// =============================================================================
// WAIT-LIST STATUS
// =============================================================================

/// Poll-only summary of an event's predecessors
///
/// The scheduler does not consult this before running a command; it
/// exists for callers that want to poll instead of blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitListStatus {
    /// At least one predecessor ended in an error
    Error,
    /// At least one predecessor has not completed yet
    Pending,
    /// Every predecessor completed successfully
    Finished,
}

// =============================================================================
// CALLBACKS
// =============================================================================

type CallbackFn = Box<dyn FnOnce(ExecStatus) + Send>;

struct CallbackSlot {
    threshold: i32,
    hook: Option<CallbackFn>,
}

// =============================================================================
// EVENT
// =============================================================================

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Handle tracking one asynchronous command
///
/// Shared ownership: the scheduler holds a reference while the event is
/// queued or running, every dependent's wait list holds one, and so does
/// the caller. The event is freed when the last reference drops, which
/// cannot happen before its command ran: the scheduler releases its
/// reference only after execution.
pub struct Event {
    id: EventId,
    user: bool,
    state: Mutex<EventState>,
    status_changed: Condvar,
}

struct EventState {
    status: ExecStatus,
    queue: Option<QueueId>,
    profiling: bool,
    wait_list: Option<Arc<[Arc<Event>]>>,
    command: Option<Command>,
    profile: EventProfile,
    callbacks: Vec<CallbackSlot>,
    user_status_set: bool,
}

impl Event {
    fn new(user: bool, status: ExecStatus, command: Option<Command>) -> Arc<Self> {
        Arc::new(Self {
            id: EventId::new(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)),
            user,
            state: Mutex::new(EventState {
                status,
                queue: None,
                profiling: false,
                wait_list: None,
                command,
                profile: EventProfile::default(),
                callbacks: Vec::new(),
                user_status_set: false,
            }),
            status_changed: Condvar::new(),
        })
    }

    /// Create an event carrying a command, ready to enqueue
    pub fn with_command(command: Command) -> Arc<Self> {
        Self::new(false, ExecStatus::Queued, Some(command))
    }

    /// Create a user event; an external caller completes it
    pub fn user() -> Arc<Self> {
        Self::new(true, ExecStatus::Submitted, None)
    }

    /// Unique event id
    #[inline]
    pub fn id(&self) -> EventId {
        self.id
    }

    /// Whether this is a user event
    #[inline]
    pub fn is_user(&self) -> bool {
        self.user
    }

    /// Current status snapshot
    pub fn status(&self) -> ExecStatus {
        self.state.lock().expect("event lock poisoned").status
    }

    // =========================================================================
    // WAIT LIST
    // =========================================================================

    /// Record the predecessors this event logically depends on.
    ///
    /// Legal exactly once, and only before the event is enqueued.
    pub fn set_wait_list(&self, predecessors: &[Arc<Event>]) -> Result<()> {
        let mut state = self.state.lock().expect("event lock poisoned");
        if state.wait_list.is_some() || state.queue.is_some() {
            return Err(Error::InvalidOperation);
        }
        state.wait_list = Some(predecessors.to_vec().into());
        Ok(())
    }

    /// Summarize the predecessors' states
    pub fn wait_list_status(&self) -> WaitListStatus {
        let wait_list = {
            let state = self.state.lock().expect("event lock poisoned");
            state.wait_list.clone()
        };
        let Some(predecessors) = wait_list else {
            return WaitListStatus::Finished;
        };
        let mut pending = false;
        for pred in predecessors.iter() {
            match pred.status() {
                ExecStatus::Errored(_) => return WaitListStatus::Error,
                ExecStatus::Complete => {}
                _ => pending = true,
            }
        }
        if pending {
            WaitListStatus::Pending
        } else {
            WaitListStatus::Finished
        }
    }

    // =========================================================================
    // WAITING
    // =========================================================================

    /// Block until this event (and transitively its wait list) settles.
    ///
    /// Returns the terminal status, or `Errored(WaitListFailed)` as soon
    /// as any predecessor is found to have failed: deliberately distinct
    /// from the predecessor's own code.
    pub fn wait_for(&self) -> ExecStatus {
        let (status, wait_list) = {
            let state = self.state.lock().expect("event lock poisoned");
            (state.status, state.wait_list.clone())
        };
        if status.is_terminal() {
            return status;
        }

        if let Some(predecessors) = wait_list {
            for pred in predecessors.iter() {
                if pred.wait_for().is_error() {
                    return ExecStatus::Errored(Error::WaitListFailed);
                }
            }
        }

        let mut state = self.state.lock().expect("event lock poisoned");
        while !state.status.is_terminal() {
            state = self
                .status_changed
                .wait(state)
                .expect("event lock poisoned");
        }
        state.status
    }

    // =========================================================================
    // CALLBACKS
    // =========================================================================

    /// Register a callback fired once the status reaches `level`.
    ///
    /// If the event already passed the level the callback fires
    /// immediately on the calling thread.
    pub fn set_callback(
        &self,
        level: StatusLevel,
        hook: impl FnOnce(ExecStatus) + Send + 'static,
    ) -> Result<()> {
        let mut state = self.state.lock().expect("event lock poisoned");
        if state.status.raw() <= level.raw() {
            let status = state.status;
            drop(state);
            hook(status);
        } else {
            state.callbacks.push(CallbackSlot {
                threshold: level.raw(),
                hook: Some(Box::new(hook)),
            });
        }
        Ok(())
    }

    // =========================================================================
    // USER EVENTS
    // =========================================================================

    /// Complete a user event from the outside.
    ///
    /// Legal only once, only on user events, and only to `Complete` or an
    /// error.
    pub fn set_user_status(&self, status: ExecStatus) -> Result<()> {
        if !self.user {
            return Err(Error::InvalidEvent);
        }
        if !status.is_terminal() {
            return Err(Error::InvalidOperation);
        }
        {
            let mut state = self.state.lock().expect("event lock poisoned");
            if state.user_status_set {
                return Err(Error::InvalidOperation);
            }
            state.user_status_set = true;
        }
        self.update_status(status, true);
        Ok(())
    }

    // =========================================================================
    // SCHEDULER INTERFACE
    // =========================================================================

    /// Bind the event to a queue; first step of enqueue.
    pub(crate) fn prepare_to_queue(&self, queue: QueueId, profiling: bool) -> Result<()> {
        if self.user {
            return Err(Error::InvalidEvent);
        }
        let mut state = self.state.lock().expect("event lock poisoned");
        if state.queue.is_some() || state.status.is_terminal() {
            return Err(Error::InvalidEvent);
        }
        state.queue = Some(queue);
        state.profiling = profiling;
        state.profile = EventProfile {
            queued: monotonic_ns(),
            ..EventProfile::default()
        };
        Ok(())
    }

    /// The queue this event is bound to, if any
    pub(crate) fn queue_id(&self) -> Option<QueueId> {
        self.state.lock().expect("event lock poisoned").queue
    }

    /// Detach the command for execution; yields `None` the second time.
    pub(crate) fn take_command(&self) -> Option<Command> {
        self.state.lock().expect("event lock poisoned").command.take()
    }

    /// Advance the status.
    ///
    /// Idempotent on an unchanged status: dependency checks re-observe
    /// states, and a repeat must not re-stamp timestamps or re-fire
    /// callbacks. Callbacks whose threshold falls inside the transition
    /// fire exactly once, after the lock is released.
    pub(crate) fn update_status(&self, new: ExecStatus, fire_callbacks: bool) {
        let due = {
            let mut state = self.state.lock().expect("event lock poisoned");
            if state.status == new {
                return;
            }
            let now = monotonic_ns();
            match new {
                ExecStatus::Submitted => state.profile.submitted = now,
                ExecStatus::Running => state.profile.started = now,
                _ => state.profile.ended = now,
            }
            let old_raw = state.status.raw();
            let new_raw = new.raw();
            // Forward-only: every legal transition strictly lowers the raw
            // projection (terminal states are never replaced).
            debug_assert!(new_raw < old_raw, "status moved backwards");
            state.status = new;

            let mut due: Vec<CallbackFn> = Vec::new();
            if fire_callbacks {
                for slot in state.callbacks.iter_mut() {
                    if slot.threshold < old_raw && slot.threshold >= new_raw {
                        if let Some(hook) = slot.hook.take() {
                            due.push(hook);
                        }
                    }
                }
            }
            due
        };
        self.status_changed.notify_all();
        for hook in due {
            hook(new);
        }
    }

    // =========================================================================
    // PROFILING
    // =========================================================================

    /// Profiling timestamps, present only when profiling was enabled on
    /// the queue and the event completed successfully.
    pub fn profile(&self) -> Option<EventProfile> {
        let state = self.state.lock().expect("event lock poisoned");
        if state.profiling && state.status == ExecStatus::Complete {
            Some(state.profile)
        } else {
            None
        }
    }
}

impl core::fmt::Debug for Event {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("user", &self.user)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
