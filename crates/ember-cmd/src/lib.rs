//! # EMBER Cmd
//!
//! The asynchronous command engine.
//!
//! Callers wrap work into [`Command`]s, attach them to [`Event`]s, and
//! enqueue those on a [`CommandQueue`]. All queues feed one [`Scheduler`]:
//! a global FIFO drained by a single worker thread, matching the one
//! physical compute unit. Waiting, dependency tracking, profiling, and
//! completion callbacks all hang off the event.
//!
//! ## Flow
//!
//! ```text
//! caller ──▶ CommandQueue::enqueue ──▶ Scheduler FIFO ──▶ worker thread
//!                                                            │
//!                       Event::wait_for ◀── status updates ──┤
//!                                                            ▼
//!                                                     Command::execute
//! ```

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]
#![warn(clippy::all)]

// =============================================================================
// MODULE EXPORTS
// =============================================================================

pub mod command;
pub mod event;
pub mod queue;
pub mod scheduler;

// Re-exports for convenience
pub use command::{Command, HostSlice};
pub use event::{Event, EventProfile, WaitListStatus};
pub use queue::{CommandQueue, QueueFlags};
pub use scheduler::Scheduler;
