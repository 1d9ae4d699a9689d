#![deny(clippy::disallowed_methods)]
//! Quarry Engine
//!
//! The engine crate is the concurrent evaluation scheduler at the heart of
//! quarry:
//! - dispatches targets to analysis units and evaluates their cases on a
//!   pool of worker threads
//! - feeds every result back in as a new target (breadth-first recursion
//!   with a depth limit)
//! - searches produced data for the configured flag pattern and
//!   short-circuits a whole derivation tree on the first hit
//! - detects global quiescence with a resettable idle barrier and supports
//!   timeouts and two-stage user interrupts
//!
//! The primary type is [`Manager`]. Unit implementations, the unit finder,
//! and the monitor sink are external collaborators bound by the [`Unit`],
//! [`Finder`], and [`Monitor`] traits.
//!
//! Concurrency and Coordination
//! - The work queue is the only mutable state shared by all workers; all
//!   cross-thread coordination uses it plus the idle barrier.
//! - A popped work item is owned by exactly one worker, so each unit's case
//!   iterator has a single consumer; the item is requeued before the case
//!   is evaluated, which is what lets peers consume the next case of the
//!   same unit in parallel.
//! - Workers park on the idle barrier only when the queue is empty.
//!   Enqueueing resets the barrier, which wakes all sleepers to re-check;
//!   a full rendezvous of `threads + 1` parties (workers plus the driver
//!   in [`Manager::join`]) means the run has drained.
#![warn(missing_docs)]
#![warn(unsafe_op_in_unsafe_fn)]

/// Test support utilities exported for the test suite.
pub mod test_support;

mod barrier;
mod error;
mod flags;
mod manager;
mod monitor;
mod queue;
mod target;
mod unit;

pub use error::{Error, Result};
pub use manager::Manager;
pub use monitor::{Monitor, NullMonitor};
pub use target::{Origin, Target};
pub use unit::{Case, Cases, Data, Finder, Unit};
