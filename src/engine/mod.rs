// src/engine/mod.rs

//! Orchestration engine.
//!
//! This module ties together:
//! - the per-run executor, an async shell around the pure
//!   [`Run`](crate::dag::Run) state machine that invokes operators and
//!   sleeps out retry delays
//! - the run queue gating how many runs are active at once
//! - the scheduler loop that materializes runs for due schedule boundaries
//!   and waits for future ones

use crate::dag::TaskId;
use crate::errors::OperatorError;

/// Events flowing into a run's executor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    /// An operator invocation returned.
    AttemptFinished {
        task: TaskId,
        attempt: u32,
        outcome: Result<(), OperatorError>,
    },
    /// The retry delay of a task elapsed.
    RetryDue { task: TaskId },
}

/// Options for the scheduler loop.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerOptions {
    /// Upper bound on concurrently active runs. Clamped to at least 1.
    pub max_active_runs: usize,
    /// Exit once the runs due at startup are finished instead of waiting for
    /// future boundaries (used for `--once`).
    pub exit_when_idle: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_active_runs: 1,
            exit_when_idle: true,
        }
    }
}

pub mod executor;
pub mod queue;
pub mod scheduler;

pub use executor::RunExecutor;
pub use queue::RunQueue;
pub use scheduler::{Scheduler, SchedulerReport};
