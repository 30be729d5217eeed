// src/dag/run_step.rs

//! Step-by-step execution result types for a run.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::dag::task::TaskId;

/// Description of an attempt the run wants its executor to start now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub task: TaskId,
    /// 1-based attempt number within the run.
    pub attempt: u32,
    pub run_id: u64,
    pub logical_time: DateTime<Utc>,
}

/// A failed attempt that should be re-dispatched once `delay` elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRetry {
    pub task: TaskId,
    /// Attempt number the retry will have.
    pub next_attempt: u32,
    pub delay: Duration,
}

/// Structured result of a single run "step".
///
/// Tests can drive a [`Run`](crate::dag::Run) by hand and assert on exactly
/// what changed.
#[derive(Debug, Clone, Default)]
pub struct RunStep {
    /// Attempts to start now.
    pub dispatched: Vec<Dispatch>,
    /// Retries to schedule.
    pub retries: Vec<ScheduledRetry>,
    /// Tasks that became permanently `Failed` in this step.
    pub newly_failed: Vec<TaskId>,
    /// Tasks skipped as `UpstreamFailed` in this step.
    pub newly_upstream_failed: Vec<TaskId>,
    /// Whether this step made the run terminal.
    pub run_just_finished: bool,
}

impl RunStep {
    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty()
            && self.retries.is_empty()
            && self.newly_failed.is_empty()
            && self.newly_upstream_failed.is_empty()
            && !self.run_just_finished
    }
}
