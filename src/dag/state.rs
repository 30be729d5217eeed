// src/dag/state.rs

//! Per-run task state and run status.

use std::fmt;

use crate::dag::task::TaskId;

/// State of one task within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    /// Waiting for upstream tasks.
    Pending,
    /// Dispatched to its operator.
    Running,
    /// Last attempt failed; waiting for the retry delay to elapse.
    Retrying,
    Success,
    /// Retries exhausted (or abandoned because the run is failing).
    Failed,
    /// Never executed because a dependency failed.
    UpstreamFailed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::UpstreamFailed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Retrying => write!(f, "retrying"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::UpstreamFailed => write!(f, "upstream_failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Pending,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Mutable per-run bookkeeping for a single task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRecord {
    pub state: TaskState,
    /// Number of times the task has been dispatched in this run.
    pub attempt_count: u32,
    /// Reason of the most recent failed attempt.
    pub last_error: Option<String>,
    /// For `UpstreamFailed`: the permanently failed task that blocked this one.
    pub blocked_by: Option<TaskId>,
}

impl TaskRecord {
    pub fn pending() -> Self {
        Self {
            state: TaskState::Pending,
            attempt_count: 0,
            last_error: None,
            blocked_by: None,
        }
    }
}
