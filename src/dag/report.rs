// src/dag/report.rs

//! Final outcome of a run, as reported to the user.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::dag::state::{RunStatus, TaskState};
use crate::dag::task::TaskId;
use crate::errors::{RunFailure, TaskFailure};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSummary {
    pub state: TaskState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub run_id: u64,
    pub logical_time: DateTime<Utc>,
    pub status: RunStatus,
    pub tasks: BTreeMap<TaskId, TaskSummary>,
    /// Permanently failed tasks, in topological order.
    pub failures: Vec<TaskFailure>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|s| s.state)
    }

    pub fn attempts_of(&self, task: &str) -> Option<u32> {
        self.tasks.get(task).map(|s| s.attempts)
    }

    /// Tasks currently in `state`, sorted by id.
    pub fn tasks_in(&self, state: TaskState) -> Vec<&str> {
        self.tasks
            .iter()
            .filter(|(_, s)| s.state == state)
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// `Ok(self)` for a successful run, otherwise the run's [`RunFailure`].
    pub fn into_result(self) -> Result<RunReport, RunFailure> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.failure())
        }
    }

    pub fn failure(&self) -> RunFailure {
        RunFailure {
            run_id: self.run_id,
            logical_time: self.logical_time,
            failures: self.failures.clone(),
        }
    }
}
