// src/dag/state_manager.rs

//! Per-run state transitions for tasks.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::graph::Graph;
use crate::dag::run_step::Dispatch;
use crate::dag::state::{TaskRecord, TaskState};
use crate::dag::task::TaskId;

/// Applies state transitions to one run's task records.
pub struct StateManager<'a> {
    graph: &'a Graph,
    tasks: &'a mut HashMap<TaskId, TaskRecord>,
    run_id: u64,
    logical_time: DateTime<Utc>,
}

impl<'a> StateManager<'a> {
    pub fn new(
        graph: &'a Graph,
        tasks: &'a mut HashMap<TaskId, TaskRecord>,
        run_id: u64,
        logical_time: DateTime<Utc>,
    ) -> Self {
        Self {
            graph,
            tasks,
            run_id,
            logical_time,
        }
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|r| r.state)
    }

    /// Whether every upstream of `task` is `Success` in this run.
    pub fn deps_satisfied(&self, task: &str) -> bool {
        self.graph.dependencies_of(task).iter().all(|dep| {
            match self.tasks.get(dep) {
                Some(record) => record.state == TaskState::Success,
                None => {
                    warn!(task = %task, dep = %dep, "dependency missing from run state");
                    false
                }
            }
        })
    }

    /// Release the given candidates that are `Pending` with all upstreams
    /// `Success`: mark them `Running`, bump their attempt count and return
    /// them as dispatches.
    ///
    /// Candidates in any other state are skipped, so a task is released at
    /// most once however many upstream completions name it.
    pub fn release_ready<I>(&mut self, candidates: I) -> Vec<Dispatch>
    where
        I: IntoIterator<Item = TaskId>,
    {
        // Decide first, then mutate.
        let ready: Vec<TaskId> = candidates
            .into_iter()
            .filter(|name| {
                self.state_of(name) == Some(TaskState::Pending) && self.deps_satisfied(name)
            })
            .collect();

        let mut dispatched = Vec::new();
        for name in ready {
            if let Some(dispatch) = self.start_attempt(&name) {
                info!(
                    task = %name,
                    run_id = self.run_id,
                    "dependencies satisfied; dispatching task"
                );
                dispatched.push(dispatch);
            }
        }

        dispatched
    }

    /// Move `task` to `Running` and count a new attempt.
    pub fn start_attempt(&mut self, task: &str) -> Option<Dispatch> {
        let record = self.tasks.get_mut(task)?;
        if record.state == TaskState::Running {
            // Already dispatched; never hand out a second concurrent attempt.
            return None;
        }

        record.state = TaskState::Running;
        record.attempt_count += 1;

        debug!(
            task = %task,
            run_id = self.run_id,
            attempt = record.attempt_count,
            "marking Running"
        );

        Some(Dispatch {
            task: task.to_string(),
            attempt: record.attempt_count,
            run_id: self.run_id,
            logical_time: self.logical_time,
        })
    }

    /// Mark every transitive dependent of `failed_task` that has not run yet
    /// as `UpstreamFailed`.
    ///
    /// Returns the newly marked tasks, in topological order.
    pub fn mark_dependents_upstream_failed(&mut self, failed_task: &str) -> Vec<TaskId> {
        let mut newly_failed = Vec::new();

        for name in self.graph.descendants_of(failed_task) {
            if let Some(record) = self.tasks.get_mut(&name) {
                if record.state == TaskState::Pending {
                    record.state = TaskState::UpstreamFailed;
                    record.blocked_by = Some(failed_task.to_string());
                    debug!(
                        task = %name,
                        upstream = %failed_task,
                        run_id = self.run_id,
                        "marking UpstreamFailed due to upstream failure"
                    );
                    newly_failed.push(name);
                }
            }
        }

        newly_failed
    }

    /// Check if all tasks are in a terminal state.
    pub fn all_tasks_terminal(&self) -> bool {
        self.tasks.values().all(|record| record.state.is_terminal())
    }
}
