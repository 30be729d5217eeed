// src/dag/run.rs

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::dag::graph::Graph;
use crate::dag::report::{RunReport, TaskSummary};
use crate::dag::run_step::{RunStep, ScheduledRetry};
use crate::dag::state::{RunStatus, TaskRecord, TaskState};
use crate::dag::state_manager::StateManager;
use crate::dag::task::TaskId;
use crate::errors::{OperatorError, TaskFailure};

/// Identifier of a run, unique within one scheduler.
pub type RunId = u64;

/// One materialized execution of the graph for a logical timestamp.
///
/// `Run` is a synchronous state machine: it never performs IO. Callers feed
/// it attempt outcomes and retry wake-ups and act on the returned
/// [`RunStep`]s. It is responsible for:
/// - releasing a task only once every upstream is `Success`
/// - deciding between retry and permanent failure
/// - skipping everything downstream of a permanent failure
/// - detecting when the run is terminal
#[derive(Debug)]
pub struct Run {
    id: RunId,
    logical_time: DateTime<Utc>,
    graph: Arc<Graph>,
    tasks: HashMap<TaskId, TaskRecord>,
    status: RunStatus,
    /// Set once any task failed permanently; no further retries are granted.
    tearing_down: bool,
}

impl Run {
    pub fn new(id: RunId, logical_time: DateTime<Utc>, graph: Arc<Graph>) -> Self {
        let tasks = graph
            .topological_order()
            .iter()
            .map(|id| (id.clone(), TaskRecord::pending()))
            .collect();

        Self {
            id,
            logical_time,
            graph,
            tasks,
            status: RunStatus::Pending,
            tearing_down: false,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn logical_time(&self) -> DateTime<Utc> {
        self.logical_time
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn state_of(&self, task: &str) -> Option<TaskState> {
        self.tasks.get(task).map(|r| r.state)
    }

    pub fn attempts_of(&self, task: &str) -> Option<u32> {
        self.tasks.get(task).map(|r| r.attempt_count)
    }

    pub fn record(&self, task: &str) -> Option<&TaskRecord> {
        self.tasks.get(task)
    }

    /// Begin the run: dispatch every entry task.
    pub fn start(&mut self) -> RunStep {
        if self.status != RunStatus::Pending {
            warn!(run_id = self.id, status = %self.status, "start called on a run that already started; ignoring");
            return RunStep::default();
        }

        self.status = RunStatus::Running;
        info!(run_id = self.id, logical_time = %self.logical_time, "starting run");

        let entries: Vec<TaskId> = self.graph.entries().into_iter().map(String::from).collect();
        let dispatched = self.manager().release_ready(entries);

        let mut step = RunStep {
            dispatched,
            ..RunStep::default()
        };
        step.run_just_finished = self.maybe_finish();
        step
    }

    /// Apply the outcome of a task attempt.
    pub fn handle_completion(
        &mut self,
        task: &str,
        outcome: Result<(), OperatorError>,
    ) -> RunStep {
        match self.state_of(task) {
            Some(TaskState::Running) => {}
            Some(state) => {
                warn!(task = %task, run_id = self.id, %state, "completion for task that is not running; ignoring");
                return RunStep::default();
            }
            None => {
                warn!(task = %task, run_id = self.id, "completion for unknown task; ignoring");
                return RunStep::default();
            }
        }

        let mut step = match outcome {
            Ok(()) => self.on_success(task),
            Err(err) => self.on_failure(task, err),
        };
        step.run_just_finished = self.maybe_finish();
        step
    }

    /// The retry delay of `task` elapsed: dispatch it again.
    ///
    /// Retries still waiting when the run starts tearing down are settled as
    /// `Failed` at that moment, so a timer firing afterwards is ignored here.
    pub fn handle_retry_due(&mut self, task: &str) -> RunStep {
        if self.state_of(task) != Some(TaskState::Retrying) {
            debug!(task = %task, run_id = self.id, "retry due for task that is not retrying; ignoring");
            return RunStep::default();
        }

        let mut step = RunStep::default();
        if let Some(dispatch) = self.manager().start_attempt(task) {
            info!(
                task = %task,
                run_id = self.id,
                attempt = dispatch.attempt,
                "retry delay elapsed; dispatching task again"
            );
            step.dispatched.push(dispatch);
        }

        step.run_just_finished = self.maybe_finish();
        step
    }

    /// Snapshot of the run for reporting.
    pub fn report(&self) -> RunReport {
        let tasks: BTreeMap<TaskId, TaskSummary> = self
            .tasks
            .iter()
            .map(|(id, r)| {
                (
                    id.clone(),
                    TaskSummary {
                        state: r.state,
                        attempts: r.attempt_count,
                        last_error: r.last_error.clone(),
                    },
                )
            })
            .collect();

        let failures = self
            .graph
            .topological_order()
            .iter()
            .filter_map(|id| {
                let r = self.tasks.get(id)?;
                (r.state == TaskState::Failed).then(|| TaskFailure {
                    task: id.clone(),
                    attempts: r.attempt_count,
                    reason: r.last_error.clone().unwrap_or_default(),
                })
            })
            .collect();

        RunReport {
            run_id: self.id,
            logical_time: self.logical_time,
            status: self.status,
            tasks,
            failures,
        }
    }

    fn on_success(&mut self, task: &str) -> RunStep {
        if let Some(record) = self.tasks.get_mut(task) {
            record.state = TaskState::Success;
            debug!(task = %task, run_id = self.id, attempts = record.attempt_count, "task succeeded");
        }

        let candidates = self
            .graph
            .ready_successors(task, |id| self.tasks.get(id).map(|r| r.state));
        let dispatched = self.manager().release_ready(candidates);

        RunStep {
            dispatched,
            ..RunStep::default()
        }
    }

    fn on_failure(&mut self, task: &str, err: OperatorError) -> RunStep {
        let mut step = RunStep::default();

        let Some(record) = self.tasks.get_mut(task) else {
            return step;
        };
        record.last_error = Some(err.reason.clone());
        let attempts = record.attempt_count;

        let retry = self
            .graph
            .task(task)
            .map(|t| t.retry_policy())
            .filter(|policy| policy.allows_retry_after(attempts));

        match retry {
            Some(policy) if !self.tearing_down => {
                record.state = TaskState::Retrying;
                warn!(
                    task = %task,
                    run_id = self.id,
                    attempt = attempts,
                    retry_limit = policy.retry_limit,
                    delay = ?policy.retry_delay,
                    error = %err,
                    "task attempt failed; scheduling retry"
                );
                step.retries.push(ScheduledRetry {
                    task: task.to_string(),
                    next_attempt: attempts + 1,
                    delay: policy.retry_delay,
                });
            }
            _ => {
                warn!(
                    task = %task,
                    run_id = self.id,
                    attempt = attempts,
                    error = %err,
                    "task failed permanently; skipping its dependents"
                );
                self.fail_permanently(task, &mut step);
            }
        }

        step
    }

    fn fail_permanently(&mut self, task: &str, step: &mut RunStep) {
        self.settle_failed(task, step);
        if self.tearing_down {
            return;
        }
        self.tearing_down = true;

        // No retry will be granted from now on; settle the ones still waiting.
        let waiting: Vec<TaskId> = self
            .graph
            .topological_order()
            .iter()
            .filter(|id| self.state_of(id) == Some(TaskState::Retrying))
            .cloned()
            .collect();
        for id in waiting {
            info!(task = %id, run_id = self.id, "run is failing; abandoning pending retry");
            self.settle_failed(&id, step);
        }
    }

    fn settle_failed(&mut self, task: &str, step: &mut RunStep) {
        if let Some(record) = self.tasks.get_mut(task) {
            record.state = TaskState::Failed;
        }
        step.newly_failed.push(task.to_string());

        let mut skipped = self.manager().mark_dependents_upstream_failed(task);
        step.newly_upstream_failed.append(&mut skipped);
    }

    /// Determine whether all tasks are terminal and settle the run status.
    ///
    /// Returns `true` if this call made the run terminal.
    fn maybe_finish(&mut self) -> bool {
        if self.status != RunStatus::Running || !self.manager().all_tasks_terminal() {
            return false;
        }

        let all_success = self.tasks.values().all(|r| r.state == TaskState::Success);
        self.status = if all_success {
            RunStatus::Success
        } else {
            RunStatus::Failed
        };

        info!(
            run_id = self.id,
            logical_time = %self.logical_time,
            status = %self.status,
            "run finished"
        );
        true
    }

    fn manager(&mut self) -> StateManager<'_> {
        StateManager::new(&self.graph, &mut self.tasks, self.id, self.logical_time)
    }
}
