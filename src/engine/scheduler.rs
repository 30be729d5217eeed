// src/engine/scheduler.rs

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::dag::{Graph, Run, RunId, RunReport};
use crate::errors::{PipedagError, Result};
use crate::pipeline::Pipeline;
use crate::schedule::ScheduleWindow;

use super::executor::RunExecutor;
use super::queue::RunQueue;
use super::SchedulerOptions;

/// Outcome of a scheduler session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerReport {
    /// Reports of every run that finished, ordered by logical time.
    pub runs: Vec<RunReport>,
    /// Highest number of runs that were active at the same time.
    pub peak_active_runs: usize,
}

impl SchedulerReport {
    pub fn is_success(&self) -> bool {
        self.runs.iter().all(RunReport::is_success)
    }

    pub fn failed_runs(&self) -> impl Iterator<Item = &RunReport> {
        self.runs.iter().filter(|r| !r.is_success())
    }

    pub fn logical_times(&self) -> Vec<DateTime<Utc>> {
        self.runs.iter().map(|r| r.logical_time).collect()
    }

    /// `Err(RunFailed)` for the earliest failed run, if any.
    pub fn into_result(self) -> Result<Self> {
        let failure = self.failed_runs().next().map(RunReport::failure);
        match failure {
            Some(failure) => Err(PipedagError::RunFailed(failure)),
            None => Ok(self),
        }
    }
}

/// Materializes runs for due schedule boundaries and executes them under the
/// `max_active_runs` gate.
///
/// Wall-clock time is `now` (passed to [`Scheduler::run`]) plus the Tokio time
/// elapsed since the call, so tests can drive it with a paused clock.
#[derive(Debug)]
pub struct Scheduler {
    graph: Arc<Graph>,
    window: ScheduleWindow,
    options: SchedulerOptions,
    queue: RunQueue,
    next_run_id: RunId,
}

impl Scheduler {
    pub fn new(graph: Arc<Graph>, window: ScheduleWindow, options: SchedulerOptions) -> Self {
        Self {
            graph,
            window,
            queue: RunQueue::new(options.max_active_runs),
            options,
            next_run_id: 1,
        }
    }

    pub fn from_pipeline(pipeline: &Pipeline, exit_when_idle: bool) -> Self {
        Self::new(
            Arc::clone(&pipeline.graph),
            pipeline.window.clone(),
            SchedulerOptions {
                max_active_runs: pipeline.max_active_runs,
                exit_when_idle,
            },
        )
    }

    /// Logical times a session started at `now` materializes immediately.
    pub fn due_runs(&self, now: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        self.window.due(now)
    }

    /// Run the scheduling loop.
    ///
    /// Runs due at `now` are queued first. Unless `exit_when_idle` is set, the
    /// loop then sleeps until each later boundary and queues it, ending once
    /// the window is exhausted and every run finished. When `shutdown`
    /// resolves no further runs are started; active runs are awaited.
    pub async fn run<S>(mut self, now: DateTime<Utc>, shutdown: S) -> Result<SchedulerReport>
    where
        S: Future<Output = ()>,
    {
        let started = Instant::now();
        let clock = |at: Instant| {
            now + TimeDelta::from_std(at.duration_since(started)).unwrap_or(TimeDelta::zero())
        };

        let due = self.due_runs(now);
        info!(
            due = due.len(),
            catchup = self.window.catchup(),
            max_active_runs = self.queue.max_active(),
            "scheduler started"
        );
        for logical_time in due {
            self.queue.enqueue(logical_time);
        }

        // Latest boundary already considered for materialization.
        let mut horizon = now;
        let mut shutting_down = false;
        let mut running: JoinSet<RunReport> = JoinSet::new();
        let mut reports: Vec<RunReport> = Vec::new();

        tokio::pin!(shutdown);

        loop {
            self.start_ready_runs(&mut running);

            let next_tick = if self.options.exit_when_idle || shutting_down {
                None
            } else {
                self.window.next_boundary_after(horizon)
            };

            if running.is_empty() && self.queue.is_idle() && next_tick.is_none() {
                break;
            }

            let sleep_for = next_tick
                .map(|t| (t - clock(Instant::now())).to_std().unwrap_or(Duration::ZERO))
                .unwrap_or(Duration::ZERO);

            tokio::select! {
                joined = running.join_next(), if !running.is_empty() => {
                    match joined {
                        Some(Ok(report)) => {
                            self.queue.finish(report.run_id);
                            info!(
                                run_id = report.run_id,
                                logical_time = %report.logical_time,
                                status = %report.status,
                                "run completed"
                            );
                            reports.push(report);
                        }
                        Some(Err(e)) => {
                            return Err(PipedagError::Other(anyhow::anyhow!(
                                "run executor task failed: {e}"
                            )));
                        }
                        None => {}
                    }
                }
                _ = tokio::time::sleep(sleep_for), if next_tick.is_some() => {
                    if let Some(boundary) = next_tick {
                        debug!(%boundary, "schedule boundary reached");
                        self.queue.enqueue(boundary);
                        horizon = boundary;
                    }
                }
                _ = &mut shutdown, if !shutting_down => {
                    shutting_down = true;
                    let dropped = self.queue.clear_pending();
                    warn!(
                        dropped,
                        active = running.len(),
                        "shutdown requested; waiting for active runs"
                    );
                }
                else => break,
            }
        }

        reports.sort_by_key(|r| r.logical_time);
        let report = SchedulerReport {
            runs: reports,
            peak_active_runs: self.queue.peak_active(),
        };
        info!(
            runs = report.runs.len(),
            failed = report.failed_runs().count(),
            "scheduler finished"
        );
        Ok(report)
    }

    fn start_ready_runs(&mut self, running: &mut JoinSet<RunReport>) {
        while let Some(logical_time) = self.queue.next_startable(self.next_run_id) {
            let run_id = self.next_run_id;
            self.next_run_id += 1;

            debug!(run_id, %logical_time, active = self.queue.active_len(), "materializing run");
            let run = Run::new(run_id, logical_time, Arc::clone(&self.graph));
            running.spawn(RunExecutor::new(run).execute());
        }
    }
}
