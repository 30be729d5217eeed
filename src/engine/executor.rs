// src/engine/executor.rs

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::dag::{Dispatch, Run, RunReport, RunStep, ScheduledRetry};
use crate::errors::OperatorError;
use crate::operator::OperatorContext;

use super::RunEvent;

/// Executes one [`Run`] to completion.
///
/// The run itself decides what happens next; this shell only performs the
/// IO it asks for: every dispatched attempt is invoked on its own Tokio task
/// and every scheduled retry sleeps on its own timer. Outcomes come back
/// through an mpsc channel and are fed into the run one at a time.
///
/// Retry timers still pending when the run becomes terminal are aborted.
#[derive(Debug)]
pub struct RunExecutor {
    run: Run,
    event_tx: mpsc::UnboundedSender<RunEvent>,
    event_rx: mpsc::UnboundedReceiver<RunEvent>,
    retry_timers: JoinSet<()>,
}

impl RunExecutor {
    pub fn new(run: Run) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        Self {
            run,
            event_tx,
            event_rx,
            retry_timers: JoinSet::new(),
        }
    }

    /// Drive the run until every task is terminal and return its report.
    pub async fn execute(self) -> RunReport {
        let span = info_span!(
            "run",
            run_id = self.run.id(),
            logical_time = %self.run.logical_time()
        );
        self.event_loop().instrument(span).await
    }

    async fn event_loop(mut self) -> RunReport {
        let step = self.run.start();
        self.apply(step);

        while !self.run.is_terminal() {
            // We hold a sender ourselves, so the channel never closes here.
            let Some(event) = self.event_rx.recv().await else {
                error!("run event channel closed before the run finished");
                break;
            };
            debug!(?event, "run received event");

            let step = match event {
                RunEvent::AttemptFinished {
                    task,
                    attempt,
                    outcome,
                } => {
                    match &outcome {
                        Ok(()) => info!(task = %task, attempt, "task attempt succeeded"),
                        Err(e) => warn!(task = %task, attempt, error = %e, "task attempt failed"),
                    }
                    self.run.handle_completion(&task, outcome)
                }
                RunEvent::RetryDue { task } => self.run.handle_retry_due(&task),
            };
            self.apply(step);
        }

        self.retry_timers.abort_all();
        self.run.report()
    }

    fn apply(&mut self, step: RunStep) {
        for task in &step.newly_failed {
            error!(task = %task, "task failed permanently");
        }
        for task in &step.newly_upstream_failed {
            info!(task = %task, "task skipped: upstream failed");
        }
        for retry in step.retries {
            self.schedule_retry(retry);
        }
        for dispatch in step.dispatched {
            self.dispatch(dispatch);
        }
    }

    fn dispatch(&self, dispatch: Dispatch) {
        let tx = self.event_tx.clone();

        let Some(task) = self.run.graph().task(&dispatch.task) else {
            // Unreachable for runs built from a validated graph; report it as
            // a failed attempt so the run still terminates.
            let _ = tx.send(RunEvent::AttemptFinished {
                task: dispatch.task.clone(),
                attempt: dispatch.attempt,
                outcome: Err(OperatorError::new("task is not part of the graph")),
            });
            return;
        };

        let operator = Arc::clone(task.operator());
        let ctx = OperatorContext {
            run_id: dispatch.run_id,
            task_id: dispatch.task,
            logical_time: dispatch.logical_time,
            attempt: dispatch.attempt,
        };
        debug!(task = %ctx.task_id, attempt = ctx.attempt, kind = operator.kind(), "dispatching task");

        tokio::spawn(
            async move {
                let task = ctx.task_id.clone();
                let attempt = ctx.attempt;

                // Run the operator on its own task so a panic surfaces as a
                // JoinError instead of tearing down the executor.
                let handle = tokio::spawn(async move { operator.execute(&ctx).await });
                let outcome = match handle.await {
                    Ok(result) => result,
                    Err(e) => Err(OperatorError::new(format!("operator panicked: {e}"))),
                };

                let _ = tx.send(RunEvent::AttemptFinished {
                    task,
                    attempt,
                    outcome,
                });
            }
            .in_current_span(),
        );
    }

    fn schedule_retry(&mut self, retry: ScheduledRetry) {
        info!(
            task = %retry.task,
            next_attempt = retry.next_attempt,
            delay = ?retry.delay,
            "scheduling retry"
        );
        // Reap timers that already fired.
        while self.retry_timers.try_join_next().is_some() {}

        let tx = self.event_tx.clone();
        self.retry_timers.spawn(
            async move {
                tokio::time::sleep(retry.delay).await;
                let _ = tx.send(RunEvent::RetryDue { task: retry.task });
            }
            .in_current_span(),
        );
    }
}
