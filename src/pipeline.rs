// src/pipeline.rs

//! Assembly of a validated configuration into an executable pipeline.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::ConfigFile;
use crate::dag::{Graph, GraphBuilder, RetryPolicy, Task};
use crate::errors::Result;
use crate::operator::{Collaborators, NoopOperator, build_operator};
use crate::schedule::ScheduleWindow;

/// Everything the scheduler needs: the shared graph, the recurrence and the
/// concurrency limit.
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub name: String,
    pub description: Option<String>,
    pub owner: Option<String>,
    pub graph: Arc<Graph>,
    pub window: ScheduleWindow,
    pub max_active_runs: usize,
}

impl Pipeline {
    /// Build operators, wrap them in tasks and wire the graph.
    ///
    /// The entry marker is placed upstream of every task without `after`; the
    /// exit marker downstream of every task nothing depends on.
    pub fn from_config(cfg: &ConfigFile, collaborators: &Collaborators) -> Result<Self> {
        let p = &cfg.pipeline;
        let default_retry = RetryPolicy::new(p.retries, p.retry_delay.as_duration());

        let mut builder = GraphBuilder::new()
            .task(Task::new(p.entry.clone(), Arc::new(NoopOperator)).with_retry(default_retry))
            .task(Task::new(p.exit.clone(), Arc::new(NoopOperator)).with_retry(default_retry))
            .entry(p.entry.clone())
            .exit(p.exit.clone());

        let mut has_dependents: BTreeSet<&str> = BTreeSet::new();
        for task_cfg in cfg.task.values() {
            has_dependents.extend(task_cfg.after.iter().map(String::as_str));
        }

        for (id, task_cfg) in &cfg.task {
            let operator = build_operator(id, &task_cfg.operator, collaborators)?;
            let retry = RetryPolicy::new(
                task_cfg.retries.unwrap_or(p.retries),
                task_cfg
                    .retry_delay
                    .map(|d| d.as_duration())
                    .unwrap_or(default_retry.retry_delay),
            );
            debug!(task = %id, kind = operator.kind(), ?retry, "adding task");

            builder = builder.task(Task::new(id.clone(), operator).with_retry(retry));

            if task_cfg.after.is_empty() {
                builder = builder.edge(p.entry.clone(), id.clone());
            } else {
                builder = builder.after(id, task_cfg.after.iter().cloned());
            }
            if !has_dependents.contains(id.as_str()) {
                builder = builder.edge(id.clone(), p.exit.clone());
            }
        }

        let graph = builder.build()?;
        let window = ScheduleWindow::new(p.start, p.end, cfg.schedule.clone(), p.catchup);

        Ok(Self {
            name: p.name.clone(),
            description: p.description.clone(),
            owner: p.owner.clone(),
            graph: Arc::new(graph),
            window,
            max_active_runs: p.max_active_runs,
        })
    }
}
