use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use pipedag::errors::OperatorError;
use pipedag::operator::{Operator, OperatorContext, OperatorFuture};

/// One recorded operator invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub task: String,
    pub run_id: u64,
    pub attempt: u32,
    pub logical_time: DateTime<Utc>,
}

/// Shared, ordered log of every operator invocation.
#[derive(Debug, Clone, Default)]
pub struct DispatchLog {
    records: Arc<Mutex<Vec<DispatchRecord>>>,
}

impl DispatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: DispatchRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn records(&self) -> Vec<DispatchRecord> {
        self.records.lock().unwrap().clone()
    }

    /// Task ids in invocation order.
    pub fn tasks(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.task).collect()
    }

    pub fn count_for(&self, task: &str) -> usize {
        self.records().iter().filter(|r| r.task == task).count()
    }

    pub fn was_dispatched(&self, task: &str) -> bool {
        self.count_for(task) > 0
    }

    /// Index of the first invocation of `task`.
    pub fn position(&self, task: &str) -> Option<usize> {
        self.records().iter().position(|r| r.task == task)
    }

    pub fn run_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.records().iter().map(|r| r.run_id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn logical_times(&self) -> Vec<DateTime<Utc>> {
        let mut times: Vec<_> = self.records().iter().map(|r| r.logical_time).collect();
        times.sort_unstable();
        times.dedup();
        times
    }
}

/// Tracks how many distinct runs have an operator in flight at once.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyGauge {
    inner: Arc<Mutex<GaugeState>>,
}

#[derive(Debug, Default)]
struct GaugeState {
    in_flight: HashMap<u64, usize>,
    peak_runs: usize,
}

impl ConcurrencyGauge {
    pub fn new() -> Self {
        Self::default()
    }

    fn enter(&self, run_id: u64) {
        let mut s = self.inner.lock().unwrap();
        *s.in_flight.entry(run_id).or_default() += 1;
        s.peak_runs = s.peak_runs.max(s.in_flight.len());
    }

    fn exit(&self, run_id: u64) {
        let mut s = self.inner.lock().unwrap();
        if let Some(n) = s.in_flight.get_mut(&run_id) {
            *n -= 1;
            if *n == 0 {
                s.in_flight.remove(&run_id);
            }
        }
    }

    pub fn peak_runs(&self) -> usize {
        self.inner.lock().unwrap().peak_runs
    }
}

/// What a [`ScriptedOperator`] does on each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Succeed,
    /// Fail attempts `1..=n` of every run, then succeed.
    FailFirst(u32),
    AlwaysFail,
    Panic,
}

/// Test operator driven by a [`Script`], recording every call.
#[derive(Debug, Clone)]
pub struct ScriptedOperator {
    script: Script,
    log: DispatchLog,
    delay: Duration,
    gauge: Option<ConcurrencyGauge>,
}

impl ScriptedOperator {
    pub fn new(script: Script, log: &DispatchLog) -> Self {
        Self {
            script,
            log: log.clone(),
            delay: Duration::ZERO,
            gauge: None,
        }
    }

    pub fn succeeding(log: &DispatchLog) -> Self {
        Self::new(Script::Succeed, log)
    }

    /// Sleep this long inside every attempt.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_gauge(mut self, gauge: &ConcurrencyGauge) -> Self {
        self.gauge = Some(gauge.clone());
        self
    }

    pub fn shared(self) -> Arc<dyn Operator> {
        Arc::new(self)
    }
}

impl Operator for ScriptedOperator {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn execute<'a>(&'a self, ctx: &'a OperatorContext) -> OperatorFuture<'a> {
        Box::pin(async move {
            self.log.push(DispatchRecord {
                task: ctx.task_id.clone(),
                run_id: ctx.run_id,
                attempt: ctx.attempt,
                logical_time: ctx.logical_time,
            });
            tracing::debug!(task = %ctx.task_id, run_id = ctx.run_id, attempt = ctx.attempt, "scripted attempt");

            if let Some(gauge) = &self.gauge {
                gauge.enter(ctx.run_id);
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if let Some(gauge) = &self.gauge {
                gauge.exit(ctx.run_id);
            }

            match self.script {
                Script::Succeed => Ok(()),
                Script::FailFirst(n) if ctx.attempt <= n => Err(OperatorError::new(format!(
                    "{} scripted failure on attempt {}",
                    ctx.task_id, ctx.attempt
                ))),
                Script::FailFirst(_) => Ok(()),
                Script::AlwaysFail => Err(OperatorError::new(format!(
                    "{} always fails",
                    ctx.task_id
                ))),
                Script::Panic => panic!("{} panicked on purpose", ctx.task_id),
            }
        })
    }
}
