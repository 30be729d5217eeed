// src/errors.rs

//! Crate-wide error types and aliases.

use std::fmt;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::schedule::CronParseError;

#[derive(Error, Debug)]
pub enum PipedagError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("Invalid task graph: {0}")]
    Graph(#[from] GraphError),

    #[error("Invalid schedule: {0}")]
    Schedule(#[from] CronParseError),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    RunFailed(#[from] RunFailure),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Raised when the edge set handed to the graph builder contains a cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cycle detected in task graph involving task '{task}'")]
pub struct CycleError {
    pub task: String,
}

/// Errors from [`crate::dag::GraphBuilder::build`]. No graph escapes when
/// any of these is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error(transparent)]
    Cycle(#[from] CycleError),

    #[error("task '{0}' is defined more than once")]
    DuplicateTask(String),

    #[error("edge {from} -> {to} references unknown task '{missing}'")]
    UnknownTask {
        from: String,
        to: String,
        missing: String,
    },

    #[error("graph contains no tasks")]
    Empty,

    #[error("graph must have exactly one entry task, found {0:?}")]
    Entry(Vec<String>),

    #[error("graph must have exactly one exit task, found {0:?}")]
    Exit(Vec<String>),
}

/// A single failed operator attempt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{reason}")]
pub struct OperatorError {
    pub reason: String,
}

impl OperatorError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// A task that ended permanently `Failed` in a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub task: String,
    pub attempts: u32,
    pub reason: String,
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (after {} attempt(s)): {}",
            self.task, self.attempts, self.reason
        )
    }
}

/// Terminal failure of a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("run {run_id} for {logical_time} failed: {}", format_failures(.failures))]
pub struct RunFailure {
    pub run_id: u64,
    pub logical_time: DateTime<Utc>,
    pub failures: Vec<TaskFailure>,
}

fn format_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, PipedagError>;
