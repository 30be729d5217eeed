// src/dag/mod.rs

//! Task graph model and per-run state machine.
//!
//! - [`task`] defines tasks and their retry policy.
//! - [`graph`] holds the immutable, validated directed acyclic graph.
//! - [`run`] is the pure per-run state machine that decides which tasks are
//!   ready, retried, failed or skipped.
//! - [`state_manager`] applies the individual state transitions.
//! - [`run_step`] and [`report`] are the result types handed to callers.

pub mod graph;
pub mod report;
pub mod run;
pub mod run_step;
pub mod state;
pub mod state_manager;
pub mod task;

pub use graph::{Graph, GraphBuilder};
pub use report::{RunReport, TaskSummary};
pub use run::{Run, RunId};
pub use run_step::{Dispatch, RunStep, ScheduledRetry};
pub use state::{RunStatus, TaskRecord, TaskState};
pub use task::{RetryPolicy, Task, TaskId};
