// src/operator/mod.rs

//! Task operators: the collaborators that perform a task's actual work.
//!
//! The engine only knows the [`Operator`] trait. Concrete operators talk to a
//! [`Warehouse`] resolved from the task's `connection_id`; connection and
//! credential handling lives entirely on this side of the boundary.
//!
//! - [`noop`]: sentinel begin/end markers.
//! - [`create_tables`], [`stage`], [`load`], [`quality`]: the pipeline steps.
//! - [`warehouse`]: the SQL endpoint abstraction and its shell-backed
//!   implementation.
//! - [`factory`]: builds operators from the enumerated configuration.

pub mod create_tables;
pub mod factory;
pub mod load;
pub mod noop;
pub mod quality;
pub mod stage;
pub mod warehouse;

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};

use crate::dag::TaskId;
use crate::errors::OperatorError;

pub use create_tables::CreateTablesOperator;
pub use factory::{Collaborators, build_operator};
pub use load::{LoadDimensionOperator, LoadFactOperator};
pub use noop::NoopOperator;
pub use quality::DataQualityOperator;
pub use stage::StageToWarehouseOperator;
pub use warehouse::{ShellWarehouse, Warehouse, WarehouseFuture};

/// Future returned by [`Operator::execute`].
pub type OperatorFuture<'a> = Pin<Box<dyn Future<Output = Result<(), OperatorError>> + Send + 'a>>;

/// Per-attempt information handed to an operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorContext {
    pub run_id: u64,
    pub task_id: TaskId,
    /// The schedule boundary the run represents.
    pub logical_time: DateTime<Utc>,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// Execution contract of a task.
///
/// Implementations carry their static parameters; the context carries what
/// varies per attempt.
pub trait Operator: Send + Sync {
    /// Short name of the operator variant, used in logs and dry runs.
    fn kind(&self) -> &'static str;

    fn execute<'a>(&'a self, ctx: &'a OperatorContext) -> OperatorFuture<'a>;
}

/// Quote a value for use inside a single-quoted SQL literal.
pub(crate) fn sql_literal(value: &str) -> String {
    value.replace('\'', "''")
}
