// src/schedule/mod.rs

//! Recurrence handling: which logical timestamps need a run.
//!
//! - [`cron`] parses five-field cron expressions and presets.
//! - [`window`] combines a cron expression with the `[start, end]` window and
//!   the catchup policy.

pub mod cron;
pub mod window;

pub use cron::{CronExpr, CronField, CronParseError};
pub use window::{Boundaries, ScheduleWindow};
