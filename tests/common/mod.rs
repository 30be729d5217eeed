#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use pipedag::dag::{Graph, Run, RunReport};
use pipedag::engine::RunExecutor;

pub use pipedag_test_utils::*;

/// `2018-11-<day>T<hour>:00:00Z`.
pub fn nov(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 11, day, hour, 0, 0).unwrap()
}

/// Execute a single run of `graph` and return its report.
pub async fn execute_run(graph: &Arc<Graph>, run_id: u64, logical_time: DateTime<Utc>) -> RunReport {
    RunExecutor::new(Run::new(run_id, logical_time, Arc::clone(graph)))
        .execute()
        .await
}

pub fn project_file(relative: &str) -> std::path::PathBuf {
    std::path::PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(relative)
}
