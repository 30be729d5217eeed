// src/operator/quality.rs

use std::sync::Arc;

use tracing::{info, warn};

use super::{Operator, OperatorContext, OperatorFuture, Warehouse};
use crate::errors::OperatorError;

/// Asserts that every listed table holds at least `min_rows` rows.
///
/// All tables are checked; the error lists every violation, not just the
/// first one.
pub struct DataQualityOperator {
    warehouse: Arc<dyn Warehouse>,
    tables: Vec<String>,
    min_rows: u64,
}

impl DataQualityOperator {
    pub fn new(warehouse: Arc<dyn Warehouse>, tables: Vec<String>, min_rows: u64) -> Self {
        Self {
            warehouse,
            tables,
            min_rows,
        }
    }
}

impl Operator for DataQualityOperator {
    fn kind(&self) -> &'static str {
        "data_quality"
    }

    fn execute<'a>(&'a self, ctx: &'a OperatorContext) -> OperatorFuture<'a> {
        Box::pin(async move {
            let mut violations = Vec::new();

            for table in &self.tables {
                let sql = format!("SELECT COUNT(*) FROM {table}");
                match self.warehouse.query_count(&sql).await {
                    Ok(rows) if rows >= self.min_rows => {
                        info!(task = %ctx.task_id, table = %table, rows, "quality check passed");
                    }
                    Ok(rows) => {
                        warn!(task = %ctx.task_id, table = %table, rows, "quality check failed");
                        violations.push(format!(
                            "{table}: {rows} row(s), expected at least {}",
                            self.min_rows
                        ));
                    }
                    Err(e) => {
                        warn!(task = %ctx.task_id, table = %table, error = %e, "quality check query failed");
                        violations.push(format!("{table}: {e}"));
                    }
                }
            }

            if violations.is_empty() {
                Ok(())
            } else {
                Err(OperatorError::new(format!(
                    "data quality check failed: {}",
                    violations.join("; ")
                )))
            }
        })
    }
}
