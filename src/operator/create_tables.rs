// src/operator/create_tables.rs

use std::sync::Arc;

use tracing::info;

use super::{Operator, OperatorContext, OperatorFuture, Warehouse};

/// Runs idempotent DDL (`CREATE TABLE IF NOT EXISTS ...`).
pub struct CreateTablesOperator {
    warehouse: Arc<dyn Warehouse>,
    sql_text: String,
}

impl CreateTablesOperator {
    pub fn new(warehouse: Arc<dyn Warehouse>, sql_text: impl Into<String>) -> Self {
        Self {
            warehouse,
            sql_text: sql_text.into(),
        }
    }
}

impl Operator for CreateTablesOperator {
    fn kind(&self) -> &'static str {
        "create_tables"
    }

    fn execute<'a>(&'a self, ctx: &'a OperatorContext) -> OperatorFuture<'a> {
        Box::pin(async move {
            info!(task = %ctx.task_id, run_id = ctx.run_id, "creating tables");
            self.warehouse.execute(&self.sql_text).await
        })
    }
}
