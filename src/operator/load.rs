// src/operator/load.rs

use std::sync::Arc;

use tracing::info;

use super::{Operator, OperatorContext, OperatorFuture, Warehouse};

fn insert_statement(table: &str, select: &str) -> String {
    format!("INSERT INTO {table} {}", select.trim())
}

/// Appends the result of `sql_text` to a fact table.
pub struct LoadFactOperator {
    warehouse: Arc<dyn Warehouse>,
    table: String,
    sql_text: String,
}

impl LoadFactOperator {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        table: impl Into<String>,
        sql_text: impl Into<String>,
    ) -> Self {
        Self {
            warehouse,
            table: table.into(),
            sql_text: sql_text.into(),
        }
    }
}

impl Operator for LoadFactOperator {
    fn kind(&self) -> &'static str {
        "load_fact"
    }

    fn execute<'a>(&'a self, ctx: &'a OperatorContext) -> OperatorFuture<'a> {
        Box::pin(async move {
            info!(task = %ctx.task_id, run_id = ctx.run_id, table = %self.table, "loading fact table");
            self.warehouse
                .execute(&insert_statement(&self.table, &self.sql_text))
                .await
        })
    }
}

/// Loads one dimension table, optionally emptying it first.
pub struct LoadDimensionOperator {
    warehouse: Arc<dyn Warehouse>,
    table: String,
    sql_text: String,
    truncate: bool,
}

impl LoadDimensionOperator {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        table: impl Into<String>,
        sql_text: impl Into<String>,
        truncate: bool,
    ) -> Self {
        Self {
            warehouse,
            table: table.into(),
            sql_text: sql_text.into(),
            truncate,
        }
    }
}

impl Operator for LoadDimensionOperator {
    fn kind(&self) -> &'static str {
        "load_dimension"
    }

    fn execute<'a>(&'a self, ctx: &'a OperatorContext) -> OperatorFuture<'a> {
        Box::pin(async move {
            info!(
                task = %ctx.task_id,
                run_id = ctx.run_id,
                table = %self.table,
                truncate = self.truncate,
                "loading dimension table"
            );
            if self.truncate {
                self.warehouse
                    .execute(&format!("TRUNCATE TABLE {}", self.table))
                    .await?;
            }
            self.warehouse
                .execute(&insert_statement(&self.table, &self.sql_text))
                .await
        })
    }
}
