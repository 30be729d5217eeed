use std::collections::HashMap;
use std::sync::Mutex;

use pipedag::errors::OperatorError;
use pipedag::operator::{Warehouse, WarehouseFuture};

/// In-memory stand-in for a SQL warehouse.
///
/// Only row counts are modelled: `CREATE TABLE` registers a table, every
/// `INSERT INTO` or `COPY` adds one row, `TRUNCATE TABLE` empties it and
/// `SELECT COUNT(*) FROM t` reads the count. Counting a table that was never
/// created fails like a missing relation would.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    statements: Mutex<Vec<String>>,
    counts: Mutex<HashMap<String, u64>>,
    fail_on: Mutex<Vec<String>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate `table` with `rows` rows.
    pub fn with_rows(self, table: &str, rows: u64) -> Self {
        self.counts.lock().unwrap().insert(table.to_string(), rows);
        self
    }

    /// Fail every statement containing `needle`.
    pub fn fail_when(self, needle: &str) -> Self {
        self.fail_on.lock().unwrap().push(needle.to_string());
        self
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    pub fn count(&self, table: &str) -> Option<u64> {
        self.counts.lock().unwrap().get(table).copied()
    }

    fn record(&self, sql: &str) -> Result<(), OperatorError> {
        self.statements.lock().unwrap().push(sql.to_string());
        let fail_on = self.fail_on.lock().unwrap();
        match fail_on.iter().find(|needle| sql.contains(needle.as_str())) {
            Some(needle) => Err(OperatorError::new(format!(
                "injected failure for statement containing '{needle}'"
            ))),
            None => Ok(()),
        }
    }

    fn apply(&self, statement: &str) {
        let words: Vec<&str> = statement.split_whitespace().collect();
        let upper: Vec<String> = words.iter().map(|w| w.to_uppercase()).collect();
        let upper: Vec<&str> = upper.iter().map(String::as_str).collect();
        let table = |i: usize| words.get(i).map(|w| w.trim_end_matches(['(', ';']).to_string());

        let mut counts = self.counts.lock().unwrap();
        match upper.as_slice() {
            ["CREATE", "TABLE", "IF", "NOT", "EXISTS", ..] => {
                if let Some(t) = table(5) {
                    counts.entry(t).or_insert(0);
                }
            }
            ["CREATE", "TABLE", ..] => {
                if let Some(t) = table(2) {
                    counts.entry(t).or_insert(0);
                }
            }
            ["INSERT", "INTO", ..] => {
                if let Some(t) = table(2) {
                    *counts.entry(t).or_insert(0) += 1;
                }
            }
            ["COPY", ..] => {
                if let Some(t) = table(1) {
                    *counts.entry(t).or_insert(0) += 1;
                }
            }
            ["TRUNCATE", "TABLE", ..] => {
                if let Some(t) = table(2) {
                    counts.insert(t, 0);
                }
            }
            _ => {}
        }
    }
}

impl Warehouse for MemoryWarehouse {
    fn execute<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, ()> {
        Box::pin(async move {
            self.record(sql)?;
            for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                self.apply(statement);
            }
            Ok(())
        })
    }

    fn query_count<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, u64> {
        Box::pin(async move {
            self.record(sql)?;
            let table = sql
                .trim()
                .trim_end_matches(';')
                .rsplit_once(" FROM ")
                .map(|(_, t)| t.trim().to_string())
                .ok_or_else(|| OperatorError::new(format!("unsupported query: {sql}")))?;

            self.count(&table).ok_or_else(|| {
                OperatorError::new(format!("relation \"{table}\" does not exist"))
            })
        })
    }
}
