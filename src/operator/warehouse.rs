// src/operator/warehouse.rs

//! The SQL endpoint operators talk to.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::OperatorError;

/// Future returned by [`Warehouse`] methods.
pub type WarehouseFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, OperatorError>> + Send + 'a>>;

/// A warehouse connection, identified by a `connection_id` in the config.
///
/// Production uses [`ShellWarehouse`]; tests inject in-memory
/// implementations through [`Collaborators`](super::Collaborators).
pub trait Warehouse: Send + Sync {
    /// Run a statement whose result is not needed.
    fn execute<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, ()>;

    /// Run a query returning a single non-negative integer (e.g. `COUNT(*)`).
    fn query_count<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, u64>;
}

/// Warehouse reached through a shell command that reads SQL on stdin, for
/// example `psql "$REDSHIFT_URL" -v ON_ERROR_STOP=1 -At`.
#[derive(Debug, Clone)]
pub struct ShellWarehouse {
    connection_id: String,
    command: String,
}

impl ShellWarehouse {
    pub fn new(connection_id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            command: command.into(),
        }
    }

    /// Pipe `sql` into the connection command and return its stdout.
    async fn run_sql(&self, sql: &str) -> Result<String, OperatorError> {
        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.command);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.command);
            c
        };

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            OperatorError::new(format!(
                "connection '{}': spawning `{}` failed: {e}",
                self.connection_id, self.command
            ))
        })?;

        // Feed stdin from its own task so a chatty command cannot block on a
        // full stdout pipe while we are still writing.
        if let Some(mut stdin) = child.stdin.take() {
            let input = format!("{sql}\n");
            let connection_id = self.connection_id.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    warn!(connection = %connection_id, error = %e, "failed writing SQL to connection stdin");
                }
            });
        }

        let output = child.wait_with_output().await.map_err(|e| {
            OperatorError::new(format!(
                "connection '{}': waiting for `{}` failed: {e}",
                self.connection_id, self.command
            ))
        })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines() {
            debug!(connection = %self.connection_id, "stderr: {}", line);
        }

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let detail = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no error output");
            return Err(OperatorError::new(format!(
                "connection '{}': command exited with code {code}: {detail}",
                self.connection_id
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Warehouse for ShellWarehouse {
    fn execute<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, ()> {
        Box::pin(async move {
            self.run_sql(sql).await?;
            Ok(())
        })
    }

    fn query_count<'a>(&'a self, sql: &'a str) -> WarehouseFuture<'a, u64> {
        Box::pin(async move {
            let stdout = self.run_sql(sql).await?;
            parse_count(&stdout).ok_or_else(|| {
                OperatorError::new(format!(
                    "connection '{}': expected a row count, got {:?}",
                    self.connection_id,
                    stdout.trim()
                ))
            })
        })
    }
}

/// First non-empty line of `stdout`, parsed as an integer.
fn parse_count(stdout: &str) -> Option<u64> {
    stdout
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?
        .parse()
        .ok()
}
