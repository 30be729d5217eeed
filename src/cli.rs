// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};

/// Command-line arguments for `pipedag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "pipedag",
    version,
    about = "Run a scheduled ETL task graph with retries and bounded concurrency.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the pipeline file (TOML).
    ///
    /// Default: `Pipedag.toml` in the current working directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Execute the runs due now, then exit instead of waiting for the next
    /// schedule boundary.
    #[arg(long)]
    pub once: bool,

    /// Treat this RFC 3339 timestamp as the current time.
    #[arg(long, value_name = "RFC3339")]
    pub now: Option<DateTime<Utc>>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PIPEDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the graph and due runs, but execute nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_all_flags() {
        let args = CliArgs::try_parse_from([
            "pipedag",
            "--config",
            "pipelines/sparkify.toml",
            "--once",
            "--now",
            "2018-11-01T10:30:00Z",
            "--log-level",
            "debug",
            "--dry-run",
        ])
        .unwrap();

        assert_eq!(args.config, Some(PathBuf::from("pipelines/sparkify.toml")));
        assert!(args.once);
        assert_eq!(
            args.now,
            Some(Utc.with_ymd_and_hms(2018, 11, 1, 10, 30, 0).unwrap())
        );
        assert_eq!(args.log_level, Some(LogLevel::Debug));
        assert!(args.dry_run);
    }

    #[test]
    fn rejects_malformed_now() {
        assert!(CliArgs::try_parse_from(["pipedag", "--now", "yesterday"]).is_err());
    }
}
