// src/config/model.rs

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::duration::DurationSpec;
use crate::dag::task::{DEFAULT_RETRY_DELAY, DEFAULT_RETRY_LIMIT};
use crate::schedule::CronExpr;
use crate::types::FileFormat;

pub const DEFAULT_ENTRY_TASK: &str = "Begin_execution";
pub const DEFAULT_EXIT_TASK: &str = "Stop_execution";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [pipeline]
/// name = "sparkify_dag"
/// start = "2018-05-01T00:00:00Z"
/// end = "2018-11-30T00:00:00Z"
/// schedule = "0 * * * *"
/// max_active_runs = 3
///
/// [connections.redshift]
/// command = "psql \"$REDSHIFT_URL\" -v ON_ERROR_STOP=1 -At"
///
/// [task.Create_tables.operator]
/// kind = "create_tables"
/// connection_id = "redshift"
/// sql_text = "CREATE TABLE IF NOT EXISTS ..."
/// ```
///
/// Timestamps are RFC 3339 strings and must be quoted.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    pub pipeline: PipelineSection,

    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,

    #[serde(default)]
    pub credentials: BTreeMap<String, CredentialsConfig>,

    /// All tasks from `[task.<id>]`, keyed by task id.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A configuration that passed validation. Obtain one through
/// `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub pipeline: PipelineSection,
    pub connections: BTreeMap<String, ConnectionConfig>,
    pub credentials: BTreeMap<String, CredentialsConfig>,
    pub task: BTreeMap<String, TaskConfig>,
    /// `pipeline.schedule`, parsed.
    pub schedule: CronExpr,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile, schedule: CronExpr) -> Self {
        Self {
            pipeline: raw.pipeline,
            connections: raw.connections,
            credentials: raw.credentials,
            task: raw.task,
            schedule,
        }
    }
}

/// `[pipeline]` section: identity, recurrence and run-wide defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineSection {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub owner: Option<String>,

    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,

    /// Cron expression or preset such as `@hourly`.
    pub schedule: String,

    /// Materialize every missed boundary instead of only the latest.
    #[serde(default)]
    pub catchup: bool,

    #[serde(default = "default_max_active_runs")]
    pub max_active_runs: usize,

    /// Default retry limit for tasks that do not set their own.
    #[serde(default = "default_retries")]
    pub retries: u32,

    #[serde(default = "default_retry_delay")]
    pub retry_delay: DurationSpec,

    #[serde(default = "default_entry")]
    pub entry: String,

    #[serde(default = "default_exit")]
    pub exit: String,
}

fn default_max_active_runs() -> usize {
    1
}

fn default_retries() -> u32 {
    DEFAULT_RETRY_LIMIT
}

fn default_retry_delay() -> DurationSpec {
    DurationSpec(DEFAULT_RETRY_DELAY)
}

fn default_entry() -> String {
    DEFAULT_ENTRY_TASK.to_string()
}

fn default_exit() -> String {
    DEFAULT_EXIT_TASK.to_string()
}

/// `[connections.<id>]`: how to reach a warehouse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Shell command that reads SQL on stdin.
    pub command: String,
}

/// `[credentials.<id>]`: names of the environment variables holding an
/// object-store key pair. The values are read when a task executes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    pub access_key_env: String,
    pub secret_key_env: String,
}

/// `[task.<id>]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// This task waits for all tasks listed here.
    #[serde(default)]
    pub after: Vec<String>,

    /// Overrides `pipeline.retries`.
    #[serde(default)]
    pub retries: Option<u32>,

    /// Overrides `pipeline.retry_delay`.
    #[serde(default)]
    pub retry_delay: Option<DurationSpec>,

    pub operator: OperatorConfig,
}

/// `[task.<id>.operator]`: which operator runs the task, selected by `kind`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperatorConfig {
    Noop(NoopConfig),
    CreateTables(CreateTablesConfig),
    StageToWarehouse(StageConfig),
    LoadFact(LoadFactConfig),
    LoadDimension(LoadDimensionConfig),
    DataQuality(DataQualityConfig),
}

impl OperatorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            OperatorConfig::Noop(_) => "noop",
            OperatorConfig::CreateTables(_) => "create_tables",
            OperatorConfig::StageToWarehouse(_) => "stage_to_warehouse",
            OperatorConfig::LoadFact(_) => "load_fact",
            OperatorConfig::LoadDimension(_) => "load_dimension",
            OperatorConfig::DataQuality(_) => "data_quality",
        }
    }

    pub fn connection_id(&self) -> Option<&str> {
        match self {
            OperatorConfig::Noop(_) => None,
            OperatorConfig::CreateTables(c) => Some(&c.connection_id),
            OperatorConfig::StageToWarehouse(c) => Some(&c.connection_id),
            OperatorConfig::LoadFact(c) => Some(&c.connection_id),
            OperatorConfig::LoadDimension(c) => Some(&c.connection_id),
            OperatorConfig::DataQuality(c) => Some(&c.connection_id),
        }
    }

    pub fn credentials_id(&self) -> Option<&str> {
        match self {
            OperatorConfig::StageToWarehouse(c) => c.credentials_id.as_deref(),
            _ => None,
        }
    }

    /// Table this operator writes into, if any.
    pub fn target_table(&self) -> Option<&str> {
        match self {
            OperatorConfig::StageToWarehouse(c) => Some(&c.table),
            OperatorConfig::LoadFact(c) => Some(&c.table),
            OperatorConfig::LoadDimension(c) => Some(&c.table),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoopConfig {}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateTablesConfig {
    pub connection_id: String,
    pub sql_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageConfig {
    pub table: String,
    pub connection_id: String,
    #[serde(default)]
    pub credentials_id: Option<String>,
    pub source_bucket: String,
    /// May contain `{ds}`, `{year}`, `{month}`, `{day}`, `{hour}`.
    pub source_key: String,
    pub region: String,
    #[serde(default)]
    pub file_format: FileFormat,
    #[serde(default)]
    pub json_paths: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadFactConfig {
    pub table: String,
    pub connection_id: String,
    pub sql_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoadDimensionConfig {
    pub table: String,
    pub connection_id: String,
    pub sql_text: String,
    /// Empty the table before inserting.
    #[serde(default)]
    pub truncate: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataQualityConfig {
    pub connection_id: String,
    pub tables: Vec<String>,
    #[serde(default = "default_min_rows")]
    pub min_rows: u64,
}

fn default_min_rows() -> u64 {
    1
}
