#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use pipedag::config::{
    ConfigFile, ConnectionConfig, CredentialsConfig, DurationSpec, NoopConfig, OperatorConfig,
    PipelineSection, RawConfigFile, TaskConfig,
};
use pipedag::dag::{Graph, GraphBuilder, RetryPolicy, Task};
use pipedag::operator::Operator;

/// Builder for `ConfigFile` to simplify test setup.
///
/// Defaults: an hourly schedule over November 2018, no catchup, one active
/// run, no retries.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: RawConfigFile {
                pipeline: PipelineSection {
                    name: name.to_string(),
                    description: None,
                    owner: None,
                    start: Utc.with_ymd_and_hms(2018, 11, 1, 0, 0, 0).unwrap(),
                    end: Utc.with_ymd_and_hms(2018, 11, 30, 0, 0, 0).unwrap(),
                    schedule: "@hourly".to_string(),
                    catchup: false,
                    max_active_runs: 1,
                    retries: 0,
                    retry_delay: DurationSpec(Duration::ZERO),
                    entry: "Begin_execution".to_string(),
                    exit: "Stop_execution".to_string(),
                },
                connections: BTreeMap::new(),
                credentials: BTreeMap::new(),
                task: BTreeMap::new(),
            },
        }
    }

    pub fn window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.config.pipeline.start = start;
        self.config.pipeline.end = end;
        self
    }

    pub fn schedule(mut self, schedule: &str) -> Self {
        self.config.pipeline.schedule = schedule.to_string();
        self
    }

    pub fn catchup(mut self, catchup: bool) -> Self {
        self.config.pipeline.catchup = catchup;
        self
    }

    pub fn max_active_runs(mut self, n: usize) -> Self {
        self.config.pipeline.max_active_runs = n;
        self
    }

    pub fn retries(mut self, n: u32, delay: Duration) -> Self {
        self.config.pipeline.retries = n;
        self.config.pipeline.retry_delay = DurationSpec(delay);
        self
    }

    pub fn connection(mut self, id: &str, command: &str) -> Self {
        self.config.connections.insert(
            id.to_string(),
            ConnectionConfig {
                command: command.to_string(),
            },
        );
        self
    }

    pub fn credentials(mut self, id: &str, access_key_env: &str, secret_key_env: &str) -> Self {
        self.config.credentials.insert(
            id.to_string(),
            CredentialsConfig {
                access_key_env: access_key_env.to_string(),
                secret_key_env: secret_key_env.to_string(),
            },
        );
        self
    }

    pub fn with_task(mut self, id: &str, task: TaskConfig) -> Self {
        self.config.task.insert(id.to_string(), task);
        self
    }

    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(operator: OperatorConfig) -> Self {
        Self {
            task: TaskConfig {
                after: vec![],
                retries: None,
                retry_delay: None,
                operator,
            },
        }
    }

    pub fn noop() -> Self {
        Self::new(OperatorConfig::Noop(NoopConfig {}))
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn retries(mut self, n: u32) -> Self {
        self.task.retries = Some(n);
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.task.retry_delay = Some(DurationSpec(delay));
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}

/// Edges of the Sparkify pipeline, upstream first.
pub fn sparkify_edges() -> Vec<(&'static str, &'static str)> {
    vec![
        ("Begin_execution", "Create_tables"),
        ("Create_tables", "Stage_events"),
        ("Create_tables", "Stage_songs"),
        ("Stage_events", "Load_songplays_fact_table"),
        ("Stage_songs", "Load_songplays_fact_table"),
        ("Load_songplays_fact_table", "Load_user_dim_table"),
        ("Load_songplays_fact_table", "Load_song_dim_table"),
        ("Load_songplays_fact_table", "Load_artist_dim_table"),
        ("Load_songplays_fact_table", "Load_time_dim_table"),
        ("Load_user_dim_table", "Run_data_quality_checks"),
        ("Load_song_dim_table", "Run_data_quality_checks"),
        ("Load_artist_dim_table", "Run_data_quality_checks"),
        ("Load_time_dim_table", "Run_data_quality_checks"),
        ("Run_data_quality_checks", "Stop_execution"),
    ]
}

/// The Sparkify graph with operators chosen per task id by `operator_for`.
pub fn sparkify_graph<F>(mut operator_for: F, retry: RetryPolicy) -> Arc<Graph>
where
    F: FnMut(&str) -> Arc<dyn Operator>,
{
    let edges = sparkify_edges();
    let mut ids: Vec<&str> = Vec::new();
    for (from, to) in &edges {
        for id in [*from, *to] {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    let mut builder = GraphBuilder::new()
        .entry("Begin_execution")
        .exit("Stop_execution");
    for id in ids {
        builder = builder.task(Task::new(id, operator_for(id)).with_retry(retry));
    }
    for (from, to) in edges {
        builder = builder.edge(from, to);
    }

    Arc::new(builder.build().expect("sparkify graph is valid"))
}
