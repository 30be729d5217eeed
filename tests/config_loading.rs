// tests/config_loading.rs

mod common;
use crate::common::*;

use std::error::Error;
use std::io::Write;
use std::time::Duration;

use pipedag::config::{
    ConfigFile, CreateTablesConfig, DataQualityConfig, OperatorConfig, StageConfig,
    load_and_validate, load_from_str,
};
use pipedag::errors::PipedagError;
use pipedag::types::FileFormat;

type TestResult = Result<(), Box<dyn Error>>;

const MINIMAL: &str = r#"
[pipeline]
name = "mini"
start = "2018-11-01T00:00:00Z"
end = "2018-11-02T00:00:00Z"
schedule = "@hourly"

[task.only.operator]
kind = "noop"
"#;

fn validate(toml: &str) -> Result<ConfigFile, PipedagError> {
    ConfigFile::try_from(load_from_str(toml)?)
}

fn expect_config_error(toml: &str, needle: &str) {
    match validate(toml) {
        Err(PipedagError::ConfigError(msg)) => {
            assert!(msg.contains(needle), "message {msg:?} should mention {needle:?}")
        }
        other => panic!("expected ConfigError mentioning {needle:?}, got {other:?}"),
    }
}

#[test]
fn sparkify_pipeline_file_loads() -> TestResult {
    init_tracing();
    let cfg = load_and_validate(project_file("pipelines/sparkify.toml"))?;

    assert_eq!(cfg.pipeline.name, "sparkify_dag");
    assert_eq!(cfg.pipeline.owner.as_deref(), Some("vanducng"));
    assert_eq!(cfg.pipeline.max_active_runs, 3);
    assert_eq!(cfg.pipeline.retries, 3);
    assert_eq!(cfg.pipeline.retry_delay.as_duration(), Duration::from_secs(300));
    assert!(!cfg.pipeline.catchup);
    assert_eq!(cfg.schedule.as_str(), "0 * * * *");
    assert_eq!(cfg.task.len(), 9);

    match &cfg.task["Stage_events"].operator {
        OperatorConfig::StageToWarehouse(StageConfig {
            table,
            credentials_id,
            file_format,
            ..
        }) => {
            assert_eq!(table, "staging_events");
            assert_eq!(credentials_id.as_deref(), Some("aws_credentials"));
            assert_eq!(*file_format, FileFormat::Json);
        }
        other => panic!("unexpected operator {other:?}"),
    }

    // The quality-check table list is taken verbatim.
    match &cfg.task["Run_data_quality_checks"].operator {
        OperatorConfig::DataQuality(DataQualityConfig { tables, min_rows, .. }) => {
            assert_eq!(tables, &["songplays", "users", "song", "artirst", "time"]);
            assert_eq!(*min_rows, 1);
        }
        other => panic!("unexpected operator {other:?}"),
    }
    Ok(())
}

#[test]
fn defaults_are_applied() -> TestResult {
    let cfg = validate(MINIMAL)?;

    assert!(!cfg.pipeline.catchup);
    assert_eq!(cfg.pipeline.max_active_runs, 1);
    assert_eq!(cfg.pipeline.retries, 3);
    assert_eq!(cfg.pipeline.retry_delay.as_duration(), Duration::from_secs(300));
    assert_eq!(cfg.pipeline.entry, "Begin_execution");
    assert_eq!(cfg.pipeline.exit, "Stop_execution");
    assert_eq!(cfg.task["only"].retries, None);
    Ok(())
}

#[test]
fn config_file_reads_from_disk() -> TestResult {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(MINIMAL.as_bytes())?;

    let cfg = load_and_validate(file.path())?;
    assert_eq!(cfg.pipeline.name, "mini");

    let missing = load_and_validate(file.path().with_extension("missing"));
    assert!(matches!(missing, Err(PipedagError::IoError(_))));
    Ok(())
}

#[test]
fn unknown_operator_keys_are_rejected() {
    let toml = MINIMAL.replace("kind = \"noop\"", "kind = \"noop\"\nsql_text = \"SELECT 1\"");
    assert!(matches!(load_from_str(&toml), Err(PipedagError::TomlError(_))));

    let toml = MINIMAL.replace("kind = \"noop\"", "kind = \"teleport\"");
    assert!(matches!(load_from_str(&toml), Err(PipedagError::TomlError(_))));

    let toml = MINIMAL.replace("schedule = \"@hourly\"", "schedule = \"@hourly\"\nemail_on_retry = false");
    assert!(matches!(load_from_str(&toml), Err(PipedagError::TomlError(_))));
}

#[test]
fn malformed_durations_are_rejected_at_load_time() {
    let toml = MINIMAL.replace("schedule = \"@hourly\"", "schedule = \"@hourly\"\nretry_delay = \"5 fortnights\"");
    assert!(matches!(load_from_str(&toml), Err(PipedagError::TomlError(_))));
}

#[test]
fn invalid_schedule_is_rejected() {
    let toml = MINIMAL.replace("@hourly", "61 * * * *");
    assert!(matches!(validate(&toml), Err(PipedagError::Schedule(_))));
}

#[test]
fn semantic_errors_are_reported() {
    expect_config_error(
        &MINIMAL.replace("schedule = \"@hourly\"", "schedule = \"@hourly\"\nmax_active_runs = 0"),
        "max_active_runs",
    );
    expect_config_error(
        &MINIMAL.replace("2018-11-02T00:00:00Z", "2018-10-01T00:00:00Z"),
        "before",
    );
    expect_config_error(
        &MINIMAL.replace("[task.only.operator]", "[task.Begin_execution.operator]"),
        "reserved",
    );
    expect_config_error(
        &MINIMAL.replace("[task.only.operator]", "[task.only]\nafter = [\"ghost\"]\n\n[task.only.operator]"),
        "unknown dependency 'ghost'",
    );
    expect_config_error(
        &MINIMAL.replace("[task.only.operator]", "[task.only]\nafter = [\"only\"]\n\n[task.only.operator]"),
        "cannot depend on itself",
    );

    let no_tasks = MINIMAL.replace("[task.only.operator]\nkind = \"noop\"\n", "");
    expect_config_error(&no_tasks, "at least one");
}

#[test]
fn operator_references_must_resolve() {
    let cfg = ConfigFileBuilder::new("refs")
        .with_task(
            "create",
            TaskConfigBuilder::new(OperatorConfig::CreateTables(CreateTablesConfig {
                connection_id: "nowhere".into(),
                sql_text: "CREATE TABLE t (id INT)".into(),
            }))
            .build(),
        )
        .build_raw();

    match ConfigFile::try_from(cfg) {
        Err(PipedagError::ConfigError(msg)) => assert!(msg.contains("unknown connection 'nowhere'")),
        other => panic!("unexpected {other:?}"),
    }

    let toml = r#"
[pipeline]
name = "refs"
start = "2018-11-01T00:00:00Z"
end = "2018-11-02T00:00:00Z"
schedule = "@daily"

[connections.wh]
command = "cat"

[task.stage.operator]
kind = "stage_to_warehouse"
table = "staging"
connection_id = "wh"
credentials_id = "missing"
source_bucket = "b"
source_key = "k"
region = "r"
"#;
    expect_config_error(toml, "unknown credentials 'missing'");

    // Without `file_format` the stage reads JSON.
    let anonymous = toml.replace("credentials_id = \"missing\"\n", "");
    match validate(&anonymous).map(|cfg| cfg.task["stage"].operator.clone()) {
        Ok(OperatorConfig::StageToWarehouse(StageConfig { file_format, .. })) => {
            assert_eq!(file_format, FileFormat::Json)
        }
        other => panic!("unexpected {other:?}"),
    }

    let bad_key = toml
        .replace("credentials_id = \"missing\"\n", "")
        .replace("source_key = \"k\"", "source_key = \"k/{minute}\"");
    expect_config_error(&bad_key, "unknown placeholder");
}

#[test]
fn cycles_are_reported_as_dag_cycle() {
    let cfg = ConfigFileBuilder::new("cyclic")
        .with_task("a", TaskConfigBuilder::noop().after("c").build())
        .with_task("b", TaskConfigBuilder::noop().after("a").build())
        .with_task("c", TaskConfigBuilder::noop().after("b").build())
        .build_raw();

    match ConfigFile::try_from(cfg) {
        Err(PipedagError::DagCycle(msg)) => assert!(msg.contains("cycle detected")),
        other => panic!("expected DagCycle, got {other:?}"),
    }
}
