// tests/pipeline_assembly.rs

mod common;
use crate::common::*;

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use pipedag::config::{LoadFactConfig, OperatorConfig, load_and_validate};
use pipedag::errors::PipedagError;
use pipedag::operator::Collaborators;
use pipedag::pipeline::Pipeline;

type TestResult = Result<(), Box<dyn Error>>;

fn memory_collaborators() -> Collaborators {
    Collaborators::new().with_warehouse("redshift", Arc::new(MemoryWarehouse::new()))
}

#[test]
fn sentinels_wrap_the_configured_tasks() -> TestResult {
    let cfg = load_and_validate(project_file("pipelines/sparkify.toml"))?;
    let pipeline = Pipeline::from_config(&cfg, &Collaborators::from_config(&cfg))?;
    let graph = &pipeline.graph;

    assert_eq!(graph.len(), 11);
    assert_eq!(graph.entry(), Some("Begin_execution"));
    assert_eq!(graph.exit(), Some("Stop_execution"));
    assert_eq!(graph.entries(), vec!["Begin_execution"]);
    assert_eq!(graph.exits(), vec!["Stop_execution"]);
    assert_eq!(graph.dependents_of("Begin_execution"), ["Create_tables"]);
    assert_eq!(graph.dependencies_of("Stop_execution"), ["Run_data_quality_checks"]);

    let order = graph.topological_order();
    let pos = |id: &str| order.iter().position(|t| t == id).unwrap();
    for (from, to) in sparkify_edges() {
        assert!(pos(from) < pos(to), "{from} must precede {to}");
    }

    assert_eq!(pipeline.max_active_runs, 3);
    assert_eq!(pipeline.window.start(), cfg.pipeline.start);
    assert!(!pipeline.window.catchup());
    assert_eq!(
        graph.task("Stage_events").map(|t| t.operator().kind()),
        Some("stage_to_warehouse")
    );
    Ok(())
}

#[test]
fn task_retry_overrides_pipeline_default() -> TestResult {
    let cfg = ConfigFileBuilder::new("retries")
        .retries(2, Duration::from_secs(60))
        .with_task("a", TaskConfigBuilder::noop().build())
        .with_task(
            "b",
            TaskConfigBuilder::noop()
                .after("a")
                .retries(5)
                .retry_delay(Duration::from_millis(250))
                .build(),
        )
        .build();

    let pipeline = Pipeline::from_config(&cfg, &Collaborators::new())?;

    let a = pipeline.graph.task("a").unwrap().retry_policy();
    assert_eq!((a.retry_limit, a.retry_delay), (2, Duration::from_secs(60)));

    let b = pipeline.graph.task("b").unwrap().retry_policy();
    assert_eq!((b.retry_limit, b.retry_delay), (5, Duration::from_millis(250)));
    Ok(())
}

#[test]
fn parallel_roots_and_leaves_share_the_sentinels() -> TestResult {
    let cfg = ConfigFileBuilder::new("parallel")
        .with_task("left", TaskConfigBuilder::noop().build())
        .with_task("right", TaskConfigBuilder::noop().build())
        .build();

    let pipeline = Pipeline::from_config(&cfg, &Collaborators::new())?;
    let graph = &pipeline.graph;

    assert_eq!(graph.dependents_of("Begin_execution"), ["left", "right"]);
    assert_eq!(graph.dependencies_of("Stop_execution"), ["left", "right"]);
    Ok(())
}

#[test]
fn missing_collaborator_fails_assembly() {
    let cfg = ConfigFileBuilder::new("load")
        .connection("redshift", "cat")
        .with_task(
            "load",
            TaskConfigBuilder::new(OperatorConfig::LoadFact(LoadFactConfig {
                table: "songplays".into(),
                connection_id: "redshift".into(),
                sql_text: "SELECT 1".into(),
            }))
            .build(),
        )
        .build();

    let err = Pipeline::from_config(&cfg, &Collaborators::new()).unwrap_err();
    assert!(matches!(err, PipedagError::ConfigError(ref m) if m.contains("unknown connection")));

    assert!(Pipeline::from_config(&cfg, &memory_collaborators()).is_ok());
}
