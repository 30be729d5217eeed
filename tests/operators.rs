// tests/operators.rs

mod common;
use crate::common::*;

use std::sync::Arc;

use pipedag::config::{
    CredentialsConfig, DataQualityConfig, LoadDimensionConfig, OperatorConfig, StageConfig,
};
use pipedag::operator::{
    Collaborators, CreateTablesOperator, DataQualityOperator, LoadDimensionOperator,
    LoadFactOperator, Operator, OperatorContext, build_operator,
};
use pipedag::types::FileFormat;

fn ctx(task: &str) -> OperatorContext {
    OperatorContext {
        run_id: 1,
        task_id: task.to_string(),
        logical_time: nov(3, 7),
        attempt: 1,
    }
}

#[tokio::test]
async fn create_and_load_statements_reach_the_warehouse() {
    let wh = Arc::new(MemoryWarehouse::new());

    CreateTablesOperator::new(wh.clone(), "CREATE TABLE IF NOT EXISTS users (id INT);")
        .execute(&ctx("create"))
        .await
        .unwrap();
    LoadFactOperator::new(wh.clone(), "songplays", "  SELECT * FROM staging_events  ")
        .execute(&ctx("fact"))
        .await
        .unwrap();
    LoadDimensionOperator::new(wh.clone(), "users", "SELECT DISTINCT userid FROM staging_events", false)
        .execute(&ctx("dim"))
        .await
        .unwrap();

    assert_eq!(
        wh.statements(),
        vec![
            "CREATE TABLE IF NOT EXISTS users (id INT);".to_string(),
            "INSERT INTO songplays SELECT * FROM staging_events".to_string(),
            "INSERT INTO users SELECT DISTINCT userid FROM staging_events".to_string(),
        ]
    );
    assert_eq!(wh.count("users"), Some(1));
    assert_eq!(wh.count("songplays"), Some(1));
}

#[tokio::test]
async fn truncating_dimension_load_empties_the_table_first() {
    let wh = Arc::new(MemoryWarehouse::new().with_rows("users", 40));
    let op = LoadDimensionOperator::new(wh.clone(), "users", "SELECT 1", true);

    op.execute(&ctx("dim")).await.unwrap();

    assert_eq!(wh.statements()[0], "TRUNCATE TABLE users");
    assert_eq!(wh.count("users"), Some(1));
}

#[tokio::test]
async fn quality_check_collects_every_violation() {
    let wh = Arc::new(
        MemoryWarehouse::new()
            .with_rows("songplays", 10)
            .with_rows("users", 0),
    );
    let op = DataQualityOperator::new(
        wh.clone(),
        vec!["songplays".into(), "users".into(), "artirst".into()],
        1,
    );

    let err = op.execute(&ctx("quality")).await.unwrap_err();

    assert!(err.reason.contains("users: 0 row(s)"), "{}", err.reason);
    assert!(err.reason.contains("artirst"), "{}", err.reason);
    assert!(!err.reason.contains("songplays"), "{}", err.reason);
    assert_eq!(wh.statements().len(), 3);
}

#[tokio::test]
async fn quality_check_honours_min_rows() {
    let wh = Arc::new(MemoryWarehouse::new().with_rows("time", 5));

    let strict = DataQualityOperator::new(wh.clone(), vec!["time".into()], 6);
    assert!(strict.execute(&ctx("quality")).await.is_err());

    let lenient = DataQualityOperator::new(wh, vec!["time".into()], 5);
    assert!(lenient.execute(&ctx("quality")).await.is_ok());
}

#[tokio::test]
async fn warehouse_errors_become_operator_errors() {
    let wh = Arc::new(MemoryWarehouse::new().fail_when("INSERT INTO songplays"));
    let op = LoadFactOperator::new(wh, "songplays", "SELECT 1");

    let err = op.execute(&ctx("fact")).await.unwrap_err();
    assert!(err.reason.contains("injected failure"));
}

#[tokio::test]
async fn factory_builds_stage_operator_with_rendered_key() {
    let wh = Arc::new(MemoryWarehouse::new());
    let collaborators = Collaborators::new().with_warehouse("redshift", wh.clone());

    let config = OperatorConfig::StageToWarehouse(StageConfig {
        table: "staging_events".into(),
        connection_id: "redshift".into(),
        credentials_id: None,
        source_bucket: "udacity-dend".into(),
        source_key: "log_data/{year}/{month}/{ds}-events.json".into(),
        region: "us-west-2".into(),
        file_format: FileFormat::Json,
        json_paths: Some("s3://udacity-dend/log_json_path.json".into()),
    });

    let op = build_operator("Stage_events", &config, &collaborators).unwrap();
    assert_eq!(op.kind(), "stage_to_warehouse");
    op.execute(&ctx("Stage_events")).await.unwrap();

    assert_eq!(
        wh.statements(),
        vec![
            "COPY staging_events FROM 's3://udacity-dend/log_data/2018/11/2018-11-03-events.json' \
             REGION 'us-west-2' FORMAT AS JSON 's3://udacity-dend/log_json_path.json'"
                .to_string()
        ]
    );
    assert_eq!(wh.count("staging_events"), Some(1));
}

#[tokio::test]
async fn stage_credentials_are_read_from_the_environment_at_execution() {
    let wh = Arc::new(MemoryWarehouse::new());
    let collaborators = Collaborators::new()
        .with_warehouse("redshift", wh.clone())
        .with_credentials(
            "aws",
            CredentialsConfig {
                access_key_env: "PIPEDAG_TEST_UNSET_ACCESS_KEY".into(),
                secret_key_env: "PIPEDAG_TEST_UNSET_SECRET_KEY".into(),
            },
        );

    let config = OperatorConfig::StageToWarehouse(StageConfig {
        table: "staging_songs".into(),
        connection_id: "redshift".into(),
        credentials_id: Some("aws".into()),
        source_bucket: "b".into(),
        source_key: "song_data".into(),
        region: "us-west-2".into(),
        file_format: FileFormat::Csv,
        json_paths: None,
    });

    let op = build_operator("Stage_songs", &config, &collaborators).unwrap();
    let err = op.execute(&ctx("Stage_songs")).await.unwrap_err();

    assert!(err.reason.contains("PIPEDAG_TEST_UNSET_ACCESS_KEY"));
    assert!(wh.statements().is_empty());
}

#[test]
fn factory_rejects_unknown_references() {
    let config = OperatorConfig::LoadDimension(LoadDimensionConfig {
        table: "users".into(),
        connection_id: "redshift".into(),
        sql_text: "SELECT 1".into(),
        truncate: false,
    });
    assert!(build_operator("dim", &config, &Collaborators::new()).is_err());

    let config = OperatorConfig::DataQuality(DataQualityConfig {
        connection_id: "redshift".into(),
        tables: vec!["users".into()],
        min_rows: 1,
    });
    let collaborators =
        Collaborators::new().with_warehouse("redshift", Arc::new(MemoryWarehouse::new()));
    let op = build_operator("quality", &config, &collaborators).unwrap();
    assert_eq!(op.kind(), "data_quality");
}

#[cfg(unix)]
#[tokio::test]
async fn shell_warehouse_runs_operators_end_to_end() {
    use pipedag::operator::ShellWarehouse;

    let dir = tempfile::tempdir().unwrap();
    let sink = dir.path().join("statements.sql");
    let command = format!("cat >> '{}'; echo 3", sink.display());
    let wh = Arc::new(ShellWarehouse::new("local", command));

    LoadFactOperator::new(wh.clone(), "songplays", "SELECT 1")
        .execute(&ctx("fact"))
        .await
        .unwrap();
    DataQualityOperator::new(wh, vec!["songplays".into()], 3)
        .execute(&ctx("quality"))
        .await
        .unwrap();

    let written = std::fs::read_to_string(&sink).unwrap();
    assert!(written.contains("INSERT INTO songplays SELECT 1"));
    assert!(written.contains("SELECT COUNT(*) FROM songplays"));
}
