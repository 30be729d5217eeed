// src/config/validate.rs

use std::collections::BTreeSet;

use tracing::warn;

use crate::config::model::{ConfigFile, OperatorConfig, RawConfigFile};
use crate::dag::graph::topological_order;
use crate::errors::{PipedagError, Result};
use crate::operator::stage::KeyTemplate;
use crate::schedule::CronExpr;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipedagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let schedule = validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw, schedule))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<CronExpr> {
    ensure_has_tasks(cfg)?;
    let schedule = validate_pipeline(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_operators(cfg)?;
    validate_dag(cfg)?;
    warn_unloaded_quality_tables(cfg);
    Ok(schedule)
}

fn config_error(msg: impl Into<String>) -> PipedagError {
    PipedagError::ConfigError(msg.into())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(config_error(
            "config must contain at least one [task.<id>] section",
        ));
    }
    Ok(())
}

fn validate_pipeline(cfg: &RawConfigFile) -> Result<CronExpr> {
    let p = &cfg.pipeline;

    if p.name.trim().is_empty() {
        return Err(config_error("[pipeline].name must not be empty"));
    }
    if p.max_active_runs == 0 {
        return Err(config_error("[pipeline].max_active_runs must be >= 1 (got 0)"));
    }
    if p.end < p.start {
        return Err(config_error(format!(
            "[pipeline].end ({}) is before [pipeline].start ({})",
            p.end, p.start
        )));
    }
    if p.entry == p.exit {
        return Err(config_error(format!(
            "[pipeline].entry and [pipeline].exit must differ (both '{}')",
            p.entry
        )));
    }
    for sentinel in [&p.entry, &p.exit] {
        if cfg.task.contains_key(sentinel) {
            return Err(config_error(format!(
                "task id '{sentinel}' is reserved for the pipeline's entry/exit marker"
            )));
        }
    }

    let schedule = CronExpr::parse(&p.schedule)?;
    Ok(schedule)
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(config_error(format!(
                    "task '{}' cannot depend on itself in `after`",
                    name
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(config_error(format!(
                    "task '{}' has unknown dependency '{}' in `after`",
                    name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_operators(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        let op = &task.operator;

        if let Some(conn) = op.connection_id()
            && !cfg.connections.contains_key(conn)
        {
            return Err(config_error(format!(
                "task '{name}' references unknown connection '{conn}'"
            )));
        }
        if let Some(creds) = op.credentials_id()
            && !cfg.credentials.contains_key(creds)
        {
            return Err(config_error(format!(
                "task '{name}' references unknown credentials '{creds}'"
            )));
        }

        match op {
            OperatorConfig::StageToWarehouse(stage) => {
                KeyTemplate::parse(&stage.source_key)
                    .map_err(|e| config_error(format!("task '{name}': {e}")))?;
            }
            OperatorConfig::DataQuality(quality) if quality.tables.is_empty() => {
                return Err(config_error(format!(
                    "task '{name}': data_quality needs at least one table"
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: dep -> task.
    let nodes = cfg.task.keys().map(String::as_str);
    let edges = cfg.task.iter().flat_map(|(name, task)| {
        task.after
            .iter()
            .map(move |dep| (dep.as_str(), name.as_str()))
    });

    topological_order(nodes, edges)
        .map(|_| ())
        .map_err(|cycle| PipedagError::DagCycle(cycle.to_string()))
}

/// Quality-check tables are taken as written; flag the ones no task loads.
fn warn_unloaded_quality_tables(cfg: &RawConfigFile) {
    let loaded: BTreeSet<&str> = cfg
        .task
        .values()
        .filter_map(|t| t.operator.target_table())
        .collect();

    for (name, task) in cfg.task.iter() {
        if let OperatorConfig::DataQuality(quality) = &task.operator {
            for table in &quality.tables {
                if !loaded.contains(table.as_str()) {
                    warn!(
                        task = %name,
                        table = %table,
                        "quality check covers a table that no task in the pipeline loads"
                    );
                }
            }
        }
    }
}
