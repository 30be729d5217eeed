// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod operator;
pub mod pipeline;
pub mod schedule;
pub mod types;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::{default_config_path, load_and_validate};
use crate::engine::Scheduler;
use crate::operator::Collaborators;
use crate::pipeline::Pipeline;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading and validation
/// - operator construction against shell-backed warehouses
/// - the scheduler and its run executors
/// - Ctrl-C handling
///
/// Fails if any run ended `Failed`.
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let cfg = load_and_validate(&config_path)?;
    let now = args.now.unwrap_or_else(Utc::now);

    let collaborators = Collaborators::from_config(&cfg);
    let pipeline = Pipeline::from_config(&cfg, &collaborators)?;

    if args.dry_run {
        print_dry_run(&cfg, &pipeline, now);
        return Ok(());
    }

    info!(
        pipeline = %pipeline.name,
        config = %config_path.display(),
        %now,
        once = args.once,
        "starting pipeline"
    );

    // Ctrl-C → graceful shutdown: no new runs, active runs finish.
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let scheduler = Scheduler::from_pipeline(&pipeline, args.once);
    let report = scheduler.run(now, shutdown).await?;

    let total = report.runs.len();
    let failed = report.failed_runs().count();
    for run in report.failed_runs() {
        error!("{}", run.failure());
    }

    report
        .into_result()
        .with_context(|| format!("{failed} of {total} run(s) failed"))?;

    info!(runs = total, "all runs succeeded");
    Ok(())
}

/// Print the pipeline, its topological order and the runs due at `now`.
fn print_dry_run(cfg: &ConfigFile, pipeline: &Pipeline, now: DateTime<Utc>) {
    let p = &cfg.pipeline;
    println!("pipedag dry-run: {}", p.name);
    if let Some(ref description) = p.description {
        println!("  description = {description}");
    }
    if let Some(ref owner) = p.owner {
        println!("  owner = {owner}");
    }
    println!("  window = {} .. {}", p.start, p.end);
    println!("  schedule = {}", cfg.schedule);
    println!("  catchup = {}", p.catchup);
    println!("  max_active_runs = {}", p.max_active_runs);
    println!();

    println!("tasks ({}), in execution order:", pipeline.graph.len());
    for id in pipeline.graph.topological_order() {
        let Some(task) = pipeline.graph.task(id) else {
            continue;
        };
        let retry = task.retry_policy();
        println!("  - {id} [{}]", task.operator().kind());
        let deps = pipeline.graph.dependencies_of(id);
        if !deps.is_empty() {
            println!("      after: {deps:?}");
        }
        println!(
            "      retries: {} every {:?}",
            retry.retry_limit, retry.retry_delay
        );
    }
    println!();

    let due = pipeline.window.due(now);
    println!("runs due at {now} ({}):", due.len());
    for logical_time in due {
        println!("  - {logical_time}");
    }
    match pipeline.window.next_boundary_after(now) {
        Some(next) => println!("next boundary: {next}"),
        None => println!("next boundary: none (window ends {})", p.end),
    }

    debug!("dry-run complete (no execution)");
}
