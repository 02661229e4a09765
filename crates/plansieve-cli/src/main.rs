//! `plansieve` developer CLI.
//!
//! - `schema --filters <json>` prints the plan schema for a descriptor list.
//! - `eval --plan <json> --fixtures <json>` evaluates a plan document
//!   against fixture resolvers and prints the merged identities.

mod fixtures;

use clap::{Parser, Subcommand};
use fixtures::Fixtures;
use plansieve::core::{
    config::EngineConfig,
    identity::{IdentityParseError, IdentitySet},
    obs::{QueryTraceEvent, QueryTraceSink, metrics_report},
    pipeline::{FixedPlan, Pipeline, PipelineManager},
    plan::Plan,
    registry::FilterDescriptor,
    schema::build_schema,
};
use std::{
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};
use thiserror::Error as ThisError;

const EVAL_PIPELINE: &str = "fixtures";

///
/// Cli
///

#[derive(Debug, Parser)]
#[command(name = "plansieve", version, about = "Inspect and evaluate plansieve filter plans")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the plan schema generated for a JSON list of filter descriptors.
    Schema {
        #[arg(long)]
        filters: PathBuf,
    },

    /// Evaluate a plan document against fixture resolvers.
    Eval {
        #[arg(long)]
        plan: PathBuf,

        #[arg(long)]
        fixtures: PathBuf,

        /// Engine config file; `PLANSIEVE_*` variables override it.
        #[arg(long, env = "PLANSIEVE_CONFIG")]
        config: Option<PathBuf>,

        /// Print trace events to stderr.
        #[arg(long)]
        trace: bool,

        /// Print the metrics snapshot to stderr after evaluation.
        #[arg(long)]
        metrics: bool,
    },
}

///
/// CliError
///

#[derive(Debug, ThisError)]
enum CliError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid identity: {0}")]
    Identity(#[from] IdentityParseError),

    #[error("{}: {}", .0.kind, .0.message)]
    Engine(#[from] plansieve::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<String, CliError> {
    match command {
        Command::Schema { filters } => schema(&filters),
        Command::Eval {
            plan,
            fixtures,
            config,
            trace,
            metrics,
        } => {
            let output = eval(&plan, &fixtures, config.as_deref(), trace)?;
            if metrics {
                eprintln!("{}", serde_json::to_string_pretty(&metrics_report())?);
            }

            Ok(output)
        }
    }
}

fn schema(filters: &Path) -> Result<String, CliError> {
    let descriptors: Vec<FilterDescriptor> = serde_json::from_str(&read(filters)?)?;

    Ok(build_schema(&descriptors).to_json_pretty()?)
}

fn eval(
    plan: &Path,
    fixtures: &Path,
    config: Option<&Path>,
    trace: bool,
) -> Result<String, CliError> {
    let plan = Plan::from_json(&read(plan)?).map_err(plansieve::Error::from)?;
    let fixtures = Fixtures::from_json(&read(fixtures)?)?;
    let config = EngineConfig::load(config).map_err(plansieve::Error::from)?;

    let rows = evaluate(&plan, &fixtures, config, trace)?;

    Ok(serde_json::to_string_pretty(&rows)?)
}

fn evaluate(
    plan: &Plan,
    fixtures: &Fixtures,
    config: EngineConfig,
    trace: bool,
) -> Result<IdentitySet, CliError> {
    let mut manager = PipelineManager::new(config).map_err(plansieve::Error::from)?;
    if trace {
        manager = manager.with_trace(Arc::new(StderrTrace));
    }

    let pipeline = Pipeline::new(
        "Fixture catalog",
        fixtures.registry()?,
        fixtures.universe()?,
        FixedPlan(plan.clone()),
    );
    manager
        .add_pipeline(EVAL_PIPELINE, pipeline)
        .map_err(plansieve::Error::from)?;

    Ok(manager
        .execute(EVAL_PIPELINE, plan)
        .map_err(plansieve::Error::from)?)
}

fn read(path: &Path) -> Result<String, CliError> {
    std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.display().to_string(),
        source,
    })
}

///
/// StderrTrace
///

struct StderrTrace;

impl QueryTraceSink for StderrTrace {
    fn on_event(&self, event: QueryTraceEvent<'_>) {
        match event {
            QueryTraceEvent::PlanStart {
                fingerprint,
                leaves,
                depth,
            } => eprintln!("[{}] plan start leaves={leaves} depth={depth}", fingerprint.short()),
            QueryTraceEvent::LeafResolved {
                fingerprint,
                path,
                filter,
                rows,
                attempts,
            } => eprintln!(
                "[{}] {path} {filter} rows={rows} attempts={attempts}",
                fingerprint.short()
            ),
            QueryTraceEvent::LeafSkipped {
                fingerprint,
                path,
                filter,
            } => eprintln!("[{}] {path} {filter} skipped", fingerprint.short()),
            QueryTraceEvent::MergeFinish { fingerprint, rows } => {
                eprintln!("[{}] merged rows={rows}", fingerprint.short());
            }
            QueryTraceEvent::Error {
                fingerprint,
                class,
                origin,
            } => eprintln!("[{}] error {origin}:{class}", fingerprint.short()),
        }
    }
}
