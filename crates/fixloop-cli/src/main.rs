//! fixloop - bounded verify-fix convergence loop
//!
//! Repairs every Python unit under a target directory: analyze, apply a
//! validated plan, verify with pytest and pylint, retry until the unit
//! passes or its iteration budget runs out.
//!
//! Exit code 0 when every unit ends `DONE`, 1 when any unit is `ABORTED`
//! or could not be read or written back, 2 when the run could not start.

mod discovery;
mod writeback;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{info, warn, Level};

use fixloop_core::audit::AuditLog;
use fixloop_core::{
    spawn_jsonl_writer, write_run_report, Collaborators, RepairConfig, RepairOrchestrator,
    RunReport, SessionReport, METRICS,
};
use fixloop_tools::{
    ChatCompletionsProposer, PyCompileChecker, PylintLinter, PytestRunner, PythonTool,
    DEFAULT_API_BASE, DEFAULT_MODEL,
};

use crate::writeback::{write_back, WriteBack};

#[derive(Parser)]
#[command(name = "fixloop")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Bounded verify-fix loop for Python source units", long_about = None)]
struct Cli {
    /// Directory containing the units to repair
    target: PathBuf,

    /// Iteration budget per unit
    #[arg(short = 'n', long)]
    max_iterations: Option<u32>,

    /// Inclusive lint score threshold (0-10)
    #[arg(long)]
    threshold: Option<f64>,

    /// TOML configuration file; flags override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Model name sent to the proposer
    #[arg(long, env = "FIXLOOP_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, env = "FIXLOOP_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// API key for the proposer endpoint
    #[arg(long, env = "FIXLOOP_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Python interpreter used to run pytest and pylint
    #[arg(long, env = "FIXLOOP_PYTHON", default_value = "python3")]
    python: String,

    /// Append audit records (JSON lines) to this file
    #[arg(long)]
    audit_log: Option<PathBuf>,

    /// Write report.json and report.digest into this directory
    #[arg(long)]
    report: Option<PathBuf>,

    /// Run the loop but never write repaired sources
    #[arg(long)]
    dry_run: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    fixloop_core::init_tracing(cli.json, level);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "fixloop failed to run");
            eprintln!("error: {err:#}");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every unit ended `DONE`.
async fn run(cli: Cli) -> Result<bool> {
    let started = Instant::now();
    let root = cli
        .target
        .canonicalize()
        .with_context(|| format!("Target directory {} not found", cli.target.display()))?;
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }

    let config = load_config(&cli)?;
    let discovered = discovery::discover(&root)?;
    let (units, load_failures) = discovery::load_units(&discovered).await;
    if units.is_empty() {
        info!(target_dir = %root.display(), unreadable = load_failures, "no source units to repair");
        return Ok(load_failures == 0);
    }
    info!(
        target_dir = %root.display(),
        units = units.len(),
        max_iterations = config.max_iterations,
        threshold = config.quality_threshold,
        "starting repair run"
    );

    for tool in [PythonTool::PyCompile, PythonTool::Pytest, PythonTool::Pylint] {
        match tool.probe(&cli.python).await {
            Ok(version) => tracing::debug!(tool = tool.name(), version = %version, "tool available"),
            Err(err) => warn!(error = %err, "verification tool unavailable, units will fail closed"),
        }
    }

    let (audit, writer) = match &cli.audit_log {
        Some(path) => {
            let (log, handle) = spawn_jsonl_writer(path)
                .await
                .with_context(|| format!("Failed to open audit log {}", path.display()))?;
            (log, Some(handle))
        }
        None => (AuditLog::disabled(), None),
    };

    let proposer = ChatCompletionsProposer::new(
        cli.api_base.clone(),
        cli.model.clone(),
        cli.api_key.clone(),
        config.proposer_timeout(),
    )?;
    let orchestrator = RepairOrchestrator::new(
        &config,
        Collaborators {
            proposer: Arc::new(proposer),
            test_runner: Arc::new(PytestRunner::new(cli.python.clone(), config.test_timeout_secs)),
            linter: Arc::new(PylintLinter::new(cli.python.clone(), config.lint_timeout_secs)),
            syntax_checker: Arc::new(PyCompileChecker::new(
                cli.python.clone(),
                config.syntax_timeout_secs,
            )),
        },
        audit,
    )?;

    let sessions: Vec<SessionReport> = stream::iter(units)
        .map(|unit| orchestrator.run(unit))
        .buffer_unordered(config.concurrency)
        .collect()
        .await;

    drop(orchestrator);
    if let Some(writer) = writer {
        if let Err(err) = writer.await {
            warn!(error = %err, "audit writer task failed");
        }
    }

    let mut write_failures = 0usize;
    for session in &sessions {
        match write_back(&root, session, cli.dry_run).await {
            Ok(WriteBack::Written) => info!(unit = %session.unit, "repaired source written"),
            Ok(_) => {}
            Err(err) => {
                write_failures += 1;
                warn!(unit = %session.unit, error = %format!("{err:#}"), "write-back refused");
            }
        }
    }

    let report = RunReport::new(root.display().to_string(), sessions);
    if let Some(dir) = &cli.report {
        let path = write_run_report(&report, dir)?;
        info!(path = %path.display(), "run report written");
    }
    print_summary(&report, cli.json)?;

    info!(
        done = report.done,
        aborted = report.aborted,
        unreadable = load_failures,
        write_failures = write_failures,
        duration_ms = started.elapsed().as_millis() as u64,
        "repair run finished"
    );
    METRICS.flush();
    Ok(report.all_done() && load_failures == 0 && write_failures == 0)
}

fn load_config(cli: &Cli) -> Result<RepairConfig> {
    let mut config = match &cli.config {
        Some(path) => RepairConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => RepairConfig::default(),
    };
    if let Some(max_iterations) = cli.max_iterations {
        config.max_iterations = max_iterations;
    }
    if let Some(threshold) = cli.threshold {
        config.quality_threshold = threshold;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

#[derive(Serialize)]
struct SummaryRow<'a> {
    unit: &'a str,
    status: &'a str,
    iterations: u32,
    tests_passed: Option<bool>,
    lint_score: Option<f64>,
    changed: bool,
}

impl<'a> SummaryRow<'a> {
    fn from_session(session: &'a SessionReport) -> Self {
        Self {
            unit: &session.unit,
            status: if session.is_done() { "DONE" } else { "ABORTED" },
            iterations: session.iterations,
            tests_passed: session.final_verdict.as_ref().map(|v| v.tests_passed),
            lint_score: session.final_verdict.as_ref().and_then(|v| v.lint_score),
            changed: session.changed,
        }
    }
}

fn print_summary(report: &RunReport, json: bool) -> Result<()> {
    if json {
        for session in &report.sessions {
            println!("{}", serde_json::to_string(&SummaryRow::from_session(session))?);
        }
        return Ok(());
    }

    for session in &report.sessions {
        let row = SummaryRow::from_session(session);
        let score = row
            .lint_score
            .map_or_else(|| "-".to_string(), |s| format!("{s:.2}"));
        let tests = match row.tests_passed {
            Some(true) => "pass",
            Some(false) => "fail",
            None => "-",
        };
        println!(
            "{:<8} {:<40} iterations={} tests={} lint={}{}",
            row.status,
            row.unit,
            row.iterations,
            tests,
            score,
            if row.changed { " (changed)" } else { "" }
        );
    }
    println!(
        "\n{} done, {} aborted, {} total",
        report.done,
        report.aborted,
        report.sessions.len()
    );
    Ok(())
}
