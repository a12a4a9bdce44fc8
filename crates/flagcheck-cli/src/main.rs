// crates/flagcheck-cli/src/main.rs
// ============================================================================
// Module: Flagcheck CLI Entry Point
// Description: Command dispatcher for running and validating flag scenarios.
// Purpose: Drive a build tool through scenario files and report outcomes.
// Dependencies: clap, flagcheck-config, flagcheck-core, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! `flagcheck run` loads the harness configuration and every scenario file,
//! performs lifecycle setup, evaluates scenarios with bounded concurrency, and
//! tears the harness down before reporting.
//!
//! Exit codes: `0` when every expectation matched, `1` on any mismatch or
//! expectation error, `2` on setup or configuration errors.

// ============================================================================
// SECTION: Modules
// ============================================================================


// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use flagcheck_cli::execute::run_scenarios;
use flagcheck_cli::logging;
use flagcheck_cli::report::EXIT_SETUP_ERROR;
use flagcheck_cli::report::RunReport;
use flagcheck_config::HarnessConfig;
use flagcheck_config::SCENARIO_FILE_SUFFIX;
use flagcheck_config::load_scenario;
use flagcheck_core::HarnessLifecycle;
use flagcheck_core::Scenario;
use flagcheck_core::ToolRunner;
use thiserror::Error;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "flagcheck", disable_help_subcommand = true, disable_version_flag = true)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run scenarios against the configured tool.
    Run(RunCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Scenario file utilities.
    Scenario {
        /// Selected scenario subcommand.
        #[command(subcommand)]
        command: ScenarioCommand,
    },
}

/// Arguments for `flagcheck run`.
#[derive(Args, Debug)]
struct RunCommand {
    /// Config file path (defaults to `FLAGCHECK_CONFIG`, then `flagcheck.toml`).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Maximum number of scenarios evaluated concurrently.
    #[arg(long, value_name = "N", default_value = "1")]
    jobs: NonZeroUsize,
    /// Write a canonical JSON report to this path.
    #[arg(long, value_name = "PATH")]
    report: Option<PathBuf>,
    /// Scenario files or directories containing `*.scenario.toml` files.
    #[arg(value_name = "SCENARIO", required = true)]
    scenarios: Vec<PathBuf>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate a configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for `flagcheck config validate`.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Scenario subcommands.
#[derive(Subcommand, Debug)]
enum ScenarioCommand {
    /// Validate scenario files without running the tool.
    Validate(ScenarioValidateCommand),
}

/// Arguments for `flagcheck scenario validate`.
#[derive(Args, Debug)]
struct ScenarioValidateCommand {
    /// Config file path, for tool defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Scenario files or directories.
    #[arg(value_name = "SCENARIO", required = true)]
    scenarios: Vec<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Setup or configuration failure; maps to exit code 2.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    logging::init();
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&format!("flagcheck {version}"))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::Run(command) => command_run(command).await,
        Commands::Config {
            command: ConfigCommand::Validate(command),
        } => command_config_validate(&command),
        Commands::Scenario {
            command: ScenarioCommand::Validate(command),
        } => command_scenario_validate(&command),
    }
}

// ============================================================================
// SECTION: Run Command
// ============================================================================

/// Executes the `run` command.
async fn command_run(command: RunCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let scenarios = load_scenarios(&command.scenarios, &config)?;
    let settings = config
        .lifecycle_settings()
        .map_err(|err| CliError::new(err.to_string()))?;
    let harness = Arc::new(
        HarnessLifecycle::setup(settings)
            .map_err(|err| CliError::new(format!("setup failed: {err}")))?,
    );
    let runner: Arc<dyn ToolRunner> = Arc::new(harness.runner().clone());

    let outcomes = run_scenarios(Arc::clone(&harness), runner, scenarios, command.jobs).await;
    let report = RunReport::from_outcomes(harness.tool_path(), &outcomes);

    let teardown = harness.teardown();
    for failure in &teardown.failures {
        tracing::warn!(failure = %failure, "teardown step failed");
    }

    if let Some(path) = &command.report {
        report.write_json(path).map_err(|err| CliError::new(err.to_string()))?;
    }
    write_stdout_text(&report.render_text())
        .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::from(report.exit_code()))
}

// ============================================================================
// SECTION: Validate Commands
// ============================================================================

/// Executes `config validate`.
fn command_config_validate(command: &ConfigValidateCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    write_stdout_line(&format!(
        "config ok: tool={} timeout={}s build_failed=[{}] tests_failed=[{}]",
        config.tool.program,
        config.run.timeout_secs,
        join_codes(&config.exit_codes.build_failed),
        join_codes(&config.exit_codes.tests_failed)
    ))
    .map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(ExitCode::SUCCESS)
}

/// Executes `scenario validate`.
fn command_scenario_validate(command: &ScenarioValidateCommand) -> CliResult<ExitCode> {
    let config = load_config(command.config.as_deref())?;
    let files = collect_scenario_paths(&command.scenarios)?;
    let mut failures = Vec::new();
    for path in &files {
        let line = match load_scenario(path, &config.tool) {
            Ok(scenario) => format!(
                "ok {}: {} ({} expectations, {} files)",
                path.display(),
                scenario.name(),
                scenario.expectations().len(),
                scenario.workspace().len()
            ),
            Err(err) => {
                failures.push(path.display().to_string());
                format!("invalid {}: {err}", path.display())
            }
        };
        write_stdout_line(&line).map_err(|err| CliError::new(output_error("stdout", &err)))?;
    }
    if failures.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Err(CliError::new(format!("{} invalid scenario file(s)", failures.len())))
    }
}

// ============================================================================
// SECTION: Loading Helpers
// ============================================================================

/// Loads the harness configuration.
fn load_config(path: Option<&Path>) -> CliResult<HarnessConfig> {
    HarnessConfig::load(path).map_err(|err| CliError::new(err.to_string()))
}

/// Loads every scenario named on the command line.
fn load_scenarios(inputs: &[PathBuf], config: &HarnessConfig) -> CliResult<Vec<Scenario>> {
    let files = collect_scenario_paths(inputs)?;
    files
        .iter()
        .map(|path| load_scenario(path, &config.tool).map_err(|err| CliError::new(err.to_string())))
        .collect()
}

/// Expands directories into their `*.scenario.toml` files, sorted by name.
fn collect_scenario_paths(inputs: &[PathBuf]) -> CliResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }
        let entries = std::fs::read_dir(input)
            .map_err(|err| CliError::new(format!("{}: {err}", input.display())))?;
        let mut found = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|err| CliError::new(format!("{}: {err}", input.display())))?
                .path();
            let is_scenario = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(SCENARIO_FILE_SUFFIX));
            if is_scenario && path.is_file() {
                found.push(path);
            }
        }
        if found.is_empty() {
            return Err(CliError::new(format!(
                "{}: no *{SCENARIO_FILE_SUFFIX} files found",
                input.display()
            )));
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Renders top-level help.
fn show_help() -> CliResult<()> {
    let help = Cli::command().render_help().to_string();
    write_stdout_text(&help).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes text to stdout as-is.
fn write_stdout_text(text: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(text.as_bytes())
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Renders exit codes as a comma-separated list.
fn join_codes(codes: &[i32]) -> String {
    codes.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Formats an output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    format!("failed to write to {stream}: {error}")
}

/// Emits an error message to stderr and returns the setup-error exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(&format!("error: {message}"));
    ExitCode::from(EXIT_SETUP_ERROR)
}
