// system-tests/tests/suites/failure_modes.rs
// ============================================================================
// Module: Failure Mode Tests
// Description: Launch failures, timeouts, crashes and mismatch aggregation.
// Purpose: Validate that tool misbehavior never takes down the harness.
// Dependencies: system-tests helpers, flagcheck-core
// ============================================================================

//! ## Overview
//! Every failure is observed as data: a [`RunnerError`], an [`Outcome`], or
//! an [`flagcheck_core::AssertionMismatch`]. None of them panics or aborts
//! the remaining expectations.

use std::path::Path;
use std::time::Duration;
use std::time::Instant;

use flagcheck_core::ExpectationState;
use flagcheck_core::FlagConfiguration;
use flagcheck_core::Outcome;
use flagcheck_core::ProcessRunner;
use flagcheck_core::RunRequest;
use flagcheck_core::RunnerError;
use flagcheck_core::Scenario;
use flagcheck_core::SetupError;
use flagcheck_core::Termination;
use flagcheck_core::ToolRunner;
use flagcheck_core::WorkspaceSpec;
use flagcheck_core::materialize;
use helpers::artifacts::TestReporter;
use helpers::harness::StubTool;
use helpers::harness::setup_missing;

use crate::helpers;

const MISSING_TOOL: &str = "/nonexistent/flagcheck/bazel";

/// Exits with the code named by `--exit=N`, or kills itself on `--die`.
const EXIT_CODE_TOOL: &str = r#"
for arg in "$@"; do
  case "$arg" in
    --die) kill -9 $$ ;;
    --exit=*) exit "${arg#--exit=}" ;;
  esac
done
exit 0
"#;

fn small_workspace() -> WorkspaceSpec {
    WorkspaceSpec::from_entries([("BUILD.bazel", "# empty\n")]).expect("valid workspace")
}

#[tokio::test(flavor = "multi_thread")]
async fn nonexistent_executable_is_runner_error() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("nonexistent_executable_is_runner_error")?;
    let workspace = materialize(&small_workspace())?;

    let request = RunRequest::new(MISSING_TOOL, workspace.root()).arg("test");
    let err = ProcessRunner::default().run(&request).await.expect_err("launch must fail");
    assert!(matches!(err, RunnerError::Spawn { .. }));
    assert!(err.to_string().contains(MISSING_TOOL));

    let scenario = Scenario::new("missing_tool", small_workspace())
        .expect(FlagConfiguration::baseline("plain"), Outcome::Success);
    let report = scenario
        .run_in(
            Path::new(MISSING_TOOL),
            &workspace,
            &ProcessRunner::default(),
            &flagcheck_core::ExitCodePolicy::bazel(),
        )
        .await;
    assert_eq!(report.results[0].state, ExpectationState::Errored);
    assert_eq!(report.errors().count(), 1);
    assert!(!report.is_success());

    match setup_missing(Path::new(MISSING_TOOL)) {
        Err(SetupError::ToolNotFound { .. }) => {}
        Err(other) => panic!("unexpected setup error: {other}"),
        Ok(_) => panic!("setup must fail for a missing tool"),
    }

    workspace.close()?;
    reporter.finish("pass", vec!["missing executable surfaced as RunnerError".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_tool_times_out() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("slow_tool_times_out")?;
    let tool = StubTool::install("bazel", "echo started\nsleep 30\necho finished\n")?;
    let harness = tool.harness(Duration::from_secs(30))?;

    let scenario = Scenario::new("slow", small_workspace())
        .timeout(Duration::from_millis(300))
        .expect(FlagConfiguration::baseline("plain"), Outcome::Timeout);
    let started = Instant::now();
    let report = scenario.evaluate(&harness).await?.into_result()?;
    reporter.artifacts().write_report(&report)?;

    let run = report.results[0].run.as_ref().expect("run recorded");
    assert_eq!(run.termination, Termination::TimedOut);
    assert!(run.stdout.text().contains("started"));
    assert!(!run.stdout.text().contains("finished"));
    assert!(started.elapsed() < Duration::from_secs(10));

    reporter.finish("pass", vec!["timeout killed the tool and classified as timeout".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn signals_and_unknown_codes_are_crashes() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("signals_and_unknown_codes_are_crashes")?;
    let tool = StubTool::install("bazel", EXIT_CODE_TOOL)?;
    let harness = tool.harness(Duration::from_secs(30))?;

    let scenario = Scenario::new("crashes", small_workspace())
        .expect(FlagConfiguration::new("killed", ["--die"]), Outcome::ToolCrash)
        .expect(FlagConfiguration::new("server error", ["--exit=37"]), Outcome::ToolCrash)
        .expect(FlagConfiguration::new("usage error", ["--exit=2"]), Outcome::ToolCrash)
        .expect(FlagConfiguration::new("build failed", ["--exit=1"]), Outcome::BuildFailure);
    let report = scenario.evaluate(&harness).await?.into_result()?;
    reporter.artifacts().write_report(&report)?;

    let killed = report.results[0].run.as_ref().expect("run recorded");
    assert_eq!(killed.termination, Termination::Signaled(9));

    reporter.finish("pass", vec!["signals and undocumented codes classify as crashes".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn one_mismatch_among_three_is_reported_alone() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("one_mismatch_among_three_is_reported_alone")?;
    let tool = StubTool::install("bazel", EXIT_CODE_TOOL)?;
    let harness = tool.harness(Duration::from_secs(30))?;

    let scenario = Scenario::new("aggregation", small_workspace())
        .expect(FlagConfiguration::new("passes", ["--exit=0"]), Outcome::Success)
        .expect(FlagConfiguration::new("misdeclared", ["--exit=3"]), Outcome::BuildFailure)
        .expect(FlagConfiguration::new("fails build", ["--exit=1"]), Outcome::BuildFailure);
    let report = scenario.evaluate(&harness).await?;
    reporter.artifacts().write_report(&report)?;

    let states: Vec<ExpectationState> = report.results.iter().map(|result| result.state).collect();
    assert_eq!(
        states,
        [ExpectationState::Matched, ExpectationState::Mismatched, ExpectationState::Matched]
    );
    let mismatches: Vec<_> = report.mismatches().collect();
    assert_eq!(mismatches.len(), 1);
    assert_eq!(mismatches[0].configuration.label(), "misdeclared");
    assert_eq!(mismatches[0].actual, Outcome::TestFailure);

    let failure = report.into_result().expect_err("one mismatch");
    assert_eq!(failure.mismatches.len(), 1);
    assert!(failure.errors.is_empty());

    reporter.finish("pass", vec!["all three expectations evaluated".to_string()])?;
    Ok(())
}
