// system-tests/tests/suites/race_flag.rs
// ============================================================================
// Module: Race Flag Tests
// Description: End-to-end race-detector flag scenarios against a stub Bazel.
// Purpose: Validate that each flag configuration yields its documented outcome.
// Dependencies: system-tests helpers, flagcheck-config, flagcheck-core
// ============================================================================

//! ## Overview
//! The fixture only compiles with the race detector enabled, and its test
//! has a genuine data race. Without the flag the build fails; with the flag
//! the test fails; with the flag and the race removed everything passes.

use std::fs;
use std::time::Duration;

use flagcheck_config::ToolConfig;
use flagcheck_config::load_scenario;
use flagcheck_core::ExpectationState;
use flagcheck_core::FlagConfiguration;
use flagcheck_core::Outcome;
use flagcheck_core::Scenario;
use flagcheck_core::render_bundle;
use helpers::artifacts::TestReporter;
use helpers::fixtures::RACE_FLAG;
use helpers::fixtures::RACE_TARGET;
use helpers::fixtures::STUB_BAZEL;
use helpers::fixtures::race_free_workspace;
use helpers::fixtures::race_workspace;
use helpers::harness::StubTool;
use helpers::harness::is_empty_dir;

use crate::helpers;

const SUITE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::test(flavor = "multi_thread")]
async fn race_flag_selects_build_or_test_failure() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("race_flag_selects_build_or_test_failure")?;
    let tool = StubTool::install("bazel", STUB_BAZEL)?;
    let harness = tool.harness(SUITE_TIMEOUT)?;

    let scenario = Scenario::new("race_flag", race_workspace())
        .base_command(ToolConfig::default().base_command)
        .targets([RACE_TARGET])
        .expect(FlagConfiguration::baseline("no race flag"), Outcome::BuildFailure)
        .expect(FlagConfiguration::new("race flag", [RACE_FLAG]), Outcome::TestFailure);
    let report = scenario.evaluate(&harness).await?;
    reporter.artifacts().write_report(&report)?;

    let actual: Vec<Option<Outcome>> = report.results.iter().map(|result| result.actual).collect();
    assert_eq!(actual, [Some(Outcome::BuildFailure), Some(Outcome::TestFailure)]);
    assert!(report.is_success());
    let race_run = report.results[1].run.as_ref().expect("race run recorded");
    assert!(race_run.stdout.text().contains("WARNING: DATA RACE"));

    assert!(harness.teardown().failures.is_empty());
    assert!(is_empty_dir(&tool.runs_dir()));
    reporter.finish("pass", vec!["race flag turns a build failure into a test failure".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn race_flag_passes_once_race_is_removed() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("race_flag_passes_once_race_is_removed")?;
    let tool = StubTool::install("bazel", STUB_BAZEL)?;
    let harness = tool.harness(SUITE_TIMEOUT)?;

    let scenario = Scenario::new("race_fixed", race_free_workspace())
        .base_command(ToolConfig::default().base_command)
        .targets([RACE_TARGET])
        .expect(FlagConfiguration::new("race flag", [RACE_FLAG]), Outcome::Success);
    let report = scenario.evaluate(&harness).await?.into_result()?;
    reporter.artifacts().write_report(&report)?;

    assert_eq!(report.results[0].state, ExpectationState::Matched);
    reporter.finish("pass", vec!["race-free code passes under the race detector".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_expectation_reports_evidence() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("wrong_expectation_reports_evidence")?;
    let tool = StubTool::install("bazel", STUB_BAZEL)?;
    let harness = tool.harness(SUITE_TIMEOUT)?;

    let scenario = Scenario::new("race_misdeclared", race_workspace())
        .base_command(ToolConfig::default().base_command)
        .targets([RACE_TARGET])
        .expect(FlagConfiguration::new("race flag", [RACE_FLAG]), Outcome::Success);
    let failure = scenario.evaluate(&harness).await?.into_result().expect_err("must mismatch");
    reporter.artifacts().write_text("failure.txt", &failure.to_string())?;

    assert_eq!(failure.mismatches.len(), 1);
    let mismatch = &failure.mismatches[0];
    assert_eq!(mismatch.expected, Outcome::Success);
    assert_eq!(mismatch.actual, Outcome::TestFailure);
    assert!(mismatch.command_line.ends_with(&format!("test -s {RACE_FLAG} {RACE_TARGET}")));
    assert!(mismatch.stderr_tail.contains("FAIL: //:racy_test"));
    let rendered = failure.to_string();
    assert!(rendered.contains("expected: success, actual: test_failure"), "{rendered}");

    reporter.finish("pass", vec!["mismatch carries command line and output tails".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn scenario_file_drives_stub_tool() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("scenario_file_drives_stub_tool")?;
    let tool = StubTool::install("bazel", STUB_BAZEL)?;
    let harness = tool.harness(SUITE_TIMEOUT)?;

    let definition = format!(
        "name = \"race_from_file\"\ntargets = [\"{RACE_TARGET}\"]\nbundle = '''\n{}'''\n\n\
         [[expectations]]\nlabel = \"no race flag\"\noutcome = \"build_failure\"\n\n\
         [[expectations]]\nlabel = \"race flag\"\nflags = [\"{RACE_FLAG}\"]\noutcome = \"test_failure\"\n",
        render_bundle(&race_workspace())?
    );
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("race.scenario.toml");
    fs::write(&path, definition)?;
    let tool_config = ToolConfig {
        program: tool.path().display().to_string(),
        ..ToolConfig::default()
    };

    let scenario = load_scenario(&path, &tool_config)?;
    let report = scenario.evaluate(&harness).await?.into_result()?;
    reporter.artifacts().write_report(&report)?;
    assert_eq!(report.results.len(), 2);

    reporter.finish("pass", vec!["scenario file round-trips the fixture bundle".to_string()])?;
    Ok(())
}
