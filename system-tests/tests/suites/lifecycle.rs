// system-tests/tests/suites/lifecycle.rs
// ============================================================================
// Module: Lifecycle Tests
// Description: Harness setup, workspace isolation and teardown checks.
// Purpose: Validate that runs leave no directories or env changes behind.
// Dependencies: system-tests helpers, flagcheck-core, tokio
// ============================================================================

//! ## Overview
//! Invariants:
//! - Concurrent scenarios never share a workspace root.
//! - Teardown removes the run root and restores the process environment.
//! - Teardown is idempotent.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use flagcheck_core::FlagConfiguration;
use flagcheck_core::HarnessLifecycle;
use flagcheck_core::Outcome;
use flagcheck_core::Scenario;
use flagcheck_core::WorkspaceSpec;
use helpers::artifacts::TestReporter;
use helpers::harness::StubTool;
use helpers::harness::is_empty_dir;
use tokio::task::JoinSet;

use crate::helpers;

/// Prints the working directory and the marker file it was given.
const PWD_TOOL: &str = "pwd\ncat marker.txt\n";

/// Set on the harness process for the duration of one test.
const MARKER_VAR: &str = "FLAGCHECK_SYSTEM_TEST_LIFECYCLE_MARKER";

fn marker_workspace(index: usize) -> WorkspaceSpec {
    WorkspaceSpec::from_entries([("marker.txt", format!("scenario-{index}\n"))])
        .expect("valid workspace")
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_scenarios_use_distinct_workspaces() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("concurrent_scenarios_use_distinct_workspaces")?;
    let tool = StubTool::install("bazel", PWD_TOOL)?;
    let harness = Arc::new(tool.harness(Duration::from_secs(30))?);

    let mut tasks = JoinSet::new();
    for index in 0 .. 8 {
        let harness = Arc::clone(&harness);
        tasks.spawn(async move {
            let scenario = Scenario::new(format!("isolated-{index}"), marker_workspace(index))
                .expect(FlagConfiguration::baseline("plain"), Outcome::Success);
            (index, scenario.evaluate(&harness).await)
        });
    }

    let mut roots = BTreeSet::new();
    while let Some(joined) = tasks.join_next().await {
        let (index, report) = joined?;
        let report = report?.into_result()?;
        let stdout = report.results[0].run.as_ref().expect("run recorded").stdout.text();
        let mut lines = stdout.lines();
        let root = lines.next().expect("pwd line").to_string();
        assert_eq!(lines.next(), Some(format!("scenario-{index}").as_str()));
        assert!(roots.insert(root), "workspace root reused");
    }
    assert_eq!(roots.len(), 8);
    assert_eq!(harness.live_workspaces(), 0);

    let report = harness.teardown();
    assert!(report.failures.is_empty());
    assert!(report.removed_workspaces.is_empty());
    assert!(is_empty_dir(&tool.runs_dir()));
    reporter.artifacts().write_json("workspace_roots.json", &roots)?;
    reporter.finish("pass", vec!["eight concurrent scenarios used eight roots".to_string()])?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn teardown_restores_env_and_is_idempotent() -> Result<(), Box<dyn std::error::Error>> {
    let mut reporter = TestReporter::new("teardown_restores_env_and_is_idempotent")?;
    let tool = StubTool::install("bazel", PWD_TOOL)?;
    let mut settings = tool.settings(Duration::from_secs(30))?;
    settings.process_env = BTreeMap::from([(MARKER_VAR.to_string(), "active".to_string())]);
    assert!(std::env::var_os(MARKER_VAR).is_none());

    let harness = HarnessLifecycle::setup(settings)?;
    assert_eq!(std::env::var(MARKER_VAR).as_deref(), Ok("active"));
    let run_root = harness.run_root().to_path_buf();
    assert!(run_root.starts_with(tool.runs_dir().canonicalize()?));

    let leaked = harness.materialize(&marker_workspace(0))?;
    let leaked_root = leaked.root().to_path_buf();
    let _leaked = std::mem::ManuallyDrop::new(leaked);

    let first = harness.teardown();
    assert_eq!(first.removed_workspaces, [leaked_root.clone()]);
    assert_eq!(first.restored_env, [MARKER_VAR.to_string()]);
    assert!(std::env::var_os(MARKER_VAR).is_none());
    assert!(!run_root.exists());
    assert!(!leaked_root.exists());

    assert_eq!(harness.teardown(), flagcheck_core::TeardownReport::default());
    assert!(harness.is_torn_down());
    assert!(harness.materialize(&marker_workspace(1)).is_err());

    reporter.finish("pass", vec!["teardown removed leaked workspace and restored env".to_string()])?;
    Ok(())
}
