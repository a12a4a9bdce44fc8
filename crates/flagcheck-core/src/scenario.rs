// crates/flagcheck-core/src/scenario.rs
// ============================================================================
// Module: Scenario Engine
// Description: Runs one workspace under several flag configurations.
// Purpose: Compare classified outcomes with expectations and collect mismatches.
// Dependencies: serde, thiserror, tracing, crate::{lifecycle, outcome, runner, workspace}
// ============================================================================

//! ## Overview
//! A [`Scenario`] pairs a [`WorkspaceSpec`] with a list of
//! [`ScenarioExpectation`]s. Evaluation materializes the workspace once, then
//! for every expectation runs `base_command ++ flags ++ targets`, classifies
//! the result, and records whether it matched.
//!
//! Every expectation is evaluated even after a mismatch, so a single run
//! surfaces every failure. Runs are never retried: tool determinism is part of
//! what is being checked.
//!
//! Per-expectation state machine:
//! `Pending -> Running -> {Matched, Mismatched, Errored}`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::lifecycle::HarnessLifecycle;
use crate::outcome::ExitCodePolicy;
use crate::outcome::Outcome;
use crate::runner::RunRequest;
use crate::runner::RunResult;
use crate::runner::RunnerError;
use crate::runner::Termination;
use crate::runner::ToolRunner;
use crate::workspace::WorkspaceError;
use crate::workspace::WorkspaceHandle;
use crate::workspace::WorkspaceSpec;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Number of trailing output lines included in failure reports.
pub const REPORT_TAIL_LINES: usize = 40;

// ============================================================================
// SECTION: Flag Configurations
// ============================================================================

/// A labelled set of flags passed to the tool for one run.
///
/// # Invariants
/// - Equality of configurations is set equality of their flags; order and
///   repetition are irrelevant.
/// - Flags are appended to the command line in the order given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlagConfiguration {
    /// Human-readable label.
    label: String,
    /// Flags in command-line order.
    flags: Vec<String>,
}

impl FlagConfiguration {
    /// Creates a configuration from a label and flags.
    #[must_use]
    pub fn new<I, S>(label: impl Into<String>, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            label: label.into(),
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a configuration without flags.
    #[must_use]
    pub fn baseline(label: impl Into<String>) -> Self {
        Self::new(label, Vec::<String>::new())
    }

    /// Returns the label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the flags in command-line order.
    #[must_use]
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Returns true when both configurations enable the same flag set.
    #[must_use]
    pub fn same_flags(&self, other: &Self) -> bool {
        self.flag_set() == other.flag_set()
    }

    /// Returns the flags as a set.
    fn flag_set(&self) -> BTreeSet<&str> {
        self.flags.iter().map(String::as_str).collect()
    }
}

impl fmt::Display for FlagConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.flags.is_empty() {
            write!(f, "{} (no flags)", self.label)
        } else {
            write!(f, "{} [{}]", self.label, self.flags.join(" "))
        }
    }
}

/// Expected outcome for one flag configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioExpectation {
    /// Configuration under test.
    pub configuration: FlagConfiguration,
    /// Outcome the tool must produce.
    pub expected: Outcome,
}

impl ScenarioExpectation {
    /// Creates an expectation.
    #[must_use]
    pub const fn new(configuration: FlagConfiguration, expected: Outcome) -> Self {
        Self {
            configuration,
            expected,
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Scenario-level failures that prevent evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScenarioError {
    /// The scenario has no expectations to evaluate.
    #[error("scenario `{0}` has no expectations")]
    NoExpectations(String),
    /// Two expectations cover the same flag configuration.
    #[error("scenario `{scenario}`: expectations `{first}` and `{second}` use the same flags")]
    DuplicateConfiguration {
        /// Scenario name.
        scenario: String,
        /// Label of the first expectation.
        first: String,
        /// Label of the conflicting expectation.
        second: String,
    },
    /// The shared workspace could not be materialized.
    #[error("scenario `{scenario}`: {source}")]
    Workspace {
        /// Scenario name.
        scenario: String,
        /// Underlying workspace failure.
        #[source]
        source: WorkspaceError,
    },
}

/// Expected outcome differed from the classified outcome.
///
/// Carries the raw evidence needed to debug the classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssertionMismatch {
    /// Configuration under test.
    pub configuration: FlagConfiguration,
    /// Expected outcome.
    pub expected: Outcome,
    /// Classified outcome.
    pub actual: Outcome,
    /// Full command line.
    pub command_line: String,
    /// Raw termination descriptor.
    pub termination: Termination,
    /// Tail of captured stdout.
    pub stdout_tail: String,
    /// Tail of captured stderr.
    pub stderr_tail: String,
}

impl fmt::Display for AssertionMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "configuration: {}", self.configuration)?;
        writeln!(f, "expected: {}, actual: {}", self.expected, self.actual)?;
        writeln!(f, "command: {}", self.command_line)?;
        writeln!(f, "termination: {}", self.termination)?;
        writeln!(f, "--- stdout (tail) ---")?;
        write_block(f, &self.stdout_tail)?;
        writeln!(f, "--- stderr (tail) ---")?;
        write_block(f, &self.stderr_tail)
    }
}

/// Writes a captured block, marking empty output explicitly.
fn write_block(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    if text.is_empty() {
        writeln!(f, "<empty>")
    } else if text.ends_with('\n') {
        f.write_str(text)
    } else {
        writeln!(f, "{text}")
    }
}

// ============================================================================
// SECTION: Evaluation State
// ============================================================================

/// Lifecycle state of one expectation evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpectationState {
    /// Not yet started.
    Pending,
    /// Tool run in progress.
    Running,
    /// Classified outcome equals the expectation.
    Matched,
    /// Classified outcome differs from the expectation.
    Mismatched,
    /// The tool could not be launched.
    Errored,
}

impl ExpectationState {
    /// Returns a stable label for the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Matched => "matched",
            Self::Mismatched => "mismatched",
            Self::Errored => "errored",
        }
    }

    /// Returns true for terminal states.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Matched | Self::Mismatched | Self::Errored)
    }

    /// Returns true when `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Matched | Self::Mismatched | Self::Errored)
        )
    }
}

impl fmt::Display for ExpectationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation record for one expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectationResult {
    /// Expectation being evaluated.
    pub expectation: ScenarioExpectation,
    /// Full command line.
    pub command_line: String,
    /// Current state.
    pub state: ExpectationState,
    /// Classified outcome, once the tool ran.
    pub actual: Option<Outcome>,
    /// Raw run result, once the tool ran.
    pub run: Option<RunResult>,
    /// Mismatch details, when the state is `Mismatched`.
    pub mismatch: Option<AssertionMismatch>,
    /// Launch failure, when the state is `Errored`.
    pub error: Option<RunnerError>,
}

impl ExpectationResult {
    /// Creates a pending record.
    fn pending(expectation: ScenarioExpectation, command_line: String) -> Self {
        Self {
            expectation,
            command_line,
            state: ExpectationState::Pending,
            actual: None,
            run: None,
            mismatch: None,
            error: None,
        }
    }

    /// Moves to `next`, ignoring illegal transitions.
    fn transition(&mut self, next: ExpectationState) {
        if self.state.can_transition_to(next) {
            tracing::trace!(
                configuration = %self.expectation.configuration,
                from = %self.state,
                to = %next,
                "expectation state"
            );
            self.state = next;
        } else {
            tracing::warn!(from = %self.state, to = %next, "ignored illegal expectation transition");
        }
    }

    /// Records a completed run.
    fn complete(&mut self, run: RunResult, actual: Outcome) {
        let expected = self.expectation.expected;
        if actual == expected {
            self.transition(ExpectationState::Matched);
        } else {
            self.mismatch = Some(AssertionMismatch {
                configuration: self.expectation.configuration.clone(),
                expected,
                actual,
                command_line: self.command_line.clone(),
                termination: run.termination,
                stdout_tail: run.stdout.tail_lines(REPORT_TAIL_LINES),
                stderr_tail: run.stderr.tail_lines(REPORT_TAIL_LINES),
            });
            self.transition(ExpectationState::Mismatched);
        }
        self.actual = Some(actual);
        self.run = Some(run);
    }

    /// Records a launch failure.
    fn fail(&mut self, error: RunnerError) {
        self.error = Some(error);
        self.transition(ExpectationState::Errored);
    }
}

// ============================================================================
// SECTION: Reports
// ============================================================================

/// Aggregated results of one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioReport {
    /// Scenario name.
    pub scenario: String,
    /// Per-expectation results, in declaration order.
    pub results: Vec<ExpectationResult>,
}

impl ScenarioReport {
    /// Iterates mismatches.
    pub fn mismatches(&self) -> impl Iterator<Item = &AssertionMismatch> {
        self.results.iter().filter_map(|result| result.mismatch.as_ref())
    }

    /// Iterates expectations whose tool could not be launched.
    pub fn errors(&self) -> impl Iterator<Item = (&FlagConfiguration, &RunnerError)> {
        self.results.iter().filter_map(|result| {
            result.error.as_ref().map(|error| (&result.expectation.configuration, error))
        })
    }

    /// Returns true when every expectation matched.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|result| result.state == ExpectationState::Matched)
    }

    /// Converts the report into a result that fails on any mismatch or error.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioFailure`] listing every mismatch and launch error.
    pub fn into_result(self) -> Result<Self, ScenarioFailure> {
        if self.is_success() {
            return Ok(self);
        }
        Err(ScenarioFailure {
            scenario: self.scenario.clone(),
            mismatches: self.mismatches().cloned().collect(),
            errors: self
                .errors()
                .map(|(configuration, error)| (configuration.clone(), error.clone()))
                .collect(),
        })
    }

    /// Builds a serializable summary.
    #[must_use]
    pub fn summary(&self) -> ScenarioSummary {
        ScenarioSummary {
            scenario: self.scenario.clone(),
            passed: self.is_success(),
            expectations: self.results.iter().map(ExpectationSummary::from_result).collect(),
        }
    }
}

/// Serializable view of a [`ScenarioReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioSummary {
    /// Scenario name.
    pub scenario: String,
    /// True when every expectation matched.
    pub passed: bool,
    /// Per-expectation summaries.
    pub expectations: Vec<ExpectationSummary>,
}

/// Serializable view of an [`ExpectationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExpectationSummary {
    /// Configuration label.
    pub label: String,
    /// Flags passed.
    pub flags: Vec<String>,
    /// Expected outcome.
    pub expected: Outcome,
    /// Classified outcome.
    pub actual: Option<Outcome>,
    /// Final state.
    pub state: ExpectationState,
    /// Full command line.
    pub command_line: String,
    /// Raw termination descriptor.
    pub termination: Option<Termination>,
    /// Elapsed run time in milliseconds.
    pub elapsed_ms: Option<u64>,
    /// Launch error message.
    pub error: Option<String>,
    /// Tail of stdout for non-matching expectations.
    pub stdout_tail: Option<String>,
    /// Tail of stderr for non-matching expectations.
    pub stderr_tail: Option<String>,
}

impl ExpectationSummary {
    /// Summarizes one expectation result.
    fn from_result(result: &ExpectationResult) -> Self {
        let show_output = result.state != ExpectationState::Matched;
        Self {
            label: result.expectation.configuration.label().to_string(),
            flags: result.expectation.configuration.flags().to_vec(),
            expected: result.expectation.expected,
            actual: result.actual,
            state: result.state,
            command_line: result.command_line.clone(),
            termination: result.run.as_ref().map(|run| run.termination),
            elapsed_ms: result
                .run
                .as_ref()
                .map(|run| u64::try_from(run.elapsed.as_millis()).unwrap_or(u64::MAX)),
            error: result.error.as_ref().map(ToString::to_string),
            stdout_tail: result
                .run
                .as_ref()
                .filter(|_| show_output)
                .map(|run| run.stdout.tail_lines(REPORT_TAIL_LINES)),
            stderr_tail: result
                .run
                .as_ref()
                .filter(|_| show_output)
                .map(|run| run.stderr.tail_lines(REPORT_TAIL_LINES)),
        }
    }
}

/// A scenario with at least one mismatch or launch error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioFailure {
    /// Scenario name.
    pub scenario: String,
    /// Every mismatch, in declaration order.
    pub mismatches: Vec<AssertionMismatch>,
    /// Every launch error, in declaration order.
    pub errors: Vec<(FlagConfiguration, RunnerError)>,
}

impl fmt::Display for ScenarioFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "scenario `{}` failed: {} mismatch(es), {} error(s)",
            self.scenario,
            self.mismatches.len(),
            self.errors.len()
        )?;
        for (index, mismatch) in self.mismatches.iter().enumerate() {
            write!(f, "\n[mismatch {}]\n{mismatch}", index + 1)?;
        }
        for (configuration, error) in &self.errors {
            write!(f, "\n[error] configuration: {configuration}\n{error}\n")?;
        }
        Ok(())
    }
}

impl std::error::Error for ScenarioFailure {}

// ============================================================================
// SECTION: Scenario
// ============================================================================

/// One workspace exercised under several flag configurations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    /// Scenario name.
    name: String,
    /// Fixture project.
    workspace: WorkspaceSpec,
    /// Arguments preceding the flags.
    base_command: Vec<String>,
    /// Arguments following the flags.
    targets: Vec<String>,
    /// Expectations in evaluation order.
    expectations: Vec<ScenarioExpectation>,
    /// Per-run timeout override.
    timeout: Option<Duration>,
}

impl Scenario {
    /// Creates a scenario with no expectations.
    #[must_use]
    pub fn new(name: impl Into<String>, workspace: WorkspaceSpec) -> Self {
        Self {
            name: name.into(),
            workspace,
            base_command: Vec::new(),
            targets: Vec::new(),
            expectations: Vec::new(),
            timeout: None,
        }
    }

    /// Sets the fixed base command.
    #[must_use]
    pub fn base_command<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_command = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the arguments appended after the flags.
    #[must_use]
    pub fn targets<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.targets = args.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-run timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds an expectation.
    #[must_use]
    pub fn expect(mut self, configuration: FlagConfiguration, expected: Outcome) -> Self {
        self.expectations.push(ScenarioExpectation::new(configuration, expected));
        self
    }

    /// Returns the scenario name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the fixture workspace.
    #[must_use]
    pub const fn workspace(&self) -> &WorkspaceSpec {
        &self.workspace
    }

    /// Returns the per-run timeout override, if set.
    #[must_use]
    pub const fn run_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Returns the expectations.
    #[must_use]
    pub fn expectations(&self) -> &[ScenarioExpectation] {
        &self.expectations
    }

    /// Returns the full argument list for a configuration.
    #[must_use]
    pub fn arguments_for(&self, configuration: &FlagConfiguration) -> Vec<String> {
        self.base_command
            .iter()
            .chain(configuration.flags())
            .chain(&self.targets)
            .cloned()
            .collect()
    }

    /// Checks that the scenario can be evaluated.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] when there are no expectations or two
    /// expectations share a flag configuration.
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.expectations.is_empty() {
            return Err(ScenarioError::NoExpectations(self.name.clone()));
        }
        for (index, expectation) in self.expectations.iter().enumerate() {
            let configuration = &expectation.configuration;
            if let Some(earlier) = self.expectations[.. index]
                .iter()
                .find(|earlier| earlier.configuration.same_flags(configuration))
            {
                return Err(ScenarioError::DuplicateConfiguration {
                    scenario: self.name.clone(),
                    first: earlier.configuration.label().to_string(),
                    second: configuration.label().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Evaluates the scenario with the harness's process runner.
    ///
    /// # Errors
    ///
    /// Returns [`ScenarioError`] when the scenario is invalid or its workspace
    /// cannot be materialized. Mismatches are reported in the
    /// [`ScenarioReport`], not as errors.
    pub async fn evaluate(&self, harness: &HarnessLifecycle) -> Result<ScenarioReport, ScenarioError> {
        self.evaluate_with(harness, harness.runner()).await
    }

    /// Evaluates the scenario with a caller-supplied runner.
    ///
    /// # Errors
    ///
    /// See [`Scenario::evaluate`].
    pub async fn evaluate_with<R>(
        &self,
        harness: &HarnessLifecycle,
        runner: &R,
    ) -> Result<ScenarioReport, ScenarioError>
    where
        R: ToolRunner + ?Sized,
    {
        self.validate()?;
        let workspace =
            harness.materialize(&self.workspace).map_err(|source| ScenarioError::Workspace {
                scenario: self.name.clone(),
                source,
            })?;
        let report =
            self.run_in(harness.tool_path(), &workspace, runner, harness.policy()).await;
        if let Err(err) = workspace.close() {
            tracing::warn!(scenario = %self.name, error = %err, "workspace cleanup failed");
        }
        Ok(report)
    }

    /// Runs every expectation against an already materialized workspace.
    ///
    /// Does not validate; callers going through [`Scenario::evaluate`] get
    /// validation for free.
    pub async fn run_in<R>(
        &self,
        tool: &Path,
        workspace: &WorkspaceHandle,
        runner: &R,
        policy: &ExitCodePolicy,
    ) -> ScenarioReport
    where
        R: ToolRunner + ?Sized,
    {
        let mut results = Vec::with_capacity(self.expectations.len());
        for expectation in &self.expectations {
            let request = self.request_for(tool, workspace.root(), &expectation.configuration);
            let mut result = ExpectationResult::pending(expectation.clone(), request.command_line());
            result.transition(ExpectationState::Running);
            match runner.run(&request).await {
                Ok(run) => {
                    let actual = policy.classify(&run);
                    result.complete(run, actual);
                }
                Err(error) => result.fail(error),
            }
            tracing::info!(
                scenario = %self.name,
                configuration = %expectation.configuration,
                expected = %expectation.expected,
                actual = %result.actual.map_or("none", Outcome::as_str),
                state = %result.state,
                "expectation evaluated"
            );
            results.push(result);
        }
        ScenarioReport {
            scenario: self.name.clone(),
            results,
        }
    }

    /// Builds the run request for one configuration.
    fn request_for(
        &self,
        tool: &Path,
        root: &Path,
        configuration: &FlagConfiguration,
    ) -> RunRequest {
        let request = RunRequest::new(PathBuf::from(tool), root).args(self.arguments_for(configuration));
        match self.timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }
}
