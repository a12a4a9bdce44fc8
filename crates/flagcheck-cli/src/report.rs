// crates/flagcheck-cli/src/report.rs
// ============================================================================
// Module: Run Reports
// Description: Aggregated results of a flagcheck run.
// Purpose: Emit canonical JSON and human-readable summaries.
// Dependencies: flagcheck-core, serde, serde_jcs, thiserror
// ============================================================================

//! ## Overview
//! [`RunReport`] folds every [`ScenarioOutcome`] of a run into one document.
//! The JSON form is canonicalized with `serde_jcs` so reports from identical
//! runs compare byte-for-byte (elapsed times aside).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use flagcheck_core::ExpectationState;
use flagcheck_core::ExpectationSummary;
use serde::Serialize;
use thiserror::Error;

use crate::execute::ScenarioOutcome;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Process exit code when every expectation matched.
pub const EXIT_PASSED: u8 = 0;
/// Process exit code when any expectation mismatched or errored.
pub const EXIT_FAILED: u8 = 1;
/// Process exit code for setup or configuration errors.
pub const EXIT_SETUP_ERROR: u8 = 2;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Report serialization or output failures.
#[derive(Debug, Error)]
pub enum ReportError {
    /// JSON serialization failed.
    #[error("failed to serialize report: {0}")]
    Serialize(String),
    /// Writing the report failed.
    #[error("failed to write report {path}: {message}")]
    Io {
        /// Destination path.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Report Types
// ============================================================================

/// Summary of one scenario within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScenarioEntry {
    /// Scenario name.
    pub scenario: String,
    /// True when every expectation matched.
    pub passed: bool,
    /// Why the scenario could not be evaluated, if it could not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Per-expectation summaries.
    pub expectations: Vec<ExpectationSummary>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Resolved tool path.
    pub tool: String,
    /// True when every scenario passed.
    pub passed: bool,
    /// Number of scenarios.
    pub scenarios_total: usize,
    /// Number of scenarios that did not pass.
    pub scenarios_failed: usize,
    /// Scenario entries in input order.
    pub scenarios: Vec<ScenarioEntry>,
}

impl RunReport {
    /// Builds a report from scenario outcomes.
    #[must_use]
    pub fn from_outcomes(tool: &Path, outcomes: &[ScenarioOutcome]) -> Self {
        let scenarios: Vec<ScenarioEntry> = outcomes
            .iter()
            .map(|outcome| match outcome {
                ScenarioOutcome::Evaluated(report) => {
                    let summary = report.summary();
                    ScenarioEntry {
                        scenario: summary.scenario,
                        passed: summary.passed,
                        error: None,
                        expectations: summary.expectations,
                    }
                }
                ScenarioOutcome::Failed {
                    scenario,
                    message,
                } => ScenarioEntry {
                    scenario: scenario.clone(),
                    passed: false,
                    error: Some(message.clone()),
                    expectations: Vec::new(),
                },
            })
            .collect();
        let scenarios_failed = scenarios.iter().filter(|entry| !entry.passed).count();
        Self {
            tool: tool.display().to_string(),
            passed: scenarios_failed == 0,
            scenarios_total: scenarios.len(),
            scenarios_failed,
            scenarios,
        }
    }

    /// Returns the process exit code for this run.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        if self.passed { EXIT_PASSED } else { EXIT_FAILED }
    }

    /// Serializes the report as canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::Serialize`] when serialization fails.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>, ReportError> {
        serde_jcs::to_vec(self).map_err(|err| ReportError::Serialize(err.to_string()))
    }

    /// Writes canonical JSON to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when serialization or the write fails.
    pub fn write_json(&self, path: &Path) -> Result<(), ReportError> {
        let bytes = self.to_canonical_json()?;
        fs::write(path, bytes).map_err(|err| ReportError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })
    }

    /// Renders a human-readable summary.
    #[must_use]
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        for entry in &self.scenarios {
            render_entry(&mut out, entry);
        }
        let _ = writeln!(
            out,
            "{} of {} scenario(s) passed",
            self.scenarios_total - self.scenarios_failed,
            self.scenarios_total
        );
        out
    }
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders one scenario entry.
fn render_entry(out: &mut String, entry: &ScenarioEntry) {
    let status = if entry.passed { "PASS" } else { "FAIL" };
    if let Some(error) = &entry.error {
        let _ = writeln!(out, "{status} {}: {error}", entry.scenario);
        return;
    }
    let matched = entry
        .expectations
        .iter()
        .filter(|expectation| expectation.state == ExpectationState::Matched)
        .count();
    let _ = writeln!(
        out,
        "{status} {} ({matched}/{} expectations matched)",
        entry.scenario,
        entry.expectations.len()
    );
    for expectation in entry.expectations.iter().filter(|e| e.state != ExpectationState::Matched) {
        render_expectation(out, expectation);
    }
}

/// Renders a non-matching expectation with its evidence.
fn render_expectation(out: &mut String, expectation: &ExpectationSummary) {
    let flags = if expectation.flags.is_empty() {
        "no flags".to_string()
    } else {
        expectation.flags.join(" ")
    };
    let actual = expectation.actual.map_or("none", |outcome| outcome.as_str());
    let _ = writeln!(
        out,
        "  - {} [{flags}]: expected {}, actual {actual}",
        expectation.label, expectation.expected
    );
    let _ = writeln!(out, "    command: {}", expectation.command_line);
    if let Some(termination) = &expectation.termination {
        let _ = writeln!(out, "    termination: {termination}");
    }
    if let Some(error) = &expectation.error {
        let _ = writeln!(out, "    error: {error}");
    }
    for (label, tail) in [("stdout", &expectation.stdout_tail), ("stderr", &expectation.stderr_tail)] {
        if let Some(tail) = tail.as_deref().filter(|tail| !tail.is_empty()) {
            let _ = writeln!(out, "    --- {label} (tail) ---");
            for line in tail.lines() {
                let _ = writeln!(out, "    {line}");
            }
        }
    }
}
