// crates/flagcheck-core/src/outcome.rs
// ============================================================================
// Module: Outcome Classifier
// Description: Total mapping from tool terminations to semantic outcomes.
// Purpose: Keep exit-code interpretation as configuration data.
// Dependencies: serde, thiserror, crate::runner
// ============================================================================

//! ## Overview
//! Build tools signal "build failed" and "tests failed" through documented
//! exit codes. [`ExitCodePolicy`] holds those codes as data so the same
//! harness can target different tools or tool versions; call sites never
//! branch on raw exit codes.
//!
//! Classification is pure and total:
//! - exit 0 → [`Outcome::Success`]
//! - a configured build-failed code → [`Outcome::BuildFailure`]
//! - a configured tests-failed code → [`Outcome::TestFailure`]
//! - any other code or a signal → [`Outcome::ToolCrash`]
//! - a timeout → [`Outcome::Timeout`]

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::runner::RunResult;
use crate::runner::Termination;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bazel's documented exit code for a failed build.
pub const BAZEL_BUILD_FAILURE: i32 = 1;
/// Bazel's documented exit code for failed tests.
pub const BAZEL_TESTS_FAILED: i32 = 3;

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Semantic classification of a tool run.
///
/// # Invariants
/// - Closed set; labels are stable for reports and configuration.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The tool exited with code 0.
    Success,
    /// The tool reported a build failure.
    BuildFailure,
    /// The tool built successfully but tests failed.
    TestFailure,
    /// Unknown exit code or termination by signal.
    ToolCrash,
    /// The harness killed the tool after its timeout elapsed.
    Timeout,
}

impl Outcome {
    /// Every outcome, in declaration order.
    pub const ALL: [Self; 5] =
        [Self::Success, Self::BuildFailure, Self::TestFailure, Self::ToolCrash, Self::Timeout];

    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::BuildFailure => "build_failure",
            Self::TestFailure => "test_failure",
            Self::ToolCrash => "tool_crash",
            Self::Timeout => "timeout",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// SECTION: Exit Code Policy
// ============================================================================

/// Invalid exit code policy definitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// Exit code 0 always means success and cannot be remapped.
    #[error("exit code 0 cannot be mapped to {0}")]
    ZeroCode(Outcome),
    /// A code was listed for both build and test failures.
    #[error("exit code {0} is mapped to both build_failure and test_failure")]
    Conflict(i32),
    /// A category has no codes.
    #[error("no exit codes configured for {0}")]
    EmptyCategory(Outcome),
}

/// Tool-specific exit code contract.
///
/// # Invariants
/// - Only [`Outcome::BuildFailure`] and [`Outcome::TestFailure`] appear as values.
/// - Code 0 is never present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitCodePolicy {
    /// Documented failure codes and their outcomes.
    codes: BTreeMap<i32, Outcome>,
}

impl Default for ExitCodePolicy {
    fn default() -> Self {
        Self::bazel()
    }
}

impl ExitCodePolicy {
    /// Builds a policy from the tool's documented failure codes.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError`] when a category is empty, a code is 0, or a
    /// code appears in both categories.
    pub fn new(
        build_failed: impl IntoIterator<Item = i32>,
        tests_failed: impl IntoIterator<Item = i32>,
    ) -> Result<Self, PolicyError> {
        let mut codes = BTreeMap::new();
        for (outcome, category) in [
            (Outcome::BuildFailure, build_failed.into_iter().collect::<Vec<_>>()),
            (Outcome::TestFailure, tests_failed.into_iter().collect::<Vec<_>>()),
        ] {
            if category.is_empty() {
                return Err(PolicyError::EmptyCategory(outcome));
            }
            for code in category {
                if code == 0 {
                    return Err(PolicyError::ZeroCode(outcome));
                }
                match codes.insert(code, outcome) {
                    Some(previous) if previous != outcome => {
                        return Err(PolicyError::Conflict(code));
                    }
                    _ => {}
                }
            }
        }
        Ok(Self {
            codes,
        })
    }

    /// Bazel's exit code contract.
    #[must_use]
    pub fn bazel() -> Self {
        Self {
            codes: BTreeMap::from([
                (BAZEL_BUILD_FAILURE, Outcome::BuildFailure),
                (BAZEL_TESTS_FAILED, Outcome::TestFailure),
            ]),
        }
    }

    /// Returns the codes mapped to `outcome`.
    pub fn codes_for(&self, outcome: Outcome) -> impl Iterator<Item = i32> + '_ {
        self.codes.iter().filter(move |(_, mapped)| **mapped == outcome).map(|(code, _)| *code)
    }

    /// Classifies a plain exit code.
    #[must_use]
    pub fn outcome_for_code(&self, code: i32) -> Outcome {
        if code == 0 {
            return Outcome::Success;
        }
        self.codes.get(&code).copied().unwrap_or(Outcome::ToolCrash)
    }

    /// Classifies a raw termination descriptor.
    #[must_use]
    pub fn classify_termination(&self, termination: &Termination) -> Outcome {
        match termination {
            Termination::Exited(code) => self.outcome_for_code(*code),
            Termination::Signaled(_) => Outcome::ToolCrash,
            Termination::TimedOut => Outcome::Timeout,
        }
    }

    /// Classifies a run result.
    #[must_use]
    pub fn classify(&self, result: &RunResult) -> Outcome {
        self.classify_termination(&result.termination)
    }
}

/// Classifies `result` under `policy`.
#[must_use]
pub fn classify(policy: &ExitCodePolicy, result: &RunResult) -> Outcome {
    policy.classify(result)
}
