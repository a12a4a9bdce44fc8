// crates/flagcheck-cli/src/execute.rs
// ============================================================================
// Module: Scenario Execution
// Description: Bounded-concurrency evaluation of many scenarios.
// Purpose: Run independent scenarios in parallel under one harness lifecycle.
// Dependencies: flagcheck-core, tokio
// ============================================================================

//! ## Overview
//! Each scenario is evaluated on its own tokio task; a semaphore caps how many
//! run at once. Scenarios share the harness (tool path, policy, run root) but
//! never a workspace. Results come back in input order regardless of
//! completion order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::num::NonZeroUsize;
use std::sync::Arc;

use flagcheck_core::HarnessLifecycle;
use flagcheck_core::Scenario;
use flagcheck_core::ScenarioReport;
use flagcheck_core::ToolRunner;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Result of evaluating one scenario.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    /// The scenario ran; its report may still contain mismatches.
    Evaluated(ScenarioReport),
    /// The scenario could not be evaluated at all.
    Failed {
        /// Scenario name.
        scenario: String,
        /// Why evaluation failed.
        message: String,
    },
}

impl ScenarioOutcome {
    /// Returns the scenario name.
    #[must_use]
    pub fn scenario(&self) -> &str {
        match self {
            Self::Evaluated(report) => &report.scenario,
            Self::Failed {
                scenario, ..
            } => scenario,
        }
    }

    /// Returns true when every expectation matched.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Evaluated(report) if report.is_success())
    }
}

// ============================================================================
// SECTION: Execution
// ============================================================================

/// Evaluates `scenarios` with at most `jobs` running concurrently.
pub async fn run_scenarios(
    harness: Arc<HarnessLifecycle>,
    runner: Arc<dyn ToolRunner>,
    scenarios: Vec<Scenario>,
    jobs: NonZeroUsize,
) -> Vec<ScenarioOutcome> {
    let names: Vec<String> = scenarios.iter().map(|s| s.name().to_string()).collect();
    let semaphore = Arc::new(Semaphore::new(jobs.get()));
    let mut tasks = JoinSet::new();

    for (index, scenario) in scenarios.into_iter().enumerate() {
        let harness = Arc::clone(&harness);
        let runner = Arc::clone(&runner);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let outcome = match semaphore.acquire_owned().await {
                Ok(_permit) => evaluate_one(&harness, runner.as_ref(), &scenario).await,
                Err(err) => ScenarioOutcome::Failed {
                    scenario: scenario.name().to_string(),
                    message: err.to_string(),
                },
            };
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<ScenarioOutcome>> = vec![None; names.len()];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                if let Some(slot) = slots.get_mut(index) {
                    *slot = Some(outcome);
                }
            }
            Err(err) => tracing::error!(error = %err, "scenario task failed"),
        }
    }

    slots
        .into_iter()
        .zip(names)
        .map(|(slot, scenario)| {
            slot.unwrap_or_else(|| ScenarioOutcome::Failed {
                scenario,
                message: "scenario task did not complete".to_string(),
            })
        })
        .collect()
}

/// Evaluates one scenario and folds scenario errors into the outcome.
async fn evaluate_one(
    harness: &HarnessLifecycle,
    runner: &dyn ToolRunner,
    scenario: &Scenario,
) -> ScenarioOutcome {
    tracing::info!(scenario = %scenario.name(), "evaluating scenario");
    match scenario.evaluate_with(harness, runner).await {
        Ok(report) => ScenarioOutcome::Evaluated(report),
        Err(err) => {
            tracing::warn!(scenario = %scenario.name(), error = %err, "scenario could not run");
            ScenarioOutcome::Failed {
                scenario: scenario.name().to_string(),
                message: err.to_string(),
            }
        }
    }
}
