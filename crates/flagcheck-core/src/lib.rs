// crates/flagcheck-core/src/lib.rs
// ============================================================================
// Module: Flagcheck Core Library
// Description: Harness primitives for driving a black-box build tool.
// Purpose: Materialize workspaces, run tools, classify outcomes, and assert scenarios.
// Dependencies: tokio, tempfile, serde, thiserror, tracing
// ============================================================================

//! ## Overview
//! `flagcheck-core` verifies that a build tool's command-line flags produce
//! the expected change in build/test outcomes. A scenario materializes a
//! synthetic project into a disposable directory, invokes the tool once per
//! flag configuration, classifies each termination into an [`Outcome`], and
//! collects every mismatch into a single report.
//!
//! Data flows one way: [`HarnessLifecycle`] → [`WorkspaceSpec`] materialization
//! → [`ToolRunner`] → [`ExitCodePolicy::classify`] → [`ScenarioReport`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod bundle;
pub mod capture;
pub mod env_policy;
pub mod lifecycle;
pub mod outcome;
pub mod runner;
pub mod scenario;
pub mod workspace;

// ============================================================================
// SECTION: Tests
// ============================================================================


// ============================================================================
// SECTION: Re-exports
// ============================================================================

pub use bundle::BundleError;
pub use bundle::parse_bundle;
pub use bundle::render_bundle;
pub use capture::CapturedOutput;
pub use env_policy::EnvPolicy;
pub use lifecycle::HarnessLifecycle;
pub use lifecycle::LifecycleSettings;
pub use lifecycle::SetupError;
pub use lifecycle::TeardownReport;
pub use lifecycle::resolve_tool;
pub use outcome::ExitCodePolicy;
pub use outcome::Outcome;
pub use outcome::PolicyError;
pub use outcome::classify;
pub use runner::DEFAULT_GRACE_PERIOD;
pub use runner::DEFAULT_MAX_OUTPUT_BYTES;
pub use runner::DEFAULT_TIMEOUT;
pub use runner::ProcessRunner;
pub use runner::RunRequest;
pub use runner::RunResult;
pub use runner::RunnerError;
pub use runner::RunnerSettings;
pub use runner::Termination;
pub use runner::ToolRunner;
pub use scenario::AssertionMismatch;
pub use scenario::ExpectationSummary;
pub use scenario::ExpectationResult;
pub use scenario::ExpectationState;
pub use scenario::FlagConfiguration;
pub use scenario::Scenario;
pub use scenario::ScenarioError;
pub use scenario::ScenarioExpectation;
pub use scenario::ScenarioFailure;
pub use scenario::REPORT_TAIL_LINES;
pub use scenario::ScenarioReport;
pub use scenario::ScenarioSummary;
pub use workspace::WorkspaceError;
pub use workspace::WorkspaceHandle;
pub use workspace::WorkspaceSpec;
pub use workspace::materialize;
pub use workspace::materialize_in;
