// crates/flagcheck-config/src/lib.rs
// ============================================================================
// Module: Flagcheck Config Library
// Description: Harness configuration, environment overrides, and scenario files.
// Purpose: Single source of truth for flagcheck.toml and *.scenario.toml semantics.
// Dependencies: flagcheck-core, serde, toml
// ============================================================================

//! ## Overview
//! `flagcheck-config` turns on-disk TOML into the typed inputs of
//! `flagcheck-core`: [`HarnessConfig`] becomes a
//! [`flagcheck_core::LifecycleSettings`], and each [`ScenarioFile`] becomes a
//! [`flagcheck_core::Scenario`]. Loading fails closed: unknown fields,
//! oversized files, invalid UTF-8, and out-of-range values are all rejected.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod env;
pub mod scenario_file;


// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use env::EnvOverrides;
pub use env::FlagcheckEnv;
pub use scenario_file::ExpectationEntry;
pub use scenario_file::FileEntry;
pub use scenario_file::SCENARIO_FILE_SUFFIX;
pub use scenario_file::ScenarioFile;
pub use scenario_file::load_scenario;
