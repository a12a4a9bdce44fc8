// crates/flagcheck-cli/src/logging.rs
// ============================================================================
// Module: CLI Logging
// Description: Tracing subscriber installation for the flagcheck binary.
// Purpose: Route library diagnostics to stderr under an env-driven filter.
// Dependencies: tracing-subscriber, flagcheck-config
// ============================================================================

//! ## Overview
//! Filter directives come from `FLAGCHECK_LOG`, then `RUST_LOG`, and default
//! to `warn`. Events go to stderr so stdout stays reserved for results.

use flagcheck_config::FlagcheckEnv;
use tracing_subscriber::EnvFilter;

/// Default filter when no directives are configured.
pub const DEFAULT_LOG_FILTER: &str = "warn";

/// Builds the filter from the environment.
#[must_use]
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(FlagcheckEnv::Log.as_str())
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber. Later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
