// system-tests/src/config/env.rs
// ============================================================================
// Module: System Test Environment
// Description: Environment-backed configuration for system tests.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement. Invalid UTF-8
//! or empty values fail closed rather than silently falling back.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Default interpreter for stub tool scripts.
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Environment keys for system test configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemTestEnv {
    /// Optional artifact root override.
    RunRoot,
    /// Optional minimum for suite timeouts in seconds (positive integer).
    TimeoutSeconds,
    /// Optional interpreter used in stub tool shebangs.
    Shell,
}

impl SystemTestEnv {
    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RunRoot => "FLAGCHECK_SYSTEM_TEST_RUN_ROOT",
            Self::TimeoutSeconds => "FLAGCHECK_SYSTEM_TEST_TIMEOUT_SEC",
            Self::Shell => "FLAGCHECK_SYSTEM_TEST_SHELL",
        }
    }
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Typed system test configuration derived from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemTestConfig {
    /// Optional artifact root override.
    pub run_root: Option<PathBuf>,
    /// Optional timeout floor.
    pub timeout: Option<Duration>,
    /// Interpreter for stub tool scripts.
    pub shell: PathBuf,
}

impl Default for SystemTestConfig {
    fn default() -> Self {
        Self {
            run_root: None,
            timeout: None,
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }
}

impl SystemTestConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error when a value is not valid UTF-8, is empty, or the
    /// timeout is not a positive integer.
    pub fn load() -> Result<Self, String> {
        let run_root = read_env_nonempty(SystemTestEnv::RunRoot.as_str())?.map(PathBuf::from);
        let timeout = read_env_nonempty(SystemTestEnv::TimeoutSeconds.as_str())?
            .map(|value| parse_timeout_seconds(SystemTestEnv::TimeoutSeconds.as_str(), &value))
            .transpose()?;
        let shell = read_env_nonempty(SystemTestEnv::Shell.as_str())?
            .map_or_else(|| PathBuf::from(DEFAULT_SHELL), PathBuf::from);
        if !shell.is_absolute() {
            return Err(format!("{} must be an absolute path", SystemTestEnv::Shell.as_str()));
        }
        Ok(Self {
            run_root,
            timeout,
            shell,
        })
    }

    /// Returns `requested`, raised to the configured floor when one is set.
    #[must_use]
    pub fn resolve_timeout(&self, requested: Duration) -> Duration {
        self.timeout.map_or(requested, |floor| requested.max(floor))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns an error when the environment variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, String> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string().map(Some).map_err(|_| format!("{name} must be valid UTF-8"))
    })
}

/// Reads an environment variable and rejects empty values.
fn read_env_nonempty(name: &str) -> Result<Option<String>, String> {
    match read_env_strict(name)? {
        Some(value) if value.trim().is_empty() => Err(format!("{name} must not be empty")),
        Some(value) => Ok(Some(value)),
        None => Ok(None),
    }
}

/// Parses a positive whole number of seconds.
fn parse_timeout_seconds(name: &str, raw: &str) -> Result<Duration, String> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("{name} must be a positive integer number of seconds"))?;
    if secs == 0 {
        return Err(format!("{name} must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}
