// crates/flagcheck-config/src/env.rs
// ============================================================================
// Module: Flagcheck Environment
// Description: Environment-backed overrides for harness configuration.
// Purpose: Centralize env parsing with strict UTF-8 validation.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Environment values are parsed with strict UTF-8 enforcement to avoid silent
//! misconfiguration. Invalid UTF-8 or empty values fail closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use crate::config::ConfigError;

// ============================================================================
// SECTION: Environment Constants
// ============================================================================

/// Environment keys recognized by flagcheck.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagcheckEnv {
    /// Config file path override.
    Config,
    /// Tool program override (bare name or path).
    Tool,
    /// Default run timeout override in seconds (positive integer).
    TimeoutSeconds,
    /// Parent directory override for run roots.
    WorkspaceRoot,
    /// Log filter directives for the CLI.
    Log,
}

impl FlagcheckEnv {
    /// Returns the canonical environment variable name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Config => "FLAGCHECK_CONFIG",
            Self::Tool => "FLAGCHECK_TOOL",
            Self::TimeoutSeconds => "FLAGCHECK_TIMEOUT_SEC",
            Self::WorkspaceRoot => "FLAGCHECK_WORKSPACE_ROOT",
            Self::Log => "FLAGCHECK_LOG",
        }
    }
}

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Typed overrides derived from environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvOverrides {
    /// Config file path.
    pub config: Option<PathBuf>,
    /// Tool program.
    pub tool: Option<PathBuf>,
    /// Default run timeout.
    pub timeout: Option<Duration>,
    /// Parent directory for run roots.
    pub workspace_root: Option<PathBuf>,
}

impl EnvOverrides {
    /// Loads overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when a value is not valid UTF-8, is
    /// empty, or fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config = read_env_nonempty(FlagcheckEnv::Config.as_str())?.map(PathBuf::from);
        let tool = read_env_nonempty(FlagcheckEnv::Tool.as_str())?.map(PathBuf::from);
        let timeout = read_env_nonempty(FlagcheckEnv::TimeoutSeconds.as_str())?
            .map(|value| parse_timeout_seconds(FlagcheckEnv::TimeoutSeconds.as_str(), &value))
            .transpose()?;
        let workspace_root =
            read_env_nonempty(FlagcheckEnv::WorkspaceRoot.as_str())?.map(PathBuf::from);
        Ok(Self {
            config,
            tool,
            timeout,
            workspace_root,
        })
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Reads an environment variable and enforces UTF-8 validity.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the variable contains invalid UTF-8.
pub fn read_env_strict(name: &str) -> Result<Option<String>, ConfigError> {
    std::env::var_os(name).map_or(Ok(None), |raw| {
        raw.into_string()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(format!("{name} must be valid UTF-8")))
    })
}

/// Reads an environment variable and rejects empty values.
fn read_env_nonempty(name: &str) -> Result<Option<String>, ConfigError> {
    match read_env_strict(name)? {
        Some(value) if value.trim().is_empty() => {
            Err(ConfigError::Invalid(format!("{name} must not be empty")))
        }
        Some(value) => Ok(Some(value)),
        None => Ok(None),
    }
}

/// Parses a positive whole number of seconds.
fn parse_timeout_seconds(name: &str, raw: &str) -> Result<Duration, ConfigError> {
    let invalid = || ConfigError::Invalid(format!("{name} must be a positive integer number of seconds"));
    let secs: u64 = raw.trim().parse().map_err(|_| invalid())?;
    if secs == 0 {
        return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
    }
    Ok(Duration::from_secs(secs))
}
