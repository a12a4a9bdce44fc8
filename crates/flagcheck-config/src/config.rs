// crates/flagcheck-config/src/config.rs
// ============================================================================
// Module: Harness Configuration
// Description: Loading and validation of flagcheck.toml.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: flagcheck-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Every section is optional and falls back to defaults that target Bazel.
//! Environment overrides (see [`crate::env::EnvOverrides`]) are applied after
//! parsing and before validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use flagcheck_core::DEFAULT_GRACE_PERIOD;
use flagcheck_core::DEFAULT_MAX_OUTPUT_BYTES;
use flagcheck_core::DEFAULT_TIMEOUT;
use flagcheck_core::EnvPolicy;
use flagcheck_core::ExitCodePolicy;
use flagcheck_core::LifecycleSettings;
use flagcheck_core::RunnerSettings;
use flagcheck_core::env_policy::DEFAULT_FORWARD;
use flagcheck_core::env_policy::DEFAULT_STRIP_PREFIXES;
use flagcheck_core::outcome::BAZEL_BUILD_FAILURE;
use flagcheck_core::outcome::BAZEL_TESTS_FAILED;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::env::EnvOverrides;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "flagcheck.toml";
/// Default tool program.
pub const DEFAULT_TOOL: &str = "bazel";
/// Maximum config or scenario file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum length of a full path.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound for run timeouts.
pub(crate) const MAX_TIMEOUT_SECS: u64 = 24 * 60 * 60;
/// Upper bound for the `SIGTERM` to `SIGKILL` grace period.
pub(crate) const MAX_GRACE_PERIOD_MS: u64 = 60_000;
/// Upper bound for per-stream output capture.
pub(crate) const MAX_OUTPUT_BYTES_LIMIT: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Config Types
// ============================================================================

/// Top-level harness configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HarnessConfig {
    /// Tool under test.
    #[serde(default)]
    pub tool: ToolConfig,
    /// Exit code contract of the tool.
    #[serde(default)]
    pub exit_codes: ExitCodesConfig,
    /// Subprocess limits.
    #[serde(default)]
    pub run: RunConfig,
    /// Child environment policy.
    #[serde(default)]
    pub env: EnvConfig,
    /// Setup and teardown settings.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
}

/// `[tool]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolConfig {
    /// Bare program name searched on `PATH`, or a path.
    #[serde(default = "default_program")]
    pub program: String,
    /// Base command used by scenarios that do not set their own.
    #[serde(default = "default_base_command")]
    pub base_command: Vec<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            base_command: default_base_command(),
        }
    }
}

/// `[exit_codes]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExitCodesConfig {
    /// Codes meaning the build failed.
    #[serde(default = "default_build_failed")]
    pub build_failed: Vec<i32>,
    /// Codes meaning the build succeeded but tests failed.
    #[serde(default = "default_tests_failed")]
    pub tests_failed: Vec<i32>,
}

impl Default for ExitCodesConfig {
    fn default() -> Self {
        Self {
            build_failed: default_build_failed(),
            tests_failed: default_tests_failed(),
        }
    }
}

impl ExitCodesConfig {
    /// Builds the exit code policy.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for zero, overlapping, or missing codes.
    pub fn policy(&self) -> Result<ExitCodePolicy, ConfigError> {
        ExitCodePolicy::new(self.build_failed.iter().copied(), self.tests_failed.iter().copied())
            .map_err(|err| ConfigError::Invalid(format!("exit_codes: {err}")))
    }
}

/// `[run]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Default per-run timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Delay between `SIGTERM` and `SIGKILL` in milliseconds.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
    /// Per-stream capture limit in bytes.
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            grace_period_ms: default_grace_period_ms(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

impl RunConfig {
    /// Validates run limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 || self.timeout_secs > MAX_TIMEOUT_SECS {
            return Err(ConfigError::Invalid(format!(
                "run.timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}"
            )));
        }
        if self.grace_period_ms > MAX_GRACE_PERIOD_MS {
            return Err(ConfigError::Invalid(format!(
                "run.grace_period_ms must be at most {MAX_GRACE_PERIOD_MS}"
            )));
        }
        if self.max_output_bytes == 0 || self.max_output_bytes > MAX_OUTPUT_BYTES_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "run.max_output_bytes must be between 1 and {MAX_OUTPUT_BYTES_LIMIT}"
            )));
        }
        Ok(())
    }
}

/// `[env]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvConfig {
    /// Variables forwarded from the harness environment.
    #[serde(default = "default_forward")]
    pub forward: Vec<String>,
    /// Forward every variable except stripped prefixes.
    #[serde(default)]
    pub forward_all: bool,
    /// Name prefixes never forwarded.
    #[serde(default = "default_strip_prefixes")]
    pub strip_prefixes: Vec<String>,
    /// Variables set explicitly on the child.
    #[serde(default)]
    pub set: BTreeMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self {
            forward: default_forward(),
            forward_all: false,
            strip_prefixes: default_strip_prefixes(),
            set: BTreeMap::new(),
        }
    }
}

impl EnvConfig {
    /// Validates variable names.
    fn validate(&self) -> Result<(), ConfigError> {
        for name in self.forward.iter().chain(self.set.keys()) {
            validate_env_name("env", name)?;
        }
        if self.strip_prefixes.iter().any(|prefix| prefix.is_empty()) {
            return Err(ConfigError::Invalid(
                "env.strip_prefixes must not contain empty prefixes".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the child environment policy.
    #[must_use]
    pub fn policy(&self) -> EnvPolicy {
        let policy = EnvPolicy::isolated().forward_all(self.forward_all);
        let policy = self.forward.iter().fold(policy, |policy, name| policy.forward(name.as_str()));
        let policy = self
            .strip_prefixes
            .iter()
            .fold(policy, |policy, prefix| policy.strip_prefix(prefix.as_str()));
        self.set.iter().fold(policy, |policy, (key, value)| policy.set(key.as_str(), value.as_str()))
    }
}

/// `[lifecycle]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LifecycleConfig {
    /// Parent directory for run roots; system temp dir when unset.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    /// Variables set on the harness process for the run.
    #[serde(default)]
    pub process_env: BTreeMap<String, String>,
}

impl LifecycleConfig {
    /// Validates lifecycle settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(root) = &self.workspace_root {
            validate_path_string("lifecycle.workspace_root", &root.to_string_lossy())?;
        }
        for (name, value) in &self.process_env {
            validate_env_name("lifecycle.process_env", name)?;
            if value.contains('\0') {
                return Err(ConfigError::Invalid(format!(
                    "lifecycle.process_env: value of `{name}` must not contain NUL"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl HarnessConfig {
    /// Loads configuration using the default resolution rules.
    ///
    /// Resolution order: `path`, then `FLAGCHECK_CONFIG`, then
    /// `flagcheck.toml` in the current directory. An explicit or env path must
    /// exist; a missing default file yields the built-in defaults. Remaining
    /// environment overrides are applied before validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let overrides = EnvOverrides::load()?;
        let mut config = match resolve_path(path, &overrides)? {
            Some(resolved) => Self::load_file(&resolved)?,
            None => Self::default(),
        };
        config.apply_overrides(&overrides);
        config.validate()?;
        Ok(config)
    }

    /// Loads and parses a config file without applying overrides or validating.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = read_limited(path)?;
        toml::from_str(&content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Parses and validates configuration text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Applies environment overrides in place.
    pub fn apply_overrides(&mut self, overrides: &EnvOverrides) {
        if let Some(tool) = &overrides.tool {
            self.tool.program = tool.to_string_lossy().into_owned();
        }
        if let Some(timeout) = overrides.timeout {
            self.run.timeout_secs = timeout.as_secs();
        }
        if let Some(root) = &overrides.workspace_root {
            self.lifecycle.workspace_root = Some(root.clone());
        }
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tool.program.trim().is_empty() {
            return Err(ConfigError::Invalid("tool.program must be non-empty".to_string()));
        }
        validate_path_string("tool.program", &self.tool.program)?;
        if self.tool.base_command.iter().any(|arg| arg.is_empty()) {
            return Err(ConfigError::Invalid(
                "tool.base_command must not contain empty arguments".to_string(),
            ));
        }
        self.exit_codes.policy()?;
        self.run.validate()?;
        self.env.validate()?;
        self.lifecycle.validate()?;
        Ok(())
    }

    /// Returns the default run timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.run.timeout_secs)
    }

    /// Converts the configuration into lifecycle settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the exit code contract is invalid.
    pub fn lifecycle_settings(&self) -> Result<LifecycleSettings, ConfigError> {
        let runner = RunnerSettings {
            env: self.env.policy(),
            default_timeout: self.timeout(),
            grace_period: Duration::from_millis(self.run.grace_period_ms),
            max_output_bytes: self.run.max_output_bytes,
        };
        let mut settings = LifecycleSettings::new(&self.tool.program);
        settings.runner = runner;
        settings.policy = self.exit_codes.policy()?;
        settings.workspace_parent.clone_from(&self.lifecycle.workspace_root);
        settings.process_env.clone_from(&self.lifecycle.process_env);
        Ok(settings)
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default tool program.
fn default_program() -> String {
    DEFAULT_TOOL.to_string()
}

/// Default base command.
fn default_base_command() -> Vec<String> {
    vec!["test".to_string(), "-s".to_string()]
}

/// Default build-failed codes.
fn default_build_failed() -> Vec<i32> {
    vec![BAZEL_BUILD_FAILURE]
}

/// Default tests-failed codes.
fn default_tests_failed() -> Vec<i32> {
    vec![BAZEL_TESTS_FAILED]
}

/// Default timeout in seconds.
const fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT.as_secs()
}

/// Default grace period in milliseconds.
fn default_grace_period_ms() -> u64 {
    u64::try_from(DEFAULT_GRACE_PERIOD.as_millis()).unwrap_or(MAX_GRACE_PERIOD_MS)
}

/// Default capture limit.
const fn default_max_output_bytes() -> usize {
    DEFAULT_MAX_OUTPUT_BYTES
}

/// Default forwarded variables.
fn default_forward() -> Vec<String> {
    DEFAULT_FORWARD.iter().map(|name| (*name).to_string()).collect()
}

/// Default stripped prefixes.
fn default_strip_prefixes() -> Vec<String> {
    DEFAULT_STRIP_PREFIXES.iter().map(|prefix| (*prefix).to_string()).collect()
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
///
/// Returns `None` when falling back to a default file that does not exist.
fn resolve_path(
    path: Option<&Path>,
    overrides: &EnvOverrides,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = path.map(Path::to_path_buf).or_else(|| overrides.config.clone()) {
        validate_path(&path)?;
        return Ok(Some(path));
    }
    let default = PathBuf::from(DEFAULT_CONFIG_NAME);
    Ok(default.is_file().then_some(default))
}

/// Reads a UTF-8 file subject to the config size limit.
pub(crate) fn read_limited(path: &Path) -> Result<String, ConfigError> {
    validate_path(path)?;
    let bytes = fs::read(path)
        .map_err(|err| ConfigError::Io(format!("{}: {err}", path.display())))?;
    if bytes.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::Invalid(format!("{} exceeds size limit", path.display())));
    }
    String::from_utf8(bytes)
        .map_err(|_| ConfigError::Invalid(format!("{} must be utf-8", path.display())))
}

/// Validates a path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Validates an environment variable name.
fn validate_env_name(field: &str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() || name.contains('=') || name.contains('\0') {
        return Err(ConfigError::Invalid(format!("{field}: invalid variable name `{name}`")));
    }
    Ok(())
}
