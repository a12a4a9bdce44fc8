// crates/flagcheck-config/src/scenario_file.rs
// ============================================================================
// Module: Scenario Files
// Description: Declarative *.scenario.toml definitions.
// Purpose: Build validated core scenarios from files on disk.
// Dependencies: flagcheck-core, serde, toml
// ============================================================================

//! ## Overview
//! A scenario file names a fixture project (an inline bundle plus optional
//! extra files), the targets to build, and one expectation per flag
//! configuration. [`ScenarioFile::into_scenario`] resolves defaults from the
//! `[tool]` config section and runs the same validation as
//! [`flagcheck_core::Scenario::validate`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::time::Duration;

use flagcheck_core::FlagConfiguration;
use flagcheck_core::Outcome;
use flagcheck_core::Scenario;
use flagcheck_core::WorkspaceSpec;
use flagcheck_core::parse_bundle;
use serde::Deserialize;
use serde::Serialize;

use crate::config::ConfigError;
use crate::config::MAX_TIMEOUT_SECS;
use crate::config::ToolConfig;
use crate::config::read_limited;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// File name suffix for scenario definitions.
pub const SCENARIO_FILE_SUFFIX: &str = ".scenario.toml";

// ============================================================================
// SECTION: File Model
// ============================================================================

/// On-disk scenario definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioFile {
    /// Scenario name used in reports.
    pub name: String,
    /// Base command; falls back to `tool.base_command`.
    #[serde(default)]
    pub base_command: Option<Vec<String>>,
    /// Arguments appended after the flags.
    #[serde(default)]
    pub targets: Vec<String>,
    /// Per-run timeout override in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Inline multi-file bundle.
    #[serde(default)]
    pub bundle: Option<String>,
    /// Extra files added after the bundle entries.
    #[serde(default)]
    pub files: Vec<FileEntry>,
    /// Expectations in evaluation order.
    #[serde(default)]
    pub expectations: Vec<ExpectationEntry>,
}

/// One explicit workspace file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileEntry {
    /// Workspace-relative path.
    pub path: String,
    /// File contents.
    #[serde(default)]
    pub contents: String,
}

/// One flag configuration and its expected outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExpectationEntry {
    /// Label shown in reports.
    pub label: String,
    /// Flags passed to the tool.
    #[serde(default)]
    pub flags: Vec<String>,
    /// Expected outcome.
    pub outcome: Outcome,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

impl ScenarioFile {
    /// Loads and parses a scenario file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_limited(path)?;
        toml::from_str(&content)
            .map_err(|err| ConfigError::Parse(format!("{}: {err}", path.display())))
    }

    /// Parses scenario text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the text is not a valid scenario.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Builds the fixture workspace from the bundle and explicit files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for malformed bundles, escaping paths,
    /// or duplicate files.
    pub fn workspace(&self) -> Result<WorkspaceSpec, ConfigError> {
        let mut spec = match &self.bundle {
            Some(bundle) => parse_bundle(bundle)
                .map_err(|err| ConfigError::Invalid(format!("{}: bundle {err}", self.name)))?,
            None => WorkspaceSpec::new(),
        };
        for file in &self.files {
            spec.insert(&file.path, file.contents.clone())
                .map_err(|err| ConfigError::Invalid(format!("{}: files: {err}", self.name)))?;
        }
        Ok(spec)
    }

    /// Converts the file into a validated scenario.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the definition is incomplete or
    /// inconsistent.
    pub fn into_scenario(self, tool: &ToolConfig) -> Result<Scenario, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("scenario name must be non-empty".to_string()));
        }
        let workspace = self.workspace()?;
        let base_command = self.base_command.clone().unwrap_or_else(|| tool.base_command.clone());
        let mut scenario = Scenario::new(self.name.clone(), workspace)
            .base_command(base_command)
            .targets(self.targets.clone());
        if let Some(secs) = self.timeout_secs {
            if secs == 0 || secs > MAX_TIMEOUT_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{}: timeout_secs must be between 1 and {MAX_TIMEOUT_SECS}",
                    self.name
                )));
            }
            scenario = scenario.timeout(Duration::from_secs(secs));
        }
        for entry in self.expectations {
            if entry.label.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "{}: expectation label must be non-empty",
                    self.name
                )));
            }
            scenario = scenario.expect(FlagConfiguration::new(entry.label, entry.flags), entry.outcome);
        }
        scenario.validate().map_err(|err| ConfigError::Invalid(err.to_string()))?;
        Ok(scenario)
    }
}

/// Loads a scenario file and converts it with the given tool defaults.
///
/// # Errors
///
/// Returns [`ConfigError`] when loading or validation fails.
pub fn load_scenario(path: &Path, tool: &ToolConfig) -> Result<Scenario, ConfigError> {
    ScenarioFile::load(path)?.into_scenario(tool)
}
