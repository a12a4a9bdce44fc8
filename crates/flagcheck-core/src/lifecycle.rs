// crates/flagcheck-core/src/lifecycle.rs
// ============================================================================
// Module: Harness Lifecycle Manager
// Description: Process-wide setup and teardown around a harness run.
// Purpose: Locate the tool, isolate the environment, and clean up leftovers.
// Dependencies: tempfile, thiserror, tracing, crate::runner, crate::workspace
// ============================================================================

//! ## Overview
//! [`HarnessLifecycle`] is created once before any scenario and torn down
//! once after all of them. Ordering:
//!
//! Setup:
//! 1. resolve the tool (a path is checked directly, a bare name is searched on
//!    `PATH`); failure is a fatal [`SetupError`], never retried,
//! 2. reject process environment entries the platform cannot set,
//! 3. create the run root that parents every workspace of this run,
//! 4. apply configured process-wide environment variables, remembering the
//!    previous values.
//!
//! Teardown (idempotent, also run on drop):
//! 1. remove workspaces still registered (their owners leaked or aborted),
//! 2. remove the run root,
//! 3. restore every environment variable touched during setup.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use tempfile::TempDir;
use thiserror::Error;

use crate::env_policy::PATH_VAR;
use crate::outcome::ExitCodePolicy;
use crate::runner::ProcessRunner;
use crate::runner::RunnerSettings;
use crate::workspace::WorkspaceError;
use crate::workspace::WorkspaceHandle;
use crate::workspace::WorkspaceRegistry;
use crate::workspace::WorkspaceSpec;
use crate::workspace::materialize_with_registry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix used for run root directory names.
const RUN_ROOT_PREFIX: &str = "flagcheck-run-";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fatal setup failures; the run aborts before any scenario executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SetupError {
    /// The tool could not be located.
    #[error("tool `{program}` not found (searched: {searched})")]
    ToolNotFound {
        /// Requested program name or path.
        program: String,
        /// Locations that were checked.
        searched: String,
    },
    /// The tool path exists but is not an executable file.
    #[error("tool `{0}` is not an executable file")]
    ToolNotExecutable(String),
    /// A bare tool name was given but `PATH` is unset.
    #[error("cannot search for tool `{0}`: PATH is not set")]
    MissingSearchPath(String),
    /// A configured process environment entry is unusable.
    #[error("invalid process environment entry `{name}`: {reason}")]
    Environment {
        /// Variable name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },
    /// The run root directory could not be created.
    #[error("failed to create run root under {path}: {message}")]
    RunRoot {
        /// Parent directory.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Inputs for [`HarnessLifecycle::setup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleSettings {
    /// Tool program: a bare name searched on `PATH`, or a path.
    pub tool: PathBuf,
    /// Subprocess runner settings.
    pub runner: RunnerSettings,
    /// Exit code contract of the tool.
    pub policy: ExitCodePolicy,
    /// Parent directory for the run root; system temp dir when `None`.
    pub workspace_parent: Option<PathBuf>,
    /// Variables set on the harness process for the duration of the run.
    pub process_env: BTreeMap<String, String>,
}

impl LifecycleSettings {
    /// Settings for `tool` with default runner settings and Bazel exit codes.
    #[must_use]
    pub fn new(tool: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            runner: RunnerSettings::default(),
            policy: ExitCodePolicy::bazel(),
            workspace_parent: None,
            process_env: BTreeMap::new(),
        }
    }
}

// ============================================================================
// SECTION: Teardown Report
// ============================================================================

/// What a teardown pass cleaned up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownReport {
    /// Workspaces removed defensively because their owner never released them.
    pub removed_workspaces: Vec<PathBuf>,
    /// Environment variables restored to their previous values.
    pub restored_env: Vec<String>,
    /// Cleanup steps that failed.
    pub failures: Vec<String>,
}

impl TeardownReport {
    /// Returns true when teardown had nothing to do.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.removed_workspaces.is_empty()
            && self.restored_env.is_empty()
            && self.failures.is_empty()
    }
}

// ============================================================================
// SECTION: Lifecycle
// ============================================================================

/// Process-wide harness state for one test run.
///
/// # Invariants
/// - `tool_path` was an executable file at setup time.
/// - Every workspace materialized through the lifecycle lives under the run root.
/// - Teardown runs at most once; later calls return an empty report.
#[derive(Debug)]
pub struct HarnessLifecycle {
    /// Resolved tool path.
    tool_path: PathBuf,
    /// Runner shared by scenarios.
    runner: ProcessRunner,
    /// Exit code contract.
    policy: ExitCodePolicy,
    /// Run root path.
    run_root: PathBuf,
    /// Run root directory guard; `None` after teardown.
    run_root_dir: Mutex<Option<TempDir>>,
    /// Live workspaces for defensive cleanup.
    registry: WorkspaceRegistry,
    /// Previous values of variables modified during setup.
    saved_env: Mutex<Vec<(String, Option<OsString>)>>,
    /// Set once teardown has started.
    torn_down: AtomicBool,
}

impl HarnessLifecycle {
    /// Performs process-wide setup.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] when the tool cannot be resolved, the run root
    /// cannot be created, or a process environment entry is invalid.
    pub fn setup(settings: LifecycleSettings) -> Result<Self, SetupError> {
        let search_path = std::env::var_os(PATH_VAR);
        tracing::debug!(
            path = %search_path.as_deref().unwrap_or_default().to_string_lossy(),
            "harness search path"
        );
        let tool_path = resolve_tool(&settings.tool, search_path.as_deref())?;
        tracing::info!(tool = %tool_path.display(), "resolved tool under test");

        for (name, value) in &settings.process_env {
            validate_env_entry(name, value)?;
        }

        let parent = settings.workspace_parent.clone().unwrap_or_else(std::env::temp_dir);
        let run_root_dir = create_run_root(&parent)?;
        let run_root = run_root_dir.path().to_path_buf();

        let mut saved_env = Vec::with_capacity(settings.process_env.len());
        for (name, value) in &settings.process_env {
            saved_env.push((name.clone(), std::env::var_os(name)));
            process_env::set_var(name, value);
        }

        Ok(Self {
            tool_path,
            runner: ProcessRunner::new(settings.runner),
            policy: settings.policy,
            run_root,
            run_root_dir: Mutex::new(Some(run_root_dir)),
            registry: WorkspaceRegistry::default(),
            saved_env: Mutex::new(saved_env),
            torn_down: AtomicBool::new(false),
        })
    }

    /// Returns the resolved tool path.
    #[must_use]
    pub fn tool_path(&self) -> &Path {
        &self.tool_path
    }

    /// Returns the run root directory.
    #[must_use]
    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    /// Returns the shared process runner.
    #[must_use]
    pub const fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// Returns the exit code contract.
    #[must_use]
    pub const fn policy(&self) -> &ExitCodePolicy {
        &self.policy
    }

    /// Materializes a workspace under the run root.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError`] when materialization fails or the harness
    /// has already been torn down.
    pub fn materialize(&self, spec: &WorkspaceSpec) -> Result<WorkspaceHandle, WorkspaceError> {
        if self.is_torn_down() {
            return Err(WorkspaceError::Io {
                path: self.run_root.display().to_string(),
                message: "harness has been torn down".to_string(),
            });
        }
        materialize_with_registry(&self.run_root, spec, Some(self.registry.clone()))
    }

    /// Returns the number of workspaces not yet released by their owners.
    #[must_use]
    pub fn live_workspaces(&self) -> usize {
        self.registry.len()
    }

    /// Returns true once teardown has run.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Releases process-wide state. Safe to call more than once.
    pub fn teardown(&self) -> TeardownReport {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return TeardownReport::default();
        }
        let mut report = TeardownReport::default();

        for root in self.registry.drain() {
            if !root.exists() {
                continue;
            }
            match fs::remove_dir_all(&root) {
                Ok(()) => {
                    tracing::warn!(root = %root.display(), "removed leaked workspace");
                    report.removed_workspaces.push(root);
                }
                Err(err) => report.failures.push(format!("{}: {err}", root.display())),
            }
        }

        let run_root_dir = self.run_root_dir.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(dir) = run_root_dir
            && let Err(err) = dir.close()
        {
            report.failures.push(format!("{}: {err}", self.run_root.display()));
        }

        let saved = std::mem::take(&mut *self.saved_env.lock().unwrap_or_else(PoisonError::into_inner));
        for (name, previous) in saved.into_iter().rev() {
            match previous {
                Some(value) => process_env::set_var(&name, &value),
                None => process_env::remove_var(&name),
            }
            report.restored_env.push(name);
        }

        for failure in &report.failures {
            tracing::warn!(failure = %failure, "teardown step failed");
        }
        report
    }
}

impl Drop for HarnessLifecycle {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}

// ============================================================================
// SECTION: Tool Resolution
// ============================================================================

/// Resolves `program` to an executable file.
///
/// A program with more than one path component is checked as-is (relative to
/// the current directory); a bare name is searched on `search_path`.
///
/// # Errors
///
/// Returns [`SetupError`] when no executable file is found.
pub fn resolve_tool(program: &Path, search_path: Option<&OsStr>) -> Result<PathBuf, SetupError> {
    let display = program.display().to_string();
    if program.as_os_str().is_empty() {
        return Err(SetupError::ToolNotFound {
            program: display,
            searched: "nothing (empty program name)".to_string(),
        });
    }
    if program.is_absolute() || program.components().count() > 1 {
        if !program.exists() {
            return Err(SetupError::ToolNotFound {
                searched: display.clone(),
                program: display,
            });
        }
        if !is_executable_file(program) {
            return Err(SetupError::ToolNotExecutable(display));
        }
        return std::path::absolute(program).map_err(|err| SetupError::ToolNotFound {
            program: display,
            searched: err.to_string(),
        });
    }

    let Some(search_path) = search_path else {
        return Err(SetupError::MissingSearchPath(display));
    };
    let mut searched = Vec::new();
    for dir in std::env::split_paths(search_path) {
        if dir.as_os_str().is_empty() {
            continue;
        }
        for name in candidate_names(program) {
            let candidate = dir.join(&name);
            if is_executable_file(&candidate) {
                return Ok(candidate);
            }
        }
        searched.push(dir.display().to_string());
    }
    Err(SetupError::ToolNotFound {
        program: display,
        searched: if searched.is_empty() { "empty PATH".to_string() } else { searched.join(", ") },
    })
}

/// Returns the file names to try for a bare program name.
fn candidate_names(program: &Path) -> Vec<OsString> {
    let mut names = vec![program.as_os_str().to_os_string()];
    if cfg!(windows) && program.extension().is_none() {
        let mut exe = program.as_os_str().to_os_string();
        exe.push(".exe");
        names.push(exe);
    }
    names
}

/// Returns true when `path` is a regular file the current user may execute.
fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Creates the run root directory under `parent`.
fn create_run_root(parent: &Path) -> Result<TempDir, SetupError> {
    let run_root_error = |err: std::io::Error| SetupError::RunRoot {
        path: parent.display().to_string(),
        message: err.to_string(),
    };
    fs::create_dir_all(parent).map_err(run_root_error)?;
    let parent = fs::canonicalize(parent).map_err(run_root_error)?;
    tempfile::Builder::new().prefix(RUN_ROOT_PREFIX).tempdir_in(parent).map_err(run_root_error)
}

/// Rejects entries the platform cannot set.
fn validate_env_entry(name: &str, value: &str) -> Result<(), SetupError> {
    let reason = if name.is_empty() {
        Some("name must not be empty")
    } else if name.contains('=') {
        Some("name must not contain '='")
    } else if name.contains('\0') {
        Some("name must not contain NUL")
    } else if value.contains('\0') {
        Some("value must not contain NUL")
    } else {
        None
    };
    reason.map_or(Ok(()), |reason| {
        Err(SetupError::Environment {
            name: name.to_string(),
            reason: reason.to_string(),
        })
    })
}

/// Process environment mutation, confined to lifecycle setup and teardown.
mod process_env {
    #![allow(unsafe_code, reason = "Lifecycle setup/teardown mutates the process environment.")]

    use std::ffi::OsStr;

    /// Sets an environment variable for the current process.
    pub(super) fn set_var(key: &str, value: impl AsRef<OsStr>) {
        // SAFETY: The lifecycle mutates the environment only during setup and
        // teardown, outside scenario execution.
        unsafe {
            std::env::set_var(key, value);
        }
    }

    /// Removes an environment variable from the current process.
    pub(super) fn remove_var(key: &str) {
        // SAFETY: See `set_var`.
        unsafe {
            std::env::remove_var(key);
        }
    }
}
