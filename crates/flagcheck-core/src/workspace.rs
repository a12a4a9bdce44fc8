// crates/flagcheck-core/src/workspace.rs
// ============================================================================
// Module: Workspace Materializer
// Description: Declarative file bundles written into disposable directories.
// Purpose: Produce isolated, uniquely named project roots for each scenario.
// Dependencies: tempfile, thiserror, tracing
// ============================================================================

//! ## Overview
//! A [`WorkspaceSpec`] is an ordered list of relative paths and literal file
//! contents. [`materialize`] writes it into a freshly created directory and
//! returns a [`WorkspaceHandle`] that owns that directory; dropping the handle
//! removes it, including on panic unwinds.
//!
//! Directory names are allocated with exclusive creation and a random suffix,
//! so concurrent scenarios (threads or processes) never share a root.
//! Paths are validated both when inserted and again before writing: absolute
//! paths, root or prefix components, and `..` are rejected.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::fs;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use tempfile::TempDir;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Prefix used for materialized workspace directory names.
pub const WORKSPACE_PREFIX: &str = "flagcheck-ws-";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Workspace materialization errors.
///
/// These are fatal to the owning scenario only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkspaceError {
    /// The relative path was empty (or only `.` components).
    #[error("workspace path must not be empty")]
    EmptyPath,
    /// The relative path would resolve outside the workspace root.
    #[error("workspace path escapes root: {0}")]
    PathEscapes(String),
    /// The same relative path was added twice.
    #[error("duplicate workspace path: {0}")]
    DuplicatePath(String),
    /// Filesystem failure while creating, writing, or removing files.
    #[error("workspace io error at {path}: {message}")]
    Io {
        /// Path involved in the failed operation.
        path: String,
        /// Underlying error message.
        message: String,
    },
}

impl WorkspaceError {
    /// Builds an I/O error for the given path.
    fn io(path: &Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

// ============================================================================
// SECTION: Workspace Spec
// ============================================================================

/// Ordered mapping from relative file path to literal file content.
///
/// # Invariants
/// - Every path is relative, non-empty, and free of `..`/root components.
/// - No path appears twice.
/// - Insertion order is the creation order on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceSpec {
    /// Normalized relative paths with their contents, in insertion order.
    entries: Vec<(PathBuf, String)>,
}

impl WorkspaceSpec {
    /// Creates an empty workspace spec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builds a spec from `(path, contents)` pairs, rejecting invalid or duplicate paths.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError`] for the first invalid or duplicate path.
    pub fn from_entries<I, P, C>(entries: I) -> Result<Self, WorkspaceError>
    where
        I: IntoIterator<Item = (P, C)>,
        P: AsRef<Path>,
        C: Into<String>,
    {
        let mut spec = Self::new();
        for (path, contents) in entries {
            spec.insert(path, contents)?;
        }
        Ok(spec)
    }

    /// Adds a file and returns the spec, for chained construction.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError`] when the path is invalid or already present.
    pub fn with_file(
        mut self,
        path: impl AsRef<Path>,
        contents: impl Into<String>,
    ) -> Result<Self, WorkspaceError> {
        self.insert(path, contents)?;
        Ok(self)
    }

    /// Adds a file to the spec.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError`] when the path is invalid or already present.
    pub fn insert(
        &mut self,
        path: impl AsRef<Path>,
        contents: impl Into<String>,
    ) -> Result<(), WorkspaceError> {
        let normalized = normalize_relative(path.as_ref())?;
        if self.entries.iter().any(|(existing, _)| existing == &normalized) {
            return Err(WorkspaceError::DuplicatePath(normalized.display().to_string()));
        }
        self.entries.push((normalized, contents.into()));
        Ok(())
    }

    /// Returns the contents recorded for `path`, if any.
    #[must_use]
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&str> {
        let normalized = normalize_relative(path.as_ref()).ok()?;
        self.entries
            .iter()
            .find(|(existing, _)| existing == &normalized)
            .map(|(_, contents)| contents.as_str())
    }

    /// Iterates entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.entries.iter().map(|(path, contents)| (path.as_path(), contents.as_str()))
    }

    /// Returns the number of files in the spec.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the spec has no files.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Normalizes a relative path, rejecting anything that could leave the root.
///
/// # Errors
///
/// Returns [`WorkspaceError::EmptyPath`] or [`WorkspaceError::PathEscapes`].
pub fn normalize_relative(path: &Path) -> Result<PathBuf, WorkspaceError> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normalized.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(WorkspaceError::PathEscapes(path.display().to_string()));
            }
        }
    }
    if normalized.as_os_str().is_empty() {
        return Err(WorkspaceError::EmptyPath);
    }
    Ok(normalized)
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Shared set of live workspace roots, used for defensive cleanup.
#[derive(Debug, Clone, Default)]
pub(crate) struct WorkspaceRegistry {
    /// Roots of workspaces that have not been released yet.
    roots: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl WorkspaceRegistry {
    /// Records a live workspace root.
    pub(crate) fn register(&self, root: &Path) {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner).insert(root.to_path_buf());
    }

    /// Forgets a workspace root after its owner released it.
    pub(crate) fn release(&self, root: &Path) {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner).remove(root);
    }

    /// Removes and returns every root still registered.
    pub(crate) fn drain(&self) -> Vec<PathBuf> {
        let mut roots = self.roots.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *roots).into_iter().collect()
    }

    /// Returns the number of live roots.
    pub(crate) fn len(&self) -> usize {
        self.roots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

// ============================================================================
// SECTION: Workspace Handle
// ============================================================================

/// Owned, materialized workspace directory.
///
/// # Invariants
/// - `root` is absolute and unique among live handles.
/// - The directory is removed when the handle is dropped or closed.
#[derive(Debug)]
pub struct WorkspaceHandle {
    /// Backing temporary directory; `None` once closed.
    dir: Option<TempDir>,
    /// Absolute root path.
    root: PathBuf,
    /// Registry to notify on release, when owned by a lifecycle.
    registry: Option<WorkspaceRegistry>,
}

impl WorkspaceHandle {
    /// Returns the absolute workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a relative path inside the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError`] when `relative` escapes the root.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, WorkspaceError> {
        Ok(self.root.join(normalize_relative(relative.as_ref())?))
    }

    /// Reads a file from the workspace as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError`] when the path is invalid or the read fails.
    pub fn read_to_string(&self, relative: impl AsRef<Path>) -> Result<String, WorkspaceError> {
        let path = self.resolve(relative)?;
        fs::read_to_string(&path).map_err(|err| WorkspaceError::io(&path, &err))
    }

    /// Removes the workspace directory now, reporting failures.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Io`] when the directory cannot be removed.
    pub fn close(mut self) -> Result<(), WorkspaceError> {
        self.release();
        match self.dir.take() {
            Some(dir) => dir.close().map_err(|err| WorkspaceError::io(&self.root, &err)),
            None => Ok(()),
        }
    }

    /// Unregisters the workspace from its lifecycle, if any.
    fn release(&mut self) {
        if let Some(registry) = self.registry.take() {
            registry.release(&self.root);
        }
    }
}

impl Drop for WorkspaceHandle {
    fn drop(&mut self) {
        self.release();
        if let Some(dir) = self.dir.take()
            && let Err(err) = dir.close()
        {
            tracing::warn!(root = %self.root.display(), error = %err, "workspace cleanup failed");
        }
    }
}

// ============================================================================
// SECTION: Materialization
// ============================================================================

/// Materializes `spec` under the system temporary directory.
///
/// # Errors
///
/// Returns [`WorkspaceError`] when directory creation or any write fails.
pub fn materialize(spec: &WorkspaceSpec) -> Result<WorkspaceHandle, WorkspaceError> {
    materialize_in(&std::env::temp_dir(), spec)
}

/// Materializes `spec` in a new uniquely named directory under `parent`.
///
/// # Errors
///
/// Returns [`WorkspaceError`] when directory creation or any write fails.
/// Partially written directories are removed before returning.
pub fn materialize_in(
    parent: &Path,
    spec: &WorkspaceSpec,
) -> Result<WorkspaceHandle, WorkspaceError> {
    materialize_with_registry(parent, spec, None)
}

/// Materializes `spec` and optionally registers the root for defensive cleanup.
pub(crate) fn materialize_with_registry(
    parent: &Path,
    spec: &WorkspaceSpec,
    registry: Option<WorkspaceRegistry>,
) -> Result<WorkspaceHandle, WorkspaceError> {
    fs::create_dir_all(parent).map_err(|err| WorkspaceError::io(parent, &err))?;
    let parent = fs::canonicalize(parent).map_err(|err| WorkspaceError::io(parent, &err))?;
    let dir = tempfile::Builder::new()
        .prefix(WORKSPACE_PREFIX)
        .tempdir_in(&parent)
        .map_err(|err| WorkspaceError::io(&parent, &err))?;
    let root = dir.path().to_path_buf();
    write_entries(&root, spec)?;
    if let Some(registry) = &registry {
        registry.register(&root);
    }
    tracing::debug!(root = %root.display(), files = spec.len(), "materialized workspace");
    Ok(WorkspaceHandle {
        dir: Some(dir),
        root,
        registry,
    })
}

/// Writes every spec entry below `root`, creating parent directories.
fn write_entries(root: &Path, spec: &WorkspaceSpec) -> Result<(), WorkspaceError> {
    for (relative, contents) in spec.entries() {
        let target = root.join(normalize_relative(relative)?);
        if let Some(dir) = target.parent() {
            fs::create_dir_all(dir).map_err(|err| WorkspaceError::io(dir, &err))?;
        }
        fs::write(&target, contents.as_bytes()).map_err(|err| WorkspaceError::io(&target, &err))?;
    }
    Ok(())
}
