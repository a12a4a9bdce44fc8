// crates/flagcheck-core/src/bundle.rs
// ============================================================================
// Module: Workspace Bundle Codec
// Description: Text format bundling several named files in one literal block.
// Purpose: Let scenarios express fixture projects compactly.
// Dependencies: thiserror, crate::workspace
// ============================================================================

//! ## Overview
//! A bundle is plain text where a delimiter line `-- relative/path --` names
//! the file whose content follows, up to the next delimiter or end of input.
//! Text before the first delimiter is a free-form comment and is ignored.
//! Non-empty file bodies always end with a newline.
//!
//! Rendering is exact: [`render_bundle`] refuses any spec whose bundle text
//! would parse back differently (a body line shaped like a delimiter, a
//! non-empty body without a trailing newline, or a path the delimiter cannot
//! carry verbatim).
//!
//! The harness operates on the parsed [`WorkspaceSpec`]; this module is only
//! the serialization layer on top of it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::workspace::WorkspaceError;
use crate::workspace::WorkspaceSpec;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Opening token of a file delimiter line.
const MARKER_OPEN: &str = "-- ";
/// Closing token of a file delimiter line.
const MARKER_CLOSE: &str = " --";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Bundle parsing and rendering errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    /// A delimiter line did not name a file.
    #[error("bundle line {line}: file marker has an empty name")]
    EmptyName {
        /// 1-based line number of the marker.
        line: usize,
    },
    /// A named file was rejected by the workspace spec.
    #[error("bundle line {line}: {source}")]
    Entry {
        /// 1-based line number of the marker.
        line: usize,
        /// Underlying path validation error.
        #[source]
        source: WorkspaceError,
    },
    /// A file body contains a line that would parse as a delimiter.
    #[error("cannot render `{path}`: body line {line} looks like a file marker")]
    AmbiguousBody {
        /// Workspace-relative path of the file.
        path: String,
        /// 1-based line number within the body.
        line: usize,
    },
    /// A non-empty file body does not end with a newline.
    #[error("cannot render `{path}`: non-empty body must end with a newline")]
    MissingTrailingNewline {
        /// Workspace-relative path of the file.
        path: String,
    },
    /// A path cannot be written inside a delimiter line verbatim.
    #[error("cannot render path `{path}` as a file marker")]
    UnrenderablePath {
        /// Workspace-relative path of the file.
        path: String,
    },
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses bundle text into a [`WorkspaceSpec`].
///
/// # Errors
///
/// Returns [`BundleError`] when a marker is empty or names an invalid or
/// duplicate path.
pub fn parse_bundle(text: &str) -> Result<WorkspaceSpec, BundleError> {
    let mut spec = WorkspaceSpec::new();
    let mut current: Option<(usize, String, String)> = None;

    for (index, line) in text.split_inclusive('\n').enumerate() {
        let line_no = index + 1;
        match marker_name(line) {
            Some(name) => {
                if let Some(file) = current.take() {
                    push_file(&mut spec, file)?;
                }
                if name.is_empty() {
                    return Err(BundleError::EmptyName {
                        line: line_no,
                    });
                }
                current = Some((line_no, name.to_string(), String::new()));
            }
            None => {
                if let Some((_, _, body)) = current.as_mut() {
                    body.push_str(line);
                }
            }
        }
    }
    if let Some(file) = current.take() {
        push_file(&mut spec, file)?;
    }
    Ok(spec)
}

/// Returns the file name when `line` is a delimiter line.
fn marker_name(line: &str) -> Option<&str> {
    let line = line.strip_suffix('\n').unwrap_or(line);
    let line = line.strip_suffix('\r').unwrap_or(line);
    let inner = line.strip_prefix(MARKER_OPEN)?.strip_suffix(MARKER_CLOSE)?;
    Some(inner.trim())
}

/// Adds a parsed file to the spec, normalizing its trailing newline.
fn push_file(
    spec: &mut WorkspaceSpec,
    (line, name, mut body): (usize, String, String),
) -> Result<(), BundleError> {
    if !body.is_empty() && !body.ends_with('\n') {
        body.push('\n');
    }
    spec.insert(&name, body).map_err(|source| BundleError::Entry {
        line,
        source,
    })
}

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders a [`WorkspaceSpec`] as bundle text.
///
/// [`parse_bundle`] of the result reproduces `spec` exactly.
///
/// # Errors
///
/// Returns [`BundleError`] when a file cannot be represented without loss.
pub fn render_bundle(spec: &WorkspaceSpec) -> Result<String, BundleError> {
    let mut out = String::new();
    for (path, contents) in spec.entries() {
        let path = path.display().to_string();
        let marker = format!("{MARKER_OPEN}{path}{MARKER_CLOSE}\n");
        if marker_name(&marker) != Some(path.as_str()) || path.contains(['\n', '\r']) {
            return Err(BundleError::UnrenderablePath {
                path,
            });
        }
        if !contents.is_empty() && !contents.ends_with('\n') {
            return Err(BundleError::MissingTrailingNewline {
                path,
            });
        }
        let ambiguous = contents.split_inclusive('\n').position(|line| marker_name(line).is_some());
        if let Some(index) = ambiguous {
            return Err(BundleError::AmbiguousBody {
                path,
                line: index + 1,
            });
        }
        out.push_str(&marker);
        out.push_str(contents);
    }
    Ok(out)
}
