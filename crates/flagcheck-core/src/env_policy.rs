// crates/flagcheck-core/src/env_policy.rs
// ============================================================================
// Module: Subprocess Environment Policy
// Description: Allow/deny rules for the environment handed to the tool.
// Purpose: Keep tool runs reproducible while still locating executables.
// Dependencies: std
// ============================================================================

//! ## Overview
//! The tool under test never inherits the harness environment wholesale.
//! [`EnvPolicy`] starts from an empty environment and rebuilds it:
//! 1. forward allowlisted variables (or all of them with `forward_all`),
//! 2. drop variables whose names start with a stripped prefix,
//! 3. apply explicit overrides.
//!
//! The search-path variable is always forwarded so the tool and its helpers
//! can be located.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::ffi::OsString;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Name of the executable search-path variable.
pub const PATH_VAR: &str = "PATH";

/// Variables forwarded by default.
pub const DEFAULT_FORWARD: &[&str] = &["PATH", "HOME", "USER", "LANG", "TMPDIR"];

/// Prefixes stripped by default. `TEST_` variables would make a nested build
/// tool believe it is itself running under a test runner.
pub const DEFAULT_STRIP_PREFIXES: &[&str] = &["TEST_"];

// ============================================================================
// SECTION: Policy
// ============================================================================

/// Environment allow/deny policy for tool invocations.
///
/// # Invariants
/// - `PATH` is forwarded regardless of the allowlist or stripped prefixes.
/// - Explicit overrides win over every other rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvPolicy {
    /// Variable names copied from the harness process.
    forward: BTreeSet<String>,
    /// Copy every harness variable (minus stripped prefixes).
    forward_all: bool,
    /// Name prefixes removed from forwarded variables.
    strip_prefixes: Vec<String>,
    /// Explicit variables set on the child.
    overrides: BTreeMap<String, String>,
}

impl Default for EnvPolicy {
    fn default() -> Self {
        Self {
            forward: DEFAULT_FORWARD.iter().map(|name| (*name).to_string()).collect(),
            forward_all: false,
            strip_prefixes: DEFAULT_STRIP_PREFIXES.iter().map(|p| (*p).to_string()).collect(),
            overrides: BTreeMap::new(),
        }
    }
}

impl EnvPolicy {
    /// Policy forwarding only `PATH`.
    #[must_use]
    pub fn isolated() -> Self {
        Self {
            forward: BTreeSet::from([PATH_VAR.to_string()]),
            forward_all: false,
            strip_prefixes: Vec::new(),
            overrides: BTreeMap::new(),
        }
    }

    /// Adds a forwarded variable name.
    #[must_use]
    pub fn forward(mut self, name: impl Into<String>) -> Self {
        self.forward.insert(name.into());
        self
    }

    /// Enables or disables forwarding of the whole harness environment.
    #[must_use]
    pub const fn forward_all(mut self, enabled: bool) -> Self {
        self.forward_all = enabled;
        self
    }

    /// Adds a stripped name prefix.
    #[must_use]
    pub fn strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefixes.push(prefix.into());
        self
    }

    /// Sets an explicit variable on the child.
    #[must_use]
    pub fn set(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.overrides.insert(key.into(), value.into());
        self
    }

    /// Resolves the child environment from the current process environment.
    #[must_use]
    pub fn resolve(&self) -> BTreeMap<OsString, OsString> {
        self.resolve_from(std::env::vars_os())
    }

    /// Resolves the child environment from an explicit ambient environment.
    #[must_use]
    pub fn resolve_from<I>(&self, ambient: I) -> BTreeMap<OsString, OsString>
    where
        I: IntoIterator<Item = (OsString, OsString)>,
    {
        let mut resolved: BTreeMap<OsString, OsString> = ambient
            .into_iter()
            .filter(|(key, _)| self.admits(&key.to_string_lossy()))
            .collect();
        for (key, value) in &self.overrides {
            resolved.insert(OsString::from(key), OsString::from(value));
        }
        resolved
    }

    /// Returns true when an ambient variable should reach the child.
    fn admits(&self, key: &str) -> bool {
        if is_search_path(key) {
            return true;
        }
        let allowed = self.forward_all || self.forward.contains(key);
        allowed && !self.strip_prefixes.iter().any(|prefix| key.starts_with(prefix.as_str()))
    }
}

/// Returns true for the platform's search-path variable name.
fn is_search_path(key: &str) -> bool {
    if cfg!(windows) { key.eq_ignore_ascii_case(PATH_VAR) } else { key == PATH_VAR }
}
