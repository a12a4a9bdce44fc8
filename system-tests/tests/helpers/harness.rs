// system-tests/tests/helpers/harness.rs
// ============================================================================
// Module: Stub Tool Harness
// Description: Helpers for installing stub tools and building harnesses.
// Purpose: Provide deterministic tool setup and teardown for suites.
// Dependencies: flagcheck-core, system-tests, tempfile
// ============================================================================

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use flagcheck_core::HarnessLifecycle;
use flagcheck_core::LifecycleSettings;
use flagcheck_core::SetupError;
use system_tests::config::SystemTestConfig;
use tempfile::TempDir;

/// Grace period between `SIGTERM` and `SIGKILL` for suite runs.
const SUITE_GRACE_PERIOD: Duration = Duration::from_millis(200);

/// An executable shell script standing in for the tool under test.
pub struct StubTool {
    dir: TempDir,
    path: PathBuf,
}

impl StubTool {
    /// Writes `body` as an executable script named `name`.
    pub fn install(name: &str, body: &str) -> io::Result<Self> {
        let config = SystemTestConfig::load().map_err(io::Error::other)?;
        let dir = tempfile::Builder::new().prefix("flagcheck-stub-").tempdir()?;
        let path = dir.path().join(name);
        fs::write(&path, format!("#!{}\n{body}", config.shell.display()))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(Self {
            dir,
            path,
        })
    }

    /// Returns the script path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the directory used as parent for run roots.
    pub fn runs_dir(&self) -> PathBuf {
        self.dir.path().join("runs")
    }

    /// Returns lifecycle settings for this tool with the suite timeout applied.
    pub fn settings(&self, timeout: Duration) -> io::Result<LifecycleSettings> {
        let config = SystemTestConfig::load().map_err(io::Error::other)?;
        let mut settings = LifecycleSettings::new(&self.path);
        settings.runner.default_timeout = config.resolve_timeout(timeout);
        settings.runner.grace_period = SUITE_GRACE_PERIOD;
        settings.workspace_parent = Some(self.runs_dir());
        Ok(settings)
    }

    /// Sets up a harness around this tool.
    pub fn harness(&self, timeout: Duration) -> Result<HarnessLifecycle, Box<dyn std::error::Error>> {
        let settings = self.settings(timeout)?;
        Ok(HarnessLifecycle::setup(settings)?)
    }
}

/// Returns true when `dir` has no entries (or does not exist).
pub fn is_empty_dir(dir: &Path) -> bool {
    match fs::read_dir(dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

/// Sets up a harness for a tool that must not resolve.
pub fn setup_missing(program: &Path) -> Result<HarnessLifecycle, SetupError> {
    HarnessLifecycle::setup(LifecycleSettings::new(program))
}
