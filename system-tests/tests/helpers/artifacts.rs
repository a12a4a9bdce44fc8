// system-tests/tests/helpers/artifacts.rs
// ============================================================================
// Module: Test Artifacts
// Description: Artifact helpers for system-tests.
// Purpose: Keep scenario reports and summaries for each suite run.
// Dependencies: flagcheck-core, system-tests, serde, serde_jcs
// ============================================================================

use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use flagcheck_core::ScenarioReport;
use serde::Serialize;
use system_tests::config::SystemTestConfig;

#[derive(Debug, Serialize)]
struct TestSummary {
    test_name: String,
    status: String,
    duration_ms: u128,
    notes: Vec<String>,
    artifacts: Vec<String>,
}

fn now_millis() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis()
}

/// Artifact directory for a single system-test.
#[derive(Debug, Clone)]
pub struct TestArtifacts {
    root: PathBuf,
    written: Vec<String>,
}

impl TestArtifacts {
    /// Creates `<run root>/<test name>`; the run root defaults to
    /// `target/system-tests/run_<millis>`.
    pub fn new(test_name: &str) -> io::Result<Self> {
        let config = SystemTestConfig::load().map_err(io::Error::other)?;
        let base = config.run_root.unwrap_or_else(|| {
            PathBuf::from("target/system-tests").join(format!("run_{}", now_millis()))
        });
        let root = base.join(test_name);
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            written: Vec::new(),
        })
    }

    /// Returns the artifact directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Writes a JSON artifact using canonical JCS serialization.
    pub fn write_json<T: Serialize>(&mut self, name: &str, value: &T) -> io::Result<PathBuf> {
        let bytes = serde_jcs::to_vec(value).map_err(|err| io::Error::other(err.to_string()))?;
        self.write_bytes(name, &bytes)
    }

    /// Writes a UTF-8 text artifact.
    pub fn write_text(&mut self, name: &str, value: &str) -> io::Result<PathBuf> {
        self.write_bytes(name, value.as_bytes())
    }

    /// Writes a scenario summary plus the rendered text of every mismatch.
    pub fn write_report(&mut self, report: &ScenarioReport) -> io::Result<()> {
        self.write_json(&format!("{}.summary.json", report.scenario), &report.summary())?;
        let mut text = String::new();
        for mismatch in report.mismatches() {
            let _ = writeln!(text, "{mismatch}");
        }
        if !text.is_empty() {
            self.write_text(&format!("{}.mismatches.txt", report.scenario), &text)?;
        }
        Ok(())
    }

    fn write_bytes(&mut self, name: &str, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.root.join(name);
        fs::write(&path, bytes)?;
        self.written.push(name.to_string());
        Ok(path)
    }
}

/// Writes a summary when the test ends, including on panic.
pub struct TestReporter {
    artifacts: TestArtifacts,
    test_name: String,
    started_at_ms: u128,
    finalized: bool,
}

impl TestReporter {
    /// Creates a reporter for the named test.
    pub fn new(test_name: &str) -> io::Result<Self> {
        Ok(Self {
            artifacts: TestArtifacts::new(test_name)?,
            test_name: test_name.to_string(),
            started_at_ms: now_millis(),
            finalized: false,
        })
    }

    /// Returns the artifact directory.
    pub fn artifacts(&mut self) -> &mut TestArtifacts {
        &mut self.artifacts
    }

    /// Writes the final summary for the test.
    pub fn finish(&mut self, status: &str, notes: Vec<String>) -> io::Result<()> {
        let summary = TestSummary {
            test_name: self.test_name.clone(),
            status: status.to_string(),
            duration_ms: now_millis().saturating_sub(self.started_at_ms),
            notes,
            artifacts: self.artifacts.written.clone(),
        };
        self.finalized = true;
        self.artifacts.write_json("summary.json", &summary)?;
        Ok(())
    }
}

impl Drop for TestReporter {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        let status = if std::thread::panicking() { "panic" } else { "unknown" };
        let _ = self.finish(status, vec!["test ended without an explicit summary".to_string()]);
    }
}
