// crates/flagcheck-core/src/runner.rs
// ============================================================================
// Module: Subprocess Runner
// Description: Launches the tool under test and observes how it terminates.
// Purpose: Capture output and termination with a bounded timeout.
// Dependencies: tokio, async-trait, libc (unix), crate::capture, crate::env_policy
// ============================================================================

//! ## Overview
//! [`ProcessRunner`] spawns the tool with an explicit environment (see
//! [`EnvPolicy`]), drains stdout and stderr concurrently into bounded tail
//! buffers, and waits for exit. A nonzero exit is a normal [`RunResult`];
//! [`RunnerError`] is reserved for failing to launch or wait on the process.
//!
//! On timeout the runner sends `SIGTERM` to the child's process group, waits
//! a grace period, then sends `SIGKILL` to the group and reaps the child.
//! Known limitation: descendants that move themselves into another process
//! group (or session) are not signalled and may outlive the run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::process::Child;
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::capture::CapturedOutput;
use crate::env_policy::EnvPolicy;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Timeout applied when a request does not carry its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Time between `SIGTERM` and `SIGKILL` when a run times out.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(2);
/// Default per-stream capture limit.
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;
/// Read buffer size for output pipes.
const READ_CHUNK_BYTES: usize = 8 * 1024;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// A single tool invocation.
///
/// # Invariants
/// - Immutable once built; builder methods consume `self`.
/// - Arguments are passed argv-style, never through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Executable name or path.
    program: PathBuf,
    /// Ordered arguments.
    args: Vec<String>,
    /// Working directory for the child.
    working_dir: PathBuf,
    /// Per-request timeout override.
    timeout: Option<Duration>,
}

impl RunRequest {
    /// Creates a request with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            timeout: None,
        }
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the timeout for this request.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the executable.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Returns the arguments.
    #[must_use]
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Returns the working directory.
    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Returns the per-request timeout, if set.
    #[must_use]
    pub const fn timeout_override(&self) -> Option<Duration> {
        self.timeout
    }

    /// Renders the command line with shell-style quoting, for reports.
    #[must_use]
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(shell_quote(&self.program.display().to_string()));
        parts.extend(self.args.iter().map(|arg| shell_quote(arg)));
        parts.join(" ")
    }
}

/// Quotes a word for display when it contains shell metacharacters.
fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word.chars().all(|c| c.is_ascii_alphanumeric() || "_-./:=@,+%^~".contains(c));
    if plain { word.to_string() } else { format!("'{}'", word.replace('\'', r"'\''")) }
}

// ============================================================================
// SECTION: Results
// ============================================================================

/// Raw termination descriptor of a tool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Termination {
    /// The process exited with this code.
    Exited(i32),
    /// The process was terminated by this signal.
    Signaled(i32),
    /// The harness killed the process after the timeout elapsed.
    TimedOut,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exited(code) => write!(f, "exited with code {code}"),
            Self::Signaled(signal) => write!(f, "terminated by signal {signal}"),
            Self::TimedOut => f.write_str("timed out"),
        }
    }
}

/// Observed result of one tool run.
///
/// Produced once per invocation and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Captured standard output (tail).
    pub stdout: CapturedOutput,
    /// Captured standard error (tail).
    pub stderr: CapturedOutput,
    /// How the process ended.
    pub termination: Termination,
    /// Wall-clock time from spawn to termination.
    pub elapsed: Duration,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Failures to run the tool at all.
///
/// A nonzero exit is never a `RunnerError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// The process could not be started.
    #[error("failed to launch `{command}`: {message}")]
    Spawn {
        /// Rendered command line.
        command: String,
        /// Underlying error message.
        message: String,
    },
    /// The process started but could not be waited on.
    #[error("failed while waiting on `{command}`: {message}")]
    Wait {
        /// Rendered command line.
        command: String,
        /// Underlying error message.
        message: String,
    },
}

// ============================================================================
// SECTION: Runner Interface
// ============================================================================

/// Executes run requests.
///
/// The seam lets scenarios run against a real process or a scripted stand-in.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Runs `request` to completion or timeout.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] only when the tool cannot be launched or awaited.
    async fn run(&self, request: &RunRequest) -> Result<RunResult, RunnerError>;
}

// ============================================================================
// SECTION: Process Runner
// ============================================================================

/// Settings for [`ProcessRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Environment policy for children.
    pub env: EnvPolicy,
    /// Timeout used when a request has none.
    pub default_timeout: Duration,
    /// Delay between `SIGTERM` and `SIGKILL` on timeout.
    pub grace_period: Duration,
    /// Per-stream capture limit in bytes.
    pub max_output_bytes: usize,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            env: EnvPolicy::default(),
            default_timeout: DEFAULT_TIMEOUT,
            grace_period: DEFAULT_GRACE_PERIOD,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }
}

/// Runs requests as real child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    /// Runner settings.
    settings: RunnerSettings,
}

impl ProcessRunner {
    /// Creates a runner with the given settings.
    #[must_use]
    pub const fn new(settings: RunnerSettings) -> Self {
        Self {
            settings,
        }
    }

    /// Returns the runner settings.
    #[must_use]
    pub const fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    /// Builds the tokio command for a request.
    fn command(&self, request: &RunRequest) -> Command {
        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .current_dir(&request.working_dir)
            .env_clear()
            .envs(self.settings.env.resolve())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        command
    }
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(&self, request: &RunRequest) -> Result<RunResult, RunnerError> {
        let command_line = request.command_line();
        let timeout = request.timeout.unwrap_or(self.settings.default_timeout);
        tracing::debug!(
            command = %command_line,
            cwd = %request.working_dir.display(),
            timeout_ms = duration_millis(timeout),
            "launching tool"
        );

        let started = Instant::now();
        let mut child = self.command(request).spawn().map_err(|err| RunnerError::Spawn {
            command: command_line.clone(),
            message: err.to_string(),
        })?;

        let limit = self.settings.max_output_bytes;
        let stdout = Arc::new(Mutex::new(CapturedOutput::new(limit)));
        let stderr = Arc::new(Mutex::new(CapturedOutput::new(limit)));
        let mut readers = Vec::with_capacity(2);
        if let Some(pipe) = child.stdout.take() {
            readers.push(tokio::spawn(drain(pipe, Arc::clone(&stdout))));
        }
        if let Some(pipe) = child.stderr.take() {
            readers.push(tokio::spawn(drain(pipe, Arc::clone(&stderr))));
        }

        let termination = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(Ok(status)) => termination_from_status(status),
            Ok(Err(err)) => {
                return Err(RunnerError::Wait {
                    command: command_line,
                    message: err.to_string(),
                });
            }
            Err(_) => {
                tracing::warn!(
                    command = %command_line,
                    timeout_ms = duration_millis(timeout),
                    "tool timed out; terminating process group"
                );
                terminate(&mut child, self.settings.grace_period).await;
                Termination::TimedOut
            }
        };
        let elapsed = started.elapsed();

        finish_readers(readers, self.settings.grace_period).await;
        let result = RunResult {
            stdout: snapshot(&stdout),
            stderr: snapshot(&stderr),
            termination,
            elapsed,
        };
        tracing::debug!(
            command = %command_line,
            termination = %result.termination,
            elapsed_ms = duration_millis(elapsed),
            "tool finished"
        );
        Ok(result)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Copies a pipe into a shared capture until EOF.
async fn drain<R>(mut reader: R, sink: Arc<Mutex<CapturedOutput>>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK_BYTES];
    loop {
        let read = reader.read(&mut buf).await?;
        if read == 0 {
            return Ok(());
        }
        sink.lock().unwrap_or_else(PoisonError::into_inner).push(&buf[.. read]);
    }
}

/// Waits briefly for readers to hit EOF, then abandons them.
///
/// Descendants that inherited the pipes can keep them open after the child
/// exits; captured output up to that point is kept.
async fn finish_readers(readers: Vec<JoinHandle<std::io::Result<()>>>, grace: Duration) {
    for mut reader in readers {
        match tokio::time::timeout(grace, &mut reader).await {
            Ok(Ok(Ok(()))) => {}
            Ok(Ok(Err(err))) => tracing::debug!(error = %err, "output pipe read failed"),
            Ok(Err(err)) => tracing::debug!(error = %err, "output reader task failed"),
            Err(_) => {
                tracing::debug!("output pipe still open after exit; abandoning reader");
                reader.abort();
            }
        }
    }
}

/// Converts a duration to whole milliseconds for log fields.
fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Clones the current state of a shared capture.
fn snapshot(capture: &Arc<Mutex<CapturedOutput>>) -> CapturedOutput {
    capture.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Converts a platform exit status into a termination descriptor.
fn termination_from_status(status: ExitStatus) -> Termination {
    if let Some(code) = status.code() {
        return Termination::Exited(code);
    }
    exit_signal(status).map_or(Termination::Exited(-1), Termination::Signaled)
}

/// Returns the terminating signal, if any.
#[cfg(unix)]
fn exit_signal(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

/// Returns the terminating signal, if any.
#[cfg(not(unix))]
const fn exit_signal(_status: ExitStatus) -> Option<i32> {
    None
}

/// Terminates a timed-out child and its process group, then reaps it.
async fn terminate(child: &mut Child, grace: Duration) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        signal_group(pid, libc::SIGTERM);
        let exited = tokio::time::timeout(grace, child.wait()).await.is_ok();
        if !exited {
            tracing::warn!(pid, "tool ignored SIGTERM; sending SIGKILL");
        }
        signal_group(pid, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    let _ = grace;
    if let Err(err) = child.start_kill() {
        tracing::debug!(error = %err, "kill after timeout failed");
    }
    if let Err(err) = child.wait().await {
        tracing::warn!(error = %err, "failed to reap timed-out tool");
    }
}

/// Sends `signal` to the process group led by `pid`.
#[cfg(unix)]
#[allow(unsafe_code, reason = "Signalling a process group requires libc::kill.")]
fn signal_group(pid: u32, signal: libc::c_int) {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: kill(2) takes plain integers and has no memory-safety
    // preconditions; the negative pid addresses the group created by
    // `process_group(0)` at spawn.
    let rc = unsafe { libc::kill(-pid, signal) };
    if rc != 0 {
        tracing::debug!(pid, signal, error = %std::io::Error::last_os_error(), "group signal failed");
    }
}
