//! External Process Runner
//!
//! Supervised execution of one external command per pipeline stage:
//!
//! - the working directory is a parameter of the invocation, never ambient
//!   process state
//! - a launch failure is an error, a non-zero exit is an outcome
//! - timeout and cancellation are first-class terminations, distinct from
//!   an exit status
//!
//! [`supervise`] runs an invocation through any [`ProcessRunner`], checks the
//! exit status against the stage's accepted codes and writes the stage logs.

mod system;

pub use system::{DryRunRunner, SystemRunner};

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::defaults::DEFAULT_ACCEPTED_RETURN_CODES;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started at all
    #[error("failed to launch '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The program started but supervising it failed
    #[error("I/O error while running '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A stage log could not be written
    #[error("failed to write log {}: {source}", path.display())]
    Log {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Invocation
// ============================================================================

/// One external command, fully resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Directory the process runs in
    pub working_dir: PathBuf,
    /// Environment overrides for this process only
    pub env: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: working_dir.into(),
            env: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append `key value` as two arguments (SPA wrapper style).
    pub fn key_value(self, key: &str, value: impl AsRef<Path>) -> Self {
        let value = value.as_ref().display().to_string();
        self.arg(key).arg(value)
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable command line for logs
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Resolve a log path against the working directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }
}

// ============================================================================
// Process Output
// ============================================================================

/// How the process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exited with a status code
    Exited(i32),
    /// Killed by a signal it did not handle
    Signalled,
    /// Killed after exceeding the invocation timeout
    TimedOut,
    /// Killed because shutdown was requested
    Cancelled,
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exit code {code}"),
            Termination::Signalled => write!(f, "killed by signal"),
            Termination::TimedOut => write!(f, "timed out"),
            Termination::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Captured result of one process run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub termination: Termination,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub elapsed: Duration,
}

impl ProcessOutput {
    /// Output of a process that exited with `code` and printed nothing
    pub fn exited(code: i32) -> Self {
        Self {
            termination: Termination::Exited(code),
            stdout: Vec::new(),
            stderr: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.termination {
            Termination::Exited(code) => Some(code),
            _ => None,
        }
    }
}

// ============================================================================
// Runner Trait
// ============================================================================

/// Executes invocations.
///
/// Implementations must honour `invocation.working_dir`, `invocation.env`
/// and `invocation.timeout`, and stop the process when `cancel` fires.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError>;

    /// Runner name for logs
    fn name(&self) -> &str;
}

// ============================================================================
// Stage Supervision
// ============================================================================

/// Exit codes a stage treats as success
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedCodes(BTreeSet<i32>);

impl Default for AcceptedCodes {
    fn default() -> Self {
        Self(DEFAULT_ACCEPTED_RETURN_CODES.iter().copied().collect())
    }
}

impl AcceptedCodes {
    pub fn new(codes: impl IntoIterator<Item = i32>) -> Self {
        Self(codes.into_iter().collect())
    }

    pub fn accepts(&self, code: i32) -> bool {
        self.0.contains(&code)
    }
}

/// Where a stage's output goes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageLogs {
    /// Always receives the captured stdout
    pub stdout: Option<PathBuf>,
    /// Always receives the captured stderr
    pub stderr: Option<PathBuf>,
    /// Receives stdout followed by stderr when the stage fails
    pub error: Option<PathBuf>,
}

/// Success/failure verdict of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Success,
    /// Exited outside the accepted set, or killed by a signal
    Failed,
    TimedOut,
    Cancelled,
}

/// Result of one supervised stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub output: ProcessOutput,
    pub verdict: Verdict,
}

impl StageOutcome {
    pub fn is_success(&self) -> bool {
        self.verdict == Verdict::Success
    }
}

/// Judge a process output against the accepted codes.
pub fn judge(output: &ProcessOutput, accepted: &AcceptedCodes) -> Verdict {
    match output.termination {
        Termination::Exited(code) if accepted.accepts(code) => Verdict::Success,
        Termination::Exited(_) | Termination::Signalled => Verdict::Failed,
        Termination::TimedOut => Verdict::TimedOut,
        Termination::Cancelled => Verdict::Cancelled,
    }
}

/// Run one stage: execute, judge, write logs.
///
/// Only a launch or supervision failure is an `Err`; every way the process
/// can end is reported through the outcome's verdict. Log files are best
/// effort.
pub async fn supervise(
    runner: &dyn ProcessRunner,
    invocation: &Invocation,
    accepted: &AcceptedCodes,
    logs: &StageLogs,
    cancel: &CancellationToken,
) -> Result<StageOutcome, ProcessError> {
    info!(
        runner = runner.name(),
        cwd = %invocation.working_dir.display(),
        "Command: {}",
        invocation.command_line()
    );

    let output = runner.run(invocation, cancel).await?;
    let verdict = judge(&output, accepted);

    // A log that cannot be written never changes the verdict
    if let Some(path) = &logs.stdout {
        write_log_or_warn(&invocation.resolve(path), &[&output.stdout]).await;
    }
    if let Some(path) = &logs.stderr {
        write_log_or_warn(&invocation.resolve(path), &[&output.stderr]).await;
    }

    match verdict {
        Verdict::Success => {
            debug!(
                program = %invocation.program,
                elapsed_ms = output.elapsed.as_millis() as u64,
                "Command complete"
            );
        }
        Verdict::Failed => {
            error!(
                program = %invocation.program,
                "Command {} failed with {}",
                invocation.command_line(),
                output.termination
            );
            if let Some(path) = &logs.error {
                let path = invocation.resolve(path);
                if write_log_or_warn(&path, &[&output.stdout, &output.stderr]).await {
                    warn!(log = %path.display(), "Captured output written to error log");
                } else {
                    error!("stdout was: {}", String::from_utf8_lossy(&output.stdout));
                    error!("stderr was: {}", String::from_utf8_lossy(&output.stderr));
                }
            } else {
                error!("stdout was: {}", String::from_utf8_lossy(&output.stdout));
                error!("stderr was: {}", String::from_utf8_lossy(&output.stderr));
            }
        }
        Verdict::TimedOut => {
            error!(
                program = %invocation.program,
                timeout_secs = invocation.timeout.map_or(0, |t| t.as_secs()),
                "Command timed out and was killed"
            );
        }
        Verdict::Cancelled => {
            warn!(program = %invocation.program, "Command cancelled by shutdown");
        }
    }

    Ok(StageOutcome { output, verdict })
}

/// Returns whether the log was written.
async fn write_log_or_warn(path: &Path, parts: &[&[u8]]) -> bool {
    match write_log(path, parts).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "Stage log not written");
            false
        }
    }
}

async fn write_log(path: &Path, parts: &[&[u8]]) -> Result<(), ProcessError> {
    let bytes = parts.concat();
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| ProcessError::Log {
            path: path.to_path_buf(),
            source,
        })
}
