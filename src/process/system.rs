//! Process runners: the real one and a dry-run stand-in.

use async_trait::async_trait;
use std::convert::Infallible;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Invocation, ProcessError, ProcessOutput, ProcessRunner, Termination};

/// How long to wait for the output pipes to drain once the process has ended.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

// ============================================================================
// System Runner
// ============================================================================

/// Spawns the program with `tokio::process`.
///
/// Stdout and stderr are captured in full. On timeout or cancellation the
/// child is killed and whatever it printed so far is kept.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .current_dir(&invocation.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        let started = Instant::now();
        let mut child = cmd.spawn().map_err(|source| ProcessError::Launch {
            program: invocation.program.clone(),
            source,
        })?;

        let stop = CancellationToken::new();
        let stdout = child.stdout.take().map(|pipe| capture(pipe, stop.clone()));
        let stderr = child.stderr.take().map(|pipe| capture(pipe, stop.clone()));

        let deadline = async {
            match invocation.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        let termination = tokio::select! {
            status = child.wait() => {
                let status = status.map_err(|source| ProcessError::Io {
                    program: invocation.program.clone(),
                    source,
                })?;
                status.code().map_or(Termination::Signalled, Termination::Exited)
            }
            _ = deadline => Termination::TimedOut,
            _ = cancel.cancelled() => Termination::Cancelled,
        };

        if matches!(termination, Termination::TimedOut | Termination::Cancelled) {
            if let Err(e) = child.kill().await {
                warn!(program = %invocation.program, error = %e, "Failed to kill process");
            }
        }

        // After a kill the cancel token has already fired, so only the grace applies
        let drain_cancel = match termination {
            Termination::Exited(_) | Termination::Signalled => cancel.clone(),
            Termination::TimedOut | Termination::Cancelled => CancellationToken::new(),
        };
        let (stdout, stderr) =
            drain(stdout, stderr, &stop, &drain_cancel, &invocation.program).await;

        for line in String::from_utf8_lossy(&stdout).lines() {
            debug!(program = %invocation.program, "stdout: {line}");
        }
        for line in String::from_utf8_lossy(&stderr).lines() {
            debug!(program = %invocation.program, "stderr: {line}");
        }

        Ok(ProcessOutput {
            termination,
            stdout,
            stderr,
            elapsed: started.elapsed(),
        })
    }

    fn name(&self) -> &str {
        "system"
    }
}

/// Read a pipe to its end, or until `stop` fires.
fn capture<R>(mut pipe: R, stop: CancellationToken) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 8192];
        loop {
            tokio::select! {
                read = pipe.read(&mut chunk) => match read {
                    Ok(0) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    // A read error only truncates the capture
                    Err(_) => break,
                },
                _ = stop.cancelled() => break,
            }
        }
        buf
    })
}

/// Join both capture tasks. Background grandchildren may keep a pipe open
/// after the process itself is gone, so the wait is bounded by the grace
/// period and by `cancel`; the capture collected so far is kept.
async fn drain(
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    stop: &CancellationToken,
    cancel: &CancellationToken,
    program: &str,
) -> (Vec<u8>, Vec<u8>) {
    let stopper = async {
        tokio::select! {
            _ = tokio::time::sleep(PIPE_DRAIN_GRACE) => {
                warn!(program, "Output pipe still open after the process ended, capture truncated");
            }
            _ = cancel.cancelled() => {}
        }
        stop.cancel();
        std::future::pending::<Infallible>().await
    };

    tokio::select! {
        captured = async { tokio::join!(join(stdout), join(stderr)) } => captured,
        never = stopper => match never {},
    }
}

async fn join(handle: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => Vec::new(),
    }
}

// ============================================================================
// Dry Run Runner
// ============================================================================

/// Logs each command and reports success without running anything.
#[derive(Debug, Default, Clone)]
pub struct DryRunRunner;

#[async_trait]
impl ProcessRunner for DryRunRunner {
    async fn run(
        &self,
        invocation: &Invocation,
        _cancel: &CancellationToken,
    ) -> Result<ProcessOutput, ProcessError> {
        info!(
            cwd = %invocation.working_dir.display(),
            env = ?invocation.env,
            "[dry-run] {}",
            invocation.command_line()
        );
        Ok(ProcessOutput::exited(0))
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
