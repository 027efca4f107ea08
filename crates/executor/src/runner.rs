//! Process runner: one subprocess, its stdout forwarded into a pipe.
//!
//! The runner owns the pipe's write end for the whole call and closes it
//! before returning, on every path (spawn failure, non-zero exit, timeout).
//! Its permit is held from just before spawn until the process has exited.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use fanout::{CommandSpec, ExecutionError, Timestamp};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::StderrMode;
use crate::pool::ExecutionPool;

/// How one runner call ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOutcome {
    /// When the process was spawned; `None` if it never started.
    pub started_at: Option<Timestamp>,
    /// Exit code of a normally exited process.
    pub exit_code: Option<i32>,
    /// Captured stderr when [`StderrMode::Capture`] is configured.
    pub stderr: Option<Vec<u8>>,
    pub error: Option<ExecutionError>,
}

impl RunOutcome {
    pub(crate) fn failed(error: ExecutionError) -> Self {
        Self {
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Starts processes and forwards their stdout, gated by an [`ExecutionPool`].
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    pool: ExecutionPool,
    stderr: StderrMode,
    timeout: Option<Duration>,
}

/// What happened between spawn and exit.
struct Supervised {
    forwarded: std::io::Result<u64>,
    status: std::io::Result<ExitStatus>,
}

impl ProcessRunner {
    pub fn new(pool: ExecutionPool, stderr: StderrMode, timeout: Option<Duration>) -> Self {
        Self {
            pool,
            stderr,
            timeout,
        }
    }

    pub fn pool(&self) -> &ExecutionPool {
        &self.pool
    }

    /// Runs `spec` with its stdout forwarded into `sink`, then closes `sink`.
    ///
    /// Waits for a permit first. Never fails as a whole: every problem is
    /// reported through [`RunOutcome::error`].
    pub async fn run<W>(&self, spec: &CommandSpec, mut sink: W) -> RunOutcome
    where
        W: AsyncWrite + Unpin,
    {
        let outcome = match self.pool.acquire().await {
            Ok(_permit) => self.execute(spec, &mut sink).await,
            Err(e) => RunOutcome::failed(e),
        };

        if let Err(e) = sink.shutdown().await {
            debug!(error = %e, "pipe already closed by reader");
        }
        drop(sink);
        outcome
    }

    async fn execute<W>(&self, spec: &CommandSpec, sink: &mut W) -> RunOutcome
    where
        W: AsyncWrite + Unpin,
    {
        let program = spec.program().to_string();

        let mut cmd = Command::new(spec.program());
        cmd.args(spec.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(self.stderr.stdio())
            .kill_on_drop(true);
        if let Some(dir) = spec.working_dir() {
            cmd.current_dir(dir);
        }

        let started_at = Timestamp::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(program = %program, error = %e, "failed to start process");
                return RunOutcome::failed(ExecutionError::SpawnFailed {
                    program,
                    reason: e.to_string(),
                });
            }
        };
        debug!(program = %program, pid = ?child.id(), "process started");

        // Outlives a timed-out `supervise` so partial stderr is still reported.
        let mut stderr = None;
        let supervised = match self.timeout {
            Some(limit) => {
                let waited =
                    tokio::time::timeout(limit, supervise(&mut child, sink, &mut stderr)).await;
                match waited {
                    Ok(supervised) => supervised,
                    Err(_) => {
                        let after_ms = saturating_millis(limit);
                        warn!(program = %program, after_ms, "process timed out, killing");
                        if let Err(e) = child.kill().await {
                            warn!(program = %program, error = %e, "failed to kill timed-out process");
                        }
                        return RunOutcome {
                            started_at: Some(started_at),
                            stderr,
                            error: Some(ExecutionError::TimedOut { program, after_ms }),
                            ..RunOutcome::default()
                        };
                    }
                }
            }
            None => supervise(&mut child, sink, &mut stderr).await,
        };

        outcome_from(program, started_at, stderr, supervised)
    }
}

/// Forwards stdout and drains stderr concurrently, then waits for exit.
///
/// Both streams are read to end-of-stream before `wait`, so the child can
/// never block on a full stdout or stderr pipe while we wait for it. Captured
/// stderr lands in `captured` as it arrives.
async fn supervise<W>(
    child: &mut Child,
    sink: &mut W,
    captured: &mut Option<Vec<u8>>,
) -> Supervised
where
    W: AsyncWrite + Unpin,
{
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let forward = async {
        match stdout {
            // `out` is dropped when the copy ends, so a dead reader turns into
            // EPIPE for the child instead of a stuck write.
            Some(mut out) => tokio::io::copy(&mut out, sink).await,
            None => Ok(0),
        }
    };
    let capture = async {
        if let Some(err) = stderr {
            read_stderr(err, captured.insert(Vec::new())).await;
        }
    };

    let (forwarded, ()) = tokio::join!(forward, capture);
    let status = child.wait().await;
    Supervised { forwarded, status }
}

/// Appends to `buf` chunk by chunk, so a cancelled read keeps what it saw.
async fn read_stderr<R: AsyncRead + Unpin>(mut reader: R, buf: &mut Vec<u8>) {
    let mut chunk = [0u8; 1024];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(error = %e, bytes = buf.len(), "stderr read failed, keeping partial output");
                return;
            }
        }
    }
}

fn outcome_from(
    program: String,
    started_at: Timestamp,
    stderr: Option<Vec<u8>>,
    supervised: Supervised,
) -> RunOutcome {
    let Supervised { forwarded, status } = supervised;

    let mut outcome = RunOutcome {
        started_at: Some(started_at),
        stderr,
        ..RunOutcome::default()
    };

    let status = match status {
        Ok(status) => status,
        Err(e) => {
            outcome.error = Some(ExecutionError::WaitFailed {
                program,
                reason: e.to_string(),
            });
            return outcome;
        }
    };
    outcome.exit_code = status.code();

    match forwarded {
        Ok(bytes) => debug!(program = %program, bytes, code = ?status.code(), "process exited"),
        Err(e) => {
            outcome.error = Some(ExecutionError::ForwardFailed {
                program,
                reason: e.to_string(),
            });
            return outcome;
        }
    }

    if !status.success() {
        outcome.error = Some(ExecutionError::NonZeroExit {
            program,
            code: status.code(),
            signal: exit_signal(&status),
        });
    }
    outcome
}

/// Whole milliseconds in `duration`, clamped to `u64::MAX`.
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}
