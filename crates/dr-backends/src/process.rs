//! Subprocess execution bounded by a render context.
//!
//! Converters are spawned with piped stdio in a process group of their own.
//! The child is polled until it exits; if the context's deadline passes or its
//! token is cancelled first, the whole group is killed and the child reaped.
//! Processes the converter leaves behind are killed once it exits, so nothing
//! outlives the attempt or keeps its pipes open.

use std::ffi::OsString;
use std::io::{self, Read, Write};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use dr_renderer::{FailureKind, RenderContext};

/// How often a running child is checked for exit and interruption.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Upper bound on stderr kept for error messages.
const MAX_STDERR_IN_MESSAGE: usize = 2000;

/// Subprocess error.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("I/O error talking to {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} timed out and was killed")]
    Timeout { program: String },

    #[error("{program} was cancelled and killed")]
    Cancelled { program: String },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
}

impl ProcessError {
    /// Failure category for a render outcome.
    #[must_use]
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::Spawn { .. } => FailureKind::NotAvailable,
            Self::Io { .. } | Self::Failed { .. } => FailureKind::Rendering,
        }
    }
}

/// Captured output of a successful run.
#[derive(Debug)]
pub struct ProcessOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Command line to run for one render.
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: PathBuf,
    args: Vec<OsString>,
    stdin: Option<Vec<u8>>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Bytes written to the child's stdin, which is then closed.
    #[must_use]
    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    #[must_use]
    pub fn arguments(&self) -> &[OsString] {
        &self.args
    }

    /// Run to completion, or until `ctx` interrupts it.
    ///
    /// A non-zero exit is an error carrying the child's stderr.
    pub fn run(self, ctx: &RenderContext) -> Result<ProcessOutput, ProcessError> {
        let program = self.program.display().to_string();
        tracing::debug!(program = %program, args = ?self.args, "Spawning converter");

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(if self.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Stdin and both output pipes are serviced on their own threads so a
        // chatty child can never block on a full pipe.
        let writer = child.stdin.take().zip(self.stdin).map(|(mut pipe, input)| {
            thread::spawn(move || pipe.write_all(&input))
        });
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let interrupted = |kind: FailureKind, program: String| match kind {
            FailureKind::Timeout => ProcessError::Timeout { program },
            _ => ProcessError::Cancelled { program },
        };

        let status = match wait(&mut child, ctx) {
            Ok(Ok(status)) => status,
            Ok(Err(source)) => {
                kill(&mut child, &program);
                return Err(ProcessError::Io { program, source });
            }
            Err(kind) => {
                kill(&mut child, &program);
                return Err(interrupted(kind, program));
            }
        };

        // Leftover background processes would otherwise hold the pipes open.
        kill_group(child.id(), &program);

        let drained = drain_opt(writer, ctx).and_then(|written| {
            Ok((written, drain_opt(stdout, ctx)?, drain_opt(stderr, ctx)?))
        });
        let (written, stdout, stderr) = match drained {
            Ok(results) => results,
            Err(kind) => {
                kill_group(child.id(), &program);
                return Err(interrupted(kind, program));
            }
        };

        let io_err = |source| ProcessError::Io {
            program: program.clone(),
            source,
        };

        // A child may exit without reading all of its input
        if let Some(Err(e)) = written
            && e.kind() != io::ErrorKind::BrokenPipe
        {
            return Err(io_err(e));
        }
        let stdout = stdout.transpose().map_err(io_err)?.unwrap_or_default();
        let stderr = stderr.transpose().map_err(io_err)?.unwrap_or_default();

        if !status.success() {
            return Err(ProcessError::Failed {
                program,
                status,
                stderr: stderr_message(&stderr),
            });
        }
        Ok(ProcessOutput { stdout, stderr })
    }
}

/// Poll `child` until it exits or `ctx` interrupts.
fn wait(child: &mut Child, ctx: &RenderContext) -> Result<io::Result<ExitStatus>, FailureKind> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Ok(status)),
            Ok(None) => {}
            Err(e) => return Ok(Err(e)),
        }
        if let Some(kind) = ctx.interruption() {
            return Err(kind);
        }
        nap(ctx);
    }
}

/// Join a pipe thread unless `ctx` interrupts first.
fn drain<T>(
    handle: JoinHandle<io::Result<T>>,
    ctx: &RenderContext,
) -> Result<io::Result<T>, FailureKind> {
    while !handle.is_finished() {
        if let Some(kind) = ctx.interruption() {
            return Err(kind);
        }
        nap(ctx);
    }
    Ok(handle
        .join()
        .unwrap_or_else(|_| Err(io::Error::other("pipe thread panicked"))))
}

fn drain_opt<T>(
    handle: Option<JoinHandle<io::Result<T>>>,
    ctx: &RenderContext,
) -> Result<Option<io::Result<T>>, FailureKind> {
    handle.map(|handle| drain(handle, ctx)).transpose()
}

fn nap(ctx: &RenderContext) {
    let nap = ctx
        .remaining()
        .map_or(POLL_INTERVAL, |left| left.min(POLL_INTERVAL));
    thread::sleep(nap.max(Duration::from_millis(1)));
}

fn kill(child: &mut Child, program: &str) {
    kill_group(child.id(), program);
    if let Err(e) = child.kill() {
        tracing::debug!(program = %program, error = %e, "Failed to kill converter");
    }
    // Reap the child; the reader threads end once the group's pipes close.
    let _ = child.wait();
    tracing::debug!(program = %program, "Killed converter");
}

/// SIGKILL every process in the group led by `pgid`.
#[cfg(unix)]
fn kill_group(pgid: u32, program: &str) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    if pgid <= 0 {
        return;
    }
    // SAFETY: killpg only sends a signal; the group was created for this child.
    let res = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if res != 0 {
        let err = io::Error::last_os_error();
        // ESRCH: the group is already empty
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::debug!(program = %program, error = %err, "Failed to kill process group");
        }
    }
}

#[cfg(not(unix))]
fn kill_group(_pgid: u32, _program: &str) {}

fn spawn_reader(mut pipe: impl Read + Send + 'static) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn stderr_message(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        return "(no error output)".to_owned();
    }
    match text.char_indices().nth(MAX_STDERR_IN_MESSAGE) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_owned(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Instant;

    use dr_renderer::CancelToken;

    use super::*;

    #[test]
    fn test_stdin_round_trip() {
        let output = ProcessCommand::new("cat")
            .stdin("graph TD; A-->B")
            .run(&RenderContext::new())
            .unwrap();

        assert_eq!(output.stdout, b"graph TD; A-->B");
    }

    #[test]
    fn test_non_zero_exit_reports_stderr() {
        let err = ProcessCommand::new("sh")
            .args(["-c", "echo 'syntax error on line 3' >&2; exit 2"])
            .run(&RenderContext::new())
            .unwrap_err();

        assert_eq!(err.failure_kind(), FailureKind::Rendering);
        assert!(err.to_string().contains("syntax error on line 3"));
    }

    #[test]
    fn test_missing_program() {
        let err = ProcessCommand::new("/nonexistent/dr-converter")
            .run(&RenderContext::new())
            .unwrap_err();

        assert!(matches!(err, ProcessError::Spawn { .. }));
        assert_eq!(err.failure_kind(), FailureKind::NotAvailable);
    }

    #[test]
    fn test_deadline_kills_child() {
        let ctx = RenderContext::new().with_timeout(Duration::from_millis(100));
        let started = Instant::now();

        let err = ProcessCommand::new("sleep")
            .arg("10")
            .run(&ctx)
            .unwrap_err();

        assert!(matches!(err, ProcessError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_cancellation_kills_child() {
        let token = CancelToken::new();
        let ctx = RenderContext::new().with_cancel_token(token.clone());
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            token.cancel();
        });

        let err = ProcessCommand::new("sleep")
            .arg("10")
            .run(&ctx)
            .unwrap_err();
        canceller.join().unwrap();

        assert_eq!(err.failure_kind(), FailureKind::Cancelled);
    }

    /// Whether `pid` names a live (non-zombie) process.
    fn is_running(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with(['Z', 'X'])),
            Err(_) if Path::new("/proc/self").exists() => false,
            Err(_) => Command::new("kill")
                .args(["-0", pid])
                .stderr(Stdio::null())
                .status()
                .is_ok_and(|status| status.success()),
        }
    }

    fn wait_until_gone(pid: &str) -> bool {
        let started = Instant::now();
        while started.elapsed() < Duration::from_secs(2) {
            if !is_running(pid) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_deadline_kills_background_children() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let script = format!("sleep 30 & echo $! > '{}'; wait", pid_file.display());
        let ctx = RenderContext::new().with_timeout(Duration::from_millis(300));

        let err = ProcessCommand::new("sh")
            .args(["-c", script.as_str()])
            .run(&ctx)
            .unwrap_err();

        assert!(matches!(err, ProcessError::Timeout { .. }));
        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        assert!(wait_until_gone(pid), "background sleep {pid} survived the kill");
    }

    #[test]
    fn test_background_child_does_not_hold_output_open() {
        let ctx = RenderContext::new().with_timeout(Duration::from_secs(3));
        let started = Instant::now();

        let output = ProcessCommand::new("sh")
            .args(["-c", "sleep 5 & echo done"])
            .run(&ctx)
            .unwrap();

        assert_eq!(output.stdout, b"done\n");
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_stderr_message_truncation() {
        let long = "x".repeat(MAX_STDERR_IN_MESSAGE + 10);
        let message = stderr_message(long.as_bytes());
        assert!(message.ends_with("..."));
        assert_eq!(stderr_message(b"  \n"), "(no error output)");
    }
}
