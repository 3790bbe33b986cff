//! Supervision of a single child process.
//!
//! [`ProcessRunner`] spawns one tool, forwards its stdout and stderr through
//! an unbounded channel fed by one reader task per stream, and exposes a
//! poll-based wait. Each [`ProcessRunner::poll_once`] performs one bounded
//! wait, drains whatever output is available and enforces the stall timeout,
//! which measures time since the last successful read. An exit is only
//! reported once the pipes reach EOF or go quiet.

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

use tb_core::{Error, Result};

/// Size of a single read from a child pipe.
const READ_CHUNK: usize = 64 * 1024;

/// Minimum wait for the next chunk once the child has exited and its pipes
/// are still open.
const EXIT_GRACE: Duration = Duration::from_secs(1);

/// Outcome of a single poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollStatus {
    Running,
    Exited(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

#[derive(Debug)]
enum Event {
    Data(Stream, Vec<u8>),
    Eof(Stream),
    Failed(Stream, io::Error),
}

/// Output gathered during one poll.
#[derive(Debug, Default)]
struct Batch {
    stdout: String,
    stderr: String,
    failure: Option<io::Error>,
}

impl Batch {
    fn push(&mut self, stream: Stream, text: &str) {
        match stream {
            Stream::Stdout => self.stdout.push_str(text),
            Stream::Stderr => self.stderr.push_str(text),
        }
    }
}

/// Receiving end of the reader tasks, with the undecoded tail of each
/// stream.
#[derive(Debug)]
struct Pipes {
    events: mpsc::UnboundedReceiver<Event>,
    open: usize,
    stdout_carry: Vec<u8>,
    stderr_carry: Vec<u8>,
}

impl Pipes {
    fn new(events: mpsc::UnboundedReceiver<Event>, open: usize) -> Self {
        Self {
            events,
            open,
            stdout_carry: Vec::new(),
            stderr_carry: Vec::new(),
        }
    }

    fn is_open(&self) -> bool {
        self.open > 0
    }

    fn carry(&mut self, stream: Stream) -> &mut Vec<u8> {
        match stream {
            Stream::Stdout => &mut self.stdout_carry,
            Stream::Stderr => &mut self.stderr_carry,
        }
    }

    /// Wait up to `wait` for one event, then take every event already
    /// queued. Returns whether anything arrived.
    async fn recv(&mut self, wait: Duration, batch: &mut Batch) -> bool {
        let first = match tokio::time::timeout(wait, self.events.recv()).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                self.open = 0;
                self.flush(Stream::Stdout, batch);
                self.flush(Stream::Stderr, batch);
                return false;
            }
            Err(_elapsed) => return false,
        };
        self.absorb(first, batch);
        while let Ok(event) = self.events.try_recv() {
            self.absorb(event, batch);
        }
        true
    }

    /// Read until both pipes reach EOF after the child has exited.
    ///
    /// A descendant may keep a pipe open; reading stops once a wait of
    /// `quiet` brings nothing or `limit` has passed.
    async fn drain(&mut self, quiet: Duration, limit: Duration, batch: &mut Batch) {
        let deadline = tokio::time::Instant::now() + limit;
        while self.is_open() {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            let wait = quiet.min(left);
            if wait.is_zero() || !self.recv(wait, batch).await {
                break;
            }
        }
        self.flush(Stream::Stdout, batch);
        self.flush(Stream::Stderr, batch);
    }

    fn absorb(&mut self, event: Event, batch: &mut Batch) {
        match event {
            Event::Data(stream, bytes) => {
                let text = decode(self.carry(stream), &bytes);
                batch.push(stream, &text);
            }
            Event::Eof(stream) => {
                self.open = self.open.saturating_sub(1);
                self.flush(stream, batch);
            }
            Event::Failed(stream, e) => {
                self.open = self.open.saturating_sub(1);
                self.flush(stream, batch);
                batch.failure.get_or_insert(e);
            }
        }
    }

    fn flush(&mut self, stream: Stream, batch: &mut Batch) {
        let carry = self.carry(stream);
        if carry.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(carry).into_owned();
        carry.clear();
        batch.push(stream, &text);
    }
}

/// Append `bytes` to `carry` and decode everything but a trailing, not yet
/// complete UTF-8 sequence, which stays in `carry`.
fn decode(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    let keep = incomplete_suffix(carry);
    let split = carry.len() - keep;
    let text = String::from_utf8_lossy(&carry[..split]).into_owned();
    carry.drain(..split);
    text
}

/// Length of a truncated multi-byte sequence at the end of `bytes`.
fn incomplete_suffix(bytes: &[u8]) -> usize {
    // A cut sequence is at most three bytes long.
    let start = bytes.len().saturating_sub(3);
    for i in start..bytes.len() {
        if let Err(e) = std::str::from_utf8(&bytes[i..]) {
            if e.valid_up_to() == 0 && e.error_len().is_none() {
                return bytes.len() - i;
            }
        }
    }
    0
}

/// Owns one OS process from spawn to reap.
#[derive(Debug)]
pub struct ProcessRunner {
    tool: String,
    kill_timeout: Duration,
    child: Option<Child>,
    pid: Option<u32>,
    pipes: Option<Pipes>,
    last_read: Instant,
    exit_code: Option<i32>,
}

impl ProcessRunner {
    /// Create a runner for `tool` (used in errors and logs).
    pub fn new(tool: impl Into<String>, kill_timeout: Duration) -> Self {
        Self {
            tool: tool.into(),
            kill_timeout,
            child: None,
            pid: None,
            pipes: None,
            last_read: Instant::now(),
            exit_code: None,
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn is_started(&self) -> bool {
        self.child.is_some()
    }

    /// Spawn `program args..` inside `working_dir`.
    ///
    /// The directory is created if absent. The child gets no stdin, a
    /// default SIGPIPE disposition and, when `memory_limit` is non-zero, an
    /// address-space limit of that many bytes.
    pub fn start(
        &mut self,
        program: &Path,
        args: &[String],
        working_dir: &Path,
        memory_limit: u64,
    ) -> Result<()> {
        if self.child.is_some() {
            return Err(Error::spawn(&self.tool, "process already started"));
        }

        std::fs::create_dir_all(working_dir).map_err(|e| {
            Error::spawn(
                &self.tool,
                format!("cannot create working directory {}: {e}", working_dir.display()),
            )
        })?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        configure_child(&mut cmd, memory_limit);
        #[cfg(not(unix))]
        let _ = memory_limit;

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn(&self.tool, format!("{}: {e}", program.display())))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let mut open = 0;
        if let Some(stdout) = child.stdout.take() {
            spawn_reader(stdout, Stream::Stdout, tx.clone());
            open += 1;
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_reader(stderr, Stream::Stderr, tx);
            open += 1;
        }

        self.pid = child.id();
        tracing::debug!(tool = %self.tool, pid = ?self.pid, "process started");

        self.child = Some(child);
        self.pipes = Some(Pipes::new(rx, open));
        self.last_read = Instant::now();
        self.exit_code = None;
        Ok(())
    }

    /// One bounded wait on the child's output.
    ///
    /// `on_output(stdout_chunk, stderr_chunk)` is called exactly once per
    /// poll, with empty strings when nothing arrived before `timeout`.
    /// Returns the exit code once the process has exited and its output has
    /// been drained.
    pub async fn poll_once<F>(&mut self, timeout: Duration, mut on_output: F) -> Result<PollStatus>
    where
        F: FnMut(&str, &str),
    {
        if let Some(code) = self.exit_code {
            return Ok(PollStatus::Exited(code));
        }
        let Some(child) = self.child.as_mut() else {
            return Err(Error::spawn(&self.tool, "process not started"));
        };

        let mut batch = Batch::default();
        let activity = match self.pipes.as_mut() {
            Some(pipes) if pipes.is_open() => pipes.recv(timeout, &mut batch).await,
            _ => false,
        };
        if !self.pipes.as_ref().is_some_and(Pipes::is_open) {
            // Both pipes are closed; wait on the process itself.
            let _ = tokio::time::timeout(timeout, child.wait()).await;
        }
        if activity {
            self.last_read = Instant::now();
        }

        let exited = if batch.failure.is_some() {
            None
        } else {
            child.try_wait()?
        };
        if let Some(status) = exited {
            if let Some(pipes) = self.pipes.as_mut() {
                pipes
                    .drain(timeout.max(EXIT_GRACE), self.kill_timeout, &mut batch)
                    .await;
            }
            on_output(&batch.stdout, &batch.stderr);
            if let Some(e) = batch.failure {
                return Err(Error::from(e));
            }
            let code = exit_code(status);
            tracing::trace!(tool = %self.tool, pid = ?self.pid, code, "process exited");
            self.exit_code = Some(code);
            return Ok(PollStatus::Exited(code));
        }

        on_output(&batch.stdout, &batch.stderr);
        if let Some(e) = batch.failure {
            return Err(Error::from(e));
        }

        let idle = self.last_read.elapsed();
        if !activity && idle > self.kill_timeout {
            tracing::warn!(
                tool = %self.tool,
                pid = ?self.pid,
                idle_secs = idle.as_secs(),
                "no output before kill timeout; killing process"
            );
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(Error::Timeout {
                tool: self.tool.clone(),
                pid: self.pid,
                idle,
            });
        }
        Ok(PollStatus::Running)
    }

    /// Send the termination signal. Safe to call repeatedly or after exit.
    pub fn cancel(&mut self) {
        if self.exit_code.is_some() {
            return;
        }
        if let Some(child) = self.child.as_mut() {
            if child.start_kill().is_ok() {
                tracing::info!(tool = %self.tool, pid = ?self.pid, "process killed");
            }
        }
    }

    /// Kill the child and wait until it has been reaped.
    pub async fn terminate(&mut self) {
        self.cancel();
        if self.exit_code.is_some() {
            return;
        }
        if let Some(child) = self.child.as_mut() {
            if let Ok(status) = child.wait().await {
                self.exit_code = Some(exit_code(status));
            }
        }
    }
}

fn spawn_reader<R>(mut reader: R, stream: Stream, tx: mpsc::UnboundedSender<Event>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => {
                    let _ = tx.send(Event::Eof(stream));
                    break;
                }
                Ok(n) => {
                    if tx.send(Event::Data(stream, buf[..n].to_vec())).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => {
                    let _ = tx.send(Event::Failed(stream, e));
                    break;
                }
            }
        }
    });
}

#[cfg(unix)]
fn configure_child(cmd: &mut Command, memory_limit: u64) {
    use nix::sys::resource::{setrlimit, Resource};
    use nix::sys::signal::{signal, SigHandler, Signal};

    // SAFETY: the closure runs between fork and exec and only calls
    // async-signal-safe functions (signal, setrlimit).
    unsafe {
        cmd.pre_exec(move || {
            signal(Signal::SIGPIPE, SigHandler::SigDfl).map_err(io::Error::from)?;
            if memory_limit > 0 {
                setrlimit(Resource::RLIMIT_AS, memory_limit as _, memory_limit as _)
                    .map_err(io::Error::from)?;
            }
            Ok(())
        });
    }
}

/// Exit code, or `128 + signal` for a child killed by a signal.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return 128 + sig;
        }
    }
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLL: Duration = Duration::from_millis(50);

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    async fn run_to_exit(runner: &mut ProcessRunner) -> Result<(i32, String, String, usize)> {
        let mut out = String::new();
        let mut err = String::new();
        let mut calls = 0;
        loop {
            let status = runner
                .poll_once(POLL, |o, e| {
                    out.push_str(o);
                    err.push_str(e);
                    calls += 1;
                })
                .await?;
            if let PollStatus::Exited(code) = status {
                return Ok((code, out, err, calls));
            }
        }
    }

    #[tokio::test]
    async fn captures_both_streams() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        runner
            .start(Path::new("sh"), &sh("echo hello; echo oops >&2"), dir.path(), 0)
            .unwrap();
        let (code, out, err, calls) = run_to_exit(&mut runner).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, "hello\n");
        assert_eq!(err, "oops\n");
        assert!(calls >= 1);
    }

    #[tokio::test]
    async fn output_written_at_exit_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..40 {
            let script = format!("sleep 0.0{}; printf 'payload-line\\n'", 45 + i % 10);
            let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
            runner.start(Path::new("sh"), &sh(&script), dir.path(), 0).unwrap();
            let (code, out, ..) = run_to_exit(&mut runner).await.unwrap();
            assert_eq!(code, 0);
            assert_eq!(out, "payload-line\n", "run {i} lost its output");
        }
    }

    #[tokio::test]
    async fn descendant_output_after_exit_is_drained() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        runner
            .start(Path::new("sh"), &sh("(sleep 0.3; echo late) & exit 0"), dir.path(), 0)
            .unwrap();
        let (code, out, ..) = run_to_exit(&mut runner).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, "late\n");
    }

    #[tokio::test]
    async fn descendant_holding_pipes_does_not_block_exit() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        runner
            .start(Path::new("sh"), &sh("echo done; sleep 30 & exit 0"), dir.path(), 0)
            .unwrap();
        let started = Instant::now();
        let (code, out, ..) = run_to_exit(&mut runner).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, "done\n");
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn decode_keeps_split_sequences() {
        let euro = "\u{20ac}".as_bytes();
        let mut carry = Vec::new();
        assert_eq!(decode(&mut carry, &[b'a', euro[0], euro[1]]), "a");
        assert_eq!(carry, &euro[..2]);
        assert_eq!(decode(&mut carry, &[euro[2], b'b']), "\u{20ac}b");
        assert!(carry.is_empty());

        // Invalid bytes in the middle are replaced, not carried.
        assert_eq!(decode(&mut carry, &[0xff, b'c']), "\u{fffd}c");
        assert!(carry.is_empty());
    }

    #[tokio::test]
    async fn multibyte_output_across_reads_is_intact() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        // The trailing character may arrive split across two reads.
        let script = format!("head -c {} /dev/zero | tr '\\0' x; printf '\\342\\202\\254'", READ_CHUNK - 1);
        runner.start(Path::new("sh"), &sh(&script), dir.path(), 0).unwrap();
        let (code, out, ..) = run_to_exit(&mut runner).await.unwrap();
        assert_eq!(code, 0);
        assert!(!out.contains('\u{fffd}'));
        assert!(out.ends_with('\u{20ac}'));
    }

    #[tokio::test]
    async fn reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        runner.start(Path::new("sh"), &sh("exit 3"), dir.path(), 0).unwrap();
        let (code, ..) = run_to_exit(&mut runner).await.unwrap();
        assert_eq!(code, 3);
        assert_eq!(runner.exit_code(), Some(3));

        // Further polls keep reporting the same code.
        let again = runner.poll_once(POLL, |_, _| {}).await.unwrap();
        assert_eq!(again, PollStatus::Exited(3));
    }

    #[tokio::test]
    async fn creates_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("job-1").join("work");
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        runner.start(Path::new("sh"), &sh("pwd"), &nested, 0).unwrap();
        let (code, out, ..) = run_to_exit(&mut runner).await.unwrap();
        assert_eq!(code, 0);
        assert!(nested.is_dir());
        assert!(out.trim().ends_with("work"));
    }

    #[tokio::test]
    async fn missing_executable_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("ghost", Duration::from_secs(30));
        let err = runner
            .start(Path::new("nonexistent_tool_xyz_12345"), &[], dir.path(), 0)
            .unwrap_err();
        assert!(matches!(err, Error::Spawn { ref tool, .. } if tool == "ghost"));
    }

    #[tokio::test]
    async fn poll_before_start_is_error() {
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        assert!(runner.poll_once(POLL, |_, _| {}).await.is_err());
    }

    #[tokio::test]
    async fn silent_process_times_out_and_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sleep", Duration::from_millis(200));
        runner
            .start(Path::new("sleep"), &["30".to_string()], dir.path(), 0)
            .unwrap();
        let pid = runner.pid().unwrap();

        let err = run_to_exit(&mut runner).await.unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {err}");
        match err {
            Error::Timeout { pid: Some(p), idle, .. } => {
                assert_eq!(p, pid);
                assert!(idle >= Duration::from_millis(200));
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        #[cfg(unix)]
        {
            let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None);
            assert!(alive.is_err(), "process {pid} still exists");
        }
    }

    #[tokio::test]
    async fn steady_output_is_not_a_stall() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sh", Duration::from_millis(400));
        runner
            .start(
                Path::new("sh"),
                &sh("for i in 1 2 3 4 5 6; do echo tick; sleep 0.2; done"),
                dir.path(),
                0,
            )
            .unwrap();
        let (code, out, ..) = run_to_exit(&mut runner).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(out.lines().count(), 6);
    }

    #[tokio::test]
    async fn callback_runs_once_per_poll() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        runner.start(Path::new("sh"), &sh("sleep 0.3"), dir.path(), 0).unwrap();
        let mut polls = 0;
        let mut calls = 0;
        loop {
            polls += 1;
            let status = runner.poll_once(POLL, |_, _| calls += 1).await.unwrap();
            if matches!(status, PollStatus::Exited(_)) {
                break;
            }
        }
        assert_eq!(polls, calls);
    }

    #[tokio::test]
    async fn cancel_kills_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sleep", Duration::from_secs(30));
        runner
            .start(Path::new("sleep"), &["30".to_string()], dir.path(), 0)
            .unwrap();
        assert_eq!(runner.poll_once(POLL, |_, _| {}).await.unwrap(), PollStatus::Running);

        runner.cancel();
        runner.cancel();
        let (code, ..) = run_to_exit(&mut runner).await.unwrap();
        #[cfg(unix)]
        assert_eq!(code, 128 + 9);
        #[cfg(not(unix))]
        assert_ne!(code, 0);

        // Cancelling after exit is a no-op.
        runner.cancel();
        runner.terminate().await;
    }

    #[tokio::test]
    async fn terminate_reaps_child() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sleep", Duration::from_secs(30));
        runner
            .start(Path::new("sleep"), &["30".to_string()], dir.path(), 0)
            .unwrap();
        runner.terminate().await;
        assert!(runner.exit_code().is_some());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn applies_memory_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = ProcessRunner::new("sh", Duration::from_secs(30));
        runner
            .start(Path::new("sh"), &sh("ulimit -v"), dir.path(), 512 * 1024 * 1024)
            .unwrap();
        let (code, out, ..) = run_to_exit(&mut runner).await.unwrap();
        assert_eq!(code, 0);
        assert_eq!(out.trim(), "524288");
    }
}
