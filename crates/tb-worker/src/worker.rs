//! A single tool invocation.
//!
//! A [`Worker`] pairs a [`Tool`] (which knows how to turn file descriptors
//! into an argument vector and how to read progress from the tool's output)
//! with a [`ProcessRunner`]. It accumulates the child's output, keeps a
//! non-decreasing progress value and extracts the error tail. A non-zero
//! exit is not raised here; the pipeline decides what it means.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tb_core::{Error, Params, Result};

use crate::progress::{tail, TAIL_WINDOW};
use crate::runner::{PollStatus, ProcessRunner};

/// Default stall timeout of a worker.
pub const DEFAULT_KILL_TIMEOUT: Duration = Duration::from_secs(3600);

/// An input or output file of a worker with its stage parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSpec {
    pub path: PathBuf,
    pub params: Params,
}

impl FileSpec {
    pub fn new(path: impl Into<PathBuf>, params: Params) -> Self {
        Self {
            path: path.into(),
            params,
        }
    }

    pub fn path_str(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Tool family behaviour: argument assembly and output interpretation.
pub trait Tool: Send + fmt::Debug {
    /// Logical tool name, used to resolve the executable.
    fn name(&self) -> &str;

    /// Validate an input before it is appended to `existing`.
    fn accept_input(&mut self, existing: &[FileSpec], file: &FileSpec) -> Result<()> {
        let _ = (existing, file);
        Ok(())
    }

    /// Validate an output before it is appended to `existing`.
    fn accept_output(&mut self, existing: &[FileSpec], file: &FileSpec) -> Result<()> {
        let _ = (existing, file);
        Ok(())
    }

    /// Pre-flight work done right before spawning, e.g. writing an
    /// auxiliary configuration file into the working directory.
    fn prepare(&mut self, working_dir: &Path, inputs: &[FileSpec], outputs: &[FileSpec]) -> Result<()> {
        let _ = (working_dir, inputs, outputs);
        Ok(())
    }

    /// Argument vector, without the program itself.
    fn build_args(
        &self,
        working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>>;

    /// Progress derived from the recent output, if a marker is present.
    fn progress(&self, stdout_tail: &str, stderr_tail: &str) -> Option<u8> {
        let _ = (stdout_tail, stderr_tail);
        None
    }

    /// Number of stderr lines reported when the tool fails.
    fn error_lines(&self) -> usize {
        1
    }

    /// Address-space limit in bytes, 0 for none.
    fn memory_limit(&self) -> u64 {
        0
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Ordered `(flag, value|absent)` pairs. Setting an existing flag replaces
/// its value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Options(Vec<(String, Option<String>)>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `flag value`.
    pub fn set(&mut self, flag: impl Into<String>, value: impl fmt::Display) -> &mut Self {
        self.put(flag.into(), Some(value.to_string()))
    }

    /// Set a bare `flag`.
    pub fn flag(&mut self, flag: impl Into<String>) -> &mut Self {
        self.put(flag.into(), None)
    }

    pub fn remove(&mut self, flag: &str) -> &mut Self {
        self.0.retain(|(f, _)| f != flag);
        self
    }

    pub fn get(&self, flag: &str) -> Option<Option<&str>> {
        self.0
            .iter()
            .find(|(f, _)| f == flag)
            .map(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, flag: &str) -> bool {
        self.0.iter().any(|(f, _)| f == flag)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn put(&mut self, flag: String, value: Option<String>) -> &mut Self {
        match self.0.iter_mut().find(|(f, _)| *f == flag) {
            Some(slot) => slot.1 = value,
            None => self.0.push((flag, value)),
        }
        self
    }

    pub fn to_args(&self) -> Vec<String> {
        option_args(self.0.iter().map(|(f, v)| (f.as_str(), v.as_deref())))
    }
}

/// Flatten `(flag, value|absent)` pairs into an argument list.
pub fn option_args<'a, I>(pairs: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut args = Vec::new();
    for (flag, value) in pairs {
        args.push(flag.to_string());
        if let Some(v) = value {
            args.push(v.to_string());
        }
    }
    args
}

/// Last `max_lines` non-empty lines of `stderr`, oldest first.
pub fn error_tail(stderr: &str, max_lines: usize) -> String {
    let mut lines: Vec<&str> = stderr
        .split('\n')
        .filter(|l| !l.is_empty())
        .rev()
        .take(max_lines)
        .collect();
    lines.reverse();
    lines.join("\n")
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// One invocation of an external tool.
#[derive(Debug)]
pub struct Worker {
    tool: Box<dyn Tool>,
    program: PathBuf,
    inputs: Vec<FileSpec>,
    outputs: Vec<FileSpec>,
    progress: u8,
    stdout: String,
    stderr: String,
    memory_limit: u64,
    kill_timeout: Duration,
    error_lines: usize,
    runner: Option<ProcessRunner>,
    exit_code: Option<i32>,
}

impl Worker {
    /// Wrap `tool`, spawning `program` when run.
    pub fn new(tool: impl Tool + 'static, program: impl Into<PathBuf>) -> Self {
        let memory_limit = tool.memory_limit();
        let error_lines = tool.error_lines();
        Self {
            tool: Box::new(tool),
            program: program.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            progress: 0,
            stdout: String::new(),
            stderr: String::new(),
            memory_limit,
            kill_timeout: DEFAULT_KILL_TIMEOUT,
            error_lines,
            runner: None,
            exit_code: None,
        }
    }

    pub fn with_kill_timeout(mut self, timeout: Duration) -> Self {
        self.kill_timeout = timeout;
        self
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit = bytes;
        self
    }

    pub fn with_error_lines(mut self, lines: usize) -> Self {
        self.error_lines = lines;
        self
    }

    /// Builder-style [`Worker::add_input_file`].
    pub fn with_input(mut self, path: impl Into<PathBuf>, params: Params) -> Result<Self> {
        self.add_input_file(path, params)?;
        Ok(self)
    }

    /// Builder-style [`Worker::add_output_file`].
    pub fn with_output(mut self, path: impl Into<PathBuf>, params: Params) -> Result<Self> {
        self.add_output_file(path, params)?;
        Ok(self)
    }

    pub fn add_input_file(&mut self, path: impl Into<PathBuf>, params: Params) -> Result<()> {
        let file = FileSpec::new(path, params);
        self.tool.accept_input(&self.inputs, &file)?;
        self.inputs.push(file);
        Ok(())
    }

    pub fn add_output_file(&mut self, path: impl Into<PathBuf>, params: Params) -> Result<()> {
        let file = FileSpec::new(path, params);
        self.tool.accept_output(&self.outputs, &file)?;
        self.outputs.push(file);
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.tool.name()
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn inputs(&self) -> &[FileSpec] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[FileSpec] {
        &self.outputs
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn memory_limit(&self) -> u64 {
        self.memory_limit
    }

    pub fn kill_timeout(&self) -> Duration {
        self.kill_timeout
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn pid(&self) -> Option<u32> {
        self.runner.as_ref().and_then(ProcessRunner::pid)
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_some() && self.exit_code.is_none()
    }

    /// Argument vector for a run inside `working_dir`.
    pub fn args(&self, working_dir: &Path) -> Result<Vec<String>> {
        self.tool.build_args(working_dir, &self.inputs, &self.outputs)
    }

    /// Printable command line.
    pub fn command_line(&self, working_dir: &Path) -> Result<String> {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args(working_dir)?);
        Ok(parts.join(" "))
    }

    /// Pre-flight, build the arguments and spawn the tool.
    ///
    /// Parent directories of the output files are created first.
    pub fn run(&mut self, working_dir: &Path) -> Result<()> {
        if self.runner.is_some() {
            return Err(Error::spawn(self.tool.name(), "worker already started"));
        }
        for output in &self.outputs {
            if let Some(parent) = working_dir.join(&output.path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.tool.prepare(working_dir, &self.inputs, &self.outputs)?;
        let args = self.args(working_dir)?;

        let mut line = self.program.to_string_lossy().into_owned();
        for arg in &args {
            line.push(' ');
            line.push_str(arg);
        }
        tracing::info!("Running command: {line}");

        let mut runner = ProcessRunner::new(self.tool.name(), self.kill_timeout);
        runner.start(&self.program, &args, working_dir, self.memory_limit)?;
        self.runner = Some(runner);
        Ok(())
    }

    /// One bounded poll of the running tool.
    ///
    /// Returns `Ok(None)` while running and `Ok(Some(code))` once exited.
    /// A zero exit marks the worker complete (progress 100).
    pub async fn wait_non_blocking(&mut self, timeout: Duration) -> Result<Option<i32>> {
        if let Some(code) = self.exit_code {
            return Ok(Some(code));
        }
        let Self {
            tool,
            runner,
            stdout,
            stderr,
            progress,
            exit_code,
            ..
        } = self;
        let Some(runner) = runner.as_mut() else {
            return Err(Error::spawn(tool.name(), "worker not started"));
        };

        let status = runner
            .poll_once(timeout, |out, err| {
                stdout.push_str(out);
                stderr.push_str(err);
            })
            .await?;

        if let Some(p) = tool.progress(tail(stdout, TAIL_WINDOW), tail(stderr, TAIL_WINDOW)) {
            if p > *progress {
                *progress = p.min(100);
            }
        }

        match status {
            PollStatus::Running => Ok(None),
            PollStatus::Exited(code) => {
                *exit_code = Some(code);
                if code == 0 {
                    *progress = 100;
                }
                tracing::debug!(tool = %tool.name(), code, "worker finished");
                Ok(Some(code))
            }
        }
    }

    /// Send the termination signal to the running tool.
    pub fn cancel(&mut self) {
        if let Some(runner) = self.runner.as_mut() {
            runner.cancel();
        }
    }

    /// Kill the tool and wait until it is reaped.
    pub async fn terminate(&mut self) {
        if let Some(runner) = self.runner.as_mut() {
            runner.terminate().await;
            if self.exit_code.is_none() {
                self.exit_code = runner.exit_code();
            }
        }
    }

    /// Last `max_lines` non-empty stderr lines, oldest first.
    pub fn error_tail(&self, max_lines: usize) -> String {
        error_tail(&self.stderr, max_lines)
    }

    /// Error tail with this tool's configured line count.
    pub fn error(&self) -> String {
        self.error_tail(self.error_lines)
    }

    /// The failure of a tool that exited non-zero.
    pub fn failure(&self) -> Option<Error> {
        match self.exit_code {
            Some(code) if code != 0 => Some(Error::NonZeroExit {
                tool: self.tool.name().to_string(),
                code,
                tail: self.error(),
            }),
            _ => None,
        }
    }
}
