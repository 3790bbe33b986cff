//! Pipeline: runs the stages of one [`Action`] with progress reporting,
//! cancellation and failure mapping.
//!
//! `run()` executes setup, every stage and finalize exactly once. Stages run
//! strictly in order; stage `i` starts only after stage `i - 1` exited 0.
//! Overall progress is `floor((stage_progress + 100 * i) / stage_count)`
//! and never decreases.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use tb_core::{Error, Params, PipelineConfig, Resources, Result, Section};
use tb_worker::{ToolRegistry, Worker};

use crate::action::{Action, SetupContext};
use crate::context::{Progress, ProgressSender};

/// Lifecycle of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PipelineState {
    Created,
    Running { stage: usize },
    Completed,
    Failed,
    Cancelled,
}

impl PipelineState {
    pub fn is_finished(self) -> bool {
        matches!(
            self,
            PipelineState::Completed | PipelineState::Failed | PipelineState::Cancelled
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Created => f.write_str("created"),
            PipelineState::Running { stage } => write!(f, "running (stage {stage})"),
            PipelineState::Completed => f.write_str("completed"),
            PipelineState::Failed => f.write_str("failed"),
            PipelineState::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// One execution of an action.
pub struct Pipeline {
    id: Option<String>,
    action: Box<dyn Action>,
    resources: Resources,
    working_dir: PathBuf,
    config: PipelineConfig,
    tools: Arc<ToolRegistry>,
    cancel: CancellationToken,
    state: PipelineState,
    progress: u8,
    stage: usize,
    stage_count: usize,
    tool: String,
    stage_progress: u8,
    workers: Vec<Worker>,
    clock: Option<Instant>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl Pipeline {
    /// Create the pipeline and its working directory: `<base_dir>/job-<id>`
    /// with an id, `<base_dir>` without one.
    pub fn new(
        action: Box<dyn Action>,
        id: Option<&str>,
        config: &PipelineConfig,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self> {
        let working_dir = match id {
            Some(id) => config.base_dir.join(format!("job-{id}")),
            None => config.base_dir.clone(),
        };
        std::fs::create_dir_all(&working_dir)?;
        tracing::debug!(action = action.name(), dir = %working_dir.display(), "pipeline created");

        Ok(Self {
            id: id.map(String::from),
            action,
            resources: Resources::new(),
            working_dir,
            config: config.clone(),
            tools,
            cancel: CancellationToken::new(),
            state: PipelineState::Created,
            progress: 0,
            stage: 0,
            stage_count: 0,
            tool: String::new(),
            stage_progress: 0,
            workers: Vec::new(),
            clock: None,
            started_at: None,
            ended_at: None,
        })
    }

    /// Builder: start from existing resources.
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    /// Builder: attach a cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn action_name(&self) -> &'static str {
        self.action.name()
    }

    pub fn needs_media_info(&self) -> bool {
        self.action.needs_media_info()
    }

    /// Name used in logs and errors: the id, or the action name.
    pub fn label(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| self.action.name().to_string())
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn current_stage(&self) -> usize {
        self.stage
    }

    pub fn stage_count(&self) -> usize {
        self.stage_count
    }

    /// Stages of the last run, with their captured output.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut Resources {
        &mut self.resources
    }

    pub fn add_resource(&mut self, section: Section, index: impl Into<String>, payload: Params) -> Result<()> {
        self.resources.add(section, index, payload)
    }

    pub fn get_resource(&self, section: Section, index: &str) -> Result<Params> {
        self.resources.get(section, index)
    }

    /// Add a file input under the next free index.
    pub fn add_input(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let payload = Params::new().with("path", path.as_ref().to_string_lossy().into_owned());
        self.resources.push(Section::Inputs, payload)
    }

    pub fn merge_metadata(&mut self, metadata: &Params) {
        self.resources.merge_metadata(metadata);
    }

    pub fn metadata(&self) -> &Params {
        self.resources.metadata()
    }

    /// A handle that cancels this pipeline from another task.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Execute setup, every stage and finalize.
    ///
    /// # Errors
    ///
    /// Setup errors are returned as-is before anything is spawned. A stage
    /// failure (spawn error, stall timeout, non-zero exit) is wrapped once
    /// in [`Error::Stage`]. Cancellation returns [`Error::Cancelled`] and
    /// finalize failures [`Error::Finalize`].
    pub async fn run(&mut self, progress: &ProgressSender) -> Result<()> {
        if self.state != PipelineState::Created {
            return Err(Error::validation(format!(
                "pipeline {} has already run ({})",
                self.label(),
                self.state
            )));
        }

        self.clock = Some(Instant::now());
        self.started_at = Some(Utc::now());
        tracing::info!(action = self.action.name(), dir = %self.working_dir.display(), "Pipeline {} started", self.label());

        let mut workers = Vec::new();
        let result = self.execute(&mut workers, progress).await;
        self.workers = workers;
        self.ended_at = Some(Utc::now());

        match &result {
            Ok(()) => {
                self.state = PipelineState::Completed;
                progress.send(&self.snapshot());
                tracing::info!("[100%] Pipeline {} completed", self.label());
            }
            Err(e) if e.is_cancelled() => {
                self.state = PipelineState::Cancelled;
                tracing::info!("Pipeline {} cancelled", self.label());
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                tracing::error!("Pipeline {} failed: {e}", self.label());
            }
        }
        result
    }

    async fn execute(&mut self, workers: &mut Vec<Worker>, progress: &ProgressSender) -> Result<()> {
        let label = self.label();
        {
            let mut ctx = SetupContext::new(
                &self.working_dir,
                &self.tools,
                self.config.kill_timeout(),
                &mut self.resources,
            );
            *workers = self.action.setup(&mut ctx)?;
        }
        if workers.is_empty() {
            return Err(Error::validation(format!(
                "action {} set up no stage",
                self.action.name()
            )));
        }

        let count = workers.len();
        self.stage_count = count;
        let poll_timeout = self.config.poll_timeout();
        let interval = self.config.callback_interval();
        let mut last_report: Option<Instant> = None;

        for (i, worker) in workers.iter_mut().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(Error::Cancelled { pipeline: label });
            }
            self.stage = i;
            self.state = PipelineState::Running { stage: i };
            self.tool = worker.name().to_string();
            self.stage_progress = 0;
            let tool = self.tool.clone();
            tracing::info!(stage = i, "Starting stage {}/{count}: {tool}", i + 1);

            worker
                .run(&self.working_dir)
                .map_err(|e| Error::stage(&label, i, &tool, e))?;

            loop {
                // Checked between polls; a poll in flight runs to its end.
                if self.cancel.is_cancelled() {
                    tracing::info!(stage = i, "Cancelling stage {tool}");
                    worker.terminate().await;
                    return Err(Error::Cancelled { pipeline: label });
                }
                let status = worker
                    .wait_non_blocking(poll_timeout)
                    .await
                    .map_err(|e| Error::stage(&label, i, &tool, e))?;
                self.update_progress(i, count, worker.progress());

                match status {
                    None => {
                        if last_report.map_or(true, |t| t.elapsed() >= interval) {
                            progress.send(&self.snapshot());
                            last_report = Some(Instant::now());
                        }
                        tracing::trace!(stage = i, progress = self.progress, "polled {tool}");
                    }
                    Some(0) => {
                        progress.send(&self.snapshot());
                        last_report = Some(Instant::now());
                        tracing::info!("[{}%] Completed stage {}/{count}: {tool}", self.progress, i + 1);
                        break;
                    }
                    Some(code) => {
                        let failure = worker.failure().unwrap_or_else(|| Error::NonZeroExit {
                            tool: tool.clone(),
                            code,
                            tail: worker.error(),
                        });
                        return Err(Error::stage(&label, i, &tool, failure));
                    }
                }
            }
        }

        self.progress = 100;
        self.action
            .finalize(workers.as_slice(), &mut self.resources)
            .map_err(|e| match e {
                Error::Finalize { .. } => e,
                other => Error::finalize(&label, other),
            })
    }

    fn update_progress(&mut self, stage: usize, count: usize, stage_progress: u8) {
        self.stage_progress = stage_progress;
        let overall = (usize::from(stage_progress.min(100)) + 100 * stage) / count.max(1);
        let overall = overall.min(100) as u8;
        if overall > self.progress {
            self.progress = overall;
        }
    }

    fn elapsed(&self) -> Duration {
        self.clock.map(|c| c.elapsed()).unwrap_or_default()
    }

    /// Current progress snapshot.
    pub fn snapshot(&self) -> Progress {
        Progress {
            pipeline: self.label(),
            action: self.action.name().to_string(),
            state: self.state,
            stage: self.stage,
            stages: self.stage_count,
            tool: self.tool.clone(),
            stage_progress: self.stage_progress,
            overall: self.progress,
            elapsed: self.elapsed(),
        }
    }

    /// Remove the working directory.
    ///
    /// Nothing happens for a pipeline without an id (it works in the base
    /// directory) or when `debug` is set. Failures are logged.
    pub fn clean(&self) {
        if self.id.is_none() {
            return;
        }
        if self.config.debug {
            tracing::info!("Keeping working directory {} (debug)", self.working_dir.display());
            return;
        }
        match std::fs::remove_dir_all(&self.working_dir) {
            Ok(()) => tracing::debug!("Removed {}", self.working_dir.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!("Failed to remove {}: {e}", self.working_dir.display()),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("id", &self.id)
            .field("action", &self.action.name())
            .field("working_dir", &self.working_dir)
            .field("state", &self.state)
            .field("progress", &self.progress)
            .finish_non_exhaustive()
    }
}
