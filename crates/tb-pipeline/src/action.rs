//! The [`Action`] trait defines one workflow of a pipeline.
//!
//! An action builds its stages up front in [`Action::setup`] without
//! spawning anything, and publishes results in [`Action::finalize`] once
//! every stage exited 0.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tb_core::{AvInfo, Params, Resources, Result, Section};
use tb_worker::{Tool, ToolRegistry, Worker};

/// What an action sees while building its stages.
pub struct SetupContext<'a> {
    working_dir: &'a Path,
    tools: &'a ToolRegistry,
    kill_timeout: Duration,
    /// Resources of the pipeline; setup may publish outputs here.
    pub resources: &'a mut Resources,
}

impl<'a> SetupContext<'a> {
    pub fn new(
        working_dir: &'a Path,
        tools: &'a ToolRegistry,
        kill_timeout: Duration,
        resources: &'a mut Resources,
    ) -> Self {
        Self {
            working_dir,
            tools,
            kill_timeout,
            resources,
        }
    }

    pub fn working_dir(&self) -> &Path {
        self.working_dir
    }

    /// Worker for `tool`, its program resolved through the tool registry.
    pub fn worker(&self, tool: impl Tool + 'static) -> Worker {
        let program = self.tools.resolve(tool.name());
        Worker::new(tool, program).with_kill_timeout(self.kill_timeout)
    }

    /// Payload of input resource `index`.
    pub fn input(&self, index: &str) -> Result<Params> {
        self.resources.get(Section::Inputs, index)
    }

    /// `path` of input resource `index`.
    pub fn input_path(&self, index: &str) -> Result<PathBuf> {
        self.resources.path(Section::Inputs, index)
    }

    /// Media information from the probe metadata already merged into the
    /// resources.
    pub fn media_info(&self) -> Result<AvInfo> {
        AvInfo::from_metadata(self.resources.metadata())
    }
}

impl fmt::Debug for SetupContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupContext")
            .field("working_dir", &self.working_dir)
            .field("kill_timeout", &self.kill_timeout)
            .finish_non_exhaustive()
    }
}

/// A workflow executed by a [`Pipeline`](crate::Pipeline).
pub trait Action: Send + fmt::Debug {
    /// Registered name of this action (e.g. "transcode").
    fn name(&self) -> &'static str;

    /// Whether setup reads probe metadata through
    /// [`SetupContext::media_info`]. The [`Toolbox`](crate::Toolbox) probes
    /// the first input before running such an action.
    fn needs_media_info(&self) -> bool {
        false
    }

    /// Build the ordered stage list. No process may be spawned here.
    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<Vec<Worker>>;

    /// Publish results after every stage exited 0.
    fn finalize(&mut self, _workers: &[Worker], _resources: &mut Resources) -> Result<()> {
        Ok(())
    }
}
