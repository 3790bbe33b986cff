//! Media probing: ffprobe metadata, an optional thumbnail and optional
//! frame and packet counts.

use std::path::PathBuf;

use tb_core::{Params, Resources, Result, Section};
use tb_worker::workers::{ffmpeg, ffprobe, FfmpegTool, FfprobeTool};
use tb_worker::Worker;

use crate::action::{Action, SetupContext};

use super::file_payload;

pub const THUMBNAIL_FILE: &str = "thumbnail.jpg";

#[derive(Debug, Default)]
pub struct AvinfoAction {
    thumbnail: bool,
    thumbnail_width: u32,
    count_frames: bool,
    count_packets: bool,
    thumbnail_path: Option<PathBuf>,
    count_stage: Option<usize>,
}

impl AvinfoAction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_params(params: &Params) -> Self {
        Self {
            thumbnail: params.bool_or("thumbnail", false),
            thumbnail_width: params.u64("thumbnail_width").unwrap_or(0) as u32,
            count_frames: params.bool_or("count_frames", false),
            count_packets: params.bool_or("count_packets", false),
            ..Self::default()
        }
    }

    pub fn create(params: &Params) -> Result<Box<dyn Action>> {
        Ok(Box::new(Self::from_params(params)))
    }
}

impl Action for AvinfoAction {
    fn name(&self) -> &'static str {
        "avinfo_extract"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<Vec<Worker>> {
        let input = ctx.input_path("1")?;
        let mut workers = Vec::new();

        let mut probe = ctx.worker(FfprobeTool::new());
        probe.add_input_file(&input, Params::new())?;
        workers.push(probe);

        if self.thumbnail {
            let path = ctx.working_dir().join(THUMBNAIL_FILE);
            let spec = ffmpeg::thumbnail(&path, self.thumbnail_width);
            let mut worker = ctx.worker(FfmpegTool::new());
            worker.add_input_file(&input, Params::new())?;
            worker.add_output_file(spec.path, spec.params)?;
            workers.push(worker);
            self.thumbnail_path = Some(path);
        }

        if self.count_frames || self.count_packets {
            let mut tool = FfprobeTool::new();
            if self.count_frames {
                tool = tool.count_frames();
            }
            if self.count_packets {
                tool = tool.count_packets();
            }
            let mut worker = ctx.worker(tool);
            worker.add_input_file(&input, Params::new())?;
            self.count_stage = Some(workers.len());
            workers.push(worker);
        }
        Ok(workers)
    }

    fn finalize(&mut self, workers: &[Worker], resources: &mut Resources) -> Result<()> {
        if let Some(probe) = workers.first() {
            let metadata = ffprobe::parse_metadata(probe.stdout(), probe.stderr())?;
            resources.merge_metadata(&metadata);
        }
        if let Some(path) = &self.thumbnail_path {
            resources.set_metadata("thumbnail", path.to_string_lossy().into_owned());
            resources.update(Section::Outputs, "thumbnail", &file_payload(path));
        }
        if let Some(worker) = self.count_stage.and_then(|i| workers.get(i)) {
            let counted = ffprobe::parse_metadata(worker.stdout(), worker.stderr())?;
            resources.merge_metadata(&counted);
        }
        Ok(())
    }
}
