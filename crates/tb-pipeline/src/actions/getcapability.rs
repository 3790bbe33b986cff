//! Availability of command-line options of ffmpeg and ffprobe.

use regex::Regex;
use tb_core::{Error, Params, Resources, Result};
use tb_worker::workers::{ffmpeg, ffprobe, FfmpegTool, FfprobeTool};
use tb_worker::Worker;

use crate::action::{Action, SetupContext};

/// Whether `option` appears in a `-h full` listing.
///
/// Literal mode matches the first word of a line against `-option`; regex
/// mode searches every line.
pub fn option_available(help: &str, option: &str, regex: bool) -> Result<bool> {
    if regex {
        let re = Regex::new(option)
            .map_err(|e| Error::validation(format!("invalid option pattern: {e}")))?;
        return Ok(help.split('\n').any(|line| re.is_match(line)));
    }
    let wanted = format!("-{option}");
    Ok(help.split('\n').any(|line| {
        let first = line.trim().split(' ').next().unwrap_or("");
        first == wanted
    }))
}

/// Runs `TOOL -h full` and records metadata `available`.
#[derive(Debug)]
pub struct GetCapabilityAction {
    tool: String,
    option: String,
    regex: bool,
    available: bool,
}

impl GetCapabilityAction {
    pub fn new(tool: &str, option: &str, regex: bool) -> Result<Self> {
        if tool != ffmpeg::NAME && tool != ffprobe::NAME {
            return Err(Error::validation(format!("getcapability does not support {tool}")));
        }
        if regex {
            Regex::new(option).map_err(|e| Error::validation(format!("invalid option pattern: {e}")))?;
        }
        Ok(Self {
            tool: tool.to_string(),
            option: option.to_string(),
            regex,
            available: false,
        })
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        Self::new(
            params.require_str("tool")?,
            params.require_str("option")?,
            params.bool_or("regex", false),
        )
    }

    pub fn create(params: &Params) -> Result<Box<dyn Action>> {
        Ok(Box::new(Self::from_params(params)?))
    }

    pub fn available(&self) -> bool {
        self.available
    }
}

impl Action for GetCapabilityAction {
    fn name(&self) -> &'static str {
        "getcapability"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<Vec<Worker>> {
        let worker = if self.tool == ffmpeg::NAME {
            ctx.worker(FfmpegTool::full_help())
        } else {
            ctx.worker(FfprobeTool::full_help())
        };
        Ok(vec![worker])
    }

    fn finalize(&mut self, workers: &[Worker], resources: &mut Resources) -> Result<()> {
        let help = workers.first().map(Worker::stdout).unwrap_or("");
        self.available = option_available(help, &self.option, self.regex)?;
        resources.set_metadata("available", self.available);
        Ok(())
    }
}
