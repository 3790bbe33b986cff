//! Arbitrary external command action.

use tb_core::{Error, Params, Result, Section};
use tb_worker::workers::ExecTool;
use tb_worker::{ProgressMarker, Worker};

use crate::action::{Action, SetupContext};

use super::file_payload;

/// Run `command` with `args` as a single stage.
///
/// `{input}` and `{output}` in the arguments are replaced with the path of
/// input resource 1 and with the output path. The output, when given, is
/// relative to the working directory and published as output resource 1.
/// `progress` selects a marker (`frames`, `percent`, `structured`).
#[derive(Debug)]
pub struct ExecAction {
    command: String,
    args: Vec<String>,
    output: Option<String>,
    marker: Option<ProgressMarker>,
    error_lines: usize,
}

impl ExecAction {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            output: None,
            marker: None,
            error_lines: 1,
        }
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        let command = params.require_str("command")?.to_string();
        let args = match params.get("args") {
            None | Some(serde_json::Value::Null) => Vec::new(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| match v {
                    serde_json::Value::String(s) => Ok(s.clone()),
                    serde_json::Value::Number(n) => Ok(n.to_string()),
                    other => Err(Error::validation(format!("invalid exec argument {other}"))),
                })
                .collect::<Result<_>>()?,
            Some(serde_json::Value::String(s)) => s.split_whitespace().map(String::from).collect(),
            Some(other) => return Err(Error::validation(format!("invalid exec args {other}"))),
        };
        let marker = match params.str("progress") {
            None => None,
            Some("frames") => Some(ProgressMarker::Frames {
                total: params.u64("nb_frames").unwrap_or(0),
            }),
            Some("percent") => Some(ProgressMarker::Percent),
            Some("structured") => Some(ProgressMarker::Structured),
            Some(other) => return Err(Error::validation(format!("unknown progress marker '{other}'"))),
        };
        Ok(Self {
            command,
            args,
            output: params.string("output"),
            marker,
            error_lines: params.u64("error_lines").unwrap_or(1) as usize,
        })
    }

    pub fn create(params: &Params) -> Result<Box<dyn Action>> {
        Ok(Box::new(Self::from_params(params)?))
    }
}

impl Action for ExecAction {
    fn name(&self) -> &'static str {
        "exec"
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<Vec<Worker>> {
        let mut tool = ExecTool::new(self.command.clone(), self.args.clone())
            .with_error_lines(self.error_lines);
        if let Some(marker) = self.marker {
            tool = tool.with_marker(marker);
        }
        let mut worker = ctx.worker(tool);

        if ctx.resources.contains(Section::Inputs, "1") {
            worker.add_input_file(ctx.input_path("1")?, ctx.input("1")?)?;
        }
        if let Some(output) = &self.output {
            let path = ctx.working_dir().join(output);
            worker.add_output_file(&path, Params::new())?;
            ctx.resources.add(Section::Outputs, "1", file_payload(&path))?;
        }
        Ok(vec![worker])
    }
}
