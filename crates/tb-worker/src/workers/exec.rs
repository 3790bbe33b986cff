//! Arbitrary command execution.

use std::path::Path;

use tb_core::Result;

use crate::progress::ProgressMarker;
use crate::worker::{FileSpec, Tool};

/// Runs a configured argument list. `{input}` and `{output}` in any argument
/// are replaced with the first input and output path.
#[derive(Debug, Clone)]
pub struct ExecTool {
    name: String,
    args: Vec<String>,
    marker: Option<ProgressMarker>,
    error_lines: usize,
}

impl ExecTool {
    pub fn new(name: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            args,
            marker: None,
            error_lines: 1,
        }
    }

    /// `sh -c script`; pair with the `sh` program.
    pub fn shell(name: impl Into<String>, script: impl Into<String>) -> Self {
        Self::new(name, vec!["-c".to_string(), script.into()])
    }

    pub fn with_marker(mut self, marker: ProgressMarker) -> Self {
        self.marker = Some(marker);
        self
    }

    pub fn with_error_lines(mut self, lines: usize) -> Self {
        self.error_lines = lines;
        self
    }
}

impl Tool for ExecTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        let input = inputs.first().map(FileSpec::path_str).unwrap_or_default();
        let output = outputs.first().map(FileSpec::path_str).unwrap_or_default();
        Ok(self
            .args
            .iter()
            .map(|a| a.replace("{input}", &input).replace("{output}", &output))
            .collect())
    }

    fn progress(&self, stdout_tail: &str, stderr_tail: &str) -> Option<u8> {
        self.marker?.parse(stdout_tail, stderr_tail)
    }

    fn error_lines(&self) -> usize {
        self.error_lines
    }
}
