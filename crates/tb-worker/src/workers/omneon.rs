//! Omneon media API tools: `ommcp` (copy/mux) and `ommq` (query/update).

use std::path::{Component, Path, PathBuf};

use tb_core::{Error, Params, Result, Timecode};

use crate::progress::structured_progress;
use crate::worker::{FileSpec, Options, Tool};

use super::ffmpeg::{Container, MuxOptions};

pub const COPY_NAME: &str = "ommcp";
pub const QUERY_NAME: &str = "ommq";

/// `path` relative to `base`, walking up with `..` where needed.
pub fn relative_to(path: &Path, base: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix(base) {
        return rest.to_path_buf();
    }
    let path_parts: Vec<Component<'_>> = path.components().collect();
    let base_parts: Vec<Component<'_>> = base.components().collect();
    let common = path_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();
    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &path_parts[common..] {
        rel.push(part.as_os_str());
    }
    rel
}

// ---------------------------------------------------------------------------
// ommcp
// ---------------------------------------------------------------------------

/// `ommcp -replace [options] -out OUT -in IN[:srctrack=N]..`
///
/// Inputs are passed relative to the working directory.
#[derive(Debug, Clone, Default)]
pub struct OmneonCopyTool {
    options: Options,
}

impl OmneonCopyTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy tool configured to mux essence into `container`.
    pub fn mux(container: Container, options: &MuxOptions) -> Result<Self> {
        let mut tool = Self::new();
        match container {
            Container::Mxf => {
                if options.mapping.as_deref() == Some("rdd9") {
                    tool.options.set("-clip", "rdd9");
                }
            }
            Container::Mov => match options.version.as_deref() {
                Some(v @ ("qt6" | "qt7")) => {
                    tool.options.set("-clip", v);
                }
                _ => {}
            },
            other => {
                return Err(Error::argument(
                    COPY_NAME,
                    format!("Omneon library does not support {other} container"),
                ))
            }
        }
        if options.reference {
            tool.options.flag("-ref");
        } else {
            tool.options.flag("-embedded");
        }
        Ok(tool)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

/// Container output `basepath.<ext>` for [`OmneonCopyTool::mux`].
pub fn mux_output(basepath: &Path, container: Container) -> FileSpec {
    let mut path = basepath.as_os_str().to_owned();
    path.push(".");
    path.push(container.extension());
    FileSpec::new(PathBuf::from(path), Params::new())
}

impl Tool for OmneonCopyTool {
    fn name(&self) -> &str {
        COPY_NAME
    }

    fn accept_output(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::argument(COPY_NAME, "Omneon copy tool only supports one output file"));
        }
        Ok(())
    }

    fn build_args(
        &self,
        working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        if inputs.is_empty() {
            return Err(Error::argument(COPY_NAME, "no input file specified"));
        }
        let mut args = vec!["-replace".to_string()];
        args.extend(self.options.to_args());
        for output in outputs {
            args.push("-out".into());
            args.push(output.path_str());
        }
        for input in inputs {
            let mut path = relative_to(&input.path, working_dir)
                .to_string_lossy()
                .into_owned();
            if let Some(track) = input.params.u64("srctrack") {
                path.push_str(&format!(":srctrack={track}"));
            }
            args.push("-in".into());
            args.push(path);
        }
        Ok(args)
    }

    fn progress(&self, stdout_tail: &str, _stderr_tail: &str) -> Option<u8> {
        structured_progress(stdout_tail)
    }
}

// ---------------------------------------------------------------------------
// ommq
// ---------------------------------------------------------------------------

/// `ommq [-tc hh:mm:ss.ff -df 0|1] FILE`
#[derive(Debug, Clone, Default)]
pub struct OmneonQueryTool {
    options: Options,
}

impl OmneonQueryTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp the start timecode; `;` before the frames marks drop frame.
    pub fn with_timecode(mut self, timecode: &str) -> Result<Self> {
        let tc: Timecode = timecode
            .parse()
            .map_err(|e: Error| Error::argument(QUERY_NAME, e.to_string()))?;
        self.options
            .set("-tc", tc.dotted())
            .set("-df", u8::from(tc.drop_frame));
        Ok(self)
    }
}

impl Tool for OmneonQueryTool {
    fn name(&self) -> &str {
        QUERY_NAME
    }

    fn accept_input(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::argument(QUERY_NAME, "Omneon query tool only supports one input file"));
        }
        Ok(())
    }

    fn accept_output(&mut self, _existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        Err(Error::argument(QUERY_NAME, "Omneon query tool does not output any files"))
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        _outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        if inputs.is_empty() {
            return Err(Error::argument(QUERY_NAME, "no input file specified"));
        }
        let mut args = self.options.to_args();
        args.extend(inputs.iter().map(FileSpec::path_str));
        Ok(args)
    }
}
