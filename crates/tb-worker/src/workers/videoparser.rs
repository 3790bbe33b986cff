//! `videoparser`: essence-level analysis of a media file.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tb_core::{Error, Params, Result};

use crate::worker::{FileSpec, Options, Tool};

pub const NAME: &str = "videoparser";

/// Address space limit applied to the parser.
pub const MEMORY_LIMIT: u64 = 150 * 1024 * 1024;

static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):\s+(.+)").expect("field pattern"));
static FROM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r", from.*").expect("from pattern"));

/// `videoparser [options] FILE`
#[derive(Debug, Clone, Default)]
pub struct VideoparserTool {
    options: Options,
}

impl VideoparserTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full analysis with a snapshot written to `snapshot`.
    pub fn analyze(snapshot: &Path) -> Self {
        let mut tool = Self::new();
        tool.options
            .flag("-travisf")
            .set("-S", snapshot.display());
        tool
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

impl Tool for VideoparserTool {
    fn name(&self) -> &str {
        NAME
    }

    fn accept_input(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::argument(NAME, "videoparser only supports one input file"));
        }
        Ok(())
    }

    fn accept_output(&mut self, _existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        Err(Error::argument(NAME, "videoparser does not write output files"))
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        _outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        if inputs.is_empty() {
            return Err(Error::argument(NAME, "no input file specified"));
        }
        let mut args = self.options.to_args();
        args.extend(inputs.iter().map(FileSpec::path_str));
        Ok(args)
    }

    fn error_lines(&self) -> usize {
        4
    }

    fn memory_limit(&self) -> u64 {
        MEMORY_LIMIT
    }
}

/// `key: value` report on stdout.
///
/// A `full_desc:` line opens a block that the next `full_desc:` line closes;
/// every `key: value` line inside it is appended to `full_desc`. Only
/// complete lines are considered.
pub fn parse_metadata(stdout: &str) -> Params {
    let mut metadata = Params::new();
    let mut in_block = false;
    let mut desc: Option<String> = None;

    let complete = match stdout.rfind('\n') {
        Some(end) => &stdout[..end],
        None => return metadata,
    };
    for line in complete.split('\n') {
        let Some(caps) = FIELD_RE.captures(line) else {
            continue;
        };
        let key = &caps[1];
        if key == "full_desc" {
            if in_block {
                let text = desc.take().unwrap_or_default();
                metadata.insert("full_desc", text.trim_end_matches('\n'));
            }
            in_block = !in_block;
        } else if in_block {
            let text = desc.get_or_insert_with(String::new);
            text.push_str(&FROM_RE.replace(line, ""));
            text.push('\n');
        } else {
            metadata.insert(key, caps[2].trim_end());
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_and_limits() {
        let tool = VideoparserTool::analyze(Path::new("/w/snapshot.jpg"));
        let args = tool
            .build_args(Path::new("/w"), &[FileSpec::new("/in/a.mxf", Params::new())], &[])
            .unwrap();
        assert_eq!(args, ["-travisf", "-S", "/w/snapshot.jpg", "/in/a.mxf"]);
        assert_eq!(tool.memory_limit(), 150 * 1024 * 1024);
        assert_eq!(tool.error_lines(), 4);
    }

    #[test]
    fn single_input_no_output() {
        let mut tool = VideoparserTool::new();
        let f = FileSpec::new("/a", Params::new());
        assert!(tool.accept_input(&[f.clone()], &f).is_err());
        assert!(tool.accept_output(&[], &f).is_err());
    }

    #[test]
    fn key_values() {
        let md = parse_metadata("codec: mpeg2video\nwidth:   720\npartial: line");
        assert_eq!(md.str("codec"), Some("mpeg2video"));
        assert_eq!(md.str("width"), Some("720"));
        assert!(!md.contains("partial"));
    }

    #[test]
    fn full_description_block() {
        let stdout = "codec: dv\n\
                      full_desc: begin\n\
                      Input #0: dv, from 'a.dv':\n\
                      no separator here\n\
                      Stream #0:0: Video: dvvideo\n\
                      full_desc: end\n\
                      height: 576\n";
        let md = parse_metadata(stdout);
        assert_eq!(md.str("full_desc"), Some("Input #0: dv\nStream #0:0: Video: dvvideo"));
        assert_eq!(md.str("height"), Some("576"));
        assert_eq!(md.str("codec"), Some("dv"));
    }
}
