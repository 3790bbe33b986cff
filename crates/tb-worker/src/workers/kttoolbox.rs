//! kt-toolbox: subtitle extraction (teletext VBI to EBU STL).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tb_core::{Params, Result};

use crate::progress::percent_progress;
use crate::worker::{FileSpec, Options, Tool};

pub const NAME: &str = "kt-toolbox";

/// Default kt-toolbox action.
pub const VBI_TO_STL: &str = "VBITOSTL";

/// Parameter name to command-line flag.
pub const OPTION_MAP: &[(&str, &str)] = &[
    ("basename", "-b"),
    ("vbi_teletext_line_number", "-gxf-lt"),
    ("original_program_title", "-stl-op"),
    ("original_episode_title", "-stl-oe"),
    ("translated_program_title", "-stl-tp"),
    ("translated_episode_title", "-stl-te"),
    ("translator_name", "-stl-tn"),
    ("translator_contact_details", "-stl-td"),
    ("translator_country_origin", "-stl-co"),
    ("publisher", "-stl-p"),
    ("editor_name", "-stl-en"),
    ("editor_contact_details", "-stl-ed"),
    ("user_defined_area", "-stl-ud"),
];

static OUTPUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"output-(\d+): (.*)").expect("output pattern"));

#[derive(Debug, Clone)]
pub struct KtToolboxTool {
    action: String,
    options: Options,
}

impl Default for KtToolboxTool {
    fn default() -> Self {
        Self {
            action: VBI_TO_STL.into(),
            options: Options::new(),
        }
    }
}

impl KtToolboxTool {
    /// Build from action parameters: `action` plus any key of
    /// [`OPTION_MAP`] with a non-empty value.
    pub fn from_params(params: &Params) -> Self {
        let mut tool = Self {
            action: params.str("action").unwrap_or(VBI_TO_STL).to_string(),
            options: Options::new(),
        };
        for &(key, flag) in OPTION_MAP {
            if let Some(value) = params.string(key).filter(|v| !v.is_empty()) {
                tool.options.set(flag, value);
            }
        }
        tool
    }

    pub fn action(&self) -> &str {
        &self.action
    }
}

impl Tool for KtToolboxTool {
    fn name(&self) -> &str {
        NAME
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        let mut args = vec![self.action.clone()];
        for input in inputs {
            args.push("-i".into());
            args.push(input.path_str());
        }
        for output in outputs {
            args.push("-o".into());
            args.push(output.path_str());
        }
        args.extend(self.options.to_args());
        Ok(args)
    }

    fn progress(&self, stdout_tail: &str, _stderr_tail: &str) -> Option<u8> {
        percent_progress(stdout_tail)
    }

    fn error_lines(&self) -> usize {
        4
    }
}

/// `output-N: path` lines announced on stdout, keyed by track number.
pub fn parse_outputs(stdout: &str) -> BTreeMap<String, String> {
    OUTPUT_RE
        .captures_iter(stdout)
        .map(|c| (c[1].to_string(), c[2].trim_end().to_string()))
        .collect()
}
