//! `raw2bmx`: wraps elementary streams into MXF.

use std::path::{Path, PathBuf};

use tb_core::{Error, Params, Result, Timecode};

use crate::worker::{FileSpec, Options, Tool};

pub const NAME: &str = "raw2bmx";

/// Essence flag for an input's `codec` parameter.
pub fn codec_flag(codec: Option<&str>) -> Result<&'static str> {
    match codec {
        Some("dnxhd") => Ok("--vc3"),
        Some("dvvideo") => Ok("--dv"),
        Some("imx") => Ok("--d10"),
        Some("xdcamhd") => Ok("--mpeg2lg"),
        Some("pcm") => Ok("--wave"),
        other => Err(Error::argument(
            NAME,
            format!("raw2bmx does not support the {} codec", other.unwrap_or("unspecified")),
        )),
    }
}

/// `raw2bmx [-t mapping] [-y tc] -o OUT (--flag IN)..`
#[derive(Debug, Clone, Default)]
pub struct Raw2BmxTool {
    options: Options,
}

impl Raw2BmxTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// MXF mux with the given mapping; `default` and `rdd9` map to `op1a`.
    pub fn mux(mapping: Option<&str>) -> Self {
        let mapping = match mapping {
            None | Some("default") | Some("rdd9") => "op1a",
            Some(other) => other,
        };
        let mut tool = Self::new();
        tool.options.set("-t", mapping);
        tool
    }

    pub fn with_timecode(mut self, timecode: &str) -> Result<Self> {
        timecode
            .parse::<Timecode>()
            .map_err(|_| Error::argument(NAME, "timecode must be something like hh:mm:ss[:|;]ff"))?;
        self.options.set("-y", timecode);
        Ok(self)
    }

    pub fn options(&self) -> &Options {
        &self.options
    }
}

/// MXF output `basepath.mxf`.
pub fn mux_output(basepath: &Path) -> FileSpec {
    let mut path = basepath.as_os_str().to_owned();
    path.push(".mxf");
    FileSpec::new(PathBuf::from(path), Params::new())
}

impl Tool for Raw2BmxTool {
    fn name(&self) -> &str {
        NAME
    }

    fn accept_input(&mut self, _existing: &[FileSpec], file: &FileSpec) -> Result<()> {
        codec_flag(file.params.str("codec")).map(|_| ())
    }

    fn accept_output(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::argument(NAME, "raw2bmx only supports one output file"));
        }
        Ok(())
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        if inputs.is_empty() {
            return Err(Error::argument(NAME, "no input file specified"));
        }
        let mut args = self.options.to_args();
        for output in outputs {
            args.push("-o".into());
            args.push(output.path_str());
        }
        for input in inputs {
            args.push(codec_flag(input.params.str("codec"))?.into());
            args.push(input.path_str());
        }
        Ok(args)
    }
}
