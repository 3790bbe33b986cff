//! ffprobe: stream and format inspection.

use std::path::Path;

use serde_json::Value;
use tb_core::{Error, Params, Result};

use crate::worker::{FileSpec, Options, Tool};

pub const NAME: &str = "ffprobe";

/// ffprobe invocation printing JSON format and stream information.
#[derive(Debug, Clone)]
pub struct FfprobeTool {
    options: Options,
    help: bool,
}

impl Default for FfprobeTool {
    fn default() -> Self {
        let mut options = Options::new();
        options
            .set("-print_format", "json")
            .flag("-show_format")
            .flag("-show_streams");
        Self {
            options,
            help: false,
        }
    }
}

impl FfprobeTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ffprobe -h full`.
    pub fn full_help() -> Self {
        let mut options = Options::new();
        options.set("-h", "full");
        Self { options, help: true }
    }

    /// Decode every frame to report `nb_read_frames`.
    pub fn count_frames(mut self) -> Self {
        self.options.flag("-count_frames");
        self
    }

    /// Demux every packet to report `nb_read_packets`.
    pub fn count_packets(mut self) -> Self {
        self.options.flag("-count_packets");
        self
    }
}

impl Tool for FfprobeTool {
    fn name(&self) -> &str {
        NAME
    }

    fn accept_input(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        if self.help {
            return Err(Error::argument(NAME, "help mode takes no input file"));
        }
        if !existing.is_empty() {
            return Err(Error::argument(NAME, "ffprobe only supports one input file"));
        }
        Ok(())
    }

    fn accept_output(&mut self, _existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        Err(Error::argument(NAME, "ffprobe does not write output files"))
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        _outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        if !self.help && inputs.is_empty() {
            return Err(Error::argument(NAME, "no input file specified"));
        }
        let mut args = self.options.to_args();
        args.extend(inputs.iter().map(FileSpec::path_str));
        Ok(args)
    }
}

/// Decode the JSON report on stdout.
///
/// Adds `nb_audio_streams` and `nb_video_streams` to `format` and a
/// `description` built from the `Input`, `Duration` and `Stream` lines on
/// stderr.
pub fn parse_metadata(stdout: &str, stderr: &str) -> Result<Params> {
    let value: Value = serde_json::from_str(stdout).map_err(|e| {
        Error::argument(NAME, format!("ffprobe output could not be decoded: {e}"))
    })?;
    let mut metadata = Params::from_value(value)?;

    let (mut audio, mut video) = (0u64, 0u64);
    if let Some(streams) = metadata.get("streams").and_then(Value::as_array) {
        for stream in streams {
            match stream.get("codec_type").and_then(Value::as_str) {
                Some("video") => video += 1,
                Some("audio") => audio += 1,
                _ => {}
            }
        }
    } else {
        metadata.insert("streams", Value::Array(Vec::new()));
    }

    let mut format = match metadata.remove("format") {
        Some(Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    format.insert("nb_audio_streams".into(), audio.into());
    format.insert("nb_video_streams".into(), video.into());
    metadata.insert("format", Value::Object(format));
    metadata.insert("description", describe(stderr));
    Ok(metadata)
}

fn describe(stderr: &str) -> String {
    let mut lines = Vec::new();
    for line in stderr.split('\n') {
        let line = line.trim();
        if line.starts_with("Input") {
            let cut = line.find(", from").map_or(line, |i| &line[..i]);
            lines.push(cut);
        } else if line.starts_with("Duration") || line.starts_with("Stream") {
            lines.push(line);
        }
    }
    lines.join("\n").trim().to_string()
}
