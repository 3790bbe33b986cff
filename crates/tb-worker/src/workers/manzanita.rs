//! Manzanita `mp2tsms`: MPEG transport stream demux and mux.
//!
//! Muxing is driven by a `manzanita.conf` file written into the working
//! directory right before the tool starts; the argument vector is just the
//! path of that file.

use std::fmt::Write as _;
use std::path::Path;

use tb_core::{Error, Params, Result};

use crate::worker::{FileSpec, Tool};

pub const NAME: &str = "mp2tsms";
pub const CONFIG_FILE: &str = "manzanita.conf";

const TRANSPORT_DEFAULTS: &[(&str, Option<&str>)] = &[
    ("FileSize", Some("0")),
    ("Rate", Some("0")),
    ("Duration", Some("0")),
    ("Leader", Some("0")),
    ("PSIPATrep", Some("10.000")),
    ("PSIPMTrep", Some("10.000")),
    ("PATtsid", Some("0")),
    ("PATvsn", Some("0")),
    ("DIT", Some("No")),
    ("DITTransition", Some("0")),
    ("SIT", Some("No")),
    ("SITPeriod", Some("0")),
    ("SITVersion", Some("0")),
    ("SITTransDescr", None),
    ("SITServiceID", Some("2")),
    ("SITRunningStatus", Some("0")),
    ("SITSvcDescr", None),
    ("NoEmptyAF", Some("No")),
    ("HDVModeHD2", Some("No")),
    ("AUXVPID", None),
    ("AUXAPID", None),
    ("HDVDropFrame", Some("No")),
];

const PROGRAM_DEFAULTS: &[(&str, Option<&str>)] = &[
    ("ProgramNumber", Some("2")),
    ("PMTPID", Some("32")),
    ("PMTvsn", Some("0")),
    ("Descriptors", None),
    ("PCRPID", Some("-1")),
    ("PCRPES", Some("No")),
];

const VIDEO_DEFAULTS: &[(&str, Option<&str>)] = &[
    ("Rate", Some("0")),
    ("QuadByte", Some("No")),
    ("StreamType", Some("0")),
    ("Descriptors", None),
    ("PID", Some("33")),
    ("InitDI", Some("No")),
    ("RAI", Some("No")),
    ("PESalign", Some("No")),
    ("PEScopyrt", Some("No")),
    ("PESid", Some("0")),
    ("PESnau", Some("1")),
    ("StreamDelay", Some("0")),
    ("Delay", Some("0")),
];

const AUDIO_DEFAULTS: &[(&str, Option<&str>)] = &[
    ("StreamType", Some("0")),
    ("Descriptors", None),
    ("PID", Some("36")),
    ("InitDI", Some("No")),
    ("RAI", Some("No")),
    ("PESalign", Some("No")),
    ("PEScopyrt", Some("No")),
    ("PESid", Some("0")),
    ("PESnau", Some("2")),
    ("StreamDelay", Some("0")),
    ("Delay", Some("0")),
    ("SkipFrames", Some("0")),
];

/// Kind of a configuration section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    Transport,
    Program,
    Video,
    Audio,
}

impl SectionKind {
    fn defaults(self) -> &'static [(&'static str, Option<&'static str>)] {
        match self {
            SectionKind::Transport => TRANSPORT_DEFAULTS,
            SectionKind::Program => PROGRAM_DEFAULTS,
            SectionKind::Video => VIDEO_DEFAULTS,
            SectionKind::Audio => AUDIO_DEFAULTS,
        }
    }

    fn from_type(kind: Option<&str>) -> Option<Self> {
        match kind? {
            "video" => Some(SectionKind::Video),
            "audio" => Some(SectionKind::Audio),
            _ => None,
        }
    }
}

/// Ordered `key = value` entries of one section; absent values are not
/// written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfSection {
    entries: Vec<(String, Option<String>)>,
}

impl ConfSection {
    pub fn defaults(kind: SectionKind) -> Self {
        Self {
            entries: kind
                .defaults()
                .iter()
                .map(|(k, v)| (k.to_string(), v.map(String::from)))
                .collect(),
        }
    }

    /// Override known keys from `params`. Unknown keys are ignored, and an
    /// empty or `None` value leaves an unset key unset.
    pub fn apply(&mut self, params: &Params) {
        for (key, slot) in self.entries.iter_mut() {
            let Some(value) = params.string(key) else {
                continue;
            };
            if slot.is_none() && (value.is_empty() || value == "None") {
                continue;
            }
            *slot = Some(value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.as_deref())
    }

    fn write_to(&self, out: &mut String) {
        for (key, value) in &self.entries {
            if let Some(value) = value {
                let _ = writeln!(out, "{key} = {value}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Demux
// ---------------------------------------------------------------------------

/// `mp2tsms -dd IN STREAM_ID OUT..`; every output needs a `stream_id`.
#[derive(Debug, Clone, Default)]
pub struct ManzanitaDemuxTool;

impl Tool for ManzanitaDemuxTool {
    fn name(&self) -> &str {
        NAME
    }

    fn accept_output(&mut self, _existing: &[FileSpec], file: &FileSpec) -> Result<()> {
        if file.params.string("stream_id").is_none() {
            return Err(Error::argument(NAME, "demux output requires a stream_id"));
        }
        Ok(())
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        let mut args = Vec::new();
        for input in inputs {
            args.push("-dd".into());
            args.push(input.path_str());
        }
        for output in outputs {
            let id = output
                .params
                .string("stream_id")
                .ok_or_else(|| Error::argument(NAME, "demux output requires a stream_id"))?;
            args.push(id);
            args.push(output.path_str());
        }
        Ok(args)
    }

    fn error_lines(&self) -> usize {
        4
    }
}

// ---------------------------------------------------------------------------
// Mux
// ---------------------------------------------------------------------------

/// Transport stream mux of elementary streams. Inputs carry a `type` of
/// `video` or `audio` plus per-stream overrides.
#[derive(Debug, Clone)]
pub struct ManzanitaMuxTool {
    transport: ConfSection,
    program: ConfSection,
    video: Params,
    audio: Params,
}

impl Default for ManzanitaMuxTool {
    fn default() -> Self {
        Self {
            transport: ConfSection::defaults(SectionKind::Transport),
            program: ConfSection::defaults(SectionKind::Program),
            video: Params::new(),
            audio: Params::new(),
        }
    }
}

impl ManzanitaMuxTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides taken from the `transport`, `program`, `video` and `audio`
    /// objects of `params`.
    pub fn from_params(params: &Params) -> Result<Self> {
        let section = |key: &str| -> Result<Params> {
            params
                .get(key)
                .cloned()
                .map(Params::from_value)
                .transpose()
                .map(Option::unwrap_or_default)
        };
        let mut tool = Self::new();
        tool.transport.apply(&section("transport")?);
        tool.program.apply(&section("program")?);
        tool.video = section("video")?;
        tool.audio = section("audio")?;
        Ok(tool)
    }

    /// Configuration file contents for the given streams and output.
    pub fn render_config(&self, inputs: &[FileSpec], output: &Path) -> Result<String> {
        let mut out = String::new();
        out.push_str("Transport*\n");
        let _ = writeln!(out, "File = {}", output.display());
        self.transport.write_to(&mut out);
        out.push_str("\n\n");

        out.push_str("Program1*\n");
        self.program.write_to(&mut out);
        out.push_str("\n\n");

        let (mut videos, mut audios) = (0, 0);
        for input in inputs {
            let kind = SectionKind::from_type(input.params.str("type"))
                .ok_or_else(|| Error::argument(NAME, "input file type not specified"))?;
            let mut section = ConfSection::defaults(kind);
            section.apply(&input.params);
            match kind {
                SectionKind::Video => {
                    videos += 1;
                    section.apply(&self.video);
                    let _ = writeln!(out, "Video{videos}$");
                }
                _ => {
                    audios += 1;
                    section.apply(&self.audio);
                    let _ = writeln!(out, "Audio{audios}$");
                }
            }
            let _ = writeln!(out, "File = {}", input.path.display());
            section.write_to(&mut out);
            out.push_str("\n\n");
        }
        Ok(out)
    }
}

impl Tool for ManzanitaMuxTool {
    fn name(&self) -> &str {
        NAME
    }

    fn accept_input(&mut self, _existing: &[FileSpec], file: &FileSpec) -> Result<()> {
        if SectionKind::from_type(file.params.str("type")).is_none() {
            return Err(Error::argument(NAME, "input file type not specified"));
        }
        Ok(())
    }

    fn accept_output(&mut self, existing: &[FileSpec], _file: &FileSpec) -> Result<()> {
        if !existing.is_empty() {
            return Err(Error::argument(NAME, "mux only supports one output file"));
        }
        Ok(())
    }

    fn prepare(&mut self, working_dir: &Path, inputs: &[FileSpec], outputs: &[FileSpec]) -> Result<()> {
        let output = outputs
            .first()
            .ok_or_else(|| Error::argument(NAME, "no output file specified"))?;
        let contents = self.render_config(inputs, &output.path)?;
        std::fs::create_dir_all(working_dir)?;
        std::fs::write(working_dir.join(CONFIG_FILE), contents)?;
        Ok(())
    }

    fn build_args(
        &self,
        working_dir: &Path,
        _inputs: &[FileSpec],
        _outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        Ok(vec![working_dir.join(CONFIG_FILE).to_string_lossy().into_owned()])
    }

    fn error_lines(&self) -> usize {
        4
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stream(path: &str, kind: &str) -> FileSpec {
        FileSpec::new(path, Params::new().with("type", kind))
    }

    #[test]
    fn section_overrides() {
        let mut s = ConfSection::defaults(SectionKind::Program);
        s.apply(&Params::new().with("PMTPID", 100).with("Descriptors", "").with("Bogus", 1));
        assert_eq!(s.get("PMTPID"), Some("100"));
        assert_eq!(s.get("Descriptors"), None);
        assert_eq!(s.get("Bogus"), None);
        s.apply(&Params::new().with("Descriptors", "0x0a"));
        assert_eq!(s.get("Descriptors"), Some("0x0a"));
    }

    #[test]
    fn demux_args() {
        let tool = ManzanitaDemuxTool;
        let args = tool
            .build_args(
                Path::new("/w"),
                &[FileSpec::new("/in/a.ts", Params::new())],
                &[
                    FileSpec::new("/w/v.m2v", Params::new().with("stream_id", "0xe0")),
                    FileSpec::new("/w/a.mp2", Params::new().with("stream_id", "0xc0")),
                ],
            )
            .unwrap();
        assert_eq!(args, ["-dd", "/in/a.ts", "0xe0", "/w/v.m2v", "0xc0", "/w/a.mp2"]);
    }

    #[test]
    fn demux_requires_stream_id() {
        let mut tool = ManzanitaDemuxTool;
        assert!(tool.accept_output(&[], &FileSpec::new("/w/v", Params::new())).is_err());
    }

    #[test]
    fn mux_requires_typed_inputs() {
        let mut tool = ManzanitaMuxTool::new();
        assert!(tool.accept_input(&[], &FileSpec::new("/v", Params::new())).is_err());
        assert!(tool.accept_input(&[], &stream("/v", "video")).is_ok());
    }

    #[test]
    fn config_layout() {
        let tool = ManzanitaMuxTool::from_params(
            &Params::from_value(json!({
                "transport": {"Rate": "15000000"},
                "audio": {"PID": 40}
            }))
            .unwrap(),
        )
        .unwrap();
        let conf = tool
            .render_config(
                &[
                    stream("/w/clip_v1.m2v", "video"),
                    stream("/w/clip_a1.wav", "audio"),
                    stream("/w/clip_a2.wav", "audio"),
                ],
                Path::new("/w/out.ts"),
            )
            .unwrap();
        assert!(conf.starts_with("Transport*\nFile = /w/out.ts\nFileSize = 0\nRate = 15000000\n"));
        assert!(!conf.contains("SITTransDescr"));
        assert!(conf.contains("\n\n\nProgram1*\nProgramNumber = 2\n"));
        assert!(conf.contains("Video1$\nFile = /w/clip_v1.m2v\nRate = 0\n"));
        assert!(conf.contains("Audio1$\nFile = /w/clip_a1.wav\n"));
        assert!(conf.contains("Audio2$\nFile = /w/clip_a2.wav\n"));
        assert!(conf.contains("PID = 40"));
        assert!(conf.contains("PID = 33"));
    }

    #[test]
    fn prepare_writes_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut tool = ManzanitaMuxTool::new();
        let inputs = [stream("/w/v.m2v", "video")];
        let outputs = [FileSpec::new(dir.path().join("out.ts"), Params::new())];
        tool.prepare(dir.path(), &inputs, &outputs).unwrap();
        let written = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(written.contains("Video1$"));
        let args = tool.build_args(dir.path(), &inputs, &outputs).unwrap();
        assert_eq!(args, [dir.path().join(CONFIG_FILE).to_string_lossy().into_owned()]);
        assert_eq!(tool.error_lines(), 4);
    }

    #[test]
    fn prepare_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut tool = ManzanitaMuxTool::new();
        assert!(tool.prepare(dir.path(), &[], &[]).is_err());
    }
}
