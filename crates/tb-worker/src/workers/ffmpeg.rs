//! ffmpeg: transcoding, demuxing to elementary streams, muxing, thumbnails.
//!
//! The argument vector is `[leading options] ([input args..] -i path)..
//! ([output args..] path).. [trailing args]`. Output arguments travel in the
//! output file's `args` parameter, so the builders below return fresh
//! [`FileSpec`] lists that the caller adds to the worker.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde_json::Value;
use tb_core::{AvInfo, Error, Params, Result};

use crate::progress::frame_progress;
use crate::worker::{FileSpec, Options, Tool};

pub const NAME: &str = "ffmpeg";

// ---------------------------------------------------------------------------
// Codecs and containers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Copy,
    /// Sony IMX (D10), intra MPEG-2 4:2:2.
    Imx,
    /// XDCAM HD, long-GOP MPEG-2 4:2:2.
    Xdcamhd,
    Dnxhd,
    Dvvideo,
    H264,
    Prores,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Copy,
    Pcm,
    Aac,
    Mp2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Container {
    Mxf,
    Mov,
    Mp4,
    Flv,
    Ts,
    Mpg,
}

macro_rules! keyword_enum {
    ($ty:ident, $what:literal, { $($name:literal => $variant:ident),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl FromStr for $ty {
            type Err = Error;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err(Error::validation(format!(
                        concat!("unsupported ", $what, " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

keyword_enum!(VideoCodec, "video codec", {
    "copy" => Copy,
    "imx" => Imx,
    "xdcamhd" => Xdcamhd,
    "dnxhd" => Dnxhd,
    "dvvideo" => Dvvideo,
    "h264" => H264,
    "prores" => Prores,
});

keyword_enum!(AudioCodec, "audio codec", {
    "copy" => Copy,
    "pcm" => Pcm,
    "aac" => Aac,
    "mp2" => Mp2,
});

keyword_enum!(Container, "container", {
    "mxf" => Mxf,
    "mov" => Mov,
    "mp4" => Mp4,
    "flv" => Flv,
    "ts" => Ts,
    "mpg" => Mpg,
});

impl Container {
    /// Check that the container can carry the codec pair.
    pub fn validate(self, video: VideoCodec, audio: AudioCodec) -> Result<()> {
        use AudioCodec as A;
        use VideoCodec as V;

        let video_ok = match self {
            Container::Mxf => matches!(video, V::Copy | V::Imx | V::Xdcamhd | V::Dnxhd | V::Dvvideo),
            Container::Mov => true,
            Container::Mp4 => matches!(video, V::Copy | V::H264),
            Container::Flv => matches!(video, V::H264),
            Container::Ts => matches!(video, V::Copy | V::Imx | V::Xdcamhd | V::H264),
            Container::Mpg => matches!(video, V::Copy | V::Imx | V::Xdcamhd),
        };
        let audio_ok = match self {
            Container::Mxf => matches!(audio, A::Copy | A::Pcm),
            Container::Mov => matches!(audio, A::Copy | A::Pcm | A::Aac),
            Container::Mp4 => matches!(audio, A::Copy | A::Aac),
            Container::Flv => matches!(audio, A::Aac),
            Container::Ts => matches!(audio, A::Copy | A::Mp2 | A::Aac),
            Container::Mpg => matches!(audio, A::Copy | A::Mp2 | A::Pcm),
        };

        if !video_ok {
            return Err(Error::argument(
                NAME,
                format!("{self} container does not support {video} video"),
            ));
        }
        if !audio_ok {
            return Err(Error::argument(
                NAME,
                format!("{self} container does not support {audio} audio"),
            ));
        }
        Ok(())
    }

    pub fn extension(self) -> &'static str {
        match self {
            Container::Mxf => "mxf",
            Container::Mov => "mov",
            Container::Mp4 => "mp4",
            Container::Flv => "flv",
            Container::Ts => "ts",
            Container::Mpg => "mpg",
        }
    }

    /// Whether streaming hints can be added after muxing.
    pub fn supports_hinting(self) -> bool {
        matches!(self, Container::Flv | Container::Mp4 | Container::Mov)
    }
}

// ---------------------------------------------------------------------------
// Encoding options
// ---------------------------------------------------------------------------

/// Video encoding settings.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoOptions {
    pub codec: VideoCodec,
    /// kbit/s; 0 keeps the encoder default.
    pub bitrate: u64,
    pub pix_fmt: String,
    pub gop_size: u32,
    pub closed_gop: bool,
    pub interlaced: bool,
    pub aspect_ratio: Option<String>,
    /// Tag IMX streams with their QuickTime fourcc.
    pub fourcc_tagging: bool,
    pub timecode: Option<String>,
    pub threads: u32,
}

impl Default for VideoOptions {
    fn default() -> Self {
        Self {
            codec: VideoCodec::Imx,
            bitrate: 50000,
            pix_fmt: "yuv422p".into(),
            gop_size: 0,
            closed_gop: false,
            interlaced: true,
            aspect_ratio: None,
            fourcc_tagging: false,
            timecode: None,
            threads: 1,
        }
    }
}

impl VideoOptions {
    pub fn args(&self) -> Vec<String> {
        let mut o = Options::new();
        let b = self.bitrate;
        match self.codec {
            VideoCodec::Copy => {
                o.set("-vcodec", "copy");
            }
            VideoCodec::Imx => {
                o.set("-vcodec", "mpeg2video")
                    .flag("-intra")
                    .set("-pix_fmt", "yuv422p")
                    .set("-b:v", format!("{b}k"))
                    .set("-minrate", format!("{b}k"))
                    .set("-maxrate", format!("{b}k"))
                    .set("-bufsize", format!("{}k", b * 40 / 1000))
                    .set("-rc_init_occupancy", format!("{}k", b * 40 / 1000))
                    .set("-dc", 10);
                if self.fourcc_tagging {
                    o.set("-vtag", imx_fourcc(b));
                }
            }
            VideoCodec::Xdcamhd => {
                o.set("-vcodec", "mpeg2video")
                    .set("-pix_fmt", "yuv422p")
                    .set("-b:v", format!("{b}k"))
                    .set("-maxrate", format!("{b}k"))
                    .set("-bf", 2)
                    .set("-g", 12);
            }
            VideoCodec::Dnxhd => {
                o.set("-vcodec", "dnxhd").set("-b:v", format!("{b}k"));
            }
            VideoCodec::Dvvideo => {
                o.set("-vcodec", "dvvideo").set("-pix_fmt", &self.pix_fmt);
            }
            VideoCodec::H264 => {
                o.set("-vcodec", "libx264").set("-pix_fmt", "yuv420p");
                if b > 0 {
                    o.set("-b:v", format!("{b}k"));
                }
            }
            VideoCodec::Prores => {
                o.set("-vcodec", "prores").set("-profile:v", 2);
            }
        }

        if self.codec != VideoCodec::Copy {
            if self.gop_size > 0 {
                o.set("-g", self.gop_size);
            }
            let mpeg2 = matches!(self.codec, VideoCodec::Imx | VideoCodec::Xdcamhd);
            let mut flags = String::new();
            if self.closed_gop {
                flags.push_str("+cgop");
            }
            if self.interlaced && mpeg2 {
                flags.push_str("+ildct+ilme");
                o.set("-top", 1);
            }
            if !flags.is_empty() {
                o.set("-flags", flags);
            }
            if self.threads > 1 {
                o.set("-threads", self.threads);
            }
        }
        if let Some(ar) = &self.aspect_ratio {
            o.set("-aspect", ar);
        }
        if let Some(tc) = &self.timecode {
            o.set("-timecode", tc);
        }
        o.to_args()
    }

    /// Elementary stream extension and raw muxer of the demuxed video.
    fn essence(&self, info: &AvInfo) -> Result<(&'static str, &'static str)> {
        let codec = match self.codec {
            VideoCodec::Copy => info
                .video_streams
                .first()
                .and_then(|v| v.get("codec_name"))
                .and_then(Value::as_str)
                .unwrap_or(""),
            VideoCodec::Imx | VideoCodec::Xdcamhd => "mpeg2video",
            VideoCodec::Dnxhd => "dnxhd",
            VideoCodec::Dvvideo => "dvvideo",
            VideoCodec::H264 => "h264",
            VideoCodec::Prores => "prores",
        };
        match codec {
            "mpeg2video" => Ok(("m2v", "mpeg2video")),
            "dvvideo" => Ok(("dv", "dv")),
            "dnxhd" => Ok(("dnxhd", "dnxhd")),
            "h264" => Ok(("h264", "h264")),
            other => Err(Error::argument(
                NAME,
                format!("cannot demux '{other}' video to an elementary stream"),
            )),
        }
    }
}

fn imx_fourcc(bitrate: u64) -> &'static str {
    match bitrate {
        0..=30000 => "mx3p",
        30001..=40000 => "mx4p",
        _ => "mx5p",
    }
}

/// Audio encoding settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioOptions {
    pub codec: AudioCodec,
    /// PCM sample format (`s16le`, `s24le`).
    pub format: String,
    pub sample_rate: u32,
    /// kbit/s; 0 keeps the encoder default.
    pub bitrate: u64,
    /// Channels per output stream; 0 keeps the source layout.
    pub channels_per_stream: u32,
}

impl Default for AudioOptions {
    fn default() -> Self {
        Self {
            codec: AudioCodec::Pcm,
            format: "s16le".into(),
            sample_rate: 48000,
            bitrate: 0,
            channels_per_stream: 0,
        }
    }
}

impl AudioOptions {
    pub fn args(&self) -> Vec<String> {
        let mut o = Options::new();
        match self.codec {
            AudioCodec::Copy => {
                o.set("-acodec", "copy");
                return o.to_args();
            }
            AudioCodec::Pcm => {
                o.set("-acodec", format!("pcm_{}", self.format));
            }
            AudioCodec::Aac => {
                o.set("-acodec", "aac");
            }
            AudioCodec::Mp2 => {
                o.set("-acodec", "mp2");
            }
        }
        if self.bitrate > 0 && self.codec != AudioCodec::Pcm {
            o.set("-b:a", format!("{}k", self.bitrate));
        }
        if self.sample_rate > 0 {
            o.set("-ar", self.sample_rate);
        }
        if self.channels_per_stream > 0 {
            o.set("-ac", self.channels_per_stream);
        }
        o.to_args()
    }
}

/// Container-level mux settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxOptions {
    /// MXF operational pattern mapping (`default`, `d10`, `rdd9`, `op1a`).
    pub mapping: Option<String>,
    /// QuickTime flavour (`qt6`, `qt7`).
    pub version: Option<String>,
    /// Keep essence in separate files referenced by the container.
    pub reference: bool,
}

// ---------------------------------------------------------------------------
// Output builders
// ---------------------------------------------------------------------------

fn output(path: impl Into<std::path::PathBuf>, kind: &str, args: Vec<String>) -> FileSpec {
    FileSpec::new(
        path,
        Params::new()
            .with("type", kind)
            .with("args", args.into_iter().map(Value::String).collect::<Vec<_>>()),
    )
}

/// Video and audio option fragments of a transcode.
pub fn transcode(video: &VideoOptions, audio: &AudioOptions) -> Vec<String> {
    let mut args = video.args();
    args.extend(audio.args());
    args
}

/// Single container output `dir/basename.ext` using the given encoding.
pub fn mux(
    dir: &Path,
    basename: &str,
    container: Container,
    video: &VideoOptions,
    audio: &AudioOptions,
    options: &MuxOptions,
) -> Result<FileSpec> {
    container.validate(video.codec, audio.codec)?;
    let format = match (container, options.mapping.as_deref()) {
        (Container::Mxf, Some("d10")) => "mxf_d10",
        (Container::Mxf, _) => "mxf",
        (Container::Mov, _) => "mov",
        (Container::Mp4, _) => "mp4",
        (Container::Flv, _) => "flv",
        (Container::Ts, _) => "mpegts",
        (Container::Mpg, _) => "vob",
    };
    let mut args = vec!["-map".to_string(), "0:v?".into(), "-map".into(), "0:a?".into()];
    args.extend(transcode(video, audio));
    args.extend(["-f".to_string(), format.to_string()]);
    let path = dir.join(format!("{basename}.{}", container.extension()));
    Ok(output(path, "container", args))
}

/// One elementary stream output per source stream: the first video stream
/// as `basename_v1.<ext>` and every audio stream as `basename_aN.wav`.
pub fn demux(
    dir: &Path,
    basename: &str,
    video: &VideoOptions,
    audio: &AudioOptions,
    info: &AvInfo,
) -> Result<Vec<FileSpec>> {
    let mut outputs = Vec::new();

    if info.has_video() {
        let (ext, format) = video.essence(info)?;
        let mut args = vec!["-map".to_string(), "0:v:0".into(), "-an".into()];
        args.extend(video.args());
        args.extend(["-f".to_string(), format.to_string()]);
        outputs.push(output(dir.join(format!("{basename}_v1.{ext}")), "video", args));
    }

    if info.nb_audio_streams() > 0 {
        let pcm = match audio.codec {
            AudioCodec::Pcm => audio.clone(),
            AudioCodec::Copy if info.audio_format.is_some() => AudioOptions {
                codec: AudioCodec::Copy,
                ..audio.clone()
            },
            other => {
                return Err(Error::argument(
                    NAME,
                    format!("cannot demux {other} audio to wav"),
                ))
            }
        };
        for i in 0..info.nb_audio_streams() {
            let mut args = vec!["-map".to_string(), format!("0:a:{i}"), "-vn".into()];
            args.extend(pcm.args());
            args.extend(["-f".to_string(), "wav".to_string()]);
            outputs.push(output(
                dir.join(format!("{basename}_a{}.wav", i + 1)),
                "audio",
                args,
            ));
        }
    }

    if outputs.is_empty() {
        return Err(Error::argument(NAME, "source has no stream to demux"));
    }
    Ok(outputs)
}

/// Single-frame JPEG thumbnail, scaled to `width` when non-zero.
pub fn thumbnail(path: &Path, width: u32) -> FileSpec {
    let mut args = vec![
        "-an".to_string(),
        "-vframes".into(),
        "1".into(),
        "-f".into(),
        "image2".into(),
    ];
    if width > 0 {
        args.extend(["-vf".to_string(), format!("scale={width}:-1")]);
    }
    output(path, "thumbnail", args)
}

fn string_list(params: &Params, key: &str) -> Result<Vec<String>> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => Ok(s.clone()),
                Value::Number(n) => Ok(n.to_string()),
                other => Err(Error::argument(NAME, format!("invalid argument {other}"))),
            })
            .collect(),
        Some(other) => Err(Error::argument(
            NAME,
            format!("'{key}' must be a list of arguments, got {other}"),
        )),
    }
}

// ---------------------------------------------------------------------------
// Tool
// ---------------------------------------------------------------------------

/// ffmpeg invocation.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    leading: Options,
    trailing: Vec<String>,
    nb_frames: u64,
    help: bool,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        let mut leading = Options::new();
        leading.flag("-y");
        Self {
            leading,
            trailing: Vec::new(),
            nb_frames: 0,
            help: false,
        }
    }
}

impl FfmpegTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// `ffmpeg -h full`, used to probe for supported options.
    pub fn full_help() -> Self {
        Self {
            leading: Options::new(),
            trailing: vec!["-h".into(), "full".into()],
            nb_frames: 0,
            help: true,
        }
    }

    /// Decoding threads.
    pub fn with_threads(mut self, threads: u32) -> Self {
        if threads > 1 {
            self.leading.set("-threads", threads);
        }
        self
    }

    /// Expected frame count for progress; overrides input parameters.
    pub fn with_nb_frames(mut self, frames: u64) -> Self {
        self.nb_frames = frames;
        self
    }

    pub fn with_option(mut self, flag: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.leading.set(flag, v),
            None => self.leading.flag(flag),
        };
        self
    }

    pub fn with_trailing(mut self, args: impl IntoIterator<Item = String>) -> Self {
        self.trailing.extend(args);
        self
    }

    pub fn nb_frames(&self) -> u64 {
        self.nb_frames
    }
}

impl Tool for FfmpegTool {
    fn name(&self) -> &str {
        NAME
    }

    fn accept_input(&mut self, _existing: &[FileSpec], file: &FileSpec) -> Result<()> {
        if self.help {
            return Err(Error::argument(NAME, "help mode takes no input file"));
        }
        string_list(&file.params, "args")?;
        if let Some(n) = file.params.u64("nb_frames") {
            self.nb_frames = self.nb_frames.max(n);
        }
        Ok(())
    }

    fn accept_output(&mut self, _existing: &[FileSpec], file: &FileSpec) -> Result<()> {
        if self.help {
            return Err(Error::argument(NAME, "help mode takes no output file"));
        }
        string_list(&file.params, "args").map(|_| ())
    }

    fn build_args(
        &self,
        _working_dir: &Path,
        inputs: &[FileSpec],
        outputs: &[FileSpec],
    ) -> Result<Vec<String>> {
        if !self.help && inputs.is_empty() {
            return Err(Error::argument(NAME, "no input file specified"));
        }
        let mut args = self.leading.to_args();
        for input in inputs {
            args.extend(string_list(&input.params, "args")?);
            args.push("-i".into());
            args.push(input.path_str());
        }
        for out in outputs {
            args.extend(string_list(&out.params, "args")?);
            args.push(out.path_str());
        }
        args.extend(self.trailing.iter().cloned());
        Ok(args)
    }

    fn progress(&self, _stdout_tail: &str, stderr_tail: &str) -> Option<u8> {
        frame_progress(stderr_tail, self.nb_frames)
    }
}
