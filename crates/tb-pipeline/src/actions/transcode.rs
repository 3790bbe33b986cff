//! Transcoding to broadcast and web formats.
//!
//! The encode always runs through ffmpeg. The container is then written by
//! ffmpeg itself (optionally followed by a streaming hinter), by the Omneon
//! media API from demuxed essences, or by raw2bmx.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde_json::Value;
use tb_core::{AvInfo, Error, Params, Result, Section};
use tb_worker::workers::{
    bmx, ffmpeg, hinting, omneon, AudioCodec, AudioOptions, Container, FfmpegTool, Flvtool2Tool,
    MuxOptions, OmneonCopyTool, OmneonQueryTool, QtFaststartTool, Raw2BmxTool, VideoCodec,
    VideoOptions,
};
use tb_worker::{FileSpec, Worker};

use crate::action::{Action, SetupContext};

use super::{file_payload, stem};

pub const DEFAULT_ESSENCE_DIR: &str = "media.dir/";

/// Display aspect ratio applied to the encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AspectRatio {
    /// 16:9 for HD sources, else 16:9 or 4:3 by the source ratio.
    Default,
    /// 16:9 only when the source declares exactly 16:9.
    Auto,
    /// Source display aspect ratio.
    Copy,
    Fixed(String),
}

impl AspectRatio {
    pub fn resolve(&self, info: &AvInfo) -> String {
        match self {
            AspectRatio::Default => {
                if info.is_hd() || info.dar_value().is_some_and(|dar| dar > 1.5) {
                    "16:9".into()
                } else {
                    "4:3".into()
                }
            }
            AspectRatio::Auto => {
                if info.video_dar == "16:9" {
                    "16:9".into()
                } else {
                    "4:3".into()
                }
            }
            AspectRatio::Copy => info.video_dar.clone(),
            AspectRatio::Fixed(ratio) => ratio.clone(),
        }
    }
}

impl From<&str> for AspectRatio {
    fn from(value: &str) -> Self {
        match value {
            "default" => AspectRatio::Default,
            "auto" => AspectRatio::Auto,
            "copy" => AspectRatio::Copy,
            other => AspectRatio::Fixed(other.to_string()),
        }
    }
}

/// Tool writing the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Muxer {
    Ffmpeg,
    Omneon,
    Bmx,
}

impl FromStr for Muxer {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ffmpeg" => Ok(Muxer::Ffmpeg),
            "omneon" => Ok(Muxer::Omneon),
            "bmx" => Ok(Muxer::Bmx),
            other => Err(Error::validation(format!("Unsupported muxer: {other}"))),
        }
    }
}

impl fmt::Display for Muxer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Muxer::Ffmpeg => "ffmpeg",
            Muxer::Omneon => "omneon",
            Muxer::Bmx => "bmx",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeOptions {
    pub video: VideoOptions,
    pub audio: AudioOptions,
    /// PCM sample format; `None` keeps the source format.
    pub audio_format: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub container: Container,
    pub mux: MuxOptions,
    pub hinting: bool,
    /// Essence directory of demuxing muxers, relative to the working
    /// directory.
    pub essence_dir: String,
    pub muxer: Muxer,
    pub decoding_threads: u32,
}

impl Default for TranscodeOptions {
    fn default() -> Self {
        Self {
            video: VideoOptions::default(),
            audio: AudioOptions::default(),
            audio_format: None,
            aspect_ratio: AspectRatio::Default,
            container: Container::Mxf,
            mux: MuxOptions::default(),
            hinting: false,
            essence_dir: DEFAULT_ESSENCE_DIR.into(),
            muxer: Muxer::Ffmpeg,
            decoding_threads: 1,
        }
    }
}

fn keyword<T>(params: &Params, key: &str, default: T) -> Result<T>
where
    T: FromStr<Err = Error>,
{
    match params.string(key) {
        Some(value) => value.parse(),
        None => Ok(default),
    }
}

/// `default` and absent values mean "let the muxer decide".
fn non_default(params: &Params, key: &str) -> Option<String> {
    params.string(key).filter(|v| v != "default" && !v.is_empty())
}

/// `pcm_s24le` style audio codecs carry their sample format.
fn audio_codec(value: &str) -> Result<(AudioCodec, Option<String>)> {
    match value.strip_prefix("pcm_") {
        Some(format) => Ok((AudioCodec::Pcm, Some(format.to_string()))),
        None => Ok((value.parse()?, None)),
    }
}

/// Filter options that are not built; setting any of them is an error.
const UNSUPPORTED: &[&str] = &[
    "video_resolution",
    "video_letterbox",
    "video_burn",
    "audio_min_streams",
];

/// Whether `value` asks for something other than the default.
fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64() != Some(0.0),
        Value::String(s) => !matches!(s.as_str(), "" | "0" | "default"),
        _ => true,
    }
}

impl TranscodeOptions {
    pub fn from_params(params: &Params) -> Result<Self> {
        if let Some(key) = UNSUPPORTED
            .iter()
            .find(|key| params.get(key).is_some_and(is_set))
        {
            return Err(Error::validation(format!("transcode option {key} is not supported")));
        }
        let defaults = VideoOptions::default();
        let video = VideoOptions {
            codec: keyword(params, "video_codec", defaults.codec)?,
            bitrate: params.u64("video_bitrate").unwrap_or(defaults.bitrate),
            pix_fmt: params.string("video_pix_fmt").unwrap_or(defaults.pix_fmt),
            gop_size: params.u64("video_gop_size").unwrap_or(0) as u32,
            closed_gop: params.bool_or("video_closed_gop", false),
            interlaced: params.bool_or("video_interlaced", true),
            threads: params.u64("encoding_threads").unwrap_or(1) as u32,
            ..defaults
        };

        let (codec, mut audio_format) = match params.str("audio_codec") {
            Some(value) => audio_codec(value)?,
            None => (AudioCodec::Pcm, None),
        };
        if let Some(format) = non_default(params, "audio_format") {
            audio_format = Some(format);
        }
        let audio = AudioOptions {
            codec,
            sample_rate: params.u64("audio_sample_rate").unwrap_or(48000) as u32,
            bitrate: params.u64("audio_bitrate").unwrap_or(0),
            channels_per_stream: params.u64("audio_channels_per_stream").unwrap_or(0) as u32,
            ..AudioOptions::default()
        };

        Ok(Self {
            video,
            audio,
            audio_format,
            aspect_ratio: params
                .str("video_aspect_ratio")
                .map(AspectRatio::from)
                .unwrap_or(AspectRatio::Default),
            container: keyword(params, "container", Container::Mxf)?,
            mux: MuxOptions {
                mapping: non_default(params, "container_mapping"),
                version: non_default(params, "container_version"),
                reference: params.bool_or("container_reference", false),
            },
            hinting: params.bool_or("container_hinting", false),
            essence_dir: params
                .string("container_essence_dir")
                .unwrap_or_else(|| DEFAULT_ESSENCE_DIR.into()),
            muxer: keyword(params, "muxer", Muxer::Ffmpeg)?,
            decoding_threads: params.u64("decoding_threads").unwrap_or(1) as u32,
        })
    }

    /// Reject unsupported combinations and apply the mapping-specific
    /// audio layouts.
    pub fn validate(&mut self) -> Result<()> {
        match self.muxer {
            Muxer::Ffmpeg => {
                if self.mux.reference {
                    return Err(Error::validation(
                        "Reference files are not supported with ffmpeg muxer",
                    ));
                }
                self.container.validate(self.video.codec, self.audio.codec)?;
            }
            Muxer::Bmx => {
                if self.container != Container::Mxf {
                    return Err(Error::validation("BMX only support MXF muxing"));
                }
            }
            Muxer::Omneon => {
                if !matches!(self.container, Container::Mxf | Container::Mov) {
                    return Err(Error::validation(format!(
                        "Omneon library does not support {} container",
                        self.container
                    )));
                }
            }
        }

        if self.container == Container::Mxf {
            match (self.video.codec, self.mux.mapping.as_deref()) {
                (VideoCodec::Xdcamhd, Some("rdd9")) => self.audio.channels_per_stream = 1,
                (VideoCodec::Imx, Some("d10")) => self.audio.channels_per_stream = 8,
                _ => {}
            }
        }

        if self.hinting && self.muxer != Muxer::Ffmpeg {
            tracing::warn!("Only ffmpeg muxer support file hinting for streaming");
            self.hinting = false;
        }
        if self.hinting && !self.container.supports_hinting() {
            tracing::warn!("Only flv, mp4 and mov container support hinting");
            self.hinting = false;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct TranscodeAction {
    name: &'static str,
    options: TranscodeOptions,
}

impl TranscodeAction {
    pub fn new(mut options: TranscodeOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            name: "transcode",
            options,
        })
    }

    pub fn from_params(params: &Params) -> Result<Self> {
        Self::new(TranscodeOptions::from_params(params)?)
    }

    /// MPEG-2 preset: IMX 30 Mb/s with 48 kHz 16-bit PCM, `auto` aspect
    /// ratio, under shorter parameter names.
    pub fn mpeg2(params: &Params) -> Result<Self> {
        const RENAMES: &[(&str, &str)] = &[
            ("codec", "video_codec"),
            ("bitrate", "video_bitrate"),
            ("audio_codec", "audio_codec"),
            ("container", "container"),
            ("container_mapping", "container_mapping"),
            ("container_version", "container_version"),
            ("muxer", "muxer"),
            ("reference", "container_reference"),
            ("aspect_ratio", "video_aspect_ratio"),
            ("essence_dir", "container_essence_dir"),
            ("letterbox", "video_letterbox"),
        ];
        let mut mapped = Params::new()
            .with("video_codec", "imx")
            .with("video_bitrate", 30000)
            .with("audio_codec", "pcm_s16le")
            .with("audio_sample_rate", 48000)
            .with("video_aspect_ratio", "auto");
        for &(from, to) in RENAMES {
            if let Some(value) = params.get(from) {
                mapped.insert(to, value.clone());
            }
        }
        let mut action = Self::from_params(&mapped)?;
        action.name = "mpeg2_transcode";
        Ok(action)
    }

    pub fn create(params: &Params) -> Result<Box<dyn Action>> {
        Ok(Box::new(Self::from_params(params)?))
    }

    pub fn create_mpeg2(params: &Params) -> Result<Box<dyn Action>> {
        Ok(Box::new(Self::mpeg2(params)?))
    }

    pub fn options(&self) -> &TranscodeOptions {
        &self.options
    }

    fn encoding(&self, info: &AvInfo) -> (VideoOptions, AudioOptions) {
        let mut video = self.options.video.clone();
        video.aspect_ratio = Some(self.options.aspect_ratio.resolve(info));
        video.timecode = Some(info.timecode.clone());
        video.fourcc_tagging = self.options.container == Container::Mov;

        let mut audio = self.options.audio.clone();
        audio.format = self
            .options
            .audio_format
            .clone()
            .or_else(|| info.audio_format.clone())
            .unwrap_or_else(|| "s16le".into());
        (video, audio)
    }

    fn essence_dir(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(self.options.essence_dir.trim_start_matches('/'))
    }

    fn publish(ctx: &mut SetupContext<'_>, paths: &[PathBuf]) {
        for (i, path) in paths.iter().enumerate() {
            ctx.resources
                .update(Section::Outputs, (i + 1).to_string(), &file_payload(path));
        }
    }
}

impl Action for TranscodeAction {
    fn name(&self) -> &'static str {
        self.name
    }

    fn needs_media_info(&self) -> bool {
        true
    }

    fn setup(&mut self, ctx: &mut SetupContext<'_>) -> Result<Vec<Worker>> {
        let input = ctx.input_path("1")?;
        let info = ctx.media_info()?;
        let nb_frames = ctx
            .input("1")?
            .u64("nb_video_frames")
            .or_else(|| info.nb_frames())
            .unwrap_or(0);
        let basename = stem(&input);
        let basepath = ctx.working_dir().join(&basename);
        let (video, audio) = self.encoding(&info);
        let opts = &self.options;

        let mut encode = ctx.worker(
            FfmpegTool::new()
                .with_threads(opts.decoding_threads)
                .with_nb_frames(nb_frames),
        );
        encode.add_input_file(&input, Params::new())?;

        match opts.muxer {
            Muxer::Ffmpeg => {
                let target = ffmpeg::mux(
                    ctx.working_dir(),
                    &basename,
                    opts.container,
                    &video,
                    &audio,
                    &opts.mux,
                )?;
                encode.add_output_file(&target.path, target.params.clone())?;
                let mut workers = vec![encode];

                let published = if !opts.hinting {
                    target.path
                } else if opts.container == Container::Flv {
                    let mut hint = ctx.worker(Flvtool2Tool::update());
                    hint.add_input_file(&target.path, Params::new())?;
                    workers.push(hint);
                    target.path
                } else {
                    let hinted = hinting::hinted_output(&target.path);
                    let mut hint = ctx.worker(QtFaststartTool::new());
                    hint.add_input_file(&target.path, Params::new())?;
                    hint.add_output_file(&hinted.path, hinted.params)?;
                    workers.push(hint);
                    hinted.path
                };
                Self::publish(ctx, &[published]);
                Ok(workers)
            }

            Muxer::Omneon => {
                let dir = self.essence_dir(ctx.working_dir());
                let essences = ffmpeg::demux(&dir, &basename, &video, &audio, &info)?;
                add_outputs(&mut encode, &essences)?;

                let mut copy = ctx.worker(OmneonCopyTool::mux(opts.container, &opts.mux)?);
                for essence in &essences {
                    let mut params = Params::new();
                    let is_dv = essence.path.extension().is_some_and(|e| e == "dv");
                    if video.codec == VideoCodec::Copy && is_dv {
                        params.insert("srctrack", 0);
                    }
                    copy.add_input_file(&essence.path, params)?;
                }
                let target = omneon::mux_output(&basepath, opts.container);
                copy.add_output_file(&target.path, target.params)?;

                let mut query = ctx.worker(OmneonQueryTool::new().with_timecode(&info.timecode)?);
                query.add_input_file(&target.path, Params::new())?;

                let mut published = vec![target.path];
                if opts.mux.reference {
                    published.extend(essences.into_iter().map(|e| e.path));
                }
                Self::publish(ctx, &published);
                Ok(vec![encode, copy, query])
            }

            Muxer::Bmx => {
                let dir = self.essence_dir(ctx.working_dir());
                let essences = ffmpeg::demux(&dir, &basename, &video, &audio, &info)?;
                add_outputs(&mut encode, &essences)?;

                let mut wrap = ctx.worker(
                    Raw2BmxTool::mux(opts.mux.mapping.as_deref()).with_timecode(&info.timecode)?,
                );
                for essence in &essences {
                    let codec = match essence.params.str("type") {
                        Some("video") => video.codec.as_str(),
                        _ => "pcm",
                    };
                    wrap.add_input_file(&essence.path, Params::new().with("codec", codec))?;
                }
                let target = bmx::mux_output(&basepath);
                wrap.add_output_file(&target.path, target.params)?;

                Self::publish(ctx, &[target.path]);
                Ok(vec![encode, wrap])
            }
        }
    }
}

fn add_outputs(worker: &mut Worker, files: &[FileSpec]) -> Result<()> {
    for file in files {
        worker.add_output_file(&file.path, file.params.clone())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing;
    use serde_json::json;
    use tb_core::Resources;

    fn params(value: serde_json::Value) -> Params {
        Params::from_value(value).unwrap()
    }

    fn info(value: serde_json::Value) -> AvInfo {
        AvInfo::from_metadata(&params(value)).unwrap()
    }

    fn resources() -> Resources {
        let mut resources = Resources::new();
        resources
            .add(Section::Inputs, "1", Params::new().with("path", "/media/clip.mxf"))
            .unwrap();
        resources.merge_metadata(&testing::pal_metadata());
        resources
    }

    fn setup(action: &mut TranscodeAction, dir: &Path, resources: &mut Resources) -> Vec<Worker> {
        let tools = testing::registry(&[]);
        let mut ctx = testing::context(dir, &tools, resources);
        action.setup(&mut ctx).unwrap()
    }

    #[test]
    fn options_from_params() {
        let opts = TranscodeOptions::from_params(&params(json!({
            "video_codec": "xdcamhd",
            "video_bitrate": "35000",
            "audio_codec": "pcm_s24le",
            "container_mapping": "default",
            "container_version": "qt7",
            "container_hinting": 1,
            "muxer": "omneon"
        })))
        .unwrap();
        assert_eq!(opts.video.codec, VideoCodec::Xdcamhd);
        assert_eq!(opts.video.bitrate, 35000);
        assert!(opts.video.interlaced);
        assert_eq!(opts.audio.codec, AudioCodec::Pcm);
        assert_eq!(opts.audio_format.as_deref(), Some("s24le"));
        assert_eq!(opts.mux.mapping, None);
        assert_eq!(opts.mux.version.as_deref(), Some("qt7"));
        assert_eq!(opts.muxer, Muxer::Omneon);

        assert!(TranscodeOptions::from_params(&params(json!({"muxer": "gstreamer"}))).is_err());
        assert!(TranscodeOptions::from_params(&params(json!({"video_codec": "vp9"}))).is_err());
    }

    #[test]
    fn invalid_combinations_are_rejected() {
        for bad in [
            json!({"muxer": "ffmpeg", "container_reference": 1}),
            json!({"muxer": "bmx", "container": "mov"}),
            json!({"muxer": "omneon", "container": "mp4"}),
        ] {
            let err = TranscodeAction::from_params(&params(bad.clone())).unwrap_err();
            assert!(matches!(err, Error::Validation(_)), "{bad}: {err}");
        }

        let err = TranscodeAction::from_params(&params(json!({"container": "flv"}))).unwrap_err();
        assert!(matches!(err, Error::ArgumentBuild { .. }), "{err}");
    }

    #[test]
    fn unbuilt_filters_are_rejected() {
        for bad in [
            json!({"audio_min_streams": 4}),
            json!({"video_resolution": "1920x1080"}),
            json!({"video_letterbox": 1}),
            json!({"video_burn": true, "video_burn_text": "PREVIEW"}),
        ] {
            let err = TranscodeAction::from_params(&params(bad.clone())).unwrap_err();
            assert!(matches!(err, Error::Validation(ref m) if m.contains("not supported")), "{bad}: {err}");
        }
        let err = TranscodeAction::mpeg2(&params(json!({"letterbox": 1}))).unwrap_err();
        assert!(err.to_string().contains("video_letterbox"));

        // Default values are accepted.
        TranscodeAction::from_params(&params(json!({
            "video_resolution": "default",
            "video_letterbox": 0,
            "video_burn": "0",
            "audio_min_streams": null
        })))
        .unwrap();
    }

    #[test]
    fn mapping_sets_audio_layout_and_hinting_is_limited() {
        let d10 = TranscodeAction::from_params(&params(json!({"container_mapping": "d10"}))).unwrap();
        assert_eq!(d10.options().audio.channels_per_stream, 8);

        let rdd9 = TranscodeAction::from_params(&params(json!({
            "video_codec": "xdcamhd", "container_mapping": "rdd9"
        })))
        .unwrap();
        assert_eq!(rdd9.options().audio.channels_per_stream, 1);

        let mxf = TranscodeAction::from_params(&params(json!({"container_hinting": 1}))).unwrap();
        assert!(!mxf.options().hinting);
        let omneon = TranscodeAction::from_params(&params(json!({
            "container": "mov", "muxer": "omneon", "container_hinting": 1
        })))
        .unwrap();
        assert!(!omneon.options().hinting);
    }

    #[test]
    fn aspect_ratio_resolution() {
        let sd = info(json!({"format": {}, "streams": [
            {"codec_type": "video", "width": 720, "height": 576, "display_aspect_ratio": "4:3"}
        ]}));
        let wide = info(json!({"format": {}, "streams": [
            {"codec_type": "video", "width": 720, "height": 576, "display_aspect_ratio": "15:8"}
        ]}));
        let hd = info(json!({"format": {}, "streams": [
            {"codec_type": "video", "width": 1920, "height": 1080, "display_aspect_ratio": "4:3"}
        ]}));
        assert_eq!(AspectRatio::Default.resolve(&sd), "4:3");
        assert_eq!(AspectRatio::Default.resolve(&wide), "16:9");
        assert_eq!(AspectRatio::Default.resolve(&hd), "16:9");
        assert_eq!(AspectRatio::Auto.resolve(&wide), "4:3");
        assert_eq!(AspectRatio::Copy.resolve(&wide), "15:8");
        assert_eq!(AspectRatio::from("2.35").resolve(&sd), "2.35");
    }

    #[test]
    fn ffmpeg_mux_with_faststart() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = resources();
        let mut action = TranscodeAction::from_params(&params(json!({
            "container": "mov", "container_hinting": true, "encoding_threads": 4
        })))
        .unwrap();
        let workers = setup(&mut action, dir.path(), &mut resources);

        assert_eq!(workers.len(), 2);
        let args = workers[0].args(dir.path()).unwrap();
        assert!(args.windows(2).any(|w| w == ["-vtag", "mx5p"]));
        assert!(args.windows(2).any(|w| w == ["-aspect", "4:3"]));
        assert!(args.windows(2).any(|w| w == ["-timecode", "10:00:00:00"]));
        assert!(args.windows(2).any(|w| w == ["-acodec", "pcm_s24le"]));
        assert!(args.windows(2).any(|w| w == ["-threads", "4"]));
        assert_eq!(args.last().unwrap(), &dir.path().join("clip.mov").display().to_string());

        assert_eq!(workers[1].name(), hinting::QT_FASTSTART_NAME);
        assert_eq!(
            resources.path(Section::Outputs, "1").unwrap(),
            dir.path().join("clip-hint.mov")
        );
        assert!(!dir.path().join(DEFAULT_ESSENCE_DIR).exists());
    }

    #[test]
    fn flv_hinting_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = resources();
        let mut action = TranscodeAction::from_params(&params(json!({
            "video_codec": "h264", "audio_codec": "aac",
            "container": "flv", "container_hinting": true
        })))
        .unwrap();
        let workers = setup(&mut action, dir.path(), &mut resources);

        let flv = dir.path().join("clip.flv");
        assert_eq!(
            workers[1].args(dir.path()).unwrap(),
            ["-U".to_string(), flv.display().to_string()]
        );
        assert_eq!(resources.path(Section::Outputs, "1").unwrap(), flv);
    }

    #[test]
    fn omneon_reference_publishes_essences() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = resources();
        let mut action = TranscodeAction::from_params(&params(json!({
            "muxer": "omneon", "container_reference": true, "container_essence_dir": "/media.dir/"
        })))
        .unwrap();
        let workers = setup(&mut action, dir.path(), &mut resources);

        assert_eq!(workers.len(), 3);
        let essence_dir = dir.path().join("media.dir");
        assert!(!essence_dir.exists());
        assert_eq!(workers[0].outputs().len(), 3);
        assert_eq!(workers[1].name(), omneon::COPY_NAME);
        assert!(workers[1].args(dir.path()).unwrap().contains(&"-ref".to_string()));

        let query = workers[2].args(dir.path()).unwrap();
        assert!(query.windows(2).any(|w| w == ["-tc", "10:00:00.00"]));

        let outputs = resources.get_all(Section::Outputs);
        assert_eq!(outputs.len(), 4);
        assert_eq!(
            resources.path(Section::Outputs, "1").unwrap(),
            dir.path().join("clip.mxf")
        );
        assert_eq!(
            resources.path(Section::Outputs, "2").unwrap(),
            essence_dir.join("clip_v1.m2v")
        );
    }

    #[test]
    fn bmx_wraps_demuxed_essences() {
        let dir = tempfile::tempdir().unwrap();
        let mut resources = resources();
        let mut action = TranscodeAction::from_params(&params(json!({
            "muxer": "bmx", "container_mapping": "d10"
        })))
        .unwrap();
        let workers = setup(&mut action, dir.path(), &mut resources);

        assert_eq!(workers.len(), 2);
        let args = workers[1].args(dir.path()).unwrap();
        assert_eq!(&args[..4], ["-t", "d10", "-y", "10:00:00:00"]);
        assert!(args.contains(&"--d10".to_string()));
        assert_eq!(args.iter().filter(|a| *a == "--wave").count(), 2);
        assert_eq!(
            resources.path(Section::Outputs, "1").unwrap(),
            dir.path().join("clip.mxf")
        );
    }

    #[test]
    fn mpeg2_preset() {
        let action = TranscodeAction::mpeg2(&params(json!({
            "bitrate": 40000, "container": "mov"
        })))
        .unwrap();
        assert_eq!(action.name(), "mpeg2_transcode");
        let opts = action.options();
        assert_eq!(opts.video.codec, VideoCodec::Imx);
        assert_eq!(opts.video.bitrate, 40000);
        assert_eq!(opts.container, Container::Mov);
        assert_eq!(opts.aspect_ratio, AspectRatio::Auto);
        assert_eq!(opts.audio_format.as_deref(), Some("s16le"));
        assert_eq!(opts.audio.sample_rate, 48000);
    }
}
