//! MPEG transport stream rewrap: ffmpeg demuxes the source to elementary
//! streams, mp2tsms muxes them back.

use tb_core::{Params, Result, Section};
use tb_worker::workers::{
    ffmpeg, AudioCodec, AudioOptions, FfmpegTool, ManzanitaMuxTool, VideoCodec, VideoOptions,
};
use tb_worker::Worker;

use crate::action::{Action, SetupContext};

use super::{nested, stem};

pub const DEFAULT_EXTENSION: &str = ".ts";

/// Parameters: `manzanita.global` holds the `transport`, `program`,
/// `video` and `audio` overrides of the mux configuration;
/// `manzanita.stream.<video|audio>.<n>` the overrides of the n-th stream
/// of that type. Output 1 may carry an `extension`.
#[derive(Debug)]
pub struct ManzanitaRewrapAction {
    global: Params,
    streams: Params,
}

impl ManzanitaRewrapAction {
    pub fn from_params(params: &Params) -> Result<Self> {
        let manzanita = nested(params, "manzanita")?;
        Ok(Self {
            global: nested(&manzanita, "global")?,
            streams: nested(&manzanita, "stream")?,
        })
    }

    pub fn create(params: &Params) -> Result<Box<dyn Action>> {
        Ok(Box::new(Self::from_params(params)?))
    }

    fn stream_params(&self, kind: &str, n: usize) -> Result<Params> {
        let by_kind = nested(&self.streams, kind)?;
        let mut params = nested(&by_kind, &n.to_string())?;
        params.insert("type", kind);
        Ok(params)
    }
}

impl Action for ManzanitaRewrapAction {
    fn name(&self) -> &'static str {
        "manzanita_rewrap"
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

        let extension = ctx
            .resources
            .get(Section::Outputs, "1")
            .ok()
            .and_then(|p| p.string("extension"))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        let basename = stem(&input);
        let output = ctx.working_dir().join(format!("{basename}{extension}"));
        ctx.resources.update(
            Section::Outputs,
            "1",
            &Params::new().with("path", output.to_string_lossy().into_owned()),
        );

        let video = VideoOptions {
            codec: VideoCodec::Copy,
            ..VideoOptions::default()
        };
        let audio = AudioOptions {
            codec: if info.audio_format.is_some() {
                AudioCodec::Copy
            } else {
                AudioCodec::Pcm
            },
            ..AudioOptions::default()
        };
        let essences = ffmpeg::demux(ctx.working_dir(), &basename, &video, &audio, &info)?;

        let mut demux = ctx.worker(FfmpegTool::new().with_nb_frames(nb_frames));
        demux.add_input_file(&input, Params::new())?;
        for essence in &essences {
            demux.add_output_file(&essence.path, essence.params.clone())?;
        }

        let mut mux = ctx.worker(ManzanitaMuxTool::from_params(&self.global)?);
        let (mut videos, mut audios) = (0, 0);
        for essence in &essences {
            let params = match essence.params.str("type") {
                Some("video") => {
                    videos += 1;
                    self.stream_params("video", videos)?
                }
                Some("audio") => {
                    audios += 1;
                    self.stream_params("audio", audios)?
                }
                _ => continue,
            };
            mux.add_input_file(&essence.path, params)?;
        }
        mux.add_output_file(&output, Params::new())?;

        Ok(vec![demux, mux])
    }
}
