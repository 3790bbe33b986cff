//! The [`Toolbox`] facade: configuration and tool paths shared by every
//! pipeline it builds.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use tb_core::{AvInfo, Config, Error, Params, Result, Section};
use tb_worker::ToolRegistry;

use crate::actions::{AvinfoAction, GetCapabilityAction};
use crate::context::ProgressSender;
use crate::pipeline::Pipeline;
use crate::registry;

#[derive(Debug, Clone)]
pub struct Toolbox {
    config: Arc<Config>,
    tools: Arc<ToolRegistry>,
}

impl Toolbox {
    /// Build a toolbox, discovering tool paths from `config.tools`.
    pub fn new(config: Config) -> Self {
        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        Self::with_registry(config, tools)
    }

    pub fn with_registry(config: Config, tools: Arc<ToolRegistry>) -> Self {
        Self {
            config: Arc::new(config),
            tools,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Pipeline for the registered action `action`. Stateless actions get
    /// no id and work in the base directory.
    pub fn pipeline(&self, action: &str, id: Option<&str>, params: &Params) -> Result<Pipeline> {
        let spec = registry::lookup(action)?;
        let action = spec.create(params)?;
        let id = if spec.stateless { None } else { id };
        Pipeline::new(action, id, &self.config.pipeline, Arc::clone(&self.tools))
    }

    /// Run `pipeline`, probing its first input beforehand when the action
    /// reads media information that is not present yet.
    pub async fn run(&self, pipeline: &mut Pipeline, progress: &ProgressSender) -> Result<()> {
        if pipeline.needs_media_info() && !pipeline.metadata().contains("format") {
            let input = pipeline.get_resource(Section::Inputs, "1")?.require_path("path")?;
            let id = match pipeline.id() {
                Some(id) => format!("{id}-avinfo"),
                None => probe_id(),
            };
            tracing::debug!("Probing {} for {}", input.display(), pipeline.label());
            let metadata = self
                .probe_with(&input, &id, pipeline.cancel_token())
                .await?;
            pipeline.merge_metadata(&metadata);
        }
        pipeline.run(progress).await
    }

    /// Probe metadata of `path` as produced by `avinfo_extract`.
    pub async fn probe_metadata(&self, path: &Path) -> Result<Params> {
        self.probe_with(path, &probe_id(), CancellationToken::new())
            .await
    }

    pub async fn probe(&self, path: &Path) -> Result<AvInfo> {
        AvInfo::from_metadata(&self.probe_metadata(path).await?)
    }

    async fn probe_with(&self, path: &Path, id: &str, cancel: CancellationToken) -> Result<Params> {
        let mut probe = Pipeline::new(
            Box::new(AvinfoAction::new()),
            Some(id),
            &self.config.pipeline,
            Arc::clone(&self.tools),
        )?
        .with_cancellation(cancel);
        probe.add_input(path)?;
        let result = probe.run(&ProgressSender::noop()).await;
        probe.clean();
        result?;
        Ok(probe.metadata().clone())
    }

    /// Whether `tool` (ffmpeg or ffprobe) lists `option` in its full help.
    pub async fn is_option_available(&self, tool: &str, option: &str, regex: bool) -> Result<bool> {
        let action = GetCapabilityAction::new(tool, option, regex)?;
        let mut pipeline = Pipeline::new(
            Box::new(action),
            None,
            &self.config.pipeline,
            Arc::clone(&self.tools),
        )?;
        pipeline.run(&ProgressSender::noop()).await?;
        pipeline
            .metadata()
            .bool("available")
            .ok_or_else(|| Error::validation("capability check did not report availability"))
    }
}

fn probe_id() -> String {
    format!("avinfo-{}", Utc::now().format("%Y%m%d%H%M%S%6f"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::testing;
    use crate::pipeline::PipelineState;
    use tb_core::ToolsConfig;

    const PROBE_REPORT: &str = r#"{"format": {"format_name": "mxf", "duration": "10.0",
"tags": {"timecode": "10:00:00:00"}},
"streams": [{"codec_type": "video", "codec_name": "mpeg2video", "width": 720,
"height": 608, "r_frame_rate": "25/1", "display_aspect_ratio": "4:3", "nb_frames": "250"},
{"codec_type": "audio", "codec_name": "pcm_s24le"}]}"#;

    fn toolbox(dir: &Path) -> Toolbox {
        let ffprobe = testing::script(
            dir,
            "fake-ffprobe",
            &format!("cat <<'EOF'\n{PROBE_REPORT}\nEOF"),
        );
        let ffmpeg = testing::script(
            dir,
            "fake-ffmpeg",
            "case \"$*\" in *'-h full'*) echo '-count_frames  count frames';; esac",
        );
        let base = dir.join("jobs");
        Toolbox::new(Config {
            tools: ToolsConfig::default()
                .with("ffprobe", ffprobe)
                .with("ffmpeg", ffmpeg),
            pipeline: testing::config(&base),
        })
    }

    #[test]
    fn stateless_actions_get_no_id() {
        let dir = tempfile::tempdir().unwrap();
        let toolbox = toolbox(dir.path());
        let params = Params::new().with("tool", "ffmpeg").with("option", "y");
        let pipeline = toolbox.pipeline("getcapability", Some("42"), &params).unwrap();
        assert_eq!(pipeline.id(), None);
        assert_eq!(pipeline.working_dir(), dir.path().join("jobs"));

        let pipeline = toolbox.pipeline("avinfo_extract", Some("42"), &Params::new()).unwrap();
        assert_eq!(pipeline.working_dir(), dir.path().join("jobs/job-42"));
        assert!(toolbox.pipeline("nope", None, &Params::new()).is_err());
    }

    #[tokio::test]
    async fn probe_returns_media_info() {
        let dir = tempfile::tempdir().unwrap();
        let toolbox = toolbox(dir.path());
        let info = toolbox.probe(Path::new("/media/clip.mxf")).await.unwrap();
        assert!(info.video_has_vbi);
        assert_eq!(info.timecode, "10:00:00:00");
        assert_eq!(info.audio_format.as_deref(), Some("s24le"));
        let leftovers: Vec<_> = std::fs::read_dir(dir.path().join("jobs")).unwrap().collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn run_probes_before_media_actions() {
        let dir = tempfile::tempdir().unwrap();
        let toolbox = toolbox(dir.path());
        let mut pipeline = toolbox
            .pipeline("transcode", Some("7"), &Params::new())
            .unwrap();
        pipeline.add_input("/media/clip.mxf").unwrap();
        toolbox.run(&mut pipeline, &ProgressSender::noop()).await.unwrap();

        assert_eq!(pipeline.state(), PipelineState::Completed);
        assert_eq!(pipeline.metadata().get("format").unwrap()["format_name"], "mxf");
        assert_eq!(
            pipeline.get_resource(Section::Outputs, "1").unwrap().path("path").unwrap(),
            dir.path().join("jobs/job-7/clip.mxf")
        );
        assert!(!dir.path().join("jobs/job-7-avinfo").exists());
        let encode = pipeline.workers()[0].args(pipeline.working_dir()).unwrap();
        assert!(encode.windows(2).any(|w| w == ["-aspect", "4:3"]));
    }

    #[tokio::test]
    async fn existing_metadata_skips_probe() {
        let dir = tempfile::tempdir().unwrap();
        let ffmpeg = testing::script(dir.path(), "fake-ffmpeg", "exit 0");
        let toolbox = Toolbox::new(Config {
            tools: ToolsConfig::default()
                .with("ffprobe", "/nonexistent/ffprobe")
                .with("ffmpeg", ffmpeg),
            pipeline: testing::config(&dir.path().join("jobs")),
        });

        let mut pipeline = toolbox.pipeline("transcode", Some("8"), &Params::new()).unwrap();
        pipeline.add_input("/media/clip.mxf").unwrap();
        pipeline.merge_metadata(&testing::pal_metadata());
        toolbox.run(&mut pipeline, &ProgressSender::noop()).await.unwrap();
        assert_eq!(pipeline.state(), PipelineState::Completed);
    }

    #[tokio::test]
    async fn probe_failure_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let toolbox = Toolbox::new(Config {
            tools: ToolsConfig::default().with("ffprobe", "/nonexistent/ffprobe"),
            pipeline: testing::config(&dir.path().join("jobs")),
        });
        let mut pipeline = toolbox.pipeline("manzanita_rewrap", Some("9"), &Params::new()).unwrap();
        pipeline.add_input("/media/clip.mxf").unwrap();
        let err = toolbox.run(&mut pipeline, &ProgressSender::noop()).await.unwrap_err();
        assert!(matches!(err.root(), Error::Spawn { .. }));
        assert_eq!(pipeline.state(), PipelineState::Created);
    }

    #[tokio::test]
    async fn option_availability() {
        let dir = tempfile::tempdir().unwrap();
        let toolbox = toolbox(dir.path());
        assert!(toolbox.is_option_available("ffmpeg", "count_frames", false).await.unwrap());
        assert!(!toolbox.is_option_available("ffmpeg", "count_packets", false).await.unwrap());
        assert!(toolbox.is_option_available("ffmpeg", r"count_\w+", true).await.unwrap());
        assert!(toolbox.is_option_available("mp2tsms", "dd", false).await.is_err());
    }
}
