//! Built-in actions.

mod avinfo;
mod exec;
mod getcapability;
mod kttoolbox;
mod rewrap;
mod transcode;
mod videoparser;

pub use avinfo::AvinfoAction;
pub use exec::ExecAction;
pub use getcapability::{option_available, GetCapabilityAction};
pub use kttoolbox::KtToolboxAction;
pub use rewrap::ManzanitaRewrapAction;
pub use transcode::{AspectRatio, Muxer, TranscodeAction, TranscodeOptions};
pub use videoparser::VideoparserAction;

use std::path::Path;

use serde_json::Value;
use tb_core::{Params, Result};

/// `{"path": path}` payload of a file resource.
fn file_payload(path: &Path) -> Params {
    Params::new().with("path", path.to_string_lossy().into_owned())
}

/// File name without its extension.
fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string())
}

/// Object parameter `key`, empty when absent.
fn nested(params: &Params, key: &str) -> Result<Params> {
    Params::from_value(params.get(key).cloned().unwrap_or(Value::Null))
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixtures shared by the action tests: fake tools written as shell
    //! scripts and a registry pointing every tool name at them.

    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use tb_core::{PipelineConfig, Resources, ToolsConfig};
    use tb_worker::ToolRegistry;

    use crate::action::SetupContext;

    pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn registry(tools: &[(&str, PathBuf)]) -> Arc<ToolRegistry> {
        let mut config = ToolsConfig::default();
        for (name, path) in tools {
            config = config.with(*name, path.clone());
        }
        Arc::new(ToolRegistry::discover(&config))
    }

    pub fn config(base: &Path) -> PipelineConfig {
        PipelineConfig {
            base_dir: base.to_path_buf(),
            poll_timeout_ms: 50,
            callback_interval_ms: 0,
            kill_timeout_secs: 30,
            debug: false,
        }
    }

    pub fn context<'a>(
        dir: &'a Path,
        tools: &'a ToolRegistry,
        resources: &'a mut Resources,
    ) -> SetupContext<'a> {
        SetupContext::new(dir, tools, std::time::Duration::from_secs(30), resources)
    }

    /// Probe metadata of a 10 s PAL IMX clip with two PCM tracks.
    pub fn pal_metadata() -> tb_core::Params {
        tb_core::Params::from_value(serde_json::json!({
            "format": {
                "filename": "/media/clip.mxf",
                "duration": "10.000000",
                "tags": {"timecode": "10:00:00:00"}
            },
            "streams": [
                {
                    "index": 0, "codec_type": "video", "codec_name": "mpeg2video",
                    "width": 720, "height": 608, "r_frame_rate": "25/1",
                    "pix_fmt": "yuv422p", "display_aspect_ratio": "4:3", "nb_frames": "250"
                },
                {"index": 1, "codec_type": "audio", "codec_name": "pcm_s24le"},
                {"index": 2, "codec_type": "audio", "codec_name": "pcm_s24le"}
            ]
        }))
        .unwrap()
    }
}
