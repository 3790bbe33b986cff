//! Pipeline integration tests
//!
//! Multi-stage actions run through the Toolbox facade against fake tools.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tb_core::{Config, Error, Params, PipelineConfig, Section, ToolsConfig};
use tb_pipeline::{PipelineState, Progress, ProgressSender, Toolbox};
use tempfile::tempdir;

const PROBE_REPORT: &str = r#"{"format": {"format_name": "mxf", "duration": "4.0",
"tags": {"timecode": "10:00:00:00"}},
"streams": [{"codec_type": "video", "codec_name": "mpeg2video", "width": 720,
"height": 576, "r_frame_rate": "25/1", "display_aspect_ratio": "16:9", "nb_frames": "100"},
{"codec_type": "audio", "codec_name": "pcm_s16le"}]}"#;

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn toolbox(dir: &Path) -> Toolbox {
    let tools = ToolsConfig::default()
        .with(
            "ffprobe",
            script(dir, "ffprobe", &format!("cat <<'EOF'\n{PROBE_REPORT}\nEOF")),
        )
        .with(
            "ffmpeg",
            script(
                dir,
                "ffmpeg",
                "echo 'frame=   50 fps=25' >&2; sleep 0.2; echo 'frame=  100 fps=25' >&2",
            ),
        )
        .with(
            "ommcp",
            script(dir, "ommcp", "echo progress=40; sleep 0.2; echo progress=100"),
        )
        .with("ommq", script(dir, "ommq", "exit 0"));
    Toolbox::new(Config {
        tools,
        pipeline: PipelineConfig {
            base_dir: dir.join("jobs"),
            poll_timeout_ms: 20,
            callback_interval_ms: 0,
            ..PipelineConfig::default()
        },
    })
}

fn recorder() -> (ProgressSender, Arc<Mutex<Vec<Progress>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let sender = ProgressSender::new(move |p| sink.lock().unwrap().push(p.clone()));
    (sender, seen)
}

// ---------------------------------------------------------------------------
// Multi-stage runs
// ---------------------------------------------------------------------------

#[tokio::test]
async fn omneon_transcode_runs_three_stages() {
    let dir = tempdir().unwrap();
    let toolbox = toolbox(dir.path());
    let params = Params::new().with("muxer", "omneon").with("container", "mov");
    let mut pipeline = toolbox.pipeline("transcode", Some("omn"), &params).unwrap();
    pipeline.add_input(dir.path().join("clip.mxf")).unwrap();

    let (sender, seen) = recorder();
    toolbox.run(&mut pipeline, &sender).await.unwrap();
    assert_eq!(pipeline.state(), PipelineState::Completed);

    let names: Vec<&str> = pipeline.workers().iter().map(|w| w.name()).collect();
    assert_eq!(names, ["ffmpeg", "ommcp", "ommq"]);
    assert_eq!(
        pipeline.get_resource(Section::Outputs, "1").unwrap().path("path").unwrap(),
        dir.path().join("jobs/job-omn/clip.mov")
    );

    let seen = seen.lock().unwrap();
    assert!(seen.windows(2).all(|w| w[0].overall <= w[1].overall));
    let last = seen.last().unwrap();
    assert_eq!(last.overall, 100);
    assert_eq!(last.stages, 3);
    assert!(seen.iter().any(|p| p.tool == "ommcp"));
}

#[tokio::test]
async fn cancellation_stops_running_stage() {
    let dir = tempdir().unwrap();
    let toolbox = toolbox(dir.path());
    let params = Params::new().with("command", "sleep").with("args", "30");
    let mut pipeline = toolbox.pipeline("exec", Some("slow"), &params).unwrap();

    let token = pipeline.cancel_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    let started = std::time::Instant::now();
    let err = toolbox
        .run(&mut pipeline, &ProgressSender::noop())
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(pipeline.state(), PipelineState::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(10));

    pipeline.clean();
    assert!(!dir.path().join("jobs/job-slow").exists());
}

#[tokio::test]
async fn failing_stage_reports_tool_error() {
    let dir = tempdir().unwrap();
    let toolbox = toolbox(dir.path());
    let params = Params::new()
        .with("command", "sh")
        .with("args", serde_json::json!(["-c", "echo 'fatal: disk full' >&2; exit 2"]));
    let mut pipeline = toolbox.pipeline("exec", Some("bad"), &params).unwrap();

    let err = toolbox
        .run(&mut pipeline, &ProgressSender::noop())
        .await
        .unwrap_err();
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(matches!(err.root(), Error::NonZeroExit { code: 2, .. }));
    assert_eq!(err.tail(), Some("fatal: disk full"));
    assert_eq!(err.tool(), Some("sh"));
}
