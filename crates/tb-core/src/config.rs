//! Configuration types.
//!
//! The top-level [`Config`] is deserialized from JSON. Every section
//! defaults sensibly so a completely empty `{}` file is valid.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;
use crate::Error;

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tools: ToolsConfig,
    pub pipeline: PipelineConfig,
}

impl Config {
    /// Deserialize a `Config` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self> {
        serde_json::from_str(json_str).map_err(|e| Error::Config(format!("parse error: {e}")))
    }

    /// Load configuration from a file path, falling back to defaults if the
    /// path is `None`, missing or unparseable.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };

        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.pipeline.poll_timeout_ms == 0 {
            warnings.push("pipeline.poll_timeout_ms is 0; polls will spin".into());
        }
        if self.pipeline.callback_interval_ms == 0 {
            warnings.push(
                "pipeline.callback_interval_ms is 0; the callback runs on every poll".into(),
            );
        }
        if self.pipeline.kill_timeout_secs == 0 {
            warnings.push(
                "pipeline.kill_timeout_secs is 0; silent tools are killed on the first idle poll"
                    .into(),
            );
        }
        if self.pipeline.debug {
            warnings.push("pipeline.debug is set; working directories are never cleaned".into());
        }

        for (name, path) in &self.tools.paths {
            if path.as_os_str().is_empty() {
                warnings.push(format!("tools.{name} is empty"));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Executable path overrides, keyed by logical tool name.
///
/// ```json
/// { "tools": { "ffmpeg": "/opt/ffmpeg/bin/ffmpeg", "mp2tsms": "/usr/local/bin/mp2tsms" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolsConfig {
    pub paths: BTreeMap<String, PathBuf>,
}

impl ToolsConfig {
    /// Configured override for `name`, if any.
    pub fn path(&self, name: &str) -> Option<&Path> {
        self.paths.get(name).map(PathBuf::as_path)
    }

    /// Builder-style override.
    pub fn with(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(name.into(), path.into());
        self
    }
}

/// Pipeline execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parent of every job working directory.
    pub base_dir: PathBuf,
    /// Bounded wait of a single poll.
    pub poll_timeout_ms: u64,
    /// Minimum spacing of progress callbacks while a stage is running.
    pub callback_interval_ms: u64,
    /// Idle time after which a silent child is killed.
    pub kill_timeout_secs: u64,
    /// Keep working directories around after `clean()`.
    pub debug: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("toolbox2"),
            poll_timeout_ms: 1000,
            callback_interval_ms: 1000,
            kill_timeout_secs: 3600,
            debug: false,
        }
    }
}

impl PipelineConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn callback_interval(&self) -> Duration {
        Duration::from_millis(self.callback_interval_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_secs(self.kill_timeout_secs)
    }
}
