//! External tool path resolution.
//!
//! The [`ToolRegistry`] maps logical tool names (`ffmpeg`, `mp2tsms`,
//! `kt-toolbox`...) to the executables that workers spawn. It is built once
//! from [`tb_core::ToolsConfig`] and shared read-only between pipelines.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use tb_core::ToolsConfig;

/// Logical tool names the registry always knows about, with the executable
/// name used when nothing is configured.
pub const KNOWN_TOOLS: &[(&str, &str)] = &[
    ("ffmpeg", "ffmpeg"),
    ("ffprobe", "ffprobe"),
    ("mp2tsms", "mp2tsms"),
    ("kt-toolbox", "kt-toolbox"),
    ("ommcp", "ommcp"),
    ("ommq", "ommq"),
    ("qt-faststart", "qt-faststart"),
    ("flvtool2", "flvtool2"),
    ("raw2bmx", "raw2bmx"),
    ("videoparser", "videoparser"),
];

/// How a tool path was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolSource {
    /// Taken from the configuration.
    Configured,
    /// Default name found on `PATH`.
    Path,
    /// Default name, not found anywhere; spawning it will fail.
    Fallback,
}

/// A resolved tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEntry {
    pub name: String,
    pub path: PathBuf,
    pub source: ToolSource,
}

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of the tool's version output, if available.
    pub version: Option<String>,
    pub path: PathBuf,
}

/// Registry holding resolved tool paths.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolEntry>,
}

impl ToolRegistry {
    /// Resolve every known tool plus any extra name present in the
    /// configuration.
    ///
    /// A configured path is used as-is. Otherwise the default name is
    /// looked up on `PATH` with [`which::which`]; when that fails the bare
    /// default name is kept and a warning is logged.
    pub fn discover(tools_config: &ToolsConfig) -> Self {
        let mut tools = BTreeMap::new();

        for &(name, default) in KNOWN_TOOLS {
            tools.insert(name.to_string(), resolve_one(name, default, tools_config));
        }
        for name in tools_config.paths.keys() {
            if !tools.contains_key(name) {
                tools.insert(name.clone(), resolve_one(name, name, tools_config));
            }
        }

        Self { tools }
    }

    /// Executable for `name`. Unknown names resolve to themselves.
    pub fn resolve(&self, name: &str) -> PathBuf {
        self.tools
            .get(name)
            .map(|t| t.path.clone())
            .unwrap_or_else(|| PathBuf::from(name))
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.tools.get(name)
    }

    /// Iterate over all registered tools in name order.
    pub fn iter(&self) -> impl Iterator<Item = &ToolEntry> {
        self.tools.values()
    }

    /// Check every registered tool and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        self.tools
            .values()
            .map(|entry| {
                let available = match entry.source {
                    ToolSource::Configured => entry.path.exists(),
                    ToolSource::Path => true,
                    ToolSource::Fallback => false,
                };
                let version = if available {
                    detect_version(&entry.name, &entry.path)
                } else {
                    None
                };
                ToolInfo {
                    name: entry.name.clone(),
                    available,
                    version,
                    path: entry.path.clone(),
                }
            })
            .collect()
    }
}

fn resolve_one(name: &str, default: &str, tools_config: &ToolsConfig) -> ToolEntry {
    if let Some(path) = tools_config.path(name).filter(|p| !p.as_os_str().is_empty()) {
        if !path.exists() {
            tracing::warn!("Configured path for {name} does not exist: {}", path.display());
        }
        return ToolEntry {
            name: name.to_string(),
            path: path.to_path_buf(),
            source: ToolSource::Configured,
        };
    }

    match which::which(default) {
        Ok(path) => ToolEntry {
            name: name.to_string(),
            path,
            source: ToolSource::Path,
        },
        Err(_) => {
            tracing::warn!("{name} not configured and not found on PATH; using '{default}'");
            ToolEntry {
                name: name.to_string(),
                path: PathBuf::from(default),
                source: ToolSource::Fallback,
            }
        }
    }
}

/// Run the tool's version flag and return the first non-empty output line.
fn detect_version(name: &str, path: &Path) -> Option<String> {
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        "qt-faststart" | "flvtool2" | "ommcp" | "ommq" | "mp2tsms" => return None,
        _ => "--version",
    };

    let output = std::process::Command::new(path)
        .arg(version_arg)
        .stdin(std::process::Stdio::null())
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(String::from)
}
