//! Unified error type for the toolbox crates.
//!
//! Worker-level failures ([`Error::Spawn`], [`Error::Timeout`],
//! [`Error::NonZeroExit`]) are wrapped exactly once into [`Error::Stage`]
//! when they cross the pipeline boundary. [`Error::root`] undoes that wrapping.

use std::fmt;
use std::time::Duration;

/// Unified error type covering all failure modes in toolbox.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The executable could not be started.
    #[error("spawn error [{tool}]: {message}")]
    Spawn {
        /// Logical tool name.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// The child produced no output for longer than its kill timeout.
    #[error("timeout [{tool}]: no output for {}s, process killed", idle.as_secs())]
    Timeout {
        tool: String,
        pid: Option<u32>,
        idle: Duration,
    },

    /// The child exited with a non-zero status.
    #[error("tool error [{tool}]: exit code {code}: {tail}")]
    NonZeroExit {
        tool: String,
        code: i32,
        /// Last non-empty stderr lines of the child.
        tail: String,
    },

    /// A resource with the same `(section, index)` already exists.
    #[error("duplicate resource: {section}/{index}")]
    DuplicateResource { section: String, index: String },

    /// The requested resource was never added.
    #[error("missing resource: {section}/{index}")]
    MissingResource { section: String, index: String },

    /// Arguments for a tool could not be assembled.
    #[error("argument error [{tool}]: {message}")]
    ArgumentBuild { tool: String, message: String },

    /// The pipeline was cancelled by the caller.
    #[error("pipeline {pipeline} cancelled")]
    Cancelled { pipeline: String },

    /// A stage failed; wraps the worker-level error.
    #[error("pipeline {pipeline} stage {stage} [{tool}]: {source}")]
    Stage {
        pipeline: String,
        stage: usize,
        tool: String,
        #[source]
        source: Box<Error>,
    },

    /// All stages succeeded but publishing the outputs failed.
    #[error("pipeline {pipeline} finalize error: {message}")]
    Finalize { pipeline: String, message: String },

    /// Parameters failed validation.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// JSON decoding failed.
    #[error("JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Convenience constructor for [`Error::Spawn`].
    pub fn spawn(tool: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Spawn {
            tool: tool.into(),
            message: message.to_string(),
        }
    }

    /// Convenience constructor for [`Error::ArgumentBuild`].
    pub fn argument(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ArgumentBuild {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Wrap a worker-level error at the pipeline boundary.
    ///
    /// Errors that are already wrapped are returned unchanged.
    pub fn stage(
        pipeline: impl Into<String>,
        stage: usize,
        tool: impl Into<String>,
        source: Error,
    ) -> Self {
        if matches!(source, Error::Stage { .. }) {
            return source;
        }
        Error::Stage {
            pipeline: pipeline.into(),
            stage,
            tool: tool.into(),
            source: Box::new(source),
        }
    }

    /// Convenience constructor for [`Error::Finalize`].
    pub fn finalize(pipeline: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::Finalize {
            pipeline: pipeline.into(),
            message: message.to_string(),
        }
    }

    /// The worker-level error behind a [`Error::Stage`] wrapper.
    pub fn root(&self) -> &Error {
        match self {
            Error::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.root(), Error::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Error::Cancelled { .. })
    }

    /// Error tail of a failed tool, if this error carries one.
    pub fn tail(&self) -> Option<&str> {
        match self.root() {
            Error::NonZeroExit { tail, .. } => Some(tail),
            _ => None,
        }
    }

    /// Name of the tool involved, if any.
    pub fn tool(&self) -> Option<&str> {
        match self {
            Error::Stage { tool, .. } => Some(tool),
            Error::Spawn { tool, .. }
            | Error::Timeout { tool, .. }
            | Error::NonZeroExit { tool, .. }
            | Error::ArgumentBuild { tool, .. } => Some(tool),
            _ => None,
        }
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
