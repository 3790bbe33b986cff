//! Supervised execution of external media tools.
//!
//! [`ProcessRunner`] owns one child process and its output pipes,
//! [`Worker`] turns a [`Tool`] description into a running invocation, and
//! [`workers`] holds the argument builders of every supported tool.

pub mod progress;
pub mod runner;
pub mod tools;
pub mod worker;
pub mod workers;

pub use progress::ProgressMarker;
pub use runner::{PollStatus, ProcessRunner};
pub use tools::{ToolEntry, ToolInfo, ToolRegistry, ToolSource, KNOWN_TOOLS};
pub use worker::{error_tail, FileSpec, Options, Tool, Worker, DEFAULT_KILL_TIMEOUT};
