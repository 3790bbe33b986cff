//! # tb-pipeline
//!
//! Multi-stage execution of external tools.
//!
//! This crate provides:
//!
//! - **[`Action`]** trait -- a workflow that turns parameters and resources
//!   into an ordered list of [`Worker`](tb_worker::Worker) stages and
//!   publishes their results.
//! - **[`Pipeline`]** -- runs the stages of one action strictly in order,
//!   aggregates progress, honours cancellation and maps stage failure to a
//!   pipeline error.
//! - **Built-in actions** ([`actions`]) -- avinfo, transcode, rewrap,
//!   subtitle and essence extraction, capability probing, exec.
//! - **[`registry`]** -- the static table of action names.
//! - **[`Toolbox`]** -- facade owning configuration and tool paths.

pub mod action;
pub mod actions;
pub mod context;
pub mod pipeline;
pub mod registry;
pub mod toolbox;

pub use action::{Action, SetupContext};
pub use context::{Progress, ProgressSender};
pub use pipeline::{Pipeline, PipelineState};
pub use registry::{create_action, lookup, ActionSpec, ACTIONS};
pub use toolbox::Toolbox;
