//! Tool families: argument builders and output parsers per external tool.

pub mod bmx;
pub mod exec;
pub mod ffmpeg;
pub mod ffprobe;
pub mod hinting;
pub mod kttoolbox;
pub mod manzanita;
pub mod omneon;
pub mod videoparser;

pub use bmx::Raw2BmxTool;
pub use exec::ExecTool;
pub use ffmpeg::{AudioCodec, AudioOptions, Container, FfmpegTool, MuxOptions, VideoCodec, VideoOptions};
pub use ffprobe::FfprobeTool;
pub use hinting::{Flvtool2Tool, QtFaststartTool};
pub use kttoolbox::KtToolboxTool;
pub use manzanita::{ManzanitaDemuxTool, ManzanitaMuxTool};
pub use omneon::{OmneonCopyTool, OmneonQueryTool};
pub use videoparser::VideoparserTool;
