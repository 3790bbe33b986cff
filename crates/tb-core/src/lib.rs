//! tb-core: shared types for the toolbox crates.
//!
//! Holds the unified error type, JSON configuration, open parameter maps,
//! the per-pipeline resource registry and media information derived from
//! probe metadata.

pub mod config;
pub mod error;
pub mod media;
pub mod params;
pub mod resources;

// Re-export the most commonly used items at the crate root.
pub use config::{Config, PipelineConfig, ToolsConfig};
pub use error::{Error, Result};
pub use media::{AvInfo, Timecode};
pub use params::Params;
pub use resources::{Resources, Section};
