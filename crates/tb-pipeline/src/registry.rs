//! Action registry: construct [`Action`] objects by name from parameter
//! maps.

use tb_core::{Error, Params, Result};

use crate::action::Action;
use crate::actions::{
    AvinfoAction, ExecAction, GetCapabilityAction, KtToolboxAction, ManzanitaRewrapAction,
    TranscodeAction, VideoparserAction,
};

/// Constructor of a boxed action from its parameters.
pub type Factory = fn(&Params) -> Result<Box<dyn Action>>;

/// One registered action.
#[derive(Debug, Clone, Copy)]
pub struct ActionSpec {
    pub name: &'static str,
    pub category: &'static str,
    /// Tools the action runs.
    pub engines: &'static [&'static str],
    pub description: &'static str,
    /// Stateless actions run without an id, directly in the base directory.
    pub stateless: bool,
    pub factory: Factory,
}

impl ActionSpec {
    pub fn create(&self, params: &Params) -> Result<Box<dyn Action>> {
        (self.factory)(params)
    }
}

pub static ACTIONS: &[ActionSpec] = &[
    ActionSpec {
        name: "avinfo_extract",
        category: "extract",
        engines: &["ffprobe", "ffmpeg"],
        description: "Media information, thumbnail and frame counts",
        stateless: false,
        factory: AvinfoAction::create,
    },
    ActionSpec {
        name: "kttoolbox_extract",
        category: "extract",
        engines: &["kt-toolbox"],
        description: "Teletext subtitle extraction to EBU STL",
        stateless: false,
        factory: KtToolboxAction::create,
    },
    ActionSpec {
        name: "videoparser_extract",
        category: "extract",
        engines: &["videoparser"],
        description: "Essence analysis with a snapshot",
        stateless: false,
        factory: VideoparserAction::create,
    },
    ActionSpec {
        name: "transcode",
        category: "transcode",
        engines: &["ffmpeg", "ommcp", "ommq", "raw2bmx", "qt-faststart", "flvtool2"],
        description: "Transcode and mux to various codecs and formats",
        stateless: false,
        factory: TranscodeAction::create,
    },
    ActionSpec {
        name: "mpeg2_transcode",
        category: "transcode",
        engines: &["ffmpeg", "ommcp", "ommq"],
        description: "Transcode to mpeg2 video and mux to various formats",
        stateless: false,
        factory: TranscodeAction::create_mpeg2,
    },
    ActionSpec {
        name: "manzanita_rewrap",
        category: "rewrap",
        engines: &["ffmpeg", "mp2tsms"],
        description: "Rewrap to MPEG transport stream with Manzanita",
        stateless: false,
        factory: ManzanitaRewrapAction::create,
    },
    ActionSpec {
        name: "getcapability",
        category: "getcapability",
        engines: &["ffmpeg", "ffprobe"],
        description: "Check whether a tool supports an option",
        stateless: true,
        factory: GetCapabilityAction::create,
    },
    ActionSpec {
        name: "exec",
        category: "exec",
        engines: &[],
        description: "Run a configured command line",
        stateless: false,
        factory: ExecAction::create,
    },
];

/// Registered action `name`.
///
/// # Errors
///
/// Returns [`Error::Validation`] for an unknown name.
pub fn lookup(name: &str) -> Result<&'static ActionSpec> {
    ACTIONS
        .iter()
        .find(|spec| spec.name == name)
        .ok_or_else(|| Error::validation(format!("unknown action '{name}'")))
}

/// Construct action `name` from `params`.
pub fn create_action(name: &str, params: &Params) -> Result<Box<dyn Action>> {
    lookup(name)?.create(params)
}
