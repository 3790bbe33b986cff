//! Progress markers printed by the supported tools.
//!
//! Parsers look at the recent tail of the accumulated output only; the last
//! marker in that window wins.

use std::sync::LazyLock;

use regex::Regex;

/// Bytes of accumulated output inspected for progress markers.
pub const TAIL_WINDOW: usize = 4096;

static FRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"frame=\s*(\d+)").expect("frame pattern"));
static PERCENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Progress: (\d+)%").expect("percent pattern"));
static STRUCTURED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"progress=(\d+)").expect("structured pattern"));

/// Supported marker styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMarker {
    /// `frame=N` on stderr against an expected frame count (ffmpeg).
    Frames { total: u64 },
    /// `Progress: N%` on stdout (kt-toolbox).
    Percent,
    /// `progress=N` on stdout (ommcp).
    Structured,
}

impl ProgressMarker {
    pub fn parse(&self, stdout_tail: &str, stderr_tail: &str) -> Option<u8> {
        match *self {
            ProgressMarker::Frames { total } => frame_progress(stderr_tail, total),
            ProgressMarker::Percent => percent_progress(stdout_tail),
            ProgressMarker::Structured => structured_progress(stdout_tail),
        }
    }
}

/// The last `window` bytes of `s`, cut on a char boundary.
pub fn tail(s: &str, window: usize) -> &str {
    if s.len() <= window {
        return s;
    }
    let mut start = s.len() - window;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

fn last_capture(re: &Regex, text: &str) -> Option<u64> {
    re.captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Last `frame=` value.
pub fn last_frame(text: &str) -> Option<u64> {
    last_capture(&FRAME_RE, text)
}

/// Frame counter over `total`, capped at 99 while running. `None` without
/// an expected total.
pub fn frame_progress(text: &str, total: u64) -> Option<u8> {
    if total == 0 {
        return None;
    }
    let frame = last_frame(text)?;
    let pct = frame.saturating_mul(100) / total;
    Some(pct.min(99) as u8)
}

/// `Progress: N%`, capped at 99.
pub fn percent_progress(text: &str) -> Option<u8> {
    last_capture(&PERCENT_RE, text).map(|p| p.min(99) as u8)
}

/// `progress=N`, capped at 100.
pub fn structured_progress(text: &str) -> Option<u8> {
    last_capture(&STRUCTURED_RE, text).map(|p| p.min(100) as u8)
}
