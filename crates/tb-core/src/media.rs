//! Media information derived from probe metadata.
//!
//! [`AvInfo`] reads the `format`/`streams` layout produced by the ffprobe
//! worker and answers the questions the transcoding actions ask: resolution
//! class, frame rate, aspect ratio, start timecode and PCM sample format.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use crate::error::Result;
use crate::{Error, Params};

pub const RES_SD_PAL: &str = "720x576";
pub const RES_SD_PAL_VBI: &str = "720x608";
pub const RES_SD_NTSC: &str = "720x480";
pub const RES_SD_NTSC_VBI: &str = "720x512";

/// Summary of a probed media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvInfo {
    /// `WIDTHxHEIGHT` of the first video stream.
    pub video_res: Option<String>,
    pub video_has_vbi: bool,
    /// Frame rate rounded to two decimals; 0 without video.
    pub video_fps: f64,
    pub pix_fmt: Option<String>,
    /// Display aspect ratio, `16:9` unless the stream says otherwise.
    pub video_dar: String,
    pub timecode: String,
    /// PCM sample format of the first audio stream (`s16le`, `s24le`...).
    pub audio_format: Option<String>,
    pub video_streams: Vec<Value>,
    pub audio_streams: Vec<Value>,
    pub data_streams: Vec<Value>,
    pub format: Value,
}

impl AvInfo {
    /// Build from metadata holding `format` and `streams` keys.
    pub fn from_metadata(metadata: &Params) -> Result<Self> {
        let format = metadata
            .get("format")
            .cloned()
            .ok_or_else(|| Error::validation("media metadata has no 'format' section"))?;
        let streams = metadata
            .get("streams")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut video_streams = Vec::new();
        let mut audio_streams = Vec::new();
        let mut data_streams = Vec::new();
        for stream in streams {
            match stream.get("codec_type").and_then(Value::as_str) {
                Some("video") => video_streams.push(stream),
                Some("audio") => audio_streams.push(stream),
                _ => data_streams.push(stream),
            }
        }

        let video = video_streams.first();

        let video_res = video.and_then(|v| {
            let w = v.get("width")?.as_u64()?;
            let h = v.get("height")?.as_u64()?;
            Some(format!("{w}x{h}"))
        });
        let video_has_vbi = matches!(
            video_res.as_deref(),
            Some(RES_SD_PAL_VBI) | Some(RES_SD_NTSC_VBI)
        );

        let video_fps = video
            .and_then(|v| v.get("r_frame_rate"))
            .and_then(Value::as_str)
            .and_then(parse_rate)
            .unwrap_or(0.0);

        let pix_fmt = video
            .and_then(|v| v.get("pix_fmt"))
            .and_then(Value::as_str)
            .map(String::from);

        let video_dar = video
            .and_then(|v| v.get("display_aspect_ratio"))
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| "16:9".into());

        let timecode = find_timecode(&format, video, &data_streams)
            .unwrap_or_else(|| "00:00:00:00".into());

        let audio_format = audio_streams
            .first()
            .and_then(|a| a.get("codec_name"))
            .and_then(Value::as_str)
            .and_then(|name| name.strip_prefix("pcm_"))
            .map(String::from);

        Ok(Self {
            video_res,
            video_has_vbi,
            video_fps,
            pix_fmt,
            video_dar,
            timecode,
            audio_format,
            video_streams,
            audio_streams,
            data_streams,
            format,
        })
    }

    pub fn has_video(&self) -> bool {
        !self.video_streams.is_empty()
    }

    pub fn is_sd_pal(&self) -> bool {
        matches!(self.video_res.as_deref(), Some(RES_SD_PAL) | Some(RES_SD_PAL_VBI))
    }

    pub fn is_sd_ntsc(&self) -> bool {
        matches!(self.video_res.as_deref(), Some(RES_SD_NTSC) | Some(RES_SD_NTSC_VBI))
    }

    /// Anything of at least 1280x1080 pixels counts as HD.
    pub fn is_hd(&self) -> bool {
        self.dimensions()
            .map(|(w, h)| w * h >= 1280 * 1080)
            .unwrap_or(false)
    }

    pub fn is_sd(&self) -> bool {
        self.has_video() && !self.is_hd()
    }

    pub fn dimensions(&self) -> Option<(u64, u64)> {
        let (w, h) = self.video_res.as_deref()?.split_once('x')?;
        Some((w.parse().ok()?, h.parse().ok()?))
    }

    /// Display aspect ratio as a float, if it parses.
    pub fn dar_value(&self) -> Option<f64> {
        let (num, den) = self.video_dar.split_once(':')?;
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        (den != 0.0).then(|| num / den)
    }

    /// Frame count of the first video stream: the declared `nb_frames`, or
    /// the counted `nb_read_frames`, or duration times frame rate.
    pub fn nb_frames(&self) -> Option<u64> {
        let video = self.video_streams.first()?;
        for key in ["nb_frames", "nb_read_frames"] {
            if let Some(n) = video.get(key).and_then(value_u64).filter(|n| *n > 0) {
                return Some(n);
            }
        }
        let duration = video
            .get("duration")
            .or_else(|| self.format.get("duration"))
            .and_then(value_f64)?;
        let frames = (duration * self.video_fps).round();
        (frames > 0.0).then_some(frames as u64)
    }

    pub fn nb_audio_streams(&self) -> usize {
        self.audio_streams.len()
    }
}

impl fmt::Display for AvInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AvInfo (video_res={}, video_has_vbi={}, timecode={})",
            self.video_res.as_deref().unwrap_or("none"),
            self.video_has_vbi,
            self.timecode
        )
    }
}

fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = rate.split_once('/')?;
    let num: f64 = num.trim().parse().ok()?;
    let den: f64 = den.trim().parse().ok()?;
    if den == 0.0 {
        return None;
    }
    Some((num / den * 100.0).round() / 100.0)
}

fn value_u64(v: &Value) -> Option<u64> {
    v.as_u64().or_else(|| v.as_str()?.parse().ok())
}

fn value_f64(v: &Value) -> Option<f64> {
    v.as_f64().or_else(|| v.as_str()?.parse().ok())
}

fn tag<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get("tags")?.get(key)?.as_str()
}

fn find_timecode(format: &Value, video: Option<&Value>, data: &[Value]) -> Option<String> {
    if let Some(tc) = tag(format, "timecode").or_else(|| tag(format, "timecode_at_mark_in")) {
        return Some(tc.to_string());
    }
    if let Some(v) = video {
        if let Some(tc) = v
            .get("timecode")
            .and_then(Value::as_str)
            .or_else(|| tag(v, "timecode"))
        {
            return Some(tc.to_string());
        }
    }
    data.iter().find_map(|s| tag(s, "timecode")).map(String::from)
}

// ---------------------------------------------------------------------------
// Timecode
// ---------------------------------------------------------------------------

/// SMPTE timecode `hh:mm:ss:ff`, or `hh:mm:ss;ff` for drop frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub drop_frame: bool,
}

impl Timecode {
    /// `hh:mm:ss.ff`, the notation of the Omneon query tool.
    pub fn dotted(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}.{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

impl FromStr for Timecode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::validation(format!("timecode must be like hh:mm:ss[:|;]ff, got '{s}'"));
        let b = s.as_bytes();
        if b.len() < 11 || b[2] != b':' || b[5] != b':' || !matches!(b[8], b':' | b';') {
            return Err(invalid());
        }
        let field = |range: std::ops::Range<usize>| -> Result<u8> {
            let part = s.get(range).ok_or_else(invalid)?;
            if !part.bytes().all(|c| c.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };
        Ok(Self {
            hours: field(0..2)?,
            minutes: field(3..5)?,
            seconds: field(6..8)?,
            frames: field(9..11)?,
            drop_frame: b[8] == b';',
        })
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sep = if self.drop_frame { ';' } else { ':' };
        write!(
            f,
            "{:02}:{:02}:{:02}{sep}{:02}",
            self.hours, self.minutes, self.seconds, self.frames
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn metadata(value: Value) -> Params {
        Params::from_value(value).unwrap()
    }

    fn pal_sd() -> Params {
        metadata(json!({
            "format": {"duration": "4.0", "tags": {"timecode": "10:00:00:00"}},
            "streams": [
                {"codec_type": "video", "width": 720, "height": 608,
                 "r_frame_rate": "25/1", "pix_fmt": "yuv422p",
                 "display_aspect_ratio": "4:3", "nb_frames": "100"},
                {"codec_type": "audio", "codec_name": "pcm_s24le"},
                {"codec_type": "data", "tags": {"timecode": "01:00:00:00"}}
            ]
        }))
    }

    #[test]
    fn pal_with_vbi() {
        let info = AvInfo::from_metadata(&pal_sd()).unwrap();
        assert_eq!(info.video_res.as_deref(), Some("720x608"));
        assert!(info.video_has_vbi);
        assert!(info.is_sd_pal());
        assert!(!info.is_sd_ntsc());
        assert!(info.is_sd());
        assert!(!info.is_hd());
        assert_eq!(info.video_fps, 25.0);
        assert_eq!(info.pix_fmt.as_deref(), Some("yuv422p"));
        assert_eq!(info.video_dar, "4:3");
        assert_eq!(info.timecode, "10:00:00:00");
        assert_eq!(info.audio_format.as_deref(), Some("s24le"));
        assert_eq!(info.nb_frames(), Some(100));
        assert_eq!(info.data_streams.len(), 1);
    }

    #[test]
    fn ntsc_fps_rounds() {
        let info = AvInfo::from_metadata(&metadata(json!({
            "format": {},
            "streams": [{"codec_type": "video", "width": 720, "height": 480,
                         "r_frame_rate": "30000/1001"}]
        })))
        .unwrap();
        assert_eq!(info.video_fps, 29.97);
        assert!(info.is_sd_ntsc());
        assert!(!info.video_has_vbi);
        assert_eq!(info.video_dar, "16:9");
    }

    #[test]
    fn hd_threshold() {
        let info = AvInfo::from_metadata(&metadata(json!({
            "format": {},
            "streams": [{"codec_type": "video", "width": 1280, "height": 1080,
                         "r_frame_rate": "25/1"}]
        })))
        .unwrap();
        assert!(info.is_hd());
        assert!(!info.is_sd());
    }

    #[test]
    fn timecode_lookup_order() {
        let mark_in = AvInfo::from_metadata(&metadata(json!({
            "format": {"tags": {"timecode_at_mark_in": "09:59:50:00"}},
            "streams": [{"codec_type": "video", "timecode": "00:00:01:00"}]
        })))
        .unwrap();
        assert_eq!(mark_in.timecode, "09:59:50:00");

        let from_video = AvInfo::from_metadata(&metadata(json!({
            "format": {},
            "streams": [{"codec_type": "video", "timecode": "00:00:01:00"}]
        })))
        .unwrap();
        assert_eq!(from_video.timecode, "00:00:01:00");

        let from_data = AvInfo::from_metadata(&metadata(json!({
            "format": {},
            "streams": [{"codec_type": "data", "tags": {"timecode": "02:00:00;00"}}]
        })))
        .unwrap();
        assert_eq!(from_data.timecode, "02:00:00;00");

        let none = AvInfo::from_metadata(&metadata(json!({"format": {}, "streams": []}))).unwrap();
        assert_eq!(none.timecode, "00:00:00:00");
    }

    #[test]
    fn audio_only() {
        let info = AvInfo::from_metadata(&metadata(json!({
            "format": {"duration": "3.0"},
            "streams": [{"codec_type": "audio", "codec_name": "mp2"}]
        })))
        .unwrap();
        assert!(!info.has_video());
        assert!(!info.is_hd());
        assert!(!info.is_sd());
        assert_eq!(info.audio_format, None);
        assert_eq!(info.video_fps, 0.0);
        assert_eq!(info.nb_frames(), None);
    }

    #[test]
    fn nb_frames_from_duration() {
        let info = AvInfo::from_metadata(&metadata(json!({
            "format": {"duration": "4.8"},
            "streams": [{"codec_type": "video", "r_frame_rate": "25/1"}]
        })))
        .unwrap();
        assert_eq!(info.nb_frames(), Some(120));
    }

    #[test]
    fn missing_format_is_error() {
        assert!(AvInfo::from_metadata(&Params::new()).is_err());
    }

    #[test]
    fn dar_value() {
        let info = AvInfo::from_metadata(&pal_sd()).unwrap();
        let dar = info.dar_value().unwrap();
        assert!((dar - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn timecode_parse() {
        let tc: Timecode = "10:00:00:12".parse().unwrap();
        assert_eq!((tc.hours, tc.minutes, tc.seconds, tc.frames), (10, 0, 0, 12));
        assert!(!tc.drop_frame);
        assert_eq!(tc.dotted(), "10:00:00.12");
        assert_eq!(tc.to_string(), "10:00:00:12");

        let df: Timecode = "01:02:03;04".parse().unwrap();
        assert!(df.drop_frame);
        assert_eq!(df.to_string(), "01:02:03;04");
    }

    #[test]
    fn timecode_rejects_garbage() {
        for bad in ["", "10:00:00", "10-00-00-00", "aa:bb:cc:dd", "10:00:00.12"] {
            assert!(bad.parse::<Timecode>().is_err(), "{bad} should not parse");
        }
    }
}
