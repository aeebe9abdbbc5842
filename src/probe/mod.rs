//! Media probing
//!
//! Shells out to `ffprobe -print_format json -show_format -show_streams
//! -show_chapters` and maps the JSON output into [`ProbeInfo`]. Only the
//! fields the ladder, the encoder driver and the master rewriter need are
//! modelled.

use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{HlsError, Result};
use crate::stream::StreamKind;
use crate::tools::Tools;

/// Subtitle codecs ffmpeg cannot convert to WebVTT
pub const UNUSABLE_SUBTITLE_CODECS: [&str; 3] = ["dvd_subtitle", "subrip", "hdmv_pgs_subtitle"];

/// Probe result for one media file
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeInfo {
    #[serde(default)]
    pub streams: Vec<Arc<ProbeStream>>,
    #[serde(default)]
    pub format: ProbeFormat,
}

/// One elementary stream as reported by ffprobe
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeStream {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub codec_name: String,
    /// "video", "audio", "subtitle", "data", ...
    #[serde(default)]
    pub codec_type: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default, deserialize_with = "number_string")]
    pub sample_rate: u32,
    #[serde(default, rename = "r_frame_rate")]
    pub frame_rate: FrameRate,
    #[serde(default, deserialize_with = "number_string")]
    pub duration: f64,
    #[serde(default, deserialize_with = "number_string")]
    pub start_time: f64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl ProbeStream {
    pub fn kind(&self) -> Option<StreamKind> {
        StreamKind::from_codec_type(&self.codec_type)
    }

    pub fn language(&self) -> Option<&str> {
        self.tags.get("language").map(String::as_str)
    }

    pub fn title(&self) -> Option<&str> {
        self.tags.get("title").map(String::as_str)
    }
}

/// Container-level information
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProbeFormat {
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub format_name: String,
    #[serde(default, deserialize_with = "number_string")]
    pub start_time: f64,
    #[serde(default, deserialize_with = "number_string")]
    pub duration: f64,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

/// Frame rate ratio, typically `25/1` or `30000/1001`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct FrameRate(pub String);

impl FrameRate {
    /// Numeric value, `None` if the ratio cannot be parsed or divides by zero
    pub fn value(&self) -> Option<f64> {
        let s = self.0.trim();
        let v = match s.split_once('/') {
            Some((a, b)) => {
                let a: u64 = a.parse().ok()?;
                let b: u64 = b.parse().ok()?;
                if b == 0 {
                    return None;
                }
                a as f64 / b as f64
            }
            None => s.parse().ok()?,
        };
        v.is_finite().then_some(v)
    }
}

impl ProbeInfo {
    /// Parse ffprobe JSON output
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// First video stream
    pub fn video(&self) -> Option<&Arc<ProbeStream>> {
        self.streams.iter().find(|s| s.kind() == Some(StreamKind::Video))
    }

    /// All streams of a kind, in file order
    pub fn streams_of(&self, kind: StreamKind) -> Vec<Arc<ProbeStream>> {
        self.streams
            .iter()
            .filter(|s| s.kind() == Some(kind))
            .cloned()
            .collect()
    }

    /// Subtitle streams that can be converted to WebVTT
    pub fn usable_subtitles(&self) -> Vec<Arc<ProbeStream>> {
        self.streams_of(StreamKind::Subtitle)
            .into_iter()
            .filter(|s| !UNUSABLE_SUBTITLE_CODECS.contains(&s.codec_name.as_str()))
            .collect()
    }
}

/// Runs ffprobe
#[derive(Debug, Clone)]
pub struct Prober {
    tools: Tools,
}

impl Prober {
    pub fn new(tools: Tools) -> Self {
        Self { tools }
    }

    /// Probe a media file
    pub async fn probe(&self, path: &Path) -> Result<ProbeInfo> {
        let mut cmd = self.tools.ffprobe();
        cmd.args([
            "-print_format",
            "json",
            "-hide_banner",
            "-loglevel",
            "warning",
            "-show_format",
            "-show_streams",
            "-show_chapters",
        ]);
        cmd.arg(path.to_string_lossy());

        let output = cmd.execute().await?;
        ProbeInfo::from_json(&output.stdout)
            .map_err(|e| HlsError::Probe(format!("{}: {}", path.display(), e)))
    }
}

/// ffprobe encodes many numbers as strings ("48000", "240.048000")
fn number_string<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: std::str::FromStr + Default,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(f64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Str(s)) => s.trim().parse().unwrap_or_default(),
        Some(Raw::Num(n)) => n.to_string().parse().unwrap_or_default(),
        None => T::default(),
    })
}
