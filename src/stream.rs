//! Stream identity
//!
//! Every elementary track produced by a build gets a [`StreamRef`] exactly
//! once, when the encoder plan is built. Its global id and per-type local id
//! name the files and the ffmpeg stream specifiers used everywhere else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::{HlsError, Result};
use crate::probe::ProbeStream;

/// Kind of elementary track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    /// Map an ffprobe `codec_type`
    pub fn from_codec_type(codec_type: &str) -> Option<Self> {
        match codec_type {
            "video" => Some(StreamKind::Video),
            "audio" => Some(StreamKind::Audio),
            "subtitle" => Some(StreamKind::Subtitle),
            _ => None,
        }
    }

    /// ffmpeg stream specifier letter
    pub fn letter(&self) -> char {
        match self {
            StreamKind::Video => 'v',
            StreamKind::Audio => 'a',
            StreamKind::Subtitle => 's',
        }
    }

    /// shaka-packager stream selector
    pub fn packager_name(&self) -> &'static str {
        match self {
            StreamKind::Video => "video",
            StreamKind::Audio => "audio",
            StreamKind::Subtitle => "text",
        }
    }
}

/// One track being produced
#[derive(Debug, Clone)]
pub struct StreamRef {
    /// Global index in creation order
    pub id: usize,
    /// Index among streams of the same kind
    pub local_id: usize,
    pub kind: StreamKind,
    /// Probed metadata of the source track
    pub source: Arc<ProbeStream>,
}

impl StreamRef {
    /// Track identifier such as `v:0` or `a:1`
    pub fn track_id(&self) -> String {
        format!("{}:{}", self.kind.letter(), self.local_id)
    }

    /// Per-track media file (`stream_<id>.mp4`)
    pub fn media_filename(&self) -> String {
        format!("stream_{}.mp4", self.id)
    }

    /// Extracted WebVTT file (`stream_<id>.vtt`)
    pub fn subtitle_filename(&self) -> String {
        format!("stream_{}.vtt", self.id)
    }

    /// Playlist written for this track by the encoder or packager
    pub fn playlist_filename(&self) -> String {
        format!("stream_{}.m3u8", self.id)
    }

    /// Single-segment playlist synthesised for a subtitle track
    pub fn subtitle_playlist_filename(&self) -> String {
        format!("stream_{}_sub.m3u8", self.id)
    }
}

impl fmt::Display for StreamRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.track_id())
    }
}

/// Issues stream ids for one build session
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: Vec<StreamRef>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new stream for a source track.
    ///
    /// The same source may back several streams (one per ladder rendition).
    pub fn new_stream(&mut self, source: Arc<ProbeStream>) -> Result<StreamRef> {
        let kind = source
            .kind()
            .ok_or_else(|| HlsError::UnsupportedStream(source.codec_type.clone()))?;
        let local_id = self.streams.iter().filter(|s| s.kind == kind).count();
        let stream = StreamRef {
            id: self.streams.len(),
            local_id,
            kind,
            source,
        };
        self.streams.push(stream.clone());
        Ok(stream)
    }

    /// All streams in creation order
    pub fn streams(&self) -> &[StreamRef] {
        &self.streams
    }

    pub fn of_kind(&self, kind: StreamKind) -> impl Iterator<Item = &StreamRef> {
        self.streams.iter().filter(move |s| s.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Forget every issued stream, for a fresh encode attempt
    pub fn clear(&mut self) {
        self.streams.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(codec_type: &str) -> Arc<ProbeStream> {
        Arc::new(ProbeStream {
            codec_type: codec_type.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_ids_are_global_and_local() {
        let mut reg = StreamRegistry::new();
        let video = source("video");
        let v0 = reg.new_stream(video.clone()).unwrap();
        let v1 = reg.new_stream(video).unwrap();
        let a0 = reg.new_stream(source("audio")).unwrap();
        let a1 = reg.new_stream(source("audio")).unwrap();
        let s0 = reg.new_stream(source("subtitle")).unwrap();

        assert_eq!((v0.id, v0.track_id()), (0, "v:0".to_string()));
        assert_eq!((v1.id, v1.track_id()), (1, "v:1".to_string()));
        assert_eq!((a0.id, a0.track_id()), (2, "a:0".to_string()));
        assert_eq!((a1.id, a1.track_id()), (3, "a:1".to_string()));
        assert_eq!((s0.id, s0.track_id()), (4, "s:0".to_string()));
        assert_eq!(reg.len(), 5);
        assert_eq!(reg.of_kind(StreamKind::Audio).count(), 2);
    }

    #[test]
    fn test_issued_streams_are_unchanged() {
        let mut reg = StreamRegistry::new();
        let first = reg.new_stream(source("audio")).unwrap();
        reg.new_stream(source("audio")).unwrap();
        assert_eq!(reg.streams()[0].id, first.id);
        assert_eq!(reg.streams()[0].local_id, 0);
    }

    #[test]
    fn test_filenames() {
        let mut reg = StreamRegistry::new();
        reg.new_stream(source("video")).unwrap();
        let s = reg.new_stream(source("subtitle")).unwrap();
        assert_eq!(s.media_filename(), "stream_1.mp4");
        assert_eq!(s.subtitle_filename(), "stream_1.vtt");
        assert_eq!(s.playlist_filename(), "stream_1.m3u8");
        assert_eq!(s.subtitle_playlist_filename(), "stream_1_sub.m3u8");
        assert_eq!(s.to_string(), "s:0");
        assert_eq!(s.to_string(), s.track_id());
    }

    #[test]
    fn test_unsupported_type() {
        let mut reg = StreamRegistry::new();
        let err = reg.new_stream(source("attachment")).unwrap_err();
        assert!(matches!(err, HlsError::UnsupportedStream(t) if t == "attachment"));
        assert!(reg.is_empty());
    }
}
