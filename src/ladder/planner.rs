//! Ladder planner - decides which sizes and codecs to ask the encoder for

use serde::{Deserialize, Serialize};
use std::fmt;

use super::size::{RoundingPolicy, VideoSize};

/// Sizes with either dimension above this get modern codecs
pub const MODERN_CODEC_THRESHOLD: u32 = 1280;

/// Frame rate bounds applied before computing bitrates
pub const MIN_FRAME_RATE: f64 = 10.0;
pub const MAX_FRAME_RATE: f64 = 60.0;

/// Used when the source frame rate cannot be determined
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Video codec requested for one rendition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodecChoice {
    /// Keep the source video stream as-is
    Copy,
    H264,
    Hevc,
    Av1,
}

impl CodecChoice {
    /// Bits per pixel per frame used for bitrate targets
    pub fn bits_per_pixel(&self) -> Option<f64> {
        match self {
            CodecChoice::Copy => None,
            CodecChoice::H264 => Some(0.10),
            CodecChoice::Hevc => Some(0.08),
            CodecChoice::Av1 => Some(0.07),
        }
    }
}

impl fmt::Display for CodecChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CodecChoice::Copy => "copy",
            CodecChoice::H264 => "h264",
            CodecChoice::Hevc => "hevc",
            CodecChoice::Av1 => "av1",
        };
        f.write_str(name)
    }
}

/// One rendition to produce: a size paired with a codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Variant {
    pub size: VideoSize,
    pub codec: CodecChoice,
}

impl Variant {
    pub fn new(size: VideoSize, codec: CodecChoice) -> Self {
        Self { size, codec }
    }

    /// Target bitrate in bits per second, `None` for stream copies
    pub fn bitrate(&self, frame_rate: Option<f64>) -> Option<u64> {
        let bpp = self.codec.bits_per_pixel()?;
        let rate = clamp_frame_rate(frame_rate);
        Some((self.size.width as f64 * self.size.height as f64 * rate * bpp) as u64)
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.codec, self.size)
    }
}

/// Clamp a source frame rate to the range used for bitrate estimates
pub fn clamp_frame_rate(rate: Option<f64>) -> f64 {
    match rate {
        Some(r) if r.is_finite() => r.clamp(MIN_FRAME_RATE, MAX_FRAME_RATE),
        _ => DEFAULT_FRAME_RATE,
    }
}

/// Codecs a planned size fans out into
pub fn fan_out(size: VideoSize) -> Vec<Variant> {
    if size.is_over(MODERN_CODEC_THRESHOLD) {
        vec![
            Variant::new(size, CodecChoice::Av1),
            Variant::new(size, CodecChoice::Hevc),
        ]
    } else {
        vec![Variant::new(size, CodecChoice::H264)]
    }
}

/// Planned sizes, source size first, at most `max_sizes` entries
pub fn plan_sizes(source: VideoSize, max_sizes: usize, policy: RoundingPolicy) -> Vec<VideoSize> {
    let max_sizes = max_sizes.max(1);
    let mut sizes = vec![source];
    let mut current = source;
    while sizes.len() < max_sizes {
        match current.smaller(policy) {
            Some(next) => {
                sizes.push(next);
                current = next;
            }
            None => break,
        }
    }
    sizes
}

/// Complete ladder for one source video track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LadderPlan {
    pub source: VideoSize,
    pub sizes: Vec<VideoSize>,
    pub variants: Vec<Variant>,
}

impl LadderPlan {
    /// Variants planned for a given size, in fan-out order
    pub fn variants_for(&self, size: VideoSize) -> impl Iterator<Item = &Variant> {
        self.variants.iter().filter(move |v| v.size == size)
    }
}

/// Plan the whole ladder.
///
/// With `copy_source` the source rung is a single stream copy instead of a
/// codec fan-out.
pub fn plan_ladder(
    source: VideoSize,
    max_sizes: usize,
    policy: RoundingPolicy,
    copy_source: bool,
) -> LadderPlan {
    let sizes = plan_sizes(source, max_sizes, policy);
    let mut variants = Vec::new();
    for (n, &size) in sizes.iter().enumerate() {
        if n == 0 && copy_source {
            variants.push(Variant::new(size, CodecChoice::Copy));
        } else {
            variants.extend(fan_out(size));
        }
    }

    tracing::debug!(
        "planned {} sizes / {} variants for {}",
        sizes.len(),
        variants.len(),
        source
    );

    LadderPlan {
        source,
        sizes,
        variants,
    }
}
