//! Per-codec ffmpeg encoder arguments

use std::fmt;

use crate::config::PresetQuality;
use crate::ladder::{CodecChoice, Variant};

/// nvenc cannot encode H.264 beyond this size
const NVENC_H264_MAX: u32 = 2048;

/// GOP length used by the software encoders
const GOP: &str = "48";

/// Which encoder family produces the video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// NVIDIA nvenc, with the codecs that passed the capability probe
    Hardware(HardwareCaps),
    Software,
}

impl Backend {
    pub fn is_hardware(&self) -> bool {
        matches!(self, Backend::Hardware(_))
    }

    /// Whether this backend can produce `codec` at all
    pub fn supports(&self, codec: CodecChoice) -> bool {
        match (self, codec) {
            (_, CodecChoice::Copy) => true,
            (_, CodecChoice::H264) => true,
            (Backend::Hardware(caps), CodecChoice::Hevc) => caps.hevc,
            (Backend::Hardware(caps), CodecChoice::Av1) => caps.av1,
            (Backend::Software, CodecChoice::Hevc) => true,
            // no usable software AV1 encoder in common ffmpeg builds
            (Backend::Software, CodecChoice::Av1) => false,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Hardware(caps) => write!(f, "hardware ({})", caps),
            Backend::Software => f.write_str("software"),
        }
    }
}

/// nvenc encoders that passed the capability probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HardwareCaps {
    pub h264: bool,
    pub hevc: bool,
    pub av1: bool,
}

impl fmt::Display for HardwareCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (self.h264, "h264"),
            (self.hevc, "hevc"),
            (self.av1, "av1"),
        ]
        .iter()
        .filter(|(ok, _)| *ok)
        .map(|(_, n)| *n)
        .collect();
        f.write_str(&names.join(","))
    }
}

/// nvenc encoder name for a codec
pub fn nvenc_name(codec: CodecChoice) -> Option<&'static str> {
    match codec {
        CodecChoice::H264 => Some("h264_nvenc"),
        CodecChoice::Hevc => Some("hevc_nvenc"),
        CodecChoice::Av1 => Some("av1_nvenc"),
        CodecChoice::Copy => None,
    }
}

/// Video encoder arguments for one output stream.
///
/// `spec` is the output stream specifier the options apply to (`v:0`).
/// Returns `None` when the backend has no encoder for the variant's codec.
pub fn video_args(
    spec: &str,
    variant: &Variant,
    backend: Backend,
    preset: PresetQuality,
    frame_rate: Option<f64>,
) -> Option<Vec<String>> {
    if variant.codec == CodecChoice::Copy {
        return Some(opts(spec, &[("-c", "copy")]));
    }
    if !backend.supports(variant.codec) {
        return None;
    }
    let bitrate = variant.bitrate(frame_rate)?;
    let br = bitrate.to_string();
    let bufsize = (bitrate * 2).to_string();

    let hardware = backend.is_hardware()
        && !(variant.codec == CodecChoice::H264 && variant.size.is_over(NVENC_H264_MAX));

    if hardware {
        let name = nvenc_name(variant.codec)?;
        let mut args = opts(
            spec,
            &[
                ("-c", name),
                ("-pix_fmt", "yuv420p"),
                ("-preset", preset.nvenc_preset()),
                ("-b", br.as_str()),
                ("-maxrate", br.as_str()),
            ],
        );
        match variant.codec {
            CodecChoice::H264 => args.extend(opts(spec, &[("-profile", "main")])),
            CodecChoice::Hevc => args.extend(opts(spec, &[("-profile", "main"), ("-tag", "hvc1")])),
            CodecChoice::Av1 => args.extend(opts(spec, &[("-tag", "av01")])),
            CodecChoice::Copy => {}
        }
        return Some(args);
    }

    match variant.codec {
        CodecChoice::H264 => Some(opts(
            spec,
            &[
                ("-c", "libx264"),
                ("-x264-params", "nal-hrd=cbr:force-cfr=1"),
                ("-b", br.as_str()),
                ("-maxrate", br.as_str()),
                ("-minrate", br.as_str()),
                ("-bufsize", bufsize.as_str()),
                ("-preset", preset.x26x_preset()),
                ("-g", GOP),
                ("-sc_threshold", "0"),
                ("-keyint_min", GOP),
            ],
        )),
        CodecChoice::Hevc => Some(opts(
            spec,
            &[
                ("-c", "libx265"),
                ("-x265-params", "keyint=48:min-keyint=48:scenecut=0"),
                ("-b", br.as_str()),
                ("-maxrate", br.as_str()),
                ("-bufsize", bufsize.as_str()),
                ("-preset", preset.x26x_preset()),
                ("-tag", "hvc1"),
            ],
        )),
        _ => None,
    }
}

/// AAC arguments for one audio output stream
pub fn audio_args(spec: &str, bitrate: &str, channels: u32) -> Vec<String> {
    let channels = channels.to_string();
    opts(
        spec,
        &[("-c", "aac"), ("-b", bitrate), ("-ac", channels.as_str())],
    )
}

/// Expand `(option, value)` pairs into `-option:spec value`
fn opts(spec: &str, pairs: &[(&str, &str)]) -> Vec<String> {
    pairs
        .iter()
        .flat_map(|(opt, value)| [format!("{}:{}", opt, spec), value.to_string()])
        .collect()
}
