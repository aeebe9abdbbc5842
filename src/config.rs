//! Build configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::HlsError;
use crate::ladder::RoundingPolicy;

/// Speed / quality trade-off of the video encoders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetQuality {
    Fast,
    Balanced,
    #[default]
    Best,
}

impl PresetQuality {
    /// nvenc `-preset` value
    pub fn nvenc_preset(&self) -> &'static str {
        match self {
            PresetQuality::Fast => "p2",
            PresetQuality::Balanced => "p4",
            PresetQuality::Best => "p6",
        }
    }

    /// libx264 / libx265 `-preset` value
    pub fn x26x_preset(&self) -> &'static str {
        match self {
            PresetQuality::Fast => "veryfast",
            PresetQuality::Balanced => "medium",
            PresetQuality::Best => "slow",
        }
    }
}

impl FromStr for PresetQuality {
    type Err = HlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fast" => Ok(PresetQuality::Fast),
            "balanced" => Ok(PresetQuality::Balanced),
            "best" => Ok(PresetQuality::Best),
            other => Err(HlsError::Config(format!("unknown preset: {}", other))),
        }
    }
}

/// Hardware or software encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    /// Use hardware encoders when the probe succeeds, fall back to software
    #[default]
    Auto,
    ForceSoftware,
    /// Never fall back; a failing hardware encode is an error
    ForceHardware,
}

/// Which tool chain produces the segments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Workflow {
    /// ffmpeg's HLS muxer writes playlists and fMP4 segments
    #[default]
    Hls,
    /// ffmpeg encodes one file per track, shaka-packager segments them
    Cmaf,
}

impl fmt::Display for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Workflow::Hls => "hls",
            Workflow::Cmaf => "cmaf",
        })
    }
}

impl FromStr for Workflow {
    type Err = HlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hls" => Ok(Workflow::Hls),
            "cmaf" => Ok(Workflow::Cmaf),
            other => Err(HlsError::Config(format!("unknown workflow: {}", other))),
        }
    }
}

/// Encoder driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub preset: PresetQuality,
    pub encoding_mode: EncodingMode,
    /// Maximum number of ladder sizes, source size included
    pub max_variants: usize,
    /// One media file per rendition instead of one file per segment
    pub single_file_output: bool,
    pub rounding: RoundingPolicy,
    /// Stream-copy the source rung instead of re-encoding it
    pub copy_source: bool,
    /// Target segment duration in seconds
    pub segment_seconds: u32,
    pub audio_bitrate: String,
    pub audio_channels: u32,
    /// Extra filters applied to the source video before the scale split
    pub video_filters: Option<String>,
    /// Encode attempts before giving up, counting the first one
    pub max_attempts: u32,
    /// Log ffmpeg output at info level and drop `-loglevel warning`
    pub verbose: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            preset: PresetQuality::default(),
            encoding_mode: EncodingMode::default(),
            max_variants: 16,
            single_file_output: false,
            rounding: RoundingPolicy::default(),
            copy_source: false,
            segment_seconds: 10,
            audio_bitrate: "96k".to_string(),
            audio_channels: 2,
            video_filters: None,
            max_attempts: 2,
            verbose: false,
        }
    }
}

/// Where to find the external binaries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPaths {
    /// Directory holding ffmpeg and ffprobe
    pub ffmpeg_dir: Option<PathBuf>,
    /// shaka-packager executable
    pub packager: Option<PathBuf>,
}

/// Complete configuration of one build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub encoder: EncoderConfig,
    pub tools: ToolPaths,
    pub workflow: Workflow,
    /// Keep the working directory after the build
    pub keep_temp: bool,
    /// Kill ffmpeg or the packager after this many seconds
    pub tool_timeout_secs: Option<u64>,
    /// Parent of the working directory, system temp dir if unset
    pub temp_dir: Option<PathBuf>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            tools: ToolPaths::default(),
            workflow: Workflow::default(),
            keep_temp: false,
            tool_timeout_secs: None,
            temp_dir: None,
        }
    }
}

impl BuildConfig {
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }

    /// Reject settings no build could succeed with
    pub fn validate(&self) -> Result<(), HlsError> {
        if self.encoder.max_variants == 0 {
            return Err(HlsError::Config("max_variants must be at least 1".into()));
        }
        if self.encoder.max_attempts == 0 {
            return Err(HlsError::Config("max_attempts must be at least 1".into()));
        }
        if self.encoder.segment_seconds == 0 {
            return Err(HlsError::Config("segment_seconds must be at least 1".into()));
        }
        if self.encoder.audio_channels == 0 {
            return Err(HlsError::Config("audio_channels must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BuildConfig::default();
        assert_eq!(config.encoder.max_variants, 16);
        assert_eq!(config.encoder.segment_seconds, 10);
        assert_eq!(config.encoder.audio_bitrate, "96k");
        assert_eq!(config.encoder.max_attempts, 2);
        assert_eq!(config.encoder.rounding, RoundingPolicy::ClearLowBit);
        assert_eq!(config.workflow, Workflow::Hls);
        assert_eq!(config.tool_timeout(), None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(PresetQuality::Best.nvenc_preset(), "p6");
        assert_eq!(PresetQuality::Fast.x26x_preset(), "veryfast");
        assert_eq!("Balanced".parse::<PresetQuality>().unwrap(), PresetQuality::Balanced);
        assert!("turbo".parse::<PresetQuality>().is_err());
    }

    #[test]
    fn test_partial_toml() {
        let config: BuildConfig = toml::from_str(
            r#"
            workflow = "cmaf"
            [encoder]
            encoding_mode = "force_software"
            rounding = "exact_division"
            max_variants = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.workflow, Workflow::Cmaf);
        assert_eq!(config.encoder.encoding_mode, EncodingMode::ForceSoftware);
        assert_eq!(config.encoder.rounding, RoundingPolicy::ExactDivision);
        assert_eq!(config.encoder.max_variants, 4);
        assert_eq!(config.encoder.audio_channels, 2);
    }

    #[test]
    fn test_validate() {
        let mut config = BuildConfig::default();
        config.encoder.max_attempts = 0;
        assert!(matches!(config.validate(), Err(HlsError::Config(_))));
    }
}
