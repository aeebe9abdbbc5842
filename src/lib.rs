//! hls-packer
//!
//! Builds an adaptive bitrate HLS ladder from one media file with ffmpeg
//! (optionally shaka-packager), rewrites the master playlist so audio and
//! subtitle tracks are alternate renditions, and packs every playlist and
//! segment into one indexed container file.

pub mod config;
pub mod config_file;
pub mod container;
pub mod encode;
pub mod error;
pub mod ladder;
pub mod playlist;
pub mod probe;
pub mod session;
pub mod stream;
pub mod tools;

#[cfg(test)]
pub(crate) mod tests;

pub use config::{BuildConfig, EncoderConfig, EncodingMode, PresetQuality, ToolPaths, Workflow};
pub use container::{build_container, ContainerReader, ContainerWriter};
pub use error::{HlsError, PlaylistError, Result};
pub use ladder::{plan_ladder, LadderPlan, RoundingPolicy, VideoSize};
pub use playlist::Playlist;
pub use session::{BuildReport, BuildSession};
