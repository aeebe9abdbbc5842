//! Encoding
//!
//! - `codec`: encoder backends and per-codec ffmpeg options
//! - `driver`: capability probe, ffmpeg invocations, retries, subtitles
//! - `packager`: shaka-packager invocation for the CMAF workflow

pub mod codec;
pub mod driver;
pub mod packager;

pub use codec::{Backend, HardwareCaps};
pub use driver::{select_variants, EncodeJob, EncodeOutcome, EncoderDriver, MASTER_PLAYLIST};
