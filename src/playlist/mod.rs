//! Playlist handling
//!
//! - `tag`: a single directive with its raw attribute list
//! - `m3u8`: playlist model, parser and serializer
//! - `master`: master rewriter (alternate audio and subtitle renditions)
//! - `variant`: synthesised subtitle playlists

pub mod m3u8;
pub mod master;
pub mod tag;
pub mod variant;

pub use m3u8::{Playlist, PlaylistFile};
pub use master::{attach_subtitles, group_audio_renditions};
pub use tag::PlaylistTag;
pub use variant::build_subtitle_playlist;
