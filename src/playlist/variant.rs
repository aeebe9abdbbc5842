//! Variant playlist synthesis
//!
//! Subtitle tracks are extracted as one WebVTT file spanning the whole
//! programme, so their playlist is built here rather than by the packager.

use super::m3u8::{Playlist, PlaylistFile, TAG_ENDLIST, TAG_INF};
use super::tag::PlaylistTag;

/// Build a single-segment VOD playlist referencing `filename` for the full
/// `duration_secs`.
pub fn build_subtitle_playlist(filename: &str, duration_secs: f64) -> Playlist {
    let duration = if duration_secs.is_finite() && duration_secs > 0.0 {
        duration_secs
    } else {
        0.0
    };

    let headers = [
        "#EXTM3U".to_string(),
        "#EXT-X-VERSION:6".to_string(),
        "#EXT-X-ALLOW-CACHE:YES".to_string(),
        format!("#EXT-X-TARGETDURATION:{}", duration.round() as u64),
        "#EXT-X-MEDIA-SEQUENCE:0".to_string(),
        "#EXT-X-PLAYLIST-TYPE:VOD".to_string(),
    ];

    Playlist {
        headers: headers.iter().map(|h| PlaylistTag::parse(h)).collect(),
        files: vec![PlaylistFile::standalone(
            vec![PlaylistTag::parse(&format!("{}:{:.6},", TAG_INF, duration))],
            filename,
        )],
        footer: vec![TAG_ENDLIST.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subtitle_playlist() {
        let pl = build_subtitle_playlist("stream_7.vtt", 5400.52);
        assert_eq!(
            pl.to_string(),
            "#EXTM3U
#EXT-X-VERSION:6
#EXT-X-ALLOW-CACHE:YES
#EXT-X-TARGETDURATION:5401
#EXT-X-MEDIA-SEQUENCE:0
#EXT-X-PLAYLIST-TYPE:VOD
#EXTINF:5400.520000,
stream_7.vtt
#EXT-X-ENDLIST
"
        );
    }

    #[test]
    fn test_subtitle_playlist_reparses() {
        let pl = build_subtitle_playlist("stream_3.vtt", 61.2);
        let text = pl.to_string();
        assert_eq!(Playlist::parse(&text).unwrap(), pl);
        assert!(text.contains("#EXT-X-TARGETDURATION:61\n"));
    }

    #[test]
    fn test_unknown_duration() {
        let pl = build_subtitle_playlist("s.vtt", f64::NAN);
        assert!(pl.to_string().contains("#EXTINF:0.000000,\ns.vtt\n"));
    }
}
