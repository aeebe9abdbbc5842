//! Master playlist rewriter
//!
//! ffmpeg's HLS muxer lists every audio track as an independent
//! `#EXT-X-STREAM-INF` variant. Players expect audio as alternate renditions
//! bound to the video variants, so the master is rewritten here:
//!
//! - each audio variant becomes an `#EXT-X-MEDIA:TYPE=AUDIO` rendition in
//!   group `"audio"`, the first one marked `DEFAULT=YES`
//! - each subtitle track gets an `#EXT-X-MEDIA:TYPE=SUBTITLES` rendition in
//!   group `"subs"` pointing at its synthesised playlist
//! - video variants are bound to those groups with `AUDIO=` / `SUBTITLES=`

use tracing::debug;

use super::m3u8::{Playlist, PlaylistFile, TAG_MEDIA};
use super::tag::{quote, PlaylistTag};
use crate::error::Result;
use crate::stream::{StreamKind, StreamRef};

pub const AUDIO_GROUP: &str = "audio";
pub const SUBTITLE_GROUP: &str = "subs";

/// Turn audio variants into alternate renditions.
///
/// Streams are visited in creation order, so `DEFAULT=YES` always lands on
/// the first audio track. Returns the number of renditions created.
pub fn group_audio_renditions(master: &mut Playlist, streams: &[StreamRef]) -> Result<usize> {
    let mut count = 0;

    for stream in streams.iter().filter(|s| s.kind == StreamKind::Audio) {
        let file = master.take_file(&stream.playlist_filename())?;

        let mut attrs = vec![
            "TYPE=AUDIO".to_string(),
            format!("GROUP-ID={}", quote(AUDIO_GROUP)),
            format!(
                "NAME={}",
                quote_text(stream.source.title().unwrap_or("Undefined audio track"))
            ),
        ];
        if let Some(lang) = stream.source.language() {
            attrs.push(format!("LANGUAGE={}", quote_text(lang)));
        }
        attrs.push(format!("DEFAULT={}", if count == 0 { "YES" } else { "NO" }));
        attrs.push("AUTOSELECT=YES".to_string());
        attrs.push(format!("URI={}", quote(&file.filename)));

        debug!("master: audio rendition {} -> {}", stream, file.filename);
        master.insert_rendition(PlaylistFile::referential(PlaylistTag::new(TAG_MEDIA, attrs))?);
        count += 1;
    }

    if count > 0 {
        bind_group(master, "AUDIO", AUDIO_GROUP);
    }
    Ok(count)
}

/// Append a subtitle rendition for every subtitle stream.
///
/// Each rendition points at the stream's single-segment playlist
/// (`stream_<id>_sub.m3u8`), which the caller is responsible for writing.
pub fn attach_subtitles(master: &mut Playlist, streams: &[StreamRef]) -> Result<usize> {
    let mut count = 0;

    for stream in streams.iter().filter(|s| s.kind == StreamKind::Subtitle) {
        let uri = stream.subtitle_playlist_filename();
        let mut attrs = vec![
            "TYPE=SUBTITLES".to_string(),
            format!("GROUP-ID={}", quote(SUBTITLE_GROUP)),
            "DEFAULT=NO".to_string(),
            "AUTOSELECT=YES".to_string(),
            "FORCED=NO".to_string(),
            format!("URI={}", quote(&uri)),
        ];

        let mut name = "subtitles".to_string();
        if let Some(lang) = stream.source.language() {
            name = format!("{} subs", lang);
            let code: String = lang.chars().take(2).collect();
            attrs.push(format!("LANGUAGE={}", quote_text(&code)));
        }
        if let Some(title) = stream.source.title() {
            name = title.to_string();
        }
        attrs.push(format!("NAME={}", quote_text(&name)));

        debug!("master: subtitle rendition {} -> {}", stream, uri);
        master
            .files
            .push(PlaylistFile::referential(PlaylistTag::new(TAG_MEDIA, attrs))?);
        count += 1;
    }

    if count > 0 {
        bind_group(master, "SUBTITLES", SUBTITLE_GROUP);
    }
    Ok(count)
}

/// Point every video variant at a rendition group
fn bind_group(master: &mut Playlist, attr: &str, group: &str) {
    let value = quote(group);
    for file in master.standalone_files_mut() {
        if let Some(tag) = file.leading_tag_mut() {
            tag.set_or_push(attr, &value);
        }
    }
}

/// Quote free text taken from source metadata. Double quotes cannot be
/// escaped inside an m3u8 quoted string.
fn quote_text(text: &str) -> String {
    quote(&text.replace('"', "'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HlsError, PlaylistError};
    use crate::probe::ProbeStream;
    use crate::stream::StreamRegistry;
    use std::collections::HashMap;
    use std::sync::Arc;

    const FFMPEG_MASTER: &str = "#EXTM3U
#EXT-X-VERSION:7
#EXT-X-STREAM-INF:BANDWIDTH=6220800,RESOLUTION=1920x1080,CODECS=\"avc1.640028\"
stream_0.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=2764800,RESOLUTION=1280x720,CODECS=\"avc1.64001f\"
stream_1.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=105600,CODECS=\"mp4a.40.2\"
stream_2.m3u8
#EXT-X-STREAM-INF:BANDWIDTH=105600,CODECS=\"mp4a.40.2\"
stream_3.m3u8
";

    fn track(codec_type: &str, tags: &[(&str, &str)]) -> Arc<ProbeStream> {
        Arc::new(ProbeStream {
            codec_type: codec_type.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<HashMap<_, _>>(),
            ..Default::default()
        })
    }

    fn registry(subtitles: usize) -> StreamRegistry {
        let mut reg = StreamRegistry::new();
        let video = track("video", &[]);
        reg.new_stream(video.clone()).unwrap();
        reg.new_stream(video).unwrap();
        reg.new_stream(track("audio", &[("language", "eng"), ("title", "Main")]))
            .unwrap();
        reg.new_stream(track("audio", &[("language", "jpn")])).unwrap();
        for n in 0..subtitles {
            if n == 0 {
                reg.new_stream(track("subtitle", &[("language", "eng")])).unwrap();
            } else {
                reg.new_stream(track("subtitle", &[])).unwrap();
            }
        }
        reg
    }

    #[test]
    fn test_two_audio_tracks() {
        let reg = registry(0);
        let mut master = Playlist::parse(FFMPEG_MASTER).unwrap();
        assert_eq!(group_audio_renditions(&mut master, reg.streams()).unwrap(), 2);

        let media: Vec<_> = master
            .files
            .iter()
            .filter(|f| f.kind() == TAG_MEDIA)
            .map(|f| f.tags[0].clone())
            .collect();
        assert_eq!(media.len(), 2);
        assert!(media.iter().all(|t| t.get("TYPE") == Some("AUDIO")));
        assert_eq!(media[0].get("DEFAULT"), Some("YES"));
        assert_eq!(media[1].get("DEFAULT"), Some("NO"));
        assert_eq!(media[0].get("NAME"), Some("Main"));
        assert_eq!(media[1].get("NAME"), Some("Undefined audio track"));
        assert_eq!(media[1].get("LANGUAGE"), Some("jpn"));
        assert_eq!(media[0].get("URI"), Some("stream_2.m3u8"));

        let standalone: Vec<_> = master.files.iter().filter(|f| f.standalone).collect();
        assert_eq!(standalone.len(), 2);
        for f in standalone {
            assert_eq!(f.tags[0].get("AUDIO"), Some("audio"));
        }
    }

    #[test]
    fn test_audio_rendition_text() {
        let reg = registry(0);
        let mut master = Playlist::parse(FFMPEG_MASTER).unwrap();
        group_audio_renditions(&mut master, reg.streams()).unwrap();
        let text = master.to_string();
        assert!(text.contains(
            "#EXT-X-MEDIA:TYPE=AUDIO,GROUP-ID=\"audio\",NAME=\"Main\",LANGUAGE=\"eng\",DEFAULT=YES,AUTOSELECT=YES,URI=\"stream_2.m3u8\"\n"
        ));
        assert!(text.contains("CODECS=\"avc1.640028\",AUDIO=\"audio\"\nstream_0.m3u8\n"));
        // renditions render before the variants and survive a re-parse
        assert!(text.find("#EXT-X-MEDIA").unwrap() < text.find("#EXT-X-STREAM-INF").unwrap());
        assert_eq!(Playlist::parse(&text).unwrap(), master);
    }

    #[test]
    fn test_no_audio_leaves_variants_alone() {
        let mut reg = StreamRegistry::new();
        reg.new_stream(track("video", &[])).unwrap();
        let text = "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nstream_0.m3u8\n";
        let mut master = Playlist::parse(text).unwrap();
        assert_eq!(group_audio_renditions(&mut master, reg.streams()).unwrap(), 0);
        assert_eq!(master.to_string(), text);
    }

    #[test]
    fn test_missing_audio_variant() {
        let reg = registry(0);
        let mut master = Playlist::parse(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nstream_0.m3u8\n",
        )
        .unwrap();
        let err = group_audio_renditions(&mut master, reg.streams()).unwrap_err();
        assert!(matches!(
            err,
            HlsError::Playlist(PlaylistError::NotFound(f)) if f == "stream_2.m3u8"
        ));
    }

    #[test]
    fn test_subtitles() {
        let reg = registry(2);
        let mut master = Playlist::parse(FFMPEG_MASTER).unwrap();
        group_audio_renditions(&mut master, reg.streams()).unwrap();
        assert_eq!(attach_subtitles(&mut master, reg.streams()).unwrap(), 2);

        let subs: Vec<_> = master
            .files
            .iter()
            .filter(|f| f.tags[0].get("TYPE") == Some("SUBTITLES"))
            .collect();
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].filename, "stream_4_sub.m3u8");
        assert_eq!(
            subs[0].tags[0].to_string(),
            "#EXT-X-MEDIA:TYPE=SUBTITLES,GROUP-ID=\"subs\",DEFAULT=NO,AUTOSELECT=YES,FORCED=NO,URI=\"stream_4_sub.m3u8\",LANGUAGE=\"en\",NAME=\"eng subs\""
        );
        assert_eq!(subs[1].tags[0].get("NAME"), Some("subtitles"));
        assert_eq!(subs[1].tags[0].get("LANGUAGE"), None);

        for f in &master.files {
            let tag = &f.tags[0];
            if f.standalone {
                assert_eq!(tag.get("SUBTITLES"), Some("subs"));
            } else {
                assert_eq!(tag.get("SUBTITLES"), None);
            }
        }
        let text = master.to_string();
        assert_eq!(Playlist::parse(&text).unwrap(), master);
    }

    #[test]
    fn test_quotes_in_titles() {
        let mut reg = StreamRegistry::new();
        reg.new_stream(track("video", &[])).unwrap();
        reg.new_stream(track("subtitle", &[("title", "Director's \"cut\"")]))
            .unwrap();
        let mut master = Playlist::parse("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=1\nstream_0.m3u8\n")
            .unwrap();
        attach_subtitles(&mut master, reg.streams()).unwrap();
        assert_eq!(master.files[1].tags[0].get("NAME"), Some("Director's 'cut'"));
    }
}
