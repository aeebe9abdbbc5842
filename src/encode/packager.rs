//! shaka-packager invocation for the CMAF workflow
//!
//! ffmpeg has already written one `stream_<id>.mp4` per track; the packager
//! segments them into fMP4 and writes the per-track and master playlists
//! with the same names the HLS workflow uses.

use std::path::Path;

use tracing::info;

use super::driver::MASTER_PLAYLIST;
use crate::error::Result;
use crate::playlist::master::AUDIO_GROUP;
use crate::stream::{StreamKind, StreamRef};
use crate::tools::Tools;

/// Stream descriptor for one track
pub fn stream_descriptor(stream: &StreamRef) -> String {
    let id = stream.id;
    let mut desc = format!(
        "in={},stream={},init_segment=stream_{id}_init.mp4,segment_template=stream_{id}_$Number$.m4s,playlist_name={}",
        stream.media_filename(),
        stream.kind.packager_name(),
        stream.playlist_filename(),
    );
    match stream.kind {
        StreamKind::Video => desc.push_str(&format!(",iframe_playlist_name=stream_{id}_iframe.m3u8")),
        StreamKind::Audio => desc.push_str(&format!(",hls_group_id={}", AUDIO_GROUP)),
        StreamKind::Subtitle => {}
    }
    desc
}

/// Full packager argument list. Subtitles are extracted separately and
/// never handed to the packager.
pub fn packager_args(streams: &[StreamRef], segment_seconds: u32) -> Vec<String> {
    let mut args: Vec<String> = streams
        .iter()
        .filter(|s| s.kind != StreamKind::Subtitle)
        .map(stream_descriptor)
        .collect();
    args.extend([
        "--hls_playlist_type".to_string(),
        "VOD".to_string(),
        "--segment_duration".to_string(),
        segment_seconds.to_string(),
        "--hls_master_playlist_output".to_string(),
        MASTER_PLAYLIST.to_string(),
    ]);
    args
}

/// Run the packager in `work_dir`
pub async fn package(
    tools: &Tools,
    work_dir: &Path,
    streams: &[StreamRef],
    segment_seconds: u32,
) -> Result<()> {
    let args = packager_args(streams, segment_seconds);
    let mut cmd = tools.packager();
    cmd.args(args).current_dir(work_dir);
    cmd.execute().await?;
    info!(
        "[packager] segmented {} tracks in {}",
        streams.iter().filter(|s| s.kind != StreamKind::Subtitle).count(),
        work_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeStream;
    use crate::stream::StreamRegistry;
    use std::sync::Arc;

    fn source(codec_type: &str) -> Arc<ProbeStream> {
        Arc::new(ProbeStream {
            codec_type: codec_type.to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_packager_args() {
        let mut reg = StreamRegistry::new();
        reg.new_stream(source("video")).unwrap();
        reg.new_stream(source("audio")).unwrap();
        reg.new_stream(source("subtitle")).unwrap();

        let args = packager_args(reg.streams(), 6);
        assert_eq!(
            args[0],
            "in=stream_0.mp4,stream=video,init_segment=stream_0_init.mp4,\
             segment_template=stream_0_$Number$.m4s,playlist_name=stream_0.m3u8,\
             iframe_playlist_name=stream_0_iframe.m3u8"
        );
        assert_eq!(
            args[1],
            "in=stream_1.mp4,stream=audio,init_segment=stream_1_init.mp4,\
             segment_template=stream_1_$Number$.m4s,playlist_name=stream_1.m3u8,\
             hls_group_id=audio"
        );
        assert!(!args.iter().any(|a| a.contains("stream_2")));
        assert_eq!(
            &args[2..],
            [
                "--hls_playlist_type",
                "VOD",
                "--segment_duration",
                "6",
                "--hls_master_playlist_output",
                "master.m3u8"
            ]
        );
    }
}
