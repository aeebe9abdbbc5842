//! Encoder driver
//!
//! Turns a ladder plan into ffmpeg invocations and runs them in the build's
//! working directory:
//! - probes which nvenc encoders actually work
//! - builds the split/scale filter graph and per-stream codec options
//! - runs the encode as a bounded retry loop, switching from hardware to
//!   software after a failed attempt in `auto` mode
//! - extracts text subtitles to WebVTT aligned on the encoded video

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::codec::{audio_args, nvenc_name, video_args, Backend, HardwareCaps};
use super::packager;
use crate::config::{EncoderConfig, EncodingMode, Workflow};
use crate::error::{HlsError, Result};
use crate::ladder::{CodecChoice, LadderPlan, Variant, VideoSize};
use crate::playlist::m3u8::TAG_MAP;
use crate::playlist::Playlist;
use crate::probe::{ProbeInfo, ProbeStream, Prober};
use crate::stream::{StreamKind, StreamRef, StreamRegistry};
use crate::tools::Tools;

/// Master playlist written by ffmpeg or the packager
pub const MASTER_PLAYLIST: &str = "master.m3u8";

/// Everything one encode needs
#[derive(Debug, Clone, Copy)]
pub struct EncodeJob<'a> {
    pub input: &'a Path,
    pub work_dir: &'a Path,
    pub info: &'a ProbeInfo,
    pub ladder: &'a LadderPlan,
    pub workflow: Workflow,
}

/// Result of a successful encode
#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    pub backend: Backend,
    /// Variants actually produced, in stream order
    pub variants: Vec<Variant>,
    /// Attempt that succeeded, starting at 1
    pub attempts: u32,
    /// Master playlist in the working directory
    pub master: PathBuf,
}

pub struct EncoderDriver {
    config: EncoderConfig,
    tools: Tools,
}

impl EncoderDriver {
    pub fn new(config: EncoderConfig, tools: Tools) -> Self {
        Self { config, tools }
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Pick the encoder backend.
    ///
    /// nvenc encoders can be listed by ffmpeg and still fail (old driver,
    /// no device, size limits), so each one encodes a single black frame
    /// first.
    pub async fn detect_backend(&self, work_dir: &Path) -> Backend {
        if self.config.encoding_mode == EncodingMode::ForceSoftware {
            return Backend::Software;
        }

        let h264 = self
            .test_codec(CodecChoice::H264, VideoSize::new(4096, 4096), work_dir)
            .await;
        if !h264 && self.config.encoding_mode == EncodingMode::Auto {
            return Backend::Software;
        }
        let caps = HardwareCaps {
            h264: true,
            hevc: self
                .test_codec(CodecChoice::Hevc, VideoSize::new(8192, 8192), work_dir)
                .await,
            av1: self
                .test_codec(CodecChoice::Av1, VideoSize::new(8192, 8192), work_dir)
                .await,
        };
        Backend::Hardware(caps)
    }

    async fn test_codec(&self, codec: CodecChoice, size: VideoSize, work_dir: &Path) -> bool {
        let Some(name) = nvenc_name(codec) else {
            return false;
        };
        let mut cmd = self.tools.ffmpeg();
        cmd.args(["-hide_banner", "-loglevel", "error", "-f", "lavfi", "-i"])
            .arg(format!("color=black:s={}", size))
            .args(["-vframes", "1", "-an", "-c:v", name, "-f", "null", "-"])
            .current_dir(work_dir);
        match cmd.execute().await {
            Ok(_) => {
                debug!("[ffmpeg] {} is usable", name);
                true
            }
            Err(e) => {
                warn!("[ffmpeg] {} is not usable: {}", name, e);
                false
            }
        }
    }

    /// Encode the ladder, then extract subtitles.
    ///
    /// Streams are (re)registered on every attempt, video first, then audio,
    /// then subtitles, so stream ids follow ffmpeg's `%v` numbering.
    pub async fn encode(
        &self,
        job: &EncodeJob<'_>,
        registry: &mut StreamRegistry,
    ) -> Result<EncodeOutcome> {
        let video = job.info.video().ok_or(HlsError::MissingVideoTrack)?;
        let attempts = self.config.max_attempts.max(1);
        let mut backend = self.detect_backend(job.work_dir).await;
        let mut last = String::new();

        for attempt in 1..=attempts {
            registry.clear();
            let variants = select_variants(job.ladder, backend);
            info!(
                "encode attempt {}/{} ({}): {}",
                attempt,
                attempts,
                backend,
                variants
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" ")
            );

            let args = match job.workflow {
                Workflow::Hls => self.hls_args(job, video, backend, &variants, registry)?,
                Workflow::Cmaf => self.cmaf_args(job, video, backend, &variants, registry)?,
            };

            match self.run_ffmpeg(args, job.work_dir).await {
                Ok(()) => {
                    if job.workflow == Workflow::Cmaf {
                        packager::package(
                            &self.tools,
                            job.work_dir,
                            registry.streams(),
                            self.config.segment_seconds,
                        )
                        .await?;
                    }
                    self.extract_subtitles(job, registry).await?;
                    return Ok(EncodeOutcome {
                        backend,
                        variants,
                        attempts: attempt,
                        master: job.work_dir.join(MASTER_PLAYLIST),
                    });
                }
                Err(e) => {
                    warn!("[ffmpeg] encode failed: {}", e);
                    last = e.to_string();
                    if backend.is_hardware() && self.config.encoding_mode == EncodingMode::Auto {
                        warn!("[ffmpeg] retrying in software mode");
                        backend = Backend::Software;
                    }
                }
            }
        }

        Err(HlsError::RetriesExhausted { attempts, last })
    }

    async fn run_ffmpeg(&self, args: Vec<String>, work_dir: &Path) -> Result<()> {
        if self.config.verbose {
            info!("ffmpeg arguments: {:?}", args);
        }
        let mut cmd = self.tools.ffmpeg();
        cmd.args(args).current_dir(work_dir);
        cmd.execute().await?;
        Ok(())
    }

    fn input_args(&self, input: &Path, backend: Backend) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string(), "-y".to_string()];
        if !self.config.verbose {
            args.extend(["-loglevel".to_string(), "warning".to_string()]);
        }
        if backend.is_hardware() {
            args.extend(["-hwaccel".to_string(), "auto".to_string()]);
        }
        args.push("-i".to_string());
        args.push(input.to_string_lossy().to_string());
        args
    }

    /// Register video and audio streams and build `-filter_complex` plus
    /// the per-stream `-map` and codec options. `spec` gives the option
    /// specifier for a stream.
    #[allow(clippy::too_many_arguments)]
    fn stream_args(
        &self,
        job: &EncodeJob<'_>,
        video: &Arc<ProbeStream>,
        backend: Backend,
        variants: &[Variant],
        registry: &mut StreamRegistry,
        mut per_stream: impl FnMut(&StreamRef, Vec<String>, &mut Vec<String>),
        spec: impl Fn(&StreamRef) -> String,
    ) -> Result<Vec<String>> {
        let source = VideoSize::new(video.width, video.height);
        let rate = video.frame_rate.value();
        let mut args = Vec::new();
        let mut body = Vec::new();
        let mut scaled = Vec::new();

        for variant in variants {
            let stream = registry.new_stream(video.clone())?;
            let mut stream_args = Vec::new();
            if variant.codec == CodecChoice::Copy {
                stream_args.extend(["-map".to_string(), format!("0:{}", video.index)]);
            } else {
                stream_args.extend(["-map".to_string(), format!("[v{}]", stream.local_id)]);
                scaled.push((stream.local_id, variant.size));
            }
            let codec = video_args(&spec(&stream), variant, backend, self.config.preset, rate)
                .ok_or_else(|| HlsError::Tool {
                    tool: "ffmpeg".into(),
                    message: format!("no {} encoder for {}", backend, variant),
                })?;
            stream_args.extend(codec);
            per_stream(&stream, stream_args, &mut body);
        }

        for audio in job.info.streams_of(StreamKind::Audio) {
            let index = audio.index;
            let stream = registry.new_stream(audio)?;
            let mut stream_args = vec!["-map".to_string(), format!("0:{}", index)];
            stream_args.extend(audio_args(
                &spec(&stream),
                &self.config.audio_bitrate,
                self.config.audio_channels,
            ));
            per_stream(&stream, stream_args, &mut body);
        }

        if let Some(flt) = filter_complex(
            &format!("0:{}", video.index),
            source,
            &scaled,
            self.config.video_filters.as_deref(),
        ) {
            args.extend(["-filter_complex".to_string(), flt]);
        }
        args.extend(body);
        Ok(args)
    }

    /// ffmpeg HLS muxer invocation writing `stream_<id>.m3u8` per stream
    /// and `master.m3u8`
    pub fn hls_args(
        &self,
        job: &EncodeJob<'_>,
        video: &Arc<ProbeStream>,
        backend: Backend,
        variants: &[Variant],
        registry: &mut StreamRegistry,
    ) -> Result<Vec<String>> {
        let mut args = self.input_args(job.input, backend);
        args.extend(self.stream_args(
            job,
            video,
            backend,
            variants,
            registry,
            |_, stream_args, body| body.extend(stream_args),
            |s| s.track_id(),
        )?);

        let mut flags = vec!["independent_segments"];
        if self.config.single_file_output {
            flags.push("single_file");
        }
        let segments = if self.config.single_file_output {
            "stream_%v.mp4"
        } else {
            "stream_%v_%d.m4s"
        };
        let var_stream_map: Vec<String> = registry.streams().iter().map(|s| s.track_id()).collect();
        let var_stream_map = var_stream_map.join(" ");
        let hls_time = self.config.segment_seconds.to_string();
        let flags = flags.join("+");

        args.extend(
            [
                "-f",
                "hls",
                "-hls_time",
                hls_time.as_str(),
                "-hls_playlist_type",
                "vod",
                "-hls_flags",
                flags.as_str(),
                "-hls_allow_cache",
                "1",
                "-hls_segment_type",
                "fmp4",
                "-hls_fmp4_init_filename",
                "stream_%v_init.mp4",
                "-master_pl_name",
                MASTER_PLAYLIST,
                "-hls_segment_filename",
                segments,
                "-var_stream_map",
                var_stream_map.as_str(),
                "stream_%v.m3u8",
            ]
            .map(String::from),
        );
        Ok(args)
    }

    /// ffmpeg invocation writing one `stream_<id>.mp4` per stream for the
    /// packager. Every output holds a single stream, so options use the
    /// output-local specifier (`v:0` / `a:0`).
    pub fn cmaf_args(
        &self,
        job: &EncodeJob<'_>,
        video: &Arc<ProbeStream>,
        backend: Backend,
        variants: &[Variant],
        registry: &mut StreamRegistry,
    ) -> Result<Vec<String>> {
        let mut args = self.input_args(job.input, backend);
        args.extend(self.stream_args(
            job,
            video,
            backend,
            variants,
            registry,
            |stream, stream_args, body| {
                body.extend(stream_args);
                body.extend(["-f".to_string(), "mp4".to_string(), stream.media_filename()]);
            },
            |s| format!("{}:0", s.kind.letter()),
        )?);
        Ok(args)
    }

    /// WebVTT extraction for one subtitle stream, shifted by `offset` so
    /// cues line up with the encoded video's timestamps
    pub fn subtitle_args(&self, input: &Path, offset: f64, stream: &StreamRef) -> Vec<String> {
        let mut args = vec!["-hide_banner".to_string(), "-y".to_string()];
        if !self.config.verbose {
            args.extend(["-loglevel".to_string(), "warning".to_string()]);
        }
        args.extend([
            "-itsoffset".to_string(),
            offset.to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-map".to_string(),
            format!("0:{}", stream.source.index),
            "-c:0".to_string(),
            "webvtt".to_string(),
            "-f".to_string(),
            "webvtt".to_string(),
            stream.subtitle_filename(),
        ]);
        args
    }

    async fn extract_subtitles(&self, job: &EncodeJob<'_>, registry: &mut StreamRegistry) -> Result<()> {
        let subtitles = job.info.usable_subtitles();
        if subtitles.is_empty() {
            return Ok(());
        }

        let first_video = registry
            .of_kind(StreamKind::Video)
            .next()
            .cloned()
            .ok_or(HlsError::MissingVideoTrack)?;
        let offset = self.video_start_time(job.work_dir, &first_video).await?;
        debug!("subtitles: aligning on video start time {}", offset);

        for source in subtitles {
            let stream = registry.new_stream(source)?;
            let args = self.subtitle_args(job.input, offset, &stream);
            self.run_ffmpeg(args, job.work_dir)
                .await
                .map_err(|e| HlsError::Tool {
                    tool: "ffmpeg".into(),
                    message: format!("subtitle extraction for {} failed: {}", stream, e),
                })?;
            info!("subtitles: extracted {} to {}", stream, stream.subtitle_filename());
        }
        Ok(())
    }

    /// Start time of the encoded video, read from the first rendition's
    /// init segment (or first segment when there is none)
    async fn video_start_time(&self, work_dir: &Path, video: &StreamRef) -> Result<f64> {
        let playlist = Playlist::load(&work_dir.join(video.playlist_filename()))?;
        let target = playlist
            .headers_with_key(TAG_MAP)
            .find_map(|t| t.get("URI"))
            .or_else(|| playlist.files.first().map(|f| f.filename.as_str()))
            .ok_or_else(|| HlsError::Probe(format!("{} has no media", video.playlist_filename())))?
            .to_string();

        let info = Prober::new(self.tools.clone()).probe(&work_dir.join(target)).await?;
        Ok(info
            .video()
            .map(|v| v.start_time)
            .unwrap_or(info.format.start_time))
    }
}

/// Variants the backend can produce.
///
/// Fan-out variants with an unavailable codec are dropped. A size left
/// without any variant falls back to H.264.
pub fn select_variants(ladder: &LadderPlan, backend: Backend) -> Vec<Variant> {
    let mut selected = Vec::new();
    for &size in &ladder.sizes {
        let mut variants: Vec<Variant> = ladder
            .variants_for(size)
            .filter(|v| backend.supports(v.codec))
            .copied()
            .collect();
        if variants.is_empty() {
            variants.push(Variant::new(size, CodecChoice::H264));
        }
        selected.extend(variants);
    }
    selected
}

/// Split the source video once per encoded output and scale each branch.
///
/// `outputs` pairs the output label number with its size; a branch at the
/// source size is not scaled. `None` when nothing is encoded.
pub fn filter_complex(
    input: &str,
    source: VideoSize,
    outputs: &[(usize, VideoSize)],
    extra: Option<&str>,
) -> Option<String> {
    if outputs.is_empty() {
        return None;
    }
    let mut flt = format!("[{}]", input);
    if let Some(extra) = extra.filter(|f| !f.trim().is_empty()) {
        flt.push_str(extra);
        flt.push(',');
    }
    flt.push_str(&format!("split={}", outputs.len()));

    let mut scales = String::new();
    for (n, size) in outputs {
        if *size == source {
            flt.push_str(&format!("[v{}]", n));
        } else {
            flt.push_str(&format!("[vin{}]", n));
            scales.push_str(&format!(";[vin{}]{}[v{}]", n, size.scale_filter(), n));
        }
    }
    flt.push_str(&scales);
    Some(flt)
}
