//! Build session
//!
//! One build turns one input file into one packed container:
//! probe, plan the ladder, encode into a scratch directory, fix up the master
//! playlist, then pack the directory. The scratch directory is removed when
//! the session ends unless `keep_temp` is set.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tracing::{debug, error, info, warn};

use crate::config::{BuildConfig, Workflow};
use crate::container::{ContainerSummary, ContainerWriter};
use crate::encode::{Backend, EncodeJob, EncoderDriver, MASTER_PLAYLIST};
use crate::error::{HlsError, Result};
use crate::ladder::{plan_ladder, LadderPlan, Variant, VideoSize};
use crate::playlist::{attach_subtitles, build_subtitle_playlist, group_audio_renditions, Playlist};
use crate::probe::{ProbeInfo, Prober};
use crate::stream::{StreamKind, StreamRef, StreamRegistry};
use crate::tools::Tools;

/// Rewritten master saved next to the encoder output, for debugging
pub const FIXED_MASTER: &str = "master_fixed.m3u8";

/// What a finished build produced
#[derive(Debug)]
pub struct BuildReport {
    pub output: PathBuf,
    pub backend: Backend,
    pub variants: Vec<Variant>,
    pub streams: Vec<StreamRef>,
    pub container: ContainerSummary,
    /// Working directory, when it was kept
    pub work_dir: Option<PathBuf>,
    pub elapsed: Duration,
}

pub struct BuildSession {
    config: BuildConfig,
    tools: Tools,
    registry: StreamRegistry,
}

impl BuildSession {
    pub fn new(config: BuildConfig) -> Result<Self> {
        config.validate()?;
        let tools = Tools::resolve(&config.tools, config.tool_timeout());
        Ok(Self {
            config,
            tools,
            registry: StreamRegistry::new(),
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Streams registered by the last encode
    pub fn streams(&self) -> &[StreamRef] {
        self.registry.streams()
    }

    pub async fn probe(&self, input: &Path) -> Result<ProbeInfo> {
        Prober::new(self.tools.clone()).probe(input).await
    }

    /// Ladder for the first video track of `info`
    pub fn plan(&self, info: &ProbeInfo) -> Result<LadderPlan> {
        let video = info.video().ok_or(HlsError::MissingVideoTrack)?;
        let encoder = &self.config.encoder;
        Ok(plan_ladder(
            VideoSize::new(video.width, video.height),
            encoder.max_variants,
            encoder.rounding,
            encoder.copy_source,
        ))
    }

    /// Run the whole pipeline for `input`, writing the container to `output`
    pub async fn build(&mut self, input: &Path, output: &Path) -> Result<BuildReport> {
        let started = Instant::now();
        if !input.is_file() {
            return Err(HlsError::NotFound(input.display().to_string()));
        }

        let work_dir = self.create_work_dir()?;
        info!(
            "building {} -> {} ({} workflow, work dir {})",
            input.display(),
            output.display(),
            self.config.workflow,
            work_dir.path().display()
        );

        let info = self.probe(input).await?;
        let ladder = self.plan(&info)?;
        info!(
            "ladder: {}",
            ladder
                .sizes
                .iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let driver = EncoderDriver::new(self.config.encoder.clone(), self.tools.clone());
        let job = EncodeJob {
            input,
            work_dir: work_dir.path(),
            info: &info,
            ladder: &ladder,
            workflow: self.config.workflow,
        };
        let outcome = driver.encode(&job, &mut self.registry).await?;
        info!(
            "encoded {} variants with {} backend after {} attempt(s)",
            outcome.variants.len(),
            outcome.backend,
            outcome.attempts
        );

        let master = rewrite_master(
            work_dir.path(),
            self.config.workflow,
            self.registry.streams(),
            info.format.duration,
        )?;
        if let Err(e) = master.save_as(&work_dir.path().join(FIXED_MASTER)) {
            debug!("could not save {}: {}", FIXED_MASTER, e);
        }

        let container = pack(master, work_dir.path().to_path_buf(), output.to_path_buf()).await?;
        info!(
            "wrote {} ({} playlists, {} media files, {} bytes)",
            output.display(),
            container.playlists,
            container.media_files,
            container.bytes
        );

        let kept = if self.config.keep_temp {
            let path = work_dir.into_path();
            info!("keeping work dir {}", path.display());
            Some(path)
        } else {
            None
        };

        Ok(BuildReport {
            output: output.to_path_buf(),
            backend: outcome.backend,
            variants: outcome.variants,
            streams: self.registry.streams().to_vec(),
            container,
            work_dir: kept,
            elapsed: started.elapsed(),
        })
    }

    fn create_work_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("hls-packer-");
        let dir = match &self.config.temp_dir {
            Some(parent) => {
                std::fs::create_dir_all(parent)?;
                builder.tempdir_in(parent)?
            }
            None => builder.tempdir()?,
        };
        Ok(dir)
    }
}

/// Load the encoder's master playlist and apply the rendition rewrites.
///
/// Audio variants become alternate renditions for the HLS workflow only;
/// the packager already groups audio. Subtitle playlists are written to
/// `work_dir` before they are attached.
pub fn rewrite_master(
    work_dir: &Path,
    workflow: Workflow,
    streams: &[StreamRef],
    duration_secs: f64,
) -> Result<Playlist> {
    let mut master = Playlist::load(&work_dir.join(MASTER_PLAYLIST))?;

    if workflow == Workflow::Hls {
        let n = group_audio_renditions(&mut master, streams)?;
        debug!("master: {} audio renditions", n);
    }

    for stream in streams.iter().filter(|s| s.kind == StreamKind::Subtitle) {
        build_subtitle_playlist(&stream.subtitle_filename(), duration_secs)
            .save_as(&work_dir.join(stream.subtitle_playlist_filename()))?;
    }
    let n = attach_subtitles(&mut master, streams)?;
    debug!("master: {} subtitle renditions", n);

    Ok(master)
}

/// Pack `work_dir` into `output` on the blocking pool. A failed write
/// removes the partial output.
async fn pack(master: Playlist, work_dir: PathBuf, output: PathBuf) -> Result<ContainerSummary> {
    tokio::task::spawn_blocking(move || {
        let result = File::create(&output)
            .map_err(HlsError::from)
            .and_then(|out| ContainerWriter::new(out, &work_dir).write(master));
        if result.is_err() {
            if let Err(e) = std::fs::remove_file(&output) {
                warn!("could not remove partial {}: {}", output.display(), e);
            }
        }
        result
    })
    .await
    .map_err(|e| {
        error!("pack task failed: {}", e);
        HlsError::from(e)
    })?
}
