//! hls-packer command line
//!
//! `hls-packer build -i movie.mkv -o movie.hls` encodes a ladder and packs it;
//! `inspect` / `extract` look inside an existing container.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use hls_packer::config::{BuildConfig, EncodingMode, PresetQuality, Workflow};
use hls_packer::config_file::{generate_default_config, ConfigFile};
use hls_packer::container::ContainerReader;
use hls_packer::ladder::{plan_ladder, RoundingPolicy, VideoSize};
use hls_packer::session::BuildSession;
use hls_packer::Result;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "hls-packer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Logging level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format (pretty, json)
    #[arg(long, global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode a media file into an HLS ladder and pack it into one file
    Build(BuildArgs),
    /// Print the ladder planned for a source size
    Plan {
        /// Source size, WIDTHxHEIGHT
        size: VideoSize,
        #[arg(long, default_value_t = 16)]
        max_variants: usize,
        /// Source frame rate used for bitrate targets
        #[arg(long)]
        fps: Option<f64>,
        /// Only accept sizes whose width divides exactly
        #[arg(long)]
        exact: bool,
        #[arg(long)]
        copy_source: bool,
    },
    /// Show the header and index of a container
    Inspect { file: PathBuf },
    /// Unpack a container into a directory
    Extract { file: PathBuf, dir: PathBuf },
    /// Write a configuration file with every default filled in
    InitConfig { path: PathBuf },
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Input media file
    #[arg(short, long)]
    input: PathBuf,

    /// Output container file
    #[arg(short, long)]
    output: PathBuf,

    /// Never use hardware encoders
    #[arg(long, conflicts_with = "hardware")]
    software: bool,

    /// Use hardware encoders without falling back to software
    #[arg(long)]
    hardware: bool,

    /// Maximum number of ladder sizes, source size included
    #[arg(long)]
    max_variants: Option<usize>,

    /// One media file per rendition instead of one per segment
    #[arg(long)]
    single_file: bool,

    /// Stream-copy the source size instead of re-encoding it
    #[arg(long)]
    copy_source: bool,

    /// Encoder preset (fast, balanced, best)
    #[arg(long)]
    preset: Option<PresetQuality>,

    /// Segmenting tool chain (hls, cmaf)
    #[arg(long)]
    workflow: Option<Workflow>,

    /// Keep the working directory
    #[arg(long)]
    keep_temp: bool,

    /// Directory holding ffmpeg and ffprobe
    #[arg(long)]
    ffmpeg_dir: Option<PathBuf>,

    /// shaka-packager executable
    #[arg(long)]
    packager: Option<PathBuf>,

    /// Extra filters applied to the video before scaling
    #[arg(long)]
    filter_complex: Option<String>,

    /// Target segment duration in seconds
    #[arg(long)]
    segment_seconds: Option<u32>,

    /// Show ffmpeg output and arguments
    #[arg(short, long)]
    verbose: bool,
}

impl BuildArgs {
    /// Command-line flags override the configuration file
    fn apply(&self, config: &mut BuildConfig) {
        let encoder = &mut config.encoder;
        if self.software {
            encoder.encoding_mode = EncodingMode::ForceSoftware;
        }
        if self.hardware {
            encoder.encoding_mode = EncodingMode::ForceHardware;
        }
        if let Some(n) = self.max_variants {
            encoder.max_variants = n;
        }
        if self.single_file {
            encoder.single_file_output = true;
        }
        if self.copy_source {
            encoder.copy_source = true;
        }
        if let Some(preset) = self.preset {
            encoder.preset = preset;
        }
        if let Some(flt) = &self.filter_complex {
            encoder.video_filters = Some(flt.clone());
        }
        if let Some(secs) = self.segment_seconds {
            encoder.segment_seconds = secs;
        }
        if self.verbose {
            encoder.verbose = true;
        }
        if let Some(workflow) = self.workflow {
            config.workflow = workflow;
        }
        if self.keep_temp {
            config.keep_temp = true;
        }
        if let Some(dir) = &self.ffmpeg_dir {
            config.tools.ffmpeg_dir = Some(dir.clone());
        }
        if let Some(packager) = &self.packager {
            config.tools.packager = Some(packager.clone());
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let file = match &cli.config {
        Some(path) => ConfigFile::from_file(path),
        None => Ok(ConfigFile::default()),
    };
    let file_level = file.as_ref().ok().and_then(|f| f.log_level().map(str::to_string));
    let json = cli
        .log_format
        .as_deref()
        .or_else(|| file.as_ref().ok().and_then(|f| f.log_format()))
        == Some("json");
    init_logging(cli.log_level.as_deref(), file_level.as_deref(), json);

    let result = match file {
        Ok(file) => run(cli.command, file).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, file: ConfigFile) -> Result<()> {
    match command {
        Command::Build(args) => {
            let mut config = file.into_build_config();
            args.apply(&mut config);
            info!("hls-packer v{} starting", VERSION);

            let mut session = BuildSession::new(config)?;
            let report = session.build(&args.input, &args.output).await?;
            info!(
                "done in {:.1}s: {} variants, {} streams, {} entries",
                report.elapsed.as_secs_f64(),
                report.variants.len(),
                report.streams.len(),
                report.container.entries()
            );
            if let Some(dir) = &report.work_dir {
                info!("working directory kept at {}", dir.display());
            }
            println!("{}", report.output.display());
        }
        Command::Plan {
            size,
            max_variants,
            fps,
            exact,
            copy_source,
        } => {
            let policy = if exact {
                RoundingPolicy::ExactDivision
            } else {
                file.encoder.rounding
            };
            let plan = plan_ladder(size, max_variants, policy, copy_source);
            for variant in &plan.variants {
                match variant.bitrate(fps) {
                    Some(bps) => println!("{:<16} {:>6} kbit/s", variant, bps / 1000),
                    None => println!("{:<16} {:>6}", variant, "source"),
                }
            }
        }
        Command::Inspect { file: path } => {
            let reader = ContainerReader::open(&path)?;
            let header = *reader.header();
            let created = chrono::DateTime::from_timestamp(header.created as i64, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| header.created.to_string());
            println!(
                "{}: version {}, {} entries, created {}",
                path.display(),
                header.version,
                header.entry_count,
                created
            );
            println!(
                "master {:>10} bytes at {}",
                header.master.length, header.master.offset
            );
            for (slot, entry) in reader.entries().iter().enumerate() {
                println!(
                    "{:>6} {:<8} {:>10} bytes at {}",
                    slot, entry.kind, entry.length, entry.offset
                );
            }
        }
        Command::Extract { file: path, dir } => {
            let mut reader = ContainerReader::open(&path)?;
            let n = reader.extract_all(&dir)?;
            info!("extracted {} files to {}", n, dir.display());
        }
        Command::InitConfig { path } => {
            generate_default_config(&path)?;
            info!("wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}

/// Initialize logging with tracing.
///
/// `--log-level` wins over `RUST_LOG`, which wins over the config file.
fn init_logging(cli_level: Option<&str>, file_level: Option<&str>, json: bool) {
    let filter = match cli_level {
        Some(level) => EnvFilter::new(format!("hls_packer={}", level)),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("hls_packer={}", file_level.unwrap_or("info")))
        }),
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_cli_definition() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "hls-packer",
            "build",
            "-i",
            "in.mkv",
            "-o",
            "out.hls",
            "--software",
            "--max-variants",
            "3",
            "--preset",
            "fast",
            "--workflow",
            "cmaf",
            "--filter-complex",
            "yadif",
        ]);
        let Command::Build(args) = cli.command else {
            panic!("expected build");
        };
        let mut config = BuildConfig::default();
        args.apply(&mut config);
        assert_eq!(config.encoder.encoding_mode, EncodingMode::ForceSoftware);
        assert_eq!(config.encoder.max_variants, 3);
        assert_eq!(config.encoder.preset, PresetQuality::Fast);
        assert_eq!(config.encoder.video_filters.as_deref(), Some("yadif"));
        assert_eq!(config.workflow, Workflow::Cmaf);
        assert!(!config.keep_temp);
    }

    #[test]
    fn test_software_and_hardware_conflict() {
        let res = Cli::try_parse_from([
            "hls-packer", "build", "-i", "a", "-o", "b", "--software", "--hardware",
        ]);
        assert!(res.is_err());
    }

    #[test]
    fn test_plan_size_argument() {
        let cli = Cli::try_parse_from(["hls-packer", "plan", "1920x1080"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Plan { size, max_variants: 16, .. } if size == VideoSize::new(1920, 1080)
        ));
    }
}
