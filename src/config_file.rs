//! TOML configuration file
//!
//! Loads build settings from a TOML file. Every section and key is optional;
//! anything left out keeps its default. Command-line flags are applied on top
//! of the result by the binary.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{BuildConfig, EncoderConfig, ToolPaths, Workflow};
use crate::error::{HlsError, Result};

/// On-disk configuration; every section may be left out
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Encoder settings
    #[serde(default)]
    pub encoder: EncoderConfig,
    /// External tool locations
    #[serde(default)]
    pub tools: ToolPaths,
    /// Logging settings
    pub logging: Option<LoggingSettings>,
    /// Build settings
    pub build: Option<BuildSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// `tracing` level for the crate's own events
    pub level: String,
    /// `pretty` or `json`
    pub format: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: Some("pretty".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSettings {
    pub workflow: Option<Workflow>,
    /// Keep the working directory after the build
    pub keep_temp: Option<bool>,
    /// Kill external tools after this many seconds
    pub tool_timeout_secs: Option<u64>,
    /// Default working directory parent (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,
}

impl ConfigFile {
    /// Parse `path`. Read and syntax errors are both `HlsError::Config`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| HlsError::Config(format!("{}: {}", path.display(), e)))?;
        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| HlsError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Write as pretty TOML
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| HlsError::Config(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Default configuration with every section present
    pub fn default_config() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            tools: ToolPaths::default(),
            logging: Some(LoggingSettings::default()),
            build: Some(BuildSettings {
                workflow: Some(Workflow::Hls),
                keep_temp: Some(false),
                tool_timeout_secs: None,
                temp_dir: None,
            }),
        }
    }

    /// Log level from the `[logging]` section
    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().map(|l| l.level.as_str())
    }

    /// Log format from the `[logging]` section
    pub fn log_format(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.format.as_deref())
    }

    /// Convert to BuildConfig
    pub fn into_build_config(self) -> BuildConfig {
        let build = self.build.unwrap_or_default();
        BuildConfig {
            encoder: self.encoder,
            tools: self.tools,
            workflow: build.workflow.unwrap_or_default(),
            keep_temp: build.keep_temp.unwrap_or(false),
            tool_timeout_secs: build.tool_timeout_secs,
            temp_dir: build.temp_dir,
        }
    }
}

/// Write the fully populated default configuration to `path`
pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
    ConfigFile::default_config().to_file(path)
}
