//! External tool execution
//!
//! ffprobe, ffmpeg and shaka-packager are run as child processes through
//! [`ToolCommand`]. [`Tools`] resolves where each binary lives.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use tokio::process::Command;
use tracing::debug;

use crate::config::ToolPaths;
use crate::error::{HlsError, Result};

/// Probing never takes long; a hung ffprobe should not stall a build.
const PROBE_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: ExitStatus,
    /// Standard output (lossy UTF-8)
    pub stdout: String,
    /// Standard error (lossy UTF-8)
    pub stderr: String,
}

/// Builder for one external tool invocation
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            timeout: None,
        }
    }

    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Run the process in `dir`
    pub fn current_dir(&mut self, dir: impl Into<PathBuf>) -> &mut Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Kill the process if it runs longer than `d`
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = Some(d);
        self
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Name used in errors and logs
    pub fn tool_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run to completion, capturing stdout and stderr.
    ///
    /// Spawn failures, timeouts and non-zero exits are all
    /// [`HlsError::Tool`]; the message of a failed exit carries stderr.
    pub async fn execute(&self) -> Result<ToolOutput> {
        let tool = self.tool_name();
        debug!("running {} {}", self.program.display(), self.args.join(" "));

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| HlsError::Tool {
            tool: tool.clone(),
            message: format!("failed to spawn: {e}"),
        })?;

        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| HlsError::Tool {
                    tool: tool.clone(),
                    message: format!("timed out after {:?}", limit),
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| HlsError::Tool {
            tool: tool.clone(),
            message: format!("I/O error waiting for process: {e}"),
        })?;

        let out = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !out.status.success() {
            return Err(HlsError::Tool {
                tool,
                message: format!("exited with status {}: {}", out.status, stderr_tail(&out.stderr)),
            });
        }
        Ok(out)
    }
}

/// Last few lines of stderr; ffmpeg prints its banner and progress first.
fn stderr_tail(stderr: &str) -> String {
    let lines: Vec<&str> = stderr.trim().lines().collect();
    let start = lines.len().saturating_sub(10);
    lines[start..].join("\n")
}

/// Resolved locations of the external binaries
#[derive(Debug, Clone)]
pub struct Tools {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    packager: PathBuf,
    timeout: Option<Duration>,
}

impl Tools {
    /// Resolve every binary.
    ///
    /// ffmpeg and ffprobe are looked up in the configured directory, then in
    /// its parent, then in `PATH`. A binary that cannot be found keeps its
    /// bare name so the spawn error names it.
    pub fn resolve(paths: &ToolPaths, timeout: Option<Duration>) -> Self {
        let dir = paths.ffmpeg_dir.as_deref();
        let packager = match &paths.packager {
            Some(p) if p.exists() => p.clone(),
            _ => find_binary("packager", None),
        };
        let tools = Self {
            ffmpeg: find_binary("ffmpeg", dir),
            ffprobe: find_binary("ffprobe", dir),
            packager,
            timeout,
        };
        debug!(
            "tools: ffmpeg={} ffprobe={} packager={}",
            tools.ffmpeg.display(),
            tools.ffprobe.display(),
            tools.packager.display()
        );
        tools
    }

    /// Every tool at one fixed path
    #[cfg(test)]
    pub(crate) fn fixed(path: PathBuf) -> Self {
        Self {
            ffmpeg: path.clone(),
            ffprobe: path.clone(),
            packager: path,
            timeout: None,
        }
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// ffmpeg command with the build timeout applied
    pub fn ffmpeg(&self) -> ToolCommand {
        self.with_timeout(ToolCommand::new(&self.ffmpeg))
    }

    pub fn ffprobe(&self) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.ffprobe);
        cmd.timeout(PROBE_TIMEOUT);
        cmd
    }

    /// shaka-packager command with the build timeout applied
    pub fn packager(&self) -> ToolCommand {
        self.with_timeout(ToolCommand::new(&self.packager))
    }

    fn with_timeout(&self, mut cmd: ToolCommand) -> ToolCommand {
        if let Some(t) = self.timeout {
            cmd.timeout(t);
        }
        cmd
    }
}

fn find_binary(name: &str, dir: Option<&Path>) -> PathBuf {
    let file = format!("{}{}", name, std::env::consts::EXE_SUFFIX);
    if let Some(dir) = dir {
        let candidates = [Some(dir), dir.parent()];
        for candidate in candidates.into_iter().flatten() {
            let path = candidate.join(&file);
            if path.is_file() {
                return path;
            }
        }
    }
    which::which(name).unwrap_or_else(|_| PathBuf::from(name))
}
