//! External transcoder discovery and invocation.
//!
//! The actual video work is done by an FFmpeg executable. This module finds it ([`Transcoder::locate`])
//! and runs one speed-change job at a time per request ([`Transcoder::run`]), bounded by the configured
//! wall-clock timeout.
//!
//! The child is started in its own process group. When the timeout fires the whole group is killed
//! and the child is reaped before returning, so nothing keeps writing to the work files after the
//! request has been answered.

mod speed;

pub use speed::{InvalidSpeed, Speed};

use crate::config::TranscoderConfig;
use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::{Duration, Instant},
};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Command,
};
use tracing::{debug, instrument, warn};

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("failed to start {}: {source}", program.display())]
    Spawn { program: PathBuf, source: io::Error },
    #[error("failed while waiting for transcoder: {0}")]
    Wait(#[source] io::Error),
    #[error("transcoder did not finish within {after:?}")]
    TimedOut { after: Duration },
    #[error("transcoder exited with status {status:?}")]
    Failed { status: Option<i32>, stderr: String },
}

/// One speed-change job: read `input`, write a silent, sped-up `output`.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub speed: Speed,
}

impl TranscodeRequest {
    /// Arguments passed to the executable:
    /// `-i <input> -filter:v setpts=<1/speed>*PTS -an -y <output>`
    pub fn args(&self) -> Vec<OsString> {
        vec![
            "-i".into(),
            self.input.clone().into_os_string(),
            "-filter:v".into(),
            self.speed.setpts_filter().into(),
            // Drop audio, it would play at the original rate
            "-an".into(),
            "-y".into(),
            self.output.clone().into_os_string(),
        ]
    }

    /// Space-joined command line, for logs.
    pub fn command_line(&self, executable: &Path) -> String {
        std::iter::once(executable.as_os_str().to_owned())
            .chain(self.args())
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a successful run.
#[derive(Debug)]
pub struct TranscodeOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    config: TranscoderConfig,
}

impl Transcoder {
    pub fn new(config: TranscoderConfig) -> Self {
        Self { config }
    }

    pub fn default_speed(&self) -> Speed {
        self.config.default_speed
    }

    /// Remediation text returned to clients when the executable is missing.
    pub fn install_help(&self) -> String {
        format!("Visit {} to download FFmpeg", self.config.help_url)
    }

    /// Find the executable: configured `path`, then the search path, then the fallback locations.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = &self.config.path {
            if path.is_file() {
                return Some(path.clone());
            }
            warn!(path = %path.display(), "Configured transcoder path does not exist, falling back to search");
        }

        let found = match &self.config.search_path {
            Some(search_path) => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                which::which_in(&self.config.program, Some(search_path), cwd)
            }
            None => which::which(&self.config.program),
        };

        match found {
            Ok(path) => Some(path),
            Err(e) => {
                debug!(program = %self.config.program, error = %e, "Transcoder not found on search path");
                self.config.fallback_paths.iter().find(|path| path.is_file()).cloned()
            }
        }
    }

    /// Run `executable` for `request`, capturing stdout and stderr.
    ///
    /// A non-zero exit becomes [`TranscodeError::Failed`] carrying the captured stderr.
    #[instrument(skip_all, fields(input = %request.input.display(), speed = %request.speed))]
    pub async fn run(&self, executable: &Path, request: &TranscodeRequest) -> Result<TranscodeOutput, TranscodeError> {
        let started = Instant::now();

        let mut command = Command::new(executable);
        command
            .args(request.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command.spawn().map_err(|source| TranscodeError::Spawn {
            program: executable.to_path_buf(),
            source,
        })?;
        let pid = child.id();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let wait = async {
            let (status, stdout, stderr) = tokio::join!(child.wait(), read_to_string(stdout), read_to_string(stderr));
            Ok::<(ExitStatus, String, String), io::Error>((status?, stdout?, stderr?))
        };
        let outcome = tokio::time::timeout(self.config.timeout, wait).await;

        let (status, stdout, stderr) = match outcome {
            Ok(result) => result.map_err(TranscodeError::Wait)?,
            Err(_) => {
                warn!(pid = ?pid, timeout = ?self.config.timeout, "Transcoder timed out, killing process group");
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to reap timed out transcoder");
                }
                return Err(TranscodeError::TimedOut {
                    after: self.config.timeout,
                });
            }
        };

        let elapsed = started.elapsed();
        debug!(elapsed = ?elapsed, "Transcoder finished");

        if !status.success() {
            return Err(TranscodeError::Failed {
                status: status.code(),
                stderr,
            });
        }

        Ok(TranscodeOutput { stdout, stderr, elapsed })
    }
}

async fn read_to_string<R: AsyncRead + Unpin>(reader: Option<R>) -> io::Result<String> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    // ESRCH just means everything already exited
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL)
        && e != nix::errno::Errno::ESRCH
    {
        warn!(pid, error = %e, "Failed to kill transcoder process group");
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
