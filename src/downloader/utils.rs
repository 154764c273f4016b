// Helper functions shared by the pipeline stages and backends

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};

use crate::downloader::errors::{BackendError, CleanupError};
use crate::downloader::models::{NetworkConfig, StreamRole};

/// Name used when a title sanitizes down to nothing
const FALLBACK_FILE_NAME: &str = "download";

static SCRATCH_SEQ: AtomicU64 = AtomicU64::new(0);

/// Failure to run an external program to completion
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to wait for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read output of {program}: {message}")]
    Pipe { program: String, message: String },

    #[error("{program} timed out after {secs}s")]
    TimedOut { program: String, secs: u64 },
}

impl From<ProcessError> for BackendError {
    fn from(err: ProcessError) -> Self {
        match err {
            ProcessError::Spawn { ref source, .. } if source.kind() == io::ErrorKind::NotFound => {
                BackendError::ToolNotFound(err.to_string())
            }
            ProcessError::TimedOut { .. } => BackendError::NetworkTimeout,
            other => BackendError::Execution(other.to_string()),
        }
    }
}

/// Run command with an optional timeout, capturing stdout and stderr
pub async fn run_output_with_timeout<S: AsRef<OsStr>>(
    program: &str,
    args: &[S],
    timeout_secs: Option<u64>,
) -> Result<std::process::Output, ProcessError> {
    let mut child = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ProcessError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let pipe_error = |message: String| ProcessError::Pipe {
        program: program.to_string(),
        message,
    };

    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| pipe_error("stdout not captured".to_string()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| pipe_error("stderr not captured".to_string()))?;

    // Drain both pipes concurrently so a chatty child never blocks on a full pipe
    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = match timeout_secs {
        Some(secs) => match timeout(TokioDuration::from_secs(secs), child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                let _ = child.kill().await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(ProcessError::TimedOut {
                    program: program.to_string(),
                    secs,
                });
            }
        },
        None => child.wait().await,
    };

    let status = waited.map_err(|source| ProcessError::Wait {
        program: program.to_string(),
        source,
    })?;
    let stdout = stdout_task
        .await
        .map_err(|e| pipe_error(e.to_string()))?
        .map_err(|e| pipe_error(e.to_string()))?;
    let stderr = stderr_task
        .await
        .map_err(|e| pipe_error(e.to_string()))?
        .map_err(|e| pipe_error(e.to_string()))?;

    Ok(std::process::Output {
        status,
        stdout,
        stderr,
    })
}

/// Strip characters that are illegal in file names on common filesystems
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .filter(|c| !c.is_control())
        .collect();

    let trimmed = cleaned.trim().trim_end_matches('.').trim_end();
    if trimmed.is_empty() {
        FALLBACK_FILE_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Per-request prefix for scratch files next to `final_path`:
/// `<final>.<pid>-<seq>`. Two requests that land on the same final path
/// never share a scratch file.
pub fn scratch_base(final_path: &Path) -> PathBuf {
    let seq = SCRATCH_SEQ.fetch_add(1, Ordering::Relaxed);
    let mut name = final_path.as_os_str().to_os_string();
    name.push(format!(".{}-{}", std::process::id(), seq));
    PathBuf::from(name)
}

/// `<scratch>.<role>.tmp`
pub fn temp_path_for(scratch: &Path, role: StreamRole) -> PathBuf {
    let mut name = scratch.as_os_str().to_os_string();
    name.push(".");
    name.push(role.temp_suffix());
    PathBuf::from(name)
}

/// `<scratch>.part.<ext>`; keeps the real extension so the muxer can infer
/// the container
pub fn part_path_for(scratch: &Path, extension: &str) -> PathBuf {
    let mut name = scratch.as_os_str().to_os_string();
    name.push(".part.");
    name.push(extension);
    PathBuf::from(name)
}

/// Delete intermediate files. Missing files are fine; anything else is
/// logged as `CleanupFailed` and otherwise ignored.
pub async fn remove_artifacts<P: AsRef<Path>>(paths: &[P]) {
    for path in paths {
        let path = path.as_ref();
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "removed intermediate file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(source) => {
                let err = CleanupError {
                    path: path.to_path_buf(),
                    source,
                };
                tracing::warn!(kind = %err.kind(), error = %err, "cleanup failed");
            }
        }
    }
}

/// Rename `from` to `to`. Across filesystems the data is copied to a staging
/// file beside `to` and renamed over it, so `to` is either untouched or
/// complete.
pub async fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    let rename_err = match tokio::fs::rename(from, to).await {
        Ok(()) => return Ok(()),
        Err(e) => e,
    };
    tracing::debug!(error = %rename_err, "rename failed, falling back to copy");

    let staging = staging_path_for(from, to);
    let staged = match tokio::fs::copy(from, &staging).await {
        Ok(_) => tokio::fs::rename(&staging, to).await,
        Err(e) => Err(e),
    };
    if let Err(e) = staged {
        remove_artifacts(&[&staging]).await;
        return Err(e);
    }

    tokio::fs::remove_file(from).await
}

fn staging_path_for(from: &Path, to: &Path) -> PathBuf {
    let mut name = from
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| FALLBACK_FILE_NAME.into());
    name.push(".partial");
    to.with_file_name(name)
}

/// Build proxy arguments for yt-dlp
pub fn get_proxy_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(proxy) = &config.proxy {
        args.push("--proxy".to_string());
        args.push(proxy.clone());
    }

    args
}

/// Build timeout arguments for yt-dlp
pub fn get_timeout_args(config: &NetworkConfig) -> Vec<String> {
    let mut args = Vec::new();

    if let Some(timeout) = config.timeout {
        args.push("--socket-timeout".to_string());
        args.push(timeout.to_string());
    }

    args
}
